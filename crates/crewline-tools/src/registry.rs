use crate::schema::ParameterSchema;
use crate::tool::{Tool, ToolDescriptor};
use crewline_core::{CrewlineError, CrewlineResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

struct RegisteredTool {
    tool: Arc<dyn Tool>,
    schema: ParameterSchema,
}

/// Catalog of tools available to agents, with compiled parameter schemas.
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool, compiling its parameter schema. Re-registering a name
    /// replaces the previous tool.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> CrewlineResult<()> {
        let descriptor = tool.descriptor();
        let name = descriptor.name.clone();
        let schema = ParameterSchema::compile(&name, &descriptor.parameters_schema)?;
        if self.tools.contains_key(&name) {
            warn!(tool = %name, "Overwriting existing tool");
        }
        info!(tool = %name, "Registered tool");
        self.tools.insert(name, RegisteredTool { tool, schema });
        Ok(())
    }

    /// Remove `name`; true when it was registered.
    pub fn unregister(&mut self, name: &str) -> bool {
        let removed = self.tools.remove(name).is_some();
        if removed {
            info!(tool = %name, "Unregistered tool");
        }
        removed
    }

    /// Tool registered as `name`.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name).map(|t| &t.tool)
    }

    /// Look up a tool and validate `params` against its schema.
    pub fn resolve(
        &self,
        name: &str,
        params: &serde_json::Value,
    ) -> CrewlineResult<&Arc<dyn Tool>> {
        let entry = self
            .tools
            .get(name)
            .ok_or_else(|| CrewlineError::Tool(format!("Unknown tool: {name}")))?;
        entry.schema.validate(name, params)?;
        Ok(&entry.tool)
    }

    /// Descriptors sorted by name.
    pub fn list_descriptors(&self) -> Vec<&ToolDescriptor> {
        let mut descriptors: Vec<&ToolDescriptor> =
            self.tools.values().map(|t| t.tool.descriptor()).collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Number of registered tools.
    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::tool::ToolContext;
    use async_trait::async_trait;
    use serde_json::json;

    struct Echo {
        descriptor: ToolDescriptor,
    }

    impl Echo {
        fn named(name: &str) -> Arc<dyn Tool> {
            Arc::new(Self {
                descriptor: ToolDescriptor::new(
                    name,
                    "Echo the text back",
                    json!({
                        "type": "object",
                        "properties": {"text": {"type": "string"}},
                        "required": ["text"]
                    }),
                ),
            })
        }
    }

    #[async_trait]
    impl Tool for Echo {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.descriptor
        }

        async fn execute(
            &self,
            params: serde_json::Value,
            _ctx: &ToolContext,
        ) -> CrewlineResult<serde_json::Value> {
            Ok(params["text"].clone())
        }
    }

    #[test]
    fn test_register_and_list_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(Echo::named("zeta")).unwrap();
        registry.register(Echo::named("alpha")).unwrap();

        let names: Vec<&str> = registry
            .list_descriptors()
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(registry.tool_count(), 2);
    }

    #[test]
    fn test_resolve_validates_params() {
        let mut registry = ToolRegistry::new();
        registry.register(Echo::named("echo")).unwrap();

        assert!(registry.resolve("echo", &json!({"text": "hi"})).is_ok());
        assert!(matches!(
            registry.resolve("echo", &json!({})),
            Err(CrewlineError::Tool(_))
        ));
        let err = registry.resolve("missing", &json!({})).err().unwrap();
        assert!(err.to_string().contains("Unknown tool: missing"));
    }

    #[test]
    fn test_unregister() {
        let mut registry = ToolRegistry::new();
        registry.register(Echo::named("echo")).unwrap();
        assert!(registry.unregister("echo"));
        assert!(!registry.unregister("echo"));
        assert!(registry.get("echo").is_none());
    }

    #[tokio::test]
    async fn test_resolved_tool_executes() {
        let mut registry = ToolRegistry::new();
        registry.register(Echo::named("echo")).unwrap();
        let params = json!({"text": "ping"});
        let tool = registry.resolve("echo", &params).unwrap();
        let ctx = ToolContext::new(uuid::Uuid::new_v4(), "coder");
        assert_eq!(tool.execute(params.clone(), &ctx).await.unwrap(), json!("ping"));
    }
}
