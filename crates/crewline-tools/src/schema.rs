use crewline_core::{CrewlineError, CrewlineResult};
use jsonschema::Validator;

/// A compiled parameter schema.
pub struct ParameterSchema {
    validator: Validator,
}

impl ParameterSchema {
    /// Compile `schema`. An invalid schema is a configuration error.
    pub fn compile(tool: &str, schema: &serde_json::Value) -> CrewlineResult<Self> {
        let validator = jsonschema::validator_for(schema).map_err(|e| {
            CrewlineError::Config(format!("Tool '{tool}' has an invalid parameter schema: {e}"))
        })?;
        Ok(Self { validator })
    }

    /// Check `params`, reporting every violation in one error.
    pub fn validate(&self, tool: &str, params: &serde_json::Value) -> CrewlineResult<()> {
        let violations: Vec<String> = self
            .validator
            .iter_errors(params)
            .map(|e| e.to_string())
            .collect();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(CrewlineError::Tool(format!(
                "Invalid parameters for '{tool}': {}",
                violations.join("; ")
            )))
        }
    }
}
