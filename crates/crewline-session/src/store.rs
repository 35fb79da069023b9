use crate::session::Session;
use crewline_core::{CrewlineError, CrewlineResult};
use async_trait::async_trait;
use std::path::PathBuf;
use uuid::Uuid;

/// Persistence for sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a new session.
    async fn create(&self, session: &Session) -> CrewlineResult<()>;
    /// Load a session by id.
    async fn get(&self, id: Uuid) -> CrewlineResult<Option<Session>>;
    /// Overwrite a stored session.
    async fn update(&self, session: &Session) -> CrewlineResult<()>;
    /// Remove a session; missing ids are not an error.
    async fn delete(&self, id: Uuid) -> CrewlineResult<()>;
    /// Ids of every stored session.
    async fn list(&self) -> CrewlineResult<Vec<Uuid>>;

    /// Load a session, creating an empty one under `id` if none exists.
    async fn get_or_create(&self, id: Uuid) -> CrewlineResult<Session> {
        if let Some(session) = self.get(id).await? {
            return Ok(session);
        }
        let session = Session::with_id(id);
        self.create(&session).await?;
        Ok(session)
    }
}

/// File-based session store: one pretty-printed JSON file per session.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash mid-write leaves the previous version intact.
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Store rooted at `dir`, created if missing.
    pub async fn new(dir: PathBuf) -> CrewlineResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn session_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn create(&self, session: &Session) -> CrewlineResult<()> {
        let path = self.session_path(session.id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(session)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> CrewlineResult<Option<Session>> {
        let path = self.session_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(path).await?;
        let session: Session = serde_json::from_str(&data)
            .map_err(|e| CrewlineError::Session(format!("Failed to parse session {id}: {e}")))?;
        Ok(Some(session))
    }

    async fn update(&self, session: &Session) -> CrewlineResult<()> {
        self.create(session).await
    }

    async fn delete(&self, id: Uuid) -> CrewlineResult<()> {
        let path = self.session_path(id);
        if path.exists() {
            tokio::fs::remove_file(path).await?;
        }
        Ok(())
    }

    async fn list(&self) -> CrewlineResult<Vec<Uuid>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if let Some(stem) = name.strip_suffix(".json") {
                    if let Ok(id) = Uuid::parse_str(stem) {
                        ids.push(id);
                    }
                }
            }
        }
        Ok(ids)
    }
}
