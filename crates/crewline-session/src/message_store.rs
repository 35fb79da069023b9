use crewline_core::{AgentMessage, CrewlineError, CrewlineResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// MessageStore trait
// ---------------------------------------------------------------------------

/// Append-only persistence behind the message pool.
///
/// Implementations must not return from [`append`](Self::append) until the
/// message would survive a process restart. Messages are never deleted.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Durably append one message.
    async fn append(&self, message: &AgentMessage) -> CrewlineResult<()>;
    /// Point lookup by message id.
    async fn get(&self, id: Uuid) -> CrewlineResult<Option<AgentMessage>>;
    /// All messages of a session, in append order.
    async fn by_session(&self, session_id: Uuid) -> CrewlineResult<Vec<AgentMessage>>;
    /// Every stored message, grouped by session, each group in append order.
    async fn load_all(&self) -> CrewlineResult<Vec<AgentMessage>>;
    /// Whether a message with this id is stored.
    async fn contains(&self, id: Uuid) -> bool;
    /// Ids of sessions holding at least one message, in a stable order.
    async fn sessions(&self) -> Vec<Uuid>;
    /// Number of stored messages.
    async fn count(&self) -> usize;
}

// ---------------------------------------------------------------------------
// FileMessageStore
// ---------------------------------------------------------------------------

/// One JSONL file per session: `<dir>/<session-id>.messages.jsonl`.
///
/// Every append is flushed and `fsync`ed before returning. A torn final line
/// (crash mid-append) is skipped on read and cut off before the next append;
/// corruption anywhere else is an error.
pub struct FileMessageStore {
    dir: PathBuf,
    /// message id -> session id, rebuilt from disk on open.
    index: RwLock<HashMap<Uuid, Uuid>>,
    write_lock: Mutex<()>,
}

impl FileMessageStore {
    /// Open (or create) a store rooted at `dir` and index existing messages.
    pub async fn open(dir: PathBuf) -> CrewlineResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        let store = Self {
            dir,
            index: RwLock::new(HashMap::new()),
            write_lock: Mutex::new(()),
        };
        let existing = store.load_all().await?;
        {
            let mut index = store.index.write().await;
            for msg in &existing {
                index.insert(msg.id, msg.session_id);
            }
        }
        debug!(dir = %store.dir.display(), messages = existing.len(), "Opened message store");
        Ok(store)
    }

    fn session_path(&self, session_id: Uuid) -> PathBuf {
        self.dir.join(format!("{session_id}.messages.jsonl"))
    }

    async fn read_file(path: &Path) -> CrewlineResult<Vec<AgentMessage>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = tokio::fs::read_to_string(path).await?;
        let lines: Vec<&str> = data.lines().filter(|l| !l.trim().is_empty()).collect();
        let mut messages = Vec::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            match serde_json::from_str::<AgentMessage>(line) {
                Ok(msg) => messages.push(msg),
                Err(e) if i + 1 == lines.len() && !data.ends_with('\n') => {
                    warn!(path = %path.display(), error = %e, "Skipping torn trailing message line");
                }
                Err(e) => {
                    return Err(CrewlineError::Pool(format!(
                        "Corrupt message log {} at line {}: {e}",
                        path.display(),
                        i + 1
                    )));
                }
            }
        }
        Ok(messages)
    }

    /// Cut a torn trailing line so the next append starts on a fresh line.
    async fn truncate_torn_tail(file: &mut tokio::fs::File, path: &Path) -> CrewlineResult<()> {
        let len = file.metadata().await?.len();
        if len == 0 {
            return Ok(());
        }
        file.seek(SeekFrom::Start(len - 1)).await?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last).await?;
        if last[0] == b'\n' {
            return Ok(());
        }

        let data = tokio::fs::read(path).await?;
        let keep = data
            .iter()
            .rposition(|b| *b == b'\n')
            .map_or(0, |i| i + 1);
        warn!(
            path = %path.display(),
            dropped_bytes = data.len() - keep,
            "Truncating torn trailing message line"
        );
        file.set_len(keep as u64).await?;
        Ok(())
    }
}

#[async_trait]
impl MessageStore for FileMessageStore {
    async fn append(&self, message: &AgentMessage) -> CrewlineResult<()> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let path = self.session_path(message.session_id);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .await?;
        Self::truncate_torn_tail(&mut file, &path).await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        file.sync_data().await?;

        self.index
            .write()
            .await
            .insert(message.id, message.session_id);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> CrewlineResult<Option<AgentMessage>> {
        let session_id = match self.index.read().await.get(&id) {
            Some(sid) => *sid,
            None => return Ok(None),
        };
        let messages = self.by_session(session_id).await?;
        Ok(messages.into_iter().find(|m| m.id == id))
    }

    async fn by_session(&self, session_id: Uuid) -> CrewlineResult<Vec<AgentMessage>> {
        Self::read_file(&self.session_path(session_id)).await
    }

    async fn load_all(&self) -> CrewlineResult<Vec<AgentMessage>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_log = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(".messages.jsonl"));
            if is_log {
                paths.push(path);
            }
        }
        paths.sort();

        let mut all = Vec::new();
        for path in paths {
            all.extend(Self::read_file(&path).await?);
        }
        Ok(all)
    }

    async fn contains(&self, id: Uuid) -> bool {
        self.index.read().await.contains_key(&id)
    }

    async fn sessions(&self) -> Vec<Uuid> {
        let mut sessions: Vec<Uuid> = self.index.read().await.values().copied().collect();
        sessions.sort();
        sessions.dedup();
        sessions
    }

    async fn count(&self) -> usize {
        self.index.read().await.len()
    }
}

// ---------------------------------------------------------------------------
// InMemoryMessageStore
// ---------------------------------------------------------------------------

/// Volatile store for tests and embedders that persist elsewhere.
#[derive(Default)]
pub struct InMemoryMessageStore {
    messages: RwLock<Vec<AgentMessage>>,
}

impl InMemoryMessageStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored messages.
    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    /// True when nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn append(&self, message: &AgentMessage) -> CrewlineResult<()> {
        self.messages.write().await.push(message.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> CrewlineResult<Option<AgentMessage>> {
        Ok(self
            .messages
            .read()
            .await
            .iter()
            .find(|m| m.id == id)
            .cloned())
    }

    async fn by_session(&self, session_id: Uuid) -> CrewlineResult<Vec<AgentMessage>> {
        Ok(self
            .messages
            .read()
            .await
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn load_all(&self) -> CrewlineResult<Vec<AgentMessage>> {
        Ok(self.messages.read().await.clone())
    }

    async fn contains(&self, id: Uuid) -> bool {
        self.messages.read().await.iter().any(|m| m.id == id)
    }

    async fn sessions(&self) -> Vec<Uuid> {
        let mut sessions = Vec::new();
        for message in self.messages.read().await.iter() {
            if !sessions.contains(&message.session_id) {
                sessions.push(message.session_id);
            }
        }
        sessions
    }

    async fn count(&self) -> usize {
        self.messages.read().await.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crewline_core::{MessageType, Recipients};
    use tempfile::TempDir;

    fn status(session_id: Uuid, n: u32) -> AgentMessage {
        AgentMessage::broadcast(
            session_id,
            MessageType::StatusUpdate,
            "coordinator",
            serde_json::json!({"seq": n}),
        )
    }

    #[tokio::test]
    async fn append_and_read_in_order() {
        let tmp = TempDir::new().unwrap();
        let store = FileMessageStore::open(tmp.path().to_path_buf()).await.unwrap();
        let sid = Uuid::new_v4();

        for n in 0..3 {
            store.append(&status(sid, n)).await.unwrap();
        }

        let msgs = store.by_session(sid).await.unwrap();
        let seqs: Vec<u64> = msgs
            .iter()
            .map(|m| m.content["seq"].as_u64().unwrap())
            .collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn point_lookup_by_id() {
        let tmp = TempDir::new().unwrap();
        let store = FileMessageStore::open(tmp.path().to_path_buf()).await.unwrap();
        let msg = AgentMessage::new(
            Uuid::new_v4(),
            MessageType::TaskAssignment,
            "coordinator",
            Recipients::agent("coder"),
            serde_json::json!({"task_id": "t1"}),
        );
        store.append(&msg).await.unwrap();

        let found = store.get(msg.id).await.unwrap().unwrap();
        assert_eq!(found.kind, MessageType::TaskAssignment);
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().to_path_buf();
        let sid = Uuid::new_v4();
        let msg = status(sid, 7);

        {
            let store = FileMessageStore::open(dir.clone()).await.unwrap();
            store.append(&msg).await.unwrap();
        }

        let reopened = FileMessageStore::open(dir).await.unwrap();
        assert_eq!(reopened.get(msg.id).await.unwrap().unwrap().id, msg.id);
        assert_eq!(reopened.load_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn torn_trailing_line_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().to_path_buf();
        let sid = Uuid::new_v4();
        {
            let store = FileMessageStore::open(dir.clone()).await.unwrap();
            store.append(&status(sid, 1)).await.unwrap();
        }
        let path = dir.join(format!("{sid}.messages.jsonl"));
        let mut data = tokio::fs::read_to_string(&path).await.unwrap();
        data.push_str("{\"id\": \"trunc");
        tokio::fs::write(&path, data).await.unwrap();

        let store = FileMessageStore::open(dir).await.unwrap();
        assert_eq!(store.by_session(sid).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn append_after_torn_line_stays_readable() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().to_path_buf();
        let sid = Uuid::new_v4();
        let first = status(sid, 1);
        {
            let store = FileMessageStore::open(dir.clone()).await.unwrap();
            store.append(&first).await.unwrap();
        }
        let path = dir.join(format!("{sid}.messages.jsonl"));
        let mut data = tokio::fs::read_to_string(&path).await.unwrap();
        data.push_str("{\"id\": \"trunc");
        tokio::fs::write(&path, data).await.unwrap();

        let second = status(sid, 2);
        {
            let store = FileMessageStore::open(dir.clone()).await.unwrap();
            store.append(&second).await.unwrap();
            let ids: Vec<Uuid> = store.by_session(sid).await.unwrap().iter().map(|m| m.id).collect();
            assert_eq!(ids, vec![first.id, second.id]);
        }

        let reopened = FileMessageStore::open(dir).await.unwrap();
        assert_eq!(reopened.count().await, 2);
        assert!(reopened.get(second.id).await.unwrap().is_some());
        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(!raw.contains("trunc"));
    }

    #[tokio::test]
    async fn index_answers_contains_and_sessions() {
        let tmp = TempDir::new().unwrap();
        let store = FileMessageStore::open(tmp.path().to_path_buf()).await.unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let msg = status(a, 1);
        store.append(&msg).await.unwrap();
        store.append(&status(b, 2)).await.unwrap();
        store.append(&status(a, 3)).await.unwrap();

        assert!(store.contains(msg.id).await);
        assert!(!store.contains(Uuid::new_v4()).await);
        assert_eq!(store.count().await, 3);
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(store.sessions().await, expected);
    }

    #[tokio::test]
    async fn corrupt_middle_line_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let sid = Uuid::new_v4();
        let path = tmp.path().join(format!("{sid}.messages.jsonl"));
        let good = serde_json::to_string(&status(sid, 2)).unwrap();
        tokio::fs::write(&path, format!("garbage\n{good}\n"))
            .await
            .unwrap();

        let err = FileMessageStore::open(tmp.path().to_path_buf())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CrewlineError::Pool(_)));
    }

    #[tokio::test]
    async fn concurrent_appends_from_many_sessions() {
        let tmp = TempDir::new().unwrap();
        let store = std::sync::Arc::new(
            FileMessageStore::open(tmp.path().to_path_buf()).await.unwrap(),
        );
        let sessions: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();

        let mut handles = Vec::new();
        for sid in sessions.clone() {
            for n in 0..10 {
                let store = store.clone();
                handles.push(tokio::spawn(async move {
                    store.append(&status(sid, n)).await.unwrap();
                }));
            }
        }
        for h in handles {
            h.await.unwrap();
        }

        for sid in sessions {
            assert_eq!(store.by_session(sid).await.unwrap().len(), 10);
        }
        assert_eq!(store.load_all().await.unwrap().len(), 40);
    }

    #[tokio::test]
    async fn in_memory_store_filters_by_session() {
        let store = InMemoryMessageStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.append(&status(a, 1)).await.unwrap();
        store.append(&status(b, 2)).await.unwrap();
        store.append(&status(a, 3)).await.unwrap();

        assert_eq!(store.len().await, 3);
        assert_eq!(store.count().await, 3);
        assert_eq!(store.sessions().await, vec![a, b]);
        assert_eq!(store.by_session(a).await.unwrap().len(), 2);
        assert_eq!(store.by_session(b).await.unwrap().len(), 1);
    }
}
