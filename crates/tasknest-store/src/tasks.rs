//! Task store adapter: owner-prefixed records plus a per-owner id index.

use std::sync::{Arc, Mutex};

use tasknest_core::{GenerationJob, NestError, ReminderState, Result, Task};

use crate::kv::KvEngine;

/// Attempts for the index read-modify-write before giving up. A missing
/// index entry silently hides a task; a stale one only costs a harmless
/// not-found on dereference, so writes are retried until the index holds.
const INDEX_RETRIES: usize = 3;

/// Task store over a key-value engine.
///
/// Key layout per owner:
/// - `{owner}/task/{id}` — task record
/// - `{owner}/index/task` — JSON list of task ids
/// - `{owner}/reminder/{task_id}` — reminder state
/// - `{owner}/recurjob/{task_id}` — recurring generation job
pub struct TaskStore {
    engine: Arc<dyn KvEngine>,
    /// The index is the one read-modify-write resource in the system;
    /// serialize updates to it.
    index_lock: Mutex<()>,
}

fn task_key(owner: &str, id: &str) -> String {
    format!("{owner}/task/{id}")
}

fn index_key(owner: &str) -> String {
    format!("{owner}/index/task")
}

fn reminder_key(owner: &str, task_id: &str) -> String {
    format!("{owner}/reminder/{task_id}")
}

fn generation_key(owner: &str, task_id: &str) -> String {
    format!("{owner}/recurjob/{task_id}")
}

impl TaskStore {
    pub fn new(engine: Arc<dyn KvEngine>) -> Self {
        Self {
            engine,
            index_lock: Mutex::new(()),
        }
    }

    /// Upsert a task. On first insert the id is appended to the owner's
    /// index; the record is written before the index so a failure in
    /// between leaves a fetchable (if unlisted-for-a-moment) record
    /// rather than a dangling index entry pointing at nothing.
    pub fn save(&self, task: &Task) -> Result<()> {
        let key = task_key(&task.owner, &task.id);
        let is_new = self.engine.get(&key)?.is_none();
        let json = serde_json::to_string(task)?;
        self.engine.put(&key, &json)?;
        if is_new {
            self.index_add(&task.owner, &task.id)?;
        }
        tracing::debug!("💾 saved task {} for {}", task.id, task.owner);
        Ok(())
    }

    /// Fetch one task. Missing ids and cross-owner ids both resolve to
    /// `NotFound` — existence is never revealed across owners.
    pub fn get(&self, owner: &str, id: &str) -> Result<Task> {
        let key = task_key(owner, id);
        match self.engine.get(&key)? {
            Some(json) => decode(&key, &json),
            None => Err(NestError::NotFound("task".into())),
        }
    }

    /// List all of an owner's tasks via the index (no full-store scan).
    /// Dangling index entries are skipped and pruned in passing.
    pub fn list(&self, owner: &str) -> Result<Vec<Task>> {
        let ids = self.read_index(owner)?;
        let mut tasks = Vec::with_capacity(ids.len());
        let mut dangling = Vec::new();
        for id in &ids {
            let key = task_key(owner, id);
            match self.engine.get(&key)? {
                Some(json) => tasks.push(decode(&key, &json)?),
                None => dangling.push(id.clone()),
            }
        }
        if !dangling.is_empty() {
            tracing::warn!(
                "index for {owner} held {} dangling entr(ies) — pruning",
                dangling.len()
            );
            let _ = self.index_remove_many(owner, &dangling);
        }
        Ok(tasks)
    }

    /// Delete a task record and its index entry.
    pub fn delete(&self, owner: &str, id: &str) -> Result<()> {
        let key = task_key(owner, id);
        if self.engine.get(&key)?.is_none() {
            return Err(NestError::NotFound("task".into()));
        }
        self.engine.delete(&key)?;
        self.index_remove_many(owner, std::slice::from_ref(&id.to_string()))?;
        tracing::debug!("🗑️ deleted task {id} for {owner}");
        Ok(())
    }

    // ─── Reminder state ──────────────────────────────────────

    pub fn put_reminder(&self, owner: &str, state: &ReminderState) -> Result<()> {
        let json = serde_json::to_string(state)?;
        self.engine.put(&reminder_key(owner, &state.task_id), &json)
    }

    pub fn get_reminder(&self, owner: &str, task_id: &str) -> Result<Option<ReminderState>> {
        let key = reminder_key(owner, task_id);
        match self.engine.get(&key)? {
            Some(json) => Ok(Some(decode(&key, &json)?)),
            None => Ok(None),
        }
    }

    pub fn delete_reminder(&self, owner: &str, task_id: &str) -> Result<()> {
        self.engine.delete(&reminder_key(owner, task_id))
    }

    // ─── Generation jobs ──────────────────────────────────────

    pub fn put_generation_job(&self, owner: &str, job: &GenerationJob) -> Result<()> {
        let json = serde_json::to_string(job)?;
        self.engine
            .put(&generation_key(owner, &job.parent_id), &json)
    }

    pub fn get_generation_job(&self, owner: &str, task_id: &str) -> Result<Option<GenerationJob>> {
        let key = generation_key(owner, task_id);
        match self.engine.get(&key)? {
            Some(json) => Ok(Some(decode(&key, &json)?)),
            None => Ok(None),
        }
    }

    pub fn delete_generation_job(&self, owner: &str, task_id: &str) -> Result<()> {
        self.engine.delete(&generation_key(owner, task_id))
    }

    // ─── Index maintenance ──────────────────────────────────────

    fn read_index(&self, owner: &str) -> Result<Vec<String>> {
        let key = index_key(owner);
        match self.engine.get(&key)? {
            Some(json) => decode(&key, &json),
            None => Ok(Vec::new()),
        }
    }

    fn index_add(&self, owner: &str, id: &str) -> Result<()> {
        let _guard = self.index_lock.lock().unwrap();
        let mut last_err = None;
        for attempt in 1..=INDEX_RETRIES {
            match self.try_index_add(owner, id) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!("index append for {owner} failed (attempt {attempt}): {e}");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| NestError::Store("index append failed".into())))
    }

    fn try_index_add(&self, owner: &str, id: &str) -> Result<()> {
        let mut ids = self.read_index(owner)?;
        if !ids.iter().any(|x| x == id) {
            ids.push(id.to_string());
        }
        self.engine
            .put(&index_key(owner), &serde_json::to_string(&ids)?)
    }

    fn index_remove_many(&self, owner: &str, remove: &[String]) -> Result<()> {
        let _guard = self.index_lock.lock().unwrap();
        let mut last_err = None;
        for attempt in 1..=INDEX_RETRIES {
            match self.try_index_remove(owner, remove) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!("index removal for {owner} failed (attempt {attempt}): {e}");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| NestError::Store("index removal failed".into())))
    }

    fn try_index_remove(&self, owner: &str, remove: &[String]) -> Result<()> {
        let mut ids = self.read_index(owner)?;
        ids.retain(|x| !remove.contains(x));
        self.engine
            .put(&index_key(owner), &serde_json::to_string(&ids)?)
    }
}

/// Decode a stored record, mapping parse failures to `Corrupt` with the
/// offending key so one bad record never takes other owners down.
fn decode<T: serde::de::DeserializeOwned>(key: &str, json: &str) -> Result<T> {
    serde_json::from_str(json).map_err(|e| {
        tracing::error!("corrupt record at {key}: {e}");
        NestError::Corrupt(key.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;
    use chrono::Utc;
    use tasknest_core::Recurrence;

    fn store() -> TaskStore {
        TaskStore::new(Arc::new(MemoryKv::new()))
    }

    #[test]
    fn test_save_get_roundtrip() {
        let store = store();
        let task = Task::new("alice", "write report");
        store.save(&task).unwrap();
        let got = store.get("alice", &task.id).unwrap();
        assert_eq!(got.title, "write report");
        assert_eq!(got.owner, "alice");
    }

    #[test]
    fn test_owner_isolation() {
        let store = store();
        let task = Task::new("bob", "secret plan");
        store.save(&task).unwrap();

        // Alice cannot see Bob's task in a list...
        assert!(store.list("alice").unwrap().is_empty());
        // ...nor fetch it directly even knowing the id.
        assert!(
            store
                .get("alice", &task.id)
                .unwrap_err()
                .is_not_found()
        );
        assert_eq!(store.list("bob").unwrap().len(), 1);
    }

    #[test]
    fn test_list_uses_index() {
        let store = store();
        for i in 0..5 {
            store.save(&Task::new("alice", &format!("task {i}"))).unwrap();
        }
        let tasks = store.list("alice").unwrap();
        assert_eq!(tasks.len(), 5);
    }

    #[test]
    fn test_save_is_upsert_without_index_duplication() {
        let store = store();
        let mut task = Task::new("alice", "draft");
        store.save(&task).unwrap();
        task.title = "final".into();
        store.save(&task).unwrap();
        let tasks = store.list("alice").unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "final");
    }

    #[test]
    fn test_delete_removes_record_and_index_entry() {
        let store = store();
        let task = Task::new("alice", "ephemeral");
        store.save(&task).unwrap();
        store.delete("alice", &task.id).unwrap();
        assert!(store.get("alice", &task.id).unwrap_err().is_not_found());
        assert!(store.list("alice").unwrap().is_empty());
        // Deleting again is a clean not-found, not a crash.
        assert!(store.delete("alice", &task.id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_dangling_index_entry_is_pruned() {
        let engine = Arc::new(MemoryKv::new());
        let store = TaskStore::new(engine.clone());
        let task = Task::new("alice", "will dangle");
        store.save(&task).unwrap();
        // Simulate a record lost underneath the index.
        engine.delete(&format!("alice/task/{}", task.id)).unwrap();
        assert!(store.list("alice").unwrap().is_empty());
        // Second list sees a clean index.
        assert!(store.list("alice").unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_record_is_reported_not_panicked() {
        let engine = Arc::new(MemoryKv::new());
        let store = TaskStore::new(engine.clone());
        engine.put("alice/task/bad", "not json").unwrap();
        match store.get("alice", "bad") {
            Err(NestError::Corrupt(key)) => assert_eq!(key, "alice/task/bad"),
            other => panic!("expected corrupt error, got {other:?}"),
        }
    }

    #[test]
    fn test_reminder_and_generation_records() {
        let store = store();
        let state = ReminderState {
            task_id: "t1".into(),
            trigger_at: Utc::now(),
            sent: false,
        };
        store.put_reminder("alice", &state).unwrap();
        assert!(!store.get_reminder("alice", "t1").unwrap().unwrap().sent);
        // Bob's namespace is untouched.
        assert!(store.get_reminder("bob", "t1").unwrap().is_none());
        store.delete_reminder("alice", "t1").unwrap();
        assert!(store.get_reminder("alice", "t1").unwrap().is_none());

        let job = GenerationJob {
            parent_id: "t2".into(),
            pattern: Recurrence::Weekly,
            anchor: Utc::now(),
            last_due: Utc::now(),
        };
        store.put_generation_job("alice", &job).unwrap();
        assert_eq!(
            store
                .get_generation_job("alice", "t2")
                .unwrap()
                .unwrap()
                .pattern,
            Recurrence::Weekly
        );
        store.delete_generation_job("alice", "t2").unwrap();
        assert!(store.get_generation_job("alice", "t2").unwrap().is_none());
    }
}
