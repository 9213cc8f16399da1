//! Persistence boundary for player records and scores
//!
//! The server only needs the `PlayerStore` trait. `MemoryStore` backs it with
//! an in-process map, which is what the binary runs with.

use hashbrown::HashMap;
use parking_lot::Mutex;

/// A persisted player
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRecord {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub best_score: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("player record {0} not found")]
    NotFound(i64),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Storage operations used by the game
pub trait PlayerStore: Send + Sync {
    /// Look up the record for `user_id`, creating it with `name` if missing
    fn create_or_fetch(&self, user_id: &str, name: &str) -> Result<PlayerRecord, StoreError>;

    /// Raise a record's best score; lower scores leave it unchanged
    fn update_best_score(&self, record_id: i64, score: i64) -> Result<(), StoreError>;

    /// (name, best score) pairs, highest first
    fn leaderboard(&self, limit: usize, offset: usize) -> Result<Vec<(String, i64)>, StoreError>;

    /// 1-based position of a record on the leaderboard
    fn rank(&self, record_id: i64) -> Result<u64, StoreError>;
}

#[derive(Default)]
struct MemoryInner {
    records: HashMap<i64, PlayerRecord>,
    by_user: HashMap<String, i64>,
    next_id: i64,
}

/// In-memory `PlayerStore`
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlayerStore for MemoryStore {
    fn create_or_fetch(&self, user_id: &str, name: &str) -> Result<PlayerRecord, StoreError> {
        let mut inner = self.inner.lock();

        if let Some(id) = inner.by_user.get(user_id).copied() {
            return inner.records.get(&id).cloned().ok_or(StoreError::NotFound(id));
        }

        inner.next_id += 1;
        let record = PlayerRecord {
            id: inner.next_id,
            user_id: user_id.to_string(),
            name: name.to_string(),
            best_score: 0,
        };
        inner.by_user.insert(record.user_id.clone(), record.id);
        inner.records.insert(record.id, record.clone());

        Ok(record)
    }

    fn update_best_score(&self, record_id: i64, score: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let record = inner
            .records
            .get_mut(&record_id)
            .ok_or(StoreError::NotFound(record_id))?;
        record.best_score = record.best_score.max(score);
        Ok(())
    }

    fn leaderboard(&self, limit: usize, offset: usize) -> Result<Vec<(String, i64)>, StoreError> {
        let inner = self.inner.lock();
        let mut entries: Vec<(String, i64)> = inner
            .records
            .values()
            .map(|r| (r.name.clone(), r.best_score))
            .collect();
        drop(inner);

        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(entries.into_iter().skip(offset).take(limit).collect())
    }

    fn rank(&self, record_id: i64) -> Result<u64, StoreError> {
        let inner = self.inner.lock();
        let score = inner
            .records
            .get(&record_id)
            .map(|r| r.best_score)
            .ok_or(StoreError::NotFound(record_id))?;

        let ahead = inner.records.values().filter(|r| r.best_score > score).count();
        Ok(ahead as u64 + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_or_fetch_is_idempotent() {
        let store = MemoryStore::new();
        let first = store.create_or_fetch("u1", "alice").unwrap();
        let again = store.create_or_fetch("u1", "ignored").unwrap();

        assert_eq!(first, again);
        assert_eq!(again.name, "alice");
        assert_eq!(again.best_score, 0);

        let other = store.create_or_fetch("u2", "bob").unwrap();
        assert_ne!(other.id, first.id);
    }

    #[test]
    fn test_update_best_score_only_raises() {
        let store = MemoryStore::new();
        let record = store.create_or_fetch("u1", "alice").unwrap();

        store.update_best_score(record.id, 500).unwrap();
        store.update_best_score(record.id, 200).unwrap();

        let fetched = store.create_or_fetch("u1", "alice").unwrap();
        assert_eq!(fetched.best_score, 500);
    }

    #[test]
    fn test_update_unknown_record() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.update_best_score(42, 1),
            Err(StoreError::NotFound(42))
        ));
    }

    #[test]
    fn test_leaderboard_and_rank() {
        let store = MemoryStore::new();
        let a = store.create_or_fetch("a", "alice").unwrap();
        let b = store.create_or_fetch("b", "bob").unwrap();
        let c = store.create_or_fetch("c", "carol").unwrap();

        store.update_best_score(a.id, 100).unwrap();
        store.update_best_score(b.id, 300).unwrap();
        store.update_best_score(c.id, 200).unwrap();

        let top = store.leaderboard(2, 0).unwrap();
        assert_eq!(top, vec![("bob".to_string(), 300), ("carol".to_string(), 200)]);

        let rest = store.leaderboard(10, 2).unwrap();
        assert_eq!(rest, vec![("alice".to_string(), 100)]);

        assert_eq!(store.rank(b.id).unwrap(), 1);
        assert_eq!(store.rank(a.id).unwrap(), 3);
        assert!(store.rank(99).is_err());
    }
}
