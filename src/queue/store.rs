//! Queue store backends.
//!
//! The queue layer only needs a handful of list and sorted-set primitives:
//!
//! - Append to the tail or push to the head of a named list
//! - Pop the head of a list, blocking for a bounded time (atomic across consumers)
//! - Due-time ordered sets for delayed delivery, with an atomic "promote due" move
//!
//! # Key Structure
//!
//! - `{queue}`: live list, consumed from the head
//! - `{queue}:dlq`: dead letter list
//! - `{queue}:delayed`: delayed set scored by due time in epoch milliseconds
//!
//! `RedisQueueStore` is the production backend. `MemoryQueueStore` mirrors the
//! same semantics in-process and backs the test suite and single-process runs.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::QueueError;

/// Moves due members of a delayed set to the tail of the live list atomically.
const PROMOTE_DUE_SCRIPT: &str = r"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, ARGV[2])
for _, entry in ipairs(due) do
    redis.call('ZREM', KEYS[1], entry)
    redis.call('RPUSH', KEYS[2], entry)
end
return #due
";

/// List and sorted-set primitives the queue layer is built on.
///
/// Entries are opaque serialized envelopes.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Appends an entry to the tail of a list.
    async fn push_back(&self, key: &str, entry: String) -> Result<(), QueueError>;

    /// Pushes an entry to the head of a list.
    async fn push_front(&self, key: &str, entry: String) -> Result<(), QueueError>;

    /// Pops the head of a list, waiting up to `wait` for an entry to arrive.
    ///
    /// Returns `Ok(None)` when the wait expires.
    async fn pop_front(&self, key: &str, wait: Duration) -> Result<Option<String>, QueueError>;

    /// Pops the head of a list without waiting.
    async fn try_pop_front(&self, key: &str) -> Result<Option<String>, QueueError>;

    /// Returns the length of a list.
    async fn len(&self, key: &str) -> Result<usize, QueueError>;

    /// Returns up to `limit` entries from the head of a list without removing them.
    async fn peek(&self, key: &str, limit: usize) -> Result<Vec<String>, QueueError>;

    /// Adds an entry to a delayed set, due at `due_at_ms` (epoch milliseconds).
    async fn schedule(&self, key: &str, entry: String, due_at_ms: i64) -> Result<(), QueueError>;

    /// Moves up to `limit` entries due at or before `now_ms` from the delayed set
    /// to the tail of `target`, earliest due first. Returns the number moved.
    async fn promote_due(
        &self,
        delayed_key: &str,
        target: &str,
        now_ms: i64,
        limit: usize,
    ) -> Result<usize, QueueError>;

    /// Returns the number of entries waiting in a delayed set.
    async fn scheduled_len(&self, key: &str) -> Result<usize, QueueError>;
}

/// Redis-backed queue store.
pub struct RedisQueueStore {
    /// Redis connection manager (handles reconnection automatically).
    redis: ConnectionManager,
    promote_script: redis::Script,
}

impl RedisQueueStore {
    /// Connects to Redis.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::ConnectionFailed` if the connection fails.
    pub async fn connect(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| QueueError::ConnectionFailed(e.to_string()))?;

        let redis = ConnectionManager::new(client)
            .await
            .map_err(|e| QueueError::ConnectionFailed(e.to_string()))?;

        Ok(Self::from_connection(redis))
    }

    /// Creates a store from an existing ConnectionManager.
    ///
    /// Useful when sharing a connection with the trend store.
    pub fn from_connection(redis: ConnectionManager) -> Self {
        Self {
            redis,
            promote_script: redis::Script::new(PROMOTE_DUE_SCRIPT),
        }
    }

    /// Returns a handle to the underlying connection.
    pub fn connection(&self) -> ConnectionManager {
        self.redis.clone()
    }
}

#[async_trait]
impl QueueStore for RedisQueueStore {
    async fn push_back(&self, key: &str, entry: String) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();
        conn.rpush::<_, _, ()>(key, entry).await?;
        Ok(())
    }

    async fn push_front(&self, key: &str, entry: String) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();
        conn.lpush::<_, _, ()>(key, entry).await?;
        Ok(())
    }

    async fn pop_front(&self, key: &str, wait: Duration) -> Result<Option<String>, QueueError> {
        let mut conn = self.redis.clone();
        // BLPOP treats 0 as "block forever"
        let timeout_secs = wait.as_secs().max(1);

        let result: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(key)
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await?;

        Ok(result.map(|(_, entry)| entry))
    }

    async fn try_pop_front(&self, key: &str) -> Result<Option<String>, QueueError> {
        let mut conn = self.redis.clone();
        let entry: Option<String> = redis::cmd("LPOP").arg(key).query_async(&mut conn).await?;
        Ok(entry)
    }

    async fn len(&self, key: &str) -> Result<usize, QueueError> {
        let mut conn = self.redis.clone();
        let len: usize = conn.llen(key).await?;
        Ok(len)
    }

    async fn peek(&self, key: &str, limit: usize) -> Result<Vec<String>, QueueError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.redis.clone();
        let entries: Vec<String> = conn.lrange(key, 0, limit as isize - 1).await?;
        Ok(entries)
    }

    async fn schedule(&self, key: &str, entry: String, due_at_ms: i64) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();
        redis::cmd("ZADD")
            .arg(key)
            .arg(due_at_ms)
            .arg(entry)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn promote_due(
        &self,
        delayed_key: &str,
        target: &str,
        now_ms: i64,
        limit: usize,
    ) -> Result<usize, QueueError> {
        if limit == 0 {
            return Ok(0);
        }
        let mut conn = self.redis.clone();
        let moved: usize = self
            .promote_script
            .key(delayed_key)
            .key(target)
            .arg(now_ms)
            .arg(limit)
            .invoke_async(&mut conn)
            .await?;
        Ok(moved)
    }

    async fn scheduled_len(&self, key: &str) -> Result<usize, QueueError> {
        let mut conn = self.redis.clone();
        let len: usize = redis::cmd("ZCARD").arg(key).query_async(&mut conn).await?;
        Ok(len)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    lists: HashMap<String, VecDeque<String>>,
    /// Delayed sets ordered by (due time, insertion sequence).
    delayed: HashMap<String, BTreeMap<(i64, u64), String>>,
    next_seq: u64,
}

/// In-process queue store with the same semantics as the Redis backend.
///
/// Blocking pops are woken by pushes through a shared `Notify`.
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    state: Mutex<MemoryState>,
    pushed: Notify,
}

impl MemoryQueueStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, QueueError> {
        self.state
            .lock()
            .map_err(|e| QueueError::Unavailable(e.to_string()))
    }

    fn pop_now(&self, key: &str) -> Result<Option<String>, QueueError> {
        let mut state = self.state()?;
        Ok(state.lists.get_mut(key).and_then(VecDeque::pop_front))
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn push_back(&self, key: &str, entry: String) -> Result<(), QueueError> {
        self.state()?
            .lists
            .entry(key.to_string())
            .or_default()
            .push_back(entry);
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn push_front(&self, key: &str, entry: String) -> Result<(), QueueError> {
        self.state()?
            .lists
            .entry(key.to_string())
            .or_default()
            .push_front(entry);
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn pop_front(&self, key: &str, wait: Duration) -> Result<Option<String>, QueueError> {
        let deadline = Instant::now() + wait;

        loop {
            // Register interest before checking so a push in between is not missed
            let notified = self.pushed.notified();

            if let Some(entry) = self.pop_now(key)? {
                return Ok(Some(entry));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn try_pop_front(&self, key: &str) -> Result<Option<String>, QueueError> {
        self.pop_now(key)
    }

    async fn len(&self, key: &str) -> Result<usize, QueueError> {
        Ok(self.state()?.lists.get(key).map_or(0, VecDeque::len))
    }

    async fn peek(&self, key: &str, limit: usize) -> Result<Vec<String>, QueueError> {
        Ok(self
            .state()?
            .lists
            .get(key)
            .map(|list| list.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn schedule(&self, key: &str, entry: String, due_at_ms: i64) -> Result<(), QueueError> {
        let mut state = self.state()?;
        let seq = state.next_seq;
        state.next_seq += 1;
        state
            .delayed
            .entry(key.to_string())
            .or_default()
            .insert((due_at_ms, seq), entry);
        Ok(())
    }

    async fn promote_due(
        &self,
        delayed_key: &str,
        target: &str,
        now_ms: i64,
        limit: usize,
    ) -> Result<usize, QueueError> {
        let moved = {
            let mut state = self.state()?;
            let due: Vec<String> = match state.delayed.get_mut(delayed_key) {
                Some(set) => {
                    let keys: Vec<(i64, u64)> = set
                        .range(..=(now_ms, u64::MAX))
                        .take(limit)
                        .map(|(key, _)| *key)
                        .collect();
                    keys.iter().filter_map(|key| set.remove(key)).collect()
                }
                None => Vec::new(),
            };

            let count = due.len();
            if count > 0 {
                state
                    .lists
                    .entry(target.to_string())
                    .or_default()
                    .extend(due);
            }
            count
        };

        if moved > 0 {
            self.pushed.notify_waiters();
        }
        Ok(moved)
    }

    async fn scheduled_len(&self, key: &str) -> Result<usize, QueueError> {
        Ok(self.state()?.delayed.get(key).map_or(0, BTreeMap::len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_memory_push_and_pop_order() {
        let store = MemoryQueueStore::new();
        store.push_back("q", "a".to_string()).await.unwrap();
        store.push_back("q", "b".to_string()).await.unwrap();
        store.push_front("q", "urgent".to_string()).await.unwrap();

        assert_eq!(store.len("q").await.unwrap(), 3);
        assert_eq!(
            store.peek("q", 10).await.unwrap(),
            vec!["urgent".to_string(), "a".to_string(), "b".to_string()]
        );

        let wait = Duration::from_millis(10);
        assert_eq!(store.pop_front("q", wait).await.unwrap().as_deref(), Some("urgent"));
        assert_eq!(store.pop_front("q", wait).await.unwrap().as_deref(), Some("a"));
        assert_eq!(store.try_pop_front("q").await.unwrap().as_deref(), Some("b"));
        assert_eq!(store.len("q").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_memory_pop_times_out_on_empty_list() {
        let store = MemoryQueueStore::new();
        let started = std::time::Instant::now();

        let entry = store.pop_front("empty", Duration::from_millis(50)).await.unwrap();

        assert!(entry.is_none());
        assert!(started.elapsed() >= Duration::from_millis(45));
    }

    #[tokio::test]
    async fn test_memory_pop_wakes_on_push() {
        let store = Arc::new(MemoryQueueStore::new());
        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.pop_front("q", Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.push_back("q", "late".to_string()).await.unwrap();

        let entry = waiter.await.unwrap().unwrap();
        assert_eq!(entry.as_deref(), Some("late"));
    }

    #[tokio::test]
    async fn test_memory_concurrent_pops_are_exclusive() {
        let store = Arc::new(MemoryQueueStore::new());
        for i in 0..20 {
            store.push_back("q", i.to_string()).await.unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(entry) = store.pop_front("q", Duration::from_millis(10)).await.unwrap() {
                    seen.push(entry);
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        all.sort_by_key(|entry| entry.parse::<u32>().unwrap());
        let expected: Vec<String> = (0..20).map(|i| i.to_string()).collect();
        assert_eq!(all, expected);
    }

    #[tokio::test]
    async fn test_memory_promote_due_moves_only_due_entries() {
        let store = MemoryQueueStore::new();
        store.schedule("q:delayed", "late".to_string(), 2_000).await.unwrap();
        store.schedule("q:delayed", "first".to_string(), 500).await.unwrap();
        store.schedule("q:delayed", "second".to_string(), 1_000).await.unwrap();
        store.push_back("q", "live".to_string()).await.unwrap();

        let moved = store.promote_due("q:delayed", "q", 1_000, 10).await.unwrap();

        assert_eq!(moved, 2);
        assert_eq!(store.scheduled_len("q:delayed").await.unwrap(), 1);
        assert_eq!(
            store.peek("q", 10).await.unwrap(),
            vec!["live".to_string(), "first".to_string(), "second".to_string()]
        );
    }

    #[tokio::test]
    async fn test_memory_promote_due_respects_limit() {
        let store = MemoryQueueStore::new();
        for due in [10, 20, 30] {
            store
                .schedule("q:delayed", format!("due-{}", due), due)
                .await
                .unwrap();
        }

        assert_eq!(store.promote_due("q:delayed", "q", 100, 2).await.unwrap(), 2);
        assert_eq!(store.promote_due("q:delayed", "q", 100, 0).await.unwrap(), 0);
        assert_eq!(store.scheduled_len("q:delayed").await.unwrap(), 1);
        assert_eq!(
            store.peek("q", 10).await.unwrap(),
            vec!["due-10".to_string(), "due-20".to_string()]
        );
    }

    #[tokio::test]
    async fn test_memory_promote_due_missing_set() {
        let store = MemoryQueueStore::new();
        assert_eq!(store.promote_due("none", "q", 100, 10).await.unwrap(), 0);
        assert_eq!(store.len("q").await.unwrap(), 0);
    }
}
