use super::VoteStore;
use crate::error::{Result, VoteError};
use crate::models::{NewVote, RecordId, VoteInserted, VoteRecord};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use uuid::Uuid;

const FEED_CAPACITY: usize = 64;

/// In-process `votes` table. Assigns ids and timestamps the way the hosted
/// service does and publishes an insert notification for every write.
pub struct MemoryStore {
    rows: Mutex<Vec<VoteRecord>>,
    feed: broadcast::Sender<VoteInserted>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    insert_delay: Mutex<Option<Duration>>,
    lookups: AtomicUsize,
    inserts: AtomicUsize,
    scans: Mutex<Vec<Instant>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            rows: Mutex::new(Vec::new()),
            feed,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            insert_delay: Mutex::new(None),
            lookups: AtomicUsize::new(0),
            inserts: AtomicUsize::new(0),
            scans: Mutex::new(Vec::new()),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert notifications for every row written from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<VoteInserted> {
        self.feed.subscribe()
    }

    /// Adds a row directly, as another client would, and notifies subscribers.
    pub fn seed(&self, option_id: i64, fingerprint: &str) {
        let record = VoteRecord {
            id: RecordId::Text(Uuid::new_v4().to_string()),
            option_id,
            voter_ip: None,
            user_agent: Some(fingerprint.to_string()),
            created_at: Some(Utc::now()),
        };
        lock(&self.rows).push(record.clone());
        let _ = self.feed.send(VoteInserted {
            record: Some(record),
        });
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn delay_inserts(&self, delay: Duration) {
        *lock(&self.insert_delay) = Some(delay);
    }

    pub fn rows(&self) -> Vec<VoteRecord> {
        lock(&self.rows).clone()
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    /// When each full scan ran.
    pub fn scan_times(&self) -> Vec<Instant> {
        lock(&self.scans).clone()
    }

    fn unavailable() -> VoteError {
        VoteError::Service {
            status: 503,
            body: "memory store unavailable".to_string(),
        }
    }
}

#[async_trait]
impl VoteStore for MemoryStore {
    async fn find_vote(&self, fingerprint: &str) -> Result<bool> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        Ok(lock(&self.rows)
            .iter()
            .any(|row| row.user_agent.as_deref() == Some(fingerprint)))
    }

    async fn option_ids(&self) -> Result<Vec<i64>> {
        lock(&self.scans).push(Instant::now());
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        Ok(lock(&self.rows).iter().map(|row| row.option_id).collect())
    }

    async fn insert_vote(&self, vote: NewVote) -> Result<()> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.insert_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        let record = VoteRecord {
            id: RecordId::Text(Uuid::new_v4().to_string()),
            option_id: vote.option_id.0,
            voter_ip: vote.voter_ip,
            user_agent: Some(vote.user_agent),
            created_at: Some(Utc::now()),
        };
        lock(&self.rows).push(record.clone());
        let _ = self.feed.send(VoteInserted {
            record: Some(record),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OptionId;

    #[tokio::test]
    async fn insert_assigns_ids_and_notifies() {
        let store = MemoryStore::new();
        let mut feed = store.subscribe();

        store.insert_vote(NewVote::new(OptionId(2), "fp-1")).await.unwrap();

        let rows = store.rows();
        assert_eq!(rows.len(), 1);
        assert!(matches!(rows[0].id, RecordId::Text(_)));
        assert!(rows[0].created_at.is_some());
        assert!(rows[0].voter_ip.is_none());

        let event = feed.recv().await.unwrap();
        assert_eq!(event.record.map(|r| r.option_id), Some(2));
        assert!(store.find_vote("fp-1").await.unwrap());
        assert!(!store.find_vote("fp-2").await.unwrap());
        assert_eq!(store.option_ids().await.unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn injected_failures() {
        let store = MemoryStore::new();
        store.fail_writes(true);
        assert!(store.insert_vote(NewVote::new(OptionId(1), "fp")).await.is_err());
        assert!(store.rows().is_empty());
        assert_eq!(store.insert_count(), 1);

        store.fail_reads(true);
        assert!(store.find_vote("fp").await.is_err());
        assert!(store.option_ids().await.is_err());
    }
}
