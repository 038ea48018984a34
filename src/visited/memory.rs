//! In-memory visited set
//!
//! Claims live in a mutex-guarded map, so deduplication covers every worker
//! in this process and nothing beyond it.

use crate::state::{VisitState, VisitedRecord};
use crate::visited::{claim_expired, VisitedError, VisitedResult, VisitedSet};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use url::Url;

/// Process-local visited set
#[derive(Debug, Default)]
pub struct MemoryVisitedSet {
    records: Mutex<HashMap<String, VisitedRecord>>,
    claim_ttl: Option<Duration>,
}

impl MemoryVisitedSet {
    /// Creates an empty set whose pending claims never expire
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty set whose pending claims expire after `ttl`
    pub fn with_claim_ttl(ttl: Option<Duration>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            claim_ttl: ttl,
        }
    }

    /// Number of URLs with any record
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no URL has ever been claimed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, VisitedRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Moves a pending record to `to`, optionally charging an attempt
    fn finish_claim(&self, url: &Url, to: VisitState, charge: bool) -> VisitedResult<u32> {
        let mut records = self.lock();
        match records.get_mut(url.as_str()) {
            Some(record) if record.state == VisitState::Pending => {
                record.state = to;
                if charge {
                    record.attempts += 1;
                }
                Ok(record.attempts)
            }
            other => Err(VisitedError::InvalidTransition {
                url: url.to_string(),
                from: other.map(|r| r.state),
                to,
            }),
        }
    }
}

#[async_trait]
impl VisitedSet for MemoryVisitedSet {
    async fn try_claim(&self, url: &Url) -> VisitedResult<bool> {
        let mut records = self.lock();
        match records.get_mut(url.as_str()) {
            None => {
                records.insert(url.to_string(), VisitedRecord::pending(url.clone()));
                Ok(true)
            }
            Some(record)
                if record.state.is_claimable()
                    || (record.state == VisitState::Pending
                        && claim_expired(record.claimed_at, self.claim_ttl)) =>
            {
                record.state = VisitState::Pending;
                record.claimed_at = Utc::now();
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    async fn mark_done(&self, url: &Url) -> VisitedResult<()> {
        self.finish_claim(url, VisitState::Done, false).map(|_| ())
    }

    async fn mark_failed(&self, url: &Url) -> VisitedResult<()> {
        self.finish_claim(url, VisitState::Failed, false).map(|_| ())
    }

    async fn release(&self, url: &Url) -> VisitedResult<u32> {
        self.finish_claim(url, VisitState::Released, true)
    }

    async fn unclaim(&self, url: &Url) -> VisitedResult<()> {
        self.finish_claim(url, VisitState::Released, false).map(|_| ())
    }

    async fn reset(&self, url: &Url) -> VisitedResult<bool> {
        Ok(self.lock().remove(url.as_str()).is_some())
    }

    async fn get(&self, url: &Url) -> VisitedResult<Option<VisitedRecord>> {
        Ok(self.lock().get(url.as_str()).cloned())
    }

    async fn count_by_state(&self, state: VisitState) -> VisitedResult<u64> {
        Ok(self.lock().values().filter(|r| r.state == state).count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visited::contract;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_claim_lifecycle() {
        contract::claim_lifecycle(&MemoryVisitedSet::new()).await;
    }

    #[tokio::test]
    async fn test_release_counts_attempts() {
        contract::release_counts_attempts(&MemoryVisitedSet::new()).await;
    }

    #[tokio::test]
    async fn test_invalid_transitions() {
        contract::invalid_transitions(&MemoryVisitedSet::new()).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims() {
        contract::concurrent_claims(Arc::new(MemoryVisitedSet::new())).await;
    }

    #[tokio::test]
    async fn test_expired_claim_can_be_taken_over() {
        let set = MemoryVisitedSet::with_claim_ttl(Some(Duration::from_millis(20)));
        let url = Url::parse("https://example.com/stuck").unwrap();

        assert!(set.try_claim(&url).await.unwrap());
        assert!(!set.try_claim(&url).await.unwrap());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(set.try_claim(&url).await.unwrap());
        assert_eq!(set.len(), 1);
    }
}
