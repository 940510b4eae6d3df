//! Batch driver: deduplicate keys, look each up once, fan results back out.

use crate::cache::RunCache;
use crate::controller::LookupController;
use crate::normalize::ResultRecord;
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tracing::info;

/// Counters printed at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Non-blank keys supplied, duplicates included.
    pub total: usize,
    /// Unique keys looked up.
    pub unique: usize,
    /// Unique keys that produced no usable reply.
    pub errors: usize,
    /// Re-authentications triggered by session expiry.
    pub reauthentications: u32,
    /// Cooldowns taken after HTTP 429.
    pub rate_limit_pauses: u32,
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Summary ===")?;
        writeln!(f, "Total IPs processed (including duplicates): {}", self.total)?;
        writeln!(f, "Unique IPs queried: {}", self.unique)?;
        writeln!(f, "IPs with errors or no data: {}", self.errors)?;
        writeln!(f, "Re-authentication attempts: {}", self.reauthentications)?;
        writeln!(f, "Rate limit pauses: {}", self.rate_limit_pauses)?;
        write!(f, "===============")
    }
}

/// Outcome of a batch.
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// One record per non-blank input key, in input order.
    pub records: Vec<ResultRecord>,
    /// Record per unique key.
    pub cache: RunCache,
    /// Run counters.
    pub summary: BatchSummary,
}

/// Trim keys and drop blanks, keeping duplicates and order.
pub fn clean_keys<S: AsRef<str>>(keys: &[S]) -> Vec<String> {
    keys.iter()
        .map(|key| key.as_ref().trim())
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect()
}

/// Unique keys in first-seen order.
pub fn unique_keys(keys: &[String]) -> Vec<String> {
    let mut seen: HashSet<&String> = HashSet::new();
    keys.iter()
        .filter(|key| seen.insert(*key))
        .cloned()
        .collect()
}

/// Look up every key through `controller`, one at a time.
///
/// Each unique key is queried once and followed by `inter_query_delay`,
/// whatever the outcome. The returned records repeat duplicates so they line
/// up with the input.
pub async fn run_batch<S: AsRef<str>>(
    controller: &mut LookupController,
    keys: &[S],
    inter_query_delay: Duration,
) -> BatchReport {
    let keys = clean_keys(keys);
    let unique = unique_keys(&keys);
    let sleeper = controller.sleeper();
    let mut cache = RunCache::new();

    info!(total = keys.len(), unique = unique.len(), "Starting lookups");

    for (idx, ip) in unique.iter().enumerate() {
        info!("Querying unique IP {} of {}: {}", idx + 1, unique.len(), ip);
        let record = controller.robust_query(ip).await;
        cache.insert(record);
        sleeper.sleep(inter_query_delay).await;
    }

    let records = keys.iter().map(|ip| cache.record_for(ip)).collect();
    let stats = controller.stats();
    let summary = BatchSummary {
        total: keys.len(),
        unique: unique.len(),
        errors: cache.unavailable_count(),
        reauthentications: stats.reauthentications,
        rate_limit_pauses: stats.rate_limit_pauses,
    };

    info!(
        total = summary.total,
        unique = summary.unique,
        errors = summary.errors,
        "Lookups complete"
    );

    BatchReport {
        records,
        cache,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientError;
    use crate::controller::RetryPolicy;
    use crate::session::Credentials;
    use crate::testutil::{RecordingSleeper, ScriptedAuthenticator, ScriptedBackend};
    use std::sync::Arc;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    async fn controller(backend: &ScriptedBackend, sleeper: &Arc<RecordingSleeper>) -> LookupController {
        LookupController::connect(
            Box::new(ScriptedAuthenticator::new()),
            Box::new(backend.clone()),
            sleeper.clone(),
            Credentials::new("analyst@example.com", "secret"),
            RetryPolicy::default(),
        )
        .await
        .unwrap()
    }

    #[test]
    fn test_clean_keys() {
        let keys = clean_keys(&[" 1.1.1.1 ", "", "  ", "2.2.2.2", "1.1.1.1"]);
        assert_eq!(keys, vec!["1.1.1.1", "2.2.2.2", "1.1.1.1"]);
    }

    #[test]
    fn test_unique_keys_preserve_first_seen_order() {
        let keys = clean_keys(&["3.3.3.3", "1.1.1.1", "3.3.3.3", "2.2.2.2", "1.1.1.1"]);
        assert_eq!(unique_keys(&keys), vec!["3.3.3.3", "1.1.1.1", "2.2.2.2"]);
    }

    #[tokio::test]
    async fn test_duplicates_queried_once_and_fanned_out() {
        let backend = ScriptedBackend::new();
        let sleeper = Arc::new(RecordingSleeper::new());
        let mut controller = controller(&backend, &sleeper).await;

        let report = run_batch(
            &mut controller,
            &["8.8.8.8", "1.1.1.1", "8.8.8.8", " ", "1.1.1.1"],
            secs(2),
        )
        .await;

        assert_eq!(backend.calls(), vec!["8.8.8.8", "1.1.1.1"]);
        let ips: Vec<&str> = report.records.iter().map(|r| r.ip.as_str()).collect();
        assert_eq!(ips, vec!["8.8.8.8", "1.1.1.1", "8.8.8.8", "1.1.1.1"]);
        assert_eq!(report.records[0], report.records[2]);
        assert_eq!(report.summary.total, 4);
        assert_eq!(report.summary.unique, 2);
        assert_eq!(report.summary.errors, 0);
        assert_eq!(sleeper.pauses(), vec![secs(2), secs(2)]);
    }

    #[tokio::test]
    async fn test_failed_key_does_not_stop_batch() {
        let backend = ScriptedBackend::new();
        backend.push(Err(ClientError::Status {
            status: 404,
            body: String::new(),
        }));
        let sleeper = Arc::new(RecordingSleeper::new());
        let mut controller = controller(&backend, &sleeper).await;

        let report = run_batch(&mut controller, &["10.0.0.1", "10.0.0.2"], secs(2)).await;

        assert!(report.records[0].is_unavailable());
        assert!(!report.records[1].is_unavailable());
        assert_eq!(report.summary.errors, 1);
        // The pause follows the failed key too.
        assert_eq!(sleeper.pauses(), vec![secs(2), secs(2)]);
    }

    #[tokio::test]
    async fn test_summary_carries_controller_counters() {
        let backend = ScriptedBackend::new();
        backend.push(Err(ClientError::RateLimited));
        let sleeper = Arc::new(RecordingSleeper::new());
        let mut controller = controller(&backend, &sleeper).await;

        let report = run_batch(&mut controller, &["10.0.0.1"], secs(2)).await;

        assert_eq!(report.summary.rate_limit_pauses, 1);
        assert_eq!(report.summary.reauthentications, 0);
        assert_eq!(sleeper.pauses(), vec![secs(60), secs(2)]);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let backend = ScriptedBackend::new();
        let sleeper = Arc::new(RecordingSleeper::new());
        let mut controller = controller(&backend, &sleeper).await;

        let keys: Vec<String> = Vec::new();
        let report = run_batch(&mut controller, &keys, secs(2)).await;

        assert!(report.records.is_empty());
        assert!(report.cache.is_empty());
        assert_eq!(report.summary, BatchSummary::default());
        assert!(sleeper.pauses().is_empty());
    }

    #[test]
    fn test_summary_display() {
        let summary = BatchSummary {
            total: 10,
            unique: 7,
            errors: 1,
            reauthentications: 2,
            rate_limit_pauses: 3,
        };
        let text = summary.to_string();
        assert!(text.contains("Total IPs processed (including duplicates): 10"));
        assert!(text.contains("Unique IPs queried: 7"));
        assert!(text.contains("IPs with errors or no data: 1"));
        assert!(text.contains("Re-authentication attempts: 2"));
        assert!(text.contains("Rate limit pauses: 3"));
    }
}
