//! Index Reconcile Task
//!
//! Background task that periodically removes stale fields from namespace
//! index hashes. TTL expiry removes an entry but never its index field; this
//! sweep is the opt-in way to catch up.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::NamespacedCache;
use crate::store::Store;

/// Spawns a task that reconciles each of `namespaces` every `interval`.
///
/// A namespace that fails to reconcile is logged and retried on the next
/// tick; the task only stops when aborted.
///
/// # Example
/// ```ignore
/// let cache = Arc::new(NamespacedCache::connect(&config).await?);
/// let handle = spawn_reconcile_task(cache.clone(), vec!["orders".into()], Duration::from_secs(60));
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_reconcile_task<S>(
    cache: Arc<NamespacedCache<S>>,
    namespaces: Vec<String>,
    interval: Duration,
) -> JoinHandle<()>
where
    S: Store + 'static,
{
    tokio::spawn(async move {
        info!(
            namespaces = ?namespaces,
            "Starting index reconcile task with interval of {:?}", interval
        );

        loop {
            tokio::time::sleep(interval).await;

            for namespace in &namespaces {
                match cache.reconcile_namespace(namespace).await {
                    Ok(report) if report.removed > 0 => info!(
                        "Index reconcile: removed {} of {} fields from '{}'",
                        report.removed, report.scanned, report.namespace
                    ),
                    Ok(report) => debug!(
                        "Index reconcile: no stale fields in '{}'",
                        report.namespace
                    ),
                    Err(err) => warn!(namespace = %namespace, error = %err, "Index reconcile failed"),
                }
            }
        }
    })
}
