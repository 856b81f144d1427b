//! Dispatch loop connecting the watcher to the pipeline.

use crate::watcher::ReceiptWatcher;
use std::time::Duration;
use tally_core::{CompletionProvider, LayoutOcr, Pipeline};

/// Interval for polling file system events.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Drain settled arrivals and run each through the pipeline, one invocation
/// per accepted event. Runs until the surrounding task is cancelled; one
/// receipt's failure never stops the loop.
pub async fn run_loop<O, C>(mut watcher: ReceiptWatcher, pipeline: Pipeline<O, C>)
where
    O: LayoutOcr,
    C: CompletionProvider,
{
    let mut interval = tokio::time::interval(POLL_INTERVAL);
    loop {
        interval.tick().await;

        for request in watcher.poll_arrivals() {
            tracing::debug!("Dispatching {:?} (arrived {})", request.path, request.arrived_at);
            match pipeline.process(&request.path).await {
                Ok(Some(record)) => {
                    tracing::info!(
                        "Processed {} (sum {:.2}, reconciliation {})",
                        record.file_name,
                        record.calculated_items_sum,
                        if record.reconciliation_passed { "passed" } else { "failed" }
                    );
                }
                // The skip reason was already logged by the pipeline
                Ok(None) => {}
                Err(err) => tracing::warn!("Failed to process {:?}: {}", request.path, err),
            }
        }
    }
}
