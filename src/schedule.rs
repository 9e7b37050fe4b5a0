//! Runtime scheduler for trace-driven bandwidth changes
//!
//! Every trace event gets its own timer, all measured from one start instant
//! captured when the run begins. The timers are joined on the calling task,
//! so a run completes once the latest offset has passed and its change has
//! been issued.

use crate::qdisc::ConditionApplier;
use crate::trace::TraceEvent;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

pub struct ScheduleRunner;

impl ScheduleRunner {
    /// Replay `trace` against `applier`, returning the number of changes
    /// issued. Events with equal offsets may apply in any order. Events whose
    /// deadline cannot be represented as an `Instant` are never reached and
    /// are skipped.
    pub async fn run(trace: &[TraceEvent], applier: &Mutex<ConditionApplier>) -> usize {
        if trace.is_empty() {
            debug!("Empty trace, nothing to schedule");
            return 0;
        }

        let start = Instant::now();
        info!("Scheduling {} trace events", trace.len());

        let events = trace.iter().enumerate().map(|(index, event)| async move {
            let Some(deadline) = start.checked_add(event.offset()) else {
                warn!(
                    "Trace event {} at +{}s is beyond the clock range, skipping",
                    index, event.offset_secs
                );
                return false;
            };
            sleep_until(deadline).await;
            debug!(
                "Trace event {} at +{:.3}s: {:.3} mbit/s",
                index, event.offset_secs, event.bandwidth_mbit
            );
            applier.lock().apply(event.bandwidth_mbit);
            true
        });
        let applied = join_all(events)
            .await
            .into_iter()
            .filter(|applied| *applied)
            .count();

        info!(
            "Trace finished: {} events in {:.3}s",
            applied,
            start.elapsed().as_secs_f64()
        );
        applied
    }
}
