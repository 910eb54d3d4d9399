//! Dedup & fan-out coordinator using the actor pattern.
//!
//! Both delivery paths feed the same coordinator, which decides per channel
//! whether an event is new and fans accepted events out to the registered
//! consumers.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────┐
//! │ Router (push) │──┐  CoordinatorCommand  ┌──────────────────┐  Delivery  ┌────────────┐
//! └───────────────┘  ├────────────────────▶│ CoordinatorActor │───────────▶│ consumer A │
//! ┌───────────────┐  │   (mpsc channel)    │  DedupTable      │ (mpsc per  │ consumer B │
//! │ Poller (poll) │──┘                     │  ConsumerRegistry│  consumer) │ ...        │
//! └───────────────┘                        └────────▲─────────┘            └────────────┘
//!                                                   │ Cleanup (periodic)
//!                                          ┌────────┴─────────┐
//!                                          │   cleanup task   │
//!                                          └──────────────────┘
//! ```
//!
//! The coordinator is constructed explicitly with [`spawn_coordinator`] and
//! passed around by handle; there is no process-wide instance.

use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::DedupConfig;

mod actor;
mod commands;
mod consumers;
mod dedup;
mod handle;

pub use actor::CoordinatorActor;
pub use commands::{
    ConsumerInfo, CoordinatorCommand, CoordinatorError, DeliveryStream, RejectReason,
    SubmitOutcome,
};
pub use consumers::{ConsumerRegistry, DELIVERY_BUFFER};
pub use dedup::DedupTable;
pub use handle::CoordinatorHandle;

const COMMAND_BUFFER: usize = 100;

/// Spawns the coordinator actor and its periodic cleanup task.
///
/// The first cleanup runs one `cleanup_interval` after this call. Both tasks
/// stop on [`CoordinatorHandle::shutdown`].
pub fn spawn_coordinator(config: DedupConfig) -> CoordinatorHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let cancel = CancellationToken::new();

    let actor = CoordinatorActor::new(cmd_rx, config.recent_window(), cancel.clone());
    tokio::spawn(actor.run());

    spawn_cleanup_task(cmd_tx.downgrade(), config, cancel.clone());

    CoordinatorHandle::new(cmd_tx, cancel)
}

/// Holds only a weak sender, so dropping every handle still stops the actor.
fn spawn_cleanup_task(
    sender: mpsc::WeakSender<CoordinatorCommand>,
    config: DedupConfig,
    cancel: CancellationToken,
) {
    let period = config.cleanup_interval();
    let max_age = config.max_age();

    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("Cleanup task stopping: coordinator shut down");
                    break;
                }

                _ = ticker.tick() => {
                    let Some(sender) = sender.upgrade() else {
                        debug!("Cleanup task stopping: all handles dropped");
                        break;
                    };
                    let cmd = CoordinatorCommand::Cleanup { max_age, respond_to: None };
                    if sender.send(cmd).await.is_err() {
                        debug!("Cleanup task stopping: coordinator channel closed");
                        break;
                    }
                }
            }
        }
    });
}
