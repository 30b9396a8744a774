//! Interlock heartbeat.
//!
//! Runs on its own task and period, independent of the decision loop, because
//! the interlock shutters the laser by itself when the heartbeat stops.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::live::LiveBoard;
use crate::gateway::{with_timeout, TelescopeGateway};

/// Refresh the heartbeat every `period` until cancelled.
pub async fn run_heartbeat(
    gateway: Arc<dyn TelescopeGateway>,
    board: LiveBoard,
    period: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match with_timeout("update_heartbeat", timeout, gateway.update_heartbeat()).await {
            Ok(()) => {
                board.record_heartbeat(Utc::now());
            }
            Err(error) => {
                warn!(%error, "Heartbeat refresh failed");
                board.mark_heartbeat_stale();
            }
        }
    }
    debug!("Heartbeat task stopped");
}
