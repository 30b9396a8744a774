//! Service layer for orchestration and live safety decisions.
//!
//! This module sits between the repository, the telescope gateway and the
//! HTTP layer. Producers publish their latest values to the [`LiveBoard`];
//! the decision loop snapshots the board, computes a [`Verdict`] and reports
//! through [`MonitorEvent`]s.

pub mod collector;
pub mod decision;
pub mod events;
pub mod feed_poller;
pub mod gateway_monitor;
pub mod heartbeat;
pub mod live;
pub mod monitor;
pub mod snapshot;

pub use collector::{collect_observations, CollectionResult, SkipReason, VisibilityCalculator};
pub use decision::{evaluate, ShutterReason, Verdict, VerdictState};
pub use events::{Alert, AlertKind, AlertLevel, AlertLog, LoggedEvent, MonitorEvent};
pub use feed_poller::{
    CollisionFeedPoller, CollisionFeedSource, FeedError, HttpFeedSource, StaticFeedSource,
};
pub use gateway_monitor::{read_gateway, GatewayPollSettings};
pub use live::{GatewayReading, LiveBoard, Stamped, TargetData};
pub use monitor::{MonitorError, MonitorHandle, MonitorSettings, MonitorStatus, MonitorSupervisor};
pub use snapshot::{capture_snapshot, SafetyLimits, SafetySnapshot};
