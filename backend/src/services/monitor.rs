//! Per-night safety monitor.
//!
//! The supervisor owns one [`NightMonitor`] at a time. Each night monitor runs
//! four tasks sharing a [`LiveBoard`]:
//!
//! ```text
//!  heartbeat ───────┐
//!  gateway poll ────┤
//!  collision feed ──┼──► LiveBoard ──► decision loop ──► MonitorEvent
//!  (target reload) ─┘                       │              (broadcast + AlertLog)
//!                                           └──► shutter_laser (auto-shutter)
//! ```
//!
//! Switching nights cancels the running tasks and waits for all of them to
//! finish before the next night's tasks start.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::decision::{evaluate, ShutterReason, Verdict};
use super::events::{Alert, AlertKind, AlertLevel, AlertLog, LoggedEvent, MonitorEvent};
use super::feed_poller::{CollisionFeedPoller, CollisionFeedSource};
use super::gateway_monitor::{run_gateway_poll, GatewayPollSettings};
use super::heartbeat::run_heartbeat;
use super::live::{LiveBoard, Stamped, TargetData};
use super::snapshot::{capture_snapshot, target_changed, SafetyLimits, SafetySnapshot};
use crate::config::LgsConfig;
use crate::db::{NightRepository, RepositoryError};
use crate::gateway::{with_timeout, TelescopeGateway};
use crate::models::{LaserTarget, LaserTargetId, Night, NightId};
use crate::parsing::{CollisionFeed, FeedFormat};

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("No night is being monitored")]
    NoActiveNight,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Periods, deadlines and limits for the monitor tasks.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Site tag whose collision records apply to this laser.
    pub site: String,
    pub limits: SafetyLimits,
    pub auto_shutter: bool,
    pub decision_period: Duration,
    pub warning_horizon: chrono::Duration,
    pub gateway: GatewayPollSettings,
    pub heartbeat_period: Duration,
    pub feed_format: FeedFormat,
    pub feed_period: Duration,
    pub feed_timeout: Duration,
    pub event_capacity: usize,
}

impl MonitorSettings {
    pub fn from_config(config: &LgsConfig) -> Self {
        Self {
            site: config.site.name.clone(),
            limits: SafetyLimits::from_config(config),
            auto_shutter: config.safety.auto_shutter,
            decision_period: config.safety.decision_period(),
            warning_horizon: config.safety.warning_horizon(),
            gateway: GatewayPollSettings {
                address: config.gateway.address.clone(),
                period: config.gateway.poll_period(),
                timeout: config.gateway.timeout(),
            },
            heartbeat_period: config.gateway.heartbeat_period(),
            feed_format: config.collision_feed.format,
            feed_period: config.collision_feed.poll_period(),
            feed_timeout: config.collision_feed.timeout(),
            event_capacity: AlertLog::DEFAULT_CAPACITY,
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::from_config(&LgsConfig::default())
    }
}

/// Latest decision, as served to clients.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MonitorStatus {
    pub snapshot: Option<SafetySnapshot>,
    pub verdict: Option<Verdict>,
}

/// Shared view of the monitor. Cheap to clone.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    board: LiveBoard,
    auto_shutter: Arc<AtomicBool>,
    selection: Arc<RwLock<Option<LaserTargetId>>>,
    status: Arc<RwLock<MonitorStatus>>,
    events: broadcast::Sender<MonitorEvent>,
    log: AlertLog,
}

impl MonitorHandle {
    pub fn new(auto_shutter: bool, event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            board: LiveBoard::new(),
            auto_shutter: Arc::new(AtomicBool::new(auto_shutter)),
            selection: Arc::new(RwLock::new(None)),
            status: Arc::new(RwLock::new(MonitorStatus::default())),
            events,
            log: AlertLog::new(event_capacity),
        }
    }

    pub fn board(&self) -> &LiveBoard {
        &self.board
    }

    pub fn auto_shutter(&self) -> bool {
        self.auto_shutter.load(Ordering::SeqCst)
    }

    pub fn set_auto_shutter(&self, enabled: bool) {
        let previous = self.auto_shutter.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            info!(enabled, "Auto-shutter changed");
        }
    }

    pub fn selected_target(&self) -> Option<LaserTargetId> {
        *self.selection.read()
    }

    /// Change the monitored laser target. Data loaded for the previous one is
    /// dropped so it is never evaluated against the new selection.
    fn select(&self, target: Option<LaserTargetId>) {
        let mut selection = self.selection.write();
        *selection = target;
        self.board.clear_target();
    }

    /// Run `update` on the board only if `target` is still the selection.
    ///
    /// The selection lock is held throughout, so a concurrent [`select`]
    /// cannot slip in between the check and the update.
    ///
    /// [`select`]: Self::select
    fn update_if_selected<R>(
        &self,
        target: LaserTargetId,
        update: impl FnOnce(&LiveBoard) -> R,
    ) -> Option<R> {
        let selection = self.selection.read();
        (*selection == Some(target)).then(|| update(&self.board))
    }

    pub fn status(&self) -> MonitorStatus {
        self.status.read().clone()
    }

    pub fn latest_verdict(&self) -> Option<Verdict> {
        self.status.read().verdict.clone()
    }

    pub fn latest_snapshot(&self) -> Option<SafetySnapshot> {
        self.status.read().snapshot.clone()
    }

    pub fn collisions(&self) -> Option<Stamped<CollisionFeed>> {
        self.board.collisions()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &AlertLog {
        &self.log
    }

    pub fn recent_events(&self, limit: usize) -> Vec<LoggedEvent> {
        self.log.recent(limit)
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.log.alerts()
    }

    fn emit(&self, event: MonitorEvent) {
        debug!(event = event.name(), "Monitor event");
        self.log.push(event.clone());
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn record(&self, snapshot: SafetySnapshot, verdict: Verdict) {
        *self.status.write() = MonitorStatus {
            snapshot: Some(snapshot),
            verdict: Some(verdict),
        };
    }

    fn reset_status(&self) {
        *self.status.write() = MonitorStatus::default();
    }
}

/// Tasks of one monitored night.
pub struct NightMonitor {
    night: NightId,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl NightMonitor {
    pub fn night(&self) -> NightId {
        self.night
    }

    /// Cancel every task and wait until all of them have exited.
    pub async fn stop(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(night = %self.night, error = %e, "Monitor task panicked");
            }
        }
        debug!(night = %self.night, "Night monitor stopped");
    }
}

/// Starts, switches and stops night monitors.
pub struct MonitorSupervisor {
    repository: Arc<dyn NightRepository>,
    gateway: Arc<dyn TelescopeGateway>,
    feed_source: Option<Arc<dyn CollisionFeedSource>>,
    settings: MonitorSettings,
    handle: MonitorHandle,
    current: tokio::sync::Mutex<Option<NightMonitor>>,
}

impl MonitorSupervisor {
    pub fn new(
        repository: Arc<dyn NightRepository>,
        gateway: Arc<dyn TelescopeGateway>,
        feed_source: Option<Arc<dyn CollisionFeedSource>>,
        settings: MonitorSettings,
    ) -> Self {
        let handle = MonitorHandle::new(settings.auto_shutter, settings.event_capacity);
        Self {
            repository,
            gateway,
            feed_source,
            settings,
            handle,
            current: tokio::sync::Mutex::new(None),
        }
    }

    pub fn handle(&self) -> &MonitorHandle {
        &self.handle
    }

    pub fn repository(&self) -> &Arc<dyn NightRepository> {
        &self.repository
    }

    pub async fn current_night(&self) -> Option<NightId> {
        self.current.lock().await.as_ref().map(NightMonitor::night)
    }

    /// Start monitoring `night_id`, stopping the current night first.
    pub async fn start_night(&self, night_id: NightId) -> Result<Night, MonitorError> {
        let night = self.repository.get_night(night_id).await?;

        let mut current = self.current.lock().await;
        if let Some(previous) = current.take() {
            previous.stop().await;
        }

        self.handle.select(None);
        self.handle.reset_status();
        self.handle.board.set_night(Some(night.clone()));
        self.handle.emit(MonitorEvent::NightChanged {
            at: Utc::now(),
            night: Some(night.id),
        });

        *current = Some(self.spawn(&night));
        info!(night = %night.id, site = %night.site, "Monitoring night");
        Ok(night)
    }

    /// Monitor `target`, or nothing. The target must belong to the current night.
    pub async fn select_target(
        &self,
        target: Option<LaserTargetId>,
    ) -> Result<Option<LaserTarget>, MonitorError> {
        let night = self.handle.board.night().ok_or(MonitorError::NoActiveNight)?;
        let selected = match target {
            Some(id) => Some(self.repository.get_laser_target(night.id, id).await?),
            None => None,
        };
        self.handle.select(target);
        info!(night = %night.id, target = ?target, "Laser target selected");
        Ok(selected)
    }

    /// Stop monitoring. The laser is left as it is.
    pub async fn stop(&self) {
        let mut current = self.current.lock().await;
        if let Some(previous) = current.take() {
            let night = previous.night();
            previous.stop().await;
            self.handle.select(None);
            self.handle.board.set_night(None);
            self.handle.emit(MonitorEvent::NightChanged {
                at: Utc::now(),
                night: None,
            });
            info!(night = %night, "Monitoring stopped");
        }
    }

    fn spawn(&self, night: &Night) -> NightMonitor {
        let cancel = CancellationToken::new();
        let board = self.handle.board.clone();
        let settings = &self.settings;
        let mut tasks = Vec::with_capacity(4);

        tasks.push(tokio::spawn(run_heartbeat(
            self.gateway.clone(),
            board.clone(),
            settings.heartbeat_period,
            settings.gateway.timeout,
            cancel.child_token(),
        )));
        tasks.push(tokio::spawn(run_gateway_poll(
            self.gateway.clone(),
            board.clone(),
            settings.gateway.clone(),
            cancel.child_token(),
        )));
        match &self.feed_source {
            Some(source) => {
                let poller = CollisionFeedPoller::new(
                    source.clone(),
                    settings.feed_format,
                    settings.feed_timeout,
                )
                .with_site(settings.site.clone());
                tasks.push(tokio::spawn(poller.run(
                    board,
                    settings.feed_period,
                    cancel.child_token(),
                )));
            }
            None => warn!("No collision feed configured; propagation stays blocked"),
        }

        let decision = DecisionLoop {
            repository: self.repository.clone(),
            gateway: self.gateway.clone(),
            handle: self.handle.clone(),
            settings: settings.clone(),
            previous_snapshot: None,
            previous_verdict: None,
            warned_transition: None,
        };
        tasks.push(tokio::spawn(decision.run(cancel.child_token())));

        NightMonitor {
            night: night.id,
            cancel,
            tasks,
        }
    }
}

/// Evaluates the board every decision period and acts on the verdict.
struct DecisionLoop {
    repository: Arc<dyn NightRepository>,
    gateway: Arc<dyn TelescopeGateway>,
    handle: MonitorHandle,
    settings: MonitorSettings,
    previous_snapshot: Option<SafetySnapshot>,
    previous_verdict: Option<Verdict>,
    /// Transition already announced by an upcoming-shutter alert.
    warned_transition: Option<DateTime<Utc>>,
}

impl DecisionLoop {
    async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = interval(self.settings.decision_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.cycle(Utc::now()).await;
        }
        debug!("Decision loop stopped");
    }

    async fn cycle(&mut self, now: DateTime<Utc>) {
        self.reload_target(now).await;

        let snapshot = capture_snapshot(
            &self.handle.board,
            now,
            self.settings.limits,
            self.handle.auto_shutter(),
        );
        if target_changed(self.previous_snapshot.as_ref(), &snapshot) {
            self.handle.emit(MonitorEvent::TargetChanged {
                at: now,
                night: snapshot.night_id(),
                target: snapshot.target_id(),
            });
        }

        let verdict = evaluate(&snapshot, now);
        let changed = self
            .previous_verdict
            .as_ref()
            .map_or(true, |previous| !previous.same_outcome(&verdict));
        if changed {
            let reasons: Vec<&str> = verdict.reasons.iter().map(ShutterReason::code).collect();
            info!(state = ?verdict.state, ?reasons, "Verdict changed");
            self.handle.emit(MonitorEvent::VerdictChanged {
                verdict: verdict.clone(),
            });
        }

        self.alert_stale_producers(&verdict, now);
        self.alert_upcoming_shutter(&verdict, now);

        let laser_open = snapshot
            .gateway
            .as_ref()
            .and_then(|g| g.value.laser_open)
            .unwrap_or(false);
        if snapshot.auto_shutter && !verdict.is_propagate() && laser_open {
            self.shutter(&verdict, now).await;
        }

        self.handle.record(snapshot.clone(), verdict.clone());
        self.previous_snapshot = Some(snapshot);
        self.previous_verdict = Some(verdict);
    }

    /// Refresh the selected target's windows and the night's closures.
    async fn reload_target(&self, now: DateTime<Utc>) {
        let board = &self.handle.board;
        let (Some(night), Some(target_id)) = (board.night(), self.handle.selected_target()) else {
            board.clear_target();
            return;
        };

        let load = async {
            let target = self.repository.get_laser_target(night.id, target_id).await?;
            let closures = self.repository.blanket_closures(night.start, night.end).await?;
            Ok::<_, RepositoryError>(TargetData { target, closures })
        };
        let applied = match tokio::time::timeout(self.settings.gateway.timeout, load).await {
            Ok(Ok(data)) => self.handle.update_if_selected(target_id, |board| {
                board.publish_target(data, now);
            }),
            Ok(Err(e)) => {
                warn!(error = %e, target = %target_id, "Failed to reload propagation data");
                self.handle
                    .update_if_selected(target_id, LiveBoard::mark_target_stale)
            }
            Err(_) => {
                warn!(target = %target_id, "Propagation data reload timed out");
                self.handle
                    .update_if_selected(target_id, LiveBoard::mark_target_stale)
            }
        };
        if applied.is_none() {
            debug!(target = %target_id, "Selection changed during reload, result dropped");
        }
    }

    /// One alert per producer when it first goes stale.
    fn alert_stale_producers(&self, verdict: &Verdict, now: DateTime<Utc>) {
        let already = |reason: &ShutterReason| {
            self.previous_verdict
                .as_ref()
                .is_some_and(|p| p.reasons.iter().any(|r| r.code() == reason.code()))
        };
        for reason in verdict.reasons.iter().filter(|r| r.is_stale_producer()) {
            if already(reason) {
                continue;
            }
            warn!(reason = reason.code(), "Producer stale");
            self.handle.emit(MonitorEvent::Alert {
                alert: Alert {
                    at: now,
                    level: AlertLevel::Critical,
                    kind: AlertKind::StaleProducer {
                        reason: reason.clone(),
                    },
                    message: format!("Input unavailable: {}", reason.code()),
                },
            });
        }
    }

    fn alert_upcoming_shutter(&mut self, verdict: &Verdict, now: DateTime<Utc>) {
        if !verdict.is_propagate() {
            return;
        }
        let Some(at) = verdict.next_transition else {
            return;
        };
        if at - now > self.settings.warning_horizon || self.warned_transition == Some(at) {
            return;
        }
        self.warned_transition = Some(at);
        let seconds = (at - now).num_seconds();
        info!(%at, seconds, "Shutter coming up");
        self.handle.emit(MonitorEvent::Alert {
            alert: Alert {
                at: now,
                level: AlertLevel::Warning,
                kind: AlertKind::UpcomingShutter { at },
                message: format!("Laser must shutter in {} s", seconds),
            },
        });
    }

    async fn shutter(&self, verdict: &Verdict, now: DateTime<Utc>) {
        let timeout = self.settings.gateway.timeout;
        match with_timeout("shutter_laser", timeout, self.gateway.shutter_laser()).await {
            Ok(()) => {
                let reasons: Vec<&str> = verdict.reasons.iter().map(ShutterReason::code).collect();
                warn!(?reasons, "Laser shuttered");
                self.handle.emit(MonitorEvent::ShutterCommanded {
                    at: now,
                    reasons: verdict.reasons.clone(),
                });
            }
            Err(e) => {
                error!(error = %e, "Failed to shutter laser");
                self.handle.emit(MonitorEvent::ShutterFailed {
                    at: now,
                    error: e.to_string(),
                });
            }
        }
    }
}
