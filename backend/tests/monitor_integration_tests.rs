//! Night supervisor driven end to end with the simulated gateway and an
//! in-memory collision feed. Runs on paused time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use lgs_rust::config::LgsConfig;
use lgs_rust::db::{LocalRepository, NightRepository, RepositoryResult};
use lgs_rust::gateway::SimulatedGateway;
use lgs_rust::models::{
    BlanketClosure, Coordinates, LaserTarget, LaserTargetId, LaserTargetKind, Night, NightId,
    Observation, PropagationWindow, Visibility,
};
use lgs_rust::services::{
    AlertKind, FeedError, MonitorError, MonitorEvent, MonitorSettings, MonitorSupervisor,
    ShutterReason, StaticFeedSource,
};

const TARGET: Coordinates = Coordinates::RaDec { ra: 83.0, dec: -5.0 };

/// In-memory store whose reads can be held open to mimic a slow backend.
#[derive(Default)]
struct SlowRepository {
    inner: LocalRepository,
    /// Delay on every laser-target read while set.
    target_delay: Mutex<Option<Duration>>,
    /// Delay on the next closure query only.
    next_closures_delay: Mutex<Option<Duration>>,
    /// Reads currently held open.
    held: AtomicUsize,
}

impl SlowRepository {
    async fn hold(&self, delay: Option<Duration>) {
        if let Some(delay) = delay {
            self.held.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            self.held.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn held(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NightRepository for SlowRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        self.inner.health_check().await
    }

    async fn store_night(
        &self,
        site: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepositoryResult<Night> {
        self.inner.store_night(site, start, end).await
    }

    async fn get_night(&self, night_id: NightId) -> RepositoryResult<Night> {
        self.inner.get_night(night_id).await
    }

    async fn list_nights(&self) -> RepositoryResult<Vec<Night>> {
        self.inner.list_nights().await
    }

    async fn record_prediction_sent(
        &self,
        night_id: NightId,
        at: DateTime<Utc>,
    ) -> RepositoryResult<Night> {
        self.inner.record_prediction_sent(night_id, at).await
    }

    async fn record_acknowledgement(
        &self,
        night_id: NightId,
        at: DateTime<Utc>,
    ) -> RepositoryResult<Night> {
        self.inner.record_acknowledgement(night_id, at).await
    }

    async fn store_blanket_closure(&self, closure: BlanketClosure) -> RepositoryResult<()> {
        self.inner.store_blanket_closure(closure).await
    }

    async fn blanket_closures(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> RepositoryResult<Vec<BlanketClosure>> {
        let delay = self.next_closures_delay.lock().take();
        self.hold(delay).await;
        self.inner.blanket_closures(from, to).await
    }

    async fn store_laser_target(
        &self,
        night_id: NightId,
        target: LaserTarget,
    ) -> RepositoryResult<LaserTarget> {
        self.inner.store_laser_target(night_id, target).await
    }

    async fn get_laser_target(
        &self,
        night_id: NightId,
        target_id: LaserTargetId,
    ) -> RepositoryResult<LaserTarget> {
        let delay = *self.target_delay.lock();
        self.hold(delay).await;
        self.inner.get_laser_target(night_id, target_id).await
    }

    async fn list_laser_targets(&self, night_id: NightId) -> RepositoryResult<Vec<LaserTarget>> {
        self.inner.list_laser_targets(night_id).await
    }

    async fn set_propagation_windows(
        &self,
        night_id: NightId,
        target_id: LaserTargetId,
        windows: Vec<PropagationWindow>,
    ) -> RepositoryResult<LaserTarget> {
        self.inner
            .set_propagation_windows(night_id, target_id, windows)
            .await
    }

    async fn store_observation(
        &self,
        night_id: NightId,
        observation: Observation,
    ) -> RepositoryResult<()> {
        self.inner.store_observation(night_id, observation).await
    }

    async fn observations_for_target(
        &self,
        night_id: NightId,
        target_id: LaserTargetId,
    ) -> RepositoryResult<Vec<Observation>> {
        self.inner.observations_for_target(night_id, target_id).await
    }
}

struct Fixture {
    repository: Arc<SlowRepository>,
    gateway: SimulatedGateway,
    feed: StaticFeedSource,
    supervisor: MonitorSupervisor,
    night: NightId,
    target: LaserTargetId,
}

fn settings(auto_shutter: bool) -> MonitorSettings {
    let mut config = LgsConfig::default();
    config.safety.auto_shutter = auto_shutter;
    config.safety.decision_period_ms = 100;
    config.gateway.poll_period_ms = 50;
    config.gateway.heartbeat_period_ms = 50;
    config.gateway.timeout_ms = 50;
    config.collision_feed.poll_period_secs = 1;
    MonitorSettings::from_config(&config)
}

/// Settings whose timeouts outlast any delay injected by [`SlowRepository`].
fn patient_settings() -> MonitorSettings {
    let mut settings = settings(false);
    settings.gateway.timeout = Duration::from_secs(5);
    settings
}

impl Fixture {
    /// One night around now with one target whose window ends `window_left` from now.
    async fn new(auto_shutter: bool, window_left: chrono::Duration) -> Self {
        Self::with_settings(settings(auto_shutter), window_left).await
    }

    async fn with_settings(settings: MonitorSettings, window_left: chrono::Duration) -> Self {
        let now = Utc::now();
        let repository = Arc::new(SlowRepository::default());
        let night = repository
            .store_night("GS", now - chrono::Duration::hours(1), now + chrono::Duration::hours(10))
            .await
            .unwrap();
        let target = repository
            .store_laser_target(
                night.id,
                LaserTarget::new(
                    LaserTargetId(0),
                    LaserTargetKind::RaDec,
                    TARGET,
                    Visibility::default(),
                ),
            )
            .await
            .unwrap();
        repository
            .set_propagation_windows(
                night.id,
                target.id,
                vec![PropagationWindow::new(
                    now - chrono::Duration::minutes(10),
                    now + window_left,
                )],
            )
            .await
            .unwrap();

        let gateway = SimulatedGateway::new();
        gateway.set_live_telescope(true);
        gateway.set_pointing(TARGET);
        gateway.set_laser_open(true);
        let feed = StaticFeedSource::new("NONE");

        let supervisor = MonitorSupervisor::new(
            repository.clone(),
            Arc::new(gateway.clone()),
            Some(Arc::new(feed.clone())),
            settings,
        );

        Self {
            repository,
            gateway,
            feed,
            supervisor,
            night: night.id,
            target: target.id,
        }
    }

    async fn start(&self) {
        self.supervisor.start_night(self.night).await.unwrap();
        self.supervisor.select_target(Some(self.target)).await.unwrap();
    }

    async fn close_now(&self) {
        let now = Utc::now();
        self.repository
            .store_blanket_closure(BlanketClosure::new(
                now - chrono::Duration::minutes(1),
                now + chrono::Duration::minutes(30),
            ))
            .await
            .unwrap();
    }

    fn events(&self) -> Vec<MonitorEvent> {
        self.supervisor
            .handle()
            .recent_events(1000)
            .into_iter()
            .map(|e| e.event)
            .collect()
    }
}

fn reason_codes(fixture: &Fixture) -> Vec<&'static str> {
    fixture
        .supervisor
        .handle()
        .latest_verdict()
        .map(|v| v.reasons.iter().map(ShutterReason::code).collect())
        .unwrap_or_default()
}

#[tokio::test(start_paused = true)]
async fn test_healthy_inputs_propagate() {
    let fx = Fixture::new(false, chrono::Duration::hours(2)).await;
    fx.start().await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    let verdict = fx.supervisor.handle().latest_verdict().unwrap();
    assert!(verdict.is_propagate(), "{:?}", verdict.reasons);
    assert_eq!(verdict.night, Some(fx.night));
    assert_eq!(verdict.target, Some(fx.target));
    assert!(fx.gateway.heartbeat_count() > 0);

    fx.supervisor.stop().await;
    assert_eq!(fx.supervisor.current_night().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_auto_shutter_closes_laser_in_closure() {
    let fx = Fixture::new(true, chrono::Duration::hours(2)).await;
    fx.start().await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(fx.gateway.is_laser_open());

    fx.close_now().await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(reason_codes(&fx).contains(&"in_shuttering_window"));
    assert!(fx.gateway.shutter_count() >= 1);
    assert!(!fx.gateway.is_laser_open());
    assert!(fx
        .events()
        .iter()
        .any(|e| matches!(e, MonitorEvent::ShutterCommanded { .. })));

    fx.supervisor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_disabled_auto_shutter_only_reports() {
    let fx = Fixture::new(false, chrono::Duration::hours(2)).await;
    fx.start().await;
    fx.close_now().await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    let verdict = fx.supervisor.handle().latest_verdict().unwrap();
    assert!(!verdict.is_propagate());
    assert_eq!(fx.gateway.shutter_count(), 0);
    assert!(fx.gateway.is_laser_open());

    // Enabling it at runtime takes effect on the next cycle.
    fx.supervisor.handle().set_auto_shutter(true);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(fx.gateway.shutter_count() >= 1);

    fx.supervisor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_feed_poll_raises_stale_alert() {
    let fx = Fixture::new(false, chrono::Duration::hours(2)).await;
    fx.start().await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(fx.supervisor.handle().latest_verdict().unwrap().is_propagate());

    fx.feed.set_error(FeedError::Status(503));
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert!(reason_codes(&fx).contains(&"collision_feed_stale"));
    let stale_alerts: Vec<_> = fx
        .supervisor
        .handle()
        .alerts()
        .into_iter()
        .filter(|a| {
            matches!(
                &a.kind,
                AlertKind::StaleProducer {
                    reason: ShutterReason::CollisionFeedStale
                }
            )
        })
        .collect();
    // Raised once, not on every cycle.
    assert_eq!(stale_alerts.len(), 1);

    fx.supervisor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_upcoming_shutter_is_announced_once() {
    let fx = Fixture::new(false, chrono::Duration::seconds(30)).await;
    fx.start().await;
    tokio::time::sleep(Duration::from_millis(800)).await;

    let upcoming = fx
        .supervisor
        .handle()
        .alerts()
        .into_iter()
        .filter(|a| matches!(a.kind, AlertKind::UpcomingShutter { .. }))
        .count();
    assert_eq!(upcoming, 1);

    fx.supervisor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_switching_nights_resets_selection() {
    let fx = Fixture::new(false, chrono::Duration::hours(2)).await;
    fx.start().await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let now = Utc::now();
    let second = fx
        .repository
        .store_night("GS", now + chrono::Duration::hours(20), now + chrono::Duration::hours(30))
        .await
        .unwrap();
    fx.supervisor.start_night(second.id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(fx.supervisor.current_night().await, Some(second.id));
    assert_eq!(fx.supervisor.handle().selected_target(), None);
    assert_eq!(reason_codes(&fx).first(), Some(&"no_target_selected"));

    let nights: Vec<Option<NightId>> = fx
        .events()
        .into_iter()
        .filter_map(|e| match e {
            MonitorEvent::NightChanged { night, .. } => Some(night),
            _ => None,
        })
        .collect();
    assert_eq!(nights, vec![Some(fx.night), Some(second.id)]);

    fx.supervisor.stop().await;
}

#[tokio::test]
async fn test_selection_needs_a_night() {
    let fx = Fixture::new(false, chrono::Duration::hours(2)).await;
    let result = fx.supervisor.select_target(Some(fx.target)).await;
    assert!(matches!(result, Err(MonitorError::NoActiveNight)));
}

#[tokio::test(start_paused = true)]
async fn test_subscribers_receive_verdict_changes() {
    let fx = Fixture::new(false, chrono::Duration::hours(2)).await;
    let mut events = fx.supervisor.handle().subscribe();
    fx.start().await;

    let verdict = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(MonitorEvent::VerdictChanged { verdict }) = events.recv().await {
                return verdict;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(verdict.night, Some(fx.night));
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_continues_while_decision_stalls() {
    let fx = Fixture::with_settings(patient_settings(), chrono::Duration::hours(2)).await;
    fx.start().await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(fx.gateway.heartbeat_count() > 0);

    *fx.repository.target_delay.lock() = Some(Duration::from_secs(3));
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(fx.repository.held(), 1, "decision loop should be waiting on the store");

    let before = fx.gateway.heartbeat_count();
    tokio::time::sleep(Duration::from_secs(1)).await;

    // Still stuck in the same reload, while heartbeats keep their 50 ms cadence.
    assert_eq!(fx.repository.held(), 1);
    assert!(
        fx.gateway.heartbeat_count() - before >= 15,
        "only {} heartbeats during the stall",
        fx.gateway.heartbeat_count() - before
    );
    let heartbeat = fx.supervisor.handle().board().read().heartbeat.unwrap();
    assert!(!heartbeat.stale);

    *fx.repository.target_delay.lock() = None;
    fx.supervisor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_night_switch_never_overlaps_heartbeats() {
    let fx = Fixture::new(false, chrono::Duration::hours(2)).await;
    // Each heartbeat stays open for most of its 50 ms period.
    fx.gateway.set_heartbeat_latency(Duration::from_millis(30));
    fx.start().await;
    tokio::time::sleep(Duration::from_millis(260)).await;

    let now = Utc::now();
    let mut nights = Vec::new();
    for offset in 0..4 {
        let night = fx
            .repository
            .store_night(
                "GS",
                now + chrono::Duration::hours(20 + offset),
                now + chrono::Duration::hours(30 + offset),
            )
            .await
            .unwrap();
        nights.push(night.id);
    }

    // Switch at different points of the heartbeat cycle, some mid-update.
    let mut switched_at = 0;
    for night in nights {
        fx.supervisor.start_night(night).await.unwrap();
        switched_at = fx.gateway.heartbeat_count();
        tokio::time::sleep(Duration::from_millis(13)).await;
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(fx.gateway.max_heartbeats_in_flight(), 1);
    assert!(fx.gateway.heartbeat_count() > switched_at);

    fx.supervisor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_reload_for_previous_selection_is_not_published() {
    let fx = Fixture::with_settings(patient_settings(), chrono::Duration::hours(2)).await;
    let other = fx
        .repository
        .store_laser_target(
            fx.night,
            LaserTarget::new(
                LaserTargetId(0),
                LaserTargetKind::RaDec,
                Coordinates::RaDec { ra: 120.0, dec: 10.0 },
                Visibility::default(),
            ),
        )
        .await
        .unwrap();

    fx.supervisor.start_night(fx.night).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    // The first reload of the original target hangs on the closure query.
    *fx.repository.next_closures_delay.lock() = Some(Duration::from_millis(500));
    fx.supervisor.select_target(Some(fx.target)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(fx.repository.held(), 1);

    fx.supervisor.select_target(Some(other.id)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let targets: Vec<Option<LaserTargetId>> = fx
        .events()
        .into_iter()
        .filter_map(|e| match e {
            MonitorEvent::TargetChanged { target, .. } => Some(target),
            _ => None,
        })
        .collect();
    assert!(!targets.contains(&Some(fx.target)), "{:?}", targets);
    assert_eq!(targets.last(), Some(&Some(other.id)));
    assert_eq!(
        fx.supervisor.handle().board().read().target.map(|t| t.value.target.id),
        Some(other.id)
    );

    fx.supervisor.stop().await;
}
