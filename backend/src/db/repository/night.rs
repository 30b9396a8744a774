//! Entity-store trait for nights and everything created for them.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::RepositoryResult;
use crate::models::{
    BlanketClosure, LaserTarget, LaserTargetId, Night, NightId, Observation, PropagationWindow,
};

/// Storage for nights, their laser targets and observations, and the
/// site-wide blanket closures.
///
/// Laser targets are scoped to a night. Ids handed in by callers (for example
/// the provisional ids produced by target clustering) are replaced by
/// persistent ids on store.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` to work with async Rust.
#[async_trait]
pub trait NightRepository: Send + Sync {
    /// Check that the store is reachable.
    async fn health_check(&self) -> RepositoryResult<bool>;

    // ==================== Nights ====================

    /// Create a night and return it with its assigned id.
    async fn store_night(
        &self,
        site: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepositoryResult<Night>;

    async fn get_night(&self, night_id: NightId) -> RepositoryResult<Night>;

    /// All nights, oldest start first.
    async fn list_nights(&self) -> RepositoryResult<Vec<Night>>;

    /// Record that a prediction request went out for the night.
    async fn record_prediction_sent(
        &self,
        night_id: NightId,
        at: DateTime<Utc>,
    ) -> RepositoryResult<Night>;

    /// Record that the space-traffic authority acknowledged the night's request.
    async fn record_acknowledgement(
        &self,
        night_id: NightId,
        at: DateTime<Utc>,
    ) -> RepositoryResult<Night>;

    // ==================== Blanket closures ====================

    /// Add a blanket closure. Shuttering windows of every affected laser
    /// target are recomputed.
    async fn store_blanket_closure(&self, closure: BlanketClosure) -> RepositoryResult<()>;

    /// Closures strictly overlapping `[from, to]`, start-ascending.
    async fn blanket_closures(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> RepositoryResult<Vec<BlanketClosure>>;

    // ==================== Laser targets ====================

    /// Store a laser target under the night and return it with its
    /// persistent id.
    async fn store_laser_target(
        &self,
        night_id: NightId,
        target: LaserTarget,
    ) -> RepositoryResult<LaserTarget>;

    async fn get_laser_target(
        &self,
        night_id: NightId,
        target_id: LaserTargetId,
    ) -> RepositoryResult<LaserTarget>;

    async fn list_laser_targets(&self, night_id: NightId) -> RepositoryResult<Vec<LaserTarget>>;

    /// Replace the propagation windows of a laser target and recompute its
    /// shuttering windows from them and the night's blanket closures.
    async fn set_propagation_windows(
        &self,
        night_id: NightId,
        target_id: LaserTargetId,
        windows: Vec<PropagationWindow>,
    ) -> RepositoryResult<LaserTarget>;

    // ==================== Observations ====================

    async fn store_observation(
        &self,
        night_id: NightId,
        observation: Observation,
    ) -> RepositoryResult<()>;

    /// Observations with at least one target bound to `target_id`.
    async fn observations_for_target(
        &self,
        night_id: NightId,
        target_id: LaserTargetId,
    ) -> RepositoryResult<Vec<Observation>>;

    /// Store a clustering result: every laser target, then every
    /// observation with its target bindings rewritten to persistent ids.
    ///
    /// Returns the provisional-to-persistent id mapping.
    async fn store_collection(
        &self,
        night_id: NightId,
        laser_targets: &[LaserTarget],
        observations: &[Observation],
    ) -> RepositoryResult<HashMap<LaserTargetId, LaserTargetId>> {
        let mut ids = HashMap::with_capacity(laser_targets.len());
        for target in laser_targets {
            let stored = self.store_laser_target(night_id, target.clone()).await?;
            ids.insert(target.id, stored.id);
        }
        for observation in observations {
            let mut observation = observation.clone();
            for target in &mut observation.targets {
                target.laser_target = target.laser_target.and_then(|id| ids.get(&id).copied());
            }
            self.store_observation(night_id, observation).await?;
        }
        Ok(ids)
    }
}
