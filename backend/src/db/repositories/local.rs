//! In-memory repository for tests and single-process deployments.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::algorithms::{shuttering_windows, windows::sort_by_start};
use crate::db::repository::{
    Entity, ErrorContext, NightRepository, RepositoryError, RepositoryResult,
};
use crate::models::{
    BlanketClosure, Interval, LaserTarget, LaserTargetId, Night, NightId, Observation,
    PropagationWindow, TimeWindow,
};

#[derive(Debug, Default)]
struct NightData {
    night: Option<Night>,
    laser_targets: BTreeMap<LaserTargetId, LaserTarget>,
    observations: Vec<Observation>,
}

#[derive(Debug)]
struct LocalData {
    nights: BTreeMap<NightId, NightData>,
    closures: Vec<BlanketClosure>,
    next_night_id: i64,
    next_laser_target_id: i64,
}

impl Default for LocalData {
    fn default() -> Self {
        Self {
            nights: BTreeMap::new(),
            closures: Vec::new(),
            next_night_id: 1,
            next_laser_target_id: 1,
        }
    }
}

impl LocalData {
    fn night_data(&self, night_id: NightId, operation: &'static str) -> RepositoryResult<&NightData> {
        self.nights
            .get(&night_id)
            .ok_or_else(|| night_not_found(night_id, operation))
    }

    fn night_data_mut(
        &mut self,
        night_id: NightId,
        operation: &'static str,
    ) -> RepositoryResult<&mut NightData> {
        self.nights
            .get_mut(&night_id)
            .ok_or_else(|| night_not_found(night_id, operation))
    }

    fn closures_overlapping(&self, window: Interval) -> Vec<BlanketClosure> {
        let mut closures: Vec<BlanketClosure> = self
            .closures
            .iter()
            .filter(|c| c.interval().overlaps(&window))
            .copied()
            .collect();
        sort_by_start(&mut closures);
        closures
    }

    /// Recompute shuttering windows of every target of one night.
    fn refresh_shuttering(&mut self, night_id: NightId) {
        let Some(night) = self.nights.get(&night_id).and_then(|d| d.night.clone()) else {
            return;
        };
        let closures = self.closures_overlapping(night.interval());
        if let Some(data) = self.nights.get_mut(&night_id) {
            for target in data.laser_targets.values_mut() {
                target.shuttering_windows =
                    shuttering_windows(&target.propagation_windows, &closures);
            }
        }
    }
}

fn night_not_found(night_id: NightId, operation: &'static str) -> RepositoryError {
    RepositoryError::not_found(
        format!("Night {} does not exist", night_id),
        ErrorContext::new(operation)
            .with_entity(Entity::Night)
            .with_entity_id(night_id),
    )
}

fn laser_target_not_found(
    night_id: NightId,
    target_id: LaserTargetId,
    operation: &'static str,
) -> RepositoryError {
    RepositoryError::not_found(
        format!("Laser target {} does not exist", target_id),
        ErrorContext::new(operation)
            .with_entity(Entity::LaserTarget)
            .with_entity_id(target_id)
            .with_details(format!("night={}", night_id)),
    )
}

/// In-memory [`NightRepository`].
///
/// All data lives behind one lock that is never held across an await point.
#[derive(Debug, Clone, Default)]
pub struct LocalRepository {
    data: Arc<RwLock<LocalData>>,
}

impl LocalRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nights currently stored.
    pub fn night_count(&self) -> usize {
        self.data.read().nights.len()
    }
}

#[async_trait]
impl NightRepository for LocalRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        Ok(true)
    }

    async fn store_night(
        &self,
        site: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepositoryResult<Night> {
        if end <= start {
            return Err(RepositoryError::validation(
                "Night must end after it starts",
                ErrorContext::new("store_night")
                    .with_entity(Entity::Night)
                    .with_details(format!("start={} end={}", start, end)),
            ));
        }

        let mut data = self.data.write();
        let id = NightId(data.next_night_id);
        data.next_night_id += 1;

        let night = Night::new(id, site, start, end);
        data.nights.insert(
            id,
            NightData {
                night: Some(night.clone()),
                ..Default::default()
            },
        );
        Ok(night)
    }

    async fn get_night(&self, night_id: NightId) -> RepositoryResult<Night> {
        let data = self.data.read();
        data.night_data(night_id, "get_night")?
            .night
            .clone()
            .ok_or_else(|| night_not_found(night_id, "get_night"))
    }

    async fn list_nights(&self) -> RepositoryResult<Vec<Night>> {
        let data = self.data.read();
        let mut nights: Vec<Night> = data
            .nights
            .values()
            .filter_map(|d| d.night.clone())
            .collect();
        nights.sort_by_key(|n| n.start);
        Ok(nights)
    }

    async fn record_prediction_sent(
        &self,
        night_id: NightId,
        at: DateTime<Utc>,
    ) -> RepositoryResult<Night> {
        let mut data = self.data.write();
        let night = data
            .night_data_mut(night_id, "record_prediction_sent")?
            .night
            .as_mut()
            .ok_or_else(|| night_not_found(night_id, "record_prediction_sent"))?;
        night.record_prediction_sent(at);
        Ok(night.clone())
    }

    async fn record_acknowledgement(
        &self,
        night_id: NightId,
        at: DateTime<Utc>,
    ) -> RepositoryResult<Night> {
        let mut data = self.data.write();
        let night = data
            .night_data_mut(night_id, "record_acknowledgement")?
            .night
            .as_mut()
            .ok_or_else(|| night_not_found(night_id, "record_acknowledgement"))?;
        night.record_acknowledgement(at);
        Ok(night.clone())
    }

    async fn store_blanket_closure(&self, closure: BlanketClosure) -> RepositoryResult<()> {
        if closure.end <= closure.start {
            return Err(RepositoryError::validation(
                "Blanket closure must end after it starts",
                ErrorContext::new("store_blanket_closure").with_entity(Entity::BlanketClosure),
            ));
        }

        let mut data = self.data.write();
        data.closures.push(closure);

        let affected: Vec<NightId> = data
            .nights
            .iter()
            .filter(|(_, d)| {
                d.night
                    .as_ref()
                    .is_some_and(|n| n.interval().overlaps(&closure.interval()))
            })
            .map(|(id, _)| *id)
            .collect();
        for night_id in affected {
            data.refresh_shuttering(night_id);
        }
        Ok(())
    }

    async fn blanket_closures(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> RepositoryResult<Vec<BlanketClosure>> {
        let range = Interval::new(from, to).ok_or_else(|| {
            RepositoryError::validation(
                "Query range must not end before it starts",
                ErrorContext::new("blanket_closures").with_entity(Entity::BlanketClosure),
            )
        })?;
        Ok(self.data.read().closures_overlapping(range))
    }

    async fn store_laser_target(
        &self,
        night_id: NightId,
        mut target: LaserTarget,
    ) -> RepositoryResult<LaserTarget> {
        let mut data = self.data.write();
        data.night_data(night_id, "store_laser_target")?;

        target.id = LaserTargetId(data.next_laser_target_id);
        data.next_laser_target_id += 1;
        sort_by_start(&mut target.propagation_windows);

        let id = target.id;
        data.night_data_mut(night_id, "store_laser_target")?
            .laser_targets
            .insert(id, target);
        data.refresh_shuttering(night_id);

        data.night_data(night_id, "store_laser_target")?
            .laser_targets
            .get(&id)
            .cloned()
            .ok_or_else(|| laser_target_not_found(night_id, id, "store_laser_target"))
    }

    async fn get_laser_target(
        &self,
        night_id: NightId,
        target_id: LaserTargetId,
    ) -> RepositoryResult<LaserTarget> {
        let data = self.data.read();
        data.night_data(night_id, "get_laser_target")?
            .laser_targets
            .get(&target_id)
            .cloned()
            .ok_or_else(|| laser_target_not_found(night_id, target_id, "get_laser_target"))
    }

    async fn list_laser_targets(&self, night_id: NightId) -> RepositoryResult<Vec<LaserTarget>> {
        let data = self.data.read();
        Ok(data
            .night_data(night_id, "list_laser_targets")?
            .laser_targets
            .values()
            .cloned()
            .collect())
    }

    async fn set_propagation_windows(
        &self,
        night_id: NightId,
        target_id: LaserTargetId,
        mut windows: Vec<PropagationWindow>,
    ) -> RepositoryResult<LaserTarget> {
        if let Some(bad) = windows.iter().find(|w| w.end < w.start) {
            return Err(RepositoryError::validation(
                "Propagation window ends before it starts",
                ErrorContext::new("set_propagation_windows")
                    .with_entity(Entity::LaserTarget)
                    .with_entity_id(target_id)
                    .with_details(format!("start={} end={}", bad.start, bad.end)),
            ));
        }
        sort_by_start(&mut windows);

        let mut data = self.data.write();
        let night = data
            .night_data(night_id, "set_propagation_windows")?
            .night
            .clone()
            .ok_or_else(|| night_not_found(night_id, "set_propagation_windows"))?;
        let closures = data.closures_overlapping(night.interval());

        let target = data
            .night_data_mut(night_id, "set_propagation_windows")?
            .laser_targets
            .get_mut(&target_id)
            .ok_or_else(|| {
                laser_target_not_found(night_id, target_id, "set_propagation_windows")
            })?;
        target.shuttering_windows = shuttering_windows(&windows, &closures);
        target.propagation_windows = windows;
        Ok(target.clone())
    }

    async fn store_observation(
        &self,
        night_id: NightId,
        observation: Observation,
    ) -> RepositoryResult<()> {
        let mut data = self.data.write();
        let night_data = data.night_data_mut(night_id, "store_observation")?;

        if let Some(unknown) = observation
            .laser_targets()
            .into_iter()
            .find(|id| !night_data.laser_targets.contains_key(id))
        {
            return Err(RepositoryError::validation(
                format!("Observation {} is bound to an unknown laser target", observation.id),
                ErrorContext::new("store_observation")
                    .with_entity(Entity::Observation)
                    .with_entity_id(&observation.id)
                    .with_details(format!("laser_target={}", unknown)),
            ));
        }

        night_data.observations.retain(|o| o.id != observation.id);
        night_data.observations.push(observation);
        Ok(())
    }

    async fn observations_for_target(
        &self,
        night_id: NightId,
        target_id: LaserTargetId,
    ) -> RepositoryResult<Vec<Observation>> {
        let data = self.data.read();
        Ok(data
            .night_data(night_id, "observations_for_target")?
            .observations
            .iter()
            .filter(|o| o.laser_targets().contains(&target_id))
            .cloned()
            .collect())
    }
}
