//! Greedy online grouping of observation targets into shared laser targets.
//!
//! Targets arrive one at a time and are never re-clustered. A target joins the
//! nearest existing group whose center is strictly closer than the configured
//! maximum distance, otherwise it starts a new group. Joining re-centers the
//! group on the mean of its members' raw coordinates.
//!
//! Distances are planar Euclidean on the two coordinate axes. Group radii are
//! small compared to the sphere, so this approximation is accepted.
//!
//! Because the process is order dependent, two groups may drift toward each
//! other and end up closer than the threshold without ever merging.
//!
//! Laser targets are stored in an append-only arena. Re-centering pushes a new
//! laser target and repoints every member of the group at it through the
//! binding table; earlier records stay in the arena untouched.

use std::collections::HashMap;

use crate::models::{
    Coordinates, Frame, LaserTarget, LaserTargetId, LaserTargetKind, ObservationTarget,
    ObservationTargetId, Visibility,
};

use super::geometry::planar_distance;

#[derive(Debug, Clone)]
struct Member {
    target: ObservationTargetId,
    axes: (f64, f64),
}

#[derive(Debug, Clone)]
struct Group {
    kind: LaserTargetKind,
    /// Members of one group always share a frame, so their axes can be averaged.
    frame: Frame,
    /// Index into the center arena.
    center: usize,
    /// Indices into the member list.
    members: Vec<usize>,
}

/// Live set of groups built from observation targets in arrival order.
#[derive(Debug, Clone)]
pub struct TargetGrouping {
    max_distance: f64,
    centers: Vec<LaserTarget>,
    groups: Vec<Group>,
    members: Vec<Member>,
    /// Member index -> group index.
    member_group: Vec<usize>,
    /// Latest member index for each observation target id.
    by_target: HashMap<ObservationTargetId, usize>,
}

impl TargetGrouping {
    pub fn new(max_distance: f64) -> Self {
        Self {
            max_distance,
            centers: Vec::new(),
            groups: Vec::new(),
            members: Vec::new(),
            member_group: Vec::new(),
            by_target: HashMap::new(),
        }
    }

    pub fn max_distance(&self) -> f64 {
        self.max_distance
    }

    /// Add one target and return the laser target now representing it.
    ///
    /// `visibility` is only used when the target starts a new group; joining
    /// an existing group keeps that group's visibility.
    pub fn add_observation_target(
        &mut self,
        target: &ObservationTarget,
        visibility: Visibility,
    ) -> &LaserTarget {
        let kind = target.laser_target_kind();
        let frame = target.coordinates.frame();
        let axes = target.coordinates.axes();

        let member = self.members.len();
        self.members.push(Member {
            target: target.id,
            axes,
        });
        self.by_target.insert(target.id, member);

        let group = match self.nearest_group(kind, frame, axes) {
            Some(group) => {
                self.groups[group].members.push(member);
                self.member_group.push(group);
                self.recenter(group);
                group
            }
            None => {
                let center = self.push_center(kind, target.coordinates, visibility);
                self.groups.push(Group {
                    kind,
                    frame,
                    center,
                    members: vec![member],
                });
                let group = self.groups.len() - 1;
                self.member_group.push(group);
                group
            }
        };

        &self.centers[self.groups[group].center]
    }

    /// Current laser target of an observation target, if it has been added.
    pub fn laser_target_for(&self, target: ObservationTargetId) -> Option<&LaserTarget> {
        let member = *self.by_target.get(&target)?;
        let group = self.member_group[member];
        Some(&self.centers[self.groups[group].center])
    }

    /// Current centers, one per group, in group creation order.
    pub fn laser_targets(&self) -> Vec<&LaserTarget> {
        self.groups
            .iter()
            .map(|g| &self.centers[g.center])
            .collect()
    }

    /// `(observation target, current laser target id)` for every member.
    pub fn bindings(&self) -> Vec<(ObservationTargetId, LaserTargetId)> {
        self.members
            .iter()
            .zip(&self.member_group)
            .map(|(m, &g)| (m.target, self.centers[self.groups[g].center].id))
            .collect()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Number of laser targets ever created, including superseded centers.
    pub fn created_count(&self) -> usize {
        self.centers.len()
    }

    fn nearest_group(&self, kind: LaserTargetKind, frame: Frame, axes: (f64, f64)) -> Option<usize> {
        self.groups
            .iter()
            .enumerate()
            .filter(|(_, g)| g.kind == kind && g.frame == frame)
            .map(|(i, g)| (i, planar_distance(self.centers[g.center].coordinates.axes(), axes)))
            .filter(|&(_, d)| d < self.max_distance)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    fn push_center(
        &mut self,
        kind: LaserTargetKind,
        coordinates: Coordinates,
        visibility: Visibility,
    ) -> usize {
        // Provisional ids are arena positions; the store assigns persistent ones.
        let id = LaserTargetId(self.centers.len() as i64 + 1);
        self.centers
            .push(LaserTarget::new(id, kind, coordinates, visibility));
        self.centers.len() - 1
    }

    fn recenter(&mut self, group: usize) {
        let members = &self.groups[group].members;
        let n = members.len() as f64;
        let (sum_a, sum_b) = members.iter().fold((0.0, 0.0), |(a, b), &m| {
            let (x, y) = self.members[m].axes;
            (a + x, b + y)
        });

        let frame = self.groups[group].frame;
        let old = &self.centers[self.groups[group].center];
        let kind = old.kind;
        let visibility = old.visibility.clone();

        let center = self.push_center(
            kind,
            Coordinates::from_axes(frame, sum_a / n, sum_b / n),
            visibility,
        );
        self.groups[group].center = center;
    }
}
