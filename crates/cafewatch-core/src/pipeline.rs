//! Frame orchestrator: feeds one frame of perception output through the
//! identity resolver and the monitors, in dependency order.

use crate::config::MonitorConfig;
use crate::cup::{CupLifecycleMonitor, Payout};
use crate::effects::{Effect, Outbox};
use crate::identity::{FaceSighting, IdentityResolver, ResolvedPerson};
use crate::phone::PhoneUsageMonitor;
use crate::roster::{Roster, RosterDiff};
use crate::source::{FaceDetection, FrameInput};
use crate::types::{BoundingBox, ObjectClass};
use crate::visitor::VisitorCounter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome of processing one frame.
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub frame_index: u64,
    pub timestamp: f64,
    pub people: Vec<ResolvedPerson>,
    pub payouts: Vec<Payout>,
    /// Side effects in emission order.
    pub effects: Vec<Effect>,
}

/// Live summary published to operators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub frames_processed: u64,
    pub last_timestamp: f64,
    pub visitors_total: u64,
    pub occupancy: usize,
    pub roster_size: usize,
    pub scores: BTreeMap<String, u32>,
    pub phone_violations: Vec<String>,
}

pub struct Monitor {
    config: MonitorConfig,
    roster: Roster,
    identities: IdentityResolver,
    phones: PhoneUsageMonitor,
    visitors: VisitorCounter,
    cups: CupLifecycleMonitor,
    scores: BTreeMap<String, u32>,
    frame_index: u64,
    last_timestamp: f64,
    occupancy: usize,
    last_stats: Option<f64>,
}

impl Monitor {
    pub fn new(config: MonitorConfig, roster: Roster) -> Self {
        let scores = roster.names().into_iter().map(|n| (n.to_string(), 0)).collect();
        Self {
            identities: IdentityResolver::new(config.identity.clone()),
            phones: PhoneUsageMonitor::new(config.phone.clone()),
            visitors: VisitorCounter::new(config.visitor.clone(), config.identity.face_tolerance),
            cups: CupLifecycleMonitor::new(config.cup.clone()),
            config,
            roster,
            scores,
            frame_index: 0,
            last_timestamp: 0.0,
            occupancy: 0,
            last_stats: None,
        }
    }

    /// Run every component over one frame and collect the resulting effects.
    pub fn process(&mut self, frame: &FrameInput) -> FrameReport {
        let index = self.frame_index;
        self.frame_index += 1;
        let now = frame.timestamp;
        self.last_timestamp = now;

        let mut out = Outbox::new();
        let people_tracks = frame.of_class(ObjectClass::Person);
        let cup_tracks = frame.of_class(ObjectClass::Cup);
        let phones: Vec<BoundingBox> = frame
            .of_class(ObjectClass::Phone)
            .iter()
            .map(|o| o.bbox)
            .collect();

        let cadence = self.config.identity.face_every_n_frames.max(1);
        let sightings = (index % cadence == 0).then(|| self.match_faces(&frame.faces));

        let people = self.identities.resolve(&people_tracks, sightings.as_deref());
        self.phones.update(now, &people, &phones, &mut out);
        self.visitors.update(&people, &self.identities, &mut out);
        let payouts = self.cups.update(now, index, &cup_tracks, &people, &mut out);

        for payout in &payouts {
            *self.scores.entry(payout.maker.clone()).or_insert(0) += 1;
        }

        self.occupancy = people.len();
        self.flush_stats(now, &mut out);

        tracing::trace!(
            frame = index,
            people = people.len(),
            cups = cup_tracks.len(),
            phones = phones.len(),
            effects = out.effects().len(),
            "frame processed"
        );

        FrameReport {
            frame_index: index,
            timestamp: now,
            people,
            payouts,
            effects: out.into_effects(),
        }
    }

    fn match_faces(&self, faces: &[FaceDetection]) -> Vec<FaceSighting> {
        let tolerance = self.config.identity.face_tolerance;
        faces
            .iter()
            .map(|f| FaceSighting {
                bbox: f.bbox,
                name: self.roster.identify(&f.descriptor, tolerance).map(String::from),
                descriptor: f.descriptor.clone(),
            })
            .collect()
    }

    /// Aggregate visitor sample, at most once per configured interval.
    fn flush_stats(&mut self, now: f64, out: &mut Outbox) {
        let Some(last) = self.last_stats else {
            self.last_stats = Some(now);
            return;
        };
        if now - last > self.config.stats.interval_secs {
            self.last_stats = Some(now);
            out.visitor_stats(&self.config.stats.camera_id, self.visitors.total(), self.occupancy);
        }
    }

    /// Install a reloaded roster. New names start with a zero score.
    pub fn replace_roster(&mut self, roster: Roster) -> RosterDiff {
        let diff = self.roster.replace(roster);
        for name in &diff.added {
            self.scores.entry(name.clone()).or_insert(0);
        }
        tracing::info!(size = self.roster.len(), added = ?diff.added, "roster replaced");
        diff
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            frames_processed: self.frame_index,
            last_timestamp: self.last_timestamp,
            visitors_total: self.visitors.total(),
            occupancy: self.occupancy,
            roster_size: self.roster.len(),
            scores: self.scores.clone(),
            phone_violations: self.phones.in_violation(),
        }
    }

    pub fn scores(&self) -> &BTreeMap<String, u32> {
        &self.scores
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn cups(&self) -> &CupLifecycleMonitor {
        &self.cups
    }

    pub fn frames_processed(&self) -> u64 {
        self.frame_index
    }
}
