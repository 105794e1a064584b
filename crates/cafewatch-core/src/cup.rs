//! Cup lifecycle monitor: dwell time in the production zone, maker
//! attribution, lost-track recovery and payout cooldown.
//!
//! Tracker flicker (a hand occluding the cup) is the dominant failure mode.
//! A cup that vanishes or leaves the zone before the production threshold is
//! parked as a [`LostCupRecord`]; a new track appearing close to it within
//! the record's lifetime inherits its entry time and maker, so one physical
//! cup yields one production cycle. A still-tracked cup that jitters back
//! into the zone reclaims its own record the same way.

use crate::config::CupConfig;
use crate::effects::{EmployeeStatus, EventKind, Outbox};
use crate::geometry::{nearest_person, PersonPoint};
use crate::identity::{Identity, ResolvedPerson};
use crate::types::{Point, TrackId, TrackedObject};
use std::collections::{HashMap, HashSet};

/// Progress of a cup that disappeared before it could be credited.
#[derive(Debug, Clone, PartialEq)]
pub struct LostCupRecord {
    /// Track that was parked.
    pub track_id: TrackId,
    pub position: Point,
    pub entry_at: f64,
    pub lost_at: f64,
    pub maker: Option<String>,
}

/// A credited production cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Payout {
    pub track_id: TrackId,
    pub maker: String,
    pub dwell_secs: f64,
}

#[derive(Debug, Clone)]
struct CupState {
    entry_at: f64,
    /// Entry time came from a recovered cup and survives the next zone entry.
    inherited: bool,
    in_zone: bool,
    maker: Option<String>,
    last_seen_frame: u64,
    position: Point,
    last_payout: Option<f64>,
}

impl CupState {
    fn fresh(now: f64, position: Point, frame_index: u64) -> Self {
        Self {
            entry_at: now,
            inherited: false,
            in_zone: false,
            maker: None,
            last_seen_frame: frame_index,
            position,
            last_payout: None,
        }
    }
}

pub struct CupLifecycleMonitor {
    config: CupConfig,
    cups: HashMap<TrackId, CupState>,
    lost: Vec<LostCupRecord>,
}

impl CupLifecycleMonitor {
    pub fn new(config: CupConfig) -> Self {
        Self {
            config,
            cups: HashMap::new(),
            lost: Vec::new(),
        }
    }

    /// Process this frame's cup tracks. `people` must already be
    /// identity-resolved for the same frame.
    pub fn update(
        &mut self,
        now: f64,
        frame_index: u64,
        cups: &[&TrackedObject],
        people: &[ResolvedPerson],
        out: &mut Outbox,
    ) -> Vec<Payout> {
        let mut payouts = Vec::new();
        let seen: HashSet<TrackId> = cups.iter().map(|c| c.track_id).collect();

        // Retire vanished cups first so their lost records are available to
        // tracks that replace them in this same frame.
        self.retire_missing(now, frame_index, &seen, out, &mut payouts);
        self.prune_lost(now);

        let candidates: Vec<PersonPoint<&Identity>> = people
            .iter()
            .map(|p| PersonPoint {
                center: p.center,
                identity: &p.identity,
            })
            .collect();

        for cup in cups {
            let position = cup.center();
            let in_zone = self.config.zone.contains(&position);

            let fresh = !self.cups.contains_key(&cup.track_id);
            if fresh {
                let state = self.recover(now, frame_index, position, &seen);
                self.cups.insert(cup.track_id, state);
            }
            let Some(state) = self.cups.get_mut(&cup.track_id) else {
                continue;
            };

            let was_in_zone = state.in_zone;
            state.position = position;
            state.last_seen_frame = frame_index;

            if in_zone {
                if !was_in_zone && !fresh {
                    let parked = self.lost.iter().position(|r| r.track_id == cup.track_id);
                    if let Some(idx) = parked {
                        let record = self.lost.remove(idx);
                        tracing::debug!(
                            track = cup.track_id,
                            entry_at = record.entry_at,
                            "cup re-entered zone, resuming cycle"
                        );
                        state.entry_at = record.entry_at;
                    } else if !state.inherited {
                        state.entry_at = now;
                    }
                }
                state.in_zone = true;

                let nearest = nearest_person(&position, &candidates, self.config.attribution_distance);
                if let Some(maker) = nearest.and_then(Identity::staff_name) {
                    if state.maker.as_deref() != Some(maker) {
                        tracing::debug!(track = cup.track_id, maker, "cup maker assigned");
                        state.maker = Some(maker.to_string());
                    }
                }
            } else if was_in_zone {
                state.in_zone = false;
                payouts.extend(settle(cup.track_id, state, now, &self.config, &mut self.lost, out));
                state.inherited = false;
            }
        }

        payouts
    }

    /// Forced exit for cups missing longer than the grace window, then
    /// removal of all their per-track state.
    fn retire_missing(
        &mut self,
        now: f64,
        frame_index: u64,
        seen: &HashSet<TrackId>,
        out: &mut Outbox,
        payouts: &mut Vec<Payout>,
    ) {
        let grace = self.config.missing_grace_frames;
        let mut gone: Vec<TrackId> = self
            .cups
            .iter()
            .filter(|(id, s)| !seen.contains(*id) && frame_index.saturating_sub(s.last_seen_frame) > grace)
            .map(|(id, _)| *id)
            .collect();
        gone.sort_unstable();

        for track_id in gone {
            let Some(mut state) = self.cups.remove(&track_id) else {
                continue;
            };
            tracing::trace!(track = track_id, in_zone = state.in_zone, "cup track gone");
            if state.in_zone {
                payouts.extend(settle(track_id, &mut state, now, &self.config, &mut self.lost, out));
            }
        }
    }

    fn prune_lost(&mut self, now: f64) {
        let ttl = self.config.lost_ttl_secs;
        self.lost.retain(|r| now - r.lost_at <= ttl);
    }

    /// Initial state for a newly seen track: stitch it to the closest lost
    /// record, or to a still-missing tracked cup inside its grace window,
    /// else start a fresh cycle.
    fn recover(
        &mut self,
        now: f64,
        frame_index: u64,
        position: Point,
        seen: &HashSet<TrackId>,
    ) -> CupState {
        let limit = self.config.lost_match_distance;

        let closest_record = self
            .lost
            .iter()
            .enumerate()
            .map(|(i, r)| (i, position.distance(&r.position)))
            .filter(|(_, d)| *d < limit)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i);

        if let Some(idx) = closest_record {
            let record = self.lost.remove(idx);
            tracing::debug!(
                entry_at = record.entry_at,
                maker = ?record.maker,
                "cup recovered from lost buffer"
            );
            return CupState {
                entry_at: record.entry_at,
                inherited: true,
                maker: record.maker,
                ..CupState::fresh(now, position, frame_index)
            };
        }

        let closest_missing = self
            .cups
            .iter()
            .filter(|(id, _)| !seen.contains(*id))
            .map(|(id, s)| (*id, position.distance(&s.position)))
            .filter(|(_, d)| *d < limit)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id);

        if let Some(old_id) = closest_missing {
            if let Some(old) = self.cups.remove(&old_id) {
                tracing::debug!(old_track = old_id, "cup adopted from missing track");
                return CupState {
                    inherited: true,
                    last_seen_frame: frame_index,
                    position,
                    ..old
                };
            }
        }

        CupState::fresh(now, position, frame_index)
    }

    /// Seconds since the cup's current cycle began, if the track is known.
    pub fn dwell_secs(&self, track_id: TrackId, now: f64) -> Option<f64> {
        self.cups.get(&track_id).map(|s| now - s.entry_at)
    }

    /// Current maker assignment for a track.
    pub fn maker(&self, track_id: TrackId) -> Option<&str> {
        self.cups.get(&track_id)?.maker.as_deref()
    }

    pub fn tracked_cups(&self) -> usize {
        self.cups.len()
    }

    pub fn lost_records(&self) -> &[LostCupRecord] {
        &self.lost
    }
}

/// Zone exit: credit the maker, park the cup as lost, or discard.
fn settle(
    track_id: TrackId,
    state: &mut CupState,
    now: f64,
    config: &CupConfig,
    lost: &mut Vec<LostCupRecord>,
    out: &mut Outbox,
) -> Option<Payout> {
    let dwell = now - state.entry_at;
    let cooled = state
        .last_payout
        .map_or(true, |t| now - t > config.cooldown_secs);

    match &state.maker {
        Some(maker) if dwell >= config.production_secs && cooled => {
            state.last_payout = Some(now);
            tracing::info!(track = track_id, maker = %maker, dwell_secs = dwell, "cup credited");
            out.update_employee(maker, 1, EmployeeStatus::Active);
            out.log_event(
                EventKind::Production,
                format!("{maker} finished a cup ({dwell:.0}s)"),
            );
            out.speak(format!("Point for {maker}"));
            Some(Payout {
                track_id,
                maker: maker.clone(),
                dwell_secs: dwell,
            })
        }
        _ if dwell < config.production_secs => {
            tracing::debug!(track = track_id, dwell_secs = dwell, "short dwell, cup parked");
            lost.push(LostCupRecord {
                track_id,
                position: state.position,
                entry_at: state.entry_at,
                lost_at: now,
                maker: state.maker.clone(),
            });
            None
        }
        _ => {
            tracing::debug!(
                track = track_id,
                dwell_secs = dwell,
                maker = ?state.maker,
                cooled,
                "cup exit not credited"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{Effect, PersistOp};
    use crate::types::{BoundingBox, ObjectClass};

    fn cup(id: TrackId, x: f32, y: f32) -> TrackedObject {
        TrackedObject {
            track_id: id,
            label: ObjectClass::Cup,
            bbox: BoundingBox::new(x - 10.0, y - 10.0, x + 10.0, y + 10.0),
        }
    }

    fn person(id: TrackId, identity: Identity, x: f32, y: f32) -> ResolvedPerson {
        let bbox = BoundingBox::new(x - 50.0, y - 150.0, x + 50.0, y + 150.0);
        ResolvedPerson {
            track_id: id,
            bbox,
            center: bbox.center(),
            identity,
        }
    }

    fn alice() -> ResolvedPerson {
        person(1, Identity::Staff("ALICE".into()), 250.0, 250.0)
    }

    fn config() -> CupConfig {
        CupConfig::default()
    }

    /// Drives the monitor at 10 fps with a frame counter.
    struct Harness {
        monitor: CupLifecycleMonitor,
        frame: u64,
        payouts: Vec<Payout>,
        effects: Vec<Effect>,
    }

    impl Harness {
        fn new(config: CupConfig) -> Self {
            Self {
                monitor: CupLifecycleMonitor::new(config),
                frame: 0,
                payouts: Vec::new(),
                effects: Vec::new(),
            }
        }

        fn step(&mut self, now: f64, cups: &[TrackedObject], people: &[ResolvedPerson]) {
            self.frame += 1;
            let refs: Vec<&TrackedObject> = cups.iter().collect();
            let mut out = Outbox::new();
            let paid = self.monitor.update(now, self.frame, &refs, people, &mut out);
            self.payouts.extend(paid);
            self.effects.extend(out.into_effects());
        }

        /// Run from `from` to `to` (inclusive) at 0.1 s steps.
        fn run(&mut self, from: f64, to: f64, cups: &[TrackedObject], people: &[ResolvedPerson]) {
            let mut t = from;
            while t <= to + 1e-9 {
                self.step(t, cups, people);
                t += 0.1;
            }
        }

        fn production_events(&self) -> usize {
            self.effects
                .iter()
                .filter(|e| matches!(e, Effect::Persist(PersistOp::LogEvent { kind: EventKind::Production, .. })))
                .count()
        }
    }

    #[test]
    fn test_credit_on_zone_exit() {
        // Cup #7 in the zone from t=0 with ALICE nearby, leaves at t=5.
        let mut h = Harness::new(config());
        h.run(0.0, 4.95, &[cup(7, 250.0, 250.0)], &[alice()]);
        assert_eq!(h.monitor.maker(7), Some("ALICE"));
        h.step(5.0, &[cup(7, 450.0, 250.0)], &[alice()]);

        assert_eq!(h.payouts.len(), 1);
        assert_eq!(h.payouts[0].maker, "ALICE");
        assert!((h.payouts[0].dwell_secs - 5.0).abs() < 1e-6);
        assert_eq!(h.production_events(), 1);
        let upserts: Vec<_> = h
            .effects
            .iter()
            .filter_map(|e| match e {
                Effect::Persist(PersistOp::UpdateEmployee { name, cups_delta, status }) => {
                    Some((name.clone(), *cups_delta, *status))
                }
                _ => None,
            })
            .collect();
        assert_eq!(upserts, vec![("ALICE".to_string(), 1, EmployeeStatus::Active)]);
    }

    #[test]
    fn test_credit_on_disappearance_in_zone() {
        let mut h = Harness::new(config());
        h.run(0.0, 4.5, &[cup(3, 250.0, 250.0)], &[alice()]);
        h.step(4.6, &[], &[alice()]);
        assert_eq!(h.payouts.len(), 1);
        assert_eq!(h.monitor.tracked_cups(), 0);
        assert!(h.monitor.lost_records().is_empty());
    }

    #[test]
    fn test_short_dwell_parks_and_recovers() {
        // Cup #9 enters at t=0, leaves the zone at t=2 (too short).
        let mut h = Harness::new(config());
        h.run(0.0, 1.95, &[cup(9, 380.0, 250.0)], &[alice()]);
        h.step(2.0, &[cup(9, 420.0, 250.0)], &[alice()]);
        assert!(h.payouts.is_empty());
        assert_eq!(h.monitor.lost_records().len(), 1);
        assert_eq!(h.monitor.lost_records()[0].entry_at, 0.0);

        // Track #9 is dropped; #14 appears at t=3 within 100 px.
        h.step(2.5, &[], &[alice()]);
        h.step(3.0, &[cup(14, 390.0, 260.0)], &[alice()]);
        assert!(h.monitor.lost_records().is_empty());
        assert_eq!(h.monitor.maker(14), Some("ALICE"));
        let dwell = h.monitor.dwell_secs(14, 3.0).unwrap();
        assert!((dwell - 3.0).abs() < 1e-9, "dwell measured from t=0, got {dwell}");

        // Leaving at t=4.5 is 4.5 s from the inherited entry: credited.
        h.run(3.1, 4.45, &[cup(14, 390.0, 260.0)], &[alice()]);
        h.step(4.5, &[cup(14, 450.0, 260.0)], &[alice()]);
        assert_eq!(h.payouts.len(), 1);
        assert!((h.payouts[0].dwell_secs - 4.5).abs() < 1e-6);
    }

    #[test]
    fn test_flicker_yields_single_credit() {
        let mut h = Harness::new(config());
        // Track #20 flickers out at t=1.0 and comes back as #21 at t=1.3.
        h.run(0.0, 0.95, &[cup(20, 250.0, 250.0)], &[alice()]);
        h.run(1.0, 1.25, &[], &[alice()]);
        assert_eq!(h.monitor.lost_records().len(), 1);
        h.run(1.3, 4.95, &[cup(21, 255.0, 248.0)], &[alice()]);
        h.step(5.0, &[], &[alice()]);
        h.run(5.1, 8.0, &[], &[alice()]);

        assert_eq!(h.payouts.len(), 1);
        assert_eq!(h.payouts[0].track_id, 21);
        assert!((h.payouts[0].dwell_secs - 5.0).abs() < 1e-6);
        assert_eq!(h.production_events(), 1);
    }

    #[test]
    fn test_cooldown_blocks_second_payout() {
        let mut h = Harness::new(config());
        let inside = [cup(5, 250.0, 250.0)];
        let outside = [cup(5, 450.0, 250.0)];
        h.run(0.0, 4.95, &inside, &[alice()]);
        h.step(5.0, &outside, &[alice()]);
        // Back in at t=5.5 for 5 s, out again at t=10.5: within 10 s cooldown.
        h.run(5.5, 10.45, &inside, &[alice()]);
        h.step(10.5, &outside, &[alice()]);
        assert_eq!(h.payouts.len(), 1);

        // After the cooldown a new cycle pays again.
        h.run(16.0, 20.95, &inside, &[alice()]);
        h.step(21.0, &outside, &[alice()]);
        assert_eq!(h.payouts.len(), 2);
    }

    #[test]
    fn test_no_maker_no_credit() {
        let mut h = Harness::new(config());
        let visitor = person(2, Identity::Visitor, 250.0, 250.0);
        h.run(0.0, 6.0, &[cup(8, 250.0, 250.0)], &[visitor]);
        h.step(6.1, &[cup(8, 450.0, 250.0)], &[]);
        assert!(h.payouts.is_empty());
        assert!(h.monitor.maker(8).is_none());
        assert!(h.monitor.lost_records().is_empty());
    }

    #[test]
    fn test_maker_last_writer_wins() {
        let mut h = Harness::new(config());
        let bob = person(3, Identity::Staff("BOB".into()), 260.0, 250.0);
        h.run(0.0, 2.0, &[cup(6, 250.0, 250.0)], &[alice()]);
        assert_eq!(h.monitor.maker(6), Some("ALICE"));
        h.run(2.1, 4.5, &[cup(6, 262.0, 250.0)], &[alice(), bob]);
        assert_eq!(h.monitor.maker(6), Some("BOB"));
    }

    #[test]
    fn test_lost_records_expire() {
        let mut h = Harness::new(config());
        h.run(0.0, 1.0, &[cup(30, 250.0, 250.0)], &[alice()]);
        h.step(1.1, &[], &[]);
        assert_eq!(h.monitor.lost_records().len(), 1);

        // 25 s later a cup appears at the same spot: the record has expired.
        h.step(26.0, &[cup(31, 250.0, 250.0)], &[]);
        assert!(h.monitor.lost_records().is_empty());
        assert_eq!(h.monitor.dwell_secs(31, 26.0), Some(0.0));
        assert!(h.monitor.maker(31).is_none());
    }

    #[test]
    fn test_far_cup_is_not_stitched() {
        let mut h = Harness::new(config());
        h.run(0.0, 1.0, &[cup(40, 150.0, 150.0)], &[alice()]);
        h.step(1.1, &[], &[]);
        h.step(1.2, &[cup(41, 350.0, 350.0)], &[]);
        assert_eq!(h.monitor.lost_records().len(), 1);
        assert_eq!(h.monitor.dwell_secs(41, 1.2), Some(0.0));
    }

    #[test]
    fn test_missing_grace_adopts_replacement_track() {
        let mut h = Harness::new(CupConfig {
            missing_grace_frames: 5,
            ..config()
        });
        h.run(0.0, 2.0, &[cup(50, 250.0, 250.0)], &[alice()]);
        // Tracker swaps ids without a gap: #51 replaces #50 in place.
        h.run(2.1, 4.95, &[cup(51, 252.0, 250.0)], &[alice()]);
        assert_eq!(h.monitor.tracked_cups(), 1);
        h.step(5.0, &[cup(51, 450.0, 250.0)], &[alice()]);
        assert_eq!(h.payouts.len(), 1);
        assert!((h.payouts[0].dwell_secs - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_missing_grace_settles_when_replacement_is_outside() {
        let mut h = Harness::new(CupConfig {
            missing_grace_frames: 5,
            ..config()
        });
        h.run(0.0, 4.95, &[cup(50, 350.0, 250.0)], &[alice()]);
        // #50 is carried out and re-identified as #51 beyond the zone edge.
        h.run(5.0, 8.0, &[cup(51, 420.0, 250.0)], &[alice()]);
        assert_eq!(h.payouts.len(), 1);
        assert_eq!(h.payouts[0].track_id, 51);
        assert_eq!(h.payouts[0].maker, "ALICE");
        assert!((h.payouts[0].dwell_secs - 5.0).abs() < 1e-6);
        assert_eq!(h.monitor.tracked_cups(), 1);
    }

    #[test]
    fn test_edge_jitter_keeps_dwell() {
        let mut h = Harness::new(config());
        h.run(0.0, 1.95, &[cup(9, 390.0, 250.0)], &[alice()]);
        // One frame just past the zone edge.
        h.step(2.0, &[cup(9, 405.0, 250.0)], &[alice()]);
        assert_eq!(h.monitor.lost_records().len(), 1);
        h.run(2.1, 4.95, &[cup(9, 390.0, 250.0)], &[alice()]);
        assert!(h.monitor.lost_records().is_empty());
        let dwell = h.monitor.dwell_secs(9, 4.95).unwrap();
        assert!((dwell - 4.95).abs() < 1e-6, "dwell {dwell}");

        h.step(5.0, &[cup(9, 450.0, 250.0)], &[alice()]);
        assert_eq!(h.payouts.len(), 1);
        assert!((h.payouts[0].dwell_secs - 5.0).abs() < 1e-6);
        assert!(h.monitor.lost_records().is_empty());
    }

    #[test]
    fn test_cup_outside_zone_starts_cycle_on_entry() {
        let mut h = Harness::new(config());
        // Sits on the counter outside the zone for 10 s, then 2 s inside.
        h.run(0.0, 10.0, &[cup(60, 450.0, 250.0)], &[alice()]);
        h.run(10.1, 12.0, &[cup(60, 300.0, 250.0)], &[alice()]);
        let dwell = h.monitor.dwell_secs(60, 12.0).unwrap();
        assert!((dwell - 1.9).abs() < 1e-6, "dwell {dwell}");
        h.step(12.1, &[cup(60, 450.0, 250.0)], &[alice()]);
        assert!(h.payouts.is_empty());
    }
}
