//! Phone-usage violation monitor.
//!
//! State is keyed by roster name rather than track id, so an employee who is
//! re-tracked mid-episode keeps the same timer. Visitors and tracks still
//! being verified are exempt. Identities with no open episode have no entry.

use crate::config::PhoneConfig;
use crate::effects::{EmployeeStatus, EventKind, Outbox};
use crate::geometry::overlap_ratio;
use crate::identity::ResolvedPerson;
use crate::types::BoundingBox;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct PhoneEpisode {
    started_at: f64,
    /// Consecutive frames in which the employee was seen without a phone.
    missed_frames: u32,
    reported: bool,
}

pub struct PhoneUsageMonitor {
    config: PhoneConfig,
    episodes: HashMap<String, PhoneEpisode>,
}

impl PhoneUsageMonitor {
    pub fn new(config: PhoneConfig) -> Self {
        Self {
            config,
            episodes: HashMap::new(),
        }
    }

    /// Advance every staff member visible in this frame.
    ///
    /// A person is holding a phone when any phone box overlaps the person
    /// box by more than the configured fraction of the phone's area.
    pub fn update(
        &mut self,
        now: f64,
        people: &[ResolvedPerson],
        phones: &[BoundingBox],
        out: &mut Outbox,
    ) {
        // One verdict per identity, even if it is on several tracks.
        let mut verdicts: Vec<(&str, bool)> = Vec::new();
        for person in people {
            let Some(name) = person.identity.staff_name() else {
                continue;
            };
            let holding = phones
                .iter()
                .any(|phone| overlap_ratio(phone, &person.bbox) > self.config.overlap_threshold);
            match verdicts.iter_mut().find(|(n, _)| *n == name) {
                Some((_, h)) => *h |= holding,
                None => verdicts.push((name, holding)),
            }
        }

        for (name, holding) in verdicts {
            if holding {
                self.on_holding(now, name, out);
            } else {
                self.on_missing(name, out);
            }
        }
    }

    fn on_holding(&mut self, now: f64, name: &str, out: &mut Outbox) {
        let episode = self
            .episodes
            .entry(name.to_string())
            .or_insert_with(|| PhoneEpisode {
                started_at: now,
                missed_frames: 0,
                reported: false,
            });
        episode.missed_frames = 0;

        let elapsed = now - episode.started_at;
        if elapsed > self.config.violation_secs && !episode.reported {
            episode.reported = true;
            tracing::info!(name, elapsed_secs = elapsed, "phone violation");
            out.log_event(EventKind::Violation, format!("{name} using phone ({elapsed:.0}s)"));
            out.update_employee(name, 0, EmployeeStatus::Idle);
            out.speak(format!("{name}, please put your phone away"));
        }
    }

    fn on_missing(&mut self, name: &str, out: &mut Outbox) {
        let Some(episode) = self.episodes.get_mut(name) else {
            return;
        };
        episode.missed_frames += 1;
        if episode.missed_frames > self.config.grace_frames {
            tracing::debug!(name, "phone episode ended");
            self.episodes.remove(name);
            out.update_employee(name, 0, EmployeeStatus::Active);
        }
    }

    /// Seconds the employee has been holding a phone, if an episode is open.
    pub fn holding_secs(&self, name: &str, now: f64) -> Option<f64> {
        self.episodes.get(name).map(|e| now - e.started_at)
    }

    /// Names whose current episode has already been reported, sorted.
    pub fn in_violation(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .episodes
            .iter()
            .filter(|(_, e)| e.reported)
            .map(|(n, _)| n.clone())
            .collect();
        names.sort();
        names
    }
}
