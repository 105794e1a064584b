//! Entrance counting at a virtual line with returning-visitor suppression.

use crate::config::{Axis, VisitorConfig};
use crate::effects::{EventKind, Outbox};
use crate::identity::{Identity, IdentityResolver, ResolvedPerson};
use crate::types::{Embedding, TrackId};
use std::collections::HashSet;

/// Process-lifetime visitor ledger. Only grows.
pub struct VisitorCounter {
    config: VisitorConfig,
    face_tolerance: f32,
    total: u64,
    counted: HashSet<TrackId>,
    memory: Vec<Embedding>,
}

impl VisitorCounter {
    pub fn new(config: VisitorConfig, face_tolerance: f32) -> Self {
        Self {
            config,
            face_tolerance,
            total: 0,
            counted: HashSet::new(),
            memory: Vec::new(),
        }
    }

    /// Count visitor tracks that reach the entrance line for the first time.
    ///
    /// Each track id is considered once. A visitor whose cached face matches
    /// the visitor memory is welcomed back without being counted again.
    pub fn update(&mut self, people: &[ResolvedPerson], identities: &IdentityResolver, out: &mut Outbox) {
        for person in people {
            if person.identity != Identity::Visitor || !self.on_line(person) {
                continue;
            }
            if !self.counted.insert(person.track_id) {
                continue;
            }

            let descriptor = identities.descriptor(person.track_id);
            let returning = descriptor.is_some_and(|d| {
                self.memory.iter().any(|known| known.matches(d, self.face_tolerance))
            });

            if returning {
                tracing::info!(track = person.track_id, "returning visitor");
                out.speak("Welcome back");
                continue;
            }

            self.total += 1;
            if let Some(d) = descriptor {
                self.memory.push(d.clone());
            }
            tracing::info!(track = person.track_id, total = self.total, "new visitor");
            out.speak("Welcome");
            out.log_event(EventKind::Visitor, format!("New visitor ID: {}", person.track_id));
        }
    }

    fn on_line(&self, person: &ResolvedPerson) -> bool {
        let coord = match self.config.axis {
            Axis::Vertical => person.center.x,
            Axis::Horizontal => person.center.y,
        };
        (coord - self.config.line_position).abs() < self.config.line_tolerance
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of distinct visitor faces remembered.
    pub fn remembered_faces(&self) -> usize {
        self.memory.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdentityConfig;
    use crate::effects::Effect;
    use crate::identity::FaceSighting;
    use crate::types::{BoundingBox, ObjectClass, TrackedObject};

    fn track(id: TrackId, cx: f32) -> TrackedObject {
        TrackedObject {
            track_id: id,
            label: ObjectClass::Person,
            bbox: BoundingBox::new(cx - 50.0, 100.0, cx + 50.0, 400.0),
        }
    }

    fn face_for(cx: f32, values: Vec<f32>) -> FaceSighting {
        FaceSighting {
            bbox: BoundingBox::new(cx - 20.0, 60.0, cx + 20.0, 110.0),
            name: None,
            descriptor: values.into(),
        }
    }

    /// Resolver in which every person is a visitor from the first frame.
    fn resolver() -> IdentityResolver {
        IdentityResolver::new(IdentityConfig {
            visitor_after_frames: 0,
            ..IdentityConfig::default()
        })
    }

    fn spoken(out: &Outbox) -> Vec<String> {
        out.effects()
            .iter()
            .filter_map(|e| match e {
                Effect::Speak(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_counts_once_per_track() {
        let mut identities = resolver();
        let mut counter = VisitorCounter::new(VisitorConfig::default(), 0.6);
        let mut out = Outbox::new();
        for _ in 0..10 {
            let t = track(1, 305.0);
            let people = identities.resolve(&[&t], None);
            counter.update(&people, &identities, &mut out);
        }
        assert_eq!(counter.total(), 1);
        assert_eq!(out.count_events(EventKind::Visitor), 1);
        assert_eq!(spoken(&out), vec!["Welcome".to_string()]);
    }

    #[test]
    fn test_off_line_not_counted() {
        let mut identities = resolver();
        let mut counter = VisitorCounter::new(VisitorConfig::default(), 0.6);
        let mut out = Outbox::new();
        let t = track(2, 100.0);
        let people = identities.resolve(&[&t], None);
        counter.update(&people, &identities, &mut out);
        assert_eq!(counter.total(), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_staff_and_verifying_not_counted() {
        let mut identities = IdentityResolver::new(IdentityConfig::default());
        let mut counter = VisitorCounter::new(VisitorConfig::default(), 0.6);
        let mut out = Outbox::new();
        let t = track(3, 300.0);
        let faces = [FaceSighting {
            name: Some("ALICE".into()),
            ..face_for(300.0, vec![0.0])
        }];
        let people = identities.resolve(&[&t], Some(&faces[..]));
        counter.update(&people, &identities, &mut out);
        let t2 = track(4, 300.0);
        let people = identities.resolve(&[&t2], None);
        assert_eq!(people[0].identity, Identity::Verifying);
        counter.update(&people, &identities, &mut out);
        assert_eq!(counter.total(), 0);
    }

    #[test]
    fn test_returning_visitor_suppressed() {
        let mut identities = resolver();
        let mut counter = VisitorCounter::new(VisitorConfig::default(), 0.6);

        // First visit: track 10 with a known face crosses the line.
        let mut out = Outbox::new();
        let t = track(10, 300.0);
        let faces = [face_for(300.0, vec![0.1, 0.2, 0.3])];
        let people = identities.resolve(&[&t], Some(&faces[..]));
        counter.update(&people, &identities, &mut out);
        assert_eq!(counter.total(), 1);
        assert_eq!(counter.remembered_faces(), 1);

        // Same face comes back later under track 25.
        let mut out = Outbox::new();
        let t = track(25, 295.0);
        let faces = [face_for(295.0, vec![0.12, 0.21, 0.29])];
        let people = identities.resolve(&[&t], Some(&faces[..]));
        counter.update(&people, &identities, &mut out);
        assert_eq!(counter.total(), 1);
        assert_eq!(counter.remembered_faces(), 1);
        assert_eq!(spoken(&out), vec!["Welcome back".to_string()]);
        assert_eq!(out.count_events(EventKind::Visitor), 0);
    }

    #[test]
    fn test_different_face_counts_again() {
        let mut identities = resolver();
        let mut counter = VisitorCounter::new(VisitorConfig::default(), 0.6);
        let mut out = Outbox::new();
        for (id, values) in [(1, vec![0.0, 0.0]), (2, vec![1.0, 1.0])] {
            let t = track(id, 300.0);
            let faces = [face_for(300.0, values)];
            let people = identities.resolve(&[&t], Some(&faces[..]));
            counter.update(&people, &identities, &mut out);
        }
        assert_eq!(counter.total(), 2);
        assert_eq!(counter.remembered_faces(), 2);
    }

    #[test]
    fn test_mismatched_descriptor_is_not_returning() {
        let mut identities = resolver();
        let mut counter = VisitorCounter::new(VisitorConfig::default(), 0.6);
        let mut out = Outbox::new();
        let visits: [(TrackId, Vec<f32>); 3] = [(1, vec![0.1, 0.2, 0.3]), (2, vec![0.1]), (3, Vec::new())];
        for (id, values) in visits {
            let t = track(id, 300.0);
            let faces = [face_for(300.0, values)];
            let people = identities.resolve(&[&t], Some(&faces[..]));
            counter.update(&people, &identities, &mut out);
        }
        assert_eq!(counter.total(), 3);
        assert_eq!(out.count_events(EventKind::Visitor), 3);
        assert!(!spoken(&out).contains(&"Welcome back".to_string()));
    }

    #[test]
    fn test_horizontal_line() {
        let mut identities = resolver();
        let config = VisitorConfig {
            axis: Axis::Horizontal,
            line_position: 250.0,
            line_tolerance: 10.0,
        };
        let mut counter = VisitorCounter::new(config, 0.6);
        let mut out = Outbox::new();
        let t = track(7, 50.0); // center y = 250
        let people = identities.resolve(&[&t], None);
        counter.update(&people, &identities, &mut out);
        assert_eq!(counter.total(), 1);
    }
}
