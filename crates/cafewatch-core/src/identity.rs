//! Per-track identity: fuses tracker ids with periodic face matches.
//!
//! A roster name, once bound to a track, is never downgraded by a later
//! unknown or missing face read. Tracks without a roster match stay
//! `Verifying` for a grace period and are then presumed to be visitors.

use crate::config::IdentityConfig;
use crate::geometry::is_aligned;
use crate::types::{BoundingBox, Embedding, Point, TrackId, TrackedObject};
use std::collections::HashMap;
use std::fmt;

pub const VISITOR_LABEL: &str = "VISITOR";
pub const VERIFYING_LABEL: &str = "VERIFYING";

/// Resolved label of a person track for the current frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    /// Bound to a roster name.
    Staff(String),
    /// Observed long enough without a roster match.
    Visitor,
    /// Still inside the recognition grace period.
    Verifying,
}

impl Identity {
    pub fn label(&self) -> &str {
        match self {
            Identity::Staff(name) => name,
            Identity::Visitor => VISITOR_LABEL,
            Identity::Verifying => VERIFYING_LABEL,
        }
    }

    /// The roster name, if this is a staff identity.
    pub fn staff_name(&self) -> Option<&str> {
        match self {
            Identity::Staff(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One face from a recognition pass, already matched against the roster.
#[derive(Debug, Clone)]
pub struct FaceSighting {
    pub bbox: BoundingBox,
    /// Roster name, `None` when the face is unknown.
    pub name: Option<String>,
    pub descriptor: Embedding,
}

/// A person track with its identity for this frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPerson {
    pub track_id: TrackId,
    pub bbox: BoundingBox,
    pub center: Point,
    pub identity: Identity,
}

#[derive(Debug, Default)]
struct IdentityState {
    name: Option<String>,
    descriptor: Option<Embedding>,
    age: u32,
}

pub struct IdentityResolver {
    config: IdentityConfig,
    states: HashMap<TrackId, IdentityState>,
}

impl IdentityResolver {
    pub fn new(config: IdentityConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
        }
    }

    /// Update identity state for this frame's person tracks and label them.
    ///
    /// `faces` is `Some` only on face-recognition frames. Each person takes
    /// the first face (in detector order) aligned with its box; ties are not
    /// broken by quality.
    pub fn resolve(
        &mut self,
        people: &[&TrackedObject],
        faces: Option<&[FaceSighting]>,
    ) -> Vec<ResolvedPerson> {
        let mut resolved = Vec::with_capacity(people.len());

        for person in people {
            let state = self.states.entry(person.track_id).or_default();
            state.age = state.age.saturating_add(1);

            if let Some(faces) = faces {
                if let Some(face) = faces.iter().find(|f| is_aligned(&f.bbox, &person.bbox)) {
                    if let Some(name) = &face.name {
                        if state.name.as_deref() != Some(name.as_str()) {
                            tracing::debug!(track = person.track_id, name = %name, "track bound to roster identity");
                        }
                        state.name = Some(name.clone());
                    }
                    state.descriptor = Some(face.descriptor.clone());
                }
            }

            let identity = match &state.name {
                Some(name) => Identity::Staff(name.clone()),
                None if state.age > self.config.visitor_after_frames => Identity::Visitor,
                None => Identity::Verifying,
            };

            resolved.push(ResolvedPerson {
                track_id: person.track_id,
                bbox: person.bbox,
                center: person.center(),
                identity,
            });
        }

        resolved
    }

    /// Last face descriptor aligned with this track, if any.
    pub fn descriptor(&self, track_id: TrackId) -> Option<&Embedding> {
        self.states.get(&track_id)?.descriptor.as_ref()
    }

    /// Number of person tracks ever seen.
    pub fn known_tracks(&self) -> usize {
        self.states.len()
    }
}
