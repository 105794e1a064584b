use serde::{Deserialize, Serialize};

/// Tracker-assigned identifier, stable while the tracker keeps the object.
pub type TrackId = u64;

/// A point in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Point) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Axis-aligned box in corner form, serialized as `[x1, y1, x2, y2]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Area, zero for degenerate or inverted boxes.
    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn center(&self) -> Point {
        Point::new((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Strict containment test for a point (edges are outside).
    pub fn contains(&self, p: &Point) -> bool {
        self.x1 < p.x && p.x < self.x2 && self.y1 < p.y && p.y < self.y2
    }

    /// The same box shifted by `(dx, dy)`.
    pub fn translated(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.x1 + dx, self.y1 + dy, self.x2 + dx, self.y2 + dy)
    }
}

impl From<[f32; 4]> for BoundingBox {
    fn from(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// Object categories the detector is configured to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectClass {
    Person,
    Cup,
    Phone,
}

/// One tracked detection in the current frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedObject {
    pub track_id: TrackId,
    pub label: ObjectClass,
    pub bbox: BoundingBox,
}

impl TrackedObject {
    pub fn center(&self) -> Point {
        self.bbox.center()
    }
}

/// Face descriptor vector (128-d for dlib-style encoders, 512-d for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<f32>", into = "Vec<f32>")]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding, when known. Not serialized.
    pub model_version: Option<String>,
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }
}

impl From<Embedding> for Vec<f32> {
    fn from(e: Embedding) -> Self {
        e.values
    }
}

impl Embedding {
    /// Euclidean distance between two descriptors. Lower = more similar.
    ///
    /// Descriptors of different length, or empty ones, come from different
    /// models and are infinitely far apart.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        if self.values.is_empty() || self.values.len() != other.values.len() {
            return f32::INFINITY;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// True if `other` is within `tolerance` of this descriptor.
    pub fn matches(&self, other: &Embedding, tolerance: f32) -> bool {
        self.euclidean_distance(other) <= tolerance
    }
}

/// A reference descriptor for a known staff member.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub name: String,
    pub embedding: Embedding,
}

/// Result of matching a probe descriptor against the roster.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// Distance to the nearest roster entry (infinite for an empty roster).
    pub distance: f32,
    /// Name of the matched entry, set only when `matched`.
    pub name: Option<String>,
    /// Gallery position of the matched entry, set only when `matched`.
    pub index: Option<usize>,
}

/// Strategy for comparing a probe descriptor against the roster.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, gallery: &[RosterEntry], tolerance: f32) -> MatchResult;
}

/// Nearest-neighbour matcher: best = minimum Euclidean distance, accepted
/// only if within tolerance.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(&self, probe: &Embedding, gallery: &[RosterEntry], tolerance: f32) -> MatchResult {
        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, entry) in gallery.iter().enumerate() {
            let dist = probe.euclidean_distance(&entry.embedding);
            if dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_dist <= tolerance => MatchResult {
                matched: true,
                distance: best_dist,
                name: Some(gallery[idx].name.clone()),
                index: Some(idx),
            },
            _ => MatchResult {
                matched: false,
                distance: best_dist,
                name: None,
                index: None,
            },
        }
    }
}
