//! Per-frame perception input and the JSON-lines frame source.
//!
//! Detection, tracking and face localisation run in an external process that
//! writes one JSON object per frame:
//!
//! ```json
//! {"timestamp": 12.4,
//!  "objects": [{"track_id": 7, "label": "cup", "bbox": [120, 130, 160, 180]}],
//!  "faces": [{"bbox": [130, 60, 170, 110], "descriptor": [0.01, -0.2]}]}
//! ```

use crate::types::{BoundingBox, Embedding, ObjectClass, TrackedObject};
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead};
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("frame source read failed: {0}")]
    Io(#[from] io::Error),
}

/// A located face with its descriptor, not yet matched against the roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceDetection {
    pub bbox: BoundingBox,
    pub descriptor: Embedding,
}

/// Everything the perception layer reports for one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameInput {
    /// Seconds on a monotonic clock.
    pub timestamp: f64,
    pub objects: Vec<TrackedObject>,
    pub faces: Vec<FaceDetection>,
}

impl FrameInput {
    /// Tracks of one category, in detector order.
    pub fn of_class(&self, class: ObjectClass) -> Vec<&TrackedObject> {
        self.objects.iter().filter(|o| o.label == class).collect()
    }
}

pub trait FrameSource {
    /// Next frame, or `None` when the stream has ended.
    fn next_frame(&mut self) -> Result<Option<FrameInput>, SourceError>;
}

#[derive(Deserialize)]
struct WireFrame {
    timestamp: Option<f64>,
    #[serde(default)]
    objects: Vec<TrackedObject>,
    #[serde(default)]
    faces: Vec<FaceDetection>,
}

/// Reads newline-delimited JSON frames from any buffered reader.
pub struct JsonLinesSource<R> {
    reader: R,
    opened: Instant,
    line: String,
    line_no: u64,
    descriptor_dim: Option<usize>,
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            opened: Instant::now(),
            line: String::new(),
            line_no: 0,
            descriptor_dim: None,
        }
    }

    /// Only accept face descriptors of exactly `dim` values.
    pub fn with_descriptor_dim(mut self, dim: usize) -> Self {
        self.descriptor_dim = Some(dim);
        self
    }

    /// Drop faces whose descriptor is empty or of the wrong length; they
    /// cannot be compared against the roster.
    fn accept_faces(&self, faces: Vec<FaceDetection>) -> Vec<FaceDetection> {
        faces
            .into_iter()
            .filter(|face| {
                let len = face.descriptor.values.len();
                let ok = len > 0 && self.descriptor_dim.map_or(true, |dim| len == dim);
                if !ok {
                    tracing::warn!(
                        line = self.line_no,
                        len,
                        expected = ?self.descriptor_dim,
                        "dropping face with unusable descriptor"
                    );
                }
                ok
            })
            .collect()
    }
}

impl<R: BufRead> FrameSource for JsonLinesSource<R> {
    fn next_frame(&mut self) -> Result<Option<FrameInput>, SourceError> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let text = self.line.trim();
            if text.is_empty() {
                continue;
            }

            match serde_json::from_str::<WireFrame>(text) {
                Ok(wire) => {
                    let timestamp = wire
                        .timestamp
                        .unwrap_or_else(|| self.opened.elapsed().as_secs_f64());
                    return Ok(Some(FrameInput {
                        timestamp,
                        objects: wire.objects,
                        faces: self.accept_faces(wire.faces),
                    }));
                }
                Err(e) => {
                    tracing::warn!(line = self.line_no, error = %e, "skipping malformed frame");
                }
            }
        }
    }
}
