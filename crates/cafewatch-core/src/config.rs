//! Tuning parameters for every monitor, with per-deployment defaults.
//!
//! All thresholds are injected into the components at construction; none of
//! them read configuration on their own. Pixel distances assume a 640×480
//! stream and must be re-tuned for other resolutions or fields of view.

use crate::types::BoundingBox;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Complete monitor configuration, one section per component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub identity: IdentityConfig,
    pub phone: PhoneConfig,
    pub cup: CupConfig,
    pub visitor: VisitorConfig,
    pub stats: StatsConfig,
}

impl MonitorConfig {
    /// Load from a TOML file. A missing file yields the defaults; sections
    /// and fields absent from the file keep their defaults too.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }
}

/// Face cadence and identity resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Face recognition runs on every Nth frame.
    pub face_every_n_frames: u64,
    /// Maximum Euclidean descriptor distance for a roster or
    /// returning-visitor match.
    ///
    /// The value is only meaningful for one descriptor model. The default
    /// 0.6 is the dlib 128-d threshold. The roster is enrolled with ArcFace,
    /// whose L2-normalised 512-d vectors put 0.6 at cosine similarity 0.82,
    /// which is strict. The frame stream must carry descriptors from the
    /// same ArcFace model (the daemon drops other lengths), and this value
    /// should be retuned for it, typically 1.0 to 1.1 (cosine 0.5 to 0.4).
    pub face_tolerance: f32,
    /// A person track unmatched after this many sightings becomes a visitor.
    pub visitor_after_frames: u32,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            face_every_n_frames: 3,
            face_tolerance: 0.6,
            visitor_after_frames: 10,
        }
    }
}

/// Phone-usage violation detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhoneConfig {
    /// Fraction of the phone box inside the person box that counts as holding.
    pub overlap_threshold: f32,
    /// Continuous holding time before a violation is reported.
    pub violation_secs: f64,
    /// Frames without a phone tolerated before the episode ends.
    pub grace_frames: u32,
}

impl Default for PhoneConfig {
    fn default() -> Self {
        Self {
            overlap_threshold: 0.10,
            violation_secs: 3.0,
            grace_frames: 30,
        }
    }
}

/// Cup production crediting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CupConfig {
    /// Production zone in frame coordinates.
    pub zone: BoundingBox,
    /// Maximum distance from cup to person center for maker attribution.
    pub attribution_distance: f32,
    /// Minimum dwell inside the zone for a credited cup.
    pub production_secs: f64,
    /// Minimum time between two payouts for the same track.
    pub cooldown_secs: f64,
    /// Lifetime of a lost-cup record.
    pub lost_ttl_secs: f64,
    /// Maximum distance between a lost cup and a new track to stitch them.
    pub lost_match_distance: f32,
    /// Frames a cup may be missing before it is treated as gone.
    pub missing_grace_frames: u64,
}

impl Default for CupConfig {
    fn default() -> Self {
        Self {
            zone: BoundingBox::new(100.0, 100.0, 400.0, 400.0),
            attribution_distance: 600.0,
            production_secs: 4.0,
            cooldown_secs: 10.0,
            lost_ttl_secs: 20.0,
            lost_match_distance: 100.0,
            missing_grace_frames: 0,
        }
    }
}

/// Orientation of the counting line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    /// Line at a fixed x (door on the left or right).
    Vertical,
    /// Line at a fixed y.
    Horizontal,
}

/// Virtual entrance line for visitor counting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisitorConfig {
    pub axis: Axis,
    pub line_position: f32,
    /// Half-width of the band around the line that counts as crossing.
    pub line_tolerance: f32,
}

impl Default for VisitorConfig {
    fn default() -> Self {
        Self {
            axis: Axis::Vertical,
            line_position: 300.0,
            line_tolerance: 30.0,
        }
    }
}

/// Aggregate visitor statistics flush.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub interval_secs: f64,
    pub camera_id: String,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5.0,
            camera_id: "CAM_MAIN".to_string(),
        }
    }
}
