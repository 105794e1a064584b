//! Known-staff roster: loading from a directory of face photos, matching
//! and hot-reload diffs.

use crate::encoder::FaceEncoder;
use crate::types::{Embedding, EuclideanMatcher, MatchResult, Matcher, RosterEntry};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("roster directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Names newly present after a roster replacement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RosterDiff {
    pub added: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Roster {
    entries: Vec<RosterEntry>,
}

impl Roster {
    pub fn new(entries: Vec<RosterEntry>) -> Self {
        Self { entries }
    }

    /// Closest roster name within `tolerance`, if any.
    pub fn identify(&self, descriptor: &Embedding, tolerance: f32) -> Option<&str> {
        let MatchResult { matched, index, .. } = EuclideanMatcher.compare(descriptor, &self.entries, tolerance);
        if !matched {
            return None;
        }
        self.entries.get(index?).map(|e| e.name.as_str())
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Swap in a freshly loaded roster and report which names are new.
    pub fn replace(&mut self, new: Roster) -> RosterDiff {
        let old: HashSet<&str> = self.entries.iter().map(|e| e.name.as_str()).collect();
        let mut added: Vec<String> = new
            .entries
            .iter()
            .filter(|e| !old.contains(e.name.as_str()))
            .map(|e| e.name.clone())
            .collect();
        added.sort();
        added.dedup();
        self.entries = new.entries;
        RosterDiff { added }
    }
}

fn is_roster_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>, RosterError> {
    let io_err = |source| RosterError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_file() && is_roster_image(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Sorted image filenames in the roster directory, used to detect changes.
pub fn dir_fingerprint(dir: &Path) -> Result<Vec<String>, RosterError> {
    Ok(list_images(dir)?
        .iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(String::from))
        .collect())
}

/// Load one descriptor per image file. The name is the upper-cased stem.
///
/// Unreadable images and images without a face are skipped. A missing
/// directory is created and yields an empty roster.
pub fn load_roster(dir: &Path, encoder: &mut dyn FaceEncoder) -> Result<Roster, RosterError> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|source| RosterError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        tracing::info!(dir = %dir.display(), "created empty roster directory");
        return Ok(Roster::default());
    }

    let mut entries: Vec<RosterEntry> = Vec::new();
    for path in list_images(dir)? {
        let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_uppercase) else {
            continue;
        };

        let image = match image::open(&path) {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "skipping unreadable roster image");
                continue;
            }
        };

        match encoder.encode(&image) {
            Ok(Some(embedding)) => {
                if entries.iter().any(|e| e.name == name) {
                    tracing::warn!(file = %path.display(), name = %name, "duplicate roster name, keeping first");
                    continue;
                }
                entries.push(RosterEntry { name, embedding });
            }
            Ok(None) => {
                tracing::warn!(file = %path.display(), "no face found in roster image");
            }
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "failed to encode roster image");
            }
        }
    }

    tracing::info!(dir = %dir.display(), count = entries.len(), "roster loaded");
    Ok(Roster::new(entries))
}
