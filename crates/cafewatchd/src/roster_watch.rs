//! Roster hot reload: polls the face-photo directory and hands freshly
//! loaded rosters to the frame loop.

use cafewatch_core::roster::dir_fingerprint;
use cafewatch_core::{load_roster, FaceEncoder, Roster};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

pub struct RosterWatcher {
    pub dir: PathBuf,
    pub encoder: Box<dyn FaceEncoder + Send>,
    pub poll: Duration,
    /// Pause between noticing a change and reading the files.
    pub settle: Duration,
    pub rosters: std_mpsc::Sender<Roster>,
    /// Explicit reload requests, served on the next tick.
    pub requests: std_mpsc::Receiver<()>,
    pub stop: Arc<AtomicBool>,
    /// Fingerprint of the directory as of the last successful load.
    pub known: Vec<String>,
}

impl RosterWatcher {
    pub fn run(mut self) {
        let mut last = std::mem::take(&mut self.known);
        tracing::info!(dir = %self.dir.display(), files = last.len(), "roster watcher started");

        while !self.stop.load(Ordering::Relaxed) {
            let forced = match self.requests.recv_timeout(self.poll) {
                Ok(()) => true,
                Err(std_mpsc::RecvTimeoutError::Timeout) => false,
                Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                    std::thread::sleep(self.poll);
                    false
                }
            };
            if self.stop.load(Ordering::Relaxed) {
                break;
            }

            let current = self.fingerprint();
            if !forced && current == last {
                continue;
            }
            tracing::info!(forced, files = current.len(), "roster change detected, reloading");
            std::thread::sleep(self.settle);
            last = self.fingerprint();

            match load_roster(&self.dir, self.encoder.as_mut()) {
                Ok(roster) => {
                    if self.rosters.send(roster).is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "roster reload failed"),
            }
        }
        tracing::info!("roster watcher exiting");
    }

    /// Current directory fingerprint, empty if the directory is unreadable.
    pub fn fingerprint(&self) -> Vec<String> {
        dir_fingerprint(&self.dir).unwrap_or_else(|e| {
            tracing::debug!(error = %e, "cannot list roster directory");
            Vec::new()
        })
    }
}

/// Spawn the watcher on a dedicated OS thread.
pub fn spawn_roster_watcher(watcher: RosterWatcher) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("cafewatch-roster".into())
        .spawn(move || watcher.run())
        .expect("failed to spawn roster watcher thread")
}

#[cfg(test)]
mod tests {
    use super::*;
    use cafewatch_core::encoder::EncoderError;
    use cafewatch_core::Embedding;
    use image::DynamicImage;

    struct ConstEncoder;

    impl FaceEncoder for ConstEncoder {
        fn encode(&mut self, _image: &DynamicImage) -> Result<Option<Embedding>, EncoderError> {
            Ok(Some(vec![0.5].into()))
        }
    }

    #[test]
    fn test_new_photo_triggers_reload() {
        let dir = tempfile::tempdir().unwrap();
        let (roster_tx, rosters) = std_mpsc::channel();
        let (request_tx, requests) = std_mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));

        let handle = spawn_roster_watcher(RosterWatcher {
            dir: dir.path().to_path_buf(),
            encoder: Box::new(ConstEncoder),
            poll: Duration::from_millis(20),
            settle: Duration::from_millis(200),
            rosters: roster_tx,
            requests,
            stop: stop.clone(),
            known: Vec::new(),
        });

        image::RgbImage::from_pixel(4, 4, image::Rgb([200, 10, 10]))
            .save(dir.path().join("erin.png"))
            .unwrap();
        let roster = rosters.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(roster.names(), vec!["ERIN"]);

        request_tx.send(()).unwrap();
        let forced = rosters.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(forced.len(), 1);

        stop.store(true, Ordering::Relaxed);
        handle.join().unwrap();
    }
}
