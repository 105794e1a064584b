//! Frame loop: pulls frames from the perception stream on a dedicated OS
//! thread, runs the monitor, and dispatches the resulting effects.

use crate::notify::Notifier;
use cafewatch_core::source::SourceError;
use cafewatch_core::{Effect, FrameSource, Monitor, Roster, StatusSnapshot};
use cafewatch_store::SinkHandle;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("frame source error: {0}")]
    Source(#[from] SourceError),
}

/// Summary returned when the loop ends.
#[derive(Debug)]
pub struct LoopExit {
    pub frames: u64,
    /// True if the stop flag ended the loop, false if the stream ended.
    pub stopped: bool,
}

/// Hands persistence effects to the sink and speech to the notifier.
pub struct Dispatcher {
    pub sink: Option<SinkHandle>,
    pub notifier: Box<dyn Notifier>,
}

impl Dispatcher {
    pub fn dispatch(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Persist(op) => {
                    if let Some(sink) = &self.sink {
                        sink.submit(op);
                    }
                }
                Effect::Speak(text) => self.notifier.speak(&text),
            }
        }
    }
}

pub struct FrameLoop {
    pub monitor: Monitor,
    pub source: Box<dyn FrameSource + Send>,
    pub dispatcher: Dispatcher,
    /// Reloaded rosters from the watcher thread.
    pub rosters: std_mpsc::Receiver<Roster>,
    pub status: watch::Sender<StatusSnapshot>,
    pub stop: Arc<AtomicBool>,
}

impl FrameLoop {
    /// Process frames until the source ends, fails, or `stop` is set.
    ///
    /// Each frame is handled completely before the next one is read.
    pub fn run(mut self) -> Result<LoopExit, EngineError> {
        tracing::info!("frame loop started");
        loop {
            if self.stop.load(Ordering::Relaxed) {
                return Ok(self.exit(true));
            }

            while let Ok(roster) = self.rosters.try_recv() {
                let diff = self.monitor.replace_roster(roster);
                for name in diff.added {
                    tracing::info!(name = %name, "new staff member enrolled");
                }
            }

            let Some(frame) = self.source.next_frame()? else {
                tracing::info!("frame source ended");
                return Ok(self.exit(false));
            };

            let report = self.monitor.process(&frame);
            self.dispatcher.dispatch(report.effects);
            self.status.send_replace(self.monitor.snapshot());
        }
    }

    fn exit(&self, stopped: bool) -> LoopExit {
        let frames = self.monitor.frames_processed();
        tracing::info!(frames, stopped, "frame loop exiting");
        LoopExit { frames, stopped }
    }
}

/// Spawn the frame loop on a dedicated OS thread.
pub fn spawn_frame_loop(frame_loop: FrameLoop) -> JoinHandle<Result<LoopExit, EngineError>> {
    std::thread::Builder::new()
        .name("cafewatch-frames".into())
        .spawn(move || frame_loop.run())
        .expect("failed to spawn frame loop thread")
}
