use anyhow::{anyhow, Context, Result};
use cafewatch_core::roster::dir_fingerprint;
use cafewatch_core::{
    load_roster, ArcFaceEncoder, EventKind, FrameSource, JsonLinesSource, Monitor, MonitorConfig,
    PersistOp, Roster,
};
use cafewatch_store::{EventSink, SqliteStore};
use std::fs::File;
use std::io::{BufReader, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod notify;
mod roster_watch;

use config::Config;
use dbus_interface::MonitorService;
use engine::{Dispatcher, FrameLoop, LoopExit};
use roster_watch::RosterWatcher;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "cafewatchd starting");

    let monitor_config = MonitorConfig::load(&config.config_path)
        .with_context(|| format!("loading monitor config {}", config.config_path.display()))?;
    let source = open_source(&config.frame_source, config.descriptor_dim)?;

    let db_path = config.db_path.clone();
    let sink = EventSink::spawn(move || SqliteStore::open(&db_path), config.sink_capacity);
    sink.submit(PersistOp::LogEvent {
        kind: EventKind::System,
        detail: "monitor started".into(),
    });

    let stop = Arc::new(AtomicBool::new(false));
    let (roster_tx, roster_rx) = std_mpsc::channel();
    let (reload_tx, reload_rx) = std_mpsc::channel();

    let roster = match ArcFaceEncoder::load(&config.arcface_model_path()) {
        Ok(mut encoder) => {
            let roster = load_roster(&config.roster_dir, &mut encoder).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "roster unavailable, starting with no staff");
                Roster::default()
            });
            roster_watch::spawn_roster_watcher(RosterWatcher {
                dir: config.roster_dir.clone(),
                encoder: Box::new(encoder),
                poll: config.roster_poll(),
                settle: config.roster_settle(),
                rosters: roster_tx,
                requests: reload_rx,
                stop: stop.clone(),
                known: dir_fingerprint(&config.roster_dir).unwrap_or_default(),
            });
            roster
        }
        Err(e) => {
            tracing::warn!(error = %e, "face encoder unavailable, staff recognition disabled");
            drop(reload_rx);
            Roster::default()
        }
    };

    let monitor = Monitor::new(monitor_config, roster);
    let (status_tx, status_rx) = watch::channel(monitor.snapshot());

    let _dbus = if config.dbus_enabled {
        let service = MonitorService {
            status: status_rx,
            reload: reload_tx,
        };
        match serve_dbus(config.dbus_system, service).await {
            Ok(conn) => {
                tracing::info!(name = dbus_interface::BUS_NAME, "D-Bus interface registered");
                Some(conn)
            }
            Err(e) => {
                tracing::warn!(error = %e, "D-Bus unavailable, status interface disabled");
                None
            }
        }
    } else {
        None
    };

    let frames = engine::spawn_frame_loop(FrameLoop {
        monitor,
        source,
        dispatcher: Dispatcher {
            sink: sink.handle(),
            notifier: notify::from_config(&config.speech_command),
        },
        rosters: roster_rx,
        status: status_tx,
        stop: stop.clone(),
    });
    let mut frames_done = tokio::task::spawn_blocking(move || frames.join());

    tracing::info!("cafewatchd ready");

    let finished = tokio::select! {
        res = &mut frames_done => Some(res),
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for ctrl-c")?;
            tracing::info!("interrupt received, stopping frame loop");
            stop.store(true, Ordering::Relaxed);
            None
        }
    };
    let finished = match finished {
        Some(res) => Some(res),
        None => tokio::time::timeout(config.drain_timeout(), frames_done).await.ok(),
    };

    let outcome: Result<Option<LoopExit>> = match finished {
        Some(Ok(Ok(res))) => res.map(Some).map_err(anyhow::Error::from),
        Some(Ok(Err(_))) => Err(anyhow!("frame loop panicked")),
        Some(Err(e)) => Err(anyhow::Error::from(e).context("joining frame loop")),
        None => {
            tracing::warn!("frame loop still blocked on input, abandoning it");
            Ok(None)
        }
    };

    stop.store(true, Ordering::Relaxed);
    sink.submit(PersistOp::LogEvent {
        kind: EventKind::System,
        detail: "monitor stopped".into(),
    });
    let drain = config.drain_timeout();
    let drained = tokio::task::spawn_blocking(move || sink.shutdown(drain)).await?;

    let exit = outcome?;
    tracing::info!(
        frames = exit.as_ref().map(|e| e.frames),
        interrupted = exit.as_ref().map(|e| e.stopped),
        drained,
        "cafewatchd stopped"
    );
    Ok(())
}

/// Open the JSON-lines perception stream; `-` reads stdin.
fn open_source(path: &str, descriptor_dim: usize) -> Result<Box<dyn FrameSource + Send>> {
    let reader: Box<dyn Read + Send> = if path == "-" {
        Box::new(std::io::stdin())
    } else {
        Box::new(File::open(path).with_context(|| format!("opening frame source {path}"))?)
    };
    tracing::info!(source = path, descriptor_dim, "frame source opened");
    let source = JsonLinesSource::new(BufReader::new(reader));
    if descriptor_dim == 0 {
        Ok(Box::new(source))
    } else {
        Ok(Box::new(source.with_descriptor_dim(descriptor_dim)))
    }
}

async fn serve_dbus(system: bool, service: MonitorService) -> zbus::Result<zbus::Connection> {
    let builder = if system {
        zbus::connection::Builder::system()?
    } else {
        zbus::connection::Builder::session()?
    };
    builder
        .name(dbus_interface::BUS_NAME)?
        .serve_at(dbus_interface::OBJECT_PATH, service)?
        .build()
        .await
}
