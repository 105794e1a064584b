use cafewatch_core::StatusSnapshot;
use std::sync::mpsc as std_mpsc;
use tokio::sync::watch;
use zbus::interface;

pub const BUS_NAME: &str = "org.cafewatch.Monitor1";
pub const OBJECT_PATH: &str = "/org/cafewatch/Monitor1";

/// D-Bus interface for the cafewatch daemon.
///
/// Bus name: org.cafewatch.Monitor1
/// Object path: /org/cafewatch/Monitor1
pub struct MonitorService {
    pub status: watch::Receiver<StatusSnapshot>,
    pub reload: std_mpsc::Sender<()>,
}

#[interface(name = "org.cafewatch.Monitor1")]
impl MonitorService {
    /// Live monitor status as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let snapshot = self.status.borrow().clone();
        let mut value = serde_json::to_value(&snapshot)
            .map_err(|e| zbus::fdo::Error::Failed(format!("status encoding: {e}")))?;
        value["version"] = serde_json::json!(env!("CARGO_PKG_VERSION"));
        Ok(value.to_string())
    }

    /// Ask the roster watcher to reload staff photos now.
    async fn reload_roster(&self) -> zbus::fdo::Result<bool> {
        tracing::info!("roster reload requested");
        Ok(self.reload.send(()).is_ok())
    }
}
