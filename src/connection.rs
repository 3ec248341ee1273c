//! Live connection to a vehicle ECU over a diagnostic link.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::Result;
use crate::driver::{Command, DriverChannels, EVALUATION_HZ, FeatureStatusMap};
use crate::store::VehicleStateStore;
use crate::stream::ThrottleExt;
use crate::types::{FaultEvent, UpdateRate, VehicleStateSnapshot};

/// Handle to a running telemetry connection.
///
/// Obtained from [`crate::Overboost::start`]. Cheap to query: state reads are
/// one lock-and-clone, status reads are a watch-channel borrow. Dropping the
/// connection cancels both background tasks; prefer an explicit
/// [`EcuConnection::shutdown`] when you need the feature resets to have
/// reached the ECU before the link closes.
pub struct EcuConnection {
    store: Arc<VehicleStateStore>,
    status: watch::Receiver<Arc<FeatureStatusMap>>,
    faults: watch::Receiver<Option<Arc<FaultEvent>>>,
    commands: mpsc::Sender<Command>,
    cancel: CancellationToken,
}

impl EcuConnection {
    pub(crate) fn new(channels: DriverChannels, store: Arc<VehicleStateStore>) -> Self {
        Self {
            store,
            status: channels.status,
            faults: channels.faults,
            commands: channels.commands,
            cancel: channels.cancel,
        }
    }

    /// Snapshot of the latest decoded vehicle state.
    pub fn vehicle_state(&self) -> VehicleStateSnapshot {
        self.store.snapshot()
    }

    /// Current status of every feature, as of the last evaluation tick.
    pub fn feature_status(&self) -> Arc<FeatureStatusMap> {
        self.status.borrow().clone()
    }

    /// The latched safety fault, if one is outstanding.
    pub fn current_fault(&self) -> Option<Arc<FaultEvent>> {
        self.faults.borrow().clone()
    }

    /// Subscribe to feature status updates.
    ///
    /// The stream yields the current status immediately and then follows the
    /// evaluation loop. `UpdateRate::Max` rates below the loop's 100 Hz are
    /// throttled latest-wins; rates at or above it collapse to `Native`.
    pub fn status_updates(
        &self,
        rate: UpdateRate,
    ) -> impl Stream<Item = Arc<FeatureStatusMap>> + 'static {
        let updates = WatchStream::new(self.status.clone());
        match rate.throttle_interval(EVALUATION_HZ) {
            None => updates.boxed(),
            Some(interval) => updates.throttle(interval).boxed(),
        }
    }

    /// Subscribe to global safety fault events.
    pub fn fault_events(&self) -> impl Stream<Item = Arc<FaultEvent>> + 'static {
        WatchStream::new(self.faults.clone()).filter_map(|opt| async move { opt }).boxed()
    }

    /// Request launch-control arming; takes effect on the next tick.
    pub async fn arm_launch_control(&self) -> Result<()> {
        self.send(Command::ArmLaunch).await
    }

    /// Withdraw a launch-control arm request.
    pub async fn disarm_launch_control(&self) -> Result<()> {
        self.send(Command::DisarmLaunch).await
    }

    /// Toggle stealth mode.
    pub async fn set_stealth(&self, enabled: bool) -> Result<()> {
        self.send(Command::SetStealth(enabled)).await
    }

    /// Acknowledge the latched safety fault and return faulted features to
    /// Disabled.
    pub async fn clear_faults(&self) -> Result<()> {
        self.send(Command::ClearFaults).await
    }

    /// Graceful shutdown: reset every active feature, then stop both tasks.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown).await?;
        self.cancel.cancelled().await;
        Ok(())
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| crate::TelemetryError::channel_closed(format!("{command:?} command")))
    }
}

impl Drop for EcuConnection {
    fn drop(&mut self) {
        debug!("dropping ECU connection");
        self.cancel.cancel();
    }
}
