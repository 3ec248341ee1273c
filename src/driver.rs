//! Driver spawns and manages the acquisition and evaluation tasks.
//!
//! Two long-lived tasks share one [`VehicleStateStore`]:
//!
//! - the **acquisition task** owns the transport, the decoder, and the frame
//!   bus, and writes decoded fields into the store as fast as frames arrive;
//! - the **evaluation task** runs at a fixed 100 Hz, reads one snapshot per
//!   tick, runs the safety monitor ahead of the feature engine, applies any
//!   queued operator commands, and publishes feature status on a watch
//!   channel.
//!
//! Transport errors never kill the acquisition task outright: it retries with
//! exponential backoff and only gives up after [`MAX_TRANSPORT_ERRORS`]
//! consecutive failures. Either task ending cancels the shared token, and the
//! evaluation task always drives the feature engine through its reset
//! sequence before exiting, so the ECU is never left with a feature applied.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::decoder::FrameDecoder;
use crate::features::FeatureEngine;
use crate::safety::SafetyMonitor;
use crate::sink::ParameterSink;
use crate::store::VehicleStateStore;
use crate::transport::FrameTransport;
use crate::types::{FaultEvent, FeatureConfigs, FeatureName, FeatureStatus, SafetyLimits};

/// Status of every feature, keyed by name.
pub type FeatureStatusMap = HashMap<FeatureName, FeatureStatus>;

/// Fixed rate of the evaluation loop.
pub const EVALUATION_HZ: f64 = 100.0;

const EVALUATION_TICK: Duration = Duration::from_millis(10);
const MAX_TRANSPORT_ERRORS: u32 = 10;
const COMMAND_QUEUE_DEPTH: usize = 32;

/// Operator commands routed into the evaluation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ArmLaunch,
    DisarmLaunch,
    SetStealth(bool),
    ClearFaults,
    Shutdown,
}

/// Result of spawning the driver tasks.
pub struct DriverChannels {
    /// Latest status of every feature, refreshed each evaluation tick
    pub status: watch::Receiver<Arc<FeatureStatusMap>>,
    /// Most recent global safety fault, `None` after a clear
    pub faults: watch::Receiver<Option<Arc<FaultEvent>>>,
    /// Operator command queue
    pub commands: mpsc::Sender<Command>,
    /// Cancellation token for coordinated shutdown
    pub cancel: CancellationToken,
}

/// Driver spawns and manages the telemetry processing tasks.
pub struct Driver;

impl Driver {
    /// Spawn the acquisition and evaluation tasks.
    pub fn spawn<T>(
        transport: T,
        decoder: FrameDecoder,
        store: Arc<VehicleStateStore>,
        configs: FeatureConfigs,
        limits: SafetyLimits,
        sink: Arc<dyn ParameterSink>,
    ) -> DriverChannels
    where
        T: FrameTransport,
    {
        let now = Instant::now();
        let engine = FeatureEngine::new(configs, sink, now);
        let monitor = SafetyMonitor::new(limits);

        let (status_tx, status_rx) = watch::channel(Arc::new(engine.status_map()));
        let (fault_tx, fault_rx) = watch::channel(None);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let cancel = CancellationToken::new();

        let acquisition_cancel = cancel.clone();
        let acquisition_store = Arc::clone(&store);
        tokio::spawn(async move {
            Self::acquisition_task(transport, decoder, acquisition_store, acquisition_cancel)
                .await;
        });

        let evaluation_cancel = cancel.clone();
        tokio::spawn(async move {
            Self::evaluation_task(
                engine,
                monitor,
                store,
                command_rx,
                status_tx,
                fault_tx,
                evaluation_cancel,
            )
            .await;
        });

        DriverChannels { status: status_rx, faults: fault_rx, commands: command_tx, cancel }
    }

    /// Acquisition task: owns the transport and decoder, feeds the store.
    async fn acquisition_task<T>(
        mut transport: T,
        mut decoder: FrameDecoder,
        store: Arc<VehicleStateStore>,
        cancel: CancellationToken,
    ) where
        T: FrameTransport,
    {
        info!("acquisition task started");
        let mut frame_count = 0u64;
        let mut error_count = 0u32;

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("acquisition task cancelled");
                    break;
                }
                result = transport.recv() => result,
            };

            match result {
                Ok(Some(frame)) => {
                    frame_count += 1;
                    error_count = 0;
                    trace!(id = format_args!("{:#x}", frame.id), frame_count, "frame received");
                    decoder.decode(&frame, &store);
                }
                Ok(None) => {
                    info!(frame_count, "transport stream ended");
                    break;
                }
                Err(e) => {
                    error_count += 1;
                    error!(error = %e, attempt = error_count, max = MAX_TRANSPORT_ERRORS, "transport error");

                    if error_count >= MAX_TRANSPORT_ERRORS {
                        error!("too many consecutive transport errors, giving up");
                        break;
                    }

                    // Exponential backoff: 50ms, 100ms, 200ms, capped.
                    let backoff = Duration::from_millis(50 * (1 << (error_count - 1).min(5)));
                    tokio::time::sleep(backoff).await;
                }
            }
        }

        let (decoded, short, unknown) = decoder.counters();
        info!(decoded, short, unknown, "acquisition task ended");
        // Stream end or persistent failure takes the whole connection down so
        // the evaluation task runs its reset sequence.
        cancel.cancel();
    }

    /// Evaluation task: safety monitor, feature engine, status publishing.
    async fn evaluation_task(
        mut engine: FeatureEngine,
        mut monitor: SafetyMonitor,
        store: Arc<VehicleStateStore>,
        mut commands: mpsc::Receiver<Command>,
        status_tx: watch::Sender<Arc<FeatureStatusMap>>,
        fault_tx: watch::Sender<Option<Arc<FaultEvent>>>,
        cancel: CancellationToken,
    ) {
        info!(hz = EVALUATION_HZ, "evaluation task started");
        let mut ticker = tokio::time::interval(EVALUATION_TICK);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        'ticks: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("evaluation task cancelled");
                    break;
                }
                _ = ticker.tick() => {}
            }

            let now = Instant::now();

            // Commands queued since the last tick run before this tick's
            // evaluation, so an arm request is visible to the same tick.
            loop {
                match commands.try_recv() {
                    Ok(Command::ArmLaunch) => engine.arm_launch_control(),
                    Ok(Command::DisarmLaunch) => engine.disarm_launch_control(),
                    Ok(Command::SetStealth(enabled)) => engine.set_stealth(enabled, now).await,
                    Ok(Command::ClearFaults) => {
                        monitor.clear();
                        engine.clear_faults(now);
                        let _ = fault_tx.send(None);
                    }
                    Ok(Command::Shutdown) => {
                        info!("shutdown command received");
                        break 'ticks;
                    }
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        debug!("command channel closed");
                        break;
                    }
                }
            }

            let snap = store.snapshot();

            if let Some(event) = monitor.check(&snap, now) {
                warn!(code = %event.code, "safety fault, disabling all features");
                engine.fault_all(event.code, now).await;
                let _ = fault_tx.send(Some(Arc::new(event)));
            }

            engine.tick(&snap, now).await;

            if status_tx.send(Arc::new(engine.status_map())).is_err() {
                debug!("status receiver dropped, shutting down");
                break;
            }
        }

        // Leave the ECU clean regardless of why we are exiting.
        engine.shutdown(Instant::now()).await;
        let _ = status_tx.send(Arc::new(engine.status_map()));
        cancel.cancel();
        info!("evaluation task ended");
    }
}
