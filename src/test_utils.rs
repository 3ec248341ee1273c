//! Shared fixtures for unit tests and benchmarks.

#![cfg(any(test, feature = "benchmark"))]
#![allow(clippy::unwrap_used)]

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{Result, TelemetryError};
use crate::sink::{ParameterRequest, ParameterSink};
use crate::store::VehicleStateStore;
use crate::transport::FrameTransport;
use crate::types::{FieldUpdate, TelemetryFrame, VehicleStateSnapshot};

/// Build an engine frame A payload from decoded values (inverse of the
/// broadcast layout). `throttle_raw` is the raw byte, not a percentage.
pub fn encode_engine_a(
    rpm: f32,
    speed_kph: u8,
    throttle_raw: u8,
    coolant_c: f32,
    intake_c: f32,
    maf_g_s: f32,
) -> [u8; 8] {
    let rpm_raw = ((rpm * 4.0) as u16).to_be_bytes();
    let maf_raw = ((maf_g_s * 100.0) as u16).to_be_bytes();
    [
        rpm_raw[0],
        rpm_raw[1],
        speed_kph,
        throttle_raw,
        (coolant_c + 40.0) as u8,
        (intake_c + 40.0) as u8,
        maf_raw[0],
        maf_raw[1],
    ]
}

/// Power-on defaults plus the given field updates, applied a tick after epoch.
pub fn snapshot_with(updates: &[FieldUpdate]) -> VehicleStateSnapshot {
    let epoch = Instant::now();
    let store = VehicleStateStore::new(epoch);
    store.apply_all(updates, epoch + Duration::from_millis(1));
    store.snapshot()
}

/// Parameter sink that records every request and can be told to refuse
/// specific request kinds.
///
/// Failing requests are still recorded, so tests can count attempts.
#[derive(Default)]
pub struct RecordingSink {
    applied: Mutex<Vec<ParameterRequest>>,
    failing: Mutex<HashSet<&'static str>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every request whose [`ParameterRequest::kind`] matches.
    pub fn fail_on(&self, kind: &'static str) {
        self.failing.lock().unwrap().insert(kind);
    }

    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }

    /// Drain and return everything applied since the last call.
    pub fn take_applied(&self) -> Vec<ParameterRequest> {
        std::mem::take(&mut self.applied.lock().unwrap())
    }
}

#[async_trait::async_trait]
impl ParameterSink for RecordingSink {
    async fn apply(&self, request: ParameterRequest) -> Result<()> {
        self.applied.lock().unwrap().push(request);
        if self.failing.lock().unwrap().contains(request.kind()) {
            return Err(TelemetryError::sink(request.kind(), "injected failure"));
        }
        Ok(())
    }
}

/// Transport that yields a scripted sequence of frames, then ends the stream.
///
/// An `Err` entry is returned once and consumed, which exercises the
/// acquisition loop's backoff path.
pub struct ScriptedTransport {
    script: Mutex<std::vec::IntoIter<Result<TelemetryFrame>>>,
    sent: Mutex<Vec<(u32, Vec<u8>)>>,
    hold_open: bool,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Result<TelemetryFrame>>) -> Self {
        Self { script: Mutex::new(script.into_iter()), sent: Mutex::new(Vec::new()), hold_open: false }
    }

    /// Keep `recv` pending after the script runs out instead of ending the
    /// stream, for tests that drive the evaluation side.
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// Convenience constructor from (id, payload) pairs.
    pub fn from_frames(frames: &[(u32, &[u8])]) -> Self {
        let received_at = Instant::now();
        Self::new(
            frames
                .iter()
                .map(|(id, payload)| Ok(TelemetryFrame::new(*id, payload, received_at)))
                .collect(),
        )
    }

    /// Frames written back onto the bus through `send`.
    pub fn take_sent(&self) -> Vec<(u32, Vec<u8>)> {
        std::mem::take(&mut self.sent.lock().unwrap())
    }
}

#[async_trait::async_trait]
impl FrameTransport for ScriptedTransport {
    async fn recv(&mut self) -> Result<Option<TelemetryFrame>> {
        let next = self.script.lock().unwrap().next();
        match next {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(e)) => Err(e),
            None if self.hold_open => futures::future::pending().await,
            None => Ok(None),
        }
    }

    async fn send(&mut self, id: u32, payload: &[u8]) -> Result<()> {
        crate::transport::check_payload_len(id, payload)?;
        self.sent.lock().unwrap().push((id, payload.to_vec()));
        Ok(())
    }
}
