//! Frame decoder: fixed proprietary layouts and the per-id callback bus.
//!
//! The ECU broadcasts a handful of periodic frames with fixed byte layouts.
//! The decoder matches each frame's arbitration id against the known layouts,
//! extracts fields with their documented scale/offset, and writes the results
//! into the [`VehicleStateStore`] under one lock acquisition per frame.
//!
//! Payloads are untrusted input: every layout length-checks before slicing,
//! short frames are dropped without mutating state, and unknown ids are
//! ignored. Neither case is an error the acquisition loop ever sees.
//!
//! The callback bus is typed and keyed by arbitration id. Callbacks return
//! `Result` and run at most once per frame in registration order; a failing
//! callback is logged and never stops the remaining callbacks or further
//! decoding. The bus is exclusively owned by the acquisition task, so
//! dispatch needs no locking at all.

use std::collections::HashMap;

use tracing::{trace, warn};

use crate::error::{Result, TelemetryError};
use crate::store::VehicleStateStore;
use crate::types::{FieldUpdate, TelemetryFrame};

/// Arbitration ids of the known broadcast layouts.
pub mod ids {
    /// Engine frame A: rpm, speed, throttle, coolant, intake, MAF
    pub const ENGINE_A: u32 = 0x700;
    /// Engine frame B: ignition, battery, AFR, boost, wastegate, ethanol, knock
    pub const ENGINE_B: u32 = 0x701;
    /// Transmission frame: gears, clutch, brake, cruise
    pub const TRANSMISSION: u32 = 0x702;
    /// Stability frame: DSC and traction intervention flags
    pub const STABILITY: u32 = 0x703;
    /// Oil and fluids frame: oil temperature/pressure, fuel level
    pub const OIL_FLUIDS: u32 = 0x704;
}

fn be_u16(hi: u8, lo: u8) -> u16 {
    u16::from_be_bytes([hi, lo])
}

/// Engine frame A layout (contract, do not alter):
/// rpm = be_u16(b0,b1)/4; speed_kph = b2; throttle_pct = b3*100/255;
/// coolant_c = b4-40; intake_c = b5-40; maf_g_s = be_u16(b6,b7)/100.
pub fn decode_engine_a(payload: &[u8]) -> Result<Vec<FieldUpdate>> {
    let &[b0, b1, b2, b3, b4, b5, b6, b7] = payload else {
        return Err(TelemetryError::short_frame(ids::ENGINE_A, payload.len(), 8));
    };
    Ok(vec![
        FieldUpdate::Rpm(be_u16(b0, b1) as f32 / 4.0),
        FieldUpdate::SpeedKph(b2 as f32),
        FieldUpdate::ThrottlePct(b3 as f32 * 100.0 / 255.0),
        FieldUpdate::CoolantC(b4 as f32 - 40.0),
        FieldUpdate::IntakeC(b5 as f32 - 40.0),
        FieldUpdate::MafGs(be_u16(b6, b7) as f32 / 100.0),
    ])
}

/// Engine frame B layout (contract, do not alter):
/// ignition_deg = b0/2-64; battery_v = b1/10; afr = b2/10;
/// boost_psi = (b3-128)*0.019*14.5038; wastegate_pct = b4*0.39215686;
/// ethanol_pct = b5; knock_count = b6; knock_retard_deg = b7*0.5.
pub fn decode_engine_b(payload: &[u8]) -> Result<Vec<FieldUpdate>> {
    let &[b0, b1, b2, b3, b4, b5, b6, b7] = payload else {
        return Err(TelemetryError::short_frame(ids::ENGINE_B, payload.len(), 8));
    };
    Ok(vec![
        FieldUpdate::IgnitionDeg(b0 as f32 / 2.0 - 64.0),
        FieldUpdate::BatteryV(b1 as f32 / 10.0),
        FieldUpdate::Afr(b2 as f32 / 10.0),
        FieldUpdate::BoostPsi((b3 as f32 - 128.0) * 0.019 * 14.5038),
        FieldUpdate::WastegatePct(b4 as f32 * 0.392_156_86),
        FieldUpdate::EthanolPct(b5 as f32),
        FieldUpdate::KnockCount(b6),
        FieldUpdate::KnockRetardDeg(b7 as f32 * 0.5),
    ])
}

/// Transmission frame layout (contract, do not alter):
/// current_gear = b0 & 0xF; target_gear = (b0>>4) & 0xF;
/// clutch = bit0(b1); brake = bit1(b1); cruise = bit2(b1).
pub fn decode_transmission(payload: &[u8]) -> Result<Vec<FieldUpdate>> {
    let &[b0, b1, ..] = payload else {
        return Err(TelemetryError::short_frame(ids::TRANSMISSION, payload.len(), 2));
    };
    Ok(vec![
        FieldUpdate::CurrentGear(b0 & 0xF),
        FieldUpdate::TargetGear((b0 >> 4) & 0xF),
        FieldUpdate::Clutch(b1 & 0x01 != 0),
        FieldUpdate::Brake(b1 & 0x02 != 0),
        FieldUpdate::Cruise(b1 & 0x04 != 0),
    ])
}

/// Stability frame layout (contract, do not alter):
/// dsc_active = bit0(b0); traction_active = bit1(b0).
pub fn decode_stability(payload: &[u8]) -> Result<Vec<FieldUpdate>> {
    let &[b0, ..] = payload else {
        return Err(TelemetryError::short_frame(ids::STABILITY, payload.len(), 1));
    };
    Ok(vec![
        FieldUpdate::DscActive(b0 & 0x01 != 0),
        FieldUpdate::TractionActive(b0 & 0x02 != 0),
    ])
}

/// Oil and fluids frame layout:
/// oil_temp_c = b0-40; oil_pressure_kpa = be_u16(b1,b2); fuel_level_pct = b3*100/255.
pub fn decode_oil_fluids(payload: &[u8]) -> Result<Vec<FieldUpdate>> {
    let &[b0, b1, b2, b3, ..] = payload else {
        return Err(TelemetryError::short_frame(ids::OIL_FLUIDS, payload.len(), 4));
    };
    Ok(vec![
        FieldUpdate::OilTempC(b0 as f32 - 40.0),
        FieldUpdate::OilPressureKpa(be_u16(b1, b2) as f32),
        FieldUpdate::FuelLevelPct(b3 as f32 * 100.0 / 255.0),
    ])
}

/// Result-returning callback invoked for frames with a matching id.
///
/// Errors are logged and swallowed by the bus; they never interrupt other
/// callbacks or decoding.
pub trait FrameCallback: Send {
    fn on_frame(&mut self, frame: &TelemetryFrame) -> Result<()>;
}

impl<F> FrameCallback for F
where
    F: FnMut(&TelemetryFrame) -> Result<()> + Send,
{
    fn on_frame(&mut self, frame: &TelemetryFrame) -> Result<()> {
        self(frame)
    }
}

/// Typed event bus keyed by arbitration id.
///
/// Registration happens before the acquisition task starts; from then on the
/// task owns the bus exclusively, so there is no lock to re-enter.
#[derive(Default)]
pub struct FrameBus {
    slots: HashMap<u32, Vec<Box<dyn FrameCallback>>>,
}

impl FrameBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for one arbitration id. Callbacks for the same id
    /// run in registration order.
    pub fn register(&mut self, id: u32, callback: Box<dyn FrameCallback>) {
        self.slots.entry(id).or_default().push(callback);
    }

    /// Number of callbacks registered for `id`.
    pub fn len_for(&self, id: u32) -> usize {
        self.slots.get(&id).map_or(0, Vec::len)
    }

    /// Run every callback registered for the frame's id, at most once each.
    fn dispatch(&mut self, frame: &TelemetryFrame) {
        let Some(callbacks) = self.slots.get_mut(&frame.id) else {
            return;
        };
        for (index, callback) in callbacks.iter_mut().enumerate() {
            if let Err(e) = callback.on_frame(frame) {
                warn!(id = format_args!("{:#x}", frame.id), index, error = %e, "frame callback failed");
            }
        }
    }
}

/// Maps raw frames to typed field updates and feeds the state store.
pub struct FrameDecoder {
    bus: FrameBus,
    decoded_frames: u64,
    short_frames: u64,
    unknown_frames: u64,
}

impl FrameDecoder {
    pub fn new(bus: FrameBus) -> Self {
        Self { bus, decoded_frames: 0, short_frames: 0, unknown_frames: 0 }
    }

    /// Decode one frame into the store, then dispatch per-id callbacks.
    ///
    /// Short frames are counted and dropped without touching the store;
    /// unknown ids are counted and ignored. Callbacks fire for any frame with
    /// a registered id, even ones the decoder has no layout for, which is how
    /// consumers sniff ids this crate does not model.
    pub fn decode(&mut self, frame: &TelemetryFrame, store: &VehicleStateStore) {
        let payload = frame.payload();
        let updates = match frame.id {
            ids::ENGINE_A => decode_engine_a(payload),
            ids::ENGINE_B => decode_engine_b(payload),
            ids::TRANSMISSION => decode_transmission(payload),
            ids::STABILITY => decode_stability(payload),
            ids::OIL_FLUIDS => decode_oil_fluids(payload),
            other => {
                trace!(id = format_args!("{other:#x}"), "ignoring unknown frame id");
                self.unknown_frames += 1;
                self.bus.dispatch(frame);
                return;
            }
        };

        match updates {
            Ok(updates) => {
                store.apply_all(&updates, frame.received_at);
                self.decoded_frames += 1;
            }
            Err(e) => {
                trace!(error = %e, "dropping short frame");
                self.short_frames += 1;
            }
        }

        self.bus.dispatch(frame);
    }

    /// (decoded, short, unknown) frame counters since start.
    pub fn counters(&self) -> (u64, u64, u64) {
        (self.decoded_frames, self.short_frames, self.unknown_frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::encode_engine_a;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    fn frame(id: u32, payload: &[u8]) -> TelemetryFrame {
        TelemetryFrame::new(id, payload, Instant::now())
    }

    #[test]
    fn engine_a_scenario_bytes_decode_exactly() {
        let store = VehicleStateStore::new(Instant::now());
        let mut decoder = FrameDecoder::new(FrameBus::new());

        decoder
            .decode(&frame(ids::ENGINE_A, &[0x0B, 0xB8, 0x32, 0xFF, 0x5A, 0x46, 0x03, 0x20]), &store);

        let snap = store.snapshot();
        assert_eq!(snap.rpm.value, 750.0);
        assert_eq!(snap.speed_kph.value, 50.0);
        assert_eq!(snap.throttle_pct.value, 100.0);
        assert_eq!(snap.coolant_c.value, 50.0);
        assert_eq!(snap.intake_c.value, 30.0);
        assert_eq!(snap.maf_g_s.value, 8.0);
    }

    #[test]
    fn engine_b_scaling_matches_the_layout() {
        let store = VehicleStateStore::new(Instant::now());
        let mut decoder = FrameDecoder::new(FrameBus::new());

        // b3 = 0x94 = 148 -> (148-128)*0.019*14.5038 boost psi
        decoder.decode(&frame(ids::ENGINE_B, &[0x90, 0x8C, 0x92, 0x94, 0x80, 0x55, 0x02, 0x03]), &store);

        let snap = store.snapshot();
        assert_eq!(snap.ignition_deg.value, 0x90 as f32 / 2.0 - 64.0);
        assert_eq!(snap.battery_v.value, 14.0);
        assert_eq!(snap.afr.value, 14.6);
        assert!((snap.boost_psi.value - 20.0 * 0.019 * 14.5038).abs() < 1e-4);
        assert!((snap.wastegate_pct.value - 128.0 * 0.392_156_86).abs() < 1e-4);
        assert_eq!(snap.ethanol_pct.value, 85.0);
        assert_eq!(snap.knock_count.value, 2);
        assert_eq!(snap.knock_retard_deg.value, 1.5);
    }

    #[test]
    fn transmission_bits_unpack() {
        let store = VehicleStateStore::new(Instant::now());
        let mut decoder = FrameDecoder::new(FrameBus::new());

        decoder.decode(&frame(ids::TRANSMISSION, &[0x43, 0b0000_0101]), &store);

        let snap = store.snapshot();
        assert_eq!(snap.current_gear.value, 3);
        assert_eq!(snap.target_gear.value, 4);
        assert!(snap.clutch.value);
        assert!(!snap.brake.value);
        assert!(snap.cruise.value);
    }

    #[test]
    fn stability_flags_unpack() {
        let store = VehicleStateStore::new(Instant::now());
        let mut decoder = FrameDecoder::new(FrameBus::new());

        decoder.decode(&frame(ids::STABILITY, &[0b10]), &store);
        let snap = store.snapshot();
        assert!(!snap.dsc_active.value);
        assert!(snap.traction_active.value);
    }

    #[test]
    fn oil_fluids_layout_decodes() {
        let store = VehicleStateStore::new(Instant::now());
        let mut decoder = FrameDecoder::new(FrameBus::new());

        decoder.decode(&frame(ids::OIL_FLUIDS, &[0x8C, 0x01, 0x90, 0x80]), &store);
        let snap = store.snapshot();
        assert_eq!(snap.oil_temp_c.value, 100.0);
        assert_eq!(snap.oil_pressure_kpa.value, 400.0);
        assert!((snap.fuel_level_pct.value - 128.0 * 100.0 / 255.0).abs() < 1e-4);
    }

    #[test]
    fn short_frame_is_dropped_without_state_mutation() {
        let epoch = Instant::now();
        let store = VehicleStateStore::new(epoch);
        let mut decoder = FrameDecoder::new(FrameBus::new());
        let before = store.snapshot();

        decoder.decode(&frame(ids::ENGINE_A, &[0x0B, 0xB8, 0x32]), &store);

        assert_eq!(store.snapshot(), before);
        assert_eq!(decoder.counters(), (0, 1, 0));
    }

    #[test]
    fn unknown_id_is_ignored_not_an_error() {
        let store = VehicleStateStore::new(Instant::now());
        let mut decoder = FrameDecoder::new(FrameBus::new());
        let before = store.snapshot();

        decoder.decode(&frame(0x7DF, &[0xFF; 8]), &store);

        assert_eq!(store.snapshot(), before);
        assert_eq!(decoder.counters(), (0, 0, 1));
    }

    #[test]
    fn callbacks_run_once_per_frame_in_registration_order() {
        let store = VehicleStateStore::new(Instant::now());
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut bus = FrameBus::new();
        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            bus.register(
                ids::ENGINE_A,
                Box::new(move |_: &TelemetryFrame| {
                    order.lock().unwrap().push(tag);
                    Ok(())
                }),
            );
        }
        let mut decoder = FrameDecoder::new(bus);

        decoder.decode(&frame(ids::ENGINE_A, &encode_engine_a(750.0, 50, 255, 50.0, 30.0, 8.0)), &store);

        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn failing_callback_does_not_stop_the_rest() {
        let store = VehicleStateStore::new(Instant::now());
        let calls = Arc::new(AtomicU32::new(0));
        let mut bus = FrameBus::new();

        bus.register(
            ids::ENGINE_A,
            Box::new(|_: &TelemetryFrame| Err(TelemetryError::transport("observer died"))),
        );
        let calls_after = Arc::clone(&calls);
        bus.register(
            ids::ENGINE_A,
            Box::new(move |_: &TelemetryFrame| {
                calls_after.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        let mut decoder = FrameDecoder::new(bus);

        decoder.decode(&frame(ids::ENGINE_A, &encode_engine_a(750.0, 50, 255, 50.0, 30.0, 8.0)), &store);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callbacks_fire_for_registered_unknown_ids() {
        let store = VehicleStateStore::new(Instant::now());
        let calls = Arc::new(AtomicU32::new(0));
        let mut bus = FrameBus::new();
        let calls_cb = Arc::clone(&calls);
        bus.register(
            0x7DF,
            Box::new(move |_: &TelemetryFrame| {
                calls_cb.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        let mut decoder = FrameDecoder::new(bus);

        decoder.decode(&frame(0x7DF, &[0x01]), &store);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    proptest! {
        #[test]
        fn engine_a_rpm_roundtrips_through_the_encoder(raw_rpm in 0u16..=u16::MAX) {
            // rpm comes off the wire as be_u16/4; re-encode and decode must
            // agree exactly for every representable value.
            let rpm = raw_rpm as f32 / 4.0;
            let bytes = encode_engine_a(rpm, 0, 0, 0.0, 0.0, 0.0);
            let updates = decode_engine_a(&bytes).unwrap();
            prop_assert_eq!(updates[0], FieldUpdate::Rpm(rpm));
        }

        #[test]
        fn no_payload_ever_panics_the_decoder(
            id in prop::sample::select(vec![
                ids::ENGINE_A, ids::ENGINE_B, ids::TRANSMISSION, ids::STABILITY,
                ids::OIL_FLUIDS, 0x7DFu32,
            ]),
            payload in prop::collection::vec(any::<u8>(), 0..=8)
        ) {
            let store = VehicleStateStore::new(Instant::now());
            let mut decoder = FrameDecoder::new(FrameBus::new());
            decoder.decode(&frame(id, &payload), &store);
        }
    }
}
