//! Tests for the DC family: metrics decoding, options handling, shunt
//! selection and the command constructors.

use emeter_rs::meter::dc::{
    cmd_get_metrics, cmd_get_opts, cmd_set_alarm_h_thr, cmd_set_alarm_l_thr, cmd_set_shunt,
    DcState, Shunt,
};
use emeter_rs::meter::frame::RxFrame;
use emeter_rs::meter::{ErrKind, Measure};

/// Metrics reply capture for slave 0x0A: 24.50 V, 5.12 A, 120.0 W,
/// 777 Wh, low alarm tripped.
fn metrics_reply() -> RxFrame {
    RxFrame::new(vec![
        0x0A, 0x04, 0x10, 0x09, 0x92, 0x02, 0x00, 0x04, 0xB0, 0x00, 0x00, 0x03, 0x09, 0x00, 0x00,
        0x00, 0x00, 0xFF, 0xFF, 0x5B, 0x58,
    ])
}

/// A full metrics reply populates every field with the family word order.
#[test]
fn test_decode_metrics_reply() {
    let mut state = DcState::new(0x0A);
    assert!(state.apply(&metrics_reply()));

    let m = state.metrics;
    assert_eq!(m.voltage, 2450);
    assert_eq!(m.current, 512);
    assert_eq!(m.power, 1200);
    assert_eq!(m.energy, 777);
    assert!(!m.alarm_high());
    assert!(m.alarm_low());
    assert_eq!(state.err, ErrKind::Ok);
}

/// DC float conversions use centi-volt and centi-ampere scales.
#[test]
fn test_metric_float_conversions() {
    let mut state = DcState::new(0x0A);
    state.apply(&metrics_reply());
    let m = state.metrics;

    assert!((m.as_float(Measure::Voltage) - 24.50).abs() < 1e-4);
    assert!((m.as_float(Measure::Current) - 5.12).abs() < 1e-4);
    assert!((m.as_float(Measure::Power) - 120.0).abs() < 1e-4);
    assert!((m.as_float(Measure::Energy) - 777.0).abs() < 1e-3);
    assert_eq!(m.as_float(Measure::AlarmHigh), 0.0);
    assert_eq!(m.as_float(Measure::AlarmLow), 1.0);
    assert!(m.as_float(Measure::Frequency).is_nan());
    assert!(m.as_float(Measure::PowerFactor).is_nan());
}

/// The four-register options reply refreshes thresholds, address and the
/// shunt range.
#[test]
fn test_options_reply_updates_settings() {
    let mut state = DcState::new(0x0A);
    let reply = RxFrame::new(vec![
        0x0A, 0x03, 0x08, 0x0B, 0xB8, 0x00, 0x64, 0x00, 0x0A, 0x00, 0x01, 0x59, 0x41,
    ]);
    assert!(state.apply(&reply));
    assert_eq!(state.alarm_h_thr, 3000);
    assert_eq!(state.alarm_l_thr, 100);
    assert_eq!(state.addr, 0x0A);
    assert_eq!(state.shunt, Shunt::A50);
}

/// Write echoes refresh the field selected by the echoed register.
#[test]
fn test_write_echoes_update_settings() {
    let mut state = DcState::new(0x0A);

    let shunt_echo = RxFrame::new(vec![0x0A, 0x06, 0x00, 0x03, 0x00, 0x01, 0xB9, 0x71]);
    assert!(state.apply(&shunt_echo));
    assert_eq!(state.shunt, Shunt::A50);

    let addr_echo = RxFrame::new(vec![0x0A, 0x06, 0x00, 0x02, 0x00, 0x15, 0xE8, 0xBE]);
    assert!(state.apply(&addr_echo));
    assert_eq!(state.addr, 0x15);

    let alarm_h = RxFrame::new(vec![0x0A, 0x06, 0x00, 0x00, 0x0B, 0xB8, 0x8F, 0xF3]);
    let mut state = DcState::new(0x0A);
    assert!(state.apply(&alarm_h));
    assert_eq!(state.alarm_h_thr, 3000);

    let alarm_l = RxFrame::new(vec![0x0A, 0x06, 0x00, 0x01, 0x00, 0x64, 0xD8, 0x9A]);
    assert!(state.apply(&alarm_l));
    assert_eq!(state.alarm_l_thr, 100);
}

/// The energy reset echo zeroes the local counter.
#[test]
fn test_reset_echo_zeroes_energy() {
    let mut state = DcState::new(0x0A);
    state.apply(&metrics_reply());
    assert_eq!(state.metrics.energy, 777);

    let mut echo = vec![0x0A, 0x42, 0, 0];
    let crc = emeter_rs::meter::crc::compute(&echo[..2]);
    echo[2..].copy_from_slice(&crc.to_le_bytes());
    assert!(state.apply(&RxFrame::new(echo)));
    assert_eq!(state.metrics.energy, 0);
}

/// Command constructors produce the documented wire layouts.
#[test]
fn test_command_constructors() {
    assert_eq!(
        cmd_get_metrics(0x0A).data,
        vec![0x0A, 0x04, 0x00, 0x00, 0x00, 0x08, 0xF0, 0xB7]
    );
    assert_eq!(
        cmd_get_opts(0x0A).data,
        vec![0x0A, 0x03, 0x00, 0x00, 0x00, 0x04, 0x45, 0x72]
    );
    assert_eq!(
        cmd_set_shunt(Shunt::A50, 0x0A).data,
        vec![0x0A, 0x06, 0x00, 0x03, 0x00, 0x01, 0xB9, 0x71]
    );
    assert_eq!(
        cmd_set_alarm_h_thr(3000, 0x0A).data,
        vec![0x0A, 0x06, 0x00, 0x00, 0x0B, 0xB8, 0x8F, 0xF3]
    );
    assert_eq!(
        cmd_set_alarm_l_thr(100, 0x0A).data,
        vec![0x0A, 0x06, 0x00, 0x01, 0x00, 0x64, 0xD8, 0x9A]
    );
}

/// Shunt register values map onto the defined ranges, unknown values read
/// back as the 100 A default.
#[test]
fn test_shunt_wire_mapping() {
    assert_eq!(Shunt::from_wire(0), Shunt::A100);
    assert_eq!(Shunt::from_wire(1), Shunt::A50);
    assert_eq!(Shunt::from_wire(2), Shunt::A200);
    assert_eq!(Shunt::from_wire(3), Shunt::A300);
    assert_eq!(Shunt::from_wire(9), Shunt::A100);
}
