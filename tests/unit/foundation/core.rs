use super::*;

#[test]
fn fps_rejects_zero_parts() {
    assert!(Fps::new(0, 1).is_err());
    assert!(Fps::new(60, 0).is_err());
    assert!(Fps::new(30000, 1001).is_ok());
}

#[test]
fn frame_interval_rounds_up() {
    assert_eq!(Fps::default().frame_interval(), Millis(17));
    assert_eq!(Fps::new(50, 1).unwrap().frame_interval(), Millis(20));
    assert_eq!(Fps::new(30000, 1001).unwrap().frame_interval(), Millis(34));
    assert_eq!(Fps::new(5000, 1).unwrap().frame_interval(), Millis(1));
}

#[test]
fn millis_arithmetic_saturates() {
    assert_eq!(Millis(3).saturating_sub(Millis(5)), Millis::ZERO);
    assert_eq!(Millis(u64::MAX).saturating_add(Millis(1)), Millis(u64::MAX));
    assert_eq!(Millis(7).to_string(), "7ms");
}

#[test]
fn millis_serializes_as_plain_number() {
    assert_eq!(serde_json::to_string(&Millis(42)).unwrap(), "42");
    let m: Millis = serde_json::from_str("16").unwrap();
    assert_eq!(m, Millis(16));
}
