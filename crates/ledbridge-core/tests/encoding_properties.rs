// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Encoder and store properties checked across the whole input domain

use ledbridge_core::{
    encode, BrightnessRange, CommandEncoder, DesiredState, DeviceProfile, FrameKind,
    PartialState, PowerState, Rgb, StateStore,
};

fn profiles() -> Vec<DeviceProfile> {
    vec![DeviceProfile::elk_bledom(), DeviceProfile::lotus()]
}

#[test]
fn rescale_is_in_range_and_monotonic() {
    for profile in profiles() {
        let range = profile.brightness_range();
        assert!(range.min >= 1);
        assert_eq!(range.rescale(0), range.min);
        assert_eq!(range.rescale(255), range.max);

        let mut last = 0;
        for b in 0..=255u8 {
            let native = range.rescale(b);
            assert!(native >= range.min && native <= range.max, "{} -> {}", b, native);
            assert!(native >= last, "not monotonic at {}", b);
            last = native;
        }
    }
}

#[test]
fn degenerate_range_is_constant() {
    let range = BrightnessRange::new(7, 7).unwrap();
    assert!((0..=255u8).all(|b| range.rescale(b) == 7));
    assert!(BrightnessRange::new(10, 9).is_err());
}

#[test]
fn off_is_exactly_one_off_frame() {
    for profile in profiles() {
        for wake in [false, true] {
            for brightness in [0u8, 128, 255] {
                let state = DesiredState {
                    power: PowerState::Off,
                    brightness,
                    color: Rgb::new(brightness, 0, 255),
                };
                let frames = encode(&profile, &state, wake);
                assert_eq!(frames.len(), 1);
                assert_eq!(frames[0].kind(), FrameKind::Off);
            }
        }
    }
}

#[test]
fn wake_first_iff_reconnect() {
    for profile in profiles() {
        let state = DesiredState::default();

        let with_wake = encode(&profile, &state, true);
        assert_eq!(with_wake[0].kind(), FrameKind::Wake);
        assert_eq!(
            with_wake.iter().filter(|f| f.kind() == FrameKind::Wake).count(),
            1
        );

        let without = encode(&profile, &state, false);
        assert!(without.iter().all(|f| f.kind() != FrameKind::Wake));
        assert_eq!(&with_wake[1..], &without[..]);
    }
}

#[test]
fn frames_share_marker_and_trailer() {
    let encoder = CommandEncoder::new(DeviceProfile::elk_bledom());
    let frames = encoder.encode(&DesiredState::default(), true);
    for frame in &frames {
        let bytes = frame.as_bytes();
        assert_eq!(bytes[0], 0x7e);
        assert_eq!(bytes[bytes.len() - 1], 0xef);
    }
}

#[test]
fn repeated_update_is_idempotent() {
    let once = StateStore::default();
    let twice = StateStore::default();
    let update = PartialState::from_json(br#"{"brightness":100}"#).unwrap();

    once.apply_update(&update);
    twice.apply_update(&update);
    let second = twice.apply_update(&update);

    assert_eq!(once.current(), twice.current());
    assert!(!second.changed());
}

#[test]
fn wake_flag_only_for_off_to_on() {
    let cases = [
        (PowerState::Off, Some(PowerState::On), true),
        (PowerState::Off, Some(PowerState::Off), false),
        (PowerState::Off, None, false),
        (PowerState::On, Some(PowerState::On), false),
        (PowerState::On, Some(PowerState::Off), false),
        (PowerState::On, None, false),
    ];
    for (stored, update, expected) in cases {
        let store = StateStore::new(DesiredState {
            power: stored,
            ..DesiredState::default()
        });
        let update = PartialState {
            power: update,
            brightness: Some(10),
            ..PartialState::default()
        };
        assert_eq!(
            store.apply_update(&update).woke_from_off,
            expected,
            "{:?} + {:?}",
            stored,
            update.power
        );
    }
}
