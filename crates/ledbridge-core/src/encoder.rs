// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Desired state to BLE command frames
//!
//! Encoding is pure and deterministic: the same state, profile and wake flag
//! always produce the same frames in the same order.

use std::fmt;
use std::sync::Arc;

use crate::profile::{DeviceProfile, FrameTemplate, SlotValues};
use crate::state::DesiredState;

/// What a frame does on the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Wake,
    Off,
    Color,
    Brightness,
    Keepalive,
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameKind::Wake => "wake",
            FrameKind::Off => "off",
            FrameKind::Color => "color",
            FrameKind::Brightness => "brightness",
            FrameKind::Keepalive => "keepalive",
        };
        f.write_str(name)
    }
}

/// Immutable byte payload for one characteristic write
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandFrame {
    kind: FrameKind,
    bytes: Box<[u8]>,
}

impl CommandFrame {
    fn render(kind: FrameKind, template: &FrameTemplate, values: &SlotValues) -> Self {
        Self {
            kind,
            bytes: template.render(values).into_boxed_slice(),
        }
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Lowercase hex, e.g. `off:7e0404000000ff00ef`
impl fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.kind)?;
        for byte in self.bytes.iter() {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Encode a desired state into the ordered frames that realize it.
///
/// * `Off` is exactly one Off frame; brightness and color are not sent.
/// * `On` is an optional Wake frame (only when `wake` is set), then either one
///   combined color frame or a Color frame followed by a Brightness frame.
pub fn encode(profile: &DeviceProfile, state: &DesiredState, wake: bool) -> Vec<CommandFrame> {
    let values = SlotValues {
        r: state.color.r,
        g: state.color.g,
        b: state.color.b,
        brightness: profile.brightness_range().rescale(state.brightness),
    };

    if !state.is_on() {
        return vec![CommandFrame::render(FrameKind::Off, profile.off_template(), &values)];
    }

    let mut frames = Vec::with_capacity(3);
    if wake {
        frames.push(CommandFrame::render(FrameKind::Wake, profile.wake_template(), &values));
    }
    frames.push(CommandFrame::render(FrameKind::Color, profile.color_template(), &values));
    if let Some(template) = profile.brightness_template() {
        frames.push(CommandFrame::render(FrameKind::Brightness, template, &values));
    }
    frames
}

/// Shared encoder bound to one device profile
#[derive(Debug, Clone)]
pub struct CommandEncoder {
    profile: Arc<DeviceProfile>,
}

impl CommandEncoder {
    pub fn new(profile: DeviceProfile) -> Self {
        Self {
            profile: Arc::new(profile),
        }
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn encode(&self, state: &DesiredState, wake: bool) -> Vec<CommandFrame> {
        encode(&self.profile, state, wake)
    }

    /// Frames for a keepalive tick: the profile's keepalive frame, or the
    /// current state frames without wake when the profile defines none.
    pub fn keepalive(&self, state: &DesiredState) -> Vec<CommandFrame> {
        match self.profile.keepalive_template() {
            Some(template) => {
                let values = SlotValues { r: 0, g: 0, b: 0, brightness: 0 };
                vec![CommandFrame::render(FrameKind::Keepalive, template, &values)]
            }
            None => self.encode(state, false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileDefinition;
    use crate::state::{PowerState, Rgb};

    fn on(brightness: u8, r: u8, g: u8, b: u8) -> DesiredState {
        DesiredState {
            power: PowerState::On,
            brightness,
            color: Rgb::new(r, g, b),
        }
    }

    fn kinds(frames: &[CommandFrame]) -> Vec<FrameKind> {
        frames.iter().map(CommandFrame::kind).collect()
    }

    #[test]
    fn test_elk_bledom_color_then_brightness() {
        let frames = encode(&DeviceProfile::elk_bledom(), &on(128, 10, 20, 30), false);
        assert_eq!(kinds(&frames), vec![FrameKind::Color, FrameKind::Brightness]);
        assert_eq!(
            frames[0].as_bytes(),
            &[0x7e, 0x07, 0x05, 0x03, 10, 20, 30, 0x00, 0xef]
        );
        // 1 + 128 * 99 / 255 = 50
        assert_eq!(frames[1].as_bytes(), &[0x7e, 0x05, 0x01, 50, 0x00, 0x00, 0x00, 0xef]);
    }

    #[test]
    fn test_lotus_single_combined_frame() {
        let frames = encode(&DeviceProfile::lotus(), &on(0, 1, 2, 3), false);
        assert_eq!(kinds(&frames), vec![FrameKind::Color]);
        assert_eq!(frames[0].as_bytes(), &[0x7e, 0x07, 0x05, 0x03, 1, 2, 3, 16, 0xef]);
    }

    #[test]
    fn test_wake_prefix() {
        let frames = encode(&DeviceProfile::elk_bledom(), &on(255, 255, 255, 255), true);
        assert_eq!(
            kinds(&frames),
            vec![FrameKind::Wake, FrameKind::Color, FrameKind::Brightness]
        );
        assert_eq!(
            frames[0].as_bytes(),
            &[0x7e, 0x04, 0x04, 0x01, 0x00, 0x00, 0xff, 0x00, 0xef]
        );
    }

    #[test]
    fn test_off_ignores_wake() {
        let state = DesiredState {
            power: PowerState::Off,
            ..DesiredState::default()
        };
        let frames = encode(&DeviceProfile::elk_bledom(), &state, true);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].to_string(), "off:7e0404000000ff00ef");
    }

    #[test]
    fn test_keepalive_falls_back_to_state_frames() {
        let encoder = CommandEncoder::new(DeviceProfile::elk_bledom());
        let frames = encoder.keepalive(&DesiredState::default());
        assert_eq!(kinds(&frames), vec![FrameKind::Color, FrameKind::Brightness]);

        let mut def = DeviceProfile::builtin_definition("lotus").unwrap();
        def.keepalive = Some("7e 00 ef".to_string());
        let encoder = CommandEncoder::new(DeviceProfile::from_definition(&def).unwrap());
        let frames = encoder.keepalive(&DesiredState::default());
        assert_eq!(kinds(&frames), vec![FrameKind::Keepalive]);
        assert_eq!(frames[0].as_bytes(), &[0x7e, 0x00, 0xef]);
    }

    #[test]
    fn test_custom_profile_renders_all_slots() {
        let def = ProfileDefinition {
            name: "custom".to_string(),
            wake: "aa01bb".to_string(),
            off: "aa02bb".to_string(),
            color: "aa03{b}{g}{r}{brightness}bb".to_string(),
            brightness: None,
            keepalive: None,
            brightness_min: 1,
            brightness_max: 255,
        };
        let profile = DeviceProfile::from_definition(&def).unwrap();
        let frames = encode(&profile, &on(255, 1, 2, 3), false);
        assert_eq!(frames[0].as_bytes(), &[0xaa, 0x03, 3, 2, 1, 255, 0xbb]);
    }
}
