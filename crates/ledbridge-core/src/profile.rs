// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Device frame tables
//!
//! A controller model is described entirely by data: a handful of frame
//! templates and the native brightness range. Supporting another model means
//! supplying another table, not another code path.
//!
//! Templates are hex strings. Each byte is either a literal (`7e`) or a
//! one-byte slot filled at encode time:
//!
//! | Slot           | Value                                   |
//! |----------------|-----------------------------------------|
//! | `{r}` `{g}` `{b}` | color channel, 0-255                 |
//! | `{brightness}` | brightness rescaled to the native range |
//!
//! Whitespace between bytes is ignored, so `"7e 07 05 03 {r}{g}{b} 00 ef"`
//! is the same template as `"7e070503{r}{g}{b}00ef"`.

use std::fmt;

use crate::error::ProfileError;

/// Variable byte inside a frame template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Red,
    Green,
    Blue,
    Brightness,
}

impl Slot {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "r" => Some(Slot::Red),
            "g" => Some(Slot::Green),
            "b" => Some(Slot::Blue),
            "brightness" => Some(Slot::Brightness),
            _ => None,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Slot::Red => "{r}",
            Slot::Green => "{g}",
            Slot::Blue => "{b}",
            Slot::Brightness => "{brightness}",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TemplateByte {
    Literal(u8),
    Slot(Slot),
}

/// Values substituted into template slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotValues {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub brightness: u8,
}

impl SlotValues {
    fn get(&self, slot: Slot) -> u8 {
        match slot {
            Slot::Red => self.r,
            Slot::Green => self.g,
            Slot::Blue => self.b,
            Slot::Brightness => self.brightness,
        }
    }
}

/// Fixed-length frame layout with literal bytes and slots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameTemplate {
    bytes: Vec<TemplateByte>,
}

impl FrameTemplate {
    /// Parse a template string. `frame` names the template in errors.
    pub fn parse(frame: &'static str, text: &str) -> Result<Self, ProfileError> {
        let mut bytes = Vec::new();
        let mut chars = text.chars().filter(|c| !c.is_ascii_whitespace()).peekable();

        while let Some(c) = chars.next() {
            if c == '{' {
                let mut name = String::new();
                let mut closed = false;
                for next in chars.by_ref() {
                    if next == '}' {
                        closed = true;
                        break;
                    }
                    name.push(next);
                }
                if !closed {
                    return Err(ProfileError::UnterminatedSlot { frame });
                }
                let slot = Slot::from_name(&name)
                    .ok_or(ProfileError::UnknownSlot { frame, name })?;
                bytes.push(TemplateByte::Slot(slot));
                continue;
            }

            let low = match chars.peek() {
                Some(&next) if next != '{' => next,
                _ => return Err(ProfileError::OddHexDigits { frame }),
            };
            chars.next();
            let pair: String = [c, low].iter().collect();
            let value = u8::from_str_radix(&pair, 16)
                .map_err(|_| ProfileError::InvalidHex { frame, text: pair })?;
            bytes.push(TemplateByte::Literal(value));
        }

        if bytes.is_empty() {
            return Err(ProfileError::EmptyTemplate { frame });
        }
        Ok(Self { bytes })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn has_slot(&self, slot: Slot) -> bool {
        self.bytes.contains(&TemplateByte::Slot(slot))
    }

    fn slots(&self) -> impl Iterator<Item = Slot> + '_ {
        self.bytes.iter().filter_map(|b| match b {
            TemplateByte::Slot(slot) => Some(*slot),
            TemplateByte::Literal(_) => None,
        })
    }

    /// Protocol marker and trailer bytes, if both ends are literals
    fn framing(&self) -> Option<(u8, u8)> {
        match (self.bytes.first(), self.bytes.last()) {
            (Some(TemplateByte::Literal(m)), Some(TemplateByte::Literal(t))) => Some((*m, *t)),
            _ => None,
        }
    }

    pub(crate) fn render(&self, values: &SlotValues) -> Vec<u8> {
        self.bytes
            .iter()
            .map(|b| match b {
                TemplateByte::Literal(v) => *v,
                TemplateByte::Slot(slot) => values.get(*slot),
            })
            .collect()
    }
}

/// Native brightness domain of a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrightnessRange {
    pub min: u8,
    pub max: u8,
}

impl BrightnessRange {
    pub fn new(min: u8, max: u8) -> Result<Self, ProfileError> {
        if min == 0 || min > max {
            return Err(ProfileError::InvalidBrightnessRange { min, max });
        }
        Ok(Self { min, max })
    }

    /// Linear map from the external 0-255 domain.
    ///
    /// `rescale(0) == min`, `rescale(255) == max`. The floor is never zero,
    /// since these controllers read a literal zero as "ignore".
    pub fn rescale(&self, external: u8) -> u8 {
        let span = u32::from(self.max - self.min);
        let scaled = u32::from(external) * span / 255;
        // scaled <= span, so the sum stays within min..=max
        self.min + scaled as u8
    }
}

/// Raw, unvalidated frame table (as found in configuration)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileDefinition {
    pub name: String,
    pub wake: String,
    pub off: String,
    pub color: String,
    pub brightness: Option<String>,
    pub keepalive: Option<String>,
    pub brightness_min: u8,
    pub brightness_max: u8,
}

/// Validated frame table for one controller model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    name: String,
    wake: FrameTemplate,
    off: FrameTemplate,
    color: FrameTemplate,
    brightness: Option<FrameTemplate>,
    keepalive: Option<FrameTemplate>,
    range: BrightnessRange,
}

impl DeviceProfile {
    pub const ELK_BLEDOM: &'static str = "elk-bledom";
    pub const LOTUS: &'static str = "lotus";

    /// Validate a frame table.
    ///
    /// # Errors
    /// * Any template fails to parse
    /// * `wake`, `off` or `keepalive` carry slots
    /// * `color` lacks an RGB slot, or no template carries `{brightness}`
    /// * Templates disagree on marker/trailer bytes
    /// * Brightness range is empty or starts at zero
    pub fn from_definition(def: &ProfileDefinition) -> Result<Self, ProfileError> {
        let wake = FrameTemplate::parse("wake", &def.wake)?;
        let off = FrameTemplate::parse("off", &def.off)?;
        let color = FrameTemplate::parse("color", &def.color)?;
        let brightness = def
            .brightness
            .as_deref()
            .map(|t| FrameTemplate::parse("brightness", t))
            .transpose()?;
        let keepalive = def
            .keepalive
            .as_deref()
            .map(|t| FrameTemplate::parse("keepalive", t))
            .transpose()?;
        let range = BrightnessRange::new(def.brightness_min, def.brightness_max)?;

        for (frame, template) in [("wake", &wake), ("off", &off)]
            .into_iter()
            .chain(keepalive.as_ref().map(|t| ("keepalive", t)))
        {
            if let Some(slot) = template.slots().next() {
                return Err(ProfileError::UnexpectedSlot { frame, slot });
            }
        }

        for slot in [Slot::Red, Slot::Green, Slot::Blue] {
            if !color.has_slot(slot) {
                return Err(ProfileError::MissingSlot { frame: "color", slot });
            }
        }

        if let Some(template) = &brightness {
            if !template.has_slot(Slot::Brightness) {
                return Err(ProfileError::MissingSlot {
                    frame: "brightness",
                    slot: Slot::Brightness,
                });
            }
            if let Some(slot) = template.slots().find(|s| *s != Slot::Brightness) {
                return Err(ProfileError::UnexpectedSlot { frame: "brightness", slot });
            }
        } else if !color.has_slot(Slot::Brightness) {
            return Err(ProfileError::MissingBrightnessSlot);
        }

        let (marker, trailer) = wake
            .framing()
            .ok_or(ProfileError::UnframedTemplate { frame: "wake" })?;
        let others = [("off", Some(&off)), ("color", Some(&color))]
            .into_iter()
            .chain([("brightness", brightness.as_ref()), ("keepalive", keepalive.as_ref())]);
        for (frame, template) in others {
            let Some(template) = template else { continue };
            let (found_marker, found_trailer) = template
                .framing()
                .ok_or(ProfileError::UnframedTemplate { frame })?;
            if (found_marker, found_trailer) != (marker, trailer) {
                return Err(ProfileError::InconsistentFraming {
                    frame,
                    marker,
                    trailer,
                    found_marker,
                    found_trailer,
                });
            }
        }

        Ok(Self {
            name: def.name.clone(),
            wake,
            off,
            color,
            brightness,
            keepalive,
            range,
        })
    }

    /// Look up a built-in profile by name
    pub fn builtin(name: &str) -> Result<Self, ProfileError> {
        match name {
            Self::ELK_BLEDOM => Ok(Self::elk_bledom()),
            Self::LOTUS => Ok(Self::lotus()),
            other => Err(ProfileError::UnknownProfile(other.to_string())),
        }
    }

    /// Raw table of a built-in profile, for use as a base for overrides
    pub fn builtin_definition(name: &str) -> Result<ProfileDefinition, ProfileError> {
        match name {
            Self::ELK_BLEDOM => Ok(ProfileDefinition {
                name: Self::ELK_BLEDOM.to_string(),
                wake: "7e0404010000ff00ef".to_string(),
                off: "7e0404000000ff00ef".to_string(),
                color: "7e070503{r}{g}{b}00ef".to_string(),
                brightness: Some("7e0501{brightness}000000ef".to_string()),
                keepalive: None,
                brightness_min: 1,
                brightness_max: 100,
            }),
            Self::LOTUS => Ok(ProfileDefinition {
                name: Self::LOTUS.to_string(),
                wake: "7e0404010000ff00ef".to_string(),
                off: "7e0404000000ff00ef".to_string(),
                color: "7e070503{r}{g}{b}{brightness}ef".to_string(),
                brightness: None,
                keepalive: None,
                brightness_min: 16,
                brightness_max: 255,
            }),
            other => Err(ProfileError::UnknownProfile(other.to_string())),
        }
    }

    /// ELK-BLEDOM family: separate color and percentage brightness frames
    pub fn elk_bledom() -> Self {
        Self::builtin_static(Self::ELK_BLEDOM)
    }

    /// "Lotus Lamp" firmware: one combined color+brightness frame, 16-255
    pub fn lotus() -> Self {
        Self::builtin_static(Self::LOTUS)
    }

    fn builtin_static(name: &str) -> Self {
        let def = Self::builtin_definition(name).unwrap_or_else(|e| panic!("{}", e));
        Self::from_definition(&def).unwrap_or_else(|e| panic!("built-in profile {}: {}", name, e))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn brightness_range(&self) -> BrightnessRange {
        self.range
    }

    pub fn has_separate_brightness(&self) -> bool {
        self.brightness.is_some()
    }

    pub fn has_keepalive(&self) -> bool {
        self.keepalive.is_some()
    }

    pub(crate) fn wake_template(&self) -> &FrameTemplate {
        &self.wake
    }

    pub(crate) fn off_template(&self) -> &FrameTemplate {
        &self.off
    }

    pub(crate) fn color_template(&self) -> &FrameTemplate {
        &self.color
    }

    pub(crate) fn brightness_template(&self) -> Option<&FrameTemplate> {
        self.brightness.as_ref()
    }

    pub(crate) fn keepalive_template(&self) -> Option<&FrameTemplate> {
        self.keepalive.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom() -> ProfileDefinition {
        ProfileDefinition {
            name: "custom".to_string(),
            wake: "aa 01 55".to_string(),
            off: "aa 02 55".to_string(),
            color: "aa 03 {r}{g}{b}{brightness} 55".to_string(),
            brightness: None,
            keepalive: Some("aa 04 55".to_string()),
            brightness_min: 1,
            brightness_max: 255,
        }
    }

    #[test]
    fn test_builtin_profiles_validate() {
        assert_eq!(DeviceProfile::elk_bledom().name(), "elk-bledom");
        assert!(DeviceProfile::elk_bledom().has_separate_brightness());
        assert!(!DeviceProfile::lotus().has_separate_brightness());
        assert_eq!(DeviceProfile::lotus().brightness_range(), BrightnessRange { min: 16, max: 255 });
        assert!(matches!(
            DeviceProfile::builtin("nope"),
            Err(ProfileError::UnknownProfile(_))
        ));
    }

    #[test]
    fn test_template_parse() {
        let t = FrameTemplate::parse("color", "7e070503{r}{g}{b}00ef").unwrap();
        assert_eq!(t.len(), 9);
        assert!(t.has_slot(Slot::Red));
        assert!(!t.has_slot(Slot::Brightness));

        let values = SlotValues { r: 1, g: 2, b: 3, brightness: 4 };
        assert_eq!(t.render(&values), vec![0x7e, 0x07, 0x05, 0x03, 1, 2, 3, 0x00, 0xef]);
    }

    #[test]
    fn test_template_parse_errors() {
        assert_eq!(
            FrameTemplate::parse("off", "7e0"),
            Err(ProfileError::OddHexDigits { frame: "off" })
        );
        assert_eq!(
            FrameTemplate::parse("off", "7e{r"),
            Err(ProfileError::UnterminatedSlot { frame: "off" })
        );
        assert_eq!(
            FrameTemplate::parse("off", "7e{white}ef"),
            Err(ProfileError::UnknownSlot { frame: "off", name: "white".to_string() })
        );
        assert!(matches!(
            FrameTemplate::parse("off", "7ezz"),
            Err(ProfileError::InvalidHex { .. })
        ));
        assert_eq!(
            FrameTemplate::parse("off", "   "),
            Err(ProfileError::EmptyTemplate { frame: "off" })
        );
    }

    #[test]
    fn test_custom_profile_validates() {
        let profile = DeviceProfile::from_definition(&custom()).unwrap();
        assert!(profile.has_keepalive());
    }

    #[test]
    fn test_slot_in_fixed_frame_rejected() {
        let mut def = custom();
        def.off = "aa 02 {r} 55".to_string();
        assert_eq!(
            DeviceProfile::from_definition(&def),
            Err(ProfileError::UnexpectedSlot { frame: "off", slot: Slot::Red })
        );
    }

    #[test]
    fn test_missing_brightness_slot_rejected() {
        let mut def = custom();
        def.color = "aa 03 {r}{g}{b} 55".to_string();
        assert_eq!(
            DeviceProfile::from_definition(&def),
            Err(ProfileError::MissingBrightnessSlot)
        );
    }

    #[test]
    fn test_inconsistent_framing_rejected() {
        let mut def = custom();
        def.keepalive = Some("7e 04 ef".to_string());
        assert!(matches!(
            DeviceProfile::from_definition(&def),
            Err(ProfileError::InconsistentFraming { frame: "keepalive", .. })
        ));
    }

    #[test]
    fn test_zero_brightness_floor_rejected() {
        let mut def = custom();
        def.brightness_min = 0;
        assert_eq!(
            DeviceProfile::from_definition(&def),
            Err(ProfileError::InvalidBrightnessRange { min: 0, max: 255 })
        );
    }

    #[test]
    fn test_rescale_endpoints() {
        let percent = BrightnessRange::new(1, 100).unwrap();
        assert_eq!(percent.rescale(0), 1);
        assert_eq!(percent.rescale(255), 100);
        assert_eq!(percent.rescale(128), 50);

        let lotus = BrightnessRange::new(16, 255).unwrap();
        assert_eq!(lotus.rescale(0), 16);
        assert_eq!(lotus.rescale(255), 255);
    }
}
