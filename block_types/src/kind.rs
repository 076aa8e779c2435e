//! Block opcodes

use serde::de::value::{Error as ValueError, StrDeserializer};
use serde::de::IntoDeserializer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Known block opcodes.
///
/// The discriminant is the byte stored at offset 0 of a [`crate::BlockData`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum BlockType {
    Begin = 0x01,
    End = 0x02,

    Forward = 0x10,
    Backward = 0x11,
    TurnRight = 0x12,
    TurnLeft = 0x13,
    Shake = 0x14,
    Spin = 0x15,

    Repeat = 0x20,
    EndRepeat = 0x21,
    If = 0x22,
    EndIf = 0x23,

    Beep = 0x30,
    Sing = 0x31,
    PlayTriangle = 0x32,
    PlayCircle = 0x33,
    PlaySquare = 0x34,

    WhiteLightOn = 0x40,
    RedLightOn = 0x41,
    BlueLightOn = 0x42,

    WaitForClap = 0x50,

    Param2 = 0x60,
    Param3 = 0x61,
    Param4 = 0x62,
    ParamForever = 0x63,
    ParamLight = 0x64,
    ParamDark = 0x65,
    ParamNear = 0x66,
    ParamFar = 0x67,
    ParamUntilLight = 0x68,
    ParamUntilDark = 0x69,
    ParamUntilNear = 0x6A,
    ParamUntilFar = 0x6B,

    SensorLightBulb = 0x70,
    SensorEar = 0x71,
    SensorEye = 0x72,
    SensorTelescope = 0x73,
    SensorSoundModule = 0x74,

    EyesNormal = 0x80,
    EyesHappy = 0x81,
    EyesSad = 0x82,
    EyesAngry = 0x83,
    EyesSurprised = 0x84,
    EyesSleeping = 0x85,
    EyesExcited = 0x86,
    EyesFocused = 0x87,

    EyesLookCenter = 0x88,
    EyesLookLeft = 0x89,
    EyesLookRight = 0x8A,
    EyesLookUp = 0x8B,
    EyesLookDown = 0x8C,
}

/// Coarse grouping of opcodes, mostly for display and dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockCategory {
    Action,
    Movement,
    ControlFlow,
    Sound,
    Light,
    Wait,
    Parameter,
    Sensor,
    Expression,
    LookDirection,
}

impl BlockType {
    /// Every known opcode, in opcode order.
    pub const ALL: [BlockType; 51] = [
        BlockType::Begin,
        BlockType::End,
        BlockType::Forward,
        BlockType::Backward,
        BlockType::TurnRight,
        BlockType::TurnLeft,
        BlockType::Shake,
        BlockType::Spin,
        BlockType::Repeat,
        BlockType::EndRepeat,
        BlockType::If,
        BlockType::EndIf,
        BlockType::Beep,
        BlockType::Sing,
        BlockType::PlayTriangle,
        BlockType::PlayCircle,
        BlockType::PlaySquare,
        BlockType::WhiteLightOn,
        BlockType::RedLightOn,
        BlockType::BlueLightOn,
        BlockType::WaitForClap,
        BlockType::Param2,
        BlockType::Param3,
        BlockType::Param4,
        BlockType::ParamForever,
        BlockType::ParamLight,
        BlockType::ParamDark,
        BlockType::ParamNear,
        BlockType::ParamFar,
        BlockType::ParamUntilLight,
        BlockType::ParamUntilDark,
        BlockType::ParamUntilNear,
        BlockType::ParamUntilFar,
        BlockType::SensorLightBulb,
        BlockType::SensorEar,
        BlockType::SensorEye,
        BlockType::SensorTelescope,
        BlockType::SensorSoundModule,
        BlockType::EyesNormal,
        BlockType::EyesHappy,
        BlockType::EyesSad,
        BlockType::EyesAngry,
        BlockType::EyesSurprised,
        BlockType::EyesSleeping,
        BlockType::EyesExcited,
        BlockType::EyesFocused,
        BlockType::EyesLookCenter,
        BlockType::EyesLookLeft,
        BlockType::EyesLookRight,
        BlockType::EyesLookUp,
        BlockType::EyesLookDown,
    ];

    /// Decodes an opcode byte. Returns `None` for bytes outside the closed set.
    pub fn from_u8(value: u8) -> Option<Self> {
        use BlockType::*;
        let kind = match value {
            0x01 => Begin,
            0x02 => End,
            0x10 => Forward,
            0x11 => Backward,
            0x12 => TurnRight,
            0x13 => TurnLeft,
            0x14 => Shake,
            0x15 => Spin,
            0x20 => Repeat,
            0x21 => EndRepeat,
            0x22 => If,
            0x23 => EndIf,
            0x30 => Beep,
            0x31 => Sing,
            0x32 => PlayTriangle,
            0x33 => PlayCircle,
            0x34 => PlaySquare,
            0x40 => WhiteLightOn,
            0x41 => RedLightOn,
            0x42 => BlueLightOn,
            0x50 => WaitForClap,
            0x60 => Param2,
            0x61 => Param3,
            0x62 => Param4,
            0x63 => ParamForever,
            0x64 => ParamLight,
            0x65 => ParamDark,
            0x66 => ParamNear,
            0x67 => ParamFar,
            0x68 => ParamUntilLight,
            0x69 => ParamUntilDark,
            0x6A => ParamUntilNear,
            0x6B => ParamUntilFar,
            0x70 => SensorLightBulb,
            0x71 => SensorEar,
            0x72 => SensorEye,
            0x73 => SensorTelescope,
            0x74 => SensorSoundModule,
            0x80 => EyesNormal,
            0x81 => EyesHappy,
            0x82 => EyesSad,
            0x83 => EyesAngry,
            0x84 => EyesSurprised,
            0x85 => EyesSleeping,
            0x86 => EyesExcited,
            0x87 => EyesFocused,
            0x88 => EyesLookCenter,
            0x89 => EyesLookLeft,
            0x8A => EyesLookRight,
            0x8B => EyesLookUp,
            0x8C => EyesLookDown,
            _ => return None,
        };
        Some(kind)
    }

    /// Returns the opcode byte.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns true if `value` is a member of the closed opcode set.
    pub fn is_valid(value: u8) -> bool {
        Self::from_u8(value).is_some()
    }

    /// Returns the category this opcode belongs to.
    pub fn category(self) -> BlockCategory {
        match self.as_u8() {
            0x01..=0x02 => BlockCategory::Action,
            0x10..=0x15 => BlockCategory::Movement,
            0x20..=0x23 => BlockCategory::ControlFlow,
            0x30..=0x34 => BlockCategory::Sound,
            0x40..=0x42 => BlockCategory::Light,
            0x50 => BlockCategory::Wait,
            0x60..=0x6B => BlockCategory::Parameter,
            0x70..=0x74 => BlockCategory::Sensor,
            0x80..=0x87 => BlockCategory::Expression,
            _ => BlockCategory::LookDirection,
        }
    }

    /// Repeat count carried by a parameter block, if it is one of the
    /// count-style parameters.
    ///
    /// `Some(None)` is the "forever" sentinel.
    pub fn repeat_param(self) -> Option<Option<u32>> {
        match self {
            BlockType::Param2 => Some(Some(2)),
            BlockType::Param3 => Some(Some(3)),
            BlockType::Param4 => Some(Some(4)),
            BlockType::ParamForever => Some(None),
            _ => None,
        }
    }

    /// Human readable default label, used when composing blocks without a name.
    pub fn label(self) -> &'static str {
        use BlockType::*;
        match self {
            Begin => "Begin",
            End => "End",
            Forward => "Forward",
            Backward => "Backward",
            TurnRight => "Turn Right",
            TurnLeft => "Turn Left",
            Shake => "Shake",
            Spin => "Spin",
            Repeat => "Repeat",
            EndRepeat => "End Repeat",
            If => "If",
            EndIf => "End If",
            Beep => "Beep",
            Sing => "Sing",
            PlayTriangle => "Play Triangle",
            PlayCircle => "Play Circle",
            PlaySquare => "Play Square",
            WhiteLightOn => "White Light",
            RedLightOn => "Red Light",
            BlueLightOn => "Blue Light",
            WaitForClap => "Wait For Clap",
            Param2 => "2",
            Param3 => "3",
            Param4 => "4",
            ParamForever => "Forever",
            ParamLight => "Light",
            ParamDark => "Dark",
            ParamNear => "Near",
            ParamFar => "Far",
            ParamUntilLight => "Until Light",
            ParamUntilDark => "Until Dark",
            ParamUntilNear => "Until Near",
            ParamUntilFar => "Until Far",
            SensorLightBulb => "Light Bulb",
            SensorEar => "Ear",
            SensorEye => "Eye",
            SensorTelescope => "Telescope",
            SensorSoundModule => "Sound Module",
            EyesNormal => "Eyes Normal",
            EyesHappy => "Eyes Happy",
            EyesSad => "Eyes Sad",
            EyesAngry => "Eyes Angry",
            EyesSurprised => "Eyes Surprised",
            EyesSleeping => "Eyes Sleeping",
            EyesExcited => "Eyes Excited",
            EyesFocused => "Eyes Focused",
            EyesLookCenter => "Look Center",
            EyesLookLeft => "Look Left",
            EyesLookRight => "Look Right",
            EyesLookUp => "Look Up",
            EyesLookDown => "Look Down",
        }
    }

    /// Parses a snake_case opcode name (`"turn_left"`) or a hex byte (`"0x13"`).
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if let Some(hex) = name.strip_prefix("0x").or_else(|| name.strip_prefix("0X")) {
            return u8::from_str_radix(hex, 16).ok().and_then(Self::from_u8);
        }
        // Names go through the serde representation so scripts and compose
        // requests cannot drift from the derive.
        let lowered = name.to_ascii_lowercase();
        let deserializer: StrDeserializer<'_, ValueError> = lowered.as_str().into_deserializer();
        BlockType::deserialize(deserializer).ok()
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.label(), self.as_u8())
    }
}

impl TryFrom<u8> for BlockType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_u8(value).ok_or(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_is_exhaustive() {
        for kind in BlockType::ALL {
            assert_eq!(BlockType::from_u8(kind.as_u8()), Some(kind));
        }
        let known = (0u8..=255).filter(|v| BlockType::is_valid(*v)).count();
        assert_eq!(known, BlockType::ALL.len());
    }

    #[test]
    fn test_from_u8_roundtrips_known_opcodes() {
        for value in 0u8..=255 {
            if let Some(kind) = BlockType::from_u8(value) {
                assert_eq!(kind.as_u8(), value);
            }
        }
    }

    #[test]
    fn test_closed_set_size() {
        let known = (0u8..=255).filter(|v| BlockType::is_valid(*v)).count();
        assert_eq!(known, 51);
    }

    #[test]
    fn test_unknown_opcodes_rejected() {
        assert_eq!(BlockType::from_u8(0x00), None);
        assert_eq!(BlockType::from_u8(0x16), None);
        assert_eq!(BlockType::from_u8(0x8D), None);
        assert_eq!(BlockType::from_u8(0xFF), None);
        assert_eq!(BlockType::try_from(0x99), Err(0x99));
    }

    #[test]
    fn test_categories() {
        assert_eq!(BlockType::End.category(), BlockCategory::Action);
        assert_eq!(BlockType::Spin.category(), BlockCategory::Movement);
        assert_eq!(BlockType::EndRepeat.category(), BlockCategory::ControlFlow);
        assert_eq!(BlockType::ParamUntilFar.category(), BlockCategory::Parameter);
        assert_eq!(BlockType::SensorEar.category(), BlockCategory::Sensor);
        assert_eq!(BlockType::EyesFocused.category(), BlockCategory::Expression);
        assert_eq!(BlockType::EyesLookDown.category(), BlockCategory::LookDirection);
    }

    #[test]
    fn test_repeat_params() {
        assert_eq!(BlockType::Param2.repeat_param(), Some(Some(2)));
        assert_eq!(BlockType::Param4.repeat_param(), Some(Some(4)));
        assert_eq!(BlockType::ParamForever.repeat_param(), Some(None));
        assert_eq!(BlockType::ParamLight.repeat_param(), None);
        assert_eq!(BlockType::Forward.repeat_param(), None);
    }

    #[test]
    fn test_from_name() {
        assert_eq!(BlockType::from_name("forward"), Some(BlockType::Forward));
        assert_eq!(BlockType::from_name("Turn_Left"), Some(BlockType::TurnLeft));
        assert_eq!(BlockType::from_name("param_forever"), Some(BlockType::ParamForever));
        assert_eq!(BlockType::from_name("0x20"), Some(BlockType::Repeat));
        assert_eq!(BlockType::from_name("0x99"), None);
        assert_eq!(BlockType::from_name("teleport"), None);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&BlockType::EyesLookUp).unwrap();
        assert_eq!(json, "\"eyes_look_up\"");
    }
}
