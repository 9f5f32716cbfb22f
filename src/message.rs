// MIT License - Copyright (c) 2026 The ad2sock authors
// ser2sock keypad client

use std::fmt;

use bitflags::bitflags;

use crate::error::ParseError;

/// Zone number as reported in the keypad numeric code field.
pub type ZoneId = u16;

/// Number of characters in a keypad bit field.
pub const BIT_FIELD_LEN: usize = 20;

bitflags! {
    /// Boolean keypad indicators parsed from the 20-character bit field.
    ///
    /// Each indicator occupies a fixed position; a `1` in that position
    /// sets the flag, any other character leaves it clear.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct KeypadFlags: u16 {
        /// 0 - Ready to arm
        const READY            = 1 << 0;
        /// 1 - Armed away
        const ARMED_AWAY       = 1 << 1;
        /// 2 - Armed home/stay
        const ARMED_HOME       = 1 << 2;
        /// 3 - Keypad backlight on
        const BACKLIGHT        = 1 << 3;
        /// 4 - Keypad in programming mode
        const PROGRAMMING_MODE = 1 << 4;
        /// 6 - A zone is bypassed
        const ZONE_BYPASSED    = 1 << 5;
        /// 7 - AC power present
        const AC_POWER         = 1 << 6;
        /// 8 - Chime enabled
        const CHIME_ENABLED    = 1 << 7;
        /// 9 - Alarm has occurred
        const ALARM_OCCURRED   = 1 << 8;
        /// 10 - Alarm is sounding
        const ALARM_SOUNDING   = 1 << 9;
        /// 11 - Low battery
        const BATTERY_LOW      = 1 << 10;
        /// 12 - Entry delay off
        const ENTRY_DELAY_OFF  = 1 << 11;
        /// 13 - Fire
        const FIRE             = 1 << 12;
        /// 14 - System issue
        const SYSTEM_ISSUE     = 1 << 13;
        /// 15 - Perimeter only
        const PERIMETER_ON     = 1 << 14;
    }
}

/// Bit field positions for each boolean indicator.
const KEYPAD_FLAG_POSITIONS: [(usize, KeypadFlags); 15] = [
    (0, KeypadFlags::READY),
    (1, KeypadFlags::ARMED_AWAY),
    (2, KeypadFlags::ARMED_HOME),
    (3, KeypadFlags::BACKLIGHT),
    (4, KeypadFlags::PROGRAMMING_MODE),
    (6, KeypadFlags::ZONE_BYPASSED),
    (7, KeypadFlags::AC_POWER),
    (8, KeypadFlags::CHIME_ENABLED),
    (9, KeypadFlags::ALARM_OCCURRED),
    (10, KeypadFlags::ALARM_SOUNDING),
    (11, KeypadFlags::BATTERY_LOW),
    (12, KeypadFlags::ENTRY_DELAY_OFF),
    (13, KeypadFlags::FIRE),
    (14, KeypadFlags::SYSTEM_ISSUE),
    (15, KeypadFlags::PERIMETER_ON),
];

const BEEP_POSITION: usize = 5;
const SYS_BITS_POSITION: usize = 16;
const PANEL_TYPE_POSITION: usize = 17;

/// Panel family indicated by position 17 of the bit field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanelKind {
    /// 'A' - Ademco/Honeywell
    Ademco,
    /// 'D' - DSC
    Dsc,
}

/// Decoded keypad bit field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitFields {
    pub flags: KeypadFlags,
    /// Number of beeps requested by the panel (0-9).
    pub beep_count: u8,
    /// Raw system-specific character at position 16.
    pub sys_bits: char,
    pub ademco: bool,
    pub dsc: bool,
}

impl BitFields {
    /// Decode a 20-character bit field string (e.g. `"10000001100000003A--"`).
    ///
    /// Positions 18 and 19 are not interpreted.
    pub fn decode(s: &str) -> Result<Self, ParseError> {
        let chars: Vec<char> = s.chars().collect();
        if chars.len() != BIT_FIELD_LEN {
            return Err(ParseError::BitFieldLength {
                expected: BIT_FIELD_LEN,
                actual: chars.len(),
            });
        }

        let mut flags = KeypadFlags::empty();
        for (pos, flag) in &KEYPAD_FLAG_POSITIONS {
            if chars[*pos] == '1' {
                flags |= *flag;
            }
        }

        let beep = chars[BEEP_POSITION];
        let beep_count = beep
            .to_digit(10)
            .ok_or(ParseError::BeepCount(beep))? as u8;

        let panel_type = chars[PANEL_TYPE_POSITION];

        Ok(Self {
            flags,
            beep_count,
            sys_bits: chars[SYS_BITS_POSITION],
            ademco: panel_type == 'A',
            dsc: panel_type == 'D',
        })
    }

    pub fn panel_kind(&self) -> Option<PanelKind> {
        if self.ademco {
            Some(PanelKind::Ademco)
        } else if self.dsc {
            Some(PanelKind::Dsc)
        } else {
            None
        }
    }

    pub fn ready(&self) -> bool {
        self.flags.contains(KeypadFlags::READY)
    }

    pub fn armed_away(&self) -> bool {
        self.flags.contains(KeypadFlags::ARMED_AWAY)
    }

    pub fn armed_home(&self) -> bool {
        self.flags.contains(KeypadFlags::ARMED_HOME)
    }

    pub fn backlight(&self) -> bool {
        self.flags.contains(KeypadFlags::BACKLIGHT)
    }

    pub fn programming_mode(&self) -> bool {
        self.flags.contains(KeypadFlags::PROGRAMMING_MODE)
    }

    pub fn zone_bypassed(&self) -> bool {
        self.flags.contains(KeypadFlags::ZONE_BYPASSED)
    }

    pub fn ac_power(&self) -> bool {
        self.flags.contains(KeypadFlags::AC_POWER)
    }

    pub fn chime_enabled(&self) -> bool {
        self.flags.contains(KeypadFlags::CHIME_ENABLED)
    }

    pub fn alarm_occurred(&self) -> bool {
        self.flags.contains(KeypadFlags::ALARM_OCCURRED)
    }

    pub fn alarm_sounding(&self) -> bool {
        self.flags.contains(KeypadFlags::ALARM_SOUNDING)
    }

    pub fn battery_low(&self) -> bool {
        self.flags.contains(KeypadFlags::BATTERY_LOW)
    }

    pub fn entry_delay_off(&self) -> bool {
        self.flags.contains(KeypadFlags::ENTRY_DELAY_OFF)
    }

    pub fn fire(&self) -> bool {
        self.flags.contains(KeypadFlags::FIRE)
    }

    pub fn system_issue(&self) -> bool {
        self.flags.contains(KeypadFlags::SYSTEM_ISSUE)
    }

    pub fn perimeter_on(&self) -> bool {
        self.flags.contains(KeypadFlags::PERIMETER_ON)
    }
}

/// Three-digit decimal code field, usually the zone number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NumericCode {
    raw: String,
    value: u16,
}

impl NumericCode {
    /// Parse a zero-padded decimal code such as `"008"`.
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let invalid = || ParseError::NumericCode {
            raw: raw.to_string(),
        };
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let value = raw.parse::<u16>().map_err(|_| invalid())?;
        Ok(Self {
            raw: raw.to_string(),
            value,
        })
    }

    /// The code exactly as it appeared on the wire.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn value(&self) -> u16 {
        self.value
    }
}

/// One keypad status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeypadMessage {
    pub fields: BitFields,
    pub code: NumericCode,
    /// 30 hex characters of raw panel data, not interpreted.
    pub payload: String,
    /// Alphanumeric keypad text with surrounding whitespace trimmed.
    pub text: String,
}

impl KeypadMessage {
    /// Zone the line refers to.
    pub fn zone(&self) -> ZoneId {
        self.code.value()
    }

    /// Whether the keypad text reports a zone fault.
    pub fn is_fault(&self) -> bool {
        self.text.contains("FAULT")
    }
}

impl fmt::Display for KeypadMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Message families the parser can recognise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageKind {
    /// Keypad status, optionally tagged `!KPM:`
    Keypad,
    /// `!AUI` - AUI bus data
    Aui,
    /// `!RFX` - RF receiver data
    Rfx,
    /// `!SER2SOCK` - connection banner
    Banner,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keypad => "kpm",
            Self::Aui => "aui",
            Self::Rfx => "rfx",
            Self::Banner => "ser2sock",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded protocol line.
///
/// Only [`Message::Keypad`] is produced by the default parser. The other
/// variants carry the raw line and are emitted by decoders registered
/// with [`Parser::register`](crate::Parser::register).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Keypad(KeypadMessage),
    Aui(String),
    Rfx(String),
    Banner(String),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Keypad(_) => MessageKind::Keypad,
            Message::Aui(_) => MessageKind::Aui,
            Message::Rfx(_) => MessageKind::Rfx,
            Message::Banner(_) => MessageKind::Banner,
        }
    }

    pub fn as_keypad(&self) -> Option<&KeypadMessage> {
        match self {
            Message::Keypad(k) => Some(k),
            _ => None,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Keypad(k) => k.fmt(f),
            Message::Aui(line) | Message::Rfx(line) | Message::Banner(line) => f.write_str(line),
        }
    }
}
