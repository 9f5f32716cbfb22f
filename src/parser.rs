// MIT License - Copyright (c) 2026 The ad2sock authors
// ser2sock keypad client

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::error::ParseError;
use crate::message::{BitFields, KeypadMessage, Message, MessageKind, NumericCode};

/// A decoder turns one classified line into a [`Message`].
pub type Decoder = Arc<dyn Fn(&str) -> Result<Message, ParseError> + Send + Sync>;

/// Keypad status line, e.g.
/// `!KPM:[10000001100000003A--],008,[f70600051008001c28020000000000]," DISARMED CHIME   Ready to Arm  "`
static KEYPAD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:!KPM:)?\[([0-9A-F\-]{20})\],([0-9A-F]{3}),\[([0-9a-f]{30})\],"(.+?)""#)
        .expect("keypad pattern is a valid regex")
});

const AUI_PREFIX: &str = "!AUI";
const RFX_PREFIX: &str = "!RFX";
pub(crate) const BANNER_PREFIX: &str = "!SER2SOCK";

/// Line parser with a pluggable decoder table.
///
/// Classification is fixed; what happens to a classified line is decided by
/// the decoder registered for its [`MessageKind`]. The default table only
/// decodes keypad lines, so the other families come back as
/// [`ParseError::Unhandled`] until a decoder is registered for them.
#[derive(Clone)]
pub struct Parser {
    decoders: HashMap<MessageKind, Decoder>,
}

impl Parser {
    pub fn new() -> Self {
        let mut parser = Self::empty();
        parser.register(MessageKind::Keypad, Arc::new(decode_keypad));
        parser
    }

    /// A parser with no decoders; every recognised line is `Unhandled`.
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Install a decoder for `kind`, returning the one it replaces.
    pub fn register(&mut self, kind: MessageKind, decoder: Decoder) -> Option<Decoder> {
        self.decoders.insert(kind, decoder)
    }

    pub fn unregister(&mut self, kind: MessageKind) -> Option<Decoder> {
        self.decoders.remove(&kind)
    }

    pub fn handles(&self, kind: MessageKind) -> bool {
        self.decoders.contains_key(&kind)
    }

    /// Work out which message family a line belongs to without decoding it.
    ///
    /// Keypad lines win over the prefix checks, so a `!KPM:` line is never
    /// mistaken for anything else.
    pub fn classify(line: &str) -> Result<MessageKind, ParseError> {
        if line.is_empty() {
            return Err(ParseError::Empty);
        }
        if KEYPAD_RE.is_match(line) {
            Ok(MessageKind::Keypad)
        } else if line.starts_with(AUI_PREFIX) {
            Ok(MessageKind::Aui)
        } else if line.starts_with(RFX_PREFIX) {
            Ok(MessageKind::Rfx)
        } else if line.starts_with(BANNER_PREFIX) {
            Ok(MessageKind::Banner)
        } else {
            Err(ParseError::Invalid)
        }
    }

    /// Classify and decode one line (without its trailing newline).
    pub fn parse(&self, line: &str) -> Result<Message, ParseError> {
        let kind = Self::classify(line)?;
        let decoder = self
            .decoders
            .get(&kind)
            .ok_or(ParseError::Unhandled(kind))?;
        decoder(line)
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Parser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.decoders.keys().copied().collect();
        kinds.sort();
        f.debug_struct("Parser").field("decoders", &kinds).finish()
    }
}

/// Default decoder for keypad status lines.
///
/// Malformed fields are reported as the field's own decode error rather
/// than coerced.
pub fn decode_keypad(line: &str) -> Result<Message, ParseError> {
    let caps = KEYPAD_RE.captures(line).ok_or(ParseError::Invalid)?;

    let fields = BitFields::decode(&caps[1])?;
    let code = NumericCode::parse(&caps[2])?;

    Ok(Message::Keypad(KeypadMessage {
        fields,
        code,
        payload: caps[3].to_string(),
        text: caps[4].trim().to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::message::KeypadFlags;

    const ZERO_PAYLOAD: &str = "000000000000000000000000000000";

    fn stub_message() -> Message {
        Message::Banner("stub".to_string())
    }

    fn keypad(msg: Message) -> KeypadMessage {
        match msg {
            Message::Keypad(k) => k,
            other => panic!("expected keypad message, got {other:?}"),
        }
    }

    #[rstest]
    #[case::empty_line("", Err(ParseError::Empty))]
    #[case::invalid("blah blah blah hey hey", Err(ParseError::Invalid))]
    #[case::kpm_with_prefix(
        r#"!KPM:[00000000000000000000],000,[000000000000000000000000000000],"test message""#,
        Ok(stub_message())
    )]
    #[case::kpm_without_prefix(
        r#"[00000000000000000000],000,[000000000000000000000000000000],"test message""#,
        Ok(stub_message())
    )]
    #[case::aui("!AUI01000000", Err(ParseError::Unhandled(MessageKind::Aui)))]
    #[case::rfx("!RFX:0180036,80", Err(ParseError::Unhandled(MessageKind::Rfx)))]
    #[case::banner(
        "!SER2SOCK Connected",
        Err(ParseError::Unhandled(MessageKind::Banner))
    )]
    fn test_parse_dispatch(#[case] line: &str, #[case] expected: Result<Message, ParseError>) {
        let mut parser = Parser::new();
        parser.register(MessageKind::Keypad, Arc::new(|_: &str| Ok(stub_message())));

        assert_eq!(parser.parse(line), expected);
    }

    #[rstest]
    #[case::with_prefix(
        r#"!KPM:[00000000000000000A--],000,[000000000000000000000000000000],"test message""#
    )]
    #[case::without_prefix(
        r#"[00000000000000000A--],000,[000000000000000000000000000000],"test message""#
    )]
    fn test_decode_keypad_prefix_optional(#[case] line: &str) {
        let msg = keypad(decode_keypad(line).unwrap());
        assert!(msg.fields.flags.is_empty());
        assert_eq!(msg.fields.sys_bits, '0');
        assert!(msg.fields.ademco);
        assert!(!msg.fields.dsc);
        assert_eq!(msg.code.raw(), "000");
        assert_eq!(msg.code.value(), 0);
        assert_eq!(msg.payload, ZERO_PAYLOAD);
        assert_eq!(msg.text, "test message");
    }

    #[test]
    fn test_decode_all_zero_fields() {
        let line = r#"[00000000000000000000],000,[000000000000000000000000000000],"test message""#;
        let msg = keypad(Parser::new().parse(line).unwrap());
        assert_eq!(msg.text, "test message");
        assert_eq!(msg.fields.beep_count, 0);
        assert!(!msg.fields.ademco);
        assert!(!msg.fields.dsc);
    }

    #[test]
    fn test_decode_bits_on() {
        let line = r#"!KPM:[1111131111111111BA--],005,[000000000000000000000000000000],"test message""#;
        let msg = keypad(Parser::new().parse(line).unwrap());
        assert_eq!(msg.fields.flags, KeypadFlags::all());
        assert!(msg.fields.ready());
        assert!(msg.fields.perimeter_on());
        assert_eq!(msg.fields.beep_count, 3);
        assert_eq!(msg.fields.sys_bits, 'B');
        assert!(msg.fields.ademco);
        assert!(!msg.fields.dsc);
        assert_eq!(msg.code.raw(), "005");
        assert_eq!(msg.code.value(), 5);
    }

    #[test]
    fn test_decode_trims_fault_text() {
        let line = r#"!KPM:[0000000000000000BA--],005,[000000000000000000000000000000],"  FAULT Pinball Room Door  ""#;
        let msg = keypad(Parser::new().parse(line).unwrap());
        assert_eq!(msg.text, "FAULT Pinball Room Door");
        assert_eq!(msg.to_string(), "FAULT Pinball Room Door");
        assert!(msg.is_fault());
        assert_eq!(msg.zone(), 5);
    }

    #[test]
    fn test_decode_errors_are_not_coerced() {
        // Hex digits pass the line pattern but not the field decoders.
        let bad_code = r#"[00000000000000000000],0A5,[000000000000000000000000000000],"x""#;
        assert_eq!(
            Parser::new().parse(bad_code),
            Err(ParseError::NumericCode {
                raw: "0A5".to_string()
            })
        );

        let bad_beep = r#"[00000F00000000000000],005,[000000000000000000000000000000],"x""#;
        assert_eq!(
            Parser::new().parse(bad_beep),
            Err(ParseError::BeepCount('F'))
        );
    }

    #[test]
    fn test_decode_keypad_rejects_other_lines() {
        assert_eq!(decode_keypad("!RFX:0180036,80"), Err(ParseError::Invalid));
    }

    #[test]
    fn test_registered_decoder_extends_parser() {
        let mut parser = Parser::new();
        assert!(!parser.handles(MessageKind::Rfx));

        let previous = parser.register(
            MessageKind::Rfx,
            Arc::new(|line: &str| Ok(Message::Rfx(line.to_string()))),
        );
        assert!(previous.is_none());
        assert!(parser.handles(MessageKind::Rfx));
        assert_eq!(
            parser.parse("!RFX:0180036,80"),
            Ok(Message::Rfx("!RFX:0180036,80".to_string()))
        );

        parser.unregister(MessageKind::Keypad);
        let line = r#"[00000000000000000000],000,[000000000000000000000000000000],"x""#;
        assert_eq!(
            parser.parse(line),
            Err(ParseError::Unhandled(MessageKind::Keypad))
        );
    }

    #[test]
    fn test_empty_parser_leaves_everything_unhandled() {
        let parser = Parser::empty();
        assert_eq!(
            parser.parse("!AUI0100"),
            Err(ParseError::Unhandled(MessageKind::Aui))
        );
        assert_eq!(parser.parse(""), Err(ParseError::Empty));
    }

    #[test]
    fn test_classify_prefers_keypad() {
        assert_eq!(
            Parser::classify(r#"!KPM:[00000000000000000000],000,[000000000000000000000000000000],"x""#),
            Ok(MessageKind::Keypad)
        );
        // A KPM tag alone is not enough.
        assert_eq!(Parser::classify("!KPM:garbage"), Err(ParseError::Invalid));
        assert_eq!(Parser::classify("!SER2SOCK hi"), Ok(MessageKind::Banner));
    }

    #[test]
    fn test_debug_lists_kinds() {
        assert_eq!(format!("{:?}", Parser::new()), "Parser { decoders: [Keypad] }");
    }
}
