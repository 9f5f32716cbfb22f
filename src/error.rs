// MIT License - Copyright (c) 2026 The ad2sock authors
// ser2sock keypad client

use crate::message::MessageKind;

/// Reasons a single protocol line could not be turned into a [`Message`](crate::Message).
///
/// None of these are fatal to a connection: the read loop logs them and
/// drops the offending line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty line")]
    Empty,

    #[error("invalid message")]
    Invalid,

    /// The line is a recognised message family with no registered decoder.
    #[error("unhandled message: {0}")]
    Unhandled(MessageKind),

    #[error("bit field must be {expected} characters, got {actual}")]
    BitFieldLength { expected: usize, actual: usize },

    #[error("beep count is not a decimal digit: {0:?}")]
    BeepCount(char),

    #[error("numeric code is not a decimal number: {raw:?}")]
    NumericCode { raw: String },
}

/// Errors surfaced by connection setup and client lifecycle calls.
#[derive(Debug, thiserror::Error)]
pub enum Ad2Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out reading connection banner (client/server TLS mismatch?)")]
    BannerTimeout,

    #[error("Did not see ser2sock connection banner, got {line:?}")]
    BannerMismatch { line: String },

    #[error("Connection closed before banner was received")]
    Disconnected,

    #[error("Invalid TLS server name: {name}")]
    InvalidServerName { name: String },

    #[error("Read loop task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Ad2Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unhandled_names_kind() {
        let err = ParseError::Unhandled(MessageKind::Rfx);
        assert_eq!(err.to_string(), "unhandled message: rfx");
    }

    #[test]
    fn test_numeric_code_error_keeps_raw() {
        let err = ParseError::NumericCode {
            raw: "0x1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "numeric code is not a decimal number: \"0x1\""
        );
    }

    #[test]
    fn test_banner_errors_describe_connection() {
        assert_eq!(
            Ad2Error::BannerMismatch {
                line: "HTTP/1.1 400".to_string()
            }
            .to_string(),
            "Did not see ser2sock connection banner, got \"HTTP/1.1 400\""
        );
        assert!(Ad2Error::BannerTimeout.to_string().contains("TLS mismatch"));
    }
}
