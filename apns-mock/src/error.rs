//! Error taxonomy for one connection.
//!
//! Every error here is fatal to the connection that produced it and to no
//! other connection.  The split mirrors where the failure came from:
//! - [`DecodeError::Transport`]: the byte stream itself failed or ended.
//! - [`ProtocolError`]: the bytes arrived but do not form a valid message.
//! - [`PolicyError`]: the reply policy could not produce a response.

use std::fmt;
use std::io;

use thiserror::Error;

/// Length bound that a field violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// Length must be in `1..=n`.
    NonZeroAtMost(u16),
    /// Length must be in `0..=n`.
    AtMost(u16),
    /// Length must be exactly `n`.
    Exactly(u16),
}

impl Bound {
    /// `true` when `len` satisfies this bound.
    pub fn admits(self, len: u32) -> bool {
        match self {
            Bound::NonZeroAtMost(max) => len != 0 && len <= u32::from(max),
            Bound::AtMost(max) => len <= u32::from(max),
            Bound::Exactly(n) => len == u32::from(n),
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::NonZeroAtMost(max) => write!(f, "must be in 1..={max}"),
            Bound::AtMost(max) => write!(f, "must be at most {max}"),
            Bound::Exactly(n) => write!(f, "must be exactly {n}"),
        }
    }
}

/// Malformed input from the remote client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unknown format selector {0}")]
    UnknownFormat(u8),

    #[error("invalid {field} length {len}: {bound}")]
    InvalidLength {
        field: &'static str,
        len: u32,
        bound: Bound,
    },

    #[error("invalid priority {0}: must be 5 or 10")]
    InvalidPriority(u8),

    #[error("item {0} appears twice in one frame")]
    DuplicateItem(u8),

    #[error("frame has no {0} item")]
    MissingField(&'static str),
}

/// Failure to read one notification off the stream.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl DecodeError {
    /// `true` when the peer closed the stream (cleanly or mid-message).
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            DecodeError::Transport(e) if matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            )
        )
    }

    /// The protocol error, if this is one.
    pub fn as_protocol(&self) -> Option<&ProtocolError> {
        match self {
            DecodeError::Protocol(e) => Some(e),
            DecodeError::Transport(_) => None,
        }
    }
}

/// A reply policy (or its factory) failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("reply policy failed: {0}")]
pub struct PolicyError(pub String);

/// Why a connection's receive task stopped.
#[derive(Debug, Error)]
pub enum ConnError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// Invalid [`crate::config::ProcessConfig`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("minimum delay {min:?} exceeds maximum delay {max:?}")]
    DelayRange {
        min: std::time::Duration,
        max: std::time::Duration,
    },

    #[error("{name} {value} is outside [0, 1]")]
    Rate { name: &'static str, value: f64 },
}

/// Failure starting a [`crate::server::Server`].
#[derive(Debug, Error)]
pub enum BindError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("cannot bind listener: {0}")]
    Io(#[from] io::Error),
}

/// Failure building the TLS server configuration.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("cannot read {path}: {source}")]
    Read { path: String, source: io::Error },

    #[error("malformed PEM: {0}")]
    Pem(io::Error),

    #[error("no certificate in PEM input")]
    NoCertificate,

    #[error("no private key in PEM input")]
    NoPrivateKey,

    #[error("rejected by rustls: {0}")]
    Rustls(#[from] tokio_rustls::rustls::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_admit_expected_lengths() {
        assert!(!Bound::NonZeroAtMost(100).admits(0));
        assert!(Bound::NonZeroAtMost(100).admits(1));
        assert!(Bound::NonZeroAtMost(100).admits(100));
        assert!(!Bound::NonZeroAtMost(100).admits(101));
        assert!(Bound::AtMost(2048).admits(0));
        assert!(!Bound::AtMost(2048).admits(2049));
        assert!(Bound::Exactly(4).admits(4));
        assert!(!Bound::Exactly(4).admits(3));
    }

    #[test]
    fn invalid_length_names_field_and_bound() {
        let e = ProtocolError::InvalidLength {
            field: "device token",
            len: 101,
            bound: Bound::NonZeroAtMost(100),
        };
        assert_eq!(e.to_string(), "invalid device token length 101: must be in 1..=100");
    }

    #[test]
    fn eof_is_a_disconnect_but_protocol_errors_are_not() {
        let eof = DecodeError::from(io::Error::from(io::ErrorKind::UnexpectedEof));
        assert!(eof.is_disconnect());
        assert!(eof.as_protocol().is_none());

        let proto = DecodeError::from(ProtocolError::UnknownFormat(9));
        assert!(!proto.is_disconnect());
        assert_eq!(proto.as_protocol(), Some(&ProtocolError::UnknownFormat(9)));
    }
}
