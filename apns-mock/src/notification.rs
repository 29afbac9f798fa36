//! Inbound push notifications and their three wire framings.
//!
//! A [`Notification`] is what [`crate::frame::FrameDecoder`] produces for every
//! message a provider sends.  It only ever exists fully decoded; a frame that
//! fails validation never yields a partial value.
//!
//! # Wire formats
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//! format 0:  0 | tokenLen:u16 | token | payloadLen:u16 | payload
//! format 1:  1 | id:u32 | expiry:u32 | tokenLen:u16 | token | payloadLen:u16 | payload
//! format 2:  2 | frameLen:u32 | { tag:u8 | len:u16 | value }*   (frameLen bytes of items)
//! ```
//!
//! [`Notification::encode`] writes the provider side of these formats.  The
//! server never sends notifications; the encoder exists for test clients.

use std::fmt;

use crate::error::{Bound, ProtocolError};

/// Item tags inside a format-2 frame.
pub mod item {
    pub const DEVICE_TOKEN: u8 = 1;
    pub const PAYLOAD: u8 = 2;
    pub const IDENTIFIER: u8 = 3;
    pub const EXPIRY: u8 = 4;
    pub const PRIORITY: u8 = 5;
}

/// Which framing a notification arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Format {
    /// Legacy v0: token and payload only.
    Legacy = 0,
    /// Legacy v1: identifier and expiry, then the v0 body.
    Enhanced = 1,
    /// Structured frame of TLV items.
    Frame = 2,
}

impl Format {
    pub fn selector(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Format {
    type Error = ProtocolError;

    fn try_from(selector: u8) -> Result<Self, Self::Error> {
        match selector {
            0 => Ok(Format::Legacy),
            1 => Ok(Format::Enhanced),
            2 => Ok(Format::Frame),
            other => Err(ProtocolError::UnknownFormat(other)),
        }
    }
}

/// One decoded notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub format: Format,
    /// Correlates the notification with its acknowledgement.
    ///
    /// Format 0 has no identifier; format 2 only when the item is present.
    pub identifier: Option<u32>,
    /// Expiry in epoch seconds.
    pub expiry: Option<u32>,
    pub device_token: Vec<u8>,
    pub payload: Vec<u8>,
    /// Format 2 only; always 5 or 10 when present.
    pub priority: Option<u8>,
}

impl Notification {
    /// A notification in the given format with no optional fields set.
    pub fn new(
        format: Format,
        device_token: impl Into<Vec<u8>>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            format,
            identifier: None,
            expiry: None,
            device_token: device_token.into(),
            payload: payload.into(),
            priority: None,
        }
    }

    pub fn with_identifier(mut self, identifier: u32) -> Self {
        self.identifier = Some(identifier);
        self
    }

    pub fn with_expiry(mut self, expiry: u32) -> Self {
        self.expiry = Some(expiry);
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Identifier to echo in the acknowledgement (0 when the format has none).
    pub fn reply_identifier(&self) -> u32 {
        self.identifier.unwrap_or(0)
    }

    /// Serialise in this notification's own format.
    ///
    /// Fields the format cannot carry are skipped (format 0 drops identifier,
    /// expiry and priority; format 1 drops priority and writes 0 for a missing
    /// identifier or expiry).  Fails only when the token or payload does not
    /// fit the 16-bit length prefix.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let token_len = len16("device token", &self.device_token)?;
        let payload_len = len16("payload", &self.payload)?;

        let mut buf = Vec::with_capacity(16 + self.device_token.len() + self.payload.len());
        buf.push(self.format.selector());

        match self.format {
            Format::Legacy | Format::Enhanced => {
                if self.format == Format::Enhanced {
                    buf.extend_from_slice(&self.reply_identifier().to_be_bytes());
                    buf.extend_from_slice(&self.expiry.unwrap_or(0).to_be_bytes());
                }
                buf.extend_from_slice(&token_len.to_be_bytes());
                buf.extend_from_slice(&self.device_token);
                buf.extend_from_slice(&payload_len.to_be_bytes());
                buf.extend_from_slice(&self.payload);
            }
            Format::Frame => {
                let mut items = Vec::new();
                push_item(&mut items, item::DEVICE_TOKEN, &self.device_token);
                push_item(&mut items, item::PAYLOAD, &self.payload);
                if let Some(id) = self.identifier {
                    push_item(&mut items, item::IDENTIFIER, &id.to_be_bytes());
                }
                if let Some(expiry) = self.expiry {
                    push_item(&mut items, item::EXPIRY, &expiry.to_be_bytes());
                }
                if let Some(priority) = self.priority {
                    push_item(&mut items, item::PRIORITY, &[priority]);
                }
                buf.extend_from_slice(&(items.len() as u32).to_be_bytes());
                buf.extend_from_slice(&items);
            }
        }

        Ok(buf)
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "format={}; id={}; expiry={}; token={}; payload={}",
            self.format.selector(),
            self.reply_identifier(),
            self.expiry.unwrap_or(0),
            hex::encode(&self.device_token),
            String::from_utf8_lossy(&self.payload),
        )?;
        if let Some(priority) = self.priority {
            write!(f, "; priority={priority}")?;
        }
        Ok(())
    }
}

fn len16(field: &'static str, bytes: &[u8]) -> Result<u16, ProtocolError> {
    u16::try_from(bytes.len()).map_err(|_| ProtocolError::InvalidLength {
        field,
        len: bytes.len() as u32,
        bound: Bound::AtMost(u16::MAX),
    })
}

// Callers have already checked the value fits in a u16.
fn push_item(buf: &mut Vec<u8>, tag: u8, value: &[u8]) {
    buf.push(tag);
    buf.extend_from_slice(&(value.len() as u16).to_be_bytes());
    buf.extend_from_slice(value);
}
