//! Reading one notification off a byte stream.
//!
//! [`FrameDecoder::decode`] reads exactly the bytes of one message and no
//! more, so the stream is always positioned at the next message boundary
//! afterwards.  Every length is checked right after its header is read and
//! before the value is consumed, so a malformed item is reported without
//! reading any data that follows it.
//!
//! Read failures (including end-of-stream) surface as
//! [`DecodeError::Transport`]; malformed input as [`DecodeError::Protocol`].

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Bound, DecodeError, ProtocolError};
use crate::notification::{item, Format, Notification};

/// Bytes of tag + length preceding every format-2 item value.
pub const ITEM_HEADER_LEN: u32 = 3;

/// Device-token bound for format-2 items (and legacy formats when bounded).
pub const TOKEN_BOUND: Bound = Bound::NonZeroAtMost(100);
/// Payload bound for format-2 items (and legacy formats when bounded).
pub const PAYLOAD_BOUND: Bound = Bound::AtMost(2048);

const VALID_PRIORITIES: [u8; 2] = [5, 10];

/// Stateless decoder for the three notification framings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDecoder {
    legacy_bounds: bool,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self { legacy_bounds: true }
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether formats 0 and 1 get the same token/payload bounds as format 2.
    ///
    /// Historically those formats were unbounded apart from the 16-bit length
    /// prefix; pass `false` to accept such clients.
    pub fn with_legacy_bounds(mut self, enabled: bool) -> Self {
        self.legacy_bounds = enabled;
        self
    }

    /// Read one complete notification.
    pub async fn decode<R>(&self, reader: &mut R) -> Result<Notification, DecodeError>
    where
        R: AsyncRead + Unpin,
    {
        let format = Format::try_from(reader.read_u8().await?)?;
        match format {
            Format::Legacy => {
                let n = Notification::new(format, Vec::new(), Vec::new());
                self.decode_legacy(reader, n).await
            }
            Format::Enhanced => {
                let identifier = reader.read_u32().await?;
                let expiry = reader.read_u32().await?;
                let n = Notification::new(format, Vec::new(), Vec::new())
                    .with_identifier(identifier)
                    .with_expiry(expiry);
                // The rest of v1 is the v0 body.
                self.decode_legacy(reader, n).await
            }
            Format::Frame => self.decode_frame(reader).await,
        }
    }

    async fn decode_legacy<R>(
        &self,
        reader: &mut R,
        mut n: Notification,
    ) -> Result<Notification, DecodeError>
    where
        R: AsyncRead + Unpin,
    {
        let token_len = reader.read_u16().await?;
        if self.legacy_bounds {
            check("device token", token_len, TOKEN_BOUND)?;
        }
        n.device_token = read_bytes(reader, token_len).await?;

        let payload_len = reader.read_u16().await?;
        if self.legacy_bounds {
            check("payload", payload_len, PAYLOAD_BOUND)?;
        }
        n.payload = read_bytes(reader, payload_len).await?;

        Ok(n)
    }

    async fn decode_frame<R>(&self, reader: &mut R) -> Result<Notification, DecodeError>
    where
        R: AsyncRead + Unpin,
    {
        let frame_len = reader.read_u32().await?;

        let mut seen = [false; 256];
        let mut consumed: u32 = 0;
        let mut n = Notification::new(Format::Frame, Vec::new(), Vec::new());
        let mut token = None;
        let mut payload = None;

        while consumed < frame_len {
            let remaining = frame_len - consumed;
            if remaining < ITEM_HEADER_LEN {
                return Err(ProtocolError::InvalidLength {
                    field: "frame item header",
                    len: ITEM_HEADER_LEN,
                    bound: Bound::AtMost(remaining as u16),
                }
                .into());
            }

            let tag = reader.read_u8().await?;
            if seen[usize::from(tag)] {
                return Err(ProtocolError::DuplicateItem(tag).into());
            }
            seen[usize::from(tag)] = true;

            let len = reader.read_u16().await?;
            consumed += ITEM_HEADER_LEN;

            match tag {
                item::DEVICE_TOKEN => check("device token", len, TOKEN_BOUND)?,
                item::PAYLOAD => check("payload", len, PAYLOAD_BOUND)?,
                item::IDENTIFIER => check("identifier", len, Bound::Exactly(4))?,
                item::EXPIRY => check("expiry", len, Bound::Exactly(4))?,
                item::PRIORITY => check("priority", len, Bound::Exactly(1))?,
                _ => {}
            }

            let remaining = frame_len - consumed;
            if u32::from(len) > remaining {
                // remaining < len <= u16::MAX here.
                return Err(ProtocolError::InvalidLength {
                    field: "frame item",
                    len: u32::from(len),
                    bound: Bound::AtMost(remaining as u16),
                }
                .into());
            }

            match tag {
                item::DEVICE_TOKEN => token = Some(read_bytes(reader, len).await?),
                item::PAYLOAD => payload = Some(read_bytes(reader, len).await?),
                item::IDENTIFIER => n.identifier = Some(reader.read_u32().await?),
                item::EXPIRY => n.expiry = Some(reader.read_u32().await?),
                item::PRIORITY => {
                    let priority = reader.read_u8().await?;
                    if !VALID_PRIORITIES.contains(&priority) {
                        return Err(ProtocolError::InvalidPriority(priority).into());
                    }
                    n.priority = Some(priority);
                }
                unknown => {
                    // Unknown items are skipped for forward compatibility.
                    let skipped = read_bytes(reader, len).await?;
                    log::trace!("skipped unknown item {unknown} ({} bytes)", skipped.len());
                }
            }
            consumed += u32::from(len);
        }

        n.device_token = token.ok_or(ProtocolError::MissingField("device token"))?;
        n.payload = payload.ok_or(ProtocolError::MissingField("payload"))?;
        Ok(n)
    }
}

fn check(field: &'static str, len: u16, bound: Bound) -> Result<(), ProtocolError> {
    if bound.admits(u32::from(len)) {
        Ok(())
    } else {
        Err(ProtocolError::InvalidLength {
            field,
            len: u32::from(len),
            bound,
        })
    }
}

async fn read_bytes<R>(reader: &mut R, len: u16) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; usize::from(len)];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}
