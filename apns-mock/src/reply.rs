//! Acknowledgements sent back to the provider.
//!
//! # Wire format
//!
//! ```text
//!  0          1          2                                   6
//! +----------+----------+-----------------------------------+
//! | tag (=8) |  status  |       identifier (u32, BE)         |
//! +----------+----------+-----------------------------------+
//! ```

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::ProtocolError;

/// Constant first byte of every reply.
pub const REPLY_TAG: u8 = 8;

/// Byte length of an encoded reply.
pub const REPLY_LEN: usize = 6;

/// Status codes carried in a reply.
pub mod status {
    pub const NO_ERRORS: u8 = 0;
    pub const PROCESSING_ERROR: u8 = 1;
    pub const MISSING_DEVICE_TOKEN: u8 = 2;
    pub const MISSING_TOPIC: u8 = 3;
    pub const MISSING_PAYLOAD: u8 = 4;
    pub const INVALID_TOKEN_SIZE: u8 = 5;
    pub const INVALID_TOPIC_SIZE: u8 = 6;
    pub const INVALID_PAYLOAD_SIZE: u8 = 7;
    pub const INVALID_TOKEN: u8 = 8;
    /// The connection is closed right after this reply is written.
    pub const TERMINATE: u8 = 255;
}

/// One reply, correlated to a notification by `identifier`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acknowledgement {
    pub identifier: u32,
    pub status: u8,
}

impl Acknowledgement {
    pub fn new(identifier: u32, status: u8) -> Self {
        Self { identifier, status }
    }

    /// `true` when sending this reply must also end the connection.
    pub fn terminates(&self) -> bool {
        self.status == status::TERMINATE
    }

    pub fn encode(&self) -> [u8; REPLY_LEN] {
        let mut buf = [0u8; REPLY_LEN];
        buf[0] = REPLY_TAG;
        buf[1] = self.status;
        buf[2..].copy_from_slice(&self.identifier.to_be_bytes());
        buf
    }

    /// Parse a reply as a provider would.
    pub fn decode(buf: &[u8; REPLY_LEN]) -> Result<Self, ProtocolError> {
        if buf[0] != REPLY_TAG {
            return Err(ProtocolError::UnknownFormat(buf[0]));
        }
        let mut id = [0u8; 4];
        id.copy_from_slice(&buf[2..]);
        Ok(Self {
            status: buf[1],
            identifier: u32::from_be_bytes(id),
        })
    }
}

/// Writes encoded replies to the outbound half of a connection.
#[derive(Debug)]
pub struct ReplyEncoder<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> ReplyEncoder<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write and flush one reply.
    pub async fn send(&mut self, ack: &Acknowledgement) -> std::io::Result<()> {
        self.writer.write_all(&ack.encode()).await?;
        self.writer.flush().await
    }

    /// Shut down the outbound half (TLS close_notify, TCP FIN).
    pub async fn shutdown(&mut self) -> std::io::Result<()> {
        self.writer.shutdown().await
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_tag_status_identifier() {
        let bytes = Acknowledgement::new(0x0102_0304, status::INVALID_PAYLOAD_SIZE).encode();
        assert_eq!(bytes, [8, 7, 1, 2, 3, 4]);
    }

    #[test]
    fn decode_recovers_status_and_identifier() {
        let ack = Acknowledgement::new(u32::MAX, status::TERMINATE);
        let back = Acknowledgement::decode(&ack.encode()).unwrap();
        assert_eq!(back, ack);
        assert!(back.terminates());
    }

    #[test]
    fn decode_rejects_other_tags() {
        assert_eq!(
            Acknowledgement::decode(&[9, 0, 0, 0, 0, 1]),
            Err(ProtocolError::UnknownFormat(9))
        );
    }

    #[tokio::test]
    async fn encoder_writes_whole_replies_in_order() {
        let mut encoder = ReplyEncoder::new(Vec::new());
        encoder.send(&Acknowledgement::new(1, 0)).await.unwrap();
        encoder.send(&Acknowledgement::new(2, 5)).await.unwrap();
        assert_eq!(
            encoder.into_inner(),
            vec![8, 0, 0, 0, 0, 1, 8, 5, 0, 0, 0, 2]
        );
    }
}
