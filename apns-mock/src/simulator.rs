//! Reply policies: how the mock gateway answers each notification.
//!
//! A [`ReplyPolicy`] turns a decoded [`Notification`] into a [`Response`].
//! Policies may keep state between calls, so every connection gets its own
//! instance from a [`PolicyFactory`]; no instance is ever shared between
//! connections.
//!
//! | Policy               | Behaviour                                          |
//! |----------------------|----------------------------------------------------|
//! | [`BoundsCheckPolicy`] | status 7 for oversized payloads, 5 for bad token   |
//! |                      | lengths, 0 otherwise.                              |
//! | [`ScriptedPolicy`]    | replays a fixed list of statuses, wrapping around. |
//!
//! Random faults (withheld replies, injected errors, dropped connections) are
//! not a policy concern; see [`crate::faults`].

use std::sync::Arc;

use crate::error::PolicyError;
use crate::notification::Notification;
use crate::reply::{status, Acknowledgement};

/// Default maximum payload length for [`BoundsCheckPolicy`].
pub const DEFAULT_MAX_PAYLOAD_LEN: usize = 256;
/// Default expected device-token length for [`BoundsCheckPolicy`].
pub const DEFAULT_TOKEN_LEN: usize = 32;

/// What a policy decided for one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    pub ack: Acknowledgement,
    /// When set, the acknowledgement is computed but never sent.
    pub drop_reply: bool,
}

impl Response {
    pub fn reply(ack: Acknowledgement) -> Self {
        Self {
            ack,
            drop_reply: false,
        }
    }

    pub fn withhold(ack: Acknowledgement) -> Self {
        Self {
            ack,
            drop_reply: true,
        }
    }
}

/// Computes the reply for each notification on one connection.
pub trait ReplyPolicy: Send {
    fn respond(&mut self, notification: &Notification) -> Result<Response, PolicyError>;
}

/// Produces a fresh [`ReplyPolicy`] for every accepted connection.
pub trait PolicyFactory: Send + Sync {
    fn make_instance(&self) -> Result<Box<dyn ReplyPolicy>, PolicyError>;
}

impl<F> PolicyFactory for F
where
    F: Fn() -> Result<Box<dyn ReplyPolicy>, PolicyError> + Send + Sync,
{
    fn make_instance(&self) -> Result<Box<dyn ReplyPolicy>, PolicyError> {
        self()
    }
}

// ---------------------------------------------------------------------------
// Bounds check
// ---------------------------------------------------------------------------

/// Validates payload and token lengths like a real gateway would.
///
/// A zero threshold means "use the default" and is filled in on first use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundsCheckPolicy {
    pub max_payload_len: usize,
    pub token_len: usize,
}

impl BoundsCheckPolicy {
    pub fn new(max_payload_len: usize, token_len: usize) -> Self {
        Self {
            max_payload_len,
            token_len,
        }
    }
}

impl ReplyPolicy for BoundsCheckPolicy {
    fn respond(&mut self, n: &Notification) -> Result<Response, PolicyError> {
        if self.max_payload_len == 0 {
            self.max_payload_len = DEFAULT_MAX_PAYLOAD_LEN;
        }
        if self.token_len == 0 {
            self.token_len = DEFAULT_TOKEN_LEN;
        }

        let code = if n.payload.len() > self.max_payload_len {
            status::INVALID_PAYLOAD_SIZE
        } else if n.device_token.len() != self.token_len {
            status::INVALID_TOKEN_SIZE
        } else {
            status::NO_ERRORS
        };
        Ok(Response::reply(Acknowledgement::new(n.reply_identifier(), code)))
    }
}

/// Hands out a [`BoundsCheckPolicy`] with fixed thresholds.
#[derive(Debug, Clone, Default)]
pub struct BoundsCheckFactory {
    pub max_payload_len: usize,
    pub token_len: usize,
}

impl PolicyFactory for BoundsCheckFactory {
    fn make_instance(&self) -> Result<Box<dyn ReplyPolicy>, PolicyError> {
        Ok(Box::new(BoundsCheckPolicy::new(
            self.max_payload_len,
            self.token_len,
        )))
    }
}

// ---------------------------------------------------------------------------
// Scripted sequence
// ---------------------------------------------------------------------------

/// Replies with a predetermined sequence of statuses, ignoring content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedPolicy {
    statuses: Vec<u8>,
    cursor: usize,
}

impl ScriptedPolicy {
    pub fn new(statuses: Vec<u8>) -> Self {
        Self {
            statuses,
            cursor: 0,
        }
    }

    fn next_status(&mut self) -> u8 {
        if self.statuses.is_empty() {
            return status::NO_ERRORS;
        }
        if self.cursor >= self.statuses.len() {
            self.cursor = 0;
        }
        let code = self.statuses[self.cursor];
        self.cursor += 1;
        code
    }
}

impl ReplyPolicy for ScriptedPolicy {
    fn respond(&mut self, n: &Notification) -> Result<Response, PolicyError> {
        let code = self.next_status();
        Ok(Response::reply(Acknowledgement::new(n.reply_identifier(), code)))
    }
}

/// Hands out a [`ScriptedPolicy`] with its own cursor per connection.
#[derive(Debug, Clone, Default)]
pub struct ScriptedFactory {
    pub statuses: Vec<u8>,
}

impl PolicyFactory for ScriptedFactory {
    fn make_instance(&self) -> Result<Box<dyn ReplyPolicy>, PolicyError> {
        Ok(Box::new(ScriptedPolicy::new(self.statuses.clone())))
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Which policy the server hands to new connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyKind {
    BoundsCheck {
        max_payload_len: usize,
        token_len: usize,
    },
    Scripted(Vec<u8>),
}

impl Default for PolicyKind {
    fn default() -> Self {
        PolicyKind::BoundsCheck {
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
            token_len: DEFAULT_TOKEN_LEN,
        }
    }
}

impl PolicyKind {
    pub fn factory(&self) -> Arc<dyn PolicyFactory> {
        match self {
            PolicyKind::BoundsCheck {
                max_payload_len,
                token_len,
            } => Arc::new(BoundsCheckFactory {
                max_payload_len: *max_payload_len,
                token_len: *token_len,
            }),
            PolicyKind::Scripted(statuses) => Arc::new(ScriptedFactory {
                statuses: statuses.clone(),
            }),
        }
    }
}
