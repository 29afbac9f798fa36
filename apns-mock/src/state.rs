//! Connection lifecycle states.
//!
//! ```text
//!  Idle ──process()──▶ Running ──error / terminate / EOF──▶ Closing ──both tasks done──▶ Closed
//! ```
//!
//! Transitions are driven by [`crate::connection::Connection::process`] and
//! published on a `watch` channel so callers can observe them.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Handle created; nothing read yet.
    #[default]
    Idle,
    /// Receive and delivery tasks are both live.
    Running,
    /// The receive task has stopped; delivery is winding down.
    Closing,
    /// Both tasks finished and the stream has been released.
    Closed,
}

impl ConnectionState {
    /// `true` for `Closing` and `Closed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
