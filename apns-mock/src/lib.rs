//! `apns-mock`: a stand-in for a binary push-notification gateway.
//!
//! Providers under test connect, stream notifications in any of the three
//! binary framings, and get back 6-byte acknowledgements whose status, delay
//! and ordering are controlled by the test setup.
//!
//! # Architecture
//!
//! ```text
//!  ┌────────┐  TcpStream / TlsStream   ┌────────────────────────────────────┐
//!  │ Server │─────────────────────────▶│ Connection::process                │
//!  └────────┘  one task per accept     │                                    │
//!                                      │  Receiver ── mpsc ──▶ deliver      │
//!                                      │  (decode, policy,     (deadline    │
//!                                      │   faults, delay)       heap, write)│
//!                                      └────────────────────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`notification`]: decoded notification type and client-side encoder
//! - [`frame`]: `FrameDecoder` for formats 0, 1 and 2
//! - [`reply`]: acknowledgement wire format and `ReplyEncoder`
//! - [`simulator`]: reply policies and their per-connection factories
//! - [`faults`]: random withheld / rejected / terminating replies
//! - [`delay`]: per-reply artificial delay
//! - [`receiver`]: receive task
//! - [`sender`]: reply-delivery task
//! - [`connection`]: per-connection processor and close discipline
//! - [`state`]: connection lifecycle states
//! - [`config`]: per-process settings
//! - [`server`]: accept loop
//! - [`tls`]: certificate loading
//! - [`error`]: error types

pub mod config;
pub mod connection;
pub mod delay;
pub mod error;
pub mod faults;
pub mod frame;
pub mod notification;
pub mod receiver;
pub mod reply;
pub mod sender;
pub mod server;
pub mod simulator;
pub mod state;
pub mod tls;

pub use config::ProcessConfig;
pub use connection::{CloseReason, Connection, ConnectionSummary};
pub use error::{BindError, ConnError, DecodeError, PolicyError, ProtocolError};
pub use faults::FaultConfig;
pub use frame::FrameDecoder;
pub use notification::{Format, Notification};
pub use reply::{Acknowledgement, ReplyEncoder};
pub use server::{Server, ServerHandle};
pub use simulator::{PolicyFactory, PolicyKind, ReplyPolicy, Response};
pub use state::ConnectionState;
