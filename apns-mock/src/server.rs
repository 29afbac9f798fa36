//! TCP listener that hands every accepted stream to its own [`Connection`].
//!
//! ```text
//!  TcpListener ──accept──▶ spawn ──▶ [TLS handshake] ──▶ factory.make_instance()
//!                                                      ──▶ Connection::process()
//! ```
//!
//! Connections share nothing but the read-only [`ProcessConfig`] and the
//! policy factory; a failure in one never reaches the accept loop or any
//! other connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

use crate::config::ProcessConfig;
use crate::connection::{CloseReason, Connection};
use crate::error::BindError;
use crate::simulator::{PolicyFactory, ReplyPolicy};

/// Pause after a failed `accept` (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct Server {
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    factory: Arc<dyn PolicyFactory>,
    config: Arc<ProcessConfig>,
    local_addr: SocketAddr,
}

impl Server {
    /// Validate `config` and bind the listener.  With `acceptor == None`
    /// streams are served in plain TCP.
    pub async fn bind(
        addr: impl ToSocketAddrs,
        acceptor: Option<TlsAcceptor>,
        factory: Arc<dyn PolicyFactory>,
        config: ProcessConfig,
    ) -> Result<Self, BindError> {
        config.validate()?;
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            acceptor,
            factory,
            config: Arc::new(config),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections forever.
    pub async fn run(self) {
        log::info!(
            "listening on {} ({})",
            self.local_addr,
            if self.acceptor.is_some() { "tls" } else { "plain" }
        );

        let mut index: u64 = 0;
        loop {
            let (tcp, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    log::error!("accept failed: {e}");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };
            log::info!("[{peer}] accepted connection #{index}");

            let acceptor = self.acceptor.clone();
            let factory = Arc::clone(&self.factory);
            let config = Arc::clone(&self.config);
            tokio::spawn(handle(tcp, peer, index, acceptor, factory, config));
            index = index.wrapping_add(1);
        }
    }

    /// Run the accept loop on a background task.
    pub fn spawn(self) -> ServerHandle {
        let addr = self.local_addr;
        ServerHandle {
            addr,
            task: tokio::spawn(self.run()),
        }
    }
}

/// A running server; the accept loop is aborted when the handle is dropped.
/// Connections already accepted keep running until they close.
#[derive(Debug)]
pub struct ServerHandle {
    pub addr: SocketAddr,
    task: JoinHandle<()>,
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle(
    tcp: TcpStream,
    peer: SocketAddr,
    index: u64,
    acceptor: Option<TlsAcceptor>,
    factory: Arc<dyn PolicyFactory>,
    config: Arc<ProcessConfig>,
) {
    if let Err(e) = tcp.set_nodelay(true) {
        log::debug!("[{peer}] set_nodelay: {e}");
    }

    match acceptor {
        Some(acceptor) => match acceptor.accept(tcp).await {
            Ok(tls) => serve(tls, peer, index, factory.as_ref(), &config).await,
            Err(e) => log::warn!("[{peer}] TLS handshake failed: {e}"),
        },
        None => serve(tcp, peer, index, factory.as_ref(), &config).await,
    }
}

async fn serve<S>(
    stream: S,
    peer: SocketAddr,
    index: u64,
    factory: &dyn PolicyFactory,
    config: &ProcessConfig,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let policy: Box<dyn ReplyPolicy> = match factory.make_instance() {
        Ok(policy) => policy,
        Err(e) => {
            log::error!("[{peer}] cannot create reply policy: {e}");
            return;
        }
    };

    let summary = Connection::new(stream)
        .with_label(peer.to_string())
        .process(policy, config, config.rng_for(index))
        .await;

    let how = match &summary.close {
        CloseReason::PeerClosed => "peer closed",
        CloseReason::Terminated => "terminated",
        CloseReason::Failed(_) => "failed",
        CloseReason::WriteFailed(_) => "write failed",
    };
    log::debug!(
        "[{peer}] closed ({how}): received={} replied={} withheld={} discarded={}",
        summary.received,
        summary.replied,
        summary.withheld,
        summary.discarded
    );
}
