//! Connection-pair driver
//!
//! One [`ConnectionPair`] owns a client socket, its dedicated upstream
//! socket, the two filter pipelines, and the shared session state. A single
//! task drives both directions, so handling of one frame always finishes
//! (peer writes, then spoofed replies to the sender) before the next frame
//! in either direction is dispatched.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::Result;
use crate::filter::{BackendFilter, FrontendFilter, PeerAction, SessionState};
use crate::protocol::{BackendParser, FrontendParser, ParseProgress};

const READ_BUFFER_SIZE: usize = 8192;

/// A client connection paired 1:1 with its own upstream connection.
pub struct ConnectionPair {
    client: TcpStream,
    upstream: TcpStream,
    client_addr: SocketAddr,
    frontend: FrontendFilter,
    backend: BackendFilter,
    session: SessionState,
    shutdown_rx: broadcast::Receiver<()>,
}

impl ConnectionPair {
    /// Establish the upstream connection for an accepted client and build
    /// the pair's pipelines from configuration.
    pub async fn connect(
        client: TcpStream,
        client_addr: SocketAddr,
        config: &Config,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<Self> {
        let upstream = TcpStream::connect(config.upstream.address()).await?;
        debug!(upstream = %config.upstream.address(), "upstream connected");

        let credentials = config
            .users
            .iter()
            .map(|(user, cfg)| (user.clone(), cfg.password.clone()))
            .collect();

        Ok(Self {
            client,
            upstream,
            client_addr,
            frontend: FrontendFilter::new(
                config.service_credentials.username.clone(),
                credentials,
                config.firewall.allowed_tables.clone(),
            ),
            backend: BackendFilter::new(config.service_credentials.clone()),
            session: SessionState::new(),
            shutdown_rx,
        })
    }

    /// Drive both directions until either side closes, a filter asks for
    /// teardown, or a protocol violation makes the streams unusable.
    pub async fn run(self) -> Result<()> {
        let Self {
            client,
            upstream,
            client_addr,
            mut frontend,
            mut backend,
            mut session,
            mut shutdown_rx,
        } = self;

        let (mut client_read, mut client_write) = client.into_split();
        let (mut upstream_read, mut upstream_write) = upstream.into_split();
        let mut frontend_parser = FrontendParser::new();
        let mut backend_parser = BackendParser::new();

        let mut client_buf = vec![0u8; READ_BUFFER_SIZE];
        let mut upstream_buf = vec![0u8; READ_BUFFER_SIZE];

        let reason = loop {
            tokio::select! {
                read = client_read.read(&mut client_buf) => {
                    let n = read?;
                    if n == 0 {
                        break "client disconnected";
                    }
                    let teardown = pump_client(
                        &client_buf[..n],
                        &mut frontend_parser,
                        &mut frontend,
                        &mut session,
                        &mut client_write,
                        &mut upstream_write,
                    )
                    .await?;
                    if teardown {
                        break "session rejected";
                    }
                }
                read = upstream_read.read(&mut upstream_buf) => {
                    let n = read?;
                    if n == 0 {
                        break "upstream disconnected";
                    }
                    let teardown = pump_upstream(
                        &upstream_buf[..n],
                        &mut backend_parser,
                        &mut backend,
                        &mut session,
                        &mut client_write,
                        &mut upstream_write,
                    )
                    .await?;
                    if teardown {
                        break "session rejected";
                    }
                }
                _ = shutdown_rx.recv() => {
                    break "shutdown";
                }
            }
        };

        info!(client = %client_addr, user = frontend.user(), reason, "pair closed");
        Ok(())
    }
}

/// Feed client bytes through the frontend pipeline. Returns true when the
/// pair must be torn down after the written replies are flushed.
async fn pump_client(
    bytes: &[u8],
    parser: &mut FrontendParser,
    filter: &mut FrontendFilter,
    session: &mut SessionState,
    client_write: &mut OwnedWriteHalf,
    upstream_write: &mut OwnedWriteHalf,
) -> Result<bool> {
    let mut chunk = bytes.to_vec();
    loop {
        let (frame, overflow) = match parser.consume(&chunk)? {
            ParseProgress::Incomplete => return Ok(false),
            ParseProgress::Complete { frame, overflow } => (frame, overflow),
        };
        debug!(frame = frame.name(true), len = frame.len(), "client frame");

        let outcome = filter.handle(&frame, session);
        match outcome.peer {
            PeerAction::Transmit => upstream_write.write_all(frame.as_bytes()).await?,
            PeerAction::Translate(frames) => {
                for replacement in &frames {
                    upstream_write.write_all(replacement.as_bytes()).await?;
                }
            }
            PeerAction::Drop => {}
        }
        for reply in &outcome.spoof {
            client_write.write_all(reply.as_bytes()).await?;
        }
        if outcome.disconnect {
            client_write.flush().await?;
            return Ok(true);
        }
        chunk = overflow;
    }
}

/// Feed upstream bytes through the backend pipeline.
async fn pump_upstream(
    bytes: &[u8],
    parser: &mut BackendParser,
    filter: &mut BackendFilter,
    session: &mut SessionState,
    client_write: &mut OwnedWriteHalf,
    upstream_write: &mut OwnedWriteHalf,
) -> Result<bool> {
    let mut chunk = bytes.to_vec();
    loop {
        let (frame, overflow) = match parser.consume(&chunk)? {
            ParseProgress::Incomplete => return Ok(false),
            ParseProgress::Complete { frame, overflow } => (frame, overflow),
        };
        debug!(frame = frame.name(false), len = frame.len(), "upstream frame");

        let outcome = filter.handle(&frame, session);
        match outcome.peer {
            PeerAction::Transmit => client_write.write_all(frame.as_bytes()).await?,
            PeerAction::Translate(frames) => {
                for replacement in &frames {
                    client_write.write_all(replacement.as_bytes()).await?;
                }
            }
            PeerAction::Drop => {}
        }
        for reply in &outcome.spoof {
            upstream_write.write_all(reply.as_bytes()).await?;
        }
        if outcome.disconnect {
            upstream_write.flush().await?;
            return Ok(true);
        }
        chunk = overflow;
    }
}
