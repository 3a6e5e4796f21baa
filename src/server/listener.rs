//! TCP listener and accept loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::server::ConnectionPair;

/// Counters exposed for tests and shutdown logging.
#[derive(Debug, Default)]
pub struct ListenerStats {
    accepted: AtomicU64,
    active: AtomicU64,
}

impl ListenerStats {
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }
}

/// Accepts client connections and spawns a [`ConnectionPair`] task for each.
pub struct Listener {
    listener: TcpListener,
    config: Arc<Config>,
    stats: Arc<ListenerStats>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Listener {
    /// Bind the configured listen address.
    pub async fn bind(config: Arc<Config>, shutdown_tx: broadcast::Sender<()>) -> Result<Self> {
        let address = format!(
            "{}:{}",
            config.server.listen_address, config.server.listen_port
        );
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| ProxyError::Connection(format!("failed to bind {address}: {e}")))?;
        info!("Listening on {}", address);

        Ok(Self {
            listener,
            config,
            stats: Arc::new(ListenerStats::default()),
            shutdown_tx,
        })
    }

    /// Actual bound address, useful when the configured port is 0.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn stats(&self) -> Arc<ListenerStats> {
        Arc::clone(&self.stats)
    }

    /// Run the accept loop until the shutdown channel fires.
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((socket, addr)) => {
                            self.stats.accepted.fetch_add(1, Ordering::Relaxed);
                            self.stats.active.fetch_add(1, Ordering::Relaxed);
                            debug!(client = %addr, "accepted connection");

                            let config = Arc::clone(&self.config);
                            let stats = Arc::clone(&self.stats);
                            let pair_shutdown = self.shutdown_tx.subscribe();
                            tokio::spawn(async move {
                                match ConnectionPair::connect(socket, addr, &config, pair_shutdown).await {
                                    Ok(pair) => {
                                        if let Err(e) = pair.run().await {
                                            warn!(client = %addr, error = %e, "connection closed with error");
                                        }
                                    }
                                    Err(e) => {
                                        warn!(client = %addr, error = %e, "upstream connect failed");
                                    }
                                }
                                stats.active.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "accept failed");
                            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!(
                        accepted = self.stats.accepted(),
                        active = self.stats.active(),
                        "listener shutting down"
                    );
                    break;
                }
            }
        }

        Ok(())
    }
}
