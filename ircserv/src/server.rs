//! Shared state and the TCP accept loop.
//!
//! A server goes through two stages before it runs: [`Server`] holds only its
//! configuration, [`Server::bind`] turns it into a [`Listening`] server that
//! owns the socket, and [`Listening::serve`] accepts clients until the
//! cancellation token fires.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::client::ClientId;
use crate::command::Dispatcher;
use crate::config::ServerConfig;
use crate::connection;
use crate::state::Registry;

/// How long shutdown waits for connection tasks to say goodbye.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Pause after a failed accept so a persistent error (e.g. EMFILE) doesn't spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// State shared by every connection task.
pub struct SharedState {
    pub config: ServerConfig,
    pub dispatcher: Dispatcher,
    /// Every session and channel. Commands run to completion under this lock.
    pub registry: Mutex<Registry>,
    next_id: AtomicU64,
}

impl SharedState {
    pub fn new(config: ServerConfig) -> Self {
        let registry = Registry::new(&config.server_name, &config.password);
        Self {
            config,
            dispatcher: Dispatcher::new(),
            registry: Mutex::new(registry),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn next_client_id(&self) -> ClientId {
        ClientId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

/// A configured server that has not bound its socket yet.
pub struct Server {
    config: ServerConfig,
}

/// A server with a bound listener, ready to accept.
pub struct Listening {
    listener: TcpListener,
    state: Arc<SharedState>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    pub async fn bind(self) -> Result<Listening> {
        let listener = TcpListener::bind(&self.config.listen_addr)
            .await
            .with_context(|| format!("failed to bind {}", self.config.listen_addr))?;
        Ok(Listening {
            listener,
            state: Arc::new(SharedState::new(self.config)),
        })
    }

    /// Bind and serve until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        self.bind().await?.serve(cancel).await
    }

    /// Start the server and return the bound address + task handle (for testing).
    pub async fn start(
        self,
        cancel: CancellationToken,
    ) -> Result<(SocketAddr, JoinHandle<Result<()>>)> {
        let listening = self.bind().await?;
        let addr = listening.local_addr()?;
        let handle = tokio::spawn(listening.serve(cancel));
        Ok((addr, handle))
    }
}

impl Listening {
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn state(&self) -> Arc<SharedState> {
        Arc::clone(&self.state)
    }

    pub async fn serve(self, cancel: CancellationToken) -> Result<()> {
        let addr = self.local_addr()?;
        tracing::info!("Listening on {addr}");

        let mut connections = JoinSet::new();
        let mut tick = tokio::time::interval(self.state.config.idle_tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Shutting down");
                    break;
                }
                result = self.listener.accept() => match result {
                    Ok((stream, peer)) => {
                        let state = Arc::clone(&self.state);
                        let cancel = cancel.child_token();
                        connections.spawn(async move {
                            if let Err(e) = connection::handle(stream, peer, state, cancel).await {
                                tracing::error!(%peer, "Connection error: {e:#}");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                _ = tick.tick() => {
                    while let Some(finished) = connections.try_join_next() {
                        if let Err(e) = finished {
                            tracing::warn!("Connection task failed: {e}");
                        }
                    }
                    let (clients, channels) = {
                        let reg = self.state.registry.lock();
                        (reg.client_count(), reg.channel_count())
                    };
                    tracing::debug!(clients, channels, tasks = connections.len(), "Idle tick");
                }
            }
        }

        drop(self.listener);
        let open = connections.len();
        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(open, "Connections did not close in time, aborting");
            connections.abort_all();
        }
        tracing::info!("Server stopped");
        Ok(())
    }
}
