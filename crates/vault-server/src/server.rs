//! Connection acceptor.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::directory::Directory;
use crate::error::Result;
use crate::file_store::FileStorage;
use crate::session;

/// Shared by every session.
#[derive(Clone)]
pub struct ServerState {
    pub directory: Arc<Directory>,
    pub storage: Arc<FileStorage>,
    /// Largest accepted upload body; 0 means unbounded.
    pub max_file_size: usize,
}

impl ServerState {
    pub fn new(directory: Directory, storage: FileStorage, config: &ServerConfig) -> Self {
        Self {
            directory: Arc::new(directory),
            storage: Arc::new(storage),
            max_file_size: config.max_file_size,
        }
    }
}

pub struct Server {
    listener: TcpListener,
    state: ServerState,
}

impl Server {
    pub async fn bind(addr: SocketAddr, state: ServerState) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the task is dropped. Each connection gets
    /// its own task; a failing session never stops the loop.
    pub async fn run(self) -> Result<()> {
        info!(addr = %self.local_addr()?, "Listening");

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let state = self.state.clone();
                    tokio::spawn(serve_connection(stream, peer, state));
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

async fn serve_connection(stream: TcpStream, peer: SocketAddr, state: ServerState) {
    info!(%peer, "Connection accepted");
    if let Err(e) = stream.set_nodelay(true) {
        warn!(%peer, error = %e, "Failed to set TCP_NODELAY");
    }

    if let Err(e) = session::run(stream, peer, state).await {
        warn!(%peer, error = %e, "Session aborted");
    }
}
