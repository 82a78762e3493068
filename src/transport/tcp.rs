use super::{read_frame, write_frame};
use crate::error::{AggregatorError, FrameError};
use crate::events::{RecordBatch, RecordReply};
use crate::ingest::IngestionEndpoint;
use socket2::SockRef;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Connection identifier for tracking client connections in logs
pub type ConnectionId = u64;

/// Default socket receive buffer for worker connections. Batches can be large.
const RECV_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// TCP server feeding inbound batches to an [`IngestionEndpoint`]
pub struct IngestionServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    next_connection_id: Arc<AtomicU64>,
}

impl IngestionServer {
    /// Bind the listener. Failure here is fatal for the run.
    pub async fn bind(addr: SocketAddr) -> Result<Self, AggregatorError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| AggregatorError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| AggregatorError::Bind { addr, source })?;

        debug!("Ingestion server listening on: {}", local_addr);

        Ok(Self {
            listener,
            local_addr,
            next_connection_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until `shutdown` turns true (or its sender is dropped)
    ///
    /// On shutdown the listener stops accepting, idle connections are closed
    /// and a batch already being ingested is finished and acknowledged before
    /// its handler exits.
    pub async fn serve(self, endpoint: IngestionEndpoint, mut shutdown: watch::Receiver<bool>) {
        let mut handlers = JoinSet::new();

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, client_addr)) => {
                        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
                        debug!(
                            "Accepted ingestion connection {} from: {}",
                            connection_id, client_addr
                        );
                        configure_stream(&stream);

                        handlers.spawn(Self::handle_connection(
                            connection_id,
                            stream,
                            endpoint.clone(),
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => {
                        error!("Failed to accept ingestion connection: {}", e);
                    }
                },
            }
        }

        info!("Terminating events recorder server");
        drop(self.listener);

        while let Some(joined) = handlers.join_next().await {
            if let Err(e) = joined {
                warn!("Ingestion connection handler failed: {}", e);
            }
        }
        debug!("Ingestion server stopped");
    }

    /// Handle a single worker connection
    async fn handle_connection(
        connection_id: ConnectionId,
        mut stream: TcpStream,
        endpoint: IngestionEndpoint,
        mut shutdown: watch::Receiver<bool>,
    ) {
        debug!("Handling ingestion connection {}", connection_id);

        loop {
            if *shutdown.borrow() {
                break;
            }

            let batch: RecordBatch = tokio::select! {
                _ = shutdown.changed() => {
                    debug!("Closing connection {} on shutdown", connection_id);
                    break;
                }
                frame = read_frame(&mut stream) => match frame {
                    Ok(batch) => batch,
                    Err(FrameError::Closed) => {
                        debug!("Connection {} closed by peer", connection_id);
                        break;
                    }
                    Err(e) => {
                        warn!("Dropping connection {}: {}", connection_id, e);
                        break;
                    }
                },
            };

            let reply = endpoint.ingest(&batch);
            if let Err(e) = write_frame(&mut stream, &reply).await {
                warn!(
                    "Failed to acknowledge batch on connection {}: {}",
                    connection_id, e
                );
                break;
            }
        }

        debug!("Connection {} handler finished", connection_id);
    }
}

fn configure_stream(stream: &TcpStream) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Failed to set TCP_NODELAY: {}", e);
    }
    if let Err(e) = SockRef::from(stream).set_recv_buffer_size(RECV_BUFFER_SIZE) {
        debug!("Failed to set receive buffer size: {}", e);
    }
}

/// Worker-side half of the ingestion protocol
pub struct IngestionClient {
    stream: TcpStream,
    peer: SocketAddr,
}

impl IngestionClient {
    /// Connect to an ingestion server
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, FrameError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;

        debug!("Ingestion client connected to: {}", peer);
        Ok(Self { stream, peer })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Send one batch and wait for its acknowledgement
    pub async fn send_batch(&mut self, batch: &RecordBatch) -> Result<RecordReply, FrameError> {
        write_frame(&mut self.stream, batch).await?;
        read_frame(&mut self.stream).await
    }
}
