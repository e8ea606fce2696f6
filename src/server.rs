//! TCP server: accepts clients and runs one session per connection

use crate::session::{Session, SessionConfig};
use crate::source::DataSource;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::{error, info, info_span, warn, Instrument};

/// Default listening port
pub const DEFAULT_PORT: u16 = 8080;

pub struct Server {
    listener: TcpListener,
    source: Arc<dyn DataSource>,
    config: SessionConfig,
}

impl Server {
    pub async fn bind(
        addr: impl ToSocketAddrs,
        source: Arc<dyn DataSource>,
        config: SessionConfig,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            source,
            config,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept clients until an accept error occurs
    pub async fn run(self) -> io::Result<()> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Accept clients until `shutdown` resolves. Sessions already running
    /// are left to finish on their own.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> io::Result<()> {
        info!(addr = %self.local_addr()?, model_dir = %self.config.model_dir.display(), "server started");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (socket, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            error!(error = %e, "accept failed");
                            return Err(e);
                        }
                    };
                    info!(%peer, "client connected");

                    let session = Session::new(socket, Arc::clone(&self.source), self.config.clone());
                    tokio::spawn(
                        async move {
                            if let Err(e) = session.run().await {
                                warn!(error = %e, "session ended");
                            }
                        }
                        .instrument(info_span!("session", %peer)),
                    );
                }
            }
        }
    }
}
