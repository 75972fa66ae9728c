//! TCP accept loop.

use std::io;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::server::WeakServer;

/// Accept connections until `shutdown` fires or the server is dropped.
pub(crate) async fn run(listener: TcpListener, server: WeakServer, shutdown: CancellationToken) {
    info!("listener started");

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!("listener shutting down");
                break;
            }

            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        let Some(server) = server.upgrade() else {
                            debug!("server dropped, stopping listener");
                            break;
                        };

                        if let Err(e) = configure_socket(&stream) {
                            warn!(%peer, error = %e, "socket configuration failed");
                            continue;
                        }

                        debug!(%peer, "connection accepted");
                        server.on_connected(stream, peer).await;
                    }
                    Err(e) => {
                        error!(error = %e, "accept error");
                    }
                }
            }
        }
    }

    info!("listener stopped");
}

/// Configure TCP socket options.
fn configure_socket(stream: &TcpStream) -> io::Result<()> {
    stream.set_nodelay(true)?;
    Ok(())
}
