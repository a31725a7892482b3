// ABOUTME: TCP listener and accept loop; spawns one pump per accepted connection
// ABOUTME: stop() unblocks the accept loop so it returns and drops the listener

use crate::handler::Handler;
use crate::pump;
use crate::session::Session;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::Notify;

/// A bound relay listener paired with the handler shared by every session
/// it spawns.
///
/// The handler is treated as immutable for the server's lifetime: it is
/// wrapped once in an `Arc` at construction and cloned per accepted
/// connection, never swapped out while the accept loop is running.
/// [`Server::stop`] and [`Server::listen_and_serve`] both take `&self`, so
/// a caller typically holds the server behind an `Arc` and calls `stop`
/// from a different task than the one driving the accept loop.
pub struct Server<H> {
    listener: TcpListener,
    handler: Arc<H>,
    stop_signal: Notify,
}

impl<H: Handler<TcpStream>> Server<H> {
    /// Bind a TCP listener on `addr` and pair it with `handler`.
    pub async fn bind(addr: impl ToSocketAddrs, handler: H) -> std::io::Result<Server<H>> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(local_addr = ?listener.local_addr().ok(), "listener bound");
        Ok(Server {
            listener,
            handler: Arc::new(handler),
            stop_signal: Notify::new(),
        })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the accept loop until [`Server::stop`] is called or accepting a
    /// connection errors. Each accepted connection gets its own session
    /// pump, spawned onto the runtime and left to run independently — a
    /// slow or misbehaving session never blocks accepting the next one.
    ///
    /// In-flight sessions are not forcibly terminated when this returns;
    /// they continue until their own I/O fails.
    pub async fn listen_and_serve(&self) -> std::io::Result<()> {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, addr) = accepted?;
                    tracing::info!(remote_addr = %addr, "client connected");

                    let (session, client_reader, upstream_rx) =
                        Session::new(stream, addr.to_string());
                    let session = Arc::new(session);
                    let handler = self.handler.clone();

                    tokio::spawn(async move {
                        pump::run(session, client_reader, upstream_rx, handler).await;
                    });
                }
                _ = self.stop_signal.notified() => {
                    tracing::info!("listener stopping");
                    return Ok(());
                }
            }
        }
    }

    /// Interrupt the accept loop. In-flight sessions are left running.
    pub fn stop(&self) {
        self.stop_signal.notify_one();
    }
}

/// Bind `addr` and run the accept loop with `handler` until it errors.
///
/// This is the single-call convenience entry point; reach for
/// [`Server::bind`] directly when the caller needs to retain a handle for
/// [`Server::stop`] or needs the bound address before serving (e.g. when
/// `addr` uses an ephemeral port).
pub async fn listen_and_serve<H: Handler<TcpStream>>(
    addr: impl ToSocketAddrs,
    handler: H,
) -> std::io::Result<()> {
    Server::bind(addr, handler).await?.listen_and_serve().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::direct::{Direct, DirectConfig};
    use std::sync::Arc;

    #[tokio::test]
    async fn stop_unblocks_the_accept_loop() {
        let server = Server::bind(
            "127.0.0.1:0",
            Direct::new(DirectConfig::new("127.0.0.1:1")),
        )
        .await
        .unwrap();
        let server = Arc::new(server);

        let running = {
            let server = server.clone();
            tokio::spawn(async move { server.listen_and_serve().await })
        };

        server.stop();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), running)
            .await
            .expect("listen_and_serve did not return after stop");
        assert!(result.unwrap().is_ok());
    }
}
