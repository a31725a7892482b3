// ABOUTME: The callback surface through which user code observes and steers a session
// ABOUTME: Generic over the transport so the built-in Direct handler works over duplex and TCP alike

use crate::connection::Transport;
use crate::frame::Frame;
use crate::session::Session;
use std::future::Future;
use std::sync::Arc;

/// User-supplied per-session callbacks.
///
/// A pump drives these four hooks as it forwards frames between a client
/// and its upstream. `on_client_connect` fires once, on the first client
/// frame, and is expected to attach an upstream transport via
/// [`Session::set_upstream`] (or kick and close the client instead).
/// `on_client_packet`/`on_remote_packet` fire once per frame in their
/// direction and decide whether the frame is forwarded or dropped.
/// `on_client_disconnect` fires exactly once, after both pump loops have
/// exited — even if `on_client_connect` never ran.
///
/// The two packet hooks may be invoked concurrently by the pump's two
/// directional loops; implementations must be safe under concurrent
/// invocation for a single session (the pump itself never calls the same
/// hook concurrently with itself).
pub trait Handler<T: Transport>: Send + Sync + 'static {
    /// Called once, on the first successfully read client frame.
    fn on_client_connect(&self, session: &Arc<Session<T>>) -> impl Future<Output = ()> + Send;

    /// Called once, after both directional loops have exited.
    fn on_client_disconnect(&self, session: &Arc<Session<T>>) -> impl Future<Output = ()> + Send;

    /// Called for each frame read from the client, before it would be
    /// forwarded upstream. Returning `true` blocks the frame.
    fn on_client_packet(
        &self,
        session: &Arc<Session<T>>,
        frame: &Frame,
    ) -> impl Future<Output = bool> + Send;

    /// Called for each frame read from upstream, before it would be
    /// forwarded to the client. Returning `true` blocks the frame.
    fn on_remote_packet(
        &self,
        session: &Arc<Session<T>>,
        frame: &Frame,
    ) -> impl Future<Output = bool> + Send;
}

/// Delegating impl so a handler can be shared (e.g. to retain a handle for
/// inspection in tests, or across multiple `Server`s) by wrapping it in an
/// `Arc` before handing it to [`crate::server::Server::bind`] or
/// [`crate::server::listen_and_serve`].
impl<T: Transport, H: Handler<T>> Handler<T> for Arc<H> {
    async fn on_client_connect(&self, session: &Arc<Session<T>>) {
        self.as_ref().on_client_connect(session).await
    }

    async fn on_client_disconnect(&self, session: &Arc<Session<T>>) {
        self.as_ref().on_client_disconnect(session).await
    }

    async fn on_client_packet(&self, session: &Arc<Session<T>>, frame: &Frame) -> bool {
        self.as_ref().on_client_packet(session, frame).await
    }

    async fn on_remote_packet(&self, session: &Arc<Session<T>>, frame: &Frame) -> bool {
        self.as_ref().on_remote_packet(session, frame).await
    }
}
