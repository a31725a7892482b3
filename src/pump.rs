// ABOUTME: The two directional forwarding loops that make up one session's pump
// ABOUTME: Client->upstream and upstream->client run as independent tasks sharing Session's stopped flag

use crate::connection::{FrameReader, Transport};
use crate::handler::Handler;
use crate::session::Session;
use std::sync::Arc;
use tokio::io::ReadHalf;
use tokio::sync::oneshot;

/// Drive one session to completion: spawn the client→upstream and
/// upstream→client loops, wait for both to exit, then invoke
/// `on_client_disconnect` exactly once.
///
/// Returns once the session is fully torn down. The caller (the accept
/// loop in [`crate::server`]) typically spawns this itself rather than
/// awaiting it inline, so that one slow or stuck session cannot hold up
/// accepting the next connection.
pub async fn run<T, H>(
    session: Arc<Session<T>>,
    client_reader: FrameReader<ReadHalf<T>>,
    upstream_handoff: oneshot::Receiver<FrameReader<ReadHalf<T>>>,
    handler: Arc<H>,
) where
    T: Transport,
    H: Handler<T>,
{
    tracing::debug!(remote_addr = %session.remote_addr(), "pump starting");

    let client_task = tokio::spawn(client_loop(session.clone(), client_reader, handler.clone()));
    let upstream_task = tokio::spawn(upstream_loop(session.clone(), upstream_handoff, handler.clone()));

    let _ = tokio::join!(client_task, upstream_task);

    handler.on_client_disconnect(&session).await;

    tracing::debug!(remote_addr = %session.remote_addr(), "pump stopped");
}

async fn client_loop<T, H>(
    session: Arc<Session<T>>,
    mut reader: FrameReader<ReadHalf<T>>,
    handler: Arc<H>,
) where
    T: Transport,
    H: Handler<T>,
{
    let mut connected = false;

    loop {
        if session.is_stopped() {
            break;
        }

        let frame = match reader.read_frame().await {
            Ok(frame) => frame,
            Err(_) => break,
        };

        if !connected {
            connected = true;
            handler.on_client_connect(&session).await;
        }

        let blocked = handler.on_client_packet(&session, &frame).await;
        if blocked {
            tracing::warn!(remote_addr = %session.remote_addr(), "client frame blocked");
            continue;
        }

        if session.write_upstream(&frame).await.is_err() {
            break;
        }
    }

    session.mark_stopped();
    session.close_client().await;
    session.cancel_upstream_handoff().await;
}

async fn upstream_loop<T, H>(
    session: Arc<Session<T>>,
    handoff: oneshot::Receiver<FrameReader<ReadHalf<T>>>,
    handler: Arc<H>,
) where
    T: Transport,
    H: Handler<T>,
{
    let mut reader = match handoff.await {
        Ok(reader) => reader,
        Err(_) => {
            // The client loop exited (kicked, disconnected, or errored)
            // before ever attaching an upstream. Nothing to pump.
            session.mark_stopped();
            return;
        }
    };

    loop {
        if session.is_stopped() {
            break;
        }

        let frame = match reader.read_frame().await {
            Ok(frame) => frame,
            Err(_) => break,
        };

        let blocked = handler.on_remote_packet(&session, &frame).await;
        if blocked {
            tracing::warn!(remote_addr = %session.remote_addr(), "remote frame blocked");
            continue;
        }

        if session.write_client(&frame).await.is_err() {
            break;
        }
    }

    session.mark_stopped();
    session.close_upstream().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Frame, FrameWriter as Builder};
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Mutex as StdMutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::Mutex as AsyncMutex;

    /// A handler that records every frame it sees and, if configured,
    /// attaches an upstream transport on connect and blocks one frame type
    /// per direction.
    struct Recorder<T> {
        upstream_to_attach: AsyncMutex<Option<T>>,
        connects: AtomicUsize,
        disconnects: AtomicUsize,
        client_types: StdMutex<Vec<u8>>,
        remote_types: StdMutex<Vec<u8>>,
        block_client_type: Option<u8>,
        block_remote_type: Option<u8>,
    }

    impl<T> Recorder<T> {
        fn new(upstream_to_attach: Option<T>) -> Self {
            Recorder {
                upstream_to_attach: AsyncMutex::new(upstream_to_attach),
                connects: AtomicUsize::new(0),
                disconnects: AtomicUsize::new(0),
                client_types: StdMutex::new(Vec::new()),
                remote_types: StdMutex::new(Vec::new()),
                block_client_type: None,
                block_remote_type: None,
            }
        }
    }

    impl<T: Transport> Handler<T> for Recorder<T> {
        async fn on_client_connect(&self, session: &Arc<Session<T>>) {
            self.connects.fetch_add(1, AtomicOrdering::SeqCst);
            if let Some(upstream) = self.upstream_to_attach.lock().await.take() {
                session.set_upstream(upstream).await;
            }
        }

        async fn on_client_disconnect(&self, _session: &Arc<Session<T>>) {
            self.disconnects.fetch_add(1, AtomicOrdering::SeqCst);
        }

        async fn on_client_packet(&self, _session: &Arc<Session<T>>, frame: &Frame) -> bool {
            self.client_types.lock().unwrap().push(frame.type_byte());
            Some(frame.type_byte()) == self.block_client_type
        }

        async fn on_remote_packet(&self, _session: &Arc<Session<T>>, frame: &Frame) -> bool {
            self.remote_types.lock().unwrap().push(frame.type_byte());
            Some(frame.type_byte()) == self.block_remote_type
        }
    }

    fn frame_of(type_byte: u8) -> Frame {
        Builder::new().finish(type_byte).unwrap()
    }

    #[tokio::test]
    async fn forwards_frames_in_order_both_directions() {
        let (mut client_test, client_session_side) = tokio::io::duplex(4096);
        let (upstream_session_side, mut upstream_test) = tokio::io::duplex(4096);

        let (session, client_reader, upstream_rx) =
            Session::new(client_session_side, "test-peer".to_string());
        let session = Arc::new(session);
        let handler = Arc::new(Recorder::new(Some(upstream_session_side)));

        let pump = tokio::spawn(run(
            session.clone(),
            client_reader,
            upstream_rx,
            handler.clone(),
        ));

        for type_byte in [10u8, 11, 12] {
            client_test
                .write_all(frame_of(type_byte).bytes())
                .await
                .unwrap();
        }
        for type_byte in [20u8, 21] {
            upstream_test
                .write_all(frame_of(type_byte).bytes())
                .await
                .unwrap();
        }

        let mut seen_upstream = Vec::new();
        let mut buf = [0u8; 3];
        for _ in 0..3 {
            upstream_test.read_exact(&mut buf).await.unwrap();
            seen_upstream.push(buf[2]);
        }
        let mut seen_client = Vec::new();
        for _ in 0..2 {
            client_test.read_exact(&mut buf).await.unwrap();
            seen_client.push(buf[2]);
        }

        assert_eq!(seen_upstream, vec![10, 11, 12]);
        assert_eq!(seen_client, vec![20, 21]);

        drop(client_test);
        drop(upstream_test);
        pump.await.unwrap();

        assert_eq!(handler.connects.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(handler.disconnects.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(*handler.client_types.lock().unwrap(), vec![10, 11, 12]);
        assert_eq!(*handler.remote_types.lock().unwrap(), vec![20, 21]);
    }

    #[tokio::test]
    async fn blocked_client_frame_never_reaches_upstream() {
        let (mut client_test, client_session_side) = tokio::io::duplex(4096);
        let (upstream_session_side, mut upstream_test) = tokio::io::duplex(4096);

        let (session, client_reader, upstream_rx) =
            Session::new(client_session_side, "test-peer".to_string());
        let session = Arc::new(session);
        let mut handler = Recorder::new(Some(upstream_session_side));
        handler.block_client_type = Some(11);
        let handler = Arc::new(handler);

        let pump = tokio::spawn(run(
            session.clone(),
            client_reader,
            upstream_rx,
            handler.clone(),
        ));

        for type_byte in [10u8, 11, 12] {
            client_test
                .write_all(frame_of(type_byte).bytes())
                .await
                .unwrap();
        }

        let mut seen = Vec::new();
        let mut buf = [0u8; 3];
        for _ in 0..2 {
            upstream_test.read_exact(&mut buf).await.unwrap();
            seen.push(buf[2]);
        }
        assert_eq!(seen, vec![10, 12]);

        drop(client_test);
        drop(upstream_test);
        pump.await.unwrap();
    }

    #[tokio::test]
    async fn disconnect_fires_even_when_client_never_sends_a_frame() {
        let (client_test, client_session_side) = tokio::io::duplex(64);
        let (session, client_reader, upstream_rx) =
            Session::new(client_session_side, "test-peer".to_string());
        let session = Arc::new(session);
        let handler: Arc<Recorder<tokio::io::DuplexStream>> = Arc::new(Recorder::new(None));

        let pump = tokio::spawn(run(
            session.clone(),
            client_reader,
            upstream_rx,
            handler.clone(),
        ));

        drop(client_test);
        pump.await.unwrap();

        assert_eq!(handler.connects.load(AtomicOrdering::SeqCst), 0);
        assert_eq!(handler.disconnects.load(AtomicOrdering::SeqCst), 1);
    }
}
