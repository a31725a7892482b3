// ABOUTME: Pairs a client transport with an optional upstream transport
// ABOUTME: Exposes write-only façades so handlers cannot interfere with pump read discipline

use crate::connection::{FrameReader, FrameWriter, Transport};
use crate::frame::{CodecError, Frame};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::split;
use tokio::sync::{oneshot, Mutex};

/// One accepted connection: a client transport and, once attached, an
/// upstream transport.
///
/// The pump owns both read halves exclusively for the lifetime of the
/// session. The handler is only ever given write-only façades
/// ([`Session::client_writer`], [`Session::upstream_writer`]) plus
/// [`Session::set_upstream`], so it can inject frames or dial upstream but
/// cannot interfere with the pump's read loops.
pub struct Session<T: Transport> {
    remote_addr: String,
    client_writer: Mutex<FrameWriter<tokio::io::WriteHalf<T>>>,
    upstream_writer: Mutex<Option<FrameWriter<tokio::io::WriteHalf<T>>>>,
    upstream_reader_tx: Mutex<Option<oneshot::Sender<FrameReader<tokio::io::ReadHalf<T>>>>>,
    stopped: AtomicBool,
}

impl<T: Transport> Session<T> {
    /// Construct a session from an already-accepted client transport.
    /// Returns the session plus the client [`FrameReader`] the pump's
    /// client→upstream loop must read from, and a receiver the
    /// upstream→client loop awaits to obtain the upstream reader once
    /// [`Session::set_upstream`] is called.
    pub fn new(
        client: T,
        remote_addr: String,
    ) -> (
        Session<T>,
        FrameReader<tokio::io::ReadHalf<T>>,
        oneshot::Receiver<FrameReader<tokio::io::ReadHalf<T>>>,
    ) {
        let (read_half, write_half) = split(client);
        let (tx, rx) = oneshot::channel();

        let session = Session {
            remote_addr,
            client_writer: Mutex::new(FrameWriter::new(write_half)),
            upstream_writer: Mutex::new(None),
            upstream_reader_tx: Mutex::new(Some(tx)),
            stopped: AtomicBool::new(false),
        };

        (session, FrameReader::new(read_half), rx)
    }

    /// The client's remote address, as captured at accept time.
    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    /// `true` once either pump loop has exited.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub(crate) fn mark_stopped(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    /// Write a frame to the client. Used by handlers to inject substitute
    /// or synthetic packets (e.g. a kick message) and by the
    /// upstream→client pump loop to forward unblocked frames.
    pub async fn write_client(&self, frame: &Frame) -> Result<(), CodecError> {
        self.client_writer.lock().await.write_frame(frame).await
    }

    /// Shut down the client write half.
    pub async fn close_client(&self) {
        self.client_writer.lock().await.close().await;
    }

    /// Attach the upstream transport dialed by the handler during
    /// `on_client_connect`. Splits it into read/write halves: the write
    /// half is stored for [`Session::write_upstream`], and the read half is
    /// handed to the upstream→client pump loop, which has been waiting on
    /// the paired oneshot receiver since the session started.
    ///
    /// A second call is a programming error — a session dials upstream at
    /// most once — and is ignored rather than panicking, matching the
    /// pump's policy of never letting handler misuse take down a session.
    pub async fn set_upstream(&self, upstream: T) {
        let (read_half, write_half) = split(upstream);

        *self.upstream_writer.lock().await = Some(FrameWriter::new(write_half));

        if let Some(tx) = self.upstream_reader_tx.lock().await.take() {
            let _ = tx.send(FrameReader::new(read_half));
        }

        tracing::debug!(remote_addr = %self.remote_addr, "upstream attached");
    }

    /// Write a frame to the upstream connection, if attached. Writing
    /// before `set_upstream` has run is a no-op — there is nothing to
    /// inject into yet.
    pub async fn write_upstream(&self, frame: &Frame) -> Result<(), CodecError> {
        match self.upstream_writer.lock().await.as_mut() {
            Some(writer) => writer.write_frame(frame).await,
            None => Ok(()),
        }
    }

    /// `true` once the handler has attached an upstream transport.
    pub async fn has_upstream(&self) -> bool {
        self.upstream_writer.lock().await.is_some()
    }

    /// Shut down the upstream write half, if attached.
    pub async fn close_upstream(&self) {
        if let Some(writer) = self.upstream_writer.lock().await.as_mut() {
            writer.close().await;
        }
    }

    /// Release the upstream→client loop from waiting on the handoff
    /// receiver when no upstream is ever going to arrive (the client loop
    /// exited, whether kicked or disconnected, without calling
    /// [`Session::set_upstream`]). A no-op if the handoff already happened.
    pub(crate) async fn cancel_upstream_handoff(&self) {
        self.upstream_reader_tx.lock().await.take();
    }
}
