// ABOUTME: Built-in handler that dials a single upstream unconditionally and enforces a player cap
// ABOUTME: Synthesizes a Terraria kick frame when the cap is hit or the upstream dial fails

use crate::frame::{Frame, FrameWriter};
use crate::handler::Handler;
use crate::session::Session;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;

/// The Terraria "disconnect" packet type used for kick frames.
const KICK_TYPE: u8 = 2;

/// Configuration for [`Direct`].
#[derive(Clone, Debug)]
pub struct DirectConfig {
    /// Address to dial for every accepted client, e.g. `"127.0.0.1:7777"`.
    pub upstream: String,
    /// Soft cap on concurrent relayed players. `0` means unlimited,
    /// negative means deny every connection.
    pub max_players: i64,
    /// Reason string sent in the kick frame when dialing upstream fails.
    pub connection_failed: String,
    /// Reason string sent in the kick frame when the cap is exceeded.
    pub server_is_full: String,
}

impl DirectConfig {
    pub fn new(upstream: impl Into<String>) -> Self {
        DirectConfig {
            upstream: upstream.into(),
            max_players: 0,
            connection_failed: "trelay: could not connect to server".to_string(),
            server_is_full: "trelay: server is full".to_string(),
        }
    }

    pub fn with_max_players(mut self, max_players: i64) -> Self {
        self.max_players = max_players;
        self
    }

    pub fn with_connection_failed(mut self, reason: impl Into<String>) -> Self {
        self.connection_failed = reason.into();
        self
    }

    pub fn with_server_is_full(mut self, reason: impl Into<String>) -> Self {
        self.server_is_full = reason.into();
        self
    }
}

impl Default for DirectConfig {
    fn default() -> Self {
        DirectConfig::new(String::new())
    }
}

/// Reference handler: dials `config.upstream` for every client and enforces
/// a soft concurrent-player cap.
///
/// A session's slot is considered reserved for exactly as long as it has an
/// attached upstream, so `on_client_disconnect` decrements the counter by
/// checking [`Session::has_upstream`] rather than tracking per-session
/// state separately — a kicked session never attaches one, and a
/// dial-failure releases its slot inline before the pump ever calls
/// disconnect.
pub struct Direct {
    config: DirectConfig,
    current_players: AtomicI64,
}

impl Direct {
    pub fn new(config: DirectConfig) -> Self {
        Direct {
            config,
            current_players: AtomicI64::new(0),
        }
    }

    /// Current count of sessions attached to an upstream.
    pub fn current_players(&self) -> i64 {
        self.current_players.load(Ordering::SeqCst)
    }

    /// Atomically test the cap and, if there's room, take a slot. `false`
    /// means the caller must reject the connection without having reserved
    /// anything.
    fn try_reserve_slot(&self) -> bool {
        if self.config.max_players < 0 {
            return false;
        }
        loop {
            let current = self.current_players.load(Ordering::SeqCst);
            if self.config.max_players > 0 && current >= self.config.max_players {
                return false;
            }
            if self
                .current_players
                .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return true;
            }
        }
    }

    fn release_slot(&self) {
        self.current_players.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Build a Terraria disconnect (kick) frame: type 2, payload `[0x00,
/// <LEB128-prefixed reason>]`. The leading zero is Terraria's
/// "NetworkText mode = literal" marker.
fn kick_frame(reason: &str) -> Option<Frame> {
    match FrameWriter::new().put_u8(0).put_string(reason).finish(KICK_TYPE) {
        Ok(frame) => Some(frame),
        Err(err) => {
            tracing::warn!(%err, "could not build kick frame");
            None
        }
    }
}

impl Handler<TcpStream> for Direct {
    async fn on_client_connect(&self, session: &Arc<Session<TcpStream>>) {
        if !self.try_reserve_slot() {
            tracing::warn!(remote_addr = %session.remote_addr(), "player cap reached, kicking");
            if let Some(frame) = kick_frame(&self.config.server_is_full) {
                let _ = session.write_client(&frame).await;
            }
            session.close_client().await;
            return;
        }

        match TcpStream::connect(&self.config.upstream).await {
            Ok(upstream) => session.set_upstream(upstream).await,
            Err(err) => {
                tracing::warn!(remote_addr = %session.remote_addr(), error = %err, "upstream dial failed");
                if let Some(frame) = kick_frame(&self.config.connection_failed) {
                    let _ = session.write_client(&frame).await;
                }
                session.close_client().await;
                self.release_slot();
            }
        }
    }

    async fn on_client_disconnect(&self, session: &Arc<Session<TcpStream>>) {
        if session.has_upstream().await {
            self.release_slot();
        }
    }

    async fn on_client_packet(&self, _session: &Arc<Session<TcpStream>>, _frame: &Frame) -> bool {
        false
    }

    async fn on_remote_packet(&self, _session: &Arc<Session<TcpStream>>, _frame: &Frame) -> bool {
        false
    }
}
