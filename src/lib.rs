//! A transparent, programmable TCP relay for the Terraria multiplayer wire
//! protocol.
//!
//! `trelay` accepts game-client connections, dials a configured upstream
//! game server, and shuttles length-prefixed packets between the two peers
//! while giving an application-supplied [`Handler`] the opportunity to
//! inspect, transform, block, or inject packets in either direction.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use trelay::{listen_and_serve, Direct, DirectConfig};
//!
//! #[tokio::main]
//! async fn main() -> trelay::Result<()> {
//!     let handler = Direct::new(DirectConfig::new("127.0.0.1:7777").with_max_players(100));
//!     listen_and_serve("0.0.0.0:7778", handler).await
//! }
//! ```

pub mod connection;
pub mod direct;
pub mod frame;
pub mod handler;
pub mod pump;
pub mod server;
pub mod session;


pub use direct::{Direct, DirectConfig};
pub use frame::{CodecError, Frame};
pub use handler::Handler;
pub use server::{listen_and_serve, Server};
pub use session::Session;

/// Error returned by most functions.
///
/// The core of this crate has a dedicated [`CodecError`] for wire-format
/// failures. At the server-lifecycle boundary (binding a listener, dialing
/// upstream), plain `std::io::Error` already carries everything callers
/// need (e.g. `AddrInUse`), so no separate error enum is introduced there.
pub type Error = std::io::Error;

/// A specialized `Result` type for relay operations.
pub type Result<T> = std::result::Result<T, Error>;
