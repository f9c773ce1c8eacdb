//! 7K Center emulator
//!
//! Replays recorded 7K sonar record logs over TCP. Clients subscribe to a
//! set of record types and receive matching records at the recorded
//! cadence, each wrapped in a network frame.
//!
//! # Example
//!
//! ```no_run
//! use emu7k::{Emu7kServer, ServerConfig};
//!
//! # async fn run() -> emu7k::Result<()> {
//! let config = ServerConfig::default()
//!     .source("survey-0001.s7k")
//!     .restart(true);
//! let server = Emu7kServer::new(config)?;
//! server.run_until(async {
//!     let _ = tokio::signal::ctrl_c().await;
//! }).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod source;
pub mod stats;

pub use error::{Error, Result};
pub use protocol::InputMode;
pub use server::{Emu7kServer, FaultInjection, ServerConfig};
pub use stats::ServerStats;
