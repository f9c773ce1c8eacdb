//! Emulation server
//!
//! Two long-lived tasks share one [`ServerContext`]: the control channel,
//! which accepts connections and registers subscribers, and the publish
//! scheduler, which replays the source files to them.

pub mod config;
pub mod context;
pub mod emulator;
pub mod listener;
pub mod pacing;
pub mod publisher;

pub use config::{FaultInjection, ServerConfig};
pub use context::ServerContext;
pub use emulator::Emu7kServer;
pub use listener::ControlChannel;
pub use pacing::PacingPolicy;
pub use publisher::PublishScheduler;
