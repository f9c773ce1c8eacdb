//! Subscription registry
//!
//! Owns every connected client and its record-type subscription. The control
//! channel adds clients; the publish scheduler scans them for each frame and
//! removes the ones whose peer went away.
//!
//! # Architecture
//!
//! ```text
//!                    Arc<ClientRegistry>
//!               ┌──────────────────────────┐
//!               │ Mutex<RegistryState {    │
//!               │   clients: Vec<Client>,  │
//!               │   stats: ServerStats,    │
//!               │ }>                       │
//!               └─────┬──────────────┬─────┘
//!                     │              │
//!                     ▼              ▼
//!            [ControlChannel]   [PublishScheduler]
//!            register()         lock() -> scan -> send
//!                                      -> unregister dead ids
//! ```

pub mod client;
pub mod store;

pub use client::{is_disconnect, Client, ClientId};
pub use store::{ClientRegistry, RegistryState, SlotReservation};
