//! 7K wire protocol
//!
//! Frame headers, the source/outbound codec and the control channel
//! messages. Everything on the wire is little-endian.

pub mod codec;
pub mod constants;
pub mod frame;
pub mod message;
pub mod time;

pub use codec::{decode, encode, Frame, InputMode};
pub use frame::{checksum, DataRecordFrame, NetworkFrame};
pub use message::{ControlRequest, SubscribeAck, SubscribeRequest};
pub use time::SevenKTime;
