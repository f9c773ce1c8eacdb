//! Replay sources
//!
//! Recorded log files, the playlist that orders them and the lookahead cache
//! the scheduler reads frames through.

pub mod cache;
pub mod file;

pub use cache::{Advance, FrameCache};
pub use file::{Playlist, PlaylistEntry, SourceFile, SourceReader};
