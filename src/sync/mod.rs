//! Sync orchestration.
//!
//! The puller copies new files off a source, the pusher uploads what each
//! destination is missing, and the streamer does both per file. All of them
//! collect per-file errors into their results instead of aborting.

pub mod exclude;
pub mod layout;
pub mod puller;
pub mod pusher;
pub mod runner;
pub mod streamer;

pub use exclude::ExcludePatterns;
pub use puller::{PullResult, Puller};
pub use pusher::{PushResult, Pusher};
pub use runner::{SyncMode, SyncReport, SyncRunner};
pub use streamer::{StreamOptions, StreamOutcome, StreamResult, Streamer};
