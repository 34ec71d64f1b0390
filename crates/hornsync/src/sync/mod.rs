//! Twin/hardware synchronization.

mod auto_sync;
mod outcome;
mod synchronizer;


pub use outcome::PartialSync;
pub use outcome::Side;
pub use outcome::SyncError;
pub use outcome::SyncIndicator;
pub use outcome::SyncMode;
pub use outcome::SyncOutcome;
pub use outcome::SyncStatus;
pub use synchronizer::Synchronizer;
