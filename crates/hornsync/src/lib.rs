//! Keeps a car horn's digital twin and its controller in agreement.

pub mod api;
pub mod channel;
pub mod horn;
pub mod logging;
pub mod monitor;
pub mod probe;
pub mod report;
pub mod store;
pub mod sync;

pub use horn::HornState;
pub use horn::HornStatus;
pub use store::StoreError;
pub use store::TwinDocument;
pub use store::TwinStore;
pub use sync::SyncOutcome;
pub use sync::Synchronizer;
