//! HTTP layer for the tracking engine: the pixel, the live view and probes.

pub mod blacklist;
pub mod extractors;
pub mod recorder;
pub mod response;
pub mod routes;
pub mod state;

pub use blacklist::{load_blacklist, BlacklistConfig};
pub use recorder::{RecordKind, RecordOutcome, Recorder};
pub use routes::router;
pub use state::AppState;
