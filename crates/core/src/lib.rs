//! Core types, session codec, referrer classification and rollups for the
//! tracking engine.

pub mod compendium;
pub mod error;
pub mod events;
pub mod limits;
pub mod referrer;
pub mod retention;
pub mod rollup;
pub mod session;
pub mod window;

pub use compendium::{Compendium, SessionFilter, SessionGroup};
pub use error::{Error, Result, StoreKind};
pub use events::*;
pub use referrer::Blacklist;
pub use retention::RetentionPolicy;
pub use session::{SessionCodec, SessionToken};
pub use window::MonthWindow;
