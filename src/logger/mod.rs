//! Process-wide `tracing` setup. The rest of the crate logs through the macros
//! re-exported here.

mod logger;
pub use logger::*;

pub use tracing::{debug, error, info, trace, warn};
