//! Client side of the session lifecycle.
//!
//! [`SessionClient`] owns the credential pair, [`RefreshCoordinator`] sits in
//! front of every authenticated request and [`OptimisticCache`] applies
//! favorites/watchlist toggles locally before the server confirms them.

mod api;
mod cache;
mod coordinator;
mod error;
mod session;
mod transport;

pub use api::*;
pub use cache::*;
pub use coordinator::*;
pub use error::*;
pub use session::*;
pub use transport::*;
