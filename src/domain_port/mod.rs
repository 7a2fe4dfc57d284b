// store

mod credential_store;

pub use credential_store::*;

// repo

mod membership_repo;
mod user_repo;

pub use membership_repo::*;
pub use user_repo::*;
