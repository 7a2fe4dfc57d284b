mod credential_store_memory;
mod membership_repo_memory;
mod user_repo_memory;

pub use credential_store_memory::*;
pub use membership_repo_memory::*;
pub use user_repo_memory::*;
