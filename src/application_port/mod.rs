mod auth_service;
mod membership_service;

pub use auth_service::*;
pub use membership_service::*;
