mod auth_service_impl;
mod membership_service_impl;
pub(crate) mod token_codec_jwt;
mod token_issuer;

pub use auth_service_impl::*;
pub use membership_service_impl::*;
pub use token_codec_jwt::*;
pub use token_issuer::*;
