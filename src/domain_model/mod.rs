mod membership;
mod principal;

pub use membership::*;
pub use principal::*;
