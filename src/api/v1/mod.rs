mod error;
mod guard;
mod handler;
mod router;

pub use error::{ApiError, ApiErrorCode, recover_error};
pub use guard::{authenticate, authorize, bearer_token};
pub use handler::{
    AccountDeletedResponse, ApiResponse, LogoutResponse, ProfileResponse, SessionResponse,
    UpdateProfileRequest,
};
pub use router::routes;
