mod error;
mod handler;
mod router;

pub use error::{ApiErrorCode, recover_error};
pub use router::{SERVICE_KEY_HEADER, routes};
