mod lease_guard;
mod rotation_arbiter;
mod session_service_impl;
mod token_hasher_hmac;
mod token_issuer_jwt;

pub use lease_guard::*;
pub use rotation_arbiter::*;
pub use session_service_impl::*;
pub use token_hasher_hmac::*;
pub use token_issuer_jwt::*;
