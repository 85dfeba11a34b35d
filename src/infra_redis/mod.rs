mod lease_provider_redis;
mod session_store_redis;

pub use lease_provider_redis::*;
pub use session_store_redis::*;
