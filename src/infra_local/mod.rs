//! In-process adapters: single-instance deployments and tests.

mod clock;
mod lease_provider_local;
mod session_store_memory;

pub use clock::*;
pub use lease_provider_local::*;
pub use session_store_memory::*;
