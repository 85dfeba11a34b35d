mod clock;
mod lease_provider;
mod session_store;

pub use clock::*;
pub use lease_provider::*;
pub use session_store::*;
