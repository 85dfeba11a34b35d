mod server;
mod sweeper;

pub use server::*;
pub use sweeper::*;
