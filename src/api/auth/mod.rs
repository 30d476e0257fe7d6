mod channel;
mod error;
mod handler;
mod router;

pub use channel::*;
pub use error::*;
pub use router::routes;
