mod auth_service;
mod credential;
mod token;

pub use auth_service::*;
pub use credential::*;
pub use token::*;
