mod auth_service_impl;
mod credential_verifier_impl;
mod token_codec_jwt;
mod token_issuer_impl;

pub use auth_service_impl::*;
pub use credential_verifier_impl::*;
pub use token_codec_jwt::*;
pub use token_issuer_impl::*;
