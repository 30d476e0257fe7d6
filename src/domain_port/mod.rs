// store

mod refresh_store;

pub use refresh_store::*;

// repo

mod user_repo;

pub use user_repo::*;
