pub mod auth;

use crate::server::Server;
use std::sync::Arc;
use warp::Filter;

/// All routes with error recovery and request tracing applied.
pub fn app(
    server: Arc<Server>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = std::convert::Infallible> + Clone {
    auth::routes(server)
        .recover(auth::recover_error)
        .with(warp::trace::request())
}
