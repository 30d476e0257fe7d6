use super::channel::RefreshChannel;
use super::handler;
use crate::application_port::RefreshToken;
use crate::server::*;
use std::convert::Infallible;
use std::sync::Arc;
use warp::Filter;
use warp::filters::BoxedFilter;
use warp::http::HeaderMap;
use warp::hyper::body::Bytes;

/// Request bodies are a handful of short strings.
const MAX_BODY_BYTES: u64 = 16 * 1024;

/// `/api/auth/{login,logout,register,refreshToken}`.
pub fn routes(
    server: Arc<Server>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let auth = warp::path("api").and(warp::path("auth"));

    let login = auth
        .clone()
        .and(warp::path("login"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with(server.auth_service.clone()))
        .and(with(server.refresh_channel.clone()))
        .and_then(handler::login);

    let logout = auth
        .clone()
        .and(warp::path("logout"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_refresh_token(server.refresh_channel.clone()))
        .and(with(server.auth_service.clone()))
        .and(with(server.refresh_channel.clone()))
        .and_then(handler::logout);

    let register = auth
        .clone()
        .and(warp::path("register"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with(server.auth_service.clone()))
        .and_then(handler::register);

    let refresh_token = auth
        .clone()
        .and(warp::path("refreshToken"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_refresh_token(server.refresh_channel.clone()))
        .and(with(server.auth_service.clone()))
        .and(with(server.refresh_channel.clone()))
        .and_then(handler::refresh_token);

    login.or(logout).or(register).or(refresh_token)
}

fn with<ServiceType>(
    service: Arc<ServiceType>,
) -> impl Filter<Extract = (Arc<ServiceType>,), Error = Infallible> + Clone
where
    ServiceType: Send + Sync + ?Sized,
{
    warp::any().map(move || service.clone())
}

/// Never rejects: a token that cannot be read is treated as absent, so
/// logout always succeeds and refresh answers 401.
fn with_refresh_token(channel: Arc<RefreshChannel>) -> BoxedFilter<(Option<RefreshToken>,)> {
    if channel.in_body() {
        warp::body::content_length_limit(MAX_BODY_BYTES)
            .and(warp::body::bytes())
            .or(warp::any().map(Bytes::new))
            .unify()
            .map(move |body: Bytes| channel.from_body(&body))
            .boxed()
    } else {
        warp::header::headers_cloned()
            .map(move |headers: HeaderMap| channel.from_headers(&headers))
            .boxed()
    }
}
