use super::channel::RefreshChannel;
use super::error::*;
use crate::application_port::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Reply, reject};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenResponse {
    pub access_token: AccessToken,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<RefreshToken>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub success: String,
}

fn token_reply(channel: &RefreshChannel, tokens: AuthTokens) -> Response {
    let body = AccessTokenResponse {
        access_token: tokens.access_token,
        refresh_token: channel.in_body().then(|| tokens.refresh_token.clone()),
    };
    let response = warp::reply::json(&body).into_response();
    channel.attach(response, &tokens.refresh_token)
}

pub async fn login(
    body: LoginRequest,
    auth_service: Arc<dyn AuthService>,
    channel: Arc<RefreshChannel>,
) -> Result<Response, warp::Rejection> {
    let login_input = LoginInput {
        email: body.email.unwrap_or_default(),
        password: body.password.unwrap_or_default(),
    };
    let login_result = auth_service
        .login(login_input)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(token_reply(&channel, login_result.tokens))
}

pub async fn logout(
    refresh_token: Option<RefreshToken>,
    auth_service: Arc<dyn AuthService>,
    channel: Arc<RefreshChannel>,
) -> Result<Response, warp::Rejection> {
    auth_service.logout(refresh_token).await;

    let response = warp::reply::with_status(warp::reply(), StatusCode::NO_CONTENT).into_response();
    Ok(channel.clear(response))
}

pub async fn register(
    body: RegisterRequest,
    auth_service: Arc<dyn AuthService>,
) -> Result<Response, warp::Rejection> {
    let register_input = RegisterInput {
        nickname: body.nickname.unwrap_or_default(),
        email: body.email.unwrap_or_default(),
        password: body.password.unwrap_or_default(),
    };
    let nickname = register_input.nickname.trim().to_string();
    auth_service
        .register(register_input)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    let body = RegisterResponse {
        success: format!("New user {} created!", nickname),
    };
    Ok(warp::reply::with_status(warp::reply::json(&body), StatusCode::CREATED).into_response())
}

pub async fn refresh_token(
    refresh_token: Option<RefreshToken>,
    auth_service: Arc<dyn AuthService>,
    channel: Arc<RefreshChannel>,
) -> Result<Response, warp::Rejection> {
    let tokens = auth_service
        .refresh(refresh_token)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(token_reply(&channel, tokens))
}
