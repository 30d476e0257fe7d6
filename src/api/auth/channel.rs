use crate::application_port::RefreshToken;
use crate::settings;
use anyhow::anyhow;
use serde::Deserialize;
use warp::http::HeaderMap;
use warp::http::header::{COOKIE, HeaderName, HeaderValue, SET_COOKIE};
use warp::reply::Response;

pub const REFRESH_HEADER: &str = "x-refresh-token";

#[derive(Debug, Clone)]
pub struct CookieConfig {
    pub name: String,
    pub path: String,
    pub secure: bool,
    pub max_age_secs: u64,
}

/// Where the refresh token travels between client and server.
#[derive(Debug, Clone)]
pub enum RefreshChannel {
    /// HTTP-only cookie scoped to `path`.
    Cookie(CookieConfig),
    /// `x-refresh-token` header in both directions.
    Header,
    /// `refreshToken` field in the JSON bodies.
    Body,
}

#[derive(Deserialize)]
struct RefreshBody {
    #[serde(rename = "refreshToken")]
    refresh_token: Option<String>,
}

impl RefreshChannel {
    pub fn from_settings(refresh: &settings::Refresh) -> anyhow::Result<Self> {
        match refresh.channel.as_str() {
            "cookie" => Ok(RefreshChannel::Cookie(CookieConfig {
                name: refresh.cookie_name.clone(),
                path: refresh.cookie_path.clone(),
                secure: refresh.cookie_secure,
                max_age_secs: refresh.ttl_secs,
            })),
            "header" => Ok(RefreshChannel::Header),
            "body" => Ok(RefreshChannel::Body),
            other => Err(anyhow!("Unknown refresh channel: {}", other)),
        }
    }

    pub fn in_body(&self) -> bool {
        matches!(self, RefreshChannel::Body)
    }

    /// Reads the token from the request headers. Values that are not valid
    /// header text count as no token at all.
    pub fn from_headers(&self, headers: &HeaderMap) -> Option<RefreshToken> {
        let raw = match self {
            RefreshChannel::Cookie(cfg) => headers
                .get_all(COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .find_map(|h| find_cookie(h, &cfg.name)),
            RefreshChannel::Header => headers
                .get(REFRESH_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            RefreshChannel::Body => None,
        };
        raw.and_then(non_empty)
    }

    /// Reads `{"refreshToken": ...}` from a request body.
    pub fn from_body(&self, body: &[u8]) -> Option<RefreshToken> {
        if !self.in_body() {
            return None;
        }
        serde_json::from_slice::<RefreshBody>(body)
            .ok()
            .and_then(|b| b.refresh_token)
            .and_then(non_empty)
    }

    /// Hands a new token to the client. The body channel is filled in by the
    /// handler instead.
    pub fn attach(&self, mut response: Response, token: &RefreshToken) -> Response {
        match self {
            RefreshChannel::Cookie(cfg) => {
                let cookie = cfg.set_cookie(&token.0, cfg.max_age_secs);
                insert_header(&mut response, SET_COOKIE, &cookie);
            }
            RefreshChannel::Header => {
                let name = HeaderName::from_static(REFRESH_HEADER);
                insert_header(&mut response, name, &token.0);
            }
            RefreshChannel::Body => {}
        }
        response
    }

    /// Tells the client to forget its token.
    pub fn clear(&self, mut response: Response) -> Response {
        if let RefreshChannel::Cookie(cfg) = self {
            let cookie = cfg.set_cookie("", 0);
            insert_header(&mut response, SET_COOKIE, &cookie);
        }
        response
    }
}

impl CookieConfig {
    fn set_cookie(&self, value: &str, max_age_secs: u64) -> String {
        let mut cookie = format!(
            "{}={}; HttpOnly; SameSite=Strict; Path={}; Max-Age={}",
            self.name, value, self.path, max_age_secs
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

fn non_empty(raw: String) -> Option<RefreshToken> {
    let raw = raw.trim();
    (!raw.is_empty()).then(|| RefreshToken(raw.to_string()))
}

fn find_cookie(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        (k == name).then(|| v.to_string())
    })
}

fn insert_header(response: &mut Response, name: HeaderName, value: &str) {
    // Tokens and cookie attributes are ASCII; anything else is dropped.
    if let Ok(value) = HeaderValue::from_str(value) {
        response.headers_mut().append(name, value);
    }
}
