#![allow(dead_code)]

use gatehouse::settings::*;
use serde_json::{Value, json};
use warp::http::Response;
use warp::hyper::body::Bytes;

pub fn settings(channel: &str, reuse_policy: &str) -> Settings {
    Settings {
        http: Http {
            address: "127.0.0.1:0".to_string(),
            cert_path: None,
            key_path: None,
        },
        log: Log {
            filter: "warn".to_string(),
        },
        auth: Auth {
            issuer: "gatehouse.test".to_string(),
            audience: "web-client".to_string(),
            access_ttl_secs: 900,
            signing_key: "integration-signing-key".to_string(),
            argon2_memory_kib: 64,
            argon2_iterations: 1,
            argon2_parallelism: 1,
        },
        refresh: Refresh {
            ttl_secs: 3600,
            digest_key: "integration-digest-key".to_string(),
            reuse_policy: reuse_policy.to_string(),
            channel: channel.to_string(),
            cookie_name: "refresh_token".to_string(),
            cookie_path: "/api/auth".to_string(),
            cookie_secure: true,
        },
        store: Store {
            backend: "memory".to_string(),
            redis_url: None,
            prefix: "test".to_string(),
            sweep_interval_secs: 60,
        },
        user: User {
            backend: "memory".to_string(),
            mysql_url: None,
        },
    }
}

pub fn body_json(res: &Response<Bytes>) -> Value {
    serde_json::from_slice(res.body()).expect("response body should be JSON")
}

pub fn register_body(nickname: &str, email: &str, password: &str) -> Value {
    json!({ "nickname": nickname, "email": email, "password": password })
}

pub fn login_body(email: &str, password: &str) -> Value {
    json!({ "email": email, "password": password })
}

/// Value of the refresh cookie set by a response, if any.
pub fn refresh_cookie(res: &Response<Bytes>) -> Option<String> {
    res.headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|c| c.strip_prefix("refresh_token="))
        .map(|rest| rest.split(';').next().unwrap_or_default().to_string())
}
