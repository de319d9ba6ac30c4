//! Password login for consoles bound to a non-loopback address.
//!
//! A successful login sets a signed `mcc_session` cookie; every `/api`
//! request other than health and login must carry it.

use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, Key, SameSite, SignedCookieJar};
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;

pub const SESSION_COOKIE: &str = "mcc_session";
const SESSION_VALUE: &str = "ok";
const SESSION_HOURS: i64 = 8;

/// Paths reachable without a session.
pub const OPEN_PATHS: [&str; 2] = ["/api/health", "/api/auth/login"];

pub struct SessionAuth {
    password: String,
    key: Key,
}

impl SessionAuth {
    /// `secret` may be any length; the signing key is derived from it.
    pub fn new(password: impl Into<String>, secret: &str) -> Self {
        let digest = Sha512::digest(secret.as_bytes());
        Self {
            password: password.into(),
            key: Key::from(digest.as_slice()),
        }
    }

    pub fn password_matches(&self, candidate: &str) -> bool {
        !candidate.is_empty() && bool::from(candidate.as_bytes().ct_eq(self.password.as_bytes()))
    }

    /// A jar holding a fresh session cookie.
    pub fn issue(&self) -> SignedCookieJar {
        let cookie = Cookie::build((SESSION_COOKIE, SESSION_VALUE))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(false)
            .max_age(time::Duration::hours(SESSION_HOURS));
        SignedCookieJar::new(self.key.clone()).add(cookie)
    }

    /// Whether the request carries a session cookie signed with our key.
    pub fn has_session(&self, headers: &HeaderMap) -> bool {
        SignedCookieJar::from_headers(headers, self.key.clone())
            .get(SESSION_COOKIE)
            .is_some_and(|c| c.value() == SESSION_VALUE)
    }
}

impl std::fmt::Debug for SessionAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionAuth").finish_non_exhaustive()
    }
}
