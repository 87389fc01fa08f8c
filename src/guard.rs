// request guards run ahead of the blob handlers
use std::collections::HashSet;

use serde::Serialize;

use crate::feature::{FeatureFlags, KV_STORE};
use crate::http::{HttpRequest, HttpResponse};

pub const ACCESS_DENIED: &str = "Access is Denied";

pub trait AccessPolicy: Send + Sync + 'static {
    fn has_api_access(&self, request: &HttpRequest) -> bool;
}

pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn has_api_access(&self, _request: &HttpRequest) -> bool {
        true
    }
}

pub struct TokenPolicy {
    tokens: HashSet<String>,
}

impl TokenPolicy {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TokenPolicy {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }
}

impl AccessPolicy for TokenPolicy {
    fn has_api_access(&self, request: &HttpRequest) -> bool {
        request
            .header("Authorization")
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|token| self.tokens.contains(token.trim()))
            .unwrap_or(false)
    }
}

#[derive(Serialize)]
struct Denied<'a> {
    message: &'a str,
}

pub fn ensure_enabled(flags: &FeatureFlags) -> Result<(), HttpResponse> {
    if flags.is_enabled(KV_STORE) {
        Ok(())
    } else {
        Err(HttpResponse::empty(404))
    }
}

pub fn ensure_api_access<P: AccessPolicy + ?Sized>(
    policy: &P,
    request: &HttpRequest,
) -> Result<(), HttpResponse> {
    if policy.has_api_access(request) {
        Ok(())
    } else {
        log::warn!(
            "api access denied for {} {}",
            request.method,
            request.path()
        );
        Err(HttpResponse::json(
            401,
            &Denied {
                message: ACCESS_DENIED,
            },
        ))
    }
}
