// routes, guards and response shapes of the deprecated blob endpoint
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::engine::{BlobEngine, EntryId};
use crate::error::StorageError;
use crate::feature::FeatureFlags;
use crate::guard::{self, AccessPolicy};
use crate::http::{HttpRequest, HttpResponse, Method};
use crate::thread_pool::{self, ThreadPool};

pub const EOL_VERSION: &str = "5.0.0";

#[derive(Debug, Clone, PartialEq)]
enum Route {
    Store,
    GetValue(Option<EntryId>),
}

impl Route {
    fn event(&self) -> &'static str {
        match self {
            Route::Store => "KV.store",
            Route::GetValue(_) => "KV.get_value",
        }
    }

    fn allowed(&self) -> Method {
        match self {
            Route::Store => Method::Post,
            Route::GetValue(_) => Method::Get,
        }
    }
}

#[derive(Serialize)]
struct Stored {
    id: EntryId,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

pub struct KvService<E: BlobEngine, P: ThreadPool> {
    engine: E,
    pool: Arc<P>,
    flags: FeatureFlags,
    access: Box<dyn AccessPolicy>,
    route_base: String,
}

impl<E: BlobEngine, P: ThreadPool> KvService<E, P> {
    pub fn new(engine: E, pool: P, flags: FeatureFlags, access: Box<dyn AccessPolicy>) -> Self {
        KvService {
            engine,
            pool: Arc::new(pool),
            flags,
            access,
            route_base: String::new(),
        }
    }

    pub fn with_route_base(mut self, base: &str) -> Self {
        self.route_base = base.trim_end_matches('/').to_string();
        self
    }

    pub fn flags(&self) -> &FeatureFlags {
        &self.flags
    }

    pub async fn handle(&self, request: &HttpRequest) -> HttpResponse {
        if let Err(response) = guard::ensure_enabled(&self.flags) {
            return response;
        }

        let route = match self.resolve(request) {
            Ok(route) => route,
            Err(response) => return response,
        };

        let started = Instant::now();
        let response = match guard::ensure_api_access(self.access.as_ref(), request) {
            Ok(()) => {
                log::warn!(
                    "{} {} is deprecated and will be removed in version {}",
                    request.method,
                    request.path(),
                    EOL_VERSION
                );
                let response = match &route {
                    Route::Store => self.store(request).await,
                    Route::GetValue(id) => self.get_value(*id).await,
                };
                response.with_header("Deprecation", "true")
            }
            Err(response) => response,
        };

        log::info!(
            "event={} method={} path={} status={} duration_ms={}",
            route.event(),
            request.method,
            request.path(),
            response.status,
            started.elapsed().as_millis()
        );
        response
    }

    fn resolve(&self, request: &HttpRequest) -> Result<Route, HttpResponse> {
        let path = request.path();
        let rest = match path.strip_prefix(self.route_base.as_str()) {
            Some(rest) if rest.starts_with('/') => &rest[1..],
            _ => return Err(HttpResponse::empty(404)),
        };

        let (segment, slashed) = match rest.strip_suffix('/') {
            Some(segment) => (segment, true),
            None => (rest, false),
        };

        let route = if segment == "store" {
            Route::Store
        } else if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
            // ids past i64::MAX were never handed out
            Route::GetValue(segment.parse::<EntryId>().ok())
        } else {
            return Err(HttpResponse::empty(404));
        };

        if !slashed {
            let mut location = format!("{}/", path);
            if let Some((_, query)) = request.target.split_once('?') {
                location = format!("{}?{}", location, query);
            }
            return Err(HttpResponse::empty(308).with_header("Location", location));
        }

        let allowed = route.allowed();
        if request.method != allowed {
            return Err(HttpResponse::empty(405).with_header("Allow", allowed.as_str()));
        }

        Ok(route)
    }

    async fn store(&self, request: &HttpRequest) -> HttpResponse {
        let value = match request.form_field("data") {
            Some(bytes) => String::from_utf8(bytes).map_err(StorageError::from),
            None => Err(StorageError::MissingValue),
        };

        let result = match value {
            Ok(value) => {
                let engine = self.engine.clone();
                self.on_pool(move || engine.put(value)).await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(id) => HttpResponse::json(200, &Stored { id }),
            Err(e) => storage_error_response("store", e),
        }
    }

    async fn get_value(&self, id: Option<EntryId>) -> HttpResponse {
        let id = match id {
            Some(id) => id,
            None => return HttpResponse::empty(404),
        };

        let engine = self.engine.clone();
        match self.on_pool(move || engine.get(id)).await {
            Ok(Some(value)) => HttpResponse::text(200, value),
            Ok(None) => HttpResponse::empty(404),
            Err(e) => storage_error_response("get", e),
        }
    }

    async fn on_pool<F, T>(&self, job: F) -> Result<T, StorageError>
    where
        F: FnOnce() -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        thread_pool::run(self.pool.as_ref(), job)
            .await
            .unwrap_or_else(|e| Err(StorageError::Unavailable(e.to_string())))
    }
}

fn storage_error_response(op: &str, e: StorageError) -> HttpResponse {
    log::error!("{} failed, reason: {}", op, e);
    HttpResponse::json(
        500,
        &ErrorBody {
            error: e.to_string(),
        },
    )
}
