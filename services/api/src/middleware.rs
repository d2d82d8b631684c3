//! Route dispatch middleware
//!
//! Every transformed route is wrapped by [`respond`], which reads the route's
//! [`RouteOptions`] to serve cached GET results, wrap handler output in the
//! success envelope and apply error overrides. Raw routes skip all of it.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json,
    body::{Body, to_bytes},
    extract::{RawPathParams, Request, State},
    http::{Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Basic},
};
use common::cache::CacheService;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::error::{ApiError, ErrorEnvelope};

pub const DEFAULT_SUCCESS_TEXT: &str = "Request succeeded";

/// Upper bound when buffering a handler body for the envelope
const BODY_BUFFER_LIMIT: usize = 16 * 1024 * 1024;

/// Per-route behaviour of the dispatch layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteOptions {
    pub cache_key: Option<String>,
    /// Seconds; the configured default TTL applies when unset
    pub cache_ttl: Option<u64>,
    pub success_message: Option<String>,
    pub error_message: Option<String>,
    pub error_code: Option<StatusCode>,
    pub paginate: bool,
    /// When false the handler response is passed through untouched
    pub transform: bool,
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self {
            cache_key: None,
            cache_ttl: None,
            success_message: None,
            error_message: None,
            error_code: None,
            paginate: false,
            transform: true,
        }
    }
}

impl RouteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw() -> Self {
        Self {
            transform: false,
            ..Self::default()
        }
    }

    pub fn cache(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn ttl(mut self, seconds: u64) -> Self {
        self.cache_ttl = Some(seconds);
        self
    }

    pub fn success(mut self, message: impl Into<String>) -> Self {
        self.success_message = Some(message.into());
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn error_code(mut self, code: StatusCode) -> Self {
        self.error_code = Some(code);
        self
    }

    pub fn paginate(mut self) -> Self {
        self.paginate = true;
        self
    }
}

/// State handed to [`respond`] for one route
#[derive(Clone)]
pub struct ResponderState {
    cache: CacheService,
    options: Arc<RouteOptions>,
    default_ttl: u64,
}

impl ResponderState {
    pub fn new(cache: CacheService, options: RouteOptions, default_ttl: u64) -> Self {
        Self {
            cache,
            options: Arc::new(options),
            default_ttl,
        }
    }
}

/// Request echo included in every success envelope
#[derive(Debug, Clone, Serialize)]
pub struct RequestParams {
    pub url: String,
    pub method: String,
    pub routes: Map<String, Value>,
}

/// Body of every transformed success response
#[derive(Debug, Serialize)]
pub struct SuccessEnvelope {
    pub status: &'static str,
    pub message: String,
    pub params: RequestParams,
    pub result: Value,
}

/// Dispatch layer applied to each route
pub async fn respond(
    State(state): State<ResponderState>,
    path_params: Option<RawPathParams>,
    request: Request,
    next: Next,
) -> Response {
    let options = Arc::clone(&state.options);
    if !options.transform {
        return next.run(request).await;
    }

    let is_get = *request.method() == Method::GET;
    let params = RequestParams {
        url: request.uri().to_string(),
        method: request.method().to_string(),
        routes: path_params
            .map(|p| {
                p.iter()
                    .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
                    .collect()
            })
            .unwrap_or_default(),
    };

    let cache_key = options.cache_key.as_deref().filter(|_| is_get);
    if let Some(key) = cache_key {
        match state.cache.get::<Value>(key).await {
            Ok(Some(result)) => {
                debug!("[Route] cache hit for {}", key);
                return success(&options, params, StatusCode::OK, result);
            }
            Ok(None) => {}
            Err(e) => warn!("[Route] cache lookup for {} failed: {}", key, e),
        }
    }

    let response = next.run(request).await;
    if !response.status().is_success() {
        return render_error(&options, response).await;
    }

    let (parts, body) = response.into_parts();
    let result = match read_json(body).await {
        Ok(result) => result,
        Err(e) => return ApiError::Internal(e).into_response(),
    };

    if let Some(key) = cache_key {
        let ttl = options.cache_ttl.unwrap_or(state.default_ttl);
        if let Err(e) = state.cache.set(key, &result, Some(ttl)).await {
            warn!("[Route] failed to cache {}: {}", key, e);
        }
    }

    success(&options, params, parts.status, result)
}

fn success(options: &RouteOptions, params: RequestParams, status: StatusCode, result: Value) -> Response {
    let result = if options.paginate { paginate(result) } else { result };
    let envelope = SuccessEnvelope {
        status: "success",
        message: options
            .success_message
            .clone()
            .unwrap_or_else(|| DEFAULT_SUCCESS_TEXT.to_string()),
        params,
        result,
    };
    (status, Json(envelope)).into_response()
}

/// Reshape a page `{documents, total, page, per_page, total_page}` into
/// `{data, pagination}`; anything else is returned as is
pub fn paginate(result: Value) -> Value {
    match result {
        Value::Object(mut page) if page.contains_key("documents") => {
            let data = page.remove("documents").unwrap_or_default();
            let field = |name: &str| page.get(name).cloned().unwrap_or(Value::Null);
            json!({
                "data": data,
                "pagination": {
                    "total": field("total"),
                    "current_page": field("page"),
                    "per_page": field("per_page"),
                    "total_page": field("total_page"),
                },
            })
        }
        other => other,
    }
}

async fn read_json(body: Body) -> anyhow::Result<Value> {
    let bytes = to_bytes(body, BODY_BUFFER_LIMIT).await?;
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned())))
}

/// Turn an error response into the envelope with the route's overrides.
/// Responses not produced by [`ApiError`] (extractor rejections, body limit)
/// carry their plain-text reason as `error`.
async fn render_error(options: &RouteOptions, response: Response) -> Response {
    let (parts, body) = response.into_parts();
    let envelope = match parts.extensions.get::<ErrorEnvelope>() {
        Some(envelope) => envelope.clone(),
        None => {
            let reason = to_bytes(body, BODY_BUFFER_LIMIT)
                .await
                .map(|bytes| String::from_utf8_lossy(&bytes).trim().to_string())
                .ok()
                .filter(|reason| !reason.is_empty());
            ErrorEnvelope::new(parts.status, reason)
        }
    };

    let mut rendered = envelope
        .with_overrides(options.error_message.as_deref(), options.error_code)
        .into_response();
    for (name, value) in parts.headers.iter() {
        if name != header::CONTENT_TYPE && name != header::CONTENT_LENGTH {
            rendered.headers_mut().append(name.clone(), value.clone());
        }
    }
    rendered
}

/// Development request log
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    info!("+++ req: {} -> {}", method, uri);

    let started = Instant::now();
    let response = next.run(request).await;
    info!("--- res: {} -> {} {}ms", method, uri, started.elapsed().as_millis());
    response
}

/// Credentials accepted by [`require_basic_auth`]
#[derive(Clone)]
pub struct BasicAuth {
    username: Arc<str>,
    password: Arc<str>,
}

impl BasicAuth {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: Arc::from(username),
            password: Arc::from(password),
        }
    }

    fn accepts(&self, credentials: &Basic) -> bool {
        credentials.username() == &*self.username && credentials.password() == &*self.password
    }
}

/// HTTP basic authentication middleware
pub async fn require_basic_auth(
    State(auth): State<BasicAuth>,
    credentials: Option<TypedHeader<Authorization<Basic>>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    match credentials {
        Some(TypedHeader(Authorization(basic))) if auth.accepts(&basic) => Ok(next.run(request).await),
        _ => Err(ApiError::Unauthorized),
    }
}
