//! API service routes

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{StatusCode, Uri},
    middleware,
    routing::{MethodRouter, delete, get, post, put},
};
use common::google::Credentials;
use serde::Serialize;
use serde_json::{Value, json};

use crate::{
    error::{ApiError, ApiResult},
    middleware::{BasicAuth, ResponderState, RouteOptions, log_requests, require_basic_auth, respond},
    models::{
        Page, PageQuery,
        tag::{DeleteTagsRequest, Tag, TagRequest},
        user::{CreateUserRequest, UpdateUserRequest, UserProfile},
    },
    services::{Statistic, tag::ALL_TAGS_ROUTE_CACHE_KEY},
    state::AppState,
};

/// Entry of the `/docs` route table
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RouteDoc {
    pub method: &'static str,
    pub path: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<&'static str>,
    pub description: &'static str,
}

const fn doc(method: &'static str, path: &'static str, description: &'static str) -> RouteDoc {
    RouteDoc {
        method,
        path,
        cache: None,
        description,
    }
}

pub const ROUTES: &[RouteDoc] = &[
    doc("GET", "/health", "Service and connection status"),
    doc("GET", "/docs", "This table (basic auth)"),
    doc("POST", "/user", "Register a user"),
    doc("GET", "/user", "List users, paginated"),
    doc("GET", "/user/:id", "User profile"),
    doc("PUT", "/user/:id", "Update a user profile"),
    doc("GET", "/tag", "List tags, paginated, optional keyword"),
    RouteDoc {
        method: "GET",
        path: "/tag/all",
        cache: Some(ALL_TAGS_ROUTE_CACHE_KEY),
        description: "Every tag",
    },
    doc("GET", "/tag/:tag", "Tag by slug"),
    doc("POST", "/tag", "Create a tag"),
    doc("PUT", "/tag/:tag", "Update a tag by id"),
    doc("DELETE", "/tag/:tag", "Delete a tag by id"),
    doc("DELETE", "/tag", "Delete tags listed in {ids}"),
    doc("GET", "/expansion/statistic", "Tag and user counts"),
    doc("GET", "/expansion/google-token", "Google access token (basic auth)"),
];

/// Wrap a method router in the dispatch layer with `options`
fn dispatch(state: &AppState, method_router: MethodRouter<AppState>, options: RouteOptions) -> MethodRouter<AppState> {
    method_router.layer(middleware::from_fn_with_state(
        ResponderState::new(state.cache.clone(), options, state.settings.app.default_cache_ttl),
        respond,
    ))
}

/// Create the router for the API service
pub fn create_router(state: AppState) -> Router {
    let settings = state.settings.clone();
    let auth = BasicAuth::new(&settings.docs.username, &settings.docs.password);
    let basic_auth = || middleware::from_fn_with_state(auth.clone(), require_basic_auth);

    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/user", dispatch(&state, post(create_user), RouteOptions::new().success("User created")))
        .route("/user", dispatch(&state, get(list_users), RouteOptions::new().paginate()))
        .route("/user/:id", dispatch(&state, get(get_user), RouteOptions::new()))
        .route("/user/:id", dispatch(&state, put(update_user), RouteOptions::new().success("User updated")))
        .route("/tag", dispatch(&state, get(list_tags), RouteOptions::new().paginate()))
        .route("/tag", dispatch(&state, post(create_tag), RouteOptions::new().success("Tag created")))
        .route("/tag", dispatch(&state, delete(delete_tags), RouteOptions::new().success("Tags deleted")))
        .route(
            "/tag/all",
            dispatch(&state, get(all_tags), RouteOptions::new().cache(ALL_TAGS_ROUTE_CACHE_KEY)),
        )
        .route("/tag/:tag", dispatch(&state, get(get_tag), RouteOptions::new()))
        .route("/tag/:tag", dispatch(&state, put(update_tag), RouteOptions::new().success("Tag updated")))
        .route("/tag/:tag", dispatch(&state, delete(delete_tag), RouteOptions::new().success("Tag deleted")))
        .route("/expansion/statistic", dispatch(&state, get(statistic), RouteOptions::new()))
        .route(
            "/expansion/google-token",
            dispatch(&state, get(google_token), RouteOptions::new()).layer(basic_auth()),
        );

    if settings.docs.enabled {
        router = router.route("/docs", get(docs).layer(basic_auth()));
    }

    let router = router
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(settings.app.body_limit));

    let router = if settings.app.environment.is_production() {
        router
    } else {
        router.layer(middleware::from_fn(log_requests))
    };

    router.with_state(state)
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let database = state.database.current();
    let cache = state.cache.state();
    let healthy = database.is_ready() && cache.is_ready();
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "service": state.settings.app.name,
            "environment": state.settings.app.environment.as_str(),
            "database": database,
            "cache": cache,
            "status": if healthy { "ok" } else { "degraded" },
        })),
    )
}

/// Route table
pub async fn docs(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "service": state.settings.app.name,
        "routes": ROUTES,
    }))
}

pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("Route {} not found", uri.path()))
}

/// Register a user
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<UserProfile>)> {
    let user = state.users.create_user(payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Page<UserProfile>>> {
    Ok(Json(state.users.list_users(query).await?))
}

pub async fn get_user(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<UserProfile>> {
    Ok(Json(state.users.get_user(id).await?))
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateUserRequest>,
) -> ApiResult<Json<UserProfile>> {
    Ok(Json(state.users.update_user(id, payload).await?))
}

pub async fn list_tags(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Page<Tag>>> {
    Ok(Json(state.tags.list_tags(query).await?))
}

pub async fn all_tags(State(state): State<AppState>) -> ApiResult<Json<Vec<Tag>>> {
    Ok(Json(state.tags.all_tags().await?))
}

pub async fn get_tag(State(state): State<AppState>, Path(slug): Path<String>) -> ApiResult<Json<Tag>> {
    Ok(Json(state.tags.get_tag_by_slug(&slug).await?))
}

pub async fn create_tag(
    State(state): State<AppState>,
    Json(payload): Json<TagRequest>,
) -> ApiResult<(StatusCode, Json<Tag>)> {
    let tag = state.tags.create_tag(payload).await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

pub async fn update_tag(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<TagRequest>,
) -> ApiResult<Json<Tag>> {
    Ok(Json(state.tags.update_tag(id, payload).await?))
}

pub async fn delete_tag(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Value>> {
    state.tags.delete_tag(id).await?;
    Ok(Json(json!({ "deleted": 1 })))
}

/// Delete a batch of tags
pub async fn delete_tags(
    State(state): State<AppState>,
    Json(payload): Json<DeleteTagsRequest>,
) -> ApiResult<Json<Value>> {
    let deleted = state.tags.delete_tags(payload).await?;
    Ok(Json(json!({ "deleted": deleted })))
}

pub async fn statistic(State(state): State<AppState>) -> ApiResult<Json<Statistic>> {
    Ok(Json(state.expansion.statistic().await?))
}

pub async fn google_token(State(state): State<AppState>) -> ApiResult<Json<Credentials>> {
    Ok(Json(state.expansion.google_token().await?))
}
