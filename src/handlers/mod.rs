//! Facade gateway: the HTTP entry point.
//!
//! One generic handler drives every registered route through the same
//! pipeline: resolve -> bind parameters -> authorize -> render request
//! template -> plan -> execute store -> bind result -> render response.
//! The share route reuses the pipeline with its `id` bound from the path.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::config;
use crate::error::ApiError;
use crate::govern::AccessGovernor;
use crate::plan::{self, OperationKind};
use crate::registry::{ParamSource, Registry, RouteDefinition};
use crate::store::{StoreClient, StoreOutput};
use crate::template::TemplateContext;

const API_KEY_HEADER: &str = "x-api-key";
const HTML_CONTENT_TYPE: &str = "text/html";

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub governor: Arc<AccessGovernor>,
    pub store: Arc<dyn StoreClient>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root).fallback(method_fallback))
        .route("/health", get(health).fallback(method_fallback))
        .route("/share/:id", get(share_get).fallback(method_fallback))
        .route("/:route", get(route_get).fallback(method_fallback))
        .with_state(state)
}

/// Non-GET methods get the same JSON error body as every other failure.
async fn method_fallback() -> ApiError {
    ApiError::method_not_allowed("Only GET requests are supported")
}

/// GET /:route - the generic facade pipeline, parameters from the query string
async fn route_get(
    State(state): State<AppState>,
    Path(route): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    run_route(&state, &route, &HashMap::new(), &query, &headers).await
}

/// GET /share/:id - the unfurl route, `id` bound from the path
async fn share_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let mut path_params = HashMap::new();
    path_params.insert("id".to_string(), id);
    run_route(&state, "share", &path_params, &query, &headers).await
}

async fn run_route(
    state: &AppState,
    name: &str,
    path_params: &HashMap<String, String>,
    query_params: &HashMap<String, String>,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    let route = state
        .registry
        .resolve(name)
        .ok_or_else(|| ApiError::not_found(format!("Unknown route '{}'", name)))?;

    let mut ctx = bind_parameters(route, path_params, query_params)?;

    let credential = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    state.governor.authorize(credential, route.requires_credential)?;

    // Request side: user parameters only.
    let rendered = route.request_template.render(&ctx)?;
    let op = plan::plan(&rendered)?;

    let timeout = Duration::from_millis(config::config().store.timeout_ms);
    let output = match tokio::time::timeout(timeout, state.store.execute(&op)).await {
        Err(_) => return Err(ApiError::gateway_timeout("Store call timed out")),
        Ok(result) => result?,
    };

    // A point lookup with no match is 404; empty ranges and batches are 200.
    if op.kind == OperationKind::PointGet && output == StoreOutput::Item(None) {
        return Err(ApiError::not_found("Item not found"));
    }

    let native = output.to_json();
    let mut response = match route.response_templates.get(HTML_CONTENT_TYPE) {
        None => Json(native).into_response(),
        Some(template) => {
            // Response side: user parameters plus the native result bindings.
            if let Value::Object(fields) = native {
                for (name, value) in fields {
                    ctx.insert(name, value);
                }
            }
            let body = template.render(&ctx).map_err(|e| {
                tracing::error!("store result did not match response template: {}", e);
                ApiError::bad_gateway("Store returned an unexpected result shape")
            })?;
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, HeaderValue::from_static(HTML_CONTENT_TYPE))],
                body,
            )
                .into_response()
        }
    };

    if route.requires_credential {
        if let Some(origin) =
            allowed_origin_header(&config::config().security.cors_origins, headers)
        {
            response
                .headers_mut()
                .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        }
    }
    Ok(response)
}

fn bind_parameters(
    route: &RouteDefinition,
    path_params: &HashMap<String, String>,
    query_params: &HashMap<String, String>,
) -> Result<TemplateContext, ApiError> {
    let mut ctx = TemplateContext::new();
    for spec in &route.parameters {
        let supplied = match spec.source {
            ParamSource::Path => path_params.get(&spec.name),
            ParamSource::Query => query_params.get(&spec.name),
        };
        match (supplied, &spec.default) {
            // A fixed default is pinned: a caller-supplied value never
            // overrides it.
            (_, Some(default)) => ctx.insert_str(&spec.name, default.clone()),
            (Some(value), None) => ctx.insert_str(&spec.name, value.clone()),
            (None, None) if spec.required => {
                return Err(ApiError::bad_request(format!(
                    "Missing required parameter '{}'",
                    spec.name
                )))
            }
            (None, None) => {}
        }
    }
    Ok(ctx)
}

/// Echo the request's `Origin` back when it is one of the configured
/// origins; a request from anywhere else gets no allow-origin header.
fn allowed_origin_header(origins: &[String], headers: &HeaderMap) -> Option<HeaderValue> {
    let origin = headers.get(header::ORIGIN)?.to_str().ok()?;
    if origins.iter().any(|allowed| allowed == origin) {
        HeaderValue::from_str(origin).ok()
    } else {
        None
    }
}

async fn root(State(state): State<AppState>) -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "success": true,
        "data": {
            "name": "Texts Facade",
            "version": version,
            "description": "Read-only HTTP facade over a composite-key KV store",
            "routes": state.registry.route_names(),
        }
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "data": {
                "status": "ok",
                "timestamp": now,
                "routes": state.registry.route_names().len(),
            }
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan;
    use crate::unfurl;

    #[test]
    fn share_query_cannot_override_pinned_lookup_parameters() {
        let route = unfurl::share_route("texts").unwrap();
        let mut path_params = HashMap::new();
        path_params.insert("id".to_string(), "001-001-001".to_string());
        let mut query_params = HashMap::new();
        query_params.insert("language".to_string(), "fr".to_string());
        query_params.insert("translation".to_string(), "sg21".to_string());
        query_params.insert("document".to_string(), "concordance".to_string());

        let ctx = bind_parameters(&route, &path_params, &query_params).unwrap();
        let op = plan::plan(&route.request_template.render(&ctx).unwrap()).unwrap();
        assert_eq!(op.partition, "bible|en|webp");
        assert_eq!(
            op.predicate,
            plan::KeyPredicate::ExactSort("001-001-001".into())
        );
    }

    #[test]
    fn optional_parameters_still_accept_supplied_values() {
        let route = crate::routes::builtin_routes("texts")
            .unwrap()
            .into_iter()
            .find(|r| r.name == "verses")
            .unwrap();
        let mut query_params = HashMap::new();
        for (k, v) in [
            ("document", "bible"),
            ("language", "en"),
            ("translation", "webp"),
            ("prefix", "001-"),
            ("after", "001-001-010"),
        ] {
            query_params.insert(k.to_string(), v.to_string());
        }
        let ctx = bind_parameters(&route, &HashMap::new(), &query_params).unwrap();
        assert_eq!(ctx.get("after"), Some(&serde_json::json!("001-001-010")));
    }

    #[test]
    fn origin_is_echoed_only_when_configured() {
        let origins = vec![
            "https://scrollbible.app".to_string(),
            "http://localhost:5173".to_string(),
        ];

        let mut headers = HeaderMap::new();
        headers.insert(header::ORIGIN, HeaderValue::from_static("http://localhost:5173"));
        assert_eq!(
            allowed_origin_header(&origins, &headers),
            Some(HeaderValue::from_static("http://localhost:5173"))
        );

        headers.insert(header::ORIGIN, HeaderValue::from_static("https://evil.example"));
        assert_eq!(allowed_origin_header(&origins, &headers), None);

        assert_eq!(allowed_origin_header(&origins, &HeaderMap::new()), None);
    }
}
