//! HTTP bridge the host calls into

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::enrichment::Enricher;
use crate::error::{EntityError, Error};
use crate::gateway::GatewayError;
use crate::models::{
    Entity, LookupResult, MessagePayload, MessageResponse, OptionError, Options, validate_options,
};

/// Application state shared across handlers
pub struct AppState {
    pub enricher: Arc<Enricher>,
    pub metrics: Option<PrometheusHandle>,
}

#[derive(Debug, Deserialize)]
pub struct LookupRequest {
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub options: Options,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub payload: MessagePayload,
    #[serde(default)]
    pub options: Options,
}

type ApiError = (StatusCode, Json<Value>);

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/lookup", post(lookup))
        .route("/api/v1/message", post(message))
        .route("/api/v1/options/validate", post(validate))
        .route("/metrics", get(render_metrics))
        .with_state(state)
}

// ==================== Handlers ====================

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "ptintel",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn lookup(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LookupRequest>,
) -> Result<Json<Vec<LookupResult>>, ApiError> {
    state
        .enricher
        .do_lookup(&req.entities, &req.options)
        .await
        .map(Json)
        .map_err(error_response)
}

async fn message(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MessageRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .enricher
        .on_message(&req.payload, &req.options)
        .await
        .map(Json)
        .map_err(error_response)
}

async fn validate(Json(user_options): Json<Map<String, Value>>) -> Json<Vec<OptionError>> {
    let errors = validate_options(&user_options);
    if !errors.is_empty() {
        tracing::debug!(errors = errors.len(), "Rejected integration options");
    }
    Json(errors)
}

async fn render_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed".to_string()),
    }
}

// ==================== Errors ====================

fn error_response(error: Error) -> ApiError {
    match error {
        Error::Batch(errors) => {
            tracing::error!(failed = errors.len(), "Lookup batch failed");
            let errors: Vec<Value> = errors.iter().map(entity_error).collect();
            (StatusCode::BAD_GATEWAY, Json(json!({ "errors": errors })))
        }
        Error::Gateway(GatewayError::Unauthorized) => (
            StatusCode::UNAUTHORIZED,
            Json(gateway_error(&GatewayError::Unauthorized)),
        ),
        Error::Gateway(error) => (StatusCode::BAD_GATEWAY, Json(gateway_error(&error))),
        Error::InvalidRegex { .. }
        | Error::MissingEntity(_)
        | Error::InvalidPayload(_)
        | Error::DatasourceDisabled(_) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "detail": "Invalid request", "message": error.to_string() })),
        ),
        Error::ClientConfig(_) => {
            tracing::error!(error = %error, "HTTP client misconfigured");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "detail": "Integration misconfigured", "message": error.to_string() })),
            )
        }
    }
}

fn gateway_error(error: &GatewayError) -> Value {
    let mut value = json!({
        "detail": error.detail(),
        "message": error.to_string(),
    });
    if let Some(status) = error.status_code() {
        value["statusCode"] = json!(status);
    }
    if let Some(body) = error.body() {
        value["body"] = body.clone();
    }
    value
}

fn entity_error(error: &EntityError) -> Value {
    let mut value = gateway_error(&error.error);
    value["entity"] = json!(error.entity);
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::enrichment::test_support::mock_api;
    use crate::gateway::{MockVendorApi, classify_response};

    fn app(api: MockVendorApi) -> Router {
        create_router(Arc::new(AppState {
            enricher: Arc::new(Enricher::new(Arc::new(api))),
            metrics: None,
        }))
    }

    async fn call(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn lookup_body(entity: Value) -> Value {
        json!({
            "entities": [entity],
            "options": { "user": "test", "apiKey": "12345" }
        })
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = call(app(MockVendorApi::new()), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("healthy"));
    }

    #[tokio::test]
    async fn test_lookup_gateway_timeout_is_volatile() {
        let api = mock_api(|_| classify_response(502, ""));
        let (status, body) = call(
            app(api),
            "POST",
            "/api/v1/lookup",
            Some(lookup_body(json!({ "type": "IPv4", "value": "8.8.8.8", "isPrivateIP": false }))),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["isVolatile"], json!(true));
        assert_eq!(body[0]["data"]["details"]["summary"]["isGatewayTimeout"], json!(true));
    }

    #[tokio::test]
    async fn test_lookup_batch_error() {
        let api = mock_api(|_| classify_response(403, r#"{"message": "forbidden"}"#));
        let (status, body) = call(
            app(api),
            "POST",
            "/api/v1/lookup",
            Some(lookup_body(json!({ "type": "domain", "value": "example.com" }))),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let errors = body["errors"].as_array().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["statusCode"], json!(403));
        assert_eq!(errors[0]["entity"]["value"], json!("example.com"));
        assert_eq!(errors[0]["body"]["message"], json!("forbidden"));
    }

    #[tokio::test]
    async fn test_message_unauthorized() {
        let api = mock_api(|_| classify_response(401, ""));
        let (status, body) = call(
            app(api),
            "POST",
            "/api/v1/message",
            Some(json!({
                "payload": { "searchType": "whois", "entity": { "type": "domain", "value": "example.com" } },
                "options": { "user": "test", "apiKey": "bad" }
            })),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["statusCode"], json!(401));
    }

    #[tokio::test]
    async fn test_message_missing_entity() {
        let mut api = MockVendorApi::new();
        api.expect_get().never();
        let (status, _) = call(
            app(api),
            "POST",
            "/api/v1/message",
            Some(json!({ "payload": { "searchType": "pdns" } })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_validate_options() {
        let (status, body) = call(
            app(MockVendorApi::new()),
            "POST",
            "/api/v1/options/validate",
            Some(json!({ "apiKey": { "value": "" }, "user": { "value": "test" } })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!([{ "key": "apiKey", "message": "You must provide a PassiveTotal API key" }])
        );
    }

    #[tokio::test]
    async fn test_metrics_without_recorder() {
        let (status, _) = call(app(MockVendorApi::new()), "GET", "/metrics", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
