//! Web layer: axum router serving the form page, the predict action and a
//! JSON estimate endpoint.
//!
//! The estimation pipeline is synchronous (blocking HTTP to Sheets, CPU-bound
//! inference), so every request runs it on the blocking pool.

pub mod auth;
pub mod page;

use std::net::SocketAddr;

use axum::{
    extract::{
        rejection::{FormRejection, JsonRejection},
        Form, Json, State,
    },
    http::StatusCode,
    middleware,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::application::{HandlerFailure, HandlerOutcome, PredictAction, PredictHandler};
use crate::ports::{ReferenceSource, UsageModel};
use crate::DemandError;
use auth::Credentials;

/// Shared state for all routes.
pub struct AppState<M, R>
where
    M: UsageModel,
    R: ReferenceSource,
{
    pub handler: PredictHandler<M, R>,
    pub credentials: Credentials,
}

impl<M, R> Clone for AppState<M, R>
where
    M: UsageModel,
    R: ReferenceSource,
{
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            credentials: self.credentials.clone(),
        }
    }
}

/// Body of `POST /api/estimate`.
#[derive(Debug, Deserialize)]
pub struct EstimateRequest {
    pub language: String,
    pub area: String,
    pub industry: String,
    pub employee_count: i64,
}

/// HTTP status for a per-request error.
#[must_use]
pub fn status_for(err: &DemandError) -> StatusCode {
    match err {
        DemandError::Validation(_) | DemandError::Encoding(_) | DemandError::Lookup(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        DemandError::RemoteFetch(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_json(status: StatusCode, kind: &str, message: String) -> Response {
    (status, Json(json!({ "error": kind, "message": message }))).into_response()
}

/// Build the application router.
pub fn router<M, R>(state: AppState<M, R>) -> Router
where
    M: UsageModel + 'static,
    R: ReferenceSource + 'static,
{
    let protected = Router::new()
        .route("/", get(index))
        .route("/predict", post(predict::<M, R>))
        .route("/api/estimate", post(api_estimate::<M, R>))
        .route_layer(middleware::from_fn_with_state(
            state.credentials.clone(),
            auth::require_basic_auth,
        ));

    Router::new()
        .route("/healthz", get(healthz))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> Html<String> {
    Html(page::render_index())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn predict<M, R>(
    State(state): State<AppState<M, R>>,
    form: Result<Form<PredictAction>, FormRejection>,
) -> Response
where
    M: UsageModel + 'static,
    R: ReferenceSource + 'static,
{
    let action = match form {
        Ok(Form(action)) => action,
        Err(rejection) => {
            let failure = HandlerFailure {
                kind: "validation",
                message: rejection.body_text(),
            };
            return Html(page::render_failure(&failure)).into_response();
        }
    };
    let handler = state.handler.clone();
    let outcome = tokio::task::spawn_blocking(move || handler.handle(&action)).await;

    match outcome {
        Ok(HandlerOutcome::NoUpdate) => StatusCode::NO_CONTENT.into_response(),
        Ok(HandlerOutcome::Table(table)) => Html(page::render_table(&table)).into_response(),
        Ok(HandlerOutcome::Failed(failure)) => Html(page::render_failure(&failure)).into_response(),
        Err(e) => {
            tracing::error!("Predict task failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
        }
    }
}

async fn api_estimate<M, R>(
    State(state): State<AppState<M, R>>,
    body: Result<Json<EstimateRequest>, JsonRejection>,
) -> Response
where
    M: UsageModel + 'static,
    R: ReferenceSource + 'static,
{
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return error_json(
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation",
                rejection.body_text(),
            );
        }
    };
    let action = PredictAction {
        n_clicks: 1,
        language: Some(request.language),
        area: Some(request.area),
        industry: Some(request.industry),
        employee_count: Some(request.employee_count.to_string()),
    };

    let handler = state.handler.clone();
    let result = tokio::task::spawn_blocking(move || {
        let profile = crate::application::parse_profile(&action)?;
        handler.service().estimate(&profile)
    })
    .await;

    match result {
        Ok(Ok(estimate)) => Json(estimate).into_response(),
        Ok(Err(e)) => {
            tracing::warn!("Estimate request failed ({}): {}", e.kind(), e);
            error_json(status_for(&e), e.kind(), e.to_string())
        }
        Err(e) => {
            tracing::error!("Estimate task failed: {}", e);
            error_json(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                "Internal error".to_string(),
            )
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Bind `addr` and serve until Ctrl-C.
///
/// # Errors
/// Returns error if the socket cannot be bound or the server fails.
pub async fn serve<M, R>(addr: SocketAddr, state: AppState<M, R>) -> std::io::Result<()>
where
    M: UsageModel + 'static,
    R: ReferenceSource + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::estimation::tests::{service, FixedModel};
    use crate::adapters::StaticReferenceSource;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use base64::Engine;
    use tower::ServiceExt;

    fn app() -> Router {
        router(AppState::<FixedModel, StaticReferenceSource> {
            handler: PredictHandler::new(service(10.0, 50.0)),
            credentials: Credentials::new("admin", "hunter2").unwrap(),
        })
    }

    fn basic() -> String {
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode("admin:hunter2")
        )
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn form(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/predict")
            .header(header::AUTHORIZATION, basic())
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_healthz_is_public() {
        let response = app()
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_index_requires_auth() {
        let response = app()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));

        let response = app()
            .oneshot(
                Request::get("/")
                    .header(header::AUTHORIZATION, basic())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("Therapist Demand Predictive App"));
    }

    #[tokio::test]
    async fn test_predict_zero_clicks_is_no_content() {
        let response = app()
            .oneshot(form(
                "n_clicks=0&language=English&area=North+America&industry=Technology&employee_count=1000",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_predict_renders_table() {
        let response = app()
            .oneshot(form(
                "n_clicks=1&language=English&area=North+America&industry=Technology&employee_count=1000",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("<td>Additional Therapists Needed</td><td>2.50</td>"));
    }

    #[tokio::test]
    async fn test_predict_failure_is_visible() {
        let response = app()
            .oneshot(form("n_clicks=2&language=English&area=North+America&industry=Technology&employee_count=0"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("data-kind=\"validation\""));
    }

    #[tokio::test]
    async fn test_api_estimate_statuses() {
        let request = |body: &str| {
            Request::builder()
                .method("POST")
                .uri("/api/estimate")
                .header(header::AUTHORIZATION, basic())
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap()
        };

        let response = app()
            .oneshot(request(
                r#"{"language":"English","area":"North America","industry":"Technology","employee_count":1000}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let estimate: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(estimate["estimated_users"], 100.0);

        let response = app()
            .oneshot(request(
                r#"{"language":"German","area":"North America","industry":"Technology","employee_count":1000}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let error: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(error["error"], "lookup");
    }

    #[tokio::test]
    async fn test_malformed_form_renders_validation_fragment() {
        let response = app()
            .oneshot(form("n_clicks=abc&language=English"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("data-kind=\"validation\""));
    }

    #[tokio::test]
    async fn test_api_rejected_body_is_json_error() {
        for body in [
            r#"{"area":"North America","industry":"Technology","employee_count":1000}"#,
            r#"{"language":"English","area":"North America","industry":"Technology","employee_count":12.5}"#,
        ] {
            let response = app()
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri("/api/estimate")
                        .header(header::AUTHORIZATION, basic())
                        .header(header::CONTENT_TYPE, "application/json")
                        .body(Body::from(body))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
            assert_eq!(
                response.headers()[header::CONTENT_TYPE],
                "application/json"
            );
            let error: serde_json::Value =
                serde_json::from_str(&body_text(response).await).expect("JSON error body");
            assert_eq!(error["error"], "validation");
            assert!(error["message"].is_string());
        }
    }

    #[test]
    fn test_status_mapping() {
        use crate::ports::ReferenceError;
        assert_eq!(
            status_for(&DemandError::RemoteFetch(ReferenceError::Timeout)),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&DemandError::Validation("x".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&DemandError::Configuration("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
