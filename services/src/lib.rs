use crate::api::ApiError;
use crate::config::Config;
use crate::database::SqlStorage;
use crate::images::{ImageStore, MAX_IMAGE_BYTES};
use crate::otp::mailer::Mailer;
use crate::state::AppState;
use crate::users::storage::UserStorage;
use axum::{
    Router,
    extract::{DefaultBodyLimit, Extension, Request, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{any, get},
};
use carrental_utils::version_info::{RuntimeEnv, format_version_for_runtime_env};
use opentelemetry::{global, propagation::Extractor};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_opentelemetry::OpenTelemetrySpanExt;

pub mod account;
pub mod analytics;
pub mod api;
pub mod bookings;
pub mod cars;
pub mod config;
pub mod database;
pub mod images;
pub mod notifications;
pub mod otp;
pub mod reviews;
pub mod state;
pub mod telemetry;
pub mod users;

/// Request bodies may carry one image plus a few form fields. Uploads just
/// over [`MAX_IMAGE_BYTES`] still have to reach validation to get a 413.
pub const MAX_BODY_BYTES: usize = MAX_IMAGE_BYTES + 1024 * 1024;

struct HeaderExtractor<'a>(&'a axum::http::HeaderMap);

impl<'a> Extractor for HeaderExtractor<'a> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}

/// Build the full application router.
pub async fn routes<S, U>(
    sql_storage: S,
    user_storage: U,
    images: ImageStore,
    mailer: Mailer,
    config: Config,
) -> Router
where
    S: SqlStorage + Clone + Send + Sync + 'static,
    U: UserStorage + Clone + Send + Sync + 'static,
{
    let state = AppState::new(sql_storage, user_storage, images, mailer);

    let api = Router::new()
        .nest("/user", users::user_routes::<S, U>())
        .nest("/owner", cars::routes::owner_routes::<S, U>())
        .nest("/bookings", bookings::routes::booking_routes::<S, U>())
        .nest("/reviews", reviews::routes::review_routes::<S, U>())
        .nest(
            "/notifications",
            notifications::routes::notification_routes::<S, U>(),
        )
        .nest("/otp", otp::routes::otp_routes::<S, U>());

    Router::new()
        .route("/is-health", get(health_check::<S, U>))
        .nest("/api", api)
        .fallback(any(catch_all))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors_layer(&config))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let parent_context = global::get_text_map_propagator(|propagator| {
                    propagator.extract(&HeaderExtractor(request.headers()))
                });

                let span = tracing::info_span!(
                    "http_request",
                    http_request.method = ?request.method(),
                    http_request.uri = ?request.uri(),
                    http_request.version = ?request.version(),
                    http_request.user_agent = ?request.headers().get(axum::http::header::USER_AGENT),
                );
                span.set_parent(parent_context);

                span
            }),
        )
        .layer(Extension(config))
        .with_state(state)
}

/// Only `CORS_ORIGIN` may call the API when set; any origin otherwise.
fn cors_layer(config: &Config) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match config.cors_origin().map(HeaderValue::from_str) {
        Some(Ok(origin)) => layer.allow_origin(origin),
        Some(Err(e)) => {
            tracing::warn!(error = %e, "CORS_ORIGIN is not a valid header value, allowing any origin");
            layer.allow_origin(Any)
        }
        None => layer.allow_origin(Any),
    }
}

async fn health_check<S, U>(
    State(state): State<AppState<S, U>>,
    Extension(config): Extension<Config>,
) -> impl IntoResponse
where
    S: SqlStorage,
    U: UserStorage,
{
    let mut response = if state.sql_storage.is_connected().await {
        (StatusCode::OK, "OK").into_response()
    } else {
        (StatusCode::BAD_GATEWAY, "502").into_response()
    };

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&config.environment().to_string()) {
        headers.insert(HeaderName::from_static("x-service-env"), value);
    }

    let runtime_env: RuntimeEnv = config.environment().into();
    if let Ok(value) = HeaderValue::from_str(&format_version_for_runtime_env(runtime_env)) {
        headers.insert(HeaderName::from_static("x-service-version"), value);
    }

    response
}

async fn catch_all() -> ApiError {
    ApiError::not_found("Route not found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MockSqlStorage;
    use crate::images::MockFileStorage;
    use crate::users::storage::MockUserStorage;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    async fn app(sql_storage: MockSqlStorage) -> Router {
        routes(
            sql_storage,
            MockUserStorage::new(),
            ImageStore::new_for_test(MockFileStorage::new()),
            Mailer::new_for_test(),
            Config::new_for_test(),
        )
        .await
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_check_connected() {
        let response = app(MockSqlStorage::new())
            .await
            .oneshot(get_request("/is-health"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn health_check_disconnected() {
        let storage = MockSqlStorage::new();
        storage.set_connected(false);

        let response = app(storage)
            .await
            .oneshot(get_request("/is-health"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn health_check_includes_headers() {
        let response = app(MockSqlStorage::new())
            .await
            .oneshot(get_request("/is-health"))
            .await
            .unwrap();

        let env_header = response
            .headers()
            .get("x-service-env")
            .and_then(|v| v.to_str().ok());
        assert_eq!(env_header, Some("local"));

        let version_header = response
            .headers()
            .get("x-service-version")
            .and_then(|v| v.to_str().ok());
        let expected_version = format_version_for_runtime_env(RuntimeEnv::Local);
        assert_eq!(version_header, Some(expected_version.as_str()));
    }

    #[tokio::test]
    async fn unknown_route_is_enveloped_404() {
        let response = app(MockSqlStorage::new())
            .await
            .oneshot(get_request("/api/nowhere"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Route not found");
    }
}
