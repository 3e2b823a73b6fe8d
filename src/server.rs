//! HTTP surface of the gateway.

use crate::access::policy_status;
use crate::config::CorsOrigins;
use crate::error::ApiError;
use crate::logging::{operation_span, record_output};
use crate::metrics::{METRICS, RequestMetrics};
use crate::profiles::Profile;
use crate::state::AppState;
use crate::uplift::{OutputBundle, UpliftRequest};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::{Field, MultipartError, MultipartRejection},
    },
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use indexmap::IndexMap;
use serde_json::{Value, json};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Instrument;

const OP_UPLIFT: &str = "json_uplift";
const OP_PROFILES: &str = "list_profiles";
const OP_ENTAIL: &str = "entail_validate";

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Build the application router, mounted under the configured root path.
pub fn build_router(state: AppState) -> Router {
    let config = state.config();

    let api = Router::new()
        .route("/", get(index))
        .route("/remote-fetch", get(remote_fetch))
        .route("/json-uplift", post(json_uplift))
        .route("/profiles", get(list_profiles))
        .route("/entail-validate", post(entail_validate))
        .route("/metrics", get(metrics_handler))
        .with_state(state);

    let app = if config.root_path.is_empty() {
        api
    } else {
        Router::new().nest(&config.root_path, api)
    };

    app.layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &CorsOrigins) -> CorsLayer {
    match origins {
        CorsOrigins::Any => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
        CorsOrigins::List(list) => {
            let values: Vec<HeaderValue> = list
                .iter()
                .filter_map(|origin| match HeaderValue::from_str(origin) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            // credentials rule out wildcards, so methods and headers are mirrored
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(values))
                .allow_methods(AllowMethods::mirror_request())
                .allow_headers(AllowHeaders::mirror_request())
                .allow_credentials(true)
        }
    }
}

async fn index(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "name": state.config().service_name }))
}

async fn remote_fetch(State(state): State<AppState>) -> Json<Value> {
    let config = state.config();
    Json(policy_status(&config.remote_fetch, &config.context_fetch))
}

async fn metrics_handler() -> Response {
    match METRICS.encode() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            text,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn json_uplift(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let span = operation_span(OP_UPLIFT);
    let result = async {
        let request = read_uplift_request(multipart.map_err(rejected)?).await?;
        record_output(request.output.as_ref());
        let metrics = RequestMetrics::new(OP_UPLIFT, request.output.as_ref());
        match state.orchestrator().uplift(&request).await {
            Ok(bundle) => {
                metrics.success();
                Ok(bundle_response(bundle))
            }
            Err(e) => {
                metrics.error();
                Err(e)
            }
        }
    }
    .instrument(span.clone())
    .await;

    result.inspect_err(|e| span.in_scope(|| e.track(OP_UPLIFT)))
}

async fn list_profiles(State(state): State<AppState>) -> Result<Json<IndexMap<String, Profile>>, ApiError> {
    let metrics = RequestMetrics::new(OP_PROFILES, OP_PROFILES);
    match state.profiles().get().await {
        Ok(registry) => {
            metrics.success();
            Ok(Json(registry.profiles().clone()))
        }
        Err(e) => {
            metrics.error();
            let error = ApiError::unexpected(OP_PROFILES, &e);
            error.track(OP_PROFILES);
            Err(error)
        }
    }
}

async fn entail_validate(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let span = operation_span(OP_ENTAIL);
    let result = async {
        let (document, profile_uris) = read_entail_request(multipart.map_err(rejected)?).await?;
        let metrics = RequestMetrics::new(OP_ENTAIL, OP_ENTAIL);
        match state.entailment().validate(&document, &profile_uris).await {
            Ok(archive) => {
                metrics.success();
                Ok(([(header::CONTENT_TYPE, crate::archive::ZIP_MEDIA_TYPE)], archive).into_response())
            }
            Err(e) => {
                metrics.error();
                Err(e)
            }
        }
    }
    .instrument(span.clone())
    .await;

    result.inspect_err(|e| span.in_scope(|| e.track(OP_ENTAIL)))
}

fn bundle_response(bundle: OutputBundle) -> Response {
    let media_type = bundle.media_type();
    match bundle {
        OutputBundle::Json(value) => Json(value).into_response(),
        OutputBundle::Turtle(text) => ([(header::CONTENT_TYPE, media_type)], text).into_response(),
        OutputBundle::Archive(bytes) => ([(header::CONTENT_TYPE, media_type)], bytes).into_response(),
    }
}

// =============================================================================
// Multipart extraction
// =============================================================================

fn rejected(rejection: MultipartRejection) -> ApiError {
    ApiError::invalid_parameter(rejection.body_text())
}

fn malformed(error: MultipartError) -> ApiError {
    ApiError::invalid_parameter(error.body_text())
}

async fn field_bytes(field: Field<'_>) -> Result<Bytes, ApiError> {
    field.bytes().await.map_err(malformed)
}

async fn field_text(field: Field<'_>) -> Result<Option<String>, ApiError> {
    let text = field.text().await.map_err(malformed)?;
    let text = text.trim();
    Ok((!text.is_empty()).then(|| text.to_string()))
}

/// Form boolean as accepted by the uplift endpoint.
pub fn parse_flag(value: &str) -> Result<bool, ApiError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ApiError::invalid_parameter(format!(
            "Invalid boolean value {other:?} for provenance"
        ))),
    }
}

async fn read_uplift_request(mut multipart: Multipart) -> Result<UpliftRequest, ApiError> {
    let mut request = UpliftRequest::default();
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "context" => request.context = Some(field_bytes(field).await?),
            "contexturl" => request.context_url = field_text(field).await?,
            "json" => request.document = Some(field_bytes(field).await?),
            "jsonurl" => request.document_url = field_text(field).await?,
            "output" => {
                if let Some(output) = field_text(field).await? {
                    request.output = output.parse()?;
                }
            }
            "base" => request.base = field_text(field).await?,
            "provenance" => {
                if let Some(flag) = field_text(field).await? {
                    request.provenance = parse_flag(&flag)?;
                }
            }
            other => tracing::debug!(field = %other, "ignoring unknown form field"),
        }
    }
    Ok(request)
}

async fn read_entail_request(mut multipart: Multipart) -> Result<(Bytes, Vec<String>), ApiError> {
    let mut document = None;
    let mut profile_uris = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "doc" => document = Some(field_bytes(field).await?),
            "profile_uris" => {
                if let Some(uri) = field_text(field).await? {
                    profile_uris.push(uri);
                }
            }
            other => tracing::debug!(field = %other, "ignoring unknown form field"),
        }
    }

    let document = document.ok_or_else(|| ApiError::invalid_parameter("Field required: doc"))?;
    if profile_uris.is_empty() {
        return Err(ApiError::invalid_parameter("Field required: profile_uris"));
    }
    Ok((document, profile_uris))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn provenance_flags() {
        for value in ["true", "1", "YES", " on "] {
            assert!(parse_flag(value).unwrap());
        }
        for value in ["false", "0", "no", "Off"] {
            assert!(!parse_flag(value).unwrap());
        }
        assert_eq!(parse_flag("maybe").unwrap_err().kind, ErrorKind::InvalidParameter);
    }

    #[test]
    fn cors_layers_apply_cleanly() {
        use tower::Layer;
        // tower-http panics when credentials are combined with wildcards
        let service = tower::service_fn(|_: axum::http::Request<axum::body::Body>| async {
            Ok::<_, std::convert::Infallible>(Response::new(axum::body::Body::empty()))
        });
        let listed = CorsOrigins::List(vec!["https://app.example.org".into()]);
        let _ = cors_layer(&listed).layer(service.clone());
        let _ = cors_layer(&CorsOrigins::Any).layer(service);
    }
}
