//! HTTP surface: `POST /render-pdf` and `GET /health`.

use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{info, warn};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::config::{RenderConfig, RenderOptions};
use crate::document::DocumentData;
use crate::error::PipelineError;
use crate::layout::JsonNode;
use crate::pipeline::{DocumentSource, Pipeline, Strategy};
use crate::progress::ProgressReporter;
use crate::templates::Template;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
    /// Every request starts from this configuration.
    pub render: RenderConfig,
}

/// Body of `POST /render-pdf`. Exactly one of `document` or `layout`.
#[derive(Debug, Deserialize)]
pub struct RenderRequest {
    pub document: Option<DocumentData>,
    pub layout: Option<JsonNode>,
    #[serde(default)]
    pub template: Template,
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default)]
    pub options: RenderOptions,
}

impl RenderRequest {
    fn source(self) -> Result<DocumentSource, PipelineError> {
        match (self.document, self.layout) {
            (Some(data), None) => Ok(DocumentSource::Document {
                data,
                template: self.template,
            }),
            (None, Some(root)) => Ok(DocumentSource::Layout(root)),
            (Some(_), Some(_)) => Err(PipelineError::Config(
                "send either 'document' or 'layout', not both".into(),
            )),
            (None, None) => Err(PipelineError::Config(
                "request needs a 'document' or a 'layout'".into(),
            )),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    Router::new()
        .route("/render-pdf", post(render_pdf))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn render_pdf(
    State(state): State<AppState>,
    Json(request): Json<RenderRequest>,
) -> Result<Response, ApiError> {
    let config = request.options.apply(&state.render);
    let strategy = request.strategy;
    let source = request.source()?;
    info!("render-pdf: strategy={} file={}", strategy.name(), config.file_name);

    let mut progress = ProgressReporter::silent();
    let pdf = state
        .pipeline
        .generate(&source, strategy, &config, &mut progress)
        .await?;

    let mut response = pdf.bytes.into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/pdf"));
    headers.insert("x-page-count", HeaderValue::from(pdf.page_count));
    if !config.return_blob {
        let disposition = format!("attachment; filename=\"{}\"", pdf.file_name.replace('"', "_"));
        let value = HeaderValue::from_str(&disposition)
            .unwrap_or_else(|_| HeaderValue::from_static("attachment; filename=\"document.pdf\""));
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

/// A pipeline error as a JSON response.
pub struct ApiError(PipelineError);

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            PipelineError::Config(_) | PipelineError::Measurement(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::Assembly(_) | PipelineError::Io(_) | PipelineError::Task(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        warn!("render-pdf failed ({status}): {}", self.0);
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
