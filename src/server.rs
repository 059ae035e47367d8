use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use crate::app::{raw_filename, App, SubmitError};
use crate::download::{DownloadOutcome, MemorySink};
use crate::models::{ExtractRequest, ImageDownloadRequest};
use crate::render::{
    build_view, CaptureSurface, DownloadLinks, HtmlPageSurface, RenderSurface, Shown,
};

const IMAGE_DOWNLOAD_ROUTE: &str = "/images/download";

pub fn router(app: Arc<App>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/extract", post(extract_endpoint))
        .route("/current", get(current_endpoint))
        .route("/current/raw", get(current_raw_endpoint))
        .route("/current/page", get(current_page_endpoint))
        .route(
            IMAGE_DOWNLOAD_ROUTE,
            get(image_download_link).post(image_download_endpoint),
        )
        .with_state(app)
}

fn detail(status: StatusCode, detail: impl Into<String>) -> Response {
    (status, Json(json!({"detail": detail.into()}))).into_response()
}

fn attachment(content_type: &str, filename: &str, bytes: Vec<u8>) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", filename.replace('"', ""));
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response()
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn extract_endpoint(State(app): State<Arc<App>>, Json(req): Json<ExtractRequest>) -> Response {
    let mut surface = CaptureSurface::default();
    match app.submit(&req.url, &mut surface).await {
        Ok(Some(_)) => match surface.shown {
            Shown::Results(view) => (StatusCode::OK, Json(*view)).into_response(),
            _ => detail(StatusCode::INTERNAL_SERVER_ERROR, "Nothing was rendered"),
        },
        Ok(None) => detail(
            StatusCode::CONFLICT,
            "Superseded by a newer submission",
        ),
        Err(e) => {
            let status = match &e {
                SubmitError::Input(_) => StatusCode::BAD_REQUEST,
                SubmitError::Webhook(_) => StatusCode::BAD_GATEWAY,
                SubmitError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            let message = match surface.shown {
                Shown::Error(banner) => banner.message,
                _ => e.to_string(),
            };
            detail(status, message)
        }
    }
}

async fn current_endpoint(State(app): State<Arc<App>>) -> Response {
    match app.current().await {
        Some(submission) => (StatusCode::OK, Json(build_view(&submission))).into_response(),
        None => detail(StatusCode::NOT_FOUND, "No submission yet"),
    }
}

async fn current_raw_endpoint(State(app): State<Arc<App>>) -> Response {
    let current = app.current().await;
    match current.as_ref().and_then(|s| s.extraction.raw()) {
        Some(raw) => attachment(
            "text/plain; charset=utf-8",
            &raw_filename(chrono::Utc::now().timestamp_millis()),
            raw.as_bytes().to_vec(),
        ),
        None => detail(StatusCode::NOT_FOUND, "Nothing to download"),
    }
}

/// The current submission as an HTML page whose Download buttons call
/// `GET /images/download`.
async fn current_page_endpoint(State(app): State<Arc<App>>) -> Response {
    let Some(submission) = app.current().await else {
        return detail(StatusCode::NOT_FOUND, "No submission yet");
    };
    let mut surface = HtmlPageSurface::new(DownloadLinks::Service {
        route: IMAGE_DOWNLOAD_ROUTE.to_string(),
    });
    if let Err(e) = surface.show_results(&build_view(&submission)) {
        tracing::error!("rendering page for submission {}: {}", submission.id, e);
        return detail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }
    match surface.into_page() {
        Some(page) => Html(page).into_response(),
        None => detail(StatusCode::INTERNAL_SERVER_ERROR, "Nothing was rendered"),
    }
}

async fn image_download_endpoint(
    State(app): State<Arc<App>>,
    Json(req): Json<ImageDownloadRequest>,
) -> Response {
    download_image(&app, req).await
}

async fn image_download_link(
    State(app): State<Arc<App>>,
    Query(req): Query<ImageDownloadRequest>,
) -> Response {
    download_image(&app, req).await
}

async fn download_image(app: &App, req: ImageDownloadRequest) -> Response {
    let sink = MemorySink::new();
    match app.download_image(&sink, &req.url, req.index).await {
        DownloadOutcome::Proxied { .. } | DownloadOutcome::Direct { .. } => {}
        DownloadOutcome::NotSaved { file } => {
            return detail(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Could not save {}", file),
            );
        }
        DownloadOutcome::Failed => {
            return detail(
                StatusCode::BAD_GATEWAY,
                "Download failed through the image service and directly",
            );
        }
    }
    match sink.take().await.pop() {
        Some((name, bytes)) => attachment("application/octet-stream", &name, bytes),
        None => detail(StatusCode::INTERNAL_SERVER_ERROR, "Download produced no file"),
    }
}
