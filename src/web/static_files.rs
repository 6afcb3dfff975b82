use axum::{
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use rust_embed::Embed;

/// Embedded static assets (the keyboard page)
#[derive(Embed)]
#[folder = "web/"]
pub struct StaticAssets;

/// Create router for static file serving
pub fn static_file_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/", get(index_handler))
        .fallback(static_handler)
}

/// Serve index.html for root path
async fn index_handler() -> Response {
    try_serve_file("index.html")
        .unwrap_or_else(|| (StatusCode::NOT_FOUND, "Not Found").into_response())
}

/// Serve static files
async fn static_handler(uri: Uri) -> Response {
    let path = uri.path().trim_start_matches('/');

    if let Some(response) = try_serve_file(path) {
        return response;
    }

    (StatusCode::NOT_FOUND, "Not Found").into_response()
}

fn try_serve_file(path: &str) -> Option<Response> {
    let asset = StaticAssets::get(path)?;

    let mime = mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string();

    Some(
        (
            [
                (header::CONTENT_TYPE, mime),
                (header::CACHE_CONTROL, "no-cache".to_string()),
            ],
            asset.data.into_owned(),
        )
            .into_response(),
    )
}
