//! Frontend pages and static assets.
//!
//! Named routes render the HTML templates under `frontend/templates`; the
//! catch-all route serves anything else from the frontend directory with a
//! traversal guard so requests can never read outside it.

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use std::path::{Component, Path, PathBuf};

/// GET /
pub async fn index(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    render_template(&state, "index.html")
}

/// GET /logs
pub async fn logs_page(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    render_template(&state, "logs.html")
}

/// GET /acerca-de
pub async fn acerca_de(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    render_template(&state, "acercade.html")
}

/// GET /uso-herramienta
pub async fn uso_herramienta(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    render_template(&state, "usoherramienta.html")
}

fn render_template(state: &AppState, name: &str) -> AppResult<HttpResponse> {
    let config = state.get_config();
    let path = Path::new(&config.storage.frontend_dir)
        .join("templates")
        .join(name);

    let html = std::fs::read_to_string(&path)
        .map_err(|e| AppError::Internal(format!("Template {} unavailable: {}", name, e)))?;
    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(html))
}

/// GET /{path}
///
/// Serves any file under the frontend directory. Registered last so it only
/// sees paths no other route claimed.
pub async fn static_proxy(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let config = state.get_config();
    let relative = sanitize_path(&path)
        .ok_or_else(|| AppError::NotFound(format!("File not found: {}", path)))?;

    let full_path = Path::new(&config.storage.frontend_dir).join(relative);
    let bytes = std::fs::read(&full_path)
        .map_err(|_| AppError::NotFound(format!("File not found: {}", path)))?;

    Ok(HttpResponse::Ok()
        .content_type(content_type_for(&full_path))
        .body(bytes))
}

/// Reject any request path that could step outside the frontend root.
///
/// Only plain `Normal` components survive; `..`, absolute paths, and drive
/// prefixes all disqualify the request.
fn sanitize_path(requested: &str) -> Option<PathBuf> {
    let path = Path::new(requested);
    let mut clean = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }

    if clean.as_os_str().is_empty() {
        None
    } else {
        Some(clean)
    }
}

fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some("html") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") => "application/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        _ => "application/octet-stream",
    }
}
