//! Audio file transcription endpoint.
//!
//! Accepts a multipart upload, stages it under the uploads directory, runs
//! the speech-to-text engine on the blocking pool, and returns the
//! transcript. The staged file is removed after a successful transcription;
//! a failed one leaves it in place for inspection.

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::transcription::{ModelSize, TranscribeOptions};
use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpResponse};
use futures_util::stream::StreamExt;
use serde_json::json;
use std::path::PathBuf;

/// Extensions accepted for upload.
const ALLOWED_EXTENSIONS: [&str; 3] = ["wav", "mp3", "flac"];

/// POST /transcribe
pub async fn transcribe_file(
    state: web::Data<AppState>,
    mut payload: Multipart,
) -> AppResult<HttpResponse> {
    let mut audio_data: Option<Vec<u8>> = None;
    let mut filename: Option<String> = None;
    let mut model_name: Option<String> = None;
    let mut language: Option<String> = None;
    let mut include_timestamps = false;

    while let Some(item) = payload.next().await {
        let mut field: Field =
            item.map_err(|e| AppError::BadRequest(format!("Multipart error: {}", e)))?;

        let field_name = field
            .content_disposition()
            .and_then(|cd| cd.get_name())
            .map(|s| s.to_string())
            .ok_or_else(|| AppError::BadRequest("Missing field name".to_string()))?;

        match field_name.as_str() {
            "file" => {
                filename = field
                    .content_disposition()
                    .and_then(|cd| cd.get_filename())
                    .map(|s| s.to_string());
                audio_data = Some(read_field_bytes(&mut field).await?);
            }
            "model" => model_name = Some(read_field_string(&mut field).await?),
            "language" => {
                let value = read_field_string(&mut field).await?;
                if !value.is_empty() {
                    language = Some(value);
                }
            }
            "includeTimestamps" => {
                include_timestamps = read_field_string(&mut field).await? == "true";
            }
            _ => {
                // Drain unknown fields so the stream stays consumable.
                while field.next().await.is_some() {}
            }
        }
    }

    let audio_data = audio_data.ok_or_else(|| AppError::BadRequest("No file part".to_string()))?;
    let filename = filename.unwrap_or_default();
    if filename.is_empty() {
        return Err(AppError::BadRequest("No selected file".to_string()));
    }

    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(AppError::BadRequest(format!(
            "File type '{}' is not allowed",
            extension
        )));
    }

    let config = state.get_config();
    let model: ModelSize = model_name
        .as_deref()
        .unwrap_or(&config.models.default_whisper_model)
        .parse()
        .map_err(|e: anyhow::Error| AppError::BadRequest(e.to_string()))?;

    let uploads_dir = PathBuf::from(&config.storage.uploads_dir);
    std::fs::create_dir_all(&uploads_dir)?;
    let path = uploads_dir.join(sanitize_filename(&filename));
    std::fs::write(&path, &audio_data)?;

    tracing::info!(
        "Transcribing {} ({} bytes) with model {}",
        path.display(),
        audio_data.len(),
        model
    );

    let options = TranscribeOptions {
        model,
        language,
        include_timestamps,
    };
    let engine = state.transcriber.clone();
    let task_path = path.clone();
    let task =
        tokio::task::spawn_blocking(move || engine.transcribe_file(&task_path, &options));

    let timeout = std::time::Duration::from_secs(config.performance.inference_timeout_secs);
    let transcript = match tokio::time::timeout(timeout, task).await {
        Err(_) => {
            return Err(AppError::Inference(format!(
                "Transcription timed out after {}s",
                timeout.as_secs()
            )))
        }
        Ok(Err(join_err)) => return Err(AppError::Internal(join_err.to_string())),
        Ok(Ok(Err(engine_err))) => return Err(AppError::Inference(engine_err.to_string())),
        Ok(Ok(Ok(transcript))) => transcript,
    };

    // The upload is only removed after a successful transcription.
    if let Err(e) = std::fs::remove_file(&path) {
        tracing::warn!("Failed to remove upload {}: {}", path.display(), e);
    }

    Ok(HttpResponse::Ok().json(json!({ "transcript": transcript })))
}

async fn read_field_bytes(field: &mut Field) -> AppResult<Vec<u8>> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| AppError::BadRequest(format!("Chunk error: {}", e)))?;
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

async fn read_field_string(field: &mut Field) -> AppResult<String> {
    let bytes = read_field_bytes(field).await?;
    String::from_utf8(bytes).map_err(|e| AppError::BadRequest(format!("Invalid UTF-8: {}", e)))
}

/// Reduce an uploaded filename to a safe flat name.
///
/// Path separators become underscores, every character outside
/// `[A-Za-z0-9._-]` is dropped, and leading dots are stripped so the result
/// can never escape the uploads directory.
pub fn sanitize_filename(filename: &str) -> String {
    let flattened: String = filename
        .chars()
        .map(|c| match c {
            '/' | '\\' | ' ' => '_',
            c => c,
        })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    let trimmed = flattened.trim_start_matches('.').to_string();
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{stub_state, StubEngine};
    use actix_web::{test, App};
    use std::sync::Arc;

    #[::std::prelude::v1::test]
    fn test_sanitize_filename_flattens_paths() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "etc_passwd");
        assert_eq!(sanitize_filename("my clip.wav"), "my_clip.wav");
        assert_eq!(sanitize_filename("a\\b\\c.mp3"), "a_b_c.mp3");
    }

    #[::std::prelude::v1::test]
    fn test_sanitize_filename_drops_special_characters() {
        assert_eq!(sanitize_filename("clip;rm -rf.wav"), "cliprm_-rf.wav");
        assert_eq!(sanitize_filename("ñandú.wav"), "and.wav");
    }

    #[::std::prelude::v1::test]
    fn test_sanitize_filename_never_empty() {
        assert_eq!(sanitize_filename("..."), "upload");
        assert_eq!(sanitize_filename("¡¿"), "upload");
    }

    fn multipart_body(
        boundary: &str,
        filename: Option<&str>,
        content: &[u8],
        extra: &[(&str, &str)],
    ) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some(filename) = filename {
            body.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        for (name, value) in extra {
            body.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        body
    }

    async fn send_upload(
        state: crate::state::AppState,
        filename: Option<&str>,
        extra: &[(&str, &str)],
    ) -> actix_web::dev::ServiceResponse {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/transcribe", web::post().to(transcribe_file)),
        )
        .await;

        let boundary = "XBOUNDARYX";
        let body = multipart_body(boundary, filename, b"RIFFfake", extra);
        let req = test::TestRequest::post()
            .uri("/transcribe")
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={}", boundary),
            ))
            .set_payload(body)
            .to_request();
        test::call_service(&app, req).await
    }

    fn state_with_uploads_dir(engine: StubEngine, dir: &std::path::Path) -> crate::state::AppState {
        let state = stub_state(Arc::new(engine));
        state.config.write().unwrap().storage.uploads_dir = dir.to_string_lossy().to_string();
        state
    }

    #[actix_web::test]
    async fn test_transcribe_returns_transcript_and_removes_upload() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_uploads_dir(StubEngine::ok("hello world"), dir.path());

        let resp = send_upload(state, Some("clip.wav"), &[("model", "tiny")]).await;
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["transcript"]["text"], "hello world");

        assert!(!dir.path().join("clip.wav").exists());
    }

    #[actix_web::test]
    async fn test_transcribe_missing_file_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_uploads_dir(StubEngine::ok("x"), dir.path());

        let resp = send_upload(state, None, &[("model", "tiny")]).await;
        assert_eq!(resp.status(), 400);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "No file part");
    }

    #[actix_web::test]
    async fn test_transcribe_disallowed_extension_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_uploads_dir(StubEngine::ok("x"), dir.path());

        let resp = send_upload(state, Some("notes.txt"), &[]).await;
        assert_eq!(resp.status(), 400);

        // Rejected before anything touches the uploads directory.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[actix_web::test]
    async fn test_transcribe_unknown_model_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_uploads_dir(StubEngine::ok("x"), dir.path());

        let resp = send_upload(state, Some("clip.wav"), &[("model", "giant")]).await;
        assert_eq!(resp.status(), 400);
    }

    #[actix_web::test]
    async fn test_transcribe_engine_failure_is_500_and_keeps_upload() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_uploads_dir(StubEngine::failing(), dir.path());

        let resp = send_upload(state, Some("clip.wav"), &[]).await;
        assert_eq!(resp.status(), 500);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("stub engine failure"));

        // Failed transcriptions leave the staged file behind.
        assert!(dir.path().join("clip.wav").exists());
    }
}
