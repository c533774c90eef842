//! Live recording endpoints: start a session, poll for transcribed text,
//! stop.

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::transcription::{ModelSize, TranscribeOptions};
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Default, Deserialize)]
pub struct RecordRequest {
    pub model: Option<String>,
    pub language: Option<String>,
}

/// POST /record
///
/// Starts a microphone session. Returns 400 while another session runs.
pub async fn start_record(
    state: web::Data<AppState>,
    request: web::Json<RecordRequest>,
) -> AppResult<HttpResponse> {
    let request = request.into_inner();
    let config = state.get_config();

    let model: ModelSize = request
        .model
        .as_deref()
        .unwrap_or(&config.models.default_whisper_model)
        .parse()
        .map_err(|e: anyhow::Error| AppError::BadRequest(e.to_string()))?;

    let options = TranscribeOptions {
        model,
        language: request.language,
        include_timestamps: false,
    };

    let session_id = state.recorder.start(options)?;
    state.set_recording_active(true);

    Ok(HttpResponse::Ok().json(json!({
        "message": "Recording started",
        "session_id": session_id,
    })))
}

/// GET /get_transcription
///
/// Pops the oldest transcribed segment. 204 with an empty body when nothing
/// is queued.
pub async fn get_transcription(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    match state.recorder.try_next_segment() {
        Some(transcript) => Ok(HttpResponse::Ok().json(json!({ "transcript": transcript }))),
        None => Ok(HttpResponse::NoContent().finish()),
    }
}

/// POST /stop_record
///
/// Stops the running session. Idempotent: stopping with no session is still
/// a 200.
pub async fn stop_record(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    state.recorder.stop()?;
    state.set_recording_active(false);
    Ok(HttpResponse::Ok().json(json!({ "message": "Recording stopped" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{stub_state, StubEngine};
    use actix_web::{test, App};
    use std::sync::Arc;

    macro_rules! record_app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($state))
                    .route("/record", web::post().to(start_record))
                    .route("/get_transcription", web::get().to(get_transcription))
                    .route("/stop_record", web::post().to(stop_record)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_record_start_returns_session_id() {
        let state = stub_state(Arc::new(StubEngine::ok("live text")));
        let app = record_app!(state);

        let req = test::TestRequest::post()
            .uri("/record")
            .set_json(json!({"model": "tiny"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Recording started");
        assert!(body["session_id"].as_str().is_some());

        let req = test::TestRequest::post().uri("/stop_record").to_request();
        test::call_service(&app, req).await;
    }

    #[actix_web::test]
    async fn test_record_double_start_is_400() {
        let state = stub_state(Arc::new(StubEngine::ok("x")));
        let app = record_app!(state);

        let req = test::TestRequest::post()
            .uri("/record")
            .set_json(json!({}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);

        let req = test::TestRequest::post()
            .uri("/record")
            .set_json(json!({}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["error"]
            .as_str()
            .unwrap()
            .contains("already in progress"));

        let req = test::TestRequest::post().uri("/stop_record").to_request();
        test::call_service(&app, req).await;
    }

    #[actix_web::test]
    async fn test_record_unknown_model_is_400() {
        let state = stub_state(Arc::new(StubEngine::ok("x")));
        let app = record_app!(state);

        let req = test::TestRequest::post()
            .uri("/record")
            .set_json(json!({"model": "gigantic"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);
    }

    #[actix_web::test]
    async fn test_get_transcription_empty_queue_is_204() {
        let state = stub_state(Arc::new(StubEngine::ok("x")));
        let app = record_app!(state);

        let req = test::TestRequest::get()
            .uri("/get_transcription")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 204);
        let body = test::read_body(resp).await;
        assert!(body.is_empty());
    }

    #[actix_web::test]
    async fn test_stop_without_session_is_200() {
        let state = stub_state(Arc::new(StubEngine::ok("x")));
        let app = record_app!(state);

        let req = test::TestRequest::post().uri("/stop_record").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Recording stopped");
    }
}
