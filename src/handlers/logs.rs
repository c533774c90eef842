//! In-memory log feed endpoint.

use crate::error::AppResult;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// GET /get_logs
///
/// Returns every log line currently held by the in-memory ring, oldest
/// first.
pub async fn get_logs(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let lines = state.logs.snapshot();
    Ok(HttpResponse::Ok().json(json!({ "logs": lines })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{stub_state, StubEngine};
    use actix_web::{test, App};
    use std::sync::Arc;

    #[actix_web::test]
    async fn test_get_logs_returns_buffered_lines() {
        let state = stub_state(Arc::new(StubEngine::ok("x")));
        state.logs.push("line one".to_string());
        state.logs.push("line two".to_string());

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/get_logs", web::get().to(get_logs)),
        )
        .await;

        let req = test::TestRequest::get().uri("/get_logs").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["logs"], json!(["line one", "line two"]));
    }

    #[actix_web::test]
    async fn test_get_logs_empty_buffer() {
        let state = stub_state(Arc::new(StubEngine::ok("x")));

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/get_logs", web::get().to(get_logs)),
        )
        .await;

        let req = test::TestRequest::get().uri("/get_logs").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["logs"], json!([]));
    }
}
