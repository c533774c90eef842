//! Text translation endpoint.

use crate::error::AppResult;
use crate::state::AppState;
use crate::translation::LanguagePair;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct TranslateRequest {
    pub text: String,
    #[serde(default = "default_source_lang")]
    pub source_lang: String,
    #[serde(default = "default_target_lang")]
    pub target_lang: String,
}

fn default_source_lang() -> String {
    "en".to_string()
}

fn default_target_lang() -> String {
    "es".to_string()
}

/// POST /translate
///
/// Translates `text` for the requested language pair. Unregistered pairs are
/// a 400; a failing or timed-out model call is a 500 carrying the engine's
/// message.
pub async fn translate_text(
    state: web::Data<AppState>,
    request: web::Json<TranslateRequest>,
) -> AppResult<HttpResponse> {
    let request = request.into_inner();
    let pair = LanguagePair::new(&request.source_lang, &request.target_lang);

    tracing::debug!(
        "Translation request: {} ({} chars)",
        pair,
        request.text.chars().count()
    );

    let translation = state.translator.translate(request.text, pair).await?;
    Ok(HttpResponse::Ok().json(json!({ "translation": translation })))
}
