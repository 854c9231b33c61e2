use crate::captcha::{BridgeState, DEFAULT_SITE_KEY};
use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::{header::CACHE_CONTROL, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

const INDEX_TEMPLATE: &str = include_str!("index.html");

#[derive(Serialize, Deserialize, Debug)]
pub struct CaptchaData {
    pub rqdata: String,
}

#[derive(Deserialize)]
pub struct TokenSubmission {
    #[serde(default)]
    token: String,
}

pub async fn root() -> Redirect {
    Redirect::temporary("/index.html")
}

// axum handler for the widget page
pub async fn index(Extension(state): Extension<Arc<BridgeState>>) -> impl IntoResponse {
    let challenge = state.challenge();
    let site_key = challenge
        .as_ref()
        .and_then(|c| c.site_key.as_deref())
        .unwrap_or(DEFAULT_SITE_KEY);
    let rqdata = challenge.as_ref().map_or("", |c| c.rqdata.as_str());

    let page = INDEX_TEMPLATE
        .replace("{{SITE_KEY}}", &escape_html(site_key))
        .replace("{{RQDATA}}", &escape_html(rqdata));

    let mut headers = HeaderMap::new();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));

    (headers, Html(page))
}

#[instrument(skip(state))]
pub async fn data(
    Extension(state): Extension<Arc<BridgeState>>,
) -> Result<Json<CaptchaData>, (StatusCode, Json<Value>)> {
    match state.challenge() {
        Some(challenge) => Ok(Json(CaptchaData {
            rqdata: challenge.rqdata,
        })),
        None => {
            debug!("captcha data requested with no active challenge");
            Err((
                StatusCode::NOT_FOUND,
                Json(json!({"status": "error", "message": "no active challenge"})),
            ))
        }
    }
}

#[instrument(skip(state, payload))]
pub async fn token(
    Extension(state): Extension<Arc<BridgeState>>,
    payload: Result<Json<TokenSubmission>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let submission = match payload {
        Ok(Json(submission)) => submission,
        Err(err) => {
            warn!("invalid captcha token payload: {}", err.body_text());
            return invalid_token();
        }
    };

    // Empty tokens are reserved for the internal cancel signal.
    if submission.token.trim().is_empty() {
        warn!("empty captcha token rejected");
        return invalid_token();
    }

    state.deliver_token(submission.token);

    (StatusCode::OK, Json(json!({"status": "success"})))
}

fn invalid_token() -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"status": "error", "message": "invalid token"})),
    )
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
