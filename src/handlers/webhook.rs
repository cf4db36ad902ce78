use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, Uri};
use axum::response::{IntoResponse, Response};
use axum::Form;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha1::Sha1;

use crate::services::call_flow::{self, CallEvent};
use crate::services::telephony::twiml;
use crate::state::AppState;

/// Speech results below this confidence are re-prompted instead of being
/// fed to the turn adapter.
const MIN_SPEECH_CONFIDENCE: f64 = 0.4;

const DID_NOT_CATCH_LINE: &str = "I didn't catch anything that time. Could you say that again?";
const GLITCH_LINE: &str = "I ran into a glitch on my end. Let me try that once more.";

#[derive(Deserialize)]
pub struct WebhookQuery {
    pub company_id: Option<String>,
    pub seq: Option<i64>,
}

#[derive(Deserialize)]
#[allow(dead_code)]
pub struct VoiceStartForm {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "From")]
    pub from: Option<String>,
    #[serde(rename = "To")]
    pub to: Option<String>,
}

#[derive(Deserialize)]
pub struct VoiceTurnForm {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "SpeechResult")]
    pub speech_result: Option<String>,
    #[serde(rename = "Confidence")]
    pub confidence: Option<String>,
}

#[derive(Deserialize)]
pub struct VoiceStatusForm {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "CallStatus")]
    pub call_status: Option<String>,
}

fn validate_twilio_signature(
    auth_token: &str,
    signature: &str,
    url: &str,
    params: &[(&str, &str)],
) -> bool {
    // Data to sign: URL + params concatenated in sorted key order
    let mut data = url.to_string();
    let mut sorted_params = params.to_vec();
    sorted_params.sort_by(|a, b| a.0.cmp(b.0));
    for (key, value) in &sorted_params {
        data.push_str(key);
        data.push_str(value);
    }

    let mut mac = match Hmac::<Sha1>::new_from_slice(auth_token.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(data.as_bytes());
    let result = mac.finalize().into_bytes();
    let expected = base64::engine::general_purpose::STANDARD.encode(result);

    expected == signature
}

/// Check the provider signature when an auth token is configured (empty
/// token = dev mode, validation skipped).
fn verify_request(
    state: &AppState,
    headers: &HeaderMap,
    uri: &Uri,
    params: &[(&str, &str)],
) -> Result<(), Response> {
    if state.config.twilio_auth_token.is_empty() {
        return Ok(());
    }

    let signature = headers
        .get("x-twilio-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if signature.is_empty() {
        tracing::warn!("missing X-Twilio-Signature header");
        return Err((axum::http::StatusCode::FORBIDDEN, "Missing signature").into_response());
    }

    // Reconstruct the public URL — use X-Forwarded-Proto/Host behind a proxy
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("https");
    let host = headers
        .get("x-forwarded-host")
        .or_else(|| headers.get("host"))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    let url = format!("{proto}://{host}{path}");

    if !validate_twilio_signature(&state.config.twilio_auth_token, signature, &url, params) {
        tracing::warn!("invalid Twilio signature");
        return Err((axum::http::StatusCode::FORBIDDEN, "Invalid signature").into_response());
    }

    Ok(())
}

fn turn_action(state: &AppState, company_id: &str, seq: i64) -> String {
    format!(
        "{}/webhook/voice/turn?company_id={}&seq={}",
        state.config.public_base_url.trim_end_matches('/'),
        company_id,
        seq
    )
}

fn xml_response(body: String) -> Response {
    ([(header::CONTENT_TYPE, "application/xml")], body).into_response()
}

/// Initial webhook: the call connected. Greets the prospect and opens the
/// first speech gather.
pub async fn voice_start(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WebhookQuery>,
    uri: Uri,
    headers: HeaderMap,
    Form(form): Form<VoiceStartForm>,
) -> Response {
    let params = [
        ("CallSid", form.call_sid.as_str()),
        ("From", form.from.as_deref().unwrap_or("")),
        ("To", form.to.as_deref().unwrap_or("")),
    ];
    if let Err(resp) = verify_request(&state, &headers, &uri, &params) {
        return resp;
    }

    let company_id = query.company_id.as_deref().unwrap_or("default");
    tracing::info!(call_sid = %form.call_sid, company_id, "incoming call start");

    match call_flow::handle_event(&state, &form.call_sid, company_id, CallEvent::Started).await {
        Ok(reply) => {
            let action = turn_action(&state, company_id, 1);
            xml_response(twiml::gather(&reply.say, &action))
        }
        Err(e) => {
            tracing::error!(error = %e, call_sid = %form.call_sid, "failed to start call session");
            xml_response(twiml::hangup(
                "Sorry, we're having trouble right now. We'll call back another time. Goodbye!",
            ))
        }
    }
}

/// One conversation turn: a speech result for an active call.
pub async fn voice_turn(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WebhookQuery>,
    uri: Uri,
    headers: HeaderMap,
    Form(form): Form<VoiceTurnForm>,
) -> Response {
    let params = [
        ("CallSid", form.call_sid.as_str()),
        ("Confidence", form.confidence.as_deref().unwrap_or("")),
        ("SpeechResult", form.speech_result.as_deref().unwrap_or("")),
    ];
    if let Err(resp) = verify_request(&state, &headers, &uri, &params) {
        return resp;
    }

    let company_id = query.company_id.as_deref().unwrap_or("default");
    let seq = query.seq.unwrap_or(1);

    let speech = form
        .speech_result
        .as_deref()
        .unwrap_or("")
        .trim()
        .to_string();
    let confidence = form
        .confidence
        .as_deref()
        .and_then(|c| c.parse::<f64>().ok());

    tracing::info!(
        call_sid = %form.call_sid,
        seq,
        speech = %speech,
        ?confidence,
        "processing turn"
    );

    // Nothing usable heard: reopen the mic on the same turn number so the
    // retry does not consume a sequence slot.
    if speech.is_empty() || confidence.map(|c| c < MIN_SPEECH_CONFIDENCE).unwrap_or(false) {
        let action = turn_action(&state, company_id, seq);
        return xml_response(twiml::gather(DID_NOT_CATCH_LINE, &action));
    }

    let event = CallEvent::Speech { text: speech, seq };
    match call_flow::handle_event(&state, &form.call_sid, company_id, event).await {
        Ok(reply) if reply.end_call => xml_response(twiml::hangup(&reply.say)),
        Ok(reply) => {
            let action = turn_action(&state, company_id, seq + 1);
            xml_response(twiml::gather(&reply.say, &action))
        }
        Err(e) => {
            tracing::error!(error = %e, call_sid = %form.call_sid, "turn processing failed");
            let action = turn_action(&state, company_id, seq);
            xml_response(twiml::gather(GLITCH_LINE, &action))
        }
    }
}

/// Provider status callback; terminal statuses finalize the session.
pub async fn voice_status(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
    Form(form): Form<VoiceStatusForm>,
) -> Response {
    let params = [
        ("CallSid", form.call_sid.as_str()),
        ("CallStatus", form.call_status.as_deref().unwrap_or("")),
    ];
    if let Err(resp) = verify_request(&state, &headers, &uri, &params) {
        return resp;
    }

    let status = form.call_status.as_deref().unwrap_or("");
    if matches!(
        status,
        "completed" | "busy" | "failed" | "no-answer" | "canceled"
    ) {
        tracing::info!(call_sid = %form.call_sid, status, "call ended");
        if let Err(e) =
            call_flow::handle_event(&state, &form.call_sid, "", CallEvent::Ended).await
        {
            tracing::error!(error = %e, call_sid = %form.call_sid, "failed to finalize session");
        }
    }

    xml_response(twiml::empty())
}
