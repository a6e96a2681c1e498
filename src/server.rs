use crate::config::{BotConfig, BotIdentity, RelayConfig, SettingsConfig};
use crate::error::Result;
use crate::logging::{RequestLogger, SharedLogger};
use crate::relay;
use crate::translate::poe_types::{
    ErrorResponse, PoeEvent, QueryRequest, ReportRequest, RequestEnvelope, SettingsResponse,
};

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub variant: String,
    pub identity: BotIdentity,
    pub relay: RelayConfig,
    pub settings: SettingsConfig,
    pub client: reqwest::Client,
    pub logger: SharedLogger,
    /// Cancelled on shutdown; every in-flight relay holds a child token.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Resolve a loaded config into the immutable per-process state.
    pub fn from_config(
        config: &BotConfig,
        client: reqwest::Client,
        logger: SharedLogger,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        Ok(Self {
            variant: config.preset()?.name.to_string(),
            identity: config.bot_identity(),
            relay: config.relay_config()?,
            settings: config.settings.clone(),
            client,
            logger,
            shutdown,
        })
    }
}

/// Build the bot's web application from a loaded config, with an in-memory
/// diagnostic log and a default HTTP client.
pub fn make_app(config: &BotConfig) -> Result<Router> {
    let state = AppState::from_config(
        config,
        reqwest::Client::new(),
        SharedLogger::in_memory(),
        CancellationToken::new(),
    )?;
    Ok(build_router(Arc::new(state)))
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_index).post(handle_bot_request))
        .route("/health", get(handle_health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_bot_request(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !is_authorized(&state.identity, &headers) {
        state.logger.warn("server", "Rejected request with invalid access key");
        return (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Bearer")],
            Json(ErrorResponse::new("Invalid access key")),
        )
            .into_response();
    }

    let envelope: RequestEnvelope = match serde_json::from_slice(&body) {
        Ok(e) => e,
        Err(e) => return bad_request(&state, e),
    };

    match envelope.request_type.as_str() {
        "query" => match serde_json::from_slice::<QueryRequest>(&body) {
            Ok(req) => handle_query(state, req),
            Err(e) => bad_request(&state, e),
        },
        "settings" => {
            state.logger.info(
                "server",
                format!(
                    "Settings request (protocol version {})",
                    envelope.version.as_deref().unwrap_or("unknown")
                ),
            );
            Json(settings_response(&state.settings)).into_response()
        }
        "report_feedback" | "report_reaction" | "report_error" => {
            match serde_json::from_slice::<ReportRequest>(&body) {
                Ok(report) => handle_report(&state, &report),
                Err(e) => bad_request(&state, e),
            }
        }
        other => {
            state
                .logger
                .warn("server", format!("Unsupported request type: {}", other));
            (
                StatusCode::NOT_IMPLEMENTED,
                Json(ErrorResponse::new("Unsupported request type")),
            )
                .into_response()
        }
    }
}

fn handle_query(state: Arc<AppState>, req: QueryRequest) -> Response {
    let log = state.logger.request(uuid::Uuid::new_v4().to_string());
    log.info(
        "server",
        format!(
            "Query: conversation={} message={} turns={}",
            req.conversation_id,
            req.message_id,
            req.query.len()
        ),
    );

    let events = query_events(state, req, log).map(|event| -> std::result::Result<Event, Infallible> {
        let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().event(event.event_name()).data(data))
    });

    Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// Poe events for one query: a `text` event per fragment, an `error` event if
/// anything fails, and always a final `done`.
fn query_events(
    state: Arc<AppState>,
    req: QueryRequest,
    log: RequestLogger,
) -> impl Stream<Item = PoeEvent> + Send + 'static {
    async_stream::stream! {
        let cancel = state.shutdown.child_token();
        match relay::relay_query(&req.query, &state.relay, &state.client, &log, cancel).await {
            Ok(mut fragments) => {
                while let Some(item) = fragments.next().await {
                    match item {
                        Ok(partial) => yield PoeEvent::Text(partial),
                        Err(e) => {
                            log.error("relay", format!("Stream failed: {}", e));
                            yield PoeEvent::error(e.to_string());
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                log.error("relay", format!("Relay setup failed: {}", e));
                yield PoeEvent::error(e.to_string());
            }
        }
        yield PoeEvent::done();
    }
}

fn handle_report(state: &AppState, report: &ReportRequest) -> Response {
    let detail = report
        .feedback_type
        .as_deref()
        .or(report.reaction.as_deref())
        .or(report.message.as_deref())
        .unwrap_or("");
    state.logger.info(
        "server",
        format!(
            "{}: conversation={} message={} {}",
            report.request_type, report.conversation_id, report.message_id, detail
        ),
    );
    Json(serde_json::json!({})).into_response()
}

fn settings_response(settings: &SettingsConfig) -> SettingsResponse {
    SettingsResponse {
        allow_attachments: settings.allow_attachments,
        expand_text_attachments: settings.expand_text_attachments,
        introduction_message: settings.introduction_message.clone(),
        server_bot_dependencies: HashMap::new(),
    }
}

fn bad_request(state: &AppState, e: serde_json::Error) -> Response {
    state
        .logger
        .error("server", format!("Failed to parse request: {}", e));
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new(format!("Invalid request body: {}", e))),
    )
        .into_response()
}

/// A configured access key must always match. Without one, requests pass only
/// when anonymous access is allowed.
fn is_authorized(identity: &BotIdentity, headers: &HeaderMap) -> bool {
    match identity.access_key {
        Some(ref key) => bearer_token(headers) == Some(key.as_str()),
        None => identity.allow_without_key,
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

async fn handle_index(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(format!(
        "<html><body><h1>{}</h1><p>Poe server bot is running. \
         Point a Poe server bot at this URL to connect it.</p></body></html>",
        state.identity.name
    ))
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "bot": state.identity.name,
        "variant": state.variant,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn identity(key: Option<&str>, allow_without_key: bool) -> BotIdentity {
        BotIdentity {
            name: "test-bot".to_string(),
            access_key: key.map(String::from),
            allow_without_key,
        }
    }

    fn bearer(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {value}")).unwrap(),
        );
        headers
    }

    #[test]
    fn test_configured_key_must_match() {
        let id = identity(Some("secret"), false);
        assert!(is_authorized(&id, &bearer("secret")));
        assert!(!is_authorized(&id, &bearer("wrong")));
        assert!(!is_authorized(&id, &HeaderMap::new()));
    }

    #[test]
    fn test_configured_key_checked_even_when_anonymous_allowed() {
        let id = identity(Some("secret"), true);
        assert!(!is_authorized(&id, &HeaderMap::new()));
    }

    #[test]
    fn test_missing_key() {
        assert!(!is_authorized(&identity(None, false), &bearer("anything")));
        assert!(is_authorized(&identity(None, true), &HeaderMap::new()));
    }

    #[test]
    fn test_settings_response_from_config() {
        let settings = SettingsConfig {
            allow_attachments: false,
            expand_text_attachments: true,
            introduction_message: Some("Hi, I relay to Kimi.".to_string()),
        };
        let resp = settings_response(&settings);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["allow_attachments"], false);
        assert_eq!(json["introduction_message"], "Hi, I relay to Kimi.");
        assert_eq!(json["server_bot_dependencies"], serde_json::json!({}));
    }
}
