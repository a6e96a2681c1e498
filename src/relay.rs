use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::logging::{LogLevel, RequestLogger};
use crate::translate::openai_types::{ChatCompletionChunk, ChatErrorResponse};
use crate::translate::poe_types::{PartialResponse, ProtocolMessage};
use crate::translate::request::poe_to_openai;
use crate::translate::streaming::FragmentRelay;

use bytes::Bytes;
use eventsource_stream::Eventsource;
use futures::stream::Stream;
use futures::StreamExt;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

/// Lazy, single-use stream of partial responses for one query.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<PartialResponse>> + Send>>;

/// Translate a Poe conversation and open one streaming completion call.
///
/// Translation happens before any I/O, so an unrecognized role fails without
/// contacting the provider. The returned stream yields each non-empty fragment
/// as soon as it arrives; a fault ends the stream after everything received
/// before it has been yielded. Cancelling `cancel` ends the stream and drops
/// the upstream response.
pub async fn relay_query(
    turns: &[ProtocolMessage],
    config: &RelayConfig,
    client: &reqwest::Client,
    logger: &RequestLogger,
    cancel: CancellationToken,
) -> Result<FragmentStream> {
    let openai_req = poe_to_openai(turns, config)?;

    let messages_json = serde_json::to_value(&openai_req.messages)?;
    tracing::debug!(
        request_id = logger.request_id(),
        messages = %serde_json::to_string_pretty(&messages_json).unwrap_or_default(),
        "Messages for provider"
    );
    logger.with_context(
        LogLevel::Info,
        "translate",
        format!("Translated {} turns", openai_req.messages.len()),
        messages_json,
    );

    let url = config.completions_url();
    logger.info(
        "relay",
        format!("POST {} model={} (streaming)", url, openai_req.model),
    );

    let mut builder = client
        .post(&url)
        .header("Content-Type", "application/json");
    if let Some(ref key) = config.api_key {
        builder = builder.header("Authorization", format!("Bearer {}", key));
    }
    for (name, value) in &config.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    let response = builder
        .json(&openai_req)
        .send()
        .await
        .map_err(|e| RelayError::stream(format!("Streaming request failed: {}", e)))?;

    let status = response.status().as_u16();
    if status >= 400 {
        let body = response.text().await.unwrap_or_default();
        logger.warn(
            "relay",
            format!("Provider error status={}: {}", status, truncate(&body, 300)),
        );
        let message = match serde_json::from_str::<ChatErrorResponse>(&body) {
            Ok(err) => err.error.message,
            Err(_) => truncate(&body, 500).to_string(),
        };
        return Err(RelayError::provider(status, message));
    }

    let stream = fragment_stream(response.bytes_stream(), logger.clone(), cancel);
    Ok(Box::pin(stream))
}

/// Parse an `OpenAI` SSE byte stream into partial responses.
pub fn fragment_stream(
    byte_stream: impl Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + 'static,
    logger: RequestLogger,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<PartialResponse>> + Send + 'static {
    async_stream::try_stream! {
        let mut relay = FragmentRelay::new();
        let events = byte_stream.eventsource();
        tokio::pin!(events);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    logger.info("relay", "Cancelled, closing upstream stream");
                    break;
                }
                next = events.next() => next,
            };

            let Some(event) = next else {
                break;
            };
            let event = event.map_err(|e| RelayError::stream(format!("Upstream stream failed: {}", e)))?;

            let data = event.data.trim();
            if data.is_empty() {
                continue;
            }
            if data == "[DONE]" {
                break;
            }

            let chunk = parse_chunk(data)?;
            if let Some(partial) = relay.process_chunk(&chunk) {
                yield partial;
            }
        }

        relay.finish();
        logger.info(
            "relay",
            format!(
                "Stream completed: forwarded={} dropped={} finish_reason={}",
                relay.forwarded(),
                relay.dropped(),
                relay.finish_reason().unwrap_or("none")
            ),
        );
    }
}

/// Some providers report failures mid-stream as an `{"error": ...}` payload.
fn parse_chunk(data: &str) -> Result<ChatCompletionChunk> {
    if let Ok(err) = serde_json::from_str::<ChatErrorResponse>(data) {
        return Err(RelayError::stream(format!("Provider error: {}", err.error.message)));
    }
    serde_json::from_str(data).map_err(|e| {
        RelayError::stream(format!(
            "Failed to parse provider chunk: {}. Data: {}",
            e,
            truncate(data, 300)
        ))
    })
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
