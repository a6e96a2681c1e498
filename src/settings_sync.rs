//! Ask Poe to refetch this bot's settings.
//!
//! Poe caches the `settings` response of a server bot. After changing
//! attachment handling or the introduction message, the bot asks Poe to pull
//! them again via the `fetch_settings` endpoint.

use crate::error::{RelayError, Result};
use crate::logging::SharedLogger;
use crate::translate::poe_types::PROTOCOL_VERSION;

/// Build the `fetch_settings` URL for a bot.
pub fn fetch_settings_url(base_url: &str, bot_name: &str, access_key: &str) -> String {
    format!(
        "{}/fetch_settings/{}/{}/{}",
        base_url.trim_end_matches('/'),
        bot_name,
        access_key,
        PROTOCOL_VERSION
    )
}

pub async fn sync_bot_settings(
    client: &reqwest::Client,
    base_url: &str,
    bot_name: &str,
    access_key: &str,
) -> Result<()> {
    let url = fetch_settings_url(base_url, bot_name, access_key);
    let response = client.post(&url).send().await?;

    let status = response.status().as_u16();
    if status >= 400 {
        let body = response.text().await.unwrap_or_default();
        return Err(RelayError::provider(status, body));
    }

    Ok(())
}

/// Run the sync in the background; failures are logged and otherwise ignored.
pub fn spawn_settings_sync(
    client: reqwest::Client,
    base_url: String,
    bot_name: String,
    access_key: String,
    logger: SharedLogger,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match sync_bot_settings(&client, &base_url, &bot_name, &access_key).await {
            Ok(()) => {
                tracing::info!(bot = %bot_name, "Bot settings synced with Poe");
                logger.info("settings", format!("Settings synced for {}", bot_name));
            }
            Err(e) => {
                tracing::warn!(bot = %bot_name, error = %e, "Bot settings sync failed");
                logger.warn("settings", format!("Settings sync failed: {}", e));
            }
        }
    })
}
