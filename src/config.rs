use crate::error::{RelayError, Result};
use crate::variants::{VariantPreset, DEFAULT_VARIANT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// On-disk configuration. Every section is optional; the chosen variant
/// preset fills in whatever the provider section leaves out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_variant")]
    pub variant: String,
    #[serde(default)]
    pub bot: BotSection,
    #[serde(default)]
    pub provider: ProviderOverrides,
    #[serde(default)]
    pub completion: CompletionParams,
    #[serde(default)]
    pub settings: SettingsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSection {
    #[serde(default = "default_bot_name")]
    pub name: String,
    #[serde(default = "default_access_key_env")]
    pub access_key_env: String,
    #[serde(default)]
    pub allow_without_key: bool,
    #[serde(default)]
    pub sync_settings: bool,
    #[serde(default = "default_settings_base_url")]
    pub settings_base_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summarize_attachments: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionParams {
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsConfig {
    #[serde(default = "default_true")]
    pub allow_attachments: bool,
    #[serde(default = "default_true")]
    pub expand_text_attachments: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub introduction_message: Option<String>,
}

fn default_port() -> u16 {
    8080
}

fn default_variant() -> String {
    DEFAULT_VARIANT.to_string()
}

fn default_bot_name() -> String {
    "linuxea-poe-server".to_string()
}

fn default_access_key_env() -> String {
    "POE_ACCESS_KEY".to_string()
}

fn default_settings_base_url() -> String {
    "https://api.poe.com/bot/".to_string()
}

fn default_temperature() -> f64 {
    1.0
}

fn default_max_tokens() -> u64 {
    16_000
}

fn default_true() -> bool {
    true
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            variant: default_variant(),
            bot: BotSection::default(),
            provider: ProviderOverrides::default(),
            completion: CompletionParams::default(),
            settings: SettingsConfig::default(),
        }
    }
}

impl Default for BotSection {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
            access_key_env: default_access_key_env(),
            allow_without_key: false,
            sync_settings: false,
            settings_base_url: default_settings_base_url(),
        }
    }
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            allow_attachments: true,
            expand_text_attachments: true,
            introduction_message: None,
        }
    }
}

/// Everything the translator and relay need for one upstream provider.
/// Built once at startup and shared read-only across requests.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u64,
    pub headers: Vec<(String, String)>,
    pub summarize_attachments: bool,
}

impl RelayConfig {
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// How the bot identifies itself to the hosting platform.
#[derive(Debug, Clone)]
pub struct BotIdentity {
    pub name: String,
    pub access_key: Option<String>,
    pub allow_without_key: bool,
}

impl BotConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RelayError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Search standard locations for a config file.
    /// Priority: CLI arg > CWD > XDG config > home dir > built-in defaults
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load(path);
        }

        for candidate in &config_search_paths() {
            if candidate.exists() {
                tracing::info!(path = %candidate.display(), "Loading config");
                return Self::load(candidate);
            }
        }

        tracing::info!("No config file found, using built-in defaults");
        Ok(Self::default())
    }

    pub fn preset(&self) -> Result<&'static VariantPreset> {
        VariantPreset::from_name(&self.variant).ok_or_else(|| {
            RelayError::config(format!(
                "Unknown variant '{}'. Known variants: {}",
                self.variant,
                VariantPreset::names().join(", ")
            ))
        })
    }

    /// Environment variable holding the provider API key.
    pub fn api_key_env(&self) -> Result<String> {
        if let Some(ref env) = self.provider.api_key_env {
            return Ok(env.clone());
        }
        Ok(self.preset()?.default_api_key_env.to_string())
    }

    /// Merge the variant preset with provider overrides and read the provider
    /// key from the environment. A missing key is not an error here; the
    /// provider rejects the call later.
    pub fn relay_config(&self) -> Result<RelayConfig> {
        let preset = self.preset()?;

        let headers = match self.provider.headers {
            Some(ref h) => h.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            None => preset
                .headers
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        };

        Ok(RelayConfig {
            base_url: self
                .provider
                .base_url
                .clone()
                .unwrap_or_else(|| preset.base_url.to_string()),
            api_key: read_env(&self.api_key_env()?),
            model: self
                .provider
                .model
                .clone()
                .unwrap_or_else(|| preset.model.to_string()),
            temperature: self.completion.temperature,
            max_tokens: self.completion.max_tokens,
            headers,
            summarize_attachments: self
                .provider
                .summarize_attachments
                .unwrap_or(preset.summarize_attachments),
        })
    }

    pub fn bot_identity(&self) -> BotIdentity {
        BotIdentity {
            name: self.bot.name.clone(),
            access_key: read_env(&self.bot.access_key_env),
            allow_without_key: self.bot.allow_without_key,
        }
    }
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // CWD
    paths.push(PathBuf::from("poe-relay.toml"));

    if cfg!(target_os = "macos") {
        if let Some(home) = dirs_path() {
            paths.push(
                home.join("Library")
                    .join("Application Support")
                    .join("poe-relay")
                    .join("config.toml"),
            );
        }
    } else {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            paths.push(PathBuf::from(xdg).join("poe-relay").join("config.toml"));
        }
        if let Some(home) = dirs_path() {
            paths.push(home.join(".config").join("poe-relay").join("config.toml"));
        }
    }

    if let Some(home) = dirs_path() {
        paths.push(home.join(".poe-relay.toml"));
    }

    paths
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(
            f,
            r#"
port = 5000
variant = "kimi"

[bot]
name = "my-bot"
allow_without_key = true

[provider]
model = "kimi-latest"

[completion]
max_tokens = 4096
"#
        )
        .unwrap();

        let config = BotConfig::load(f.path()).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.variant, "kimi");
        assert_eq!(config.bot.name, "my-bot");
        assert!(config.bot.allow_without_key);
        assert_eq!(config.bot.access_key_env, "POE_ACCESS_KEY");
        assert_eq!(config.completion.max_tokens, 4096);
        assert!((config.completion.temperature - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let f = NamedTempFile::new().unwrap();
        let config = BotConfig::load(f.path()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.variant, DEFAULT_VARIANT);
        assert!(!config.bot.allow_without_key);
        assert_eq!(config.completion.max_tokens, 16_000);
        assert!(config.settings.allow_attachments);
    }

    #[test]
    fn test_relay_config_from_preset() {
        let config = BotConfig {
            variant: "kimi".to_string(),
            provider: ProviderOverrides {
                api_key_env: Some("POE_RELAY_TEST_UNSET_KEY".to_string()),
                ..ProviderOverrides::default()
            },
            ..BotConfig::default()
        };

        let relay = config.relay_config().unwrap();
        assert_eq!(relay.base_url, "https://api.moonshot.cn/v1");
        assert_eq!(relay.model, "kimi-k2-0711-preview");
        assert_eq!(relay.api_key, None);
        assert!(!relay.summarize_attachments);
        assert_eq!(
            relay.headers,
            vec![("X-Title".to_string(), "kimi poe wrapper".to_string())]
        );
        assert_eq!(relay.completions_url(), "https://api.moonshot.cn/v1/chat/completions");
    }

    #[test]
    fn test_relay_config_overrides() {
        let mut headers = BTreeMap::new();
        headers.insert("HTTP-Referer".to_string(), "https://poe.com".to_string());

        let config = BotConfig {
            variant: "kimi".to_string(),
            provider: ProviderOverrides {
                base_url: Some("http://localhost:9000/v1/".to_string()),
                api_key_env: None,
                model: Some("custom-model".to_string()),
                summarize_attachments: Some(true),
                headers: Some(headers),
            },
            ..BotConfig::default()
        };

        let relay = config.relay_config().unwrap();
        assert_eq!(relay.model, "custom-model");
        assert!(relay.summarize_attachments);
        assert_eq!(relay.headers.len(), 1);
        assert_eq!(relay.completions_url(), "http://localhost:9000/v1/chat/completions");
    }

    #[test]
    fn test_unknown_variant() {
        let config = BotConfig {
            variant: "openrouter".to_string(),
            ..BotConfig::default()
        };
        let err = config.relay_config().unwrap_err();
        assert!(matches!(err, RelayError::Config { .. }));
        assert!(err.to_string().contains("kimi"));
    }
}
