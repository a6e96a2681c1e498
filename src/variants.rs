//! Built-in bot variants.
//!
//! Each variant pins the upstream provider a bot talks to: base URL, model,
//! the environment variable holding the API key, and how user attachments are
//! shaped. A config file only needs `variant = "..."` to get a working bot.

/// Built-in provider preset for one bot variant.
#[derive(Debug, Clone)]
pub struct VariantPreset {
    pub name: &'static str,
    pub base_url: &'static str,
    pub model: &'static str,
    pub default_api_key_env: &'static str,
    pub summarize_attachments: bool,
    pub headers: &'static [(&'static str, &'static str)],
}

pub const DEFAULT_VARIANT: &str = "siliconflow";

const PRESETS: &[VariantPreset] = &[
    VariantPreset {
        name: "kimi",
        base_url: "https://api.moonshot.cn/v1",
        model: "kimi-k2-0711-preview",
        default_api_key_env: "KIMI_API_KEY",
        summarize_attachments: false,
        headers: &[("X-Title", "kimi poe wrapper")],
    },
    VariantPreset {
        name: "siliconflow",
        base_url: "https://api.siliconflow.cn/v1",
        model: "moonshotai/Kimi-K2-Instruct",
        default_api_key_env: "SILICONFLOW_API_KEY",
        summarize_attachments: true,
        headers: &[],
    },
];

impl VariantPreset {
    #[must_use]
    pub fn from_name(name: &str) -> Option<&'static VariantPreset> {
        PRESETS.iter().find(|p| p.name == name.to_lowercase())
    }

    #[must_use]
    pub fn all() -> &'static [VariantPreset] {
        PRESETS
    }

    #[must_use]
    pub fn names() -> Vec<&'static str> {
        PRESETS.iter().map(|p| p.name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_variants() {
        assert!(VariantPreset::from_name("kimi").is_some());
        assert!(VariantPreset::from_name("SiliconFlow").is_some()); // case-insensitive
        assert!(VariantPreset::from_name("openrouter").is_none());
    }

    #[test]
    fn test_default_variant_exists() {
        assert!(VariantPreset::from_name(DEFAULT_VARIANT).is_some());
    }

    #[test]
    fn test_only_siliconflow_summarizes_attachments() {
        for preset in VariantPreset::all() {
            assert_eq!(
                preset.summarize_attachments,
                preset.name == "siliconflow",
                "Variant {} has unexpected attachment handling",
                preset.name
            );
        }
    }

    #[test]
    fn test_kimi_sends_title_header() {
        let preset = VariantPreset::from_name("kimi").unwrap();
        assert_eq!(preset.headers, &[("X-Title", "kimi poe wrapper")]);
    }
}
