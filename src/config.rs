//! Bot configuration.
//!
//! Everything comes from the process environment (a `.env` file is loaded
//! first by `main`). The two secrets are required; the rest have defaults.

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

const DEFAULT_MISTRAL_BASE_URL: &str = "https://api.mistral.ai";
const DEFAULT_OCR_MODEL: &str = "mistral-ocr-latest";
const DEFAULT_SIGNED_URL_EXPIRY: u32 = 5;

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub bot_token: String,
    pub mistral_api_key: String,
    pub mistral_base_url: String,
    pub ocr_model: String,
    /// Expiry window requested for signed upload URLs.
    pub signed_url_expiry: u32,
    /// Submit Telegram photo URLs straight to OCR instead of re-uploading.
    /// Off unless asked for: the file URL embeds the bot token.
    pub photo_direct_url: bool,
}

impl BotConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("{} environment variable not set", key))
        };

        Ok(Self {
            bot_token: required("BOT_TOKEN")?,
            mistral_api_key: required("MISTRAL_API_KEY")?,
            mistral_base_url: lookup("MISTRAL_BASE_URL")
                .unwrap_or_else(|| DEFAULT_MISTRAL_BASE_URL.to_string()),
            ocr_model: lookup("MISTRAL_OCR_MODEL")
                .unwrap_or_else(|| DEFAULT_OCR_MODEL.to_string()),
            signed_url_expiry: parse_or(
                &lookup,
                "MISTRAL_SIGNED_URL_EXPIRY",
                DEFAULT_SIGNED_URL_EXPIRY,
            )?,
            photo_direct_url: parse_or(&lookup, "PHOTO_DIRECT_URL", false)?,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(default),
    }
}
