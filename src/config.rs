use std::{collections::HashMap, str::FromStr, time::Duration};

use crate::{error::ConfigError, template::TemplateKind};

pub const DEMO_KEY: &str = "DEMO_KEY";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub gemini_api_key: String,
    pub gemini_api_base: String,
    pub gemini_model: String,
    pub templated_api_key: Option<String>,
    pub templated_api_base: String,
    pub template_ids: HashMap<TemplateKind, String>,
    pub extractor_timeout: Duration,
    pub render_timeout: Duration,
    pub history_window: usize,
}

impl Config {
    /// Reads configuration from the process environment (after `.env` has been loaded).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| get(key).filter(|v| !v.trim().is_empty());
        let template_ids = TemplateKind::ALL
            .into_iter()
            .filter_map(|t| non_empty(&format!("TEMPLATED_TEMPLATE_ID{}", t.number())).map(|id| (t, id)))
            .collect();

        Ok(Self {
            port: parse_or(&get, "PORT", 8080)?,
            gemini_api_key: non_empty("GEMINI_API_KEY").unwrap_or_else(|| DEMO_KEY.into()),
            gemini_api_base: non_empty("GEMINI_API_BASE")
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".into()),
            gemini_model: non_empty("GEMINI_MODEL").unwrap_or_else(|| "gemini-1.5-flash".into()),
            templated_api_key: non_empty("TEMPLATED_API_KEY"),
            templated_api_base: non_empty("TEMPLATED_API_BASE").unwrap_or_else(|| "https://api.templated.io/v1".into()),
            template_ids,
            extractor_timeout: Duration::from_secs(parse_or(&get, "EXTRACTOR_TIMEOUT_SECS", 20)?),
            render_timeout: Duration::from_secs(parse_or(&get, "RENDER_TIMEOUT_SECS", 30)?),
            history_window: parse_or(&get, "HISTORY_WINDOW", 12)?,
        })
    }

    pub fn demo_extraction(&self) -> bool {
        self.gemini_api_key == DEMO_KEY
    }
}

fn parse_or<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError> {
    match get(key) {
        Some(value) if !value.trim().is_empty() => {
            value.trim().parse().map_err(|_| ConfigError::InvalidValue { key, value })
        }
        _ => Ok(default),
    }
}
