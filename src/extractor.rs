//! Field extraction: turns the latest user message into candidate template values.
//!
//! Two implementations sit behind [`FieldExtractor`]: [`LlmExtractor`] asks Gemini for a
//! strict JSON object, [`PatternExtractor`] runs keyword patterns and is used in demo mode.
//! Neither touches the session; the orchestrator validates and merges what they return.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    error::ExtractionError,
    gemini::GeminiClient,
    session::{Role, Turn},
    template::{normalize, FieldKind, ParameterSet, TemplateKind, NAMED_COLORS},
};

/// Field name -> raw value as the user (or model) stated it.
pub type RawFields = BTreeMap<String, String>;

pub struct ExtractionRequest<'a> {
    pub template: TemplateKind,
    pub history: &'a [Turn],
    pub current: &'a ParameterSet,
}

impl ExtractionRequest<'_> {
    fn latest_user_message(&self) -> &str {
        self.history
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.text.as_str())
            .unwrap_or_default()
    }
}

#[async_trait]
pub trait FieldExtractor: Send + Sync {
    async fn extract(&self, request: ExtractionRequest<'_>) -> Result<RawFields, ExtractionError>;
}

// --- Language model extractor ---

pub struct LlmExtractor {
    client: Arc<GeminiClient>,
    history_window: usize,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExtractionPayload {
    fields: BTreeMap<String, Option<String>>,
}

impl LlmExtractor {
    pub fn new(client: Arc<GeminiClient>, history_window: usize) -> Self {
        Self { client, history_window }
    }

    fn build_prompt(&self, request: &ExtractionRequest<'_>) -> String {
        let schema: Vec<String> = request
            .template
            .fields()
            .iter()
            .map(|f| {
                let kind = match f.kind {
                    FieldKind::Text => "short text",
                    FieldKind::Color => "color (hex, rgb() or a color name)",
                    FieldKind::Price => "price in US dollars",
                    FieldKind::ImageUrl => "absolute image URL",
                };
                let need = if f.required { "required" } else { "optional" };
                format!("- {} ({}, {}): {}", f.name, kind, need, f.label)
            })
            .collect();
        let current = serde_json::to_string(request.current).unwrap_or_else(|_| "{}".into());
        let start = request.history.len().saturating_sub(self.history_window);
        let transcript: Vec<String> = request.history[start..]
            .iter()
            .map(|t| format!("{}: {}", if t.role == Role::User { "user" } else { "assistant" }, t.text))
            .collect();

        format!(
            "You extract real estate poster details from a chat. The poster uses {template}.\n\
            Fields:\n{schema}\n\n\
            Current values: {current}\n\n\
            Conversation:\n{transcript}\n\n\
            Return a JSON object {{\"fields\": {{...}}}} holding only the fields the LAST user message \
            sets or changes, as strings, using the field names above. Omit everything else. \
            Return {{\"fields\": {{}}}} if the last message sets nothing.",
            template = request.template,
            schema = schema.join("\n"),
            transcript = transcript.join("\n"),
        )
    }
}

/// Strictly decodes the model's answer; anything off-schema is an extraction failure.
fn parse_fields(text: &str) -> Result<RawFields, ExtractionError> {
    let trimmed = text.trim();
    let body = match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.split_once('\n').map_or("", |(_, body)| body);
            rest.trim_end().trim_end_matches("```")
        }
        None => trimmed,
    };
    let payload: ExtractionPayload =
        serde_json::from_str(body).map_err(|e| ExtractionError::Decode(e.to_string()))?;
    Ok(payload
        .fields
        .into_iter()
        .filter_map(|(k, v)| v.filter(|v| !v.trim().is_empty()).map(|v| (k, v)))
        .collect())
}

#[async_trait]
impl FieldExtractor for LlmExtractor {
    async fn extract(&self, request: ExtractionRequest<'_>) -> Result<RawFields, ExtractionError> {
        let prompt = self.build_prompt(&request);
        let text = self.client.generate_json(&prompt).await?;
        let fields = parse_fields(&text).map_err(|e| {
            warn!("⚠️ Unusable extraction output: {}", e);
            e
        })?;
        info!("🧩 Model extracted {} field(s): {:?}", fields.len(), fields.keys().collect::<Vec<_>>());
        Ok(fields)
    }
}

// --- Pattern extractor ---

const URL_CHARS: &str = r#"[^\s,;"'<>()]+"#;

static SECONDARY_IMAGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:secondary|extra|additional)\s+(?:image|photo)\s*#?([1-3])\s*[:=]?\s*((?:https?://|www\.){URL_CHARS})"
    ))
    .unwrap()
});
static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(&format!(r"(?i)\b(?:https?://|www\.){URL_CHARS}")).unwrap());
static PRICE_CHANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:modify|change|update|set|make)(?:\s+the)?\s+price\s+(?:to|as|be)?\s*(\$?\s?\d[\d,.]*)").unwrap()
});
static DOLLAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\s?\d[\d,]*(?:\.\d+)?").unwrap());
static PRICE_WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:price|cost|value|asking)\b[^\d$\n]{0,20}(\d[\d,]*(?:\.\d+)?)").unwrap());
static HEADLINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)\b(headline|main\s+title|subheadline|subtitle|second\s+title)\b\s*(?:text\s*)?(?:(?:should\s+be|is|to)\b|:|=)?\s*(?:["“]([^"”]+)["”]|([^,;\n"]+?)(?:\s+and\s+|[,;\n]|$))"#,
    )
    .unwrap()
});
static ELEMENT_TEXT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)\b(for\s+sale|start\s+from|cta|button|buy\s+now|website|tagline|info\s+header|contact\s+info|contact|info)\s+text\s*(?:(?:should\s+be|is|to)\b|:|=)?\s*["“]([^"”]+)["”]"#,
    )
    .unwrap()
});
const COLOR_TOKEN: &str = r"#[0-9a-fA-F]{3}(?:[0-9a-fA-F]{3})?\b|rgb\([^)]*\)|[a-zA-Z]+";
static ELEMENT_COLOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b(price|cta|button|buy\s+now|contact(?:\s+info)?|subheadline|subtitle|for\s+sale|start\s+from|website|tagline|info\s+header|info)\s+colou?r\s*(?:(?:should\s+be|is|to)\b|:|=)?\s*({COLOR_TOKEN})"
    ))
    .unwrap()
});
static NAMED_ELEMENT_COLOR_RE: Lazy<Regex> = Lazy::new(|| {
    let names: Vec<&str> = NAMED_COLORS.iter().map(|(n, _)| *n).collect();
    Regex::new(&format!(r"(?i)\b({})\s+(price|button|buy\s+now|cta)\b", names.join("|"))).unwrap()
});
static ACCENT_BEFORE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?i)({COLOR_TOKEN})\s+(?:accent\s+)?colou?r\b")).unwrap());
static ACCENT_AFTER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\b(?:accent\s+|main\s+|brand\s+)?colou?r\s*(?:(?:should\s+be|is|to|of)\b|:|=)?\s*({COLOR_TOKEN})")).unwrap()
});

fn clean(value: &str) -> String {
    value.trim().trim_end_matches(['.', ',', '!']).trim().to_string()
}

fn element_text_field(label: &str) -> Option<&'static str> {
    let label = label.to_lowercase();
    let label = label.split_whitespace().collect::<Vec<_>>().join(" ");
    Some(match label.as_str() {
        "headline" | "main title" => "headline",
        "subheadline" | "subtitle" | "second title" => "subheadline",
        "for sale" => "for_sale_text",
        "start from" => "start_from_text",
        "cta" | "button" | "buy now" => "cta_text",
        "website" => "website_text",
        "tagline" => "tagline_text",
        "info header" => "info_header_text",
        "contact info" | "contact" => "contact_info_text",
        "info" => "info_text",
        _ => return None,
    })
}

fn element_color_field(label: &str) -> Option<&'static str> {
    let label = label.to_lowercase();
    let label = label.split_whitespace().collect::<Vec<_>>().join(" ");
    Some(match label.as_str() {
        "price" => "price_color",
        "contact" | "contact info" => "contact_color",
        "cta" | "button" | "buy now" => "cta_color",
        "subheadline" | "subtitle" => "subheadline_color",
        "for sale" => "for_sale_color",
        "start from" => "start_from_color",
        "website" => "website_color",
        "tagline" => "tagline_color",
        "info header" => "info_header_color",
        "info" => "info_color",
        _ => return None,
    })
}

/// Keyword-pattern extractor. Deterministic, no network; used when no model key is configured.
#[derive(Debug, Default)]
pub struct PatternExtractor;

impl PatternExtractor {
    pub fn extract_from(&self, text: &str) -> RawFields {
        let mut fields = RawFields::new();

        let mut secondary = Vec::new();
        for caps in SECONDARY_IMAGE_RE.captures_iter(text) {
            let url = clean(&caps[2]);
            fields.insert(format!("secondary_image_url{}", &caps[1]), url.clone());
            secondary.push(url);
        }
        if let Some(m) = URL_RE.find_iter(text).map(|m| clean(m.as_str())).find(|u| !secondary.contains(u)) {
            fields.insert("image_url".into(), m);
        }

        let price = PRICE_CHANGE_RE
            .captures(text)
            .map(|c| c[1].to_string())
            .or_else(|| DOLLAR_RE.find(text).map(|m| m.as_str().to_string()))
            .or_else(|| PRICE_WORD_RE.captures(text).map(|c| c[1].to_string()));
        if let Some(price) = price {
            fields.insert("property_price".into(), clean(&price));
        }

        for caps in HEADLINE_RE.captures_iter(text) {
            let value = caps.get(2).or_else(|| caps.get(3)).map(|m| clean(m.as_str()));
            if let (Some(field), Some(value)) = (element_text_field(&caps[1]), value) {
                // "subheadline color navy" sets a color, handled below
                let lower = value.to_lowercase();
                if !value.is_empty() && !lower.starts_with("color") && !lower.starts_with("colour") {
                    fields.insert(field.into(), value);
                }
            }
        }
        for caps in ELEMENT_TEXT_RE.captures_iter(text) {
            if let Some(field) = element_text_field(&caps[1]) {
                fields.insert(field.into(), caps[2].trim().to_string());
            }
        }

        for caps in ELEMENT_COLOR_RE.captures_iter(text) {
            if let Some(field) = element_color_field(&caps[1]) {
                fields.insert(field.into(), caps[2].to_string());
            }
        }
        for caps in NAMED_ELEMENT_COLOR_RE.captures_iter(text) {
            if let Some(field) = element_color_field(&caps[2]) {
                fields.insert(field.into(), caps[1].to_string());
            }
        }

        // element colors are claimed first so "price color red" is not read as the accent
        let rest = ELEMENT_COLOR_RE.replace_all(text, " ");
        let rest = NAMED_ELEMENT_COLOR_RE.replace_all(&rest, " ");
        let accent = ACCENT_BEFORE_RE
            .captures_iter(&rest)
            .chain(ACCENT_AFTER_RE.captures_iter(&rest))
            .map(|c| c[1].to_string())
            .find(|candidate| normalize(FieldKind::Color, candidate).is_ok());
        if let Some(accent) = accent {
            fields.insert("accent_color".into(), accent);
        }

        fields
    }
}

#[async_trait]
impl FieldExtractor for PatternExtractor {
    async fn extract(&self, request: ExtractionRequest<'_>) -> Result<RawFields, ExtractionError> {
        let fields = self.extract_from(request.latest_user_message());
        info!("🧩 Patterns matched {} field(s): {:?}", fields.len(), fields.keys().collect::<Vec<_>>());
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn fields(pairs: &[(&str, &str)]) -> RawFields {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn extracts_listing_basics() {
        let got = PatternExtractor.extract_from("poster for luxury apartment, image https://x/a.jpg, price $2,500,000");
        assert_eq!(got, fields(&[("image_url", "https://x/a.jpg"), ("property_price", "$2,500,000")]));
    }

    #[test]
    fn extracts_headline_and_accent_color() {
        let got = PatternExtractor.extract_from("headline LUXURY, gold color");
        assert_eq!(got, fields(&[("accent_color", "gold"), ("headline", "LUXURY")]));
    }

    #[test]
    fn nothing_to_extract_from_generate_request() {
        assert!(PatternExtractor.extract_from("generate it").is_empty());
    }

    #[test]
    fn element_colors_do_not_leak_into_accent() {
        let got = PatternExtractor.extract_from("price color red and the accent color should be #112233");
        assert_eq!(got.get("price_color").map(String::as_str), Some("red"));
        assert_eq!(got.get("accent_color").map(String::as_str), Some("#112233"));
    }

    #[test]
    fn per_element_colors() {
        let got = PatternExtractor.extract_from("subheadline color navy and website color #fff, info header colour: teal");
        assert_eq!(
            got,
            fields(&[("info_header_color", "teal"), ("subheadline_color", "navy"), ("website_color", "#fff")])
        );
    }

    #[test]
    fn price_change_and_quoted_texts() {
        let got = PatternExtractor.extract_from(r#"change the price to 3,100,000 and website text should be "homes.example""#);
        assert_eq!(got.get("property_price").map(String::as_str), Some("3,100,000"));
        assert_eq!(got.get("website_text").map(String::as_str), Some("homes.example"));
    }

    #[test]
    fn secondary_images_are_kept_apart_from_main_image() {
        let got = PatternExtractor
            .extract_from("main https://x/main.jpg secondary image 2 https://x/two.jpg");
        assert_eq!(got.get("image_url").map(String::as_str), Some("https://x/main.jpg"));
        assert_eq!(got.get("secondary_image_url2").map(String::as_str), Some("https://x/two.jpg"));
    }

    #[test]
    fn parses_strict_model_output() {
        let got = parse_fields("```json\n{\"fields\": {\"headline\": \"LUXURY\", \"accent_color\": null}}\n```").unwrap();
        assert_eq!(got, fields(&[("headline", "LUXURY")]));
    }

    #[test]
    fn rejects_off_schema_model_output() {
        assert!(matches!(parse_fields("Sure! The headline is LUXURY"), Err(ExtractionError::Decode(_))));
        assert!(matches!(parse_fields(r#"{"headline": "LUXURY"}"#), Err(ExtractionError::Decode(_))));
        assert!(matches!(parse_fields(r#"{"fields": {"property_price": 100}}"#), Err(ExtractionError::Decode(_))));
    }

    #[tokio::test]
    async fn llm_extractor_sends_history_and_decodes_answer() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/m:generateContent?key=k")
            .match_body(mockito::Matcher::Regex("headline LUXURY".into()))
            .with_status(200)
            .with_body(r#"{"candidates":[{"content":{"parts":[{"text":"{\"fields\":{\"headline\":\"LUXURY\"}}"}]}}]}"#)
            .create_async()
            .await;
        let client = Arc::new(GeminiClient::new("k".into(), server.url(), "m".into(), Duration::from_secs(5)));
        let extractor = LlmExtractor::new(client, 12);
        let history = vec![Turn { role: Role::User, text: "headline LUXURY".into(), at: Utc::now() }];
        let current = ParameterSet::default();

        let got = extractor
            .extract(ExtractionRequest { template: TemplateKind::ModernHome, history: &history, current: &current })
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(got, fields(&[("headline", "LUXURY")]));
    }
}
