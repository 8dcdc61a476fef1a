use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// The three poster layouts the renderer knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemplateKind {
    ModernHome,
    HouseAgent,
    BestHome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Color,
    Price,
    ImageUrl,
}

/// Which attribute of a renderer layer a field writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerAttr {
    Text,
    Color,
    ImageUrl,
}

impl LayerAttr {
    fn key(self) -> &'static str {
        match self {
            LayerAttr::Text => "text",
            LayerAttr::Color => "color",
            LayerAttr::ImageUrl => "image_url",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    /// How the field is named when asking the user for it.
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub layer: &'static str,
    pub attr: LayerAttr,
}

const fn field(
    name: &'static str,
    label: &'static str,
    kind: FieldKind,
    required: bool,
    layer: &'static str,
    attr: LayerAttr,
) -> FieldSpec {
    FieldSpec { name, label, kind, required, layer, attr }
}

use FieldKind as K;
use LayerAttr as A;

static MODERN_HOME_FIELDS: &[FieldSpec] = &[
    field("image_url", "a link to a photo of the property", K::ImageUrl, true, "image-1", A::ImageUrl),
    field("property_price", "the asking price", K::Price, true, "price", A::Text),
    field("headline", "the headline", K::Text, true, "modern", A::Text),
    field("accent_color", "the accent color", K::Color, true, "modern", A::Color),
    field("subheadline", "a subheadline", K::Text, false, "home", A::Text),
    field("subheadline_color", "the subheadline color", K::Color, false, "home", A::Color),
    field("for_sale_text", "the 'for sale' label", K::Text, false, "for sale", A::Text),
    field("for_sale_color", "the 'for sale' label color", K::Color, false, "for sale", A::Color),
    field("start_from_text", "the 'start from' label", K::Text, false, "start from", A::Text),
    field("start_from_color", "the 'start from' label color", K::Color, false, "start from", A::Color),
    field("price_color", "the price color", K::Color, false, "price", A::Color),
    field("cta_text", "the button text", K::Text, false, "button-cta", A::Text),
    field("cta_color", "the button color", K::Color, false, "button-cta", A::Color),
    field("website_text", "the website", K::Text, false, "website", A::Text),
    field("website_color", "the website color", K::Color, false, "website", A::Color),
];

static HOUSE_AGENT_FIELDS: &[FieldSpec] = &[
    field("image_url", "a link to a photo of the property", K::ImageUrl, true, "image-1", A::ImageUrl),
    field("headline", "the headline", K::Text, true, "text-1", A::Text),
    field("accent_color", "the accent color", K::Color, true, "text-1", A::Color),
    field("tagline_text", "a tagline", K::Text, false, "text-1-copy", A::Text),
    field("tagline_color", "the tagline color", K::Color, false, "text-1-copy", A::Color),
    field("info_header_text", "the information header", K::Text, false, "text-1-copy-copy", A::Text),
    field("info_header_color", "the information header color", K::Color, false, "text-1-copy-copy", A::Color),
    field("contact_info_text", "your contact details", K::Text, false, "text-1-copy-copy-copy", A::Text),
    field("contact_color", "the contact details color", K::Color, false, "text-1-copy-copy-copy", A::Color),
];

static BEST_HOME_FIELDS: &[FieldSpec] = &[
    field("image_url", "a link to the main photo of the property", K::ImageUrl, true, "image-top", A::ImageUrl),
    field("headline", "the headline", K::Text, true, "title-1", A::Text),
    field("accent_color", "the accent color", K::Color, true, "title-1", A::Color),
    field("secondary_image_url1", "a first extra photo", K::ImageUrl, false, "photo-1", A::ImageUrl),
    field("secondary_image_url2", "a second extra photo", K::ImageUrl, false, "photo-2", A::ImageUrl),
    field("secondary_image_url3", "a third extra photo", K::ImageUrl, false, "photo-3", A::ImageUrl),
    field("subheadline", "a subheadline", K::Text, false, "title-2", A::Text),
    field("subheadline_color", "the subheadline color", K::Color, false, "title-2", A::Color),
    field("cta_text", "the button text", K::Text, false, "button-cta", A::Text),
    field("info_text", "the info line", K::Text, false, "info", A::Text),
    field("info_color", "the info line color", K::Color, false, "info", A::Color),
    field("website_text", "the website", K::Text, false, "website", A::Text),
    field("website_color", "the website color", K::Color, false, "website", A::Color),
];

impl TemplateKind {
    pub const ALL: [TemplateKind; 3] = [TemplateKind::ModernHome, TemplateKind::HouseAgent, TemplateKind::BestHome];

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(TemplateKind::ModernHome),
            2 => Some(TemplateKind::HouseAgent),
            3 => Some(TemplateKind::BestHome),
            _ => None,
        }
    }

    pub fn number(self) -> u8 {
        match self {
            TemplateKind::ModernHome => 1,
            TemplateKind::HouseAgent => 2,
            TemplateKind::BestHome => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TemplateKind::ModernHome => "Modern Home",
            TemplateKind::HouseAgent => "House Agent",
            TemplateKind::BestHome => "Best Home",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            TemplateKind::ModernHome => "Classic real estate poster with modern design elements",
            TemplateKind::HouseAgent => "Professional real estate agent focused template",
            TemplateKind::BestHome => "Multi-image template with prominent call-to-action",
        }
    }

    pub fn preview_url(self) -> &'static str {
        match self {
            TemplateKind::ModernHome => "https://example.com/templates/modern_home_preview.jpg",
            TemplateKind::HouseAgent => "https://example.com/templates/house_agent_preview.jpg",
            TemplateKind::BestHome => "https://example.com/templates/best_home_preview.jpg",
        }
    }

    /// Field schema in declaration order. Missing fields are always reported in this order.
    pub fn fields(self) -> &'static [FieldSpec] {
        match self {
            TemplateKind::ModernHome => MODERN_HOME_FIELDS,
            TemplateKind::HouseAgent => HOUSE_AGENT_FIELDS,
            TemplateKind::BestHome => BEST_HOME_FIELDS,
        }
    }

    pub fn field(self, name: &str) -> Option<&'static FieldSpec> {
        self.fields().iter().find(|f| f.name == name)
    }

    /// Layer contents the renderer shows when the user leaves a field unset.
    fn default_layers(self) -> Value {
        match self {
            TemplateKind::ModernHome => json!({
                "image-1": {"image_url": ""},
                "website": {"text": "www.house4you.com", "color": "#FFFFFF"},
                "modern": {"text": "MODERN", "color": "rgb(171, 102, 49)"},
                "home": {"text": "HOME", "color": "rgb(59, 59, 59)"},
                "for sale": {"text": "FOR SALE", "color": "rgb(59, 59, 59)"},
                "start from": {"text": "START FROM", "color": "rgb(59, 59, 59)"},
                "price": {"text": "$0", "color": "rgb(59, 59, 59)"},
                "button-cta": {"text": "BUY NOW", "color": "rgb(228, 228, 222)"}
            }),
            TemplateKind::HouseAgent => json!({
                "image-1": {"image_url": ""},
                "text-1": {"text": "HOUSE AGENT", "color": "#FFFFFF"},
                "text-1-copy": {"text": "modern | beautiful | technology", "color": "#FFFFFF"},
                "text-1-copy-copy": {"text": "FOR MORE INFORMATION", "color": "rgb(105, 99, 65)"},
                "text-1-copy-copy-copy": {"text": "+123 456 7890 | www.lovehouse.com", "color": "rgb(105, 99, 65)"}
            }),
            TemplateKind::BestHome => json!({
                "image-top": {"image_url": ""},
                "photo-1": {"image_url": ""},
                "photo-2": {"image_url": ""},
                "photo-3": {"image_url": ""},
                "title-1": {"text": "THE BEST HOME", "color": "rgb(239, 233, 226)"},
                "title-2": {"text": "FOR SALE", "color": "rgb(239, 233, 226)"},
                "button-cta": {"text": "I WANT", "color": "rgb(255, 255, 255)"},
                "info": {"text": "For more info, contact us", "color": "rgb(126, 103, 76)"},
                "website": {"text": "www.housesforyou.com", "color": "rgb(0, 0, 0)"}
            }),
        }
    }

    /// Maps a parameter set onto the renderer's editable layer identifiers.
    pub fn layers(self, params: &ParameterSet) -> Map<String, Value> {
        let mut layers = match self.default_layers() {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for spec in self.fields() {
            if let Some(value) = params.get(spec.name) {
                if let Some(Value::Object(layer)) = layers.get_mut(spec.layer) {
                    layer.insert(spec.attr.key().to_string(), Value::String(value.to_string()));
                }
            }
        }
        if self == TemplateKind::BestHome {
            // extra photos fall back to the main image
            let main = params.get("image_url").unwrap_or_default().to_string();
            for photo in ["photo-1", "photo-2", "photo-3"] {
                if let Some(Value::Object(layer)) = layers.get_mut(photo) {
                    let empty = layer.get("image_url").and_then(Value::as_str).map_or(true, str::is_empty);
                    if empty {
                        layer.insert("image_url".into(), Value::String(main.clone()));
                    }
                }
            }
        }
        layers
    }
}

impl Default for TemplateKind {
    fn default() -> Self {
        TemplateKind::ModernHome
    }
}

impl std::fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Template {} ({})", self.number(), self.name())
    }
}

// --- Validation ---

static PRICE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\$?\s*(\d{1,3}(?:,\d{3})+|\d+)(?:\.(\d{1,2}))?$").unwrap());
static HEX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#(?:[0-9a-fA-F]{3}|[0-9a-fA-F]{6})$").unwrap());
static RGB_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^rgb\(\s*(\d{1,3})\s*,\s*(\d{1,3})\s*,\s*(\d{1,3})\s*\)$").unwrap());

const MAX_TEXT_LEN: usize = 80;

pub const NAMED_COLORS: &[(&str, &str)] = &[
    ("gold", "#FFD700"),
    ("yellow", "#FFD700"),
    ("red", "#FF0000"),
    ("blue", "#0000FF"),
    ("green", "#00FF00"),
    ("black", "#000000"),
    ("white", "#FFFFFF"),
    ("purple", "#800080"),
    ("orange", "#FFA500"),
    ("pink", "#FFC0CB"),
    ("brown", "#A52A2A"),
    ("gray", "#808080"),
    ("grey", "#808080"),
    ("navy", "#000080"),
    ("teal", "#008080"),
    ("silver", "#C0C0C0"),
    ("beige", "#F5F5DC"),
];

/// Checks a raw value against a field kind and returns its normalized form.
pub fn normalize(kind: FieldKind, raw: &str) -> Result<String, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("it was empty".into());
    }
    match kind {
        FieldKind::Text => {
            if raw.chars().count() > MAX_TEXT_LEN {
                Err(format!("it is longer than {MAX_TEXT_LEN} characters"))
            } else {
                Ok(raw.to_string())
            }
        }
        FieldKind::Price => normalize_price(raw),
        FieldKind::Color => normalize_color(raw),
        FieldKind::ImageUrl => normalize_url(raw),
    }
}

fn normalize_price(raw: &str) -> Result<String, String> {
    let caps = PRICE_RE.captures(raw).ok_or_else(|| format!("\"{raw}\" doesn't look like a price"))?;
    let dollars: u64 = caps[1]
        .replace(',', "")
        .parse()
        .map_err(|_| format!("\"{raw}\" is too large"))?;
    if dollars == 0 {
        return Err("the price can't be zero".into());
    }
    Ok(format!("${}", group_thousands(dollars)))
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn normalize_color(raw: &str) -> Result<String, String> {
    if HEX_RE.is_match(raw) {
        return Ok(raw.to_uppercase());
    }
    if let Some(caps) = RGB_RE.captures(&raw.to_lowercase()) {
        let parts: Vec<u16> = (1..=3).filter_map(|i| caps[i].parse().ok()).collect();
        if parts.len() == 3 && parts.iter().all(|c| *c <= 255) {
            return Ok(format!("rgb({}, {}, {})", parts[0], parts[1], parts[2]));
        }
        return Err(format!("\"{raw}\" has a component above 255"));
    }
    let lower = raw.to_lowercase();
    NAMED_COLORS
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, hex)| hex.to_string())
        .ok_or_else(|| format!("I don't know the color \"{raw}\""))
}

fn normalize_url(raw: &str) -> Result<String, String> {
    let candidate = if raw.to_lowercase().starts_with("www.") { format!("https://{raw}") } else { raw.to_string() };
    let url = Url::parse(&candidate).map_err(|_| format!("\"{raw}\" isn't a valid link"))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().map_or(true, str::is_empty) {
        return Err(format!("\"{raw}\" isn't a web link"));
    }
    Ok(url.to_string())
}

// --- Parameter set ---

/// Normalized field values collected so far for the session's template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParameterSet {
    values: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub field: &'static str,
    pub label: &'static str,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Fields whose stored value was added, replaced or removed.
    pub changed: Vec<&'static str>,
    pub rejected: Vec<Rejection>,
}

impl ParameterSet {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Validates raw candidates against the template schema and folds them in.
    /// Unknown names are dropped; a malformed value clears the field so it is asked for again.
    pub fn merge(&mut self, template: TemplateKind, raw: &BTreeMap<String, String>) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        for (name, value) in raw {
            let Some(spec) = template.field(name) else {
                tracing::debug!("Dropping unknown field '{}' for {}", name, template);
                continue;
            };
            match normalize(spec.kind, value) {
                Ok(normalized) => {
                    if self.values.get(spec.name) != Some(&normalized) {
                        self.values.insert(spec.name.to_string(), normalized);
                        outcome.changed.push(spec.name);
                    }
                }
                Err(reason) => {
                    if self.values.remove(spec.name).is_some() {
                        outcome.changed.push(spec.name);
                    }
                    outcome.rejected.push(Rejection { field: spec.name, label: spec.label, reason });
                }
            }
        }
        outcome
    }

    /// Keeps only the fields listed, used when switching templates.
    pub fn retain_only(&mut self, keep: &[&str]) {
        self.values.retain(|k, _| keep.contains(&k.as_str()));
    }
}
