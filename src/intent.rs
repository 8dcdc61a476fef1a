//! Keyword recognition for the two signals that steer the conversation
//! regardless of which extractor is running: "render it now" and "switch template".

use once_cell::sync::Lazy;
use regex::Regex;

use crate::template::TemplateKind;

static GENERATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        \b(?:re)?generate\b
        | \b(?:create|produce)\s+(?:it|that|this|the\s+poster|my\s+poster|the\s+template)\b
        | \brender\b
        | \bgo\s+ahead\b
        | \blet'?s\s+(?:do|see)\s+it\b",
    )
    .unwrap()
});

static TEMPLATE_NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\btemplate\s*(?:number|no\.?|#)?\s*(\d)\b").unwrap());
// a bare name is often poster copy ("THE BEST HOME"), so names only count after a selection verb
static TEMPLATE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:use|using|select|choose|pick|prefer|try|switch\s+to|change\s+to|go\s+with)\s+(?:the\s+)?(modern\s+home|house\s+agent|best\s+home)\b",
    )
    .unwrap()
});
static TEMPLATE_MENTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\btemplate\s*(?:number|no\.?|#)?\s*\d\b|\b(?:modern\s+home|house\s+agent|best\s+home)\b").unwrap());

/// True when the message explicitly asks for the poster to be rendered.
pub fn is_generate_intent(message: &str) -> bool {
    GENERATE_RE.is_match(message)
}

/// The template the user asks for by number ("use template 2") or by name ("try best home"), if any.
pub fn template_preference(message: &str) -> Option<TemplateKind> {
    if let Some(caps) = TEMPLATE_NUMBER_RE.captures(message) {
        return caps[1].parse::<u8>().ok().and_then(TemplateKind::from_number);
    }
    let caps = TEMPLATE_NAME_RE.captures(message)?;
    let name = caps[1].to_lowercase();
    if name.starts_with("modern") {
        Some(TemplateKind::ModernHome)
    } else if name.starts_with("house") {
        Some(TemplateKind::HouseAgent)
    } else {
        Some(TemplateKind::BestHome)
    }
}

/// True when `text` names a template at all, selected or not.
pub fn mentions_template(text: &str) -> bool {
    TEMPLATE_MENTION_RE.is_match(text)
}
