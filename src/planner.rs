//! Composes the assistant's replies. Pure text; every decision is made by the orchestrator.

use crate::{
    error::RenderError,
    template::{FieldSpec, ParameterSet, Rejection, TemplateKind},
};

/// How many missing fields one question asks for.
const QUESTION_BATCH: usize = 2;

pub fn welcome() -> String {
    let mut msg = String::from("👋 Welcome! I can help you create real estate posters. Templates available:\n");
    for t in TemplateKind::ALL {
        msg.push_str(&format!("📌 Template {}: {} ({})\n", t.number(), t.name(), t.description()));
    }
    msg.push_str("Say \"use template 2\" to switch at any time.");
    msg
}

fn join_labels(labels: &[&str]) -> String {
    match labels {
        [] => String::new(),
        [one] => one.to_string(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

/// One sentence per rejected value; empty when nothing was rejected.
pub fn rejection_notes(rejected: &[Rejection]) -> String {
    rejected
        .iter()
        .map(|r| format!("I couldn't use that for {}: {}. ", r.label, r.reason))
        .collect()
}

/// Clarifying question for the next missing field(s), in policy order.
pub fn ask(missing: &[&FieldSpec], generate_requested: bool) -> String {
    let mut reply = String::new();
    if generate_requested {
        reply.push_str("I can't generate the poster just yet. ");
    }
    let labels: Vec<&str> = missing.iter().take(QUESTION_BATCH).map(|f| f.label).collect();
    reply.push_str(&format!("Could you give me {}?", join_labels(&labels)));
    if missing.len() > QUESTION_BATCH {
        reply.push_str(&format!(" ({} more detail(s) after that.)", missing.len() - QUESTION_BATCH));
    }
    reply
}

fn summary(template: TemplateKind, params: &ParameterSet) -> String {
    let mut out = format!("Here's what I have for your {} poster:\n", template.name());
    for spec in template.fields() {
        if let Some(value) = params.get(spec.name) {
            out.push_str(&format!("• {}: {}\n", spec.name.replace('_', " "), value));
        }
    }
    out
}

/// Confirmation once every required field is valid.
pub fn confirm(template: TemplateKind, params: &ParameterSet) -> String {
    format!(
        "{}Say \"generate\" when you're ready, or tell me anything you'd like to change.",
        summary(template, params)
    )
}

pub fn generated(url: &str, mock: bool) -> String {
    let note = if mock { " (This is a preview since no rendering account is configured.)" } else { "" };
    format!("🎉 Your poster is ready: {url}{note}\nWould you like to change anything?")
}

pub fn already_generated(url: &str) -> String {
    format!("Your poster is still available at {url}. Tell me what to change and I'll prepare a new version.")
}

pub fn render_failed(err: &RenderError) -> String {
    format!(
        "Sorry, I couldn't generate the poster: {err}. You can adjust the details, or say \"generate\" to try again."
    )
}

pub fn retry_after_failure(last_error: Option<&str>) -> String {
    match last_error {
        Some(reason) => format!("The last attempt failed ({reason}). Say \"generate\" to try again, or change a detail first."),
        None => "Say \"generate\" to try again, or change a detail first.".to_string(),
    }
}

pub fn extraction_failed() -> String {
    "Sorry, I had trouble understanding that. Could you rephrase it?".to_string()
}

pub fn template_switched(template: TemplateKind) -> String {
    format!("Switched to {template}. I kept your photo; the other details start fresh. ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn asks_for_at_most_two_fields() {
        let fields = TemplateKind::ModernHome.fields();
        let missing: Vec<&FieldSpec> = fields.iter().filter(|f| f.required).collect();
        assert_eq!(
            ask(&missing, false),
            "Could you give me a link to a photo of the property and the asking price? (2 more detail(s) after that.)"
        );
        assert_eq!(ask(&missing[3..], false), "Could you give me the accent color?");
    }

    #[test]
    fn mentions_rejections_and_early_generate() {
        let headline = TemplateKind::ModernHome.field("headline").unwrap();
        let rejected = [Rejection { field: "property_price", label: "the asking price", reason: "\"cheap\" doesn't look like a price".into() }];
        assert_eq!(
            rejection_notes(&rejected),
            "I couldn't use that for the asking price: \"cheap\" doesn't look like a price. "
        );
        assert_eq!(rejection_notes(&[]), "");
        let reply = ask(&[headline], true);
        assert!(reply.starts_with("I can't generate the poster just yet."));
        assert!(reply.ends_with("Could you give me the headline?"));
    }

    #[test]
    fn confirmation_lists_values_in_schema_order() {
        let mut params = ParameterSet::default();
        params.merge(
            TemplateKind::ModernHome,
            &[("headline", "LUXURY"), ("image_url", "https://x/a.jpg")]
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        let reply = confirm(TemplateKind::ModernHome, &params);
        let image = reply.find("image url").unwrap();
        let headline = reply.find("headline").unwrap();
        assert!(image < headline);
        assert!(reply.contains("Say \"generate\""));
    }
}
