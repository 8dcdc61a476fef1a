//! Conversation state machine.
//!
//! Every chat turn runs the same pipeline: pick the template, extract candidate
//! values, validate and merge them, evaluate completeness, then let [`decide`] map
//! `(status, completeness, intent, changes)` to the next status and the action to take.
//! Status changes only happen through [`Session::transition`], which keeps the audit trail.

use std::{sync::Arc, time::Duration};

use tokio::time::timeout;
use tracing::{info, warn};

use crate::{
    error::{ExtractionError, RenderError},
    extractor::{ExtractionRequest, FieldExtractor, RawFields},
    intent, planner, policy,
    render::PosterRenderer,
    session::{Role, Session, Status},
    template::TemplateKind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Ask,
    Confirm,
    Render,
    RemindGenerated,
    RemindFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Decision {
    next: Status,
    action: Action,
    reason: &'static str,
}

/// Transition table. `next` is the status entered before the action runs;
/// a render then moves on to TEMPLATE_GENERATED or FAILED.
fn decide(current: Status, complete: bool, generate: bool, changed: bool) -> Decision {
    use Action::*;
    use Status::*;
    let d = |next, action, reason| Decision { next, action, reason };
    if !complete {
        return d(CollectingInfo, Ask, "required field missing or invalid");
    }
    match (current, generate, changed) {
        (TemplateGenerated, _, false) => d(TemplateGenerated, RemindGenerated, "nothing changed"),
        (Failed, false, false) => d(Failed, RemindFailed, "nothing changed"),
        (Failed, true, _) => d(ReadyToGenerate, Render, "retrying after render failure"),
        (_, true, _) => d(ReadyToGenerate, Render, "generate requested"),
        (CollectingInfo, false, _) => d(ReadyToGenerate, Confirm, "all required fields valid"),
        (_, false, _) => d(ReadyToGenerate, Confirm, "parameters changed"),
    }
}

pub struct Orchestrator {
    extractor: Arc<dyn FieldExtractor>,
    renderer: Arc<dyn PosterRenderer>,
    extract_timeout: Duration,
    render_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        extractor: Arc<dyn FieldExtractor>,
        renderer: Arc<dyn PosterRenderer>,
        extract_timeout: Duration,
        render_timeout: Duration,
    ) -> Self {
        Self { extractor, renderer, extract_timeout, render_timeout }
    }

    /// Processes one user message against the session and returns the assistant reply.
    /// The caller holds the session lock for the whole turn.
    pub async fn handle_turn(&self, session: &mut Session, prompt: &str, requested: Option<TemplateKind>) -> String {
        session.push_turn(Role::User, prompt);
        let reply = self.step(session, prompt, requested).await;
        session.push_turn(Role::Assistant, reply.clone());
        reply
    }

    async fn step(&self, session: &mut Session, prompt: &str, requested: Option<TemplateKind>) -> String {
        let from_message = if requested.is_none() { intent::template_preference(prompt) } else { None };
        let mut template = requested.or(from_message).unwrap_or(session.template);

        let raw = match self.extract(template, session).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(session = %session.id, "⚠️ Extraction failed, keeping previous parameters: {}", e);
                return planner::extraction_failed();
            }
        };

        // a template named inside a field value is poster copy, not a selection
        if from_message.is_some() && raw.values().any(|v| intent::mentions_template(v)) {
            template = session.template;
        }
        let switching = template != session.template;

        let mut params = session.parameters.clone();
        let mut reply = String::new();
        if switching {
            info!(session = %session.id, "🔁 Switching to {}", template);
            params.retain_only(&["image_url"]);
            session.template = template;
            session.transition(Status::CollectingInfo, "template switched");
            reply.push_str(&planner::template_switched(template));
        }

        let outcome = params.merge(template, &raw);
        session.parameters = params;
        let completion = policy::evaluate(template, &session.parameters);
        let generate = intent::is_generate_intent(prompt);
        let changed = switching || !outcome.changed.is_empty();

        let decision = decide(session.status(), completion.is_complete(), generate, changed);
        info!(
            session = %session.id,
            status = %session.status(),
            complete = completion.is_complete(),
            generate,
            changed,
            missing = ?completion.missing_names(),
            rejected = ?outcome.rejected.iter().map(|r| r.field).collect::<Vec<_>>(),
            "🧭 {:?}",
            decision.action
        );
        session.transition(decision.next, decision.reason);

        // rejected values are reported whatever the action
        reply.push_str(&planner::rejection_notes(&outcome.rejected));
        let text = match decision.action {
            Action::Ask => planner::ask(&completion.missing, generate),
            Action::Confirm => planner::confirm(template, &session.parameters),
            Action::Render => self.render(session).await,
            Action::RemindGenerated => planner::already_generated(session.template_url().unwrap_or_default()),
            Action::RemindFailed => planner::retry_after_failure(session.last_error.as_deref()),
        };
        reply.push_str(&text);
        reply
    }

    async fn extract(&self, template: TemplateKind, session: &Session) -> Result<RawFields, ExtractionError> {
        let request = ExtractionRequest { template, history: &session.history, current: &session.parameters };
        timeout(self.extract_timeout, self.extractor.extract(request))
            .await
            .map_err(|_| ExtractionError::Timeout(self.extract_timeout.as_secs()))?
    }

    async fn render(&self, session: &mut Session) -> String {
        let layers = session.template.layers(&session.parameters);
        let result = timeout(self.render_timeout, self.renderer.render(session.template, layers))
            .await
            .unwrap_or_else(|_| Err(RenderError::Timeout(self.render_timeout.as_secs())));
        match result {
            Ok(poster) => {
                let reply = planner::generated(&poster.url, poster.mock);
                session.mark_generated(poster.url);
                reply
            }
            Err(e) => {
                warn!(session = %session.id, code = e.code(), "❌ Render failed: {}", e);
                let reply = planner::render_failed(&e);
                session.mark_failed(e.to_string());
                reply
            }
        }
    }
}
