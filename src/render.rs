use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{error, info, warn};

use crate::{error::RenderError, template::TemplateKind};

const PLACEHOLDER_KEY: &str = "your_templated_api_key_here";
const PLACEHOLDER_TEMPLATE: &str = "your_template_id_here";
pub const MOCK_POSTER_URL: &str = "https://example.com/poster-preview.jpg";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPoster {
    pub url: String,
    /// True when no rendering account is configured and a preview URL was returned instead.
    pub mock: bool,
}

/// The external service that turns filled layers into an image.
#[async_trait]
pub trait PosterRenderer: Send + Sync {
    async fn render(&self, template: TemplateKind, layers: Map<String, Value>) -> Result<RenderedPoster, RenderError>;
}

/// Templated.io render API client.
pub struct TemplatedClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    template_ids: HashMap<TemplateKind, String>,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct RenderResponse {
    #[serde(default)]
    url: Option<String>,
}

impl TemplatedClient {
    pub fn new(
        api_key: Option<String>,
        base_url: String,
        template_ids: HashMap<TemplateKind, String>,
        timeout: Duration,
    ) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_else(|_| Client::new());
        Self { client, api_key, base_url, template_ids, timeout }
    }

    fn is_demo(&self, template_id: Option<&String>) -> bool {
        let key_missing = self.api_key.as_deref().map_or(true, |k| k.is_empty() || k == PLACEHOLDER_KEY);
        key_missing || template_id.map_or(false, |id| id == PLACEHOLDER_TEMPLATE)
    }
}

#[async_trait]
impl PosterRenderer for TemplatedClient {
    async fn render(&self, template: TemplateKind, layers: Map<String, Value>) -> Result<RenderedPoster, RenderError> {
        let template_id = self.template_ids.get(&template);
        if self.is_demo(template_id) {
            warn!("⚠️ Using development mode with placeholder Templated.io credentials");
            return Ok(RenderedPoster { url: MOCK_POSTER_URL.to_string(), mock: true });
        }
        let (Some(api_key), Some(template_id)) = (self.api_key.as_deref(), template_id) else {
            return Err(RenderError::NotConfigured(format!("no template id for {}", template)));
        };

        let url = format!("{}/render", self.base_url);
        info!("🎨 Rendering {} (template id {}) via {}", template, template_id, url);

        let response = self.client
            .post(&url)
            .bearer_auth(api_key)
            .json(&json!({ "template": template_id, "layers": layers }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RenderError::Timeout(self.timeout.as_secs())
                } else {
                    RenderError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| RenderError::Http(e.to_string()))?;
        info!("📥 Render response status: {}", status);

        if status.is_client_error() {
            error!("❌ Render request rejected: {}", body);
            return Err(RenderError::Rejected { status: status.as_u16(), reason: body });
        }
        if !status.is_success() {
            error!("❌ Render service error {}: {}", status, body);
            return Err(RenderError::Service { status: status.as_u16() });
        }

        let parsed: RenderResponse = serde_json::from_str(&body).map_err(|_| RenderError::MissingUrl)?;
        match parsed.url.filter(|u| !u.is_empty()) {
            Some(url) => {
                info!("✅ Poster rendered: {}", url);
                Ok(RenderedPoster { url, mock: false })
            }
            None => Err(RenderError::MissingUrl),
        }
    }
}
