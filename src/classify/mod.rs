// src/classify/mod.rs
//! Content enrichment through an external LLM classification call.
//!
//! Every item gets categories, an importance score, keywords, and a short
//! summary. The call is best-effort: a missing credential, a failed
//! request, or an unparseable reply all degrade to deterministic fallback
//! values, so the pipeline always yields a fully-populated item.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::collect::types::CollectedItem;
use crate::config::ClassifierConfig;
use crate::util::truncate_text;

/// Closed set of allowed category labels.
pub const CATEGORY_VOCABULARY: [&str; 10] = [
    "Research",
    "Applications",
    "Business",
    "Ethics",
    "Policy",
    "Tools",
    "Tutorials",
    "Hardware",
    "Theory",
    "Community",
];

const FALLBACK_CATEGORY: &str = "Applications";
const FALLBACK_KEYWORDS: [&str; 2] = ["artificial intelligence", "technology"];
const MAX_CATEGORIES: usize = 3;
const MAX_KEYWORDS: usize = 5;
const SUMMARY_MAX_CHARS: usize = 150;
const PROMPT_BODY_MAX_CHARS: usize = 4_000;

const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const ENV_API_KEY: &str = "ANTHROPIC_API_KEY";

/// Enrichment fields produced for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub categories: Vec<String>,
    pub importance_score: i64,
    pub keywords: Vec<String>,
    pub summary: String,
}

/// Low-level completion client. Returns the raw reply text, or `None` on
/// any failure; parsing and validation happen in [`Classifier`].
#[async_trait]
pub trait ClassifierClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Option<String>;
    fn provider_name(&self) -> &'static str;
}

pub type DynClassifierClient = Arc<dyn ClassifierClient>;

/// Always `None`; used when no credential is configured or classification
/// is disabled.
pub struct DisabledClient;

#[async_trait]
impl ClassifierClient for DisabledClient {
    async fn complete(&self, _prompt: &str) -> Option<String> {
        None
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Anthropic Messages API client. Requires `ANTHROPIC_API_KEY`.
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    cooldown: Duration,
}

impl AnthropicClient {
    pub fn new(api_key: String, model: String, cooldown: Duration) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key,
            model,
            cooldown,
        }
    }
}

#[async_trait]
impl ClassifierClient for AnthropicClient {
    async fn complete(&self, prompt: &str) -> Option<String> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            max_tokens: u32,
            temperature: f32,
            system: &'a str,
            messages: Vec<Msg<'a>>,
        }
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            content: Vec<ContentBlock>,
        }
        #[derive(Deserialize)]
        struct ContentBlock {
            #[serde(default)]
            text: String,
        }

        let req = Req {
            model: &self.model,
            max_tokens: 800,
            temperature: 0.1,
            system: "You are an expert AI researcher and analyst. \
                     Provide structured analysis in valid JSON format only.",
            messages: vec![Msg {
                role: "user",
                content: prompt,
            }],
        };

        let resp = match self
            .http
            .post(ANTHROPIC_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&req)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "classification request failed");
                return None;
            }
        };

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!(
                cooldown_secs = self.cooldown.as_secs(),
                "classification rate limited, cooling down"
            );
            counter!("classify_rate_limited_total").increment(1);
            tokio::time::sleep(self.cooldown).await;
            return None;
        }
        if !resp.status().is_success() {
            tracing::warn!(status = %resp.status(), "classification call rejected");
            return None;
        }

        let body: Resp = resp.json().await.ok()?;
        let text = body.content.first().map(|c| c.text.trim().to_string())?;
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    fn provider_name(&self) -> &'static str {
        "anthropic"
    }
}

/// Build a client from config and environment. Missing credential means a
/// disabled client, never an error.
pub fn build_client(config: &ClassifierConfig) -> DynClassifierClient {
    if !config.enabled {
        return Arc::new(DisabledClient);
    }
    match std::env::var(ENV_API_KEY).ok().filter(|k| !k.is_empty()) {
        Some(key) => Arc::new(AnthropicClient::new(
            key,
            config.model.clone(),
            Duration::from_secs(config.cooldown_secs),
        )),
        None => {
            tracing::warn!("{ENV_API_KEY} not set, classification disabled");
            Arc::new(DisabledClient)
        }
    }
}

/// Reply shape requested from the model.
#[derive(Debug, Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    categories: Vec<serde_json::Value>,
    importance_score: Option<serde_json::Value>,
    #[serde(default)]
    keywords: Vec<serde_json::Value>,
    suggested_short_summary: Option<String>,
}

pub struct Classifier {
    client: DynClassifierClient,
    batch_size: usize,
    stagger: Duration,
    pause: Duration,
}

impl Classifier {
    pub fn new(client: DynClassifierClient, config: &ClassifierConfig) -> Self {
        Self {
            client,
            batch_size: config.batch_size.max(1),
            stagger: Duration::from_millis(config.stagger_ms),
            pause: Duration::from_millis(config.pause_ms),
        }
    }

    /// Classify one item. Never fails: any problem along the way produces
    /// the deterministic fallback instead.
    pub async fn classify(&self, item: &CollectedItem) -> Classification {
        let text = item.analyzable_text();
        let prompt = build_prompt(item.title(), text);

        if let Some(reply) = self.client.complete(&prompt).await {
            if let Some(classification) = parse_reply(&reply, text) {
                return classification;
            }
            tracing::warn!(item = item.title(), "unparseable classification reply");
        }

        counter!("classify_fallback_total").increment(1);
        fallback(text)
    }

    /// Classify a list in fixed-size batches. Items inside a batch start
    /// with staggered offsets; batches are separated by a pause. Both keep
    /// the request rate under upstream ceilings.
    pub async fn batch_classify(
        &self,
        items: Vec<CollectedItem>,
    ) -> Vec<(CollectedItem, Classification)> {
        let total = items.len();
        tracing::info!(total, provider = self.client.provider_name(), "classifying items");

        let mut out = Vec::with_capacity(total);
        let mut batches = items.into_iter().peekable();
        while batches.peek().is_some() {
            let batch: Vec<CollectedItem> = batches.by_ref().take(self.batch_size).collect();
            let tasks = batch.into_iter().enumerate().map(|(i, item)| async move {
                tokio::time::sleep(self.stagger * i as u32).await;
                let classification = self.classify(&item).await;
                (item, classification)
            });
            out.extend(futures::future::join_all(tasks).await);

            if batches.peek().is_some() {
                tokio::time::sleep(self.pause).await;
            }
        }

        tracing::info!(processed = out.len(), "classification pass finished");
        out
    }
}

fn build_prompt(title: &str, body: &str) -> String {
    let body: String = body.chars().take(PROMPT_BODY_MAX_CHARS).collect();
    format!(
        r#"Analyze this AI-related content:
Title: {title}
Content: {body}

Provide your analysis in a VALID JSON format with the following fields:
1. "categories": A list of 1-3 relevant topic categories from this specific list: [Research, Applications, Business, Ethics, Policy, Tools, Tutorials, Hardware, Theory, Community].
2. "importance_score": An integer from 1 (low) to 10 (high) assessing relevance for someone tracking general AI developments.
3. "keywords": A list of 3-5 relevant keywords or keyphrases.
4. "suggested_short_summary": A very concise one-sentence summary (max 100 characters).

JSON response should look like:
{{"categories": ["Research"], "importance_score": 8, "keywords": ["transformers"], "suggested_short_summary": "A new paper explores transformer efficiency."}}"#
    )
}

/// Permissive reply parse: take the first well-formed JSON object in the
/// text and validate every field against the contract. `None` means the
/// caller should fall back.
fn parse_reply(reply: &str, source_text: &str) -> Option<Classification> {
    static RE_JSON: OnceCell<Regex> = OnceCell::new();
    let re = RE_JSON.get_or_init(|| Regex::new(r"(?s)\{.*\}").unwrap());
    let json = re.find(reply)?.as_str();
    let raw: RawAnalysis = serde_json::from_str(json).ok()?;

    let summary = raw
        .suggested_short_summary
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| fallback_summary(source_text));

    Some(Classification {
        categories: validate_categories(&raw.categories),
        importance_score: validate_score(raw.importance_score.as_ref()),
        keywords: validate_keywords(&raw.keywords),
        summary,
    })
}

/// Drop entries outside the controlled vocabulary, cap at three, and fall
/// back to the default category when nothing valid remains.
fn validate_categories(raw: &[serde_json::Value]) -> Vec<String> {
    let valid: Vec<String> = raw
        .iter()
        .filter_map(|v| v.as_str())
        .filter(|s| CATEGORY_VOCABULARY.contains(s))
        .map(String::from)
        .take(MAX_CATEGORIES)
        .collect();
    if valid.is_empty() {
        vec![FALLBACK_CATEGORY.to_string()]
    } else {
        valid
    }
}

fn validate_score(raw: Option<&serde_json::Value>) -> i64 {
    let parsed = raw.and_then(|v| {
        v.as_i64()
            .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
    });
    match parsed {
        Some(score) => score.clamp(1, 10),
        None => 5,
    }
}

fn validate_keywords(raw: &[serde_json::Value]) -> Vec<String> {
    let keywords: Vec<String> = raw
        .iter()
        .filter_map(|v| v.as_str())
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .take(MAX_KEYWORDS)
        .collect();
    if keywords.is_empty() {
        FALLBACK_KEYWORDS.map(String::from).to_vec()
    } else {
        keywords
    }
}

fn fallback_summary(source_text: &str) -> String {
    truncate_text(source_text, SUMMARY_MAX_CHARS)
}

/// Deterministic defaults used whenever the external call cannot help.
pub fn fallback(source_text: &str) -> Classification {
    Classification {
        categories: vec![FALLBACK_CATEGORY.to_string()],
        importance_score: 5,
        keywords: FALLBACK_KEYWORDS.map(String::from).to_vec(),
        summary: fallback_summary(source_text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reply_embedded_in_prose() {
        let reply = r#"Here is my analysis:
            {"categories": ["Research", "Theory"], "importance_score": 8,
             "keywords": ["Sparse Attention", "LLM"],
             "suggested_short_summary": "Sparse attention revisited."}
            Hope that helps!"#;
        let c = parse_reply(reply, "fallback text").unwrap();
        assert_eq!(c.categories, vec!["Research", "Theory"]);
        assert_eq!(c.importance_score, 8);
        assert_eq!(c.keywords, vec!["sparse attention", "llm"]);
        assert_eq!(c.summary, "Sparse attention revisited.");
    }

    #[test]
    fn invalid_categories_are_dropped_and_capped() {
        let raw = vec![
            serde_json::json!("Research"),
            serde_json::json!("Astrology"),
            serde_json::json!("Tools"),
            serde_json::json!("Policy"),
            serde_json::json!("Theory"),
        ];
        assert_eq!(validate_categories(&raw), vec!["Research", "Tools", "Policy"]);
    }

    #[test]
    fn all_invalid_categories_fall_back_to_default() {
        let raw = vec![serde_json::json!("Astrology"), serde_json::json!(42)];
        assert_eq!(validate_categories(&raw), vec!["Applications"]);
    }

    #[test]
    fn score_is_clamped_and_defaulted() {
        assert_eq!(validate_score(Some(&serde_json::json!(15))), 10);
        assert_eq!(validate_score(Some(&serde_json::json!(0))), 1);
        assert_eq!(validate_score(Some(&serde_json::json!("7"))), 7);
        assert_eq!(validate_score(Some(&serde_json::json!("high"))), 5);
        assert_eq!(validate_score(None), 5);
    }

    #[test]
    fn keywords_are_lowercased_and_capped() {
        let raw: Vec<serde_json::Value> = ["A", "B", "C", "D", "E", "F"]
            .iter()
            .map(|s| serde_json::json!(s))
            .collect();
        let out = validate_keywords(&raw);
        assert_eq!(out.len(), 5);
        assert_eq!(out[0], "a");
    }

    #[test]
    fn unparseable_reply_yields_none() {
        assert!(parse_reply("no json here", "text").is_none());
        assert!(parse_reply("{not valid json}", "text").is_none());
    }

    #[test]
    fn fallback_is_deterministic() {
        let a = fallback("A long enough piece of analyzable text.");
        let b = fallback("A long enough piece of analyzable text.");
        assert_eq!(a, b);
        assert_eq!(a.categories, vec!["Applications"]);
        assert_eq!(a.importance_score, 5);
        assert_eq!(a.keywords, vec!["artificial intelligence", "technology"]);
        assert_eq!(a.summary, "A long enough piece of analyzable text.");
    }
}
