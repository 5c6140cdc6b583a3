use anyhow::{Context, Result, bail};
use elicit_core::{ConversationContext, QuestionSource, ReferencePoint, TemplateQuestionSource};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::LlmSection;

/// Reply meaning "the goal is already covered".
const SATISFIED_MARKER: &str = "SATISFIED";

/// How many earlier turns are shown to the model.
const HISTORY_TURNS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
    OpenAI,
}

impl Provider {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAI),
            "anthropic" => Ok(Provider::Anthropic),
            other => bail!("unknown llm provider {other:?} (expected openai or anthropic)"),
        }
    }

    fn default_base_url(self) -> &'static str {
        match self {
            Provider::OpenAI => "https://api.openai.com",
            Provider::Anthropic => "https://api.anthropic.com",
        }
    }
}

#[derive(Clone)]
pub struct LlmConfig {
    pub provider: Provider,
    pub model: String,
    pub base_url: String,
    pub api_key: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl LlmConfig {
    /// `Ok(None)` when the section is disabled.
    pub fn from_section(section: &LlmSection) -> Result<Option<Self>> {
        if !section.enabled {
            return Ok(None);
        }
        let provider = Provider::parse(&section.provider)?;
        let api_key = std::env::var(&section.api_key_env)
            .with_context(|| format!("llm enabled but {} is not set", section.api_key_env))?;
        Ok(Some(Self {
            provider,
            model: section.model.clone(),
            base_url: section
                .base_url
                .clone()
                .unwrap_or_else(|| provider.default_base_url().to_string()),
            api_key,
            temperature: section.temperature,
            timeout: Duration::from_secs(section.timeout_secs.max(1)),
        }))
    }
}

/// Phrases each question with a chat model. Falls back to the catalog's
/// sample questions whenever the model call fails.
#[derive(Debug)]
pub struct LlmQuestionSource {
    config: LlmConfig,
    client: reqwest::Client,
    template: TemplateQuestionSource,
}

impl LlmQuestionSource {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("build http client")?;
        Ok(Self {
            config,
            client,
            template: TemplateQuestionSource::new(),
        })
    }

    fn ask_model(&self, goal: &ReferencePoint, context: &ConversationContext) -> Result<Option<String>> {
        let system = system_prompt();
        let user = goal_prompt(goal, context);

        // The runner is inside a multi-threaded tokio runtime; the controller is sync.
        let reply = match tokio::runtime::Handle::try_current() {
            Ok(handle) => tokio::task::block_in_place(|| handle.block_on(self.complete(&system, &user)))?,
            Err(_) => {
                let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
                rt.block_on(self.complete(&system, &user))?
            }
        };

        let reply = reply.trim().trim_matches('"').trim();
        if reply.eq_ignore_ascii_case(SATISFIED_MARKER) {
            return Ok(None);
        }
        if reply.is_empty() {
            bail!("model returned an empty question");
        }
        Ok(Some(reply.to_string()))
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        match self.config.provider {
            Provider::Anthropic => self.anthropic_complete(system, user).await,
            Provider::OpenAI => self.openai_complete(system, user).await,
        }
    }

    async fn anthropic_complete(&self, system: &str, user: &str) -> Result<String> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            max_tokens: i32,
            temperature: f32,
            system: &'a str,
            messages: Vec<Msg<'a>>,
        }

        #[derive(Deserialize)]
        struct Resp {
            content: Vec<ContentBlock>,
        }

        #[derive(Deserialize)]
        struct ContentBlock {
            #[serde(rename = "type")]
            t: String,
            text: Option<String>,
        }

        let body = Req {
            model: &self.config.model,
            max_tokens: 200,
            temperature: self.config.temperature,
            system,
            messages: vec![Msg {
                role: "user",
                content: user,
            }],
        };

        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.config.api_key)?);
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let resp = self
            .client
            .post(format!("{}/v1/messages", self.config.base_url.trim_end_matches('/')))
            .headers(headers)
            .json(&body)
            .send()
            .await
            .context("anthropic request")?;

        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            bail!("anthropic error: {status} {txt}");
        }

        let out: Resp = resp.json().await.context("parse anthropic response")?;
        let text: String = out
            .content
            .into_iter()
            .filter(|b| b.t == "text")
            .filter_map(|b| b.text)
            .collect();
        Ok(text.trim().to_string())
    }

    async fn openai_complete(&self, system: &str, user: &str) -> Result<String> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
        }

        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: MsgOut,
        }

        #[derive(Deserialize)]
        struct MsgOut {
            content: Option<String>,
        }

        let body = Req {
            model: &self.config.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: system,
                },
                Msg {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.config.temperature,
        };

        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.config.base_url.trim_end_matches('/')))
            .header(AUTHORIZATION, format!("Bearer {}", self.config.api_key))
            .json(&body)
            .send()
            .await
            .context("openai request")?;

        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            bail!("openai error: {status} {txt}");
        }

        let out: Resp = resp.json().await.context("parse openai response")?;
        let content = out
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok(content.trim().to_string())
    }
}

impl QuestionSource for LlmQuestionSource {
    fn generate(&mut self, goal: &ReferencePoint, context: &ConversationContext) -> Result<Option<String>> {
        if goal.is_complete() {
            return Ok(None);
        }
        match self.ask_model(goal, context) {
            Ok(q) => {
                debug!(goal_id = %goal.id, satisfied = q.is_none(), "model question");
                Ok(q)
            }
            Err(e) => {
                warn!(goal_id = %goal.id, error = %format!("{e:#}"), "model question failed; using template");
                self.template.generate(goal, context)
            }
        }
    }
}

fn system_prompt() -> String {
    format!(
        "You are a friendly interviewer gathering information for an application. \
         Ask exactly one short, open question about the topic you are given. \
         Do not repeat questions that were already asked. \
         If the previous answers already cover the topic completely, reply with only {SATISFIED_MARKER}. \
         Reply with the question text only."
    )
}

fn goal_prompt(goal: &ReferencePoint, context: &ConversationContext) -> String {
    let mut s = format!("Topic: {}\n", goal.name);
    if !goal.description.is_empty() {
        s.push_str(&format!("What we need: {}\n", goal.description));
    }
    if let Some(example) = goal.sample_questions.first() {
        s.push_str(&format!("Example question: {example}\n"));
    }
    if let Some(previous) = goal.text().filter(|t| !t.trim().is_empty()) {
        s.push_str(&format!("Already collected on this topic: {previous}\n"));
    }

    let recent: Vec<_> = context
        .dialogue_history
        .iter()
        .rev()
        .take(HISTORY_TURNS)
        .collect();
    if !recent.is_empty() {
        s.push_str("\nRecent conversation:\n");
        for turn in recent.into_iter().rev() {
            s.push_str(&format!("Q: {}\nA: {}\n", turn.question, turn.answer));
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use elicit_core::Priority;

    #[test]
    fn provider_names_are_case_insensitive() {
        assert_eq!(Provider::parse("OpenAI").unwrap(), Provider::OpenAI);
        assert_eq!(Provider::parse(" anthropic ").unwrap(), Provider::Anthropic);
        assert!(Provider::parse("other").is_err());
    }

    #[test]
    fn disabled_section_builds_nothing() {
        let section = LlmSection::default();
        assert!(LlmConfig::from_section(&section).unwrap().is_none());
    }

    #[test]
    fn missing_key_is_reported() {
        let section = LlmSection {
            enabled: true,
            api_key_env: "ELICIT_TEST_KEY_THAT_IS_NOT_SET".into(),
            ..LlmSection::default()
        };
        let err = LlmConfig::from_section(&section).unwrap_err();
        assert!(err.to_string().contains("ELICIT_TEST_KEY_THAT_IS_NOT_SET"));
    }

    #[test]
    fn prompt_includes_goal_and_partial_answer() {
        let mut goal = ReferencePoint::new("rp_budget", "Budget", Priority::P1Important)
            .with_description("Total amount requested.");
        goal.collected_data.insert("text".into(), "around 40k".into());
        let prompt = goal_prompt(&goal, &ConversationContext::default());
        assert!(prompt.contains("Topic: Budget"));
        assert!(prompt.contains("Total amount requested."));
        assert!(prompt.contains("around 40k"));
        assert!(!prompt.contains("Recent conversation"));
    }
}
