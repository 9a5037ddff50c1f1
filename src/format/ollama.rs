//! Ollama-backed transcript formatter
//!
//! Talks to a local Ollama server over its REST API. The API is blocking
//! (ureq), so chat calls run inside spawn_blocking.

use super::TextFormatter;
use crate::config::FormatterConfig;
use crate::error::FormatError;
use std::time::Duration;

/// Built-in prompt used when no prompt_file is configured. Asks the model
/// to clean up dictated text and output only the result.
pub const DEFAULT_PROMPT: &str = "音声認識テキストを自然な書き言葉に整形してください。\
フィラーを除去し、句読点を追加してください。\
整形結果のみを出力してください。\n\n入力テキスト:\n{text}";

/// Formatter backed by a local Ollama server
pub struct OllamaFormatter {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
    prompt_template: String,
}

impl OllamaFormatter {
    /// Create a formatter from configuration, loading the prompt template
    pub fn new(config: &FormatterConfig) -> Self {
        let prompt_template = match config.resolve_prompt_file() {
            Some(path) => match std::fs::read_to_string(&path) {
                Ok(contents) => {
                    tracing::debug!("Loaded prompt template from {:?}", path);
                    contents
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to read prompt file {:?} ({}), using built-in prompt",
                        path,
                        e
                    );
                    DEFAULT_PROMPT.to_string()
                }
            },
            None => DEFAULT_PROMPT.to_string(),
        };

        // The agent timeout bounds the blocking worker; the bounded wait in
        // FormattingStage is what the session actually waits on.
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();

        Self {
            agent,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            prompt_template,
        }
    }
}

#[async_trait::async_trait]
impl TextFormatter for OllamaFormatter {
    async fn format(&self, text: &str) -> Result<String, FormatError> {
        let agent = self.agent.clone();
        let url = format!("{}/api/chat", self.endpoint);
        let model = self.model.clone();
        let prompt = render_prompt(&self.prompt_template, text);

        tracing::debug!("Formatting {} chars with model {}", text.chars().count(), model);

        let reply = tokio::task::spawn_blocking(move || chat(&agent, &url, &model, &prompt))
            .await
            .map_err(|e| FormatError::Response(format!("format worker failed: {}", e)))??;

        Ok(reply)
    }

    fn available(&self) -> bool {
        let url = format!("{}/api/tags", self.endpoint);
        // Short probe timeout, independent of the chat timeout
        let probe = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(2))
            .build();
        probe.get(&url).call().is_ok()
    }
}

/// Blocking chat completion against the Ollama API
fn chat(agent: &ureq::Agent, url: &str, model: &str, prompt: &str) -> Result<String, FormatError> {
    let body = serde_json::json!({
        "model": model,
        "messages": [{ "role": "user", "content": prompt }],
        "stream": false,
        "options": {
            "temperature": 0.3,
            "num_predict": 1024,
        },
    });

    let response = agent.post(url).send_json(body).map_err(map_ureq_error)?;

    let json: serde_json::Value = response
        .into_json()
        .map_err(|e| FormatError::Response(e.to_string()))?;

    let content = json["message"]["content"]
        .as_str()
        .ok_or_else(|| FormatError::Response("missing message.content".to_string()))?;

    Ok(content.to_string())
}

fn map_ureq_error(e: ureq::Error) -> FormatError {
    match e {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            FormatError::Api(code, body.chars().take(200).collect())
        }
        ureq::Error::Transport(t) => FormatError::Unreachable(t.to_string()),
    }
}

/// Render the prompt template with the transcript.
/// Templates without the {text} placeholder get the transcript appended.
fn render_prompt(template: &str, text: &str) -> String {
    if template.contains("{text}") {
        template.replace("{text}", text)
    } else {
        format!("{}\n\n{}", template.trim_end(), text)
    }
}
