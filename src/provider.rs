//! OpenAI-compatible chat-completions classifier.
//!
//! Works with any provider exposing `POST {base_url}/chat/completions` with
//! bearer authentication (DeepSeek, OpenAI, and API routers all do).

use crate::classifier::{Classifier, ClassifierError, ClassifyRequest, Suggestion};
use crate::config::{ProviderConfig, api_key_env_var};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

const TEMPERATURE: f32 = 0.3;
const MAX_TOKENS: u32 = 1000;
const PREVIEW_CHARS: usize = 1000;

/// Extensions whose sample is sent to the provider as text.
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "py", "js", "ts", "rs", "html", "htm", "css", "json", "yaml", "yml", "toml",
    "csv", "xml", "sh",
];

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct RawSuggestion {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    suggested_name: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Blocking HTTP classifier for one configured provider.
pub struct HttpClassifier {
    name: String,
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl HttpClassifier {
    /// Builds a classifier from the `[ai_providers.<name>]` table.
    ///
    /// Fails with [`ClassifierError::Auth`] when no API key can be resolved.
    pub fn new(name: &str, config: &ProviderConfig) -> Result<Self, ClassifierError> {
        let api_key = config.resolve_api_key(name).ok_or_else(|| {
            ClassifierError::Auth(format!(
                "no API key for '{}' (set api_key or {})",
                name,
                api_key_env_var(name)
            ))
        })?;

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ClassifierError::Transport(e.to_string()))?;

        Ok(Self {
            name: name.to_string(),
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
        })
    }
}

impl Classifier for HttpClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn classify(&self, request: &ClassifyRequest<'_>) -> Result<Suggestion, ClassifierError> {
        let prompt = build_prompt(request);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        debug!("POST {} for {}", self.endpoint, request.file_name);
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(map_status(status, message));
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| ClassifierError::MalformedResponse(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ClassifierError::MalformedResponse("no choices".to_string()))?;

        parse_suggestion(&content)
    }
}

fn map_transport_error(e: reqwest::Error) -> ClassifierError {
    if e.is_timeout() {
        ClassifierError::Timeout
    } else {
        ClassifierError::Transport(e.to_string())
    }
}

fn map_status(status: StatusCode, message: String) -> ClassifierError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClassifierError::Auth(message),
        StatusCode::TOO_MANY_REQUESTS => ClassifierError::RateLimit,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ClassifierError::Timeout,
        _ => ClassifierError::Provider {
            status: status.as_u16(),
            message: message.chars().take(200).collect(),
        },
    }
}

/// Short description of the file content for the prompt.
fn content_preview(request: &ClassifyRequest<'_>) -> String {
    match request.extension {
        Some(ext) if TEXT_EXTENSIONS.contains(&ext) => String::from_utf8_lossy(request.sample)
            .chars()
            .take(PREVIEW_CHARS)
            .collect(),
        Some("pdf") => format!("PDF file: {}", request.file_name),
        _ => match request.mime_type {
            Some(mime) => format!(
                "File: {}, Type: {}, Size: {} bytes",
                request.file_name, mime, request.size
            ),
            None => format!("File: {}, Size: {} bytes", request.file_name, request.size),
        },
    }
}

/// The prompt sent for one file.
pub fn build_prompt(request: &ClassifyRequest<'_>) -> String {
    let categories = request
        .categories
        .iter()
        .map(|c| c.dir_name())
        .collect::<Vec<_>>()
        .join(", ");
    let extension = request
        .extension
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default();

    format!(
        "You are a file organization expert. Classify the following file and suggest a \
better, more descriptive filename.

File Information:
- Original name: {name}
- File type: {extension}
- Size: {size} bytes

Content Preview:
{preview}

Choose the category from exactly this list: {categories}.
The new filename must be descriptive, concise, use underscores or hyphens instead of \
spaces, and must not include the extension.

Respond in JSON format:
{{
    \"category\": \"one of the listed categories\",
    \"suggested_name\": \"new_filename\",
    \"reason\": \"Brief explanation of why this name is better\",
    \"confidence\": 0.8
}}",
        name = request.file_name,
        extension = extension,
        size = request.size,
        preview = content_preview(request),
        categories = categories,
    )
}

/// Extracts the JSON object embedded in a model reply.
pub fn parse_suggestion(content: &str) -> Result<Suggestion, ClassifierError> {
    let start = content.find('{');
    let end = content.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &content[start..=end],
        _ => {
            return Err(ClassifierError::MalformedResponse(
                "no JSON object in reply".to_string(),
            ));
        }
    };

    let raw: RawSuggestion = serde_json::from_str(json)
        .map_err(|e| ClassifierError::MalformedResponse(e.to_string()))?;

    let suggested_name = raw
        .suggested_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ClassifierError::MalformedResponse("missing suggested_name".to_string()))?;

    Ok(Suggestion {
        category: raw.category.unwrap_or_default().trim().to_string(),
        suggested_name,
        confidence: raw.confidence.map(|c| c.clamp(0.0, 1.0) as f32),
        reason: raw.reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_category::Category;
    use std::path::Path;

    fn request<'a>(ext: Option<&'a str>, sample: &'a [u8]) -> ClassifyRequest<'a> {
        ClassifyRequest {
            path: Path::new("/tmp/scan_001.txt"),
            file_name: "scan_001.txt".to_string(),
            extension: ext,
            size: sample.len() as u64,
            sample,
            mime_type: None,
            categories: &[Category::Documents, Category::Others],
        }
    }

    #[test]
    fn test_parse_reply_with_surrounding_prose() {
        let reply = "Sure! Here you go:\n```json\n{\"category\": \"documents\", \
                     \"suggested_name\": \"tax_return_2023\", \"reason\": \"content\", \
                     \"confidence\": 1.7}\n```";
        let suggestion = parse_suggestion(reply).unwrap();
        assert_eq!(suggestion.category, "documents");
        assert_eq!(suggestion.suggested_name, "tax_return_2023");
        assert_eq!(suggestion.confidence, Some(1.0));
        assert_eq!(suggestion.reason.as_deref(), Some("content"));
    }

    #[test]
    fn test_parse_reply_without_json_is_malformed() {
        assert!(matches!(
            parse_suggestion("I cannot help with that."),
            Err(ClassifierError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_suggestion("{\"category\": \"documents\"}"),
            Err(ClassifierError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_missing_category_is_kept_empty() {
        let suggestion = parse_suggestion("{\"suggested_name\": \"x\"}").unwrap();
        assert_eq!(suggestion.category, "");
        assert_eq!(suggestion.confidence, None);
    }

    #[test]
    fn test_prompt_lists_categories_and_text_preview() {
        let prompt = build_prompt(&request(Some("txt"), b"Invoice #42 for ACME"));
        assert!(prompt.contains("documents, others"));
        assert!(prompt.contains("Invoice #42 for ACME"));
        assert!(prompt.contains("File type: .txt"));
    }

    #[test]
    fn test_prompt_hides_binary_content() {
        let prompt = build_prompt(&request(Some("jpg"), &[0xFF, 0xD8, 0xFF]));
        assert!(prompt.contains("File: scan_001.txt, Size: 3 bytes"));
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            map_status(StatusCode::UNAUTHORIZED, String::new()),
            ClassifierError::Auth(_)
        ));
        assert_eq!(
            map_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            ClassifierError::RateLimit
        );
        assert!(matches!(
            map_status(StatusCode::BAD_GATEWAY, "upstream".to_string()),
            ClassifierError::Provider { status: 502, .. }
        ));
    }

    #[test]
    fn test_missing_api_key_is_auth_error() {
        let config = ProviderConfig {
            api_key: None,
            base_url: "http://localhost:9".to_string(),
            model: "m".to_string(),
            timeout_secs: 1,
        };
        let result = HttpClassifier::new("smartsort-test-provider-without-key", &config);
        assert!(matches!(result, Err(ClassifierError::Auth(_))));
    }
}
