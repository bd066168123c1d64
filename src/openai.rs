use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use schemars::JsonSchema;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("no OpenAI API key configured (set OPENAI_API_KEY or pass --openai-api-key)")]
    MissingCredential,
    #[error("POST {endpoint}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("OpenAI API error ({status}): {message}")]
    Api {
        status: reqwest::StatusCode,
        message: String,
    },
    #[error("model refused the request: {0}")]
    Refusal(String),
    #[error("invalid OpenAI response: {0}")]
    InvalidResponse(String),
}

/// A language model call whose output must conform to a JSON schema.
#[async_trait]
pub trait StructuredCompletion: Send + Sync {
    async fn complete_structured(
        &self,
        system_prompt: &str,
        user_content: &str,
        schema: &StructuredSchema,
    ) -> Result<serde_json::Value, CompletionError>;
}

/// A named JSON schema in the shape OpenAI strict mode accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredSchema {
    pub name: String,
    pub schema: serde_json::Value,
}

impl StructuredSchema {
    /// Strict mode only accepts an object at the root, so any other `T` is an
    /// error.
    pub fn of<T: JsonSchema>() -> anyhow::Result<Self> {
        let schema = schemars::schema_for!(T);
        let mut value = serde_json::to_value(schema)
            .with_context(|| format!("serialize json schema for {}", T::schema_name()))?;

        let definitions = value
            .as_object_mut()
            .and_then(|map| {
                map.remove("$schema");
                map.remove("definitions")
            })
            .unwrap_or(serde_json::Value::Null);
        inline_refs(&mut value, &definitions);
        make_strict(&mut value);

        if value.get("type").and_then(|v| v.as_str()) != Some("object") {
            anyhow::bail!(
                "json schema for {} must have an object at the root",
                T::schema_name()
            );
        }

        Ok(Self {
            name: T::schema_name(),
            schema: value,
        })
    }
}

/// Strict mode wants every object closed, every property required and no
/// `format` hints it does not know.
fn make_strict(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            map.remove("format");
            if map.get("type").and_then(|v| v.as_str()) == Some("object") {
                map.insert(
                    "additionalProperties".to_owned(),
                    serde_json::Value::Bool(false),
                );
                if let Some(props) = map.get("properties").and_then(|v| v.as_object()) {
                    let required = props
                        .keys()
                        .map(|k| serde_json::Value::String(k.clone()))
                        .collect();
                    map.insert("required".to_owned(), serde_json::Value::Array(required));
                }
            }
            for (key, nested) in map.iter_mut() {
                // Property names live under `properties`; only their schemas recurse.
                if key == "properties" {
                    if let Some(props) = nested.as_object_mut() {
                        props.values_mut().for_each(make_strict);
                    }
                } else {
                    make_strict(nested);
                }
            }
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(make_strict),
        _ => {}
    }
}

fn inline_refs(value: &mut serde_json::Value, definitions: &serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(def) = map
                .get("$ref")
                .and_then(|v| v.as_str())
                .and_then(|r| r.strip_prefix("#/definitions/"))
                .and_then(|name| definitions.get(name))
            {
                *value = def.clone();
                inline_refs(value, definitions);
                return;
            }
            map.values_mut()
                .for_each(|nested| inline_refs(nested, definitions));
        }
        serde_json::Value::Array(items) => items
            .iter_mut()
            .for_each(|nested| inline_refs(nested, definitions)),
        _ => {}
    }
}

pub fn responses_endpoint(base_url: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    format!("{base_url}/responses")
}

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| anyhow::anyhow!("build OpenAI http client: {err}"))?;
        Ok(Self {
            client,
            endpoint: responses_endpoint(&config.base_url),
            api_key: config.api_key.filter(|key| !key.trim().is_empty()),
            model: config.model,
        })
    }
}

#[async_trait]
impl StructuredCompletion for OpenAiClient {
    async fn complete_structured(
        &self,
        system_prompt: &str,
        user_content: &str,
        schema: &StructuredSchema,
    ) -> Result<serde_json::Value, CompletionError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(CompletionError::MissingCredential)?;

        let body = serde_json::json!({
            "model": self.model,
            "instructions": system_prompt,
            "input": user_content,
            "text": {
                "format": {
                    "type": "json_schema",
                    "name": schema.name,
                    "schema": schema.schema,
                    "strict": true,
                }
            },
            "store": false,
        });

        let transport = |source| CompletionError::Transport {
            endpoint: self.endpoint.clone(),
            source,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        let raw = response.text().await.map_err(transport)?;
        if !status.is_success() {
            let message = parse_error_message(&raw).unwrap_or(raw);
            return Err(CompletionError::Api { status, message });
        }

        let value: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|err| CompletionError::InvalidResponse(format!("parse body: {err}")))?;
        let text = extract_output_text(&value)?;
        serde_json::from_str(&text).map_err(|err| {
            CompletionError::InvalidResponse(format!("output text is not JSON: {err}"))
        })
    }
}

fn parse_error_message(raw_json: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw_json).ok()?;
    let message = value.get("error")?.get("message")?.as_str()?.to_owned();
    Some(message)
}

fn extract_output_text(value: &serde_json::Value) -> Result<String, CompletionError> {
    let output = value
        .get("output")
        .and_then(|v| v.as_array())
        .ok_or_else(|| CompletionError::InvalidResponse("missing `output` array".to_owned()))?;

    let mut text = String::new();
    for item in output {
        if item.get("type").and_then(|v| v.as_str()) != Some("message") {
            continue;
        }
        let Some(content) = item.get("content").and_then(|v| v.as_array()) else {
            continue;
        };
        for part in content {
            match part.get("type").and_then(|v| v.as_str()) {
                Some("output_text") => {
                    if let Some(part_text) = part.get("text").and_then(|v| v.as_str()) {
                        text.push_str(part_text);
                    }
                }
                Some("refusal") => {
                    let reason = part
                        .get("refusal")
                        .and_then(|v| v.as_str())
                        .unwrap_or("no reason given");
                    return Err(CompletionError::Refusal(reason.to_owned()));
                }
                _ => {}
            }
        }
    }

    if text.trim().is_empty() {
        return Err(CompletionError::InvalidResponse(
            "output text is empty".to_owned(),
        ));
    }
    Ok(text)
}
