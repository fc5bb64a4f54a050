use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::AppConfig;
use crate::ingest::{validate_categories, ValidationError};
use crate::models::{
    category_name, Coordinates, DayHours, ExtractedEvent, StoreType, MAX_CATEGORY_ID,
};
use crate::retry::Retryable;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("extractor unavailable: {0}")]
    Unavailable(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed extractor response: {0}")]
    Malformed(String),
    #[error("extractor refused listing: {0}")]
    Refused(String),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

impl Retryable for ExtractionError {
    fn is_retryable(&self) -> bool {
        match self {
            ExtractionError::Unavailable(_) | ExtractionError::Malformed(_) => true,
            ExtractionError::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
            }
            ExtractionError::Refused(_) | ExtractionError::Invalid(_) => false,
        }
    }
}

/// Turns a scraped page into structured event fields.
#[async_trait]
pub trait EventExtractor: Send + Sync {
    async fn extract(
        &self,
        markdown: &str,
        source_url: &str,
    ) -> Result<ExtractedEvent, ExtractionError>;
}

const MAX_MARKDOWN_CHARS: usize = 12_000;

/// OpenAI-compatible chat-completions extractor.
pub struct LlmExtractor {
    model: String,
    base_url: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: u32,
    client: Client,
}

impl LlmExtractor {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.llm_model.clone(),
            base_url: config.llm_endpoint.clone(),
            api_key: config.llm_api_key.clone(),
            temperature: config.llm_temperature,
            max_tokens: config.llm_max_tokens,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl EventExtractor for LlmExtractor {
    #[instrument(skip(self, markdown))]
    async fn extract(
        &self,
        markdown: &str,
        source_url: &str,
    ) -> Result<ExtractedEvent, ExtractionError> {
        let base = self.base_url.trim_end_matches('/');
        let url = format!("{}/chat/completions", base);

        let payload = json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "response_format": { "type": "json_object" },
            "messages": [
                {
                    "role": "system",
                    "content": system_prompt(),
                },
                {
                    "role": "user",
                    "content": build_user_prompt(markdown, source_url),
                }
            ],
        });

        let mut request = self.client.post(url).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|err| ExtractionError::Unavailable(err.to_string()))?;

        let status = response.status();
        let text_body = response
            .text()
            .await
            .map_err(|err| ExtractionError::Unavailable(err.to_string()))?;

        if !status.is_success() {
            return Err(ExtractionError::Status {
                status: status.as_u16(),
                body: text_body,
            });
        }

        let value: Value = serde_json::from_str(&text_body)
            .map_err(|err| ExtractionError::Malformed(err.to_string()))?;

        let content = value
            .get("choices")
            .and_then(|choices| choices.as_array())
            .and_then(|choices| choices.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ExtractionError::Malformed("LLM response missing content".to_string())
            })?;

        debug!(bytes = content.len(), "extractor responded");
        parse_extraction(&content)
    }
}

/// Parse the JSON text the extractor produced, unwrapping code fences.
pub fn parse_extraction(content: &str) -> Result<ExtractedEvent, ExtractionError> {
    let body = strip_code_fence(content);
    let value: Value =
        serde_json::from_str(body).map_err(|err| ExtractionError::Malformed(err.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| ExtractionError::Malformed("expected a JSON object".to_string()))?;

    // Replies often echo `"error": null` next to a complete event.
    match object.get("error") {
        None | Some(Value::Null) => {}
        Some(Value::String(reason)) if reason.trim().is_empty() => {}
        Some(Value::String(reason)) => {
            return Err(ExtractionError::Refused(reason.trim().to_string()))
        }
        Some(other) => return Err(ExtractionError::Refused(other.to_string())),
    }

    Ok(extracted_from_object(object)?)
}

/// Shape-check every field; nothing loosely typed gets past this point.
pub fn extracted_from_object(
    object: &Map<String, Value>,
) -> Result<ExtractedEvent, ValidationError> {
    let name = required_string(object, "name")?;
    let location = required_string(object, "location")?;
    let description = optional_string(object, "description")?.unwrap_or_default();
    let raw_date_text = optional_string(object, "date")?;
    let raw_time_text = optional_string(object, "time")?;

    let category_ids = match object.get("category_ids") {
        None | Some(Value::Null) => return Err(ValidationError::MissingField("category_ids")),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_i64().ok_or(ValidationError::CategoriesNotArray))
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(ValidationError::CategoriesNotArray),
    };
    validate_categories(&category_ids)?;

    let store_type = match object.get("store_type") {
        None | Some(Value::Null) => return Err(ValidationError::MissingField("store_type")),
        Some(Value::String(s)) => {
            StoreType::parse(s).ok_or_else(|| ValidationError::StoreType(s.clone()))?
        }
        Some(other) => return Err(ValidationError::StoreType(other.to_string())),
    };

    let latitude = optional_number(object, "latitude")?;
    let longitude = optional_number(object, "longitude")?;
    let coordinates = match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => {
            let coords = Coordinates {
                latitude,
                longitude,
            };
            if !coords.is_valid() {
                return Err(ValidationError::InvalidField {
                    field: "coordinates",
                    reason: format!("{latitude}, {longitude}"),
                });
            }
            Some(coords)
        }
        (None, None) => None,
        _ => {
            return Err(ValidationError::InvalidField {
                field: "coordinates",
                reason: "latitude and longitude must come together".to_string(),
            })
        }
    };

    let opening_hours = match object.get("opening_hours") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(entries)) => entries
            .iter()
            .map(day_hours_from_value)
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => {
            return Err(ValidationError::InvalidField {
                field: "opening_hours",
                reason: "expected an array".to_string(),
            })
        }
    };

    Ok(ExtractedEvent {
        name,
        raw_date_text,
        raw_time_text,
        location,
        description,
        category_ids,
        store_type,
        coordinates,
        opening_hours,
    })
}

fn day_hours_from_value(value: &Value) -> Result<DayHours, ValidationError> {
    let object = value.as_object().ok_or_else(|| ValidationError::InvalidField {
        field: "opening_hours",
        reason: "entries must be objects".to_string(),
    })?;
    let closed = match object.get("closed") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(other) => {
            return Err(ValidationError::InvalidField {
                field: "opening_hours.closed",
                reason: other.to_string(),
            })
        }
    };
    Ok(DayHours {
        day: required_string(object, "day")?,
        open: optional_string(object, "open")?,
        close: optional_string(object, "close")?,
        closed,
    })
}

fn required_string(
    object: &Map<String, Value>,
    key: &'static str,
) -> Result<String, ValidationError> {
    optional_string(object, key)?.ok_or(ValidationError::MissingField(key))
}

fn optional_string(
    object: &Map<String, Value>,
    key: &'static str,
) -> Result<Option<String>, ValidationError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                Ok(Some(trimmed.to_string()))
            }
        }
        Some(other) => Err(ValidationError::InvalidField {
            field: key,
            reason: format!("expected string, got {other}"),
        }),
    }
}

fn optional_number(
    object: &Map<String, Value>,
    key: &'static str,
) -> Result<Option<f64>, ValidationError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_f64().map(Some).ok_or(ValidationError::InvalidField {
            field: key,
            reason: n.to_string(),
        }),
        Some(other) => Err(ValidationError::InvalidField {
            field: key,
            reason: format!("expected number, got {other}"),
        }),
    }
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.trim_start_matches("json");
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn system_prompt() -> String {
    let categories = (1..=MAX_CATEGORY_ID)
        .filter_map(|id| category_name(id).map(|name| format!("{id}: {name}")))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You extract one event or venue in Singapore from a web page. Reply with a single JSON object with keys: name, date, time, location, description, category_ids, store_type, latitude, longitude, opening_hours.\n\
         - date: the date or date range as written (\"22 May 2025 - 28 Sep 2025\"), or null.\n\
         - time: opening hours or showtimes as written, or null.\n\
         - store_type: \"event\" for time-limited events, \"permanent_store\" for venues with regular hours.\n\
         - opening_hours: optional list of {{\"day\", \"open\", \"close\", \"closed\"}} with 24h HH:MM times.\n\
         - category_ids: one or more ids from this table:\n{categories}\n\
         If the page does not describe an event or venue, reply {{\"error\": \"<reason>\"}}. Use only information on the page."
    )
}

fn build_user_prompt(markdown: &str, source_url: &str) -> String {
    let truncated: String = markdown.chars().take(MAX_MARKDOWN_CHARS).collect();
    format!("SOURCE URL: {source_url}\n\nPAGE:\n{truncated}")
}
