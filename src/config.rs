use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::retry::RetryPolicy;
use crate::utils;

const DEFAULT_LLM_ENDPOINT: &str = "https://api.openai.com/v1";
const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
const DEFAULT_GEOCODER_ENDPOINT: &str = "https://nominatim.openstreetmap.org";
const DEFAULT_USER_AGENT: &str = "sg-events/0.1 (+https://github.com/sg-events/sg-events)";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub llm_endpoint: String,
    pub llm_model: String,
    pub llm_api_key: Option<String>,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    pub geocoder_endpoint: String,
    pub user_agent: String,
    pub item_delay_ms: u64,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub database_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm_endpoint: DEFAULT_LLM_ENDPOINT.to_string(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            llm_api_key: None,
            llm_temperature: 0.1,
            llm_max_tokens: 2000,
            geocoder_endpoint: DEFAULT_GEOCODER_ENDPOINT.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            item_delay_ms: 2000,
            retry_max_attempts: 3,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 8000,
            database_path: None,
        }
    }
}

impl AppConfig {
    /// Environment variables win over the stored file.
    pub fn apply_env(&mut self) {
        if let Ok(value) = std::env::var("LLM_ENDPOINT") {
            self.llm_endpoint = value;
        }
        if let Ok(value) = std::env::var("LLM_MODEL") {
            self.llm_model = value;
        }
        if let Ok(value) = std::env::var("LLM_API_KEY") {
            self.llm_api_key = Some(value);
        }
        if let Some(value) = env_parse::<f32>("LLM_TEMPERATURE") {
            self.llm_temperature = value;
        }
        if let Some(value) = env_parse::<u32>("LLM_MAX_TOKENS") {
            self.llm_max_tokens = value;
        }
        if let Ok(value) = std::env::var("GEOCODER_ENDPOINT") {
            self.geocoder_endpoint = value;
        }
        if let Some(value) = env_parse::<u64>("SG_EVENTS_ITEM_DELAY_MS") {
            self.item_delay_ms = value;
        }
        if let Ok(value) = std::env::var("SG_EVENTS_DB") {
            self.database_path = Some(PathBuf::from(value));
        }
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        let value = value.trim();
        match key {
            "llm_endpoint" => self.llm_endpoint = value.to_string(),
            "llm_model" => self.llm_model = value.to_string(),
            "llm_api_key" => self.llm_api_key = non_empty(value),
            "llm_temperature" => self.llm_temperature = parse_value(key, value)?,
            "llm_max_tokens" => self.llm_max_tokens = parse_value(key, value)?,
            "geocoder_endpoint" => self.geocoder_endpoint = value.to_string(),
            "user_agent" => self.user_agent = value.to_string(),
            "item_delay_ms" => self.item_delay_ms = parse_value(key, value)?,
            "retry_max_attempts" => self.retry_max_attempts = parse_value(key, value)?,
            "retry_base_delay_ms" => self.retry_base_delay_ms = parse_value(key, value)?,
            "retry_max_delay_ms" => self.retry_max_delay_ms = parse_value(key, value)?,
            "database_path" => self.database_path = non_empty(value).map(PathBuf::from),
            other => return Err(format!("unknown config key: {other}")),
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
            Duration::from_millis(self.retry_max_delay_ms),
        )
    }

    pub fn item_delay(&self) -> Duration {
        Duration::from_millis(self.item_delay_ms)
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(utils::database_path)
    }

    /// Copy safe to print: the API key is masked.
    pub fn redacted(&self) -> AppConfig {
        let mut copy = self.clone();
        if copy.llm_api_key.is_some() {
            copy.llm_api_key = Some("********".to_string());
        }
        copy
    }
}

pub struct ConfigStore {
    path: PathBuf,
    data: Mutex<AppConfig>,
}

impl ConfigStore {
    pub fn load() -> Self {
        Self::load_from(utils::config_path())
    }

    pub fn load_from(path: PathBuf) -> Self {
        let mut data = read_config(&path).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "ignoring unreadable config");
            AppConfig::default()
        });
        data.apply_env();
        Self {
            path,
            data: Mutex::new(data),
        }
    }

    pub fn read(&self) -> AppConfig {
        match self.data.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update<F>(&self, transform: F) -> Result<AppConfig, String>
    where
        F: FnOnce(&mut AppConfig) -> Result<(), String>,
    {
        let mut guard = self
            .data
            .lock()
            .map_err(|_| "config mutex poisoned".to_string())?;
        let mut next = guard.clone();
        transform(&mut next)?;
        write_config(&self.path, &next)?;
        *guard = next;
        Ok(guard.clone())
    }
}

fn read_config(path: &Path) -> Result<AppConfig, String> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path).map_err(|err| err.to_string())?;
    serde_json::from_str(&contents).map_err(|err| err.to_string())
}

fn write_config(path: &Path, config: &AppConfig) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        if let Err(err) = fs::create_dir_all(parent) {
            return Err(err.to_string());
        }
    }
    let contents = serde_json::to_string_pretty(config).map_err(|err| err.to_string())?;
    fs::write(path, contents).map_err(|err| err.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse::<T>().ok())
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, String> {
    value
        .parse::<T>()
        .map_err(|_| format!("invalid value for {key}: {value}"))
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("sg-events-test-{}-{name}", std::process::id()))
            .join("config.json")
    }

    #[test]
    fn partial_files_fill_in_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"llm_model": "local-model"}"#).expect("parse");
        assert_eq!(config.llm_model, "local-model");
        assert_eq!(config.item_delay_ms, 2000);
        assert_eq!(config.retry_policy().max_attempts, 3);
    }

    #[test]
    fn set_validates_values() {
        let mut config = AppConfig::default();
        config.set("item_delay_ms", "250").expect("valid");
        assert_eq!(config.item_delay(), Duration::from_millis(250));
        assert!(config.set("item_delay_ms", "soon").is_err());
        assert!(config.set("colour", "blue").is_err());
        config.set("llm_api_key", "").expect("valid");
        assert_eq!(config.llm_api_key, None);
    }

    #[test]
    fn update_persists_to_disk() {
        let path = scratch_path("persist");
        let store = ConfigStore::load_from(path.clone());
        store
            .update(|config| config.set("retry_max_attempts", "5"))
            .expect("update");

        let reloaded = read_config(&path).expect("reload");
        assert_eq!(reloaded.retry_max_attempts, 5);
        let _ = fs::remove_dir_all(path.parent().expect("parent"));
    }

    #[test]
    fn failed_update_leaves_config_untouched() {
        let path = scratch_path("untouched");
        let store = ConfigStore::load_from(path.clone());
        let before = store.read();
        assert!(store.update(|config| config.set("nope", "1")).is_err());
        assert_eq!(store.read(), before);
        assert!(!path.exists());
    }

    #[test]
    fn redacted_masks_key() {
        let mut config = AppConfig::default();
        config.llm_api_key = Some("sk-secret".into());
        assert_eq!(config.redacted().llm_api_key.as_deref(), Some("********"));
    }
}
