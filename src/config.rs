//! Runtime settings
//!
//! Defaults reproduce the stock corpus setup (Uber 10-K filings for
//! 2019-2022). Every value can be overridden from the environment or a
//! `.env` file. A `Settings` value is handed to each component explicitly.

use crate::error::AgentError;
use crate::models::Year;
use crate::Result;
use std::collections::HashSet;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_LLM_MODEL: &str = "gpt-35-turbo-16k";
pub const DEFAULT_EMBEDDING_MODEL: &str = "BAAI/bge-small-en-v1.5";
pub const DEFAULT_CORPUS_URL: &str = "https://www.dropbox.com/s/948jr9cfs7fgj99/UBER.zip?dl=1";
pub const DEFAULT_YEARS: &[u16] = &[2022, 2021, 2020, 2019];

/// Where chat completions are sent
#[derive(Debug, Clone, PartialEq)]
pub enum LlmEndpoint {
    /// Any OpenAI-compatible `/chat/completions` server
    OpenAi {
        base_url: String,
        api_key: Option<String>,
    },
    /// Azure OpenAI deployment
    Azure {
        endpoint: String,
        deployment: String,
        api_version: String,
        api_key: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub llm_model: String,
    pub temperature: f32,
    pub llm_endpoint: LlmEndpoint,
    pub llm_timeout: Duration,

    pub embedding_model: String,
    pub embedding_base_url: String,
    pub embedding_api_key: Option<String>,

    /// Chunk size in (estimated) tokens
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub similarity_top_k: usize,

    pub corpus_url: String,
    pub download_timeout: Duration,
    pub data_directory: PathBuf,
    pub archive_path: PathBuf,
    pub storage_directory: PathBuf,
    pub filing_prefix: String,
    pub company: String,
    pub years: Vec<Year>,

    pub max_function_calls: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            temperature: 0.0,
            llm_endpoint: LlmEndpoint::OpenAi {
                base_url: "https://api.openai.com/v1".to_string(),
                api_key: None,
            },
            llm_timeout: Duration::from_secs(120),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_base_url: "http://127.0.0.1:8080/v1".to_string(),
            embedding_api_key: None,
            chunk_size: 512,
            chunk_overlap: 20,
            similarity_top_k: 2,
            corpus_url: DEFAULT_CORPUS_URL.to_string(),
            download_timeout: Duration::from_secs(300),
            data_directory: PathBuf::from("data"),
            archive_path: PathBuf::from("data/UBER.zip"),
            storage_directory: PathBuf::from("storage"),
            filing_prefix: "UBER".to_string(),
            company: "Uber".to_string(),
            years: DEFAULT_YEARS
                .iter()
                .filter_map(|y| Year::new(*y).ok())
                .collect(),
            max_function_calls: 5,
        }
    }
}

impl Settings {
    /// Load `.env` (if present) and apply environment overrides to the defaults
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup, then validate
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("LLM_MODEL") {
            settings.llm_model = v;
        }
        if let Some(v) = parse_var(&get, "LLM_TEMPERATURE")? {
            settings.temperature = v;
        }
        if let Some(v) = parse_var::<u64, _>(&get, "LLM_TIMEOUT_SECS")? {
            settings.llm_timeout = Duration::from_secs(v);
        }

        settings.llm_endpoint = match get("AZURE_OPENAI_ENDPOINT") {
            Some(endpoint) => LlmEndpoint::Azure {
                endpoint: endpoint.trim_end_matches('/').to_string(),
                deployment: get("AZURE_OPENAI_DEPLOYMENT").unwrap_or_else(|| settings.llm_model.clone()),
                api_version: get("OPENAI_API_VERSION").unwrap_or_else(|| "2024-02-01".to_string()),
                api_key: get("AZURE_OPENAI_API_KEY"),
            },
            None => LlmEndpoint::OpenAi {
                base_url: get("OPENAI_API_BASE")
                    .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
                    .trim_end_matches('/')
                    .to_string(),
                api_key: get("OPENAI_API_KEY"),
            },
        };

        if let Some(v) = get("EMBEDDING_MODEL") {
            settings.embedding_model = v;
        }
        if let Some(v) = get("EMBEDDING_API_BASE") {
            settings.embedding_base_url = v.trim_end_matches('/').to_string();
        }
        settings.embedding_api_key = get("EMBEDDING_API_KEY");

        if let Some(v) = parse_var(&get, "CHUNK_SIZE")? {
            settings.chunk_size = v;
        }
        if let Some(v) = parse_var(&get, "CHUNK_OVERLAP")? {
            settings.chunk_overlap = v;
        }
        if let Some(v) = parse_var(&get, "SIMILARITY_TOP_K")? {
            settings.similarity_top_k = v;
        }

        if let Some(v) = get("CORPUS_URL") {
            settings.corpus_url = v;
        }
        if let Some(v) = parse_var::<u64, _>(&get, "DOWNLOAD_TIMEOUT_SECS")? {
            settings.download_timeout = Duration::from_secs(v);
        }
        if let Some(v) = get("DATA_DIRECTORY") {
            settings.data_directory = PathBuf::from(v);
        }
        if let Some(v) = get("ARCHIVE_PATH") {
            settings.archive_path = PathBuf::from(v);
        }
        if let Some(v) = get("STORAGE_DIRECTORY") {
            settings.storage_directory = PathBuf::from(v);
        }
        if let Some(v) = get("FILING_PREFIX") {
            settings.filing_prefix = v;
        }
        if let Some(v) = get("FILING_COMPANY") {
            settings.company = v;
        }
        if let Some(v) = get("FILING_YEARS") {
            settings.years = parse_years(&v)?;
        }
        if let Some(v) = parse_var(&get, "AGENT_MAX_FUNCTION_CALLS")? {
            settings.max_function_calls = v;
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.years.is_empty() {
            return Err(AgentError::InvalidConfig("year list is empty".to_string()));
        }
        let mut seen = HashSet::new();
        for year in &self.years {
            if !seen.insert(*year) {
                return Err(AgentError::InvalidConfig(format!("duplicate year {}", year)));
            }
        }
        if self.chunk_size == 0 {
            return Err(AgentError::InvalidConfig("chunk_size must be positive".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(AgentError::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.similarity_top_k == 0 {
            return Err(AgentError::InvalidConfig("similarity_top_k must be positive".to_string()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(AgentError::InvalidConfig(format!(
                "temperature {} outside 0.0..=2.0",
                self.temperature
            )));
        }
        if self.filing_prefix.is_empty() {
            return Err(AgentError::InvalidConfig("filing_prefix is empty".to_string()));
        }
        Ok(())
    }

    /// `{data_directory}/{prefix}_{year}.html`
    pub fn filing_path(&self, year: Year) -> PathBuf {
        self.data_directory
            .join(format!("{}_{}.html", self.filing_prefix, year))
    }

    /// `{storage_directory}/{year}`
    pub fn storage_path(&self, year: Year) -> PathBuf {
        self.storage_directory.join(year.to_string())
    }
}

fn parse_var<T, F>(get: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| AgentError::InvalidConfig(format!("{}={:?}: {}", key, raw, e))),
        None => Ok(None),
    }
}

fn parse_years(raw: &str) -> Result<Vec<Year>> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            let value = s.parse::<u16>().map_err(|e| {
                AgentError::InvalidConfig(format!("FILING_YEARS entry {:?}: {}", s, e))
            })?;
            Year::new(value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_stock_setup() {
        let settings = Settings::default();
        assert_eq!(settings.llm_model, "gpt-35-turbo-16k");
        assert_eq!(settings.embedding_model, "BAAI/bge-small-en-v1.5");
        assert_eq!(settings.chunk_size, 512);
        assert_eq!(
            settings.years.iter().map(|y| y.value()).collect::<Vec<_>>(),
            vec![2022, 2021, 2020, 2019]
        );
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_paths_are_year_scoped() {
        let settings = Settings::default();
        let year = Year::new(2021).unwrap();
        assert_eq!(settings.filing_path(year), PathBuf::from("data/UBER_2021.html"));
        assert_eq!(settings.storage_path(year), PathBuf::from("storage/2021"));
    }

    #[test]
    fn test_overrides_and_azure_endpoint() {
        let settings = Settings::from_lookup(lookup(&[
            ("FILING_YEARS", "2020, 2021"),
            ("CHUNK_SIZE", "256"),
            ("AZURE_OPENAI_ENDPOINT", "https://example.openai.azure.com/"),
            ("AZURE_OPENAI_API_KEY", "secret"),
        ]))
        .unwrap();

        assert_eq!(settings.years.len(), 2);
        assert_eq!(settings.chunk_size, 256);
        match settings.llm_endpoint {
            LlmEndpoint::Azure {
                endpoint,
                deployment,
                api_key,
                ..
            } => {
                assert_eq!(endpoint, "https://example.openai.azure.com");
                assert_eq!(deployment, "gpt-35-turbo-16k");
                assert_eq!(api_key.as_deref(), Some("secret"));
            }
            other => panic!("unexpected endpoint {:?}", other),
        }
    }

    #[test]
    fn test_validation_fails_fast() {
        assert!(Settings::from_lookup(lookup(&[("FILING_YEARS", " , ")])).is_err());
        assert!(Settings::from_lookup(lookup(&[("FILING_YEARS", "2020,2020")])).is_err());
        assert!(Settings::from_lookup(lookup(&[("CHUNK_SIZE", "0")])).is_err());
        assert!(Settings::from_lookup(lookup(&[("CHUNK_SIZE", "abc")])).is_err());
        assert!(Settings::from_lookup(lookup(&[("CHUNK_OVERLAP", "600")])).is_err());
    }
}
