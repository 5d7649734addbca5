//! Configuration loading and narrator factory.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use readscope_core::composer::ComposerConfig;
use readscope_core::engine::{EngineConfig, NarrativeSettings};
use readscope_core::model::TestStructure;
use readscope_core::synthesis::ReportPolicy;
use readscope_core::taxonomy::SkillTaxonomy;
use readscope_core::timing::TimingPolicy;
use readscope_core::traits::NarrativeGenerator;

use crate::anthropic::AnthropicProvider;
use crate::ollama::OllamaProvider;

/// Configuration for a single narrative provider.
///
/// Debug output masks API keys.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    Anthropic {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
    },
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::Anthropic {
                api_key: _,
                base_url,
            } => f
                .debug_struct("Anthropic")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::Ollama { base_url } => f
                .debug_struct("Ollama")
                .field("base_url", base_url)
                .finish(),
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

/// Top-level readscope configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadscopeConfig {
    /// Narrative providers keyed by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default = "default_provider")]
    pub default_provider: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_temperature")]
    pub default_temperature: f64,
    /// Narrative retries after the first attempt.
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_narrative_timeout")]
    pub narrative_timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Directory for saved reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// JSON-lines export ledger; no export when unset.
    #[serde(default)]
    pub ledger_path: Option<PathBuf>,
    /// Default test structure: raw skill tag (as written in the banks'
    /// `skill` field, not a taxonomy bucket) to question count.
    #[serde(default = "default_structure")]
    pub structure: TestStructure,
    #[serde(default = "SkillTaxonomy::consolidated")]
    pub taxonomy: SkillTaxonomy,
    #[serde(default)]
    pub composer: ComposerConfig,
    #[serde(default)]
    pub timing: TimingPolicy,
    #[serde(default)]
    pub report: ReportPolicy,
}

fn default_provider() -> String {
    "anthropic".to_string()
}
fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_retries() -> u32 {
    1
}
fn default_retry_delay() -> u64 {
    500
}
fn default_narrative_timeout() -> u64 {
    30
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./readscope-results")
}

/// One title, theme, argument, pronoun and essay question, two inference
/// questions and one of each ordering kind.
fn default_structure() -> TestStructure {
    BTreeMap::from(
        [
            ("title", 1),
            ("theme", 1),
            ("argument", 1),
            ("inference", 2),
            ("pronoun", 1),
            ("sentence_ordering", 1),
            ("paragraph_ordering", 1),
            ("essay", 1),
        ]
        .map(|(skill, n)| (skill.to_string(), n)),
    )
}

impl Default for ReadscopeConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            max_retries: default_retries(),
            retry_delay_ms: default_retry_delay(),
            narrative_timeout_secs: default_narrative_timeout(),
            max_tokens: default_max_tokens(),
            output_dir: default_output_dir(),
            ledger_path: None,
            structure: default_structure(),
            taxonomy: SkillTaxonomy::consolidated(),
            composer: ComposerConfig::default(),
            timing: TimingPolicy::default(),
            report: ReportPolicy::default(),
        }
    }
}

impl ReadscopeConfig {
    /// The engine configuration described by this file.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            taxonomy: self.taxonomy.clone(),
            timing: self.timing,
            report: self.report.clone(),
            composer: self.composer.clone(),
            narrative: NarrativeSettings {
                model: self.default_model.clone(),
                max_tokens: self.max_tokens,
                temperature: self.default_temperature,
                timeout: Duration::from_secs(self.narrative_timeout_secs),
                max_retries: self.max_retries,
                retry_delay: Duration::from_millis(self.retry_delay_ms),
                system_prompt_override: None,
            },
        }
    }

    /// The configured default provider, if it has an entry.
    pub fn default_provider_config(&self) -> Option<&ProviderConfig> {
        self.providers.get(&self.default_provider)
    }
}

/// Expand `${VAR_NAME}` references from the environment. Unset variables
/// expand to the empty string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        let Some(end) = result[start..].find('}') else {
            break;
        };
        let var_name = &result[start + 2..start + end];
        let value = std::env::var(var_name).unwrap_or_default();
        result = format!("{}{}{}", &result[..start], value, &result[start + end + 1..]);
    }
    result
}

fn resolve_provider_config(config: &ProviderConfig) -> ProviderConfig {
    match config {
        ProviderConfig::Anthropic { api_key, base_url } => ProviderConfig::Anthropic {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_deref().map(resolve_env_vars),
        },
        ProviderConfig::Ollama { base_url } => ProviderConfig::Ollama {
            base_url: resolve_env_vars(base_url),
        },
    }
}

/// Load configuration from the well-known locations.
///
/// Search order:
/// 1. `readscope.toml` in the current directory
/// 2. `~/.config/readscope/config.toml`
///
/// `READSCOPE_ANTHROPIC_KEY` overrides (or creates) the anthropic provider key.
pub fn load_config() -> Result<ReadscopeConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<ReadscopeConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("readscope.toml");
            if local.exists() {
                Some(local)
            } else {
                config_dir()
                    .map(|dir| dir.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            let config = toml::from_str::<ReadscopeConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?;
            tracing::debug!(path = %path.display(), "loaded configuration");
            config
        }
        None => ReadscopeConfig::default(),
    };

    if let Ok(key) = std::env::var("READSCOPE_ANTHROPIC_KEY") {
        let entry = config
            .providers
            .entry("anthropic".into())
            .or_insert(ProviderConfig::Anthropic {
                api_key: String::new(),
                base_url: None,
            });
        if let ProviderConfig::Anthropic { api_key, .. } = entry {
            *api_key = key;
        }
    }

    config.providers = config
        .providers
        .iter()
        .map(|(k, v)| (k.clone(), resolve_provider_config(v)))
        .collect();

    Ok(config)
}

fn config_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("readscope"))
}

/// Create a narrator from its configuration.
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn NarrativeGenerator>> {
    let provider: Arc<dyn NarrativeGenerator> = match config {
        ProviderConfig::Anthropic { api_key, base_url } => {
            if api_key.is_empty() {
                anyhow::bail!("anthropic provider has an empty api_key");
            }
            Arc::new(AnthropicProvider::new(api_key, base_url.clone())?)
        }
        ProviderConfig::Ollama { base_url } => Arc::new(OllamaProvider::new(base_url)?),
    };
    Ok(provider)
}
