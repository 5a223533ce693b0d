//! Configuration for organization policy, AI providers, and file filtering.
//!
//! Configuration is stored in TOML:
//!
//! ```toml
//! default_provider = "deepseek"
//!
//! [organization]
//! create_backup = true
//! max_file_size = 50            # MB; larger files are categorized by extension only
//! supported_types = [".txt", ".md", ".pdf"]
//!
//! [organization.categories]
//! documents = ["pdf", "txt", "md"]
//! images = ["jpg", "png"]
//!
//! [ai_providers.deepseek]
//! base_url = "https://api.deepseek.com/v1"
//! model = "deepseek-chat"
//! timeout_secs = 30
//!
//! [filters]
//! enable_hidden_files = false
//!
//! [filters.exclude]
//! filenames = [".DS_Store", "Thumbs.db"]
//! patterns = ["*.tmp", "node_modules/**"]
//! extensions = ["bak", "tmp"]
//! regex = []
//!
//! [filters.include]
//! patterns = []
//! ```
//!
//! Filter patterns are matched against paths relative to the organized root.

use crate::file_category::{Category, FileMapper};
use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Name of the per-directory configuration file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "smartsort.toml";

/// Errors that can occur during configuration loading and filtering.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),
    /// Invalid TOML syntax or structure.
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),
    /// Invalid glob pattern provided.
    #[error("Invalid glob pattern '{0}': expected *.ext or dir/**")]
    InvalidGlobPattern(String),
    /// Invalid regex pattern provided with the actual error reason.
    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidRegexPattern { pattern: String, reason: String },
    /// A provider was requested that has no `[ai_providers.<name>]` table.
    #[error("AI provider '{0}' is not configured")]
    UnknownProvider(String),
    /// IO error while reading configuration.
    #[error("IO error reading configuration: {0}")]
    IoError(String),
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Provider used when `--provider` is not given.
    pub default_provider: Option<String>,
    pub organization: OrganizationConfig,
    pub ai_providers: BTreeMap<String, ProviderConfig>,
    pub filters: FilterRules,
}

/// Policy for what gets classified and how the organized tree is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizationConfig {
    /// Copy each file into a backup snapshot before moving it.
    pub create_backup: bool,
    /// Size limit in megabytes for content classification.
    pub max_file_size: u64,
    /// Extensions eligible for content classification (leading dot optional).
    pub supported_types: Vec<String>,
    /// `category -> extensions`. Empty means the built-in table.
    pub categories: BTreeMap<String, Vec<String>>,
}

impl Default for OrganizationConfig {
    fn default() -> Self {
        Self {
            create_backup: true,
            max_file_size: 50,
            supported_types: [
                ".txt", ".md", ".py", ".js", ".html", ".css", ".yaml", ".yml", ".pdf", ".jpg",
                ".jpeg", ".png",
            ]
            .iter()
            .map(|ext| ext.to_string())
            .collect(),
            categories: BTreeMap::new(),
        }
    }
}

impl OrganizationConfig {
    /// The size limit in bytes.
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size.saturating_mul(1024 * 1024)
    }

    /// Normalized (lower-case, no dot) supported extensions.
    pub fn supported_type_set(&self) -> HashSet<String> {
        self.supported_types
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect()
    }

    /// The category table keyed by [`Category`].
    pub fn category_table(&self) -> Result<BTreeMap<Category, Vec<String>>, ConfigError> {
        self.categories
            .iter()
            .map(|(name, extensions)| {
                name.parse::<Category>()
                    .map(|category| (category, extensions.clone()))
                    .map_err(|e| ConfigError::ConfigInvalid(e.to_string()))
            })
            .collect()
    }
}

/// Connection settings for one OpenAI-compatible provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key; when absent, `SMARTSORT_<NAME>_API_KEY` is consulted.
    #[serde(default)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Returns the configured key, falling back to the provider's environment variable.
    pub fn resolve_api_key(&self, provider_name: &str) -> Option<String> {
        if let Some(key) = self.api_key.as_ref().filter(|key| !key.trim().is_empty()) {
            return Some(key.clone());
        }
        std::env::var(api_key_env_var(provider_name))
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

/// Environment variable holding the API key for `provider_name`.
pub fn api_key_env_var(provider_name: &str) -> String {
    let name: String = provider_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("SMARTSORT_{}_API_KEY", name)
}

/// Root-level filter rules configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterRules {
    /// Whether to include hidden files (starting with "."). Defaults to false.
    #[serde(default)]
    pub enable_hidden_files: bool,

    /// Rules for excluding files.
    #[serde(default)]
    pub exclude: ExcludeRules,

    /// Rules for including files (whitelist, overrides exclude rules).
    #[serde(default)]
    pub include: IncludeRules,
}

/// Rules for excluding files from organization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExcludeRules {
    /// Exact filenames to exclude (e.g., ".DS_Store", "Thumbs.db").
    #[serde(default)]
    pub filenames: Vec<String>,

    /// Glob patterns to exclude (e.g., "*.tmp", "node_modules/**").
    #[serde(default)]
    pub patterns: Vec<String>,

    /// File extensions to exclude (e.g., "bak", "tmp", "log").
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Regex patterns matched against the file name.
    #[serde(default)]
    pub regex: Vec<String>,
}

/// Rules for including files, overriding exclude rules (whitelist).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncludeRules {
    /// Glob patterns that override exclude rules.
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl AppConfig {
    /// Load configuration from a file, with fallback to defaults.
    ///
    /// Attempts to load configuration in the following order:
    /// 1. If `config_path` is provided, load from that file
    /// 2. Look for `smartsort.toml` in the current directory
    /// 3. Look for `~/.config/smartsort/config.toml` in home directory
    /// 4. Fall back to default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file is explicitly provided but cannot be read,
    /// or if any discovered file is malformed.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("smartsort")
                .join("config.toml");
            if home_config.exists() {
                return Self::load_from_file(&home_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))?;
        config.organization.category_table()?;
        Ok(config)
    }

    /// Name of the provider to use: the override, else `default_provider`.
    pub fn provider_name<'a>(&'a self, override_name: Option<&'a str>) -> Option<&'a str> {
        override_name.or(self.default_provider.as_deref())
    }

    /// Looks up a provider table by name.
    pub fn provider(&self, name: &str) -> Result<&ProviderConfig, ConfigError> {
        self.ai_providers
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProvider(name.to_string()))
    }

    /// Compile the filter rules into matchers.
    pub fn compile_filters(&self) -> Result<CompiledFilters, ConfigError> {
        CompiledFilters::new(&self.filters)
    }

    /// Category mapper built from `[organization.categories]`.
    pub fn file_mapper(&self) -> Result<FileMapper, ConfigError> {
        Ok(FileMapper::from_table(&self.organization.category_table()?))
    }
}

/// Pre-compiled filter rules.
pub struct CompiledFilters {
    enable_hidden_files: bool,
    exclude_filenames: HashSet<String>,
    exclude_extensions: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
    exclude_regexes: Vec<Regex>,
    include_patterns: Vec<Pattern>,
}

impl CompiledFilters {
    fn new(rules: &FilterRules) -> Result<Self, ConfigError> {
        let compile_globs = |patterns: &[String]| {
            patterns
                .iter()
                .map(|pattern| {
                    Pattern::new(pattern)
                        .map_err(|_| ConfigError::InvalidGlobPattern(pattern.clone()))
                })
                .collect::<Result<Vec<_>, _>>()
        };

        let exclude_regexes = rules
            .exclude
            .regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegexPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            enable_hidden_files: rules.enable_hidden_files,
            exclude_filenames: rules.exclude.filenames.iter().cloned().collect(),
            exclude_extensions: rules
                .exclude
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            exclude_patterns: compile_globs(&rules.exclude.patterns)?,
            exclude_regexes,
            include_patterns: compile_globs(&rules.include.patterns)?,
        })
    }

    /// Whether hidden files and directories are eligible.
    pub fn hidden_enabled(&self) -> bool {
        self.enable_hidden_files
    }

    /// Check if a file should be included in organization (not excluded).
    ///
    /// Checks are performed in this order, with early termination:
    /// 1. Include patterns (whitelist) - if matched, always include
    /// 2. Hidden file filter - if hidden and disabled, exclude
    /// 3. Exact filename match - if matched, exclude
    /// 4. File extension match - if matched, exclude
    /// 5. Glob pattern match - if matched, exclude
    /// 6. Regex pattern match - if matched, exclude
    /// 7. Default: include
    pub fn should_include(&self, relative_path: &Path) -> bool {
        let file_name = relative_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if self
            .include_patterns
            .iter()
            .any(|pattern| pattern.matches_path(relative_path))
        {
            return true;
        }

        if !self.enable_hidden_files && (file_name.starts_with('.') || file_name.starts_with('~'))
        {
            return false;
        }

        if self.exclude_filenames.contains(file_name.as_ref()) {
            return false;
        }

        if let Some(ext) = relative_path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            if self.exclude_extensions.contains(&ext_lower) {
                return false;
            }
        }

        if self
            .exclude_patterns
            .iter()
            .any(|pattern| pattern.matches_path(relative_path))
        {
            return false;
        }

        !self
            .exclude_regexes
            .iter()
            .any(|regex| regex.is_match(&file_name))
    }
}
