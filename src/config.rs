//! Application settings and file filtering rules.
//!
//! Settings are loaded from a TOML file. Every section is optional; anything
//! missing falls back to built-in defaults. A file that cannot be read or parsed
//! is reported and replaced by the defaults as a whole, so startup never fails
//! on configuration.
//!
//! # Configuration File Format
//!
//! ```toml
//! [categories]
//! Images = [".jpg", ".png"]
//! Documents = ["pdf", "txt"]
//!
//! [filters]
//! enable_hidden_files = false
//!
//! [filters.exclude]
//! filenames = ["desktop.ini"]
//! patterns = ["~*", "*.part"]
//! extensions = ["crdownload"]
//! regex = []
//!
//! [filters.include]
//! patterns = []
//!
//! [logging]
//! enabled = true
//! file = "tidywatch.log"
//! level = "info"
//! max_entries = 1000
//!
//! [watch]
//! debounce_ms = 500
//! ```

use crate::file_category::{CategoryMap, builtin_rules, normalize_extension};
use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Name of the per-directory configuration file.
pub const LOCAL_CONFIG_NAME: &str = ".tidywatch.toml";

/// Errors that can occur during configuration loading and filtering.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
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
    InvalidRegexPattern {
        /// The regex pattern that failed to compile.
        pattern: String,
        /// The reason why the pattern is invalid.
        reason: String,
    },
    /// IO error while reading or writing configuration.
    #[error("IO error on configuration file: {0}")]
    IoError(String),
}

/// Top-level settings, deserialized from the TOML configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Category name to extension list. `None` means the built-in table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<BTreeMap<String, Vec<String>>>,

    /// Rules deciding which files are left alone.
    pub filters: FilterRules,

    /// Log file settings.
    pub logging: LoggingSettings,

    /// Watcher tuning.
    pub watch: WatchSettings,
}

/// Root-level filter rules configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterRules {
    /// Whether to organize hidden files (starting with "."). Defaults to false.
    pub enable_hidden_files: bool,

    /// Rules for excluding files.
    pub exclude: ExcludeRules,

    /// Rules for including files (whitelist, overrides exclude rules).
    pub include: IncludeRules,
}

/// Rules for excluding files from organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExcludeRules {
    /// Exact filenames to exclude (e.g., "desktop.ini", "Thumbs.db").
    pub filenames: Vec<String>,

    /// Glob patterns to exclude, matched against the path relative to the
    /// watched folder (e.g., "~*", "*.part").
    pub patterns: Vec<String>,

    /// File extensions to exclude (e.g., "crdownload", "tmp").
    pub extensions: Vec<String>,

    /// Regex patterns matched against the file name.
    pub regex: Vec<String>,
}

impl Default for ExcludeRules {
    fn default() -> Self {
        Self {
            filenames: Vec::new(),
            // Office lock files and editor temporaries.
            patterns: vec!["~*".to_string()],
            extensions: Vec::new(),
            regex: Vec::new(),
        }
    }
}

/// Rules for including files, overriding exclude rules (whitelist).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IncludeRules {
    /// Glob patterns that override exclude rules.
    pub patterns: Vec<String>,
}

/// Where and how much to log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Write the append-only log file at all.
    pub enabled: bool,
    /// Log file path; relative paths resolve against the working directory.
    pub file: PathBuf,
    /// Minimum level written to the log file (error, warn, info, debug, trace).
    pub level: String,
    /// Number of entries after which the log file is rotated.
    pub max_entries: usize,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            file: PathBuf::from("tidywatch.log"),
            level: "info".to_string(),
            max_entries: 1000,
        }
    }
}

/// Watcher tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSettings {
    /// Quiet period before a burst of filesystem events for one path is delivered.
    pub debounce_ms: u64,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self { debounce_ms: 500 }
    }
}

impl WatchSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Settings {
    /// Finds the configuration file to use.
    ///
    /// Search order:
    /// 1. `config_path`, if provided (returned even if it does not exist)
    /// 2. `.tidywatch.toml` in the current directory
    /// 3. `~/.config/tidywatch/config.toml`
    pub fn discover(config_path: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = config_path {
            return Some(path.to_path_buf());
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_NAME);
        if local_config.exists() {
            return Some(local_config);
        }

        default_config_path().filter(|p| p.exists())
    }

    /// Load settings from a file, with fallback to defaults when no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file is found (or explicitly given)
    /// but cannot be read or parsed.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        match Self::discover(config_path) {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load and validate settings, replacing them with the defaults on any error.
    ///
    /// The error, if any, is handed back so the caller can report it once
    /// logging is up.
    pub fn load_or_default(config_path: Option<&Path>) -> (Self, Option<ConfigError>) {
        match Self::load(config_path).and_then(|s| s.validate().map(|()| s)) {
            Ok(settings) => (settings, None),
            Err(e) => (Self::default(), Some(e)),
        }
    }

    /// Load settings from a specific file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ConfigNotFound` if file does not exist.
    /// Returns `ConfigError::ConfigInvalid` if TOML parsing fails.
    /// Returns `ConfigError::IoError` if file cannot be read.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))
    }

    /// Writes the settings as TOML, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))
    }

    /// Checks that categories and filters compile.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.category_map()?;
        self.compile_filters()?;
        Ok(())
    }

    /// Builds the category map from the configured (or built-in) rules.
    pub fn category_map(&self) -> Result<CategoryMap, ConfigError> {
        match &self.categories {
            Some(rules) => CategoryMap::from_rules(rules),
            None => Ok(CategoryMap::default()),
        }
    }

    /// Compile filter rules into optimized structures for matching.
    pub fn compile_filters(&self) -> Result<CompiledFilters, ConfigError> {
        CompiledFilters::new(self.filters.clone())
    }

    /// Adds a category, or extends an existing one, with the given extensions.
    ///
    /// Extensions are stored normalized with a leading dot. Returns the number
    /// of extensions actually added.
    pub fn add_category(&mut self, name: &str, extensions: &[String]) -> usize {
        let rules = self.categories.get_or_insert_with(builtin_rules);
        let list = rules.entry(name.to_string()).or_default();
        let mut present: HashSet<String> = list.iter().map(|e| normalize_extension(e)).collect();

        let mut added = 0;
        for ext in extensions {
            let key = normalize_extension(ext);
            if !key.is_empty() && present.insert(key.clone()) {
                list.push(format!(".{}", key));
                added += 1;
            }
        }
        added
    }

    /// Removes a category. Returns true if it existed.
    pub fn remove_category(&mut self, name: &str) -> bool {
        let rules = self.categories.get_or_insert_with(builtin_rules);
        rules.remove(name).is_some()
    }
}

/// OS-appropriate per-user configuration path.
pub fn default_config_path() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(|home| {
        PathBuf::from(home)
            .join(".config")
            .join("tidywatch")
            .join("config.toml")
    })
}

/// Compiled, optimized filter structures for efficient file matching.
///
/// All glob and regex patterns are compiled once up front so matching a file
/// never reparses a pattern.
#[derive(Debug, Clone)]
pub struct CompiledFilters {
    enable_hidden_files: bool,
    exclude_filenames: HashSet<String>,
    exclude_extensions: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
    exclude_regexes: Vec<Regex>,
    include_patterns: Vec<Pattern>,
}

impl CompiledFilters {
    /// Create compiled filters from filter rules.
    ///
    /// # Errors
    ///
    /// Returns an error if any glob or regex patterns are invalid.
    pub fn new(rules: FilterRules) -> Result<Self, ConfigError> {
        let exclude_patterns = compile_globs(&rules.exclude.patterns)?;
        let include_patterns = compile_globs(&rules.include.patterns)?;

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
            exclude_filenames: rules.exclude.filenames.into_iter().collect(),
            exclude_extensions: rules
                .exclude
                .extensions
                .iter()
                .map(|ext| normalize_extension(ext))
                .collect(),
            exclude_patterns,
            exclude_regexes,
            include_patterns,
        })
    }

    /// Filters that let every file through.
    pub fn allow_all() -> Self {
        Self {
            enable_hidden_files: true,
            exclude_filenames: HashSet::new(),
            exclude_extensions: HashSet::new(),
            exclude_patterns: Vec::new(),
            exclude_regexes: Vec::new(),
            include_patterns: Vec::new(),
        }
    }

    /// Check if a file should be organized (not excluded).
    ///
    /// `file_path` is the path relative to the watched folder.
    ///
    /// Checks are performed in this order, with early termination:
    /// 1. Include patterns (whitelist) - if matched, always include
    /// 2. Hidden file filter - if hidden and disabled, exclude
    /// 3. Exact filename match - if matched, exclude
    /// 4. File extension match - if matched, exclude
    /// 5. Glob pattern match - if matched, exclude
    /// 6. Regex pattern match - if matched, exclude
    /// 7. Default: include
    pub fn should_include(&self, file_path: &Path) -> bool {
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if self.matches_any(&self.include_patterns, file_path) {
            return true;
        }

        if !self.enable_hidden_files && file_name.starts_with('.') {
            return false;
        }

        if self.exclude_filenames.contains(file_name.as_ref()) {
            return false;
        }

        if let Some(ext) = file_path.extension()
            && self
                .exclude_extensions
                .contains(&normalize_extension(&ext.to_string_lossy()))
        {
            return false;
        }

        if self.matches_any(&self.exclude_patterns, file_path) {
            return false;
        }

        !self
            .exclude_regexes
            .iter()
            .any(|regex| regex.is_match(&file_name))
    }

    fn matches_any(&self, patterns: &[Pattern], file_path: &Path) -> bool {
        patterns.iter().any(|pattern| pattern.matches_path(file_path))
    }
}

impl Default for CompiledFilters {
    /// The default filter rules, compiled. These always compile.
    fn default() -> Self {
        Self::new(FilterRules::default()).unwrap_or_else(|_| Self::allow_all())
    }
}

fn compile_globs(patterns: &[String]) -> Result<Vec<Pattern>, ConfigError> {
    patterns
        .iter()
        .map(|pattern| {
            Pattern::new(pattern).map_err(|_| ConfigError::InvalidGlobPattern(pattern.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn filters_with(exclude: ExcludeRules, include: IncludeRules, hidden: bool) -> CompiledFilters {
        CompiledFilters::new(FilterRules {
            enable_hidden_files: hidden,
            exclude,
            include,
        })
        .unwrap()
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert!(settings.categories.is_none());
        assert!(!settings.filters.enable_hidden_files);
        assert_eq!(settings.logging.max_entries, 1000);
        assert_eq!(settings.watch.debounce(), Duration::from_millis(500));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_hidden_and_temp_files_excluded_by_default() {
        let compiled = CompiledFilters::default();

        assert!(!compiled.should_include(Path::new(".DS_Store")));
        assert!(!compiled.should_include(Path::new("~$report.docx")));
        assert!(compiled.should_include(Path::new("report.docx")));
    }

    #[test]
    fn test_hidden_file_included_when_enabled() {
        let compiled = filters_with(ExcludeRules::default(), IncludeRules::default(), true);
        assert!(compiled.should_include(Path::new(".DS_Store")));
    }

    #[test]
    fn test_exclude_exact_filename() {
        let compiled = filters_with(
            ExcludeRules {
                filenames: vec!["Thumbs.db".to_string()],
                ..Default::default()
            },
            IncludeRules::default(),
            true,
        );

        assert!(!compiled.should_include(Path::new("Thumbs.db")));
        assert!(compiled.should_include(Path::new("image.jpg")));
    }

    #[test]
    fn test_exclude_extensions() {
        let compiled = filters_with(
            ExcludeRules {
                extensions: vec![".crdownload".to_string(), "part".to_string()],
                ..Default::default()
            },
            IncludeRules::default(),
            true,
        );

        assert!(!compiled.should_include(Path::new("movie.mkv.part")));
        assert!(!compiled.should_include(Path::new("setup.exe.CRDOWNLOAD")));
        assert!(compiled.should_include(Path::new("movie.mkv")));
    }

    #[test]
    fn test_exclude_glob_patterns() {
        let compiled = filters_with(
            ExcludeRules {
                patterns: vec!["*.cache".to_string(), "[0-9]*.tmp".to_string()],
                ..Default::default()
            },
            IncludeRules::default(),
            true,
        );

        assert!(!compiled.should_include(Path::new("file.cache")));
        assert!(!compiled.should_include(Path::new("99data.tmp")));
        assert!(compiled.should_include(Path::new("data.tmp")));
    }

    #[test]
    fn test_include_overrides_exclude() {
        let compiled = filters_with(
            ExcludeRules::default(),
            IncludeRules {
                patterns: vec![".important".to_string()],
            },
            false,
        );

        assert!(compiled.should_include(Path::new(".important")));
        assert!(!compiled.should_include(Path::new(".other")));
    }

    #[test]
    fn test_exclude_regex() {
        let compiled = filters_with(
            ExcludeRules {
                regex: vec![r"^test_.*\.txt$".to_string()],
                ..Default::default()
            },
            IncludeRules::default(),
            true,
        );

        assert!(!compiled.should_include(Path::new("test_file.txt")));
        assert!(compiled.should_include(Path::new("file.txt")));
    }

    #[test]
    fn test_invalid_patterns_return_error() {
        let bad_regex = FilterRules {
            exclude: ExcludeRules {
                regex: vec!["[invalid(".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            CompiledFilters::new(bad_regex),
            Err(ConfigError::InvalidRegexPattern { .. })
        ));

        let bad_glob = FilterRules {
            exclude: ExcludeRules {
                patterns: vec!["[invalid".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            CompiledFilters::new(bad_glob),
            Err(ConfigError::InvalidGlobPattern(_))
        ));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let settings: Settings = toml::from_str(
            r#"
[logging]
max_entries = 50
"#,
        )
        .unwrap();

        assert_eq!(settings.logging.max_entries, 50);
        assert_eq!(settings.logging.level, "info");
        assert!(settings.categories.is_none());
        assert_eq!(settings.filters.exclude.patterns, vec!["~*".to_string()]);
    }

    #[test]
    fn test_categories_from_file() {
        let settings: Settings = toml::from_str(
            r#"
[categories]
Books = [".epub", "PDF"]
"#,
        )
        .unwrap();

        let map = settings.category_map().unwrap();
        assert_eq!(map.category_for("pdf"), "Books");
        assert_eq!(map.category_for("png"), "Other");
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope.toml");

        assert_eq!(
            Settings::load(Some(&missing)).unwrap_err(),
            ConfigError::ConfigNotFound(missing.clone())
        );

        let (settings, err) = Settings::load_or_default(Some(&missing));
        assert!(err.is_some());
        assert!(settings.categories.is_none());
    }

    #[test]
    fn test_malformed_file_falls_back_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.toml");
        fs::write(&path, "[categories\nImages = ").unwrap();

        let (settings, err) = Settings::load_or_default(Some(&path));
        assert!(matches!(err, Some(ConfigError::ConfigInvalid(_))));
        assert_eq!(settings.category_map().unwrap().category_for("jpg"), "Images");
    }

    #[test]
    fn test_invalid_category_name_falls_back_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad_names.toml");
        fs::write(&path, "[categories]\n\"../escape\" = [\"pdf\"]\n").unwrap();

        let (settings, err) = Settings::load_or_default(Some(&path));
        assert!(err.is_some());
        assert!(settings.categories.is_none());
    }

    #[test]
    fn test_add_and_remove_category_round_trip_through_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut settings = Settings::default();
        assert_eq!(
            settings.add_category("Books", &["EPUB".to_string(), ".mobi".to_string(), "epub".to_string()]),
            2
        );
        assert!(settings.remove_category("Executables"));
        assert!(!settings.remove_category("Executables"));
        settings.save(&path).unwrap();

        let reloaded = Settings::load_from_file(&path).unwrap();
        let map = reloaded.category_map().unwrap();
        assert_eq!(map.category_for("epub"), "Books");
        assert_eq!(map.category_for("exe"), "Other");
        assert_eq!(map.category_for("jpg"), "Images");
    }
}
