//! Loads watcher options from files and environment variables.

use crate::core::WatcherOptions;
use crate::error::{Result, WatcherError};
use config::{Config, Environment, File};
use std::path::PathBuf;

/// Loads and merges [`WatcherOptions`] from multiple sources.
///
/// Files are merged in the order they were added, then environment
/// overrides are applied on top. Fields missing from every source keep
/// their defaults.
///
/// # Examples
///
/// ```rust,no_run
/// use policy_watcher::core::OptionsLoader;
///
/// # fn example() -> policy_watcher::error::Result<()> {
/// // WATCHER_CHANNEL=casbin-prod, WATCHER_POOL__MAX_SIZE=16, ...
/// let options = OptionsLoader::new()
///     .with_file("config/watcher.yaml")
///     .with_env_overrides("WATCHER", "__")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct OptionsLoader {
    file_paths: Vec<PathBuf>,
    env_prefix: Option<String>,
    env_separator: Option<String>,
}

impl OptionsLoader {
    /// Create a loader with no sources.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file source. The format is detected from the extension
    /// (YAML, TOML or JSON). Later files override earlier ones.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_paths.push(path.into());
        self
    }

    /// Apply environment variables named `<prefix>_<FIELD>` on top of the files.
    ///
    /// `separator` splits nested keys, so with `"__"` the variable
    /// `<prefix>_POOL__MAX_SIZE` sets `pool.max_size`.
    pub fn with_env_overrides(mut self, prefix: &str, separator: &str) -> Self {
        self.env_prefix = Some(prefix.to_string());
        self.env_separator = Some(separator.to_string());
        self
    }

    /// Load, merge and validate the options.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A file cannot be read or parsed
    /// - A value has the wrong type for its field
    /// - The merged options fail [`WatcherOptions::validate`]
    pub fn load(&self) -> Result<WatcherOptions> {
        let mut builder = Config::builder();

        for path in &self.file_paths {
            builder = builder.add_source(File::from(path.as_path()));
        }

        if let (Some(prefix), Some(separator)) = (&self.env_prefix, &self.env_separator) {
            builder = builder.add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("_")
                    .separator(separator)
                    .try_parsing(true),
            );
        }

        let config = builder
            .build()
            .map_err(|e| WatcherError::LoadError(format!("Failed to build options: {}", e)))?;

        let options: WatcherOptions = config.try_deserialize().map_err(|e| {
            WatcherError::DeserializationError(format!("Failed to deserialize options: {}", e))
        })?;

        options.validate()?;
        Ok(options)
    }
}
