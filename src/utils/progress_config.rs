// src/utils/progress_config.rs

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::env;

/// Configuration for progress tracking throughout the pipeline
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    /// Whether to show progress bars at all
    pub enabled: bool,
    /// Whether to show per-source load bars during the external join
    pub detailed: bool,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            detailed: true,
        }
    }
}

impl ProgressConfig {
    /// Create progress configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// As [`ProgressConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let flag = |key: &str| lookup(key).and_then(|v| v.parse().ok()).unwrap_or(true);
        Self {
            enabled: flag("PROGRESS_ENABLED"),
            detailed: flag("PROGRESS_DETAILED"),
        }
    }

    /// Create a MultiProgress instance if progress is enabled, None otherwise
    pub fn create_multi_progress(&self) -> Option<MultiProgress> {
        if self.enabled {
            Some(MultiProgress::new())
        } else {
            None
        }
    }

    pub fn should_show_detailed(&self) -> bool {
        self.enabled && self.detailed
    }
}

/// Top-level bar tracking the pipeline phases.
pub fn main_progress_bar(multi_progress: Option<&MultiProgress>, phases: u64) -> Option<ProgressBar> {
    multi_progress.map(|mp| {
        let pb = mp.add(ProgressBar::new(phases));
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        pb.set_message("Initializing pipeline...");
        pb
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProgressConfig::default();
        assert!(config.enabled);
        assert!(config.detailed);
    }

    #[test]
    fn test_env_config() {
        let config = ProgressConfig::from_lookup(|key| match key {
            "PROGRESS_ENABLED" | "PROGRESS_DETAILED" => Some("false".to_string()),
            _ => None,
        });
        assert!(!config.enabled);
        assert!(!config.detailed);

        let unset = ProgressConfig::from_lookup(|_| None);
        assert!(unset.enabled);
        assert!(unset.detailed);
    }

    #[test]
    fn test_multi_progress_creation() {
        let mut config = ProgressConfig::default();

        config.enabled = true;
        assert!(config.create_multi_progress().is_some());

        config.enabled = false;
        assert!(config.create_multi_progress().is_none());
        assert!(main_progress_bar(None, 4).is_none());
    }

    #[test]
    fn test_should_show_detailed() {
        let mut config = ProgressConfig::default();
        assert!(config.should_show_detailed());

        config.detailed = false;
        assert!(!config.should_show_detailed());

        config.detailed = true;
        config.enabled = false;
        assert!(!config.should_show_detailed());
    }
}
