// src/config.rs

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Contents of the YAML configuration file
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub format: FormatConfig,
    pub source: Source,
}

/// Where and at which revision source lines are blamed
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Source {
    pub repository: PathBuf,
    /// Defaults to `HEAD`
    pub revision: Option<String>,
}

impl Source {
    pub fn revision_spec(&self) -> &str {
        match self.revision.as_deref() {
            Some(spec) if !spec.trim().is_empty() => spec,
            _ => "HEAD",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FormatConfig {
    /// Placeholders: `{head}`, `{file}`, `{line}`, `{commit}`
    pub commit_url: Option<String>,
    pub file_url: Option<String>,
    pub blame_url: Option<String>,
    /// Replaces the built-in message copied to the clipboard
    pub custom_message: Option<String>,
    /// Show full source paths instead of file names
    pub full_path: bool,
    pub colors: Palette,
}

/// Styles such as `"red bold"` or `"fg-white,bg-blue"` for each part of the display
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Palette {
    pub function_std_lib: String,
    pub function_std_lib_exported: String,
    pub function_main: String,
    pub function_other: String,
    pub function_other_exported: String,

    pub routine: String,
    pub routine_first: String,

    pub source_file: String,
    pub arguments: String,

    pub commit_id: String,
    pub commit_date: String,

    pub highlight: String,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            function_std_lib: "green".into(),
            function_std_lib_exported: "green bold".into(),
            function_main: "yellow bold".into(),
            function_other: "red".into(),
            function_other_exported: "red bold".into(),

            routine: "magenta".into(),
            routine_first: "magenta bold".into(),

            source_file: "white".into(),
            arguments: "white".into(),

            commit_id: "white bold".into(),
            commit_date: "white".into(),

            highlight: "bg-blue".into(),
        }
    }
}

impl Config {
    /// Reads `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No configuration at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };
        Self::from_yaml(&text).with_context(|| format!("Failed to load {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }
}

/// `$HOME/.blame-trace.yaml`
pub fn default_config_path() -> PathBuf {
    let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_default();
    home.join(".blame-trace.yaml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_full_config() {
        let cfg = Config::from_yaml(
            r#"
source:
  repository: /src/app
  revision: v1.2.0
format:
  commit_url: "https://git.example.com/app/commit/{commit}"
  full_path: true
  colors:
    routine: cyan
"#,
        )
        .unwrap();

        assert_eq!(cfg.source.repository, PathBuf::from("/src/app"));
        assert_eq!(cfg.source.revision_spec(), "v1.2.0");
        assert_eq!(
            cfg.format.commit_url.as_deref(),
            Some("https://git.example.com/app/commit/{commit}")
        );
        assert!(cfg.format.full_path);
        assert_eq!(cfg.format.colors.routine, "cyan");
        assert_eq!(cfg.format.colors.routine_first, "magenta bold");
        assert_eq!(cfg.format.file_url, None);
    }

    #[test]
    fn empty_config_is_default() {
        assert_eq!(Config::from_yaml("").unwrap(), Config::default());
        assert_eq!(Config::default().source.revision_spec(), "HEAD");
    }

    #[test]
    fn blank_revision_means_head() {
        let source = Source {
            repository: PathBuf::new(),
            revision: Some("  ".into()),
        };
        assert_eq!(source.revision_spec(), "HEAD");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_yaml("format:\n  comit_url: x\n").is_err());
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn broken_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.yaml");
        std::fs::write(&path, "source: [").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(format!("{err:#}").starts_with("Failed to load"));
    }
}
