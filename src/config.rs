//! Optional config file loading. Search order: ./mdpack.toml, then
//! $XDG_CONFIG_HOME/mdpack/config.toml (or ~/.config/mdpack/config.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default, deny_unknown_fields)]
pub struct Config {
    /// Default output directory when -o is not set. Paths are relative to CWD.
    pub output_dir: Option<PathBuf>,
    /// Default translation language code (e.g. "en", "pt-br").
    pub language: Option<String>,
    /// Default output format: cbz, pdf, or epub.
    pub format: Option<String>,
    /// HTTP User-Agent header.
    pub user_agent: Option<String>,
    /// Minimum delay in milliseconds between requests.
    pub request_delay_ms: Option<u64>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Number of HTTP attempts for transient failures.
    pub retry_count: Option<u32>,
    /// Delay in seconds before each retry (e.g. [1, 2, 4]). Empty means exponential steps.
    pub retry_backoff_secs: Option<Vec<u64>>,
    /// Download compressed (data-saver) images.
    pub data_saver: Option<bool>,
    /// Keep going after a chapter fails instead of stopping the run.
    pub continue_on_error: Option<bool>,
}

const LOCAL_FILE: &str = "mdpack.toml";

/// Candidate config files, most specific first.
fn config_paths(cwd: &Path, config_dir: Option<&Path>) -> Vec<PathBuf> {
    std::iter::once(cwd.join(LOCAL_FILE))
        .chain(config_dir.map(|d| d.join("mdpack").join("config.toml")))
        .collect()
}

/// Load the first config file that exists.
/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present file returns Err.
pub fn load_config() -> Result<Option<Config>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let Some(path) = config_paths(&cwd, dirs::config_dir().as_deref())
        .into_iter()
        .find(|p| p.exists())
    else {
        return Ok(None);
    };
    let text = std::fs::read_to_string(&path)
        .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
    let config = toml::from_str(&text)
        .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(Some(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_config() {
        let c: Config = toml::from_str("").unwrap();
        assert!(c.output_dir.is_none());
        assert!(c.language.is_none());
        assert!(c.format.is_none());
        assert!(c.request_delay_ms.is_none());
        assert!(c.retry_backoff_secs.is_none());
        assert!(c.data_saver.is_none());
        assert!(c.continue_on_error.is_none());
    }

    #[test]
    fn parse_full_config() {
        let s = r#"
            output_dir = "manga"
            language = "pt-br"
            format = "pdf"
            user_agent = "Custom/1.0"
            request_delay_ms = 500
            timeout_secs = 60
            retry_count = 4
            retry_backoff_secs = [2, 4, 8]
            data_saver = true
            continue_on_error = true
        "#;
        let c: Config = toml::from_str(s).unwrap();
        assert_eq!(c.output_dir.as_deref(), Some(Path::new("manga")));
        assert_eq!(c.language.as_deref(), Some("pt-br"));
        assert_eq!(c.format.as_deref(), Some("pdf"));
        assert_eq!(c.user_agent.as_deref(), Some("Custom/1.0"));
        assert_eq!(c.request_delay_ms, Some(500));
        assert_eq!(c.timeout_secs, Some(60));
        assert_eq!(c.retry_count, Some(4));
        assert_eq!(c.retry_backoff_secs.as_deref(), Some([2, 4, 8].as_slice()));
        assert_eq!(c.data_saver, Some(true));
        assert_eq!(c.continue_on_error, Some(true));
    }

    #[test]
    fn parse_partial_config() {
        let c: Config = toml::from_str("data_saver = false").unwrap();
        assert_eq!(c.data_saver, Some(false));
        assert!(c.output_dir.is_none());
        assert!(c.timeout_secs.is_none());
    }

    #[test]
    fn local_file_is_searched_first() {
        let paths = config_paths(Path::new("/work"), Some(Path::new("/home/u/.config")));
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/work/mdpack.toml"),
                PathBuf::from("/home/u/.config/mdpack/config.toml"),
            ]
        );
        assert_eq!(config_paths(Path::new("/work"), None).len(), 1);
    }

    #[test]
    fn invalid_toml_errors() {
        assert!(toml::from_str::<Config>("output_dir = [").is_err());
    }

    #[test]
    fn unknown_key_errors() {
        assert!(toml::from_str::<Config>("request_delay_secs = 2").is_err());
    }
}
