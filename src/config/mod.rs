use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory below the workdir holding one directory per map.
pub const MAPS_DIR: &str = "maps";

/// Directory below the workdir holding pending build orders.
pub const ORDERS_DIR: &str = "orders";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Base working directory (contains `maps/`, `orders/` and the worker temp dirs)
    pub workdir: PathBuf,

    /// Maximum number of map builds running at the same time
    #[serde(default = "default_max_procs")]
    pub max_procs: usize,

    /// Seconds to wait for running builds after a shutdown signal
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,

    /// Seconds between two polls of the order queue
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Delay before the second (and last) attempt to claim an order
    #[serde(default = "default_claim_retry_delay_ms")]
    pub claim_retry_delay_ms: u64,

    /// Path of the Nik4 renderer driver
    pub renderer_command: String,

    /// Shared directory with the default marker files (`Printmaps*`)
    pub markers_dir: PathBuf,

    /// JSON file listing the available map styles
    pub styles_file: PathBuf,

    #[serde(default = "default_pdftk_command")]
    pub pdftk_command: String,

    #[serde(default = "default_zip_command")]
    pub zip_command: String,

    /// Keep temp dirs and generated style files, log successful commands
    #[serde(default)]
    pub test_mode: bool,

    /// Log one metrics line per finished build
    #[serde(default = "default_build_metrics")]
    pub build_metrics: bool,

    /// Prometheus scrape address (exporter disabled when unset)
    #[serde(default)]
    pub metrics_addr: Option<SocketAddr>,

    /// Append logs to this file instead of stdout
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Styles loaded from `styles_file`
    #[serde(skip)]
    pub styles: Vec<MapStyle>,
}

/// A named Mapnik base style.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MapStyle {
    pub name: String,
    pub xml_path: PathBuf,
    pub xml_file: String,
}

impl MapStyle {
    pub fn xml(&self) -> PathBuf {
        self.xml_path.join(&self.xml_file)
    }
}

fn default_max_procs() -> usize {
    2
}

fn default_grace_period_secs() -> u64 {
    300
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_claim_retry_delay_ms() -> u64 {
    10_000
}

fn default_pdftk_command() -> String {
    "pdftk".to_string()
}

fn default_zip_command() -> String {
    "zip".to_string()
}

fn default_build_metrics() -> bool {
    true
}

impl AppConfig {
    /// Load from `PRINTMAPS_*` environment variables (and `.env`), then read the style list.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let mut config: AppConfig = envy::prefixed("PRINTMAPS_").from_env()?;
        config.styles = load_styles(&config.styles_file)?;
        Ok(config)
    }

    /// Replace the configured workdir by its absolute, canonical form.
    pub fn resolve_workdir(&mut self) -> Result<(), ConfigError> {
        self.workdir = std::fs::canonicalize(&self.workdir).map_err(|source| ConfigError::Workdir {
            path: self.workdir.clone(),
            source,
        })?;
        Ok(())
    }

    pub fn maps_dir(&self) -> PathBuf {
        self.workdir.join(MAPS_DIR)
    }

    pub fn orders_dir(&self) -> PathBuf {
        self.workdir.join(ORDERS_DIR)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn claim_retry_delay(&self) -> Duration {
        Duration::from_millis(self.claim_retry_delay_ms)
    }

    pub fn find_style(&self, name: &str) -> Option<&MapStyle> {
        self.styles.iter().find(|style| style.name == name)
    }
}

/// Read the style list (`[{"name": .., "xml_path": .., "xml_file": ..}, ..]`).
pub fn load_styles(path: &Path) -> Result<Vec<MapStyle>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Styles {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::StylesFormat {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid environment configuration: {0}")]
    Env(#[from] envy::Error),

    #[error("Cannot read styles file {path}: {source}")]
    Styles {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid styles file {path}: {source}")]
    StylesFormat {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Cannot resolve working directory {path}: {source}")]
    Workdir {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let vars = vec![
            ("WORKDIR".to_string(), "/srv/printmaps".to_string()),
            ("RENDERER_COMMAND".to_string(), "nik4-printmaps.py".to_string()),
            ("MARKERS_DIR".to_string(), "/srv/markers".to_string()),
            ("STYLES_FILE".to_string(), "/srv/styles.json".to_string()),
        ];
        let config: AppConfig = envy::from_iter(vars).unwrap();

        assert_eq!(config.max_procs, 2);
        assert_eq!(config.grace_period(), Duration::from_secs(300));
        assert_eq!(config.zip_command, "zip");
        assert!(config.build_metrics);
        assert!(!config.test_mode);
        assert!(config.metrics_addr.is_none());
        assert_eq!(config.orders_dir(), PathBuf::from("/srv/printmaps/orders"));
        assert_eq!(config.maps_dir(), PathBuf::from("/srv/printmaps/maps"));
    }

    #[test]
    fn test_load_styles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("styles.json");
        std::fs::write(
            &path,
            r#"[{"name": "osm-carto", "xml_path": "/srv/styles/osm", "xml_file": "mapnik.xml"}]"#,
        )
        .unwrap();

        let styles = load_styles(&path).unwrap();
        assert_eq!(styles.len(), 1);
        assert_eq!(styles[0].xml(), PathBuf::from("/srv/styles/osm/mapnik.xml"));
    }

    #[test]
    fn test_load_styles_missing_file() {
        let err = load_styles(Path::new("/nonexistent/styles.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Styles { .. }));
    }
}
