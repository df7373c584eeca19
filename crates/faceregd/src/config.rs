use clap::Parser;
use facereg_core::{MultiFacePolicy, DEFAULT_TOLERANCE};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Command-line flags. Each one overrides the matching config value.
#[derive(Parser, Debug, Default)]
#[command(name = "faceregd", version, about = "facereg face recognition daemon")]
pub struct Args {
    /// TOML config file (also read from FACEREG_CONFIG)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Address to listen on, e.g. 127.0.0.1:5000
    #[arg(short, long)]
    pub listen: Option<SocketAddr>,
    /// Directory holding one reference image per known face
    #[arg(long)]
    pub faces_dir: Option<PathBuf>,
    /// Directory containing det_10g.onnx and w600k_r50.onnx
    #[arg(long)]
    pub model_dir: Option<PathBuf>,
}

/// Daemon configuration.
///
/// Resolved in order: defaults, TOML file, `FACEREG_*` environment
/// variables, command-line flags.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP API binds to (default: 0.0.0.0:5000).
    pub listen_addr: SocketAddr,
    /// Known-faces directory; the filename stem of each image is its identity.
    pub faces_dir: PathBuf,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Maximum Euclidean distance for a match.
    pub tolerance: f32,
    /// What an upload with several faces does.
    pub on_multiple_faces: MultiFacePolicy,
    /// Largest accepted reference photo.
    pub max_upload_bytes: usize,
    /// Smallest accepted reference photo.
    pub min_upload_bytes: usize,
    /// How long a request waits for the engine before giving up.
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            faces_dir: PathBuf::from("static/image/faces"),
            model_dir: facereg_core::default_model_dir(),
            tolerance: DEFAULT_TOLERANCE,
            on_multiple_faces: MultiFacePolicy::default(),
            max_upload_bytes: 16 * 1024 * 1024,
            min_upload_bytes: 1024,
            request_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Build the effective configuration for this process.
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let file = args
            .config
            .clone()
            .or_else(|| std::env::var("FACEREG_CONFIG").ok().map(PathBuf::from));

        let mut config = match file {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.apply_args(args);
        Ok(config)
    }

    /// Parse a TOML file; missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `FACEREG_*` overrides. Unparseable values are ignored with a warning.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = parse_var(&lookup, "FACEREG_LISTEN_ADDR") {
            self.listen_addr = v;
        }
        if let Some(v) = lookup("FACEREG_FACES_DIR") {
            self.faces_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACEREG_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = parse_var(&lookup, "FACEREG_TOLERANCE") {
            self.tolerance = v;
        }
        if let Some(v) = parse_var(&lookup, "FACEREG_ON_MULTIPLE_FACES") {
            self.on_multiple_faces = v;
        }
        if let Some(v) = parse_var(&lookup, "FACEREG_MAX_UPLOAD_BYTES") {
            self.max_upload_bytes = v;
        }
        if let Some(v) = parse_var(&lookup, "FACEREG_MIN_UPLOAD_BYTES") {
            self.min_upload_bytes = v;
        }
        if let Some(v) = parse_var(&lookup, "FACEREG_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = v;
        }
    }

    fn apply_args(&mut self, args: &Args) {
        if let Some(addr) = args.listen {
            self.listen_addr = addr;
        }
        if let Some(dir) = &args.faces_dir {
            self.faces_dir = dir.clone();
        }
        if let Some(dir) = &args.model_dir {
            self.model_dir = dir.clone();
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable environment override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.listen_addr.port(), 5000);
        assert_eq!(config.tolerance, 0.6);
        assert_eq!(config.on_multiple_faces, MultiFacePolicy::Reject);
        assert_eq!(config.max_upload_bytes, 16 * 1024 * 1024);
        assert_eq!(config.min_upload_bytes, 1024);
    }

    #[test]
    fn test_from_file_partial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faceregd.toml");
        std::fs::write(
            &path,
            "faces_dir = \"/srv/faces\"\ntolerance = 0.5\non_multiple_faces = \"use_first\"\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.faces_dir, PathBuf::from("/srv/faces"));
        assert_eq!(config.tolerance, 0.5);
        assert_eq!(config.on_multiple_faces, MultiFacePolicy::UseFirst);
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn test_from_file_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "tolerance = \"very\"").unwrap();
        assert!(matches!(Config::from_file(&path), Err(ConfigError::Parse { .. })));
        assert!(matches!(
            Config::from_file(&dir.path().join("missing.toml")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("FACEREG_LISTEN_ADDR", "127.0.0.1:8080"),
            ("FACEREG_TOLERANCE", "0.45"),
            ("FACEREG_ON_MULTIPLE_FACES", "use_first"),
            ("FACEREG_MIN_UPLOAD_BYTES", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.listen_addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.tolerance, 0.45);
        assert_eq!(config.on_multiple_faces, MultiFacePolicy::UseFirst);
        assert_eq!(config.min_upload_bytes, 1024);
    }

    #[test]
    fn test_args_override_everything() {
        let args = Args {
            listen: Some("10.0.0.1:9000".parse().unwrap()),
            faces_dir: Some(PathBuf::from("/tmp/faces")),
            ..Args::default()
        };
        let mut config = Config::default();
        config.apply_env(|key| (key == "FACEREG_FACES_DIR").then(|| "/env/faces".to_string()));
        config.apply_args(&args);
        assert_eq!(config.listen_addr.port(), 9000);
        assert_eq!(config.faces_dir, PathBuf::from("/tmp/faces"));
    }
}
