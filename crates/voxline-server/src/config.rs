use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

/// Server settings, read from `VOXLINE_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub io_timeout: Duration,
    pub cors_origin: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; missing keys fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let port: u16 = var("VOXLINE_PORT", "8080")
            .parse()
            .context("Invalid VOXLINE_PORT")?;
        let max_upload_mb: usize = var("VOXLINE_MAX_UPLOAD_MB", "50")
            .parse()
            .context("Invalid VOXLINE_MAX_UPLOAD_MB")?;
        let io_timeout_secs: u64 = var("VOXLINE_IO_TIMEOUT_SECS", "30")
            .parse()
            .context("Invalid VOXLINE_IO_TIMEOUT_SECS")?;
        let max_upload_bytes = max_upload_mb
            .checked_mul(1024 * 1024)
            .with_context(|| format!("VOXLINE_MAX_UPLOAD_MB={} is too large", max_upload_mb))?;

        Ok(Self {
            host: var("VOXLINE_HOST", "0.0.0.0"),
            port,
            db_path: var("VOXLINE_DB_PATH", "voxline.db").into(),
            upload_dir: var("VOXLINE_UPLOAD_DIR", "uploads/audio").into(),
            max_upload_bytes,
            io_timeout: Duration::from_secs(io_timeout_secs),
            cors_origin: var("VOXLINE_CORS_ORIGIN", "http://localhost:4200"),
        })
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.upload_dir, PathBuf::from("uploads/audio"));
        assert_eq!(config.max_upload_bytes, 50 * 1024 * 1024);
        assert_eq!(config.io_timeout, Duration::from_secs(30));
        assert_eq!(config.cors_origin, "http://localhost:4200");
        assert_eq!(config.listen_addr().unwrap().to_string(), "0.0.0.0:8080");
    }

    #[test]
    fn overrides() {
        let config = config_from(&[
            ("VOXLINE_HOST", "127.0.0.1"),
            ("VOXLINE_PORT", "9000"),
            ("VOXLINE_UPLOAD_DIR", "/var/lib/voxline"),
            ("VOXLINE_MAX_UPLOAD_MB", "5"),
        ])
        .unwrap();
        assert_eq!(config.listen_addr().unwrap().to_string(), "127.0.0.1:9000");
        assert_eq!(config.upload_dir, PathBuf::from("/var/lib/voxline"));
        assert_eq!(config.max_upload_bytes, 5 * 1024 * 1024);
    }

    #[test]
    fn bad_numbers_are_errors() {
        let err = config_from(&[("VOXLINE_PORT", "http")]).unwrap_err();
        assert!(err.to_string().contains("VOXLINE_PORT"));
        assert!(config_from(&[("VOXLINE_IO_TIMEOUT_SECS", "-1")]).is_err());
    }

    #[test]
    fn oversized_upload_limit_is_an_error() {
        let huge = (usize::MAX / 1024).to_string();
        let err = config_from(&[("VOXLINE_MAX_UPLOAD_MB", huge.as_str())]).unwrap_err();
        assert!(err.to_string().contains("VOXLINE_MAX_UPLOAD_MB"));
    }
}
