use anyhow::{bail, Context};
use facegate_core::notify::Destinations;
use facegate_core::Thresholds;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Daemon configuration: optional TOML file, then `FACEGATE_*` variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP API binds to.
    pub listen: SocketAddr,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Directory evidence photos are written under.
    pub evidence_dir: PathBuf,
    /// HMAC secret for session tokens. Must not be empty.
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    /// Secret camera passwords are sealed with. Falls back to `jwt_secret`.
    pub camera_secret: String,
    /// Base URL of the face-recognition service.
    pub face_service_url: String,
    pub face_service_timeout_secs: u64,
    /// Minimum confidence to grant (0..1), before the zone's own minimum.
    pub confidence_threshold: f32,
    /// Below this confidence the person is treated as unknown.
    pub unknown_floor: f32,
    pub alert_email: String,
    pub telegram_chat_id: String,
    /// Where external notifications are POSTed. Empty leaves them pending.
    pub notify_webhook_url: String,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 3000)),
            db_path: data_dir.join("facegate.db"),
            evidence_dir: data_dir.join("evidence"),
            jwt_secret: String::new(),
            token_ttl_hours: 24,
            camera_secret: String::new(),
            face_service_url: "http://localhost:8000".to_string(),
            face_service_timeout_secs: 10,
            confidence_threshold: 0.80,
            unknown_floor: 0.80,
            alert_email: "admin@sistema.com".to_string(),
            telegram_chat_id: String::new(),
            notify_webhook_url: String::new(),
        }
    }
}

/// `$XDG_DATA_HOME/facegate`, or `~/.local/share/facegate`.
pub fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facegate")
}

impl Config {
    /// Load `FACEGATE_CONFIG` (when set), apply environment overrides and
    /// check the result.
    pub fn load() -> anyhow::Result<Self> {
        let base = match std::env::var("FACEGATE_CONFIG") {
            Ok(path) if !path.is_empty() => Self::from_file(Path::new(&path))?,
            _ => Self::default(),
        };
        let config = base.with_env();
        config.check()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Override fields from `FACEGATE_*` environment variables.
    pub fn with_env(self) -> Self {
        Self {
            listen: env_parse("FACEGATE_LISTEN", self.listen),
            db_path: env_path("FACEGATE_DB_PATH", self.db_path),
            evidence_dir: env_path("FACEGATE_EVIDENCE_DIR", self.evidence_dir),
            jwt_secret: env_string("FACEGATE_JWT_SECRET", self.jwt_secret),
            token_ttl_hours: env_parse("FACEGATE_TOKEN_TTL_HOURS", self.token_ttl_hours),
            camera_secret: env_string("FACEGATE_CAMERA_SECRET", self.camera_secret),
            face_service_url: env_string("FACEGATE_FACE_SERVICE_URL", self.face_service_url),
            face_service_timeout_secs: env_parse(
                "FACEGATE_FACE_SERVICE_TIMEOUT_SECS",
                self.face_service_timeout_secs,
            ),
            confidence_threshold: env_parse("FACEGATE_CONFIDENCE_THRESHOLD", self.confidence_threshold),
            unknown_floor: env_parse("FACEGATE_UNKNOWN_FLOOR", self.unknown_floor),
            alert_email: env_string("FACEGATE_ALERT_EMAIL", self.alert_email),
            telegram_chat_id: env_string("FACEGATE_TELEGRAM_CHAT_ID", self.telegram_chat_id),
            notify_webhook_url: env_string("FACEGATE_NOTIFY_WEBHOOK_URL", self.notify_webhook_url),
        }
    }

    pub fn check(&self) -> anyhow::Result<()> {
        if self.jwt_secret.trim().is_empty() {
            bail!("FACEGATE_JWT_SECRET must be set");
        }
        if self.token_ttl_hours <= 0 {
            bail!("token TTL must be positive (got {})", self.token_ttl_hours);
        }
        for (name, v) in [
            ("confidence threshold", self.confidence_threshold),
            ("unknown floor", self.unknown_floor),
        ] {
            if !(0.0..=1.0).contains(&v) {
                bail!("{name} must be between 0 and 1 (got {v})");
            }
        }
        Ok(())
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            unknown_floor: self.unknown_floor,
            confidence: self.confidence_threshold,
        }
    }

    pub fn destinations(&self) -> Destinations {
        Destinations {
            admin_email: self.alert_email.clone(),
            telegram_chat_id: self.telegram_chat_id.clone(),
        }
    }

    pub fn camera_secret(&self) -> &str {
        if self.camera_secret.is_empty() {
            &self.jwt_secret
        } else {
            &self.camera_secret
        }
    }
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = Config::default();
        assert_eq!(c.listen.port(), 3000);
        assert_eq!(c.token_ttl_hours, 24);
        assert_eq!(c.face_service_url, "http://localhost:8000");
        assert!(c.db_path.ends_with("facegate/facegate.db"));
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(Config::default().check().is_err());
        let c = Config {
            jwt_secret: "s3cret".into(),
            ..Config::default()
        };
        assert!(c.check().is_ok());
        assert_eq!(c.camera_secret(), "s3cret");
    }

    #[test]
    fn test_from_file_keeps_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("facegate.toml");
        std::fs::write(
            &path,
            "listen = \"0.0.0.0:8080\"\njwt_secret = \"abc\"\nconfidence_threshold = 0.9\n",
        )
        .unwrap();
        let c = Config::from_file(&path).unwrap();
        assert_eq!(c.listen.port(), 8080);
        assert_eq!(c.confidence_threshold, 0.9);
        assert_eq!(c.unknown_floor, 0.80);
        assert_eq!(c.token_ttl_hours, 24);
    }

    #[test]
    fn test_out_of_range_threshold() {
        let c = Config {
            jwt_secret: "x".into(),
            unknown_floor: 1.5,
            ..Config::default()
        };
        assert!(c.check().is_err());
    }
}
