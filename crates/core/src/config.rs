use serde::{Deserialize, Serialize};
use std::{
    fmt,
    net::SocketAddr,
    path::{Path, PathBuf},
};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5000";
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";
pub const DEFAULT_SCRATCH_DIR: &str = "temp_audio";
pub const DEFAULT_MODEL_PATH: &str = "emotion_classifier.json";
pub const DEFAULT_SCALER_PATH: &str = "scaler.json";
pub const DEFAULT_LABELS_PATH: &str = "label_encoder.json";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;
pub const ENV_BIND: &str = "EMOTION_API_BIND";
pub const ENV_CORS_ORIGIN: &str = "EMOTION_API_CORS_ORIGIN";
pub const ENV_SCRATCH_DIR: &str = "EMOTION_API_SCRATCH_DIR";
pub const ENV_MODEL_PATH: &str = "EMOTION_API_MODEL_PATH";
pub const ENV_SCALER_PATH: &str = "EMOTION_API_SCALER_PATH";
pub const ENV_LABELS_PATH: &str = "EMOTION_API_LABELS_PATH";
pub const ENV_MAX_UPLOAD_BYTES: &str = "EMOTION_API_MAX_UPLOAD_BYTES";

/// The single browser origin allowed to call the API.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CorsOrigin(String);

impl CorsOrigin {
    pub fn new<S: Into<String>>(value: S) -> Result<Self, ConfigError> {
        let v = value.into();
        let trimmed = v.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::EmptyCorsOrigin);
        }
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(ConfigError::InvalidCorsOrigin(v));
        }
        // Browsers send the origin without a trailing slash.
        Ok(Self(trimmed.trim_end_matches('/').to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorsOrigin {
    fn default() -> Self {
        Self(DEFAULT_CORS_ORIGIN.to_owned())
    }
}

impl fmt::Display for CorsOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadLimit {
    pub max_bytes: usize,
}

impl UploadLimit {
    pub fn new(max_bytes: usize) -> Result<Self, ConfigError> {
        if max_bytes == 0 {
            return Err(ConfigError::ZeroUploadLimit);
        }
        Ok(Self { max_bytes })
    }
}

impl Default for UploadLimit {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// Locations of the three artifacts loaded at startup.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub classifier: PathBuf,
    pub scaler: PathBuf,
    pub labels: PathBuf,
}

impl ArtifactPaths {
    /// Resolves the three default file names against `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            classifier: dir.join(DEFAULT_MODEL_PATH),
            scaler: dir.join(DEFAULT_SCALER_PATH),
            labels: dir.join(DEFAULT_LABELS_PATH),
        }
    }
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            classifier: PathBuf::from(DEFAULT_MODEL_PATH),
            scaler: PathBuf::from(DEFAULT_SCALER_PATH),
            labels: PathBuf::from(DEFAULT_LABELS_PATH),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub cors_origin: CorsOrigin,
    pub scratch_dir: PathBuf,
    pub artifacts: ArtifactPaths,
    pub upload_limit: UploadLimit,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 5000)),
            cors_origin: CorsOrigin::default(),
            scratch_dir: PathBuf::from(DEFAULT_SCRATCH_DIR),
            artifacts: ArtifactPaths::default(),
            upload_limit: UploadLimit::default(),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("cors origin must not be empty")]
    EmptyCorsOrigin,
    #[error("cors origin must be an http(s) origin, got {0:?}")]
    InvalidCorsOrigin(String),
    #[error("upload limit must be > 0 bytes")]
    ZeroUploadLimit,
    #[error("invalid bind address {0:?}")]
    InvalidBindAddr(String),
    #[error("invalid value {value:?} for {key}")]
    InvalidNumber { key: String, value: String },
    #[error("{0} must not be empty")]
    EmptyPath(&'static str),
}

pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StdEnv;

impl Env for StdEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: std::collections::BTreeMap<String, String>,
}

impl MapEnv {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn resolve_string_with_default(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
    default: &str,
) -> String {
    match cli_value {
        Some(v) => v,
        None => env.var(env_key).unwrap_or_else(|| default.to_owned()),
    }
}

pub fn resolve_path(
    cli_value: Option<PathBuf>,
    env_key: &'static str,
    env: &impl Env,
    default: &str,
) -> Result<PathBuf, ConfigError> {
    let path = match cli_value {
        Some(p) => p,
        None => PathBuf::from(env.var(env_key).unwrap_or_else(|| default.to_owned())),
    };
    if path.as_os_str().is_empty() {
        return Err(ConfigError::EmptyPath(env_key));
    }
    Ok(path)
}

pub fn resolve_bind_addr(
    cli_value: Option<String>,
    env: &impl Env,
) -> Result<SocketAddr, ConfigError> {
    let raw = resolve_string_with_default(cli_value, ENV_BIND, env, DEFAULT_BIND_ADDR);
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidBindAddr(raw))
}

pub fn resolve_upload_limit(
    cli_value: Option<usize>,
    env: &impl Env,
) -> Result<UploadLimit, ConfigError> {
    let max_bytes = match cli_value {
        Some(v) => v,
        None => match env.var(ENV_MAX_UPLOAD_BYTES) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidNumber {
                    key: ENV_MAX_UPLOAD_BYTES.to_owned(),
                    value: raw,
                })?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        },
    };
    UploadLimit::new(max_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_origin_rejects_empty_and_non_http() {
        assert_eq!(CorsOrigin::new("  "), Err(ConfigError::EmptyCorsOrigin));
        assert!(matches!(
            CorsOrigin::new("localhost:3000"),
            Err(ConfigError::InvalidCorsOrigin(_))
        ));
    }

    #[test]
    fn cors_origin_strips_trailing_slash() {
        let o = CorsOrigin::new("https://app.example.com/").expect("valid origin");
        assert_eq!(o.as_str(), "https://app.example.com");
    }

    #[test]
    fn bind_addr_cli_takes_precedence_over_env() {
        let env = MapEnv::default().with_var(ENV_BIND, "0.0.0.0:9000");
        let addr = resolve_bind_addr(Some("127.0.0.1:8080".to_owned()), &env).expect("valid");
        assert_eq!(addr.port(), 8080);
    }

    #[test]
    fn bind_addr_env_used_when_cli_missing() {
        let env = MapEnv::default().with_var(ENV_BIND, "0.0.0.0:9000");
        let addr = resolve_bind_addr(None, &env).expect("valid");
        assert_eq!(addr.port(), 9000);
    }

    #[test]
    fn bind_addr_default_matches_constant() {
        let addr = resolve_bind_addr(None, &MapEnv::default()).expect("valid");
        assert_eq!(addr, AppConfig::default().bind);
    }

    #[test]
    fn bind_addr_rejects_garbage() {
        let err = resolve_bind_addr(Some("nope".to_owned()), &MapEnv::default()).unwrap_err();
        assert_eq!(err, ConfigError::InvalidBindAddr("nope".to_owned()));
    }

    #[test]
    fn upload_limit_from_env_and_zero_rejected() {
        let env = MapEnv::default().with_var(ENV_MAX_UPLOAD_BYTES, "1024");
        assert_eq!(resolve_upload_limit(None, &env).expect("valid").max_bytes, 1024);

        let env = MapEnv::default().with_var(ENV_MAX_UPLOAD_BYTES, "lots");
        assert!(matches!(
            resolve_upload_limit(None, &env),
            Err(ConfigError::InvalidNumber { .. })
        ));

        assert_eq!(
            resolve_upload_limit(Some(0), &MapEnv::default()),
            Err(ConfigError::ZeroUploadLimit)
        );
    }

    #[test]
    fn resolve_path_env_then_default() {
        let env = MapEnv::default().with_var(ENV_SCALER_PATH, "/models/scaler.json");
        let p = resolve_path(None, ENV_SCALER_PATH, &env, DEFAULT_SCALER_PATH).expect("valid");
        assert_eq!(p, PathBuf::from("/models/scaler.json"));

        let p = resolve_path(None, ENV_SCALER_PATH, &MapEnv::default(), DEFAULT_SCALER_PATH)
            .expect("valid");
        assert_eq!(p, PathBuf::from(DEFAULT_SCALER_PATH));
    }

    #[test]
    fn resolve_path_rejects_empty() {
        let err = resolve_path(
            Some(PathBuf::new()),
            ENV_MODEL_PATH,
            &MapEnv::default(),
            DEFAULT_MODEL_PATH,
        )
        .unwrap_err();
        assert_eq!(err, ConfigError::EmptyPath(ENV_MODEL_PATH));
    }

    #[test]
    fn resolve_string_with_default_default_used_when_both_missing() {
        let v = resolve_string_with_default(None, ENV_CORS_ORIGIN, &MapEnv::default(), "def");
        assert_eq!(v, "def");
    }
}
