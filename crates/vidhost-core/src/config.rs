//! Configuration module
//!
//! Provider credentials, transfer tuning and polling limits, read from the
//! environment (with `.env` support) and validated once at startup.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::provider_types::ProviderKind;

const MUX_API_BASE_URL: &str = "https://api.mux.com";
const VIMEO_API_BASE_URL: &str = "https://api.vimeo.com";
const VIMEO_FOLDER_ID: &str = "25641614";
const HTTP_TIMEOUT_SECS: u64 = 300;
const UPLOAD_CHUNK_SIZE_BYTES: u64 = 5 * 1024 * 1024;
const UPLOAD_MAX_ATTEMPTS: u32 = 3;
const UPLOAD_RETRY_BASE_DELAY_MS: u64 = 1000;
const STATUS_POLL_INTERVAL_SECS: u64 = 2;
const STATUS_POLL_TIMEOUT_SECS: u64 = 4 * 60;
const SESSION_STORE_DIR: &str = ".vidhost";
const DIRECT_UPLOAD_TIMEOUT_SECS: u64 = 60 * 60;

/// Mux access token pair (Basic auth)
#[derive(Clone)]
pub struct MuxCredentials {
    pub token_id: String,
    pub token_secret: String,
}

impl std::fmt::Debug for MuxCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MuxCredentials")
            .field("token_id", &self.token_id)
            .field("token_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct MuxConfig {
    pub credentials: Option<MuxCredentials>,
    pub api_base_url: String,
}

#[derive(Clone)]
pub struct VimeoConfig {
    pub access_token: Option<String>,
    pub api_base_url: String,
    /// Folder new uploads are placed in
    pub folder_id: String,
}

impl std::fmt::Debug for VimeoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VimeoConfig")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("api_base_url", &self.api_base_url)
            .field("folder_id", &self.folder_id)
            .finish()
    }
}

/// Transfer and polling tuning
#[derive(Clone, Debug)]
pub struct UploadConfig {
    pub chunk_size_bytes: u64,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub poll_interval_secs: u64,
    pub poll_timeout_secs: u64,
    pub session_store_dir: PathBuf,
    /// Lifetime advertised for upload links handed to third parties
    pub direct_upload_timeout_secs: u64,
}

impl UploadConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: UPLOAD_CHUNK_SIZE_BYTES,
            max_attempts: UPLOAD_MAX_ATTEMPTS,
            retry_base_delay_ms: UPLOAD_RETRY_BASE_DELAY_MS,
            poll_interval_secs: STATUS_POLL_INTERVAL_SECS,
            poll_timeout_secs: STATUS_POLL_TIMEOUT_SECS,
            session_store_dir: PathBuf::from(SESSION_STORE_DIR),
            direct_upload_timeout_secs: DIRECT_UPLOAD_TIMEOUT_SECS,
        }
    }
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub mux: MuxConfig,
    pub vimeo: VimeoConfig,
    pub upload: UploadConfig,
    pub http_timeout_secs: u64,
    pub default_cors_origin: String,
    pub default_provider: ProviderKind,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mux_credentials = match (non_empty("MUX_TOKEN_ID"), non_empty("MUX_TOKEN_SECRET")) {
            (Some(token_id), Some(token_secret)) => Some(MuxCredentials {
                token_id,
                token_secret,
            }),
            (None, None) => None,
            _ => {
                return Err(anyhow::anyhow!(
                    "MUX_TOKEN_ID and MUX_TOKEN_SECRET must be set together"
                ))
            }
        };

        let default_provider = non_empty("DEFAULT_PROVIDER")
            .unwrap_or_else(|| ProviderKind::Vimeo.to_string())
            .parse::<ProviderKind>()
            .map_err(|e| anyhow::anyhow!("DEFAULT_PROVIDER: {}", e))?;

        let parse_u64 = |key: &str, default: u64| {
            non_empty(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };

        let upload = UploadConfig {
            chunk_size_bytes: parse_u64("UPLOAD_CHUNK_SIZE_BYTES", UPLOAD_CHUNK_SIZE_BYTES),
            max_attempts: non_empty("UPLOAD_MAX_ATTEMPTS")
                .and_then(|v| v.trim().parse::<u32>().ok())
                .unwrap_or(UPLOAD_MAX_ATTEMPTS),
            retry_base_delay_ms: parse_u64("UPLOAD_RETRY_BASE_DELAY_MS", UPLOAD_RETRY_BASE_DELAY_MS),
            poll_interval_secs: parse_u64("STATUS_POLL_INTERVAL_SECS", STATUS_POLL_INTERVAL_SECS),
            poll_timeout_secs: parse_u64("STATUS_POLL_TIMEOUT_SECS", STATUS_POLL_TIMEOUT_SECS),
            session_store_dir: non_empty("SESSION_STORE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(SESSION_STORE_DIR)),
            direct_upload_timeout_secs: parse_u64(
                "DIRECT_UPLOAD_TIMEOUT_SECS",
                DIRECT_UPLOAD_TIMEOUT_SECS,
            ),
        };

        let config = Config {
            mux: MuxConfig {
                credentials: mux_credentials,
                api_base_url: non_empty("MUX_API_BASE_URL")
                    .unwrap_or_else(|| MUX_API_BASE_URL.to_string()),
            },
            vimeo: VimeoConfig {
                access_token: non_empty("VIMEO_ACCESS_TOKEN"),
                api_base_url: non_empty("VIMEO_API_BASE_URL")
                    .unwrap_or_else(|| VIMEO_API_BASE_URL.to_string()),
                folder_id: non_empty("VIMEO_FOLDER_ID")
                    .unwrap_or_else(|| VIMEO_FOLDER_ID.to_string()),
            },
            upload,
            http_timeout_secs: parse_u64("HTTP_TIMEOUT_SECS", HTTP_TIMEOUT_SECS),
            default_cors_origin: non_empty("DEFAULT_CORS_ORIGIN").unwrap_or_else(|| "*".to_string()),
            default_provider,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.upload.chunk_size_bytes == 0 {
            return Err(anyhow::anyhow!(
                "UPLOAD_CHUNK_SIZE_BYTES must be greater than 0"
            ));
        }

        if self.upload.max_attempts == 0 {
            return Err(anyhow::anyhow!("UPLOAD_MAX_ATTEMPTS must be at least 1"));
        }

        if self.upload.poll_interval_secs == 0 {
            return Err(anyhow::anyhow!(
                "STATUS_POLL_INTERVAL_SECS must be greater than 0"
            ));
        }

        if self.upload.poll_timeout_secs < self.upload.poll_interval_secs {
            return Err(anyhow::anyhow!(
                "STATUS_POLL_TIMEOUT_SECS must not be shorter than STATUS_POLL_INTERVAL_SECS"
            ));
        }

        if self.http_timeout_secs == 0 {
            return Err(anyhow::anyhow!("HTTP_TIMEOUT_SECS must be greater than 0"));
        }

        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Providers whose credentials are present
    pub fn configured_providers(&self) -> Vec<ProviderKind> {
        let mut providers = Vec::new();
        if self.mux.credentials.is_some() {
            providers.push(ProviderKind::Mux);
        }
        if self.vimeo.access_token.is_some() {
            providers.push(ProviderKind::Vimeo);
        }
        providers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, anyhow::Error> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_match_reference_behavior() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.upload.chunk_size_bytes, 5 * 1024 * 1024);
        assert_eq!(config.upload.max_attempts, 3);
        assert_eq!(config.upload.retry_base_delay(), Duration::from_secs(1));
        assert_eq!(config.upload.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.upload.poll_timeout(), Duration::from_secs(240));
        assert_eq!(config.upload.direct_upload_timeout_secs, 3600);
        assert_eq!(config.vimeo.folder_id, "25641614");
        assert_eq!(config.default_provider, ProviderKind::Vimeo);
        assert_eq!(config.default_cors_origin, "*");
        assert!(config.configured_providers().is_empty());
    }

    #[test]
    fn reads_credentials() {
        let config = config_from(&[
            ("MUX_TOKEN_ID", "id"),
            ("MUX_TOKEN_SECRET", "secret"),
            ("VIMEO_ACCESS_TOKEN", "token"),
            ("DEFAULT_PROVIDER", "mux"),
        ])
        .unwrap();
        assert_eq!(
            config.configured_providers(),
            vec![ProviderKind::Mux, ProviderKind::Vimeo]
        );
        assert_eq!(config.default_provider, ProviderKind::Mux);
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let config = config_from(&[
            ("MUX_TOKEN_ID", "id"),
            ("MUX_TOKEN_SECRET", "super-secret"),
            ("VIMEO_ACCESS_TOKEN", "vimeo-token"),
        ])
        .unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("vimeo-token"));
    }

    #[test]
    fn rejects_half_configured_mux() {
        let err = config_from(&[("MUX_TOKEN_ID", "id")]).unwrap_err();
        assert!(err.to_string().contains("MUX_TOKEN_SECRET"));
    }

    #[test]
    fn rejects_unknown_default_provider() {
        assert!(config_from(&[("DEFAULT_PROVIDER", "youtube")]).is_err());
    }

    #[test]
    fn rejects_zero_chunk_size_and_attempts() {
        assert!(config_from(&[("UPLOAD_CHUNK_SIZE_BYTES", "0")]).is_err());
        assert!(config_from(&[("UPLOAD_MAX_ATTEMPTS", "0")]).is_err());
    }

    #[test]
    fn rejects_timeout_shorter_than_interval() {
        let err = config_from(&[
            ("STATUS_POLL_INTERVAL_SECS", "10"),
            ("STATUS_POLL_TIMEOUT_SECS", "5"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("STATUS_POLL_TIMEOUT_SECS"));
    }

    #[test]
    fn unparsable_numbers_fall_back_to_defaults() {
        let config = config_from(&[("UPLOAD_CHUNK_SIZE_BYTES", "lots")]).unwrap();
        assert_eq!(config.upload.chunk_size_bytes, 5 * 1024 * 1024);
    }
}
