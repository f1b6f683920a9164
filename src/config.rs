use crate::encoding::ErrorPolicy;
use crate::errors::WhoisError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_WHOIS_SERVERS_URL: &str = "https://www.nirsoft.net/whois-servers.txt";
pub const DEFAULT_RDAP_BOOTSTRAP_URL: &str = "https://data.iana.org/rdap/";
pub const DEFAULT_IP_API_URL: &str = "http://ip-api.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub whois_timeout_seconds: u64,
    pub http_timeout_seconds: u64,
    pub max_response_size: usize,
    pub buffer_size: usize,
    pub whois_retries: usize,
    pub max_whois_referrals: usize,
    pub max_rdap_referrals: usize,
    pub use_rdap: bool,
    pub force_rdap: bool,
    pub iana_fallback: bool,
    pub iana_whois_server: String,
    pub decode_encoding: Option<String>,
    pub encoding_errors: ErrorPolicy,
    pub detection_threshold: f32,
    pub cache_dir: PathBuf,
    pub force_download: bool,
    pub whois_servers_url: String,
    pub rdap_bootstrap_url: String,
    pub ip_api_url: String,
    pub ip_api_fields: String,
    pub ip_api_lang: String,
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            whois_timeout_seconds: 10,
            http_timeout_seconds: 10,
            max_response_size: 1024 * 1024,
            buffer_size: 4096,
            whois_retries: 1,
            max_whois_referrals: 1,
            max_rdap_referrals: 5,
            use_rdap: true,
            force_rdap: false,
            iana_fallback: true,
            iana_whois_server: crate::tld_mappings::IANA_WHOIS_SERVER.to_string(),
            decode_encoding: None,
            encoding_errors: ErrorPolicy::Strict,
            detection_threshold: 0.5,
            cache_dir: Self::default_cache_dir(),
            force_download: false,
            whois_servers_url: DEFAULT_WHOIS_SERVERS_URL.to_string(),
            rdap_bootstrap_url: DEFAULT_RDAP_BOOTSTRAP_URL.to_string(),
            ip_api_url: DEFAULT_IP_API_URL.to_string(),
            ip_api_fields: "61439".to_string(),
            ip_api_lang: "en".to_string(),
            user_agent: concat!("whois21/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Config {
    /// Defaults overlaid with environment variables.
    pub fn load() -> Result<Self, WhoisError> {
        let defaults = Self::default();

        let mut settings = config::Config::builder()
            .set_default("whois_timeout_seconds", defaults.whois_timeout_seconds)?
            .set_default("http_timeout_seconds", defaults.http_timeout_seconds)?
            .set_default("max_response_size", defaults.max_response_size as i64)?
            .set_default("buffer_size", defaults.buffer_size as i64)?
            .set_default("whois_retries", defaults.whois_retries as i64)?
            .set_default("max_whois_referrals", defaults.max_whois_referrals as i64)?
            .set_default("max_rdap_referrals", defaults.max_rdap_referrals as i64)?
            .set_default("use_rdap", defaults.use_rdap)?
            .set_default("force_rdap", defaults.force_rdap)?
            .set_default("iana_fallback", defaults.iana_fallback)?
            .set_default("iana_whois_server", defaults.iana_whois_server)?
            .set_default("encoding_errors", defaults.encoding_errors.as_str())?
            .set_default("detection_threshold", defaults.detection_threshold as f64)?
            .set_default("cache_dir", defaults.cache_dir.to_string_lossy().to_string())?
            .set_default("force_download", defaults.force_download)?
            .set_default("whois_servers_url", defaults.whois_servers_url)?
            .set_default("rdap_bootstrap_url", defaults.rdap_bootstrap_url)?
            .set_default("ip_api_url", defaults.ip_api_url)?
            .set_default("ip_api_fields", defaults.ip_api_fields)?
            .set_default("ip_api_lang", defaults.ip_api_lang)?
            .set_default("user_agent", defaults.user_agent)?;

        settings = Self::apply_env_overrides(settings)?;

        let config: Config = settings.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings that would make every query fail or block forever.
    pub fn validate(&self) -> Result<(), WhoisError> {
        let invalid = |msg: &str| -> Result<(), WhoisError> {
            Err(WhoisError::ConfigError(config::ConfigError::Message(msg.to_string())))
        };

        if self.whois_timeout_seconds == 0 || self.http_timeout_seconds == 0 {
            return invalid("timeouts must be greater than zero");
        }
        if self.buffer_size == 0 || self.max_response_size == 0 {
            return invalid("buffer_size and max_response_size must be greater than zero");
        }
        if !(0.0..=1.0).contains(&self.detection_threshold) {
            return invalid("detection_threshold must be between 0 and 1");
        }
        if let Some(label) = &self.decode_encoding {
            if encoding_rs::Encoding::for_label(label.as_bytes()).is_none() {
                return invalid(&format!("unknown decode_encoding '{}'", label));
            }
        }
        for (name, value) in [
            ("whois_servers_url", &self.whois_servers_url),
            ("rdap_bootstrap_url", &self.rdap_bootstrap_url),
            ("ip_api_url", &self.ip_api_url),
        ] {
            if url::Url::parse(value).is_err() {
                return invalid(&format!("{} is not a valid URL: {}", name, value));
            }
        }
        Ok(())
    }

    pub fn whois_timeout(&self) -> Duration {
        Duration::from_secs(self.whois_timeout_seconds)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }

    fn default_cache_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("XDG_CACHE_HOME") {
            if !dir.is_empty() {
                return PathBuf::from(dir).join("whois21");
            }
        }
        if let Ok(home) = std::env::var("HOME") {
            if !home.is_empty() {
                return PathBuf::from(home).join(".cache").join("whois21");
            }
        }
        std::env::temp_dir().join("whois21")
    }

    fn apply_env_overrides(mut settings: config::ConfigBuilder<config::builder::DefaultState>) -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
        let env_mappings = [
            ("WHOIS_TIMEOUT_SECONDS", "whois_timeout_seconds"),
            ("WHOIS_TIMEOUT", "whois_timeout_seconds"),
            ("HTTP_TIMEOUT_SECONDS", "http_timeout_seconds"),
            ("HTTP_TIMEOUT", "http_timeout_seconds"),
            ("MAX_RESPONSE_SIZE", "max_response_size"),
            ("BUFFER_SIZE", "buffer_size"),
            ("WHOIS_RETRIES", "whois_retries"),
            ("MAX_WHOIS_REFERRALS", "max_whois_referrals"),
            ("MAX_RDAP_REFERRALS", "max_rdap_referrals"),
            ("USE_RDAP", "use_rdap"),
            ("FORCE_RDAP", "force_rdap"),
            ("IANA_FALLBACK", "iana_fallback"),
            ("IANA_WHOIS_SERVER", "iana_whois_server"),
            ("DECODE_ENCODING", "decode_encoding"),
            ("ENCODING_ERRORS", "encoding_errors"),
            ("DETECTION_THRESHOLD", "detection_threshold"),
            ("WHOIS21_CACHE_DIR", "cache_dir"),
            ("FORCE_DOWNLOAD", "force_download"),
            ("WHOIS_SERVERS_URL", "whois_servers_url"),
            ("RDAP_BOOTSTRAP_URL", "rdap_bootstrap_url"),
            ("IP_API_URL", "ip_api_url"),
            ("IP_API_FIELDS", "ip_api_fields"),
            ("IP_API_LANG", "ip_api_lang"),
        ];

        for (env_var, config_key) in env_mappings {
            if let Ok(value) = std::env::var(env_var) {
                settings = settings.set_override(config_key, value)?;
            }
        }

        Ok(settings)
    }
}
