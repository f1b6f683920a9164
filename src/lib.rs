//! # whois21
//!
//! Registration data for domains, IP addresses and autonomous systems.
//!
//! ## Features
//!
//! - WHOIS over raw TCP with server discovery, retries and referral following
//! - RDAP over HTTPS with IANA bootstrap files and related-link following
//! - Charset detection for legacy WHOIS replies
//! - One normalized [`WhoisRecord`] whatever the source
//! - IP geolocation through ip-api.com
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use whois21::WhoisClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = WhoisClient::new()?;
//!     let record = client.lookup("google.com").await;
//!
//!     println!("Registrar: {:?}", record.registrar);
//!     println!("Created: {:?}", record.creation_date);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod encoding;
pub mod errors;
pub mod ip_api;
pub mod parser;
pub mod rdap;
pub mod registry;
pub mod tld_mappings;
pub mod whois;

pub use config::Config;
pub use encoding::{EncodingDecision, EncodingDetector, EncodingResolver, ErrorPolicy};
pub use errors::WhoisError;
pub use ip_api::{IpInfo, IpLookupService};
pub use parser::{FieldMap, ParseWarning, ParsedWhoisData, WhoisParser};
pub use rdap::RdapService;
pub use registry::{QueryTarget, RegistryConfig, ServerEntry, ServerKind, ServerRegistry};
pub use whois::{RawResponse, WhoisService};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, sync::Arc, time::Duration};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Per-call overrides of the client configuration.
#[derive(Debug, Clone, Default)]
pub struct LookupOptions {
    /// Query exactly these WHOIS servers, in order, instead of resolving them.
    pub servers: Vec<String>,
    pub timeout: Option<Duration>,
    /// Fall back to RDAP when WHOIS fails.
    pub use_rdap: Option<bool>,
    /// Skip WHOIS and go straight to RDAP.
    pub force_rdap: Option<bool>,
    pub decode_encoding: Option<String>,
    pub encoding_errors: Option<ErrorPolicy>,
}

/// Normalized registration data for one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WhoisRecord {
    pub query: String,
    pub success: bool,
    pub error: Option<String>,
    #[serde(skip)]
    pub raw: Vec<u8>,
    pub server: Option<String>,
    pub servers: Vec<String>,
    pub whois_data: FieldMap,
    pub rdap_data: Option<serde_json::Value>,
    pub creation_date: Vec<DateTime<Utc>>,
    pub updated_date: Vec<DateTime<Utc>>,
    pub expires_date: Vec<DateTime<Utc>>,
    pub emails: BTreeSet<String>,
    pub phone_numbers: BTreeSet<String>,
    pub fax_numbers: BTreeSet<String>,
    pub name_servers: BTreeSet<String>,
    pub status: BTreeSet<String>,
    pub registrar: Option<String>,
    pub encoding: Option<EncodingDecision>,
    pub warnings: Vec<ParseWarning>,
}

impl WhoisRecord {
    /// A failed query keeps only the servers it tried and the reason.
    pub fn failed(query: &str, servers: Vec<String>, error: &WhoisError) -> Self {
        Self {
            query: query.to_string(),
            success: false,
            error: Some(error.to_string()),
            servers,
            ..Self::default()
        }
    }

    fn from_parsed(query: &str, server: String, servers: Vec<String>, raw: Vec<u8>, parsed: ParsedWhoisData) -> Self {
        Self {
            query: query.to_string(),
            success: true,
            error: None,
            raw,
            server: Some(server),
            servers,
            whois_data: parsed.fields,
            rdap_data: None,
            creation_date: parsed.creation_date,
            updated_date: parsed.updated_date,
            expires_date: parsed.expires_date,
            emails: parsed.emails,
            phone_numbers: parsed.phone_numbers,
            fax_numbers: parsed.fax_numbers,
            name_servers: parsed.name_servers,
            status: parsed.status,
            registrar: parsed.registrar,
            encoding: None,
            warnings: parsed.warnings,
        }
    }

    /// Field values by key, ignoring case and spacing differences.
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.whois_data.get(&parser::normalize_key(key)).map(Vec::as_slice)
    }
}

/// Runs WHOIS and RDAP lookups against a lazily loaded server registry.
#[derive(Clone)]
pub struct WhoisClient {
    config: Arc<Config>,
    registry: Arc<OnceCell<ServerRegistry>>,
    whois: Arc<WhoisService>,
    rdap: Arc<RdapService>,
    resolver: EncodingResolver,
}

impl WhoisClient {
    /// Client configured from the environment.
    pub fn new() -> Result<Self, WhoisError> {
        Self::new_with_config(Config::load()?)
    }

    pub fn new_with_config(config: Config) -> Result<Self, WhoisError> {
        Self::build(config, OnceCell::new())
    }

    /// Client with an already loaded registry; nothing is read from the cache directory.
    pub fn with_registry(config: Config, registry: ServerRegistry) -> Result<Self, WhoisError> {
        Self::build(config, OnceCell::new_with(Some(registry)))
    }

    fn build(config: Config, registry: OnceCell<ServerRegistry>) -> Result<Self, WhoisError> {
        config.validate()?;
        let config = Arc::new(config);
        let rdap = Arc::new(RdapService::new(&config)?);
        let resolver = EncodingResolver::new(config.encoding_errors, config.detection_threshold);
        let whois = Arc::new(WhoisService::new(config.clone()));

        info!("WhoisClient initialized (cache: {})", config.cache_dir.display());
        Ok(Self {
            config,
            registry: Arc::new(registry),
            whois,
            rdap,
            resolver,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The server registry, loading it on first use. A failed load is retried by the next call.
    pub async fn registry(&self) -> Result<&ServerRegistry, WhoisError> {
        let registry_config = RegistryConfig::from_config(&self.config);
        self.registry
            .get_or_try_init(|| ServerRegistry::init(&registry_config))
            .await
    }

    /// Looks up a domain, IP address or `AS` number. Failures are reported in the record.
    pub async fn lookup(&self, query: &str) -> WhoisRecord {
        self.lookup_with_options(query, &LookupOptions::default()).await
    }

    pub async fn lookup_with_options(&self, query: &str, options: &LookupOptions) -> WhoisRecord {
        let query = query.trim();
        let target = match QueryTarget::parse(query) {
            Ok(target) => target,
            Err(e) => return WhoisRecord::failed(query, Vec::new(), &e),
        };
        debug!("Looking up {} as {:?}", query, target);

        let force_rdap = options.force_rdap.unwrap_or(self.config.force_rdap);
        let use_rdap = options.use_rdap.unwrap_or(self.config.use_rdap);
        let is_asn = matches!(target, QueryTarget::Asn(_));

        let mut servers = Vec::new();
        let mut last_error = None;

        if !force_rdap && !is_asn {
            match self.lookup_whois(query, &target, options, &mut servers).await {
                Ok(record) => return record,
                Err(e) => {
                    warn!("WHOIS lookup for {} failed: {}", query, e);
                    last_error = Some(e);
                }
            }
        }

        if force_rdap || use_rdap || is_asn {
            match self.lookup_rdap(query, &target, options, &mut servers).await {
                Ok(record) => return record,
                Err(e) => {
                    warn!("RDAP lookup for {} failed: {}", query, e);
                    last_error = Some(e);
                }
            }
        }

        let error = last_error.unwrap_or_else(|| WhoisError::NotFound(query.to_string()));
        WhoisRecord::failed(query, servers, &error)
    }

    async fn lookup_whois(
        &self,
        query: &str,
        target: &QueryTarget,
        options: &LookupOptions,
        servers: &mut Vec<String>,
    ) -> Result<WhoisRecord, WhoisError> {
        let empty = ServerRegistry::default();
        let registry = if options.servers.is_empty() {
            self.registry().await?
        } else {
            &empty
        };

        let resolver = match options.encoding_errors {
            Some(policy) => self.resolver.with_policy(policy),
            None => self.resolver.clone(),
        };
        let declared = options
            .decode_encoding
            .as_deref()
            .or(self.config.decode_encoding.as_deref());

        let request = whois::WhoisRequest {
            target,
            servers: &options.servers,
            timeout: options.timeout.unwrap_or_else(|| self.config.whois_timeout()),
            declared_encoding: declared,
            resolver: &resolver,
        };

        let attempt = self.whois.lookup(registry, &request).await;
        servers.extend(attempt.servers);
        let response = attempt.result?;

        let mut record = WhoisRecord::from_parsed(
            query,
            response.server,
            servers.clone(),
            response.raw,
            response.parsed,
        );
        record.encoding = Some(response.encoding);
        Ok(record)
    }

    async fn lookup_rdap(
        &self,
        query: &str,
        target: &QueryTarget,
        options: &LookupOptions,
        servers: &mut Vec<String>,
    ) -> Result<WhoisRecord, WhoisError> {
        let registry = self.registry().await?;
        let url = rdap::endpoint(registry, target)?;
        servers.push(url.clone());

        let timeout = options.timeout.unwrap_or_else(|| self.config.http_timeout());
        let response = self.rdap.lookup(&url, timeout).await?;
        for followed in response.urls.iter().skip(1) {
            servers.push(followed.clone());
        }

        let raw = serde_json::to_vec(&response.data)?;
        let server = response.urls.last().cloned().unwrap_or(url);
        let mut record = WhoisRecord::from_parsed(query, server, servers.clone(), raw, response.parsed);
        record.rdap_data = Some(response.data);
        Ok(record)
    }
}
