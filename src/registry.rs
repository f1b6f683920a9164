//! Server registry: which WHOIS host and which RDAP base URL answer for a target.
//!
//! Five lists back the registry, each cached as a file under `cache_dir`:
//! the plain-text WHOIS server list and the IANA RDAP bootstrap files for
//! DNS, IPv4, IPv6 and ASN ranges. A missing or empty file is downloaded and
//! persisted before parsing.

use crate::config::Config;
use crate::errors::WhoisError;
use crate::tld_mappings::{BUILTIN_WHOIS_SERVERS, IP_WHOIS_SERVERS};
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const WHOIS_SERVERS_FILE: &str = "whois-servers.txt";
pub const RDAP_DNS_FILE: &str = "dns.json";
pub const RDAP_IPV4_FILE: &str = "ipv4.json";
pub const RDAP_IPV6_FILE: &str = "ipv6.json";
pub const RDAP_ASN_FILE: &str = "asn.json";

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub cache_dir: PathBuf,
    pub force_download: bool,
    pub whois_servers_url: String,
    pub rdap_bootstrap_url: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl RegistryConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cache_dir: config.cache_dir.clone(),
            force_download: config.force_download,
            whois_servers_url: config.whois_servers_url.clone(),
            rdap_bootstrap_url: config.rdap_bootstrap_url.clone(),
            timeout: config.http_timeout(),
            user_agent: config.user_agent.clone(),
        }
    }

    fn bootstrap_url(&self, file: &str) -> String {
        if self.rdap_bootstrap_url.ends_with('/') {
            format!("{}{}", self.rdap_bootstrap_url, file)
        } else {
            format!("{}/{}", self.rdap_bootstrap_url, file)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerKind {
    Whois,
    Rdap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEntry {
    /// The TLD, CIDR or ASN range that matched.
    pub pattern: String,
    pub server: String,
    pub kind: ServerKind,
}

/// What a lookup is about, after normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryTarget {
    Domain(String),
    Ip(IpAddr),
    Asn(u32),
}

impl QueryTarget {
    /// Trims, lowercases and classifies a user query. Domains are converted to
    /// their ASCII form.
    pub fn parse(input: &str) -> Result<Self, WhoisError> {
        let query = input.trim().trim_end_matches('.').to_lowercase();
        if query.is_empty() {
            return Err(WhoisError::InvalidDomain(input.to_string()));
        }

        if let Ok(ip) = query.trim_matches(|c| c == '[' || c == ']').parse::<IpAddr>() {
            return Ok(QueryTarget::Ip(ip));
        }

        let digits = query.strip_prefix("as").unwrap_or(&query);
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            return digits
                .parse::<u32>()
                .map(QueryTarget::Asn)
                .map_err(|_| WhoisError::InvalidDomain(input.to_string()));
        }

        let ascii = idna::domain_to_ascii(&query)
            .map_err(|_| WhoisError::InvalidDomain(input.to_string()))?;
        if ascii.is_empty()
            || !ascii.contains('.')
            || ascii.split('.').any(|label| label.is_empty() || label.len() > 63)
        {
            return Err(WhoisError::InvalidDomain(input.to_string()));
        }
        Ok(QueryTarget::Domain(ascii))
    }

    /// Path appended to an RDAP base URL.
    pub fn rdap_path(&self) -> String {
        match self {
            QueryTarget::Domain(domain) => format!("domain/{}", domain),
            QueryTarget::Ip(ip) => format!("ip/{}", ip),
            QueryTarget::Asn(asn) => format!("autnum/{}", asn),
        }
    }

    /// Last label of a domain target.
    pub fn tld(&self) -> Option<&str> {
        match self {
            QueryTarget::Domain(domain) => domain.rsplit('.').next(),
            _ => None,
        }
    }
}

impl fmt::Display for QueryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryTarget::Domain(domain) => f.write_str(domain),
            QueryTarget::Ip(ip) => write!(f, "{}", ip),
            QueryTarget::Asn(asn) => write!(f, "AS{}", asn),
        }
    }
}

/// IANA bootstrap file layout: `services` is a list of `[patterns, urls]` pairs.
#[derive(Debug, Clone, Deserialize)]
struct RdapBootstrap {
    services: Vec<Vec<Vec<String>>>,
    #[serde(default)]
    publication: Option<String>,
}

impl RdapBootstrap {
    fn parse(file: &str, text: &str) -> Result<Self, WhoisError> {
        serde_json::from_str(text).map_err(|e| WhoisError::registry(file, e))
    }

    /// (pattern, preferred url) pairs, skipping services without a usable URL.
    fn entries(&self) -> impl Iterator<Item = (&str, String)> + '_ {
        self.services.iter().filter_map(|service| {
            let patterns = service.first()?;
            let url = preferred_url(service.get(1)?)?;
            Some(patterns.iter().map(move |p| (p.as_str(), url.clone())))
        })
        .flatten()
    }
}

fn preferred_url(urls: &[String]) -> Option<String> {
    let usable = || urls.iter().map(|u| u.trim()).filter(|u| !u.is_empty());
    let url = usable()
        .find(|u| u.starts_with("https://"))
        .or_else(|| usable().next())?;
    if url.ends_with('/') {
        Some(url.to_string())
    } else {
        Some(format!("{}/", url))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ServerRegistry {
    whois: HashMap<String, Vec<String>>,
    rdap_dns: HashMap<String, String>,
    rdap_ip: Vec<(IpNetwork, String)>,
    rdap_asn: Vec<(u32, u32, String)>,
}

impl ServerRegistry {
    /// Loads every list from the cache, downloading the ones that are missing or empty.
    pub async fn init(config: &RegistryConfig) -> Result<Self, WhoisError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .gzip(true)
            .build()
            .map_err(|e| WhoisError::registry("http client", e))?;

        tokio::fs::create_dir_all(&config.cache_dir)
            .await
            .map_err(|e| WhoisError::registry(&config.cache_dir.display().to_string(), e))?;

        let whois_text = load_or_fetch(&client, config, WHOIS_SERVERS_FILE, &config.whois_servers_url).await?;
        let dns = load_or_fetch(&client, config, RDAP_DNS_FILE, &config.bootstrap_url(RDAP_DNS_FILE)).await?;
        let ipv4 = load_or_fetch(&client, config, RDAP_IPV4_FILE, &config.bootstrap_url(RDAP_IPV4_FILE)).await?;
        let ipv6 = load_or_fetch(&client, config, RDAP_IPV6_FILE, &config.bootstrap_url(RDAP_IPV6_FILE)).await?;
        let asn = load_or_fetch(&client, config, RDAP_ASN_FILE, &config.bootstrap_url(RDAP_ASN_FILE)).await?;

        let registry = Self::from_sources(&whois_text, &dns, &ipv4, &ipv6, &asn)?;
        info!(
            "Server registry loaded: {} WHOIS suffixes, {} RDAP TLDs, {} IP ranges, {} ASN ranges",
            registry.whois.len(),
            registry.rdap_dns.len(),
            registry.rdap_ip.len(),
            registry.rdap_asn.len()
        );
        Ok(registry)
    }

    /// Builds a registry from the contents of the five lists.
    pub fn from_sources(
        whois_servers: &str,
        dns_json: &str,
        ipv4_json: &str,
        ipv6_json: &str,
        asn_json: &str,
    ) -> Result<Self, WhoisError> {
        let mut registry = Self::default();

        for (tld, host) in parse_whois_servers(whois_servers) {
            registry.add_whois(&tld, &host);
        }
        for (tld, host) in BUILTIN_WHOIS_SERVERS {
            registry.add_whois(tld, host);
        }

        let dns = RdapBootstrap::parse(RDAP_DNS_FILE, dns_json)?;
        for (tld, url) in dns.entries() {
            let tld = tld.trim().trim_matches('.').to_lowercase();
            if !tld.is_empty() {
                registry.rdap_dns.entry(tld).or_insert(url);
            }
        }

        for (file, text) in [(RDAP_IPV4_FILE, ipv4_json), (RDAP_IPV6_FILE, ipv6_json)] {
            let bootstrap = RdapBootstrap::parse(file, text)?;
            for (cidr, url) in bootstrap.entries() {
                match cidr.trim().parse::<IpNetwork>() {
                    Ok(network) => registry.rdap_ip.push((network, url)),
                    Err(e) => warn!("Skipping invalid range '{}' in {}: {}", cidr, file, e),
                }
            }
        }

        let asn = RdapBootstrap::parse(RDAP_ASN_FILE, asn_json)?;
        for (range, url) in asn.entries() {
            match parse_asn_range(range) {
                Some((low, high)) => registry.rdap_asn.push((low, high, url)),
                None => warn!("Skipping invalid ASN range '{}'", range),
            }
        }

        debug!(
            "Bootstrap publication dates: dns={:?} asn={:?}",
            dns.publication, asn.publication
        );
        Ok(registry)
    }

    fn add_whois(&mut self, tld: &str, host: &str) {
        let tld = tld.trim().trim_matches('.').to_lowercase();
        let host = host.trim().to_lowercase();
        if tld.is_empty() || host.is_empty() {
            return;
        }
        let hosts = self.whois.entry(tld).or_default();
        if !hosts.contains(&host) {
            hosts.push(host);
        }
    }

    /// Every WHOIS host known for the longest matching suffix, downloaded entries first.
    pub fn whois_entries(&self, domain: &str) -> Vec<ServerEntry> {
        for suffix in suffixes(domain) {
            if let Some(hosts) = self.whois.get(suffix) {
                return hosts
                    .iter()
                    .map(|host| ServerEntry {
                        pattern: suffix.to_string(),
                        server: host.clone(),
                        kind: ServerKind::Whois,
                    })
                    .collect();
            }
        }
        Vec::new()
    }

    pub fn resolve_whois(&self, target: &QueryTarget) -> Result<ServerEntry, WhoisError> {
        match target {
            QueryTarget::Domain(domain) => self
                .whois_entries(domain)
                .into_iter()
                .next()
                .ok_or_else(|| WhoisError::NotFound(domain.clone())),
            QueryTarget::Ip(ip) => IP_WHOIS_SERVERS
                .first()
                .map(|host| ServerEntry {
                    pattern: ip.to_string(),
                    server: host.to_string(),
                    kind: ServerKind::Whois,
                })
                .ok_or_else(|| WhoisError::NotFound(ip.to_string())),
            QueryTarget::Asn(_) => Err(WhoisError::NotFound(target.to_string())),
        }
    }

    pub fn resolve_rdap(&self, target: &QueryTarget) -> Result<ServerEntry, WhoisError> {
        let found = match target {
            QueryTarget::Domain(domain) => suffixes(domain).find_map(|suffix| {
                self.rdap_dns
                    .get(suffix)
                    .map(|url| (suffix.to_string(), url.clone()))
            }),
            QueryTarget::Ip(ip) => self
                .rdap_ip
                .iter()
                .filter(|(network, _)| network.contains(*ip))
                .max_by_key(|(network, _)| network.prefix())
                .map(|(network, url)| (network.to_string(), url.clone())),
            QueryTarget::Asn(asn) => self
                .rdap_asn
                .iter()
                .filter(|(low, high, _)| (*low..=*high).contains(asn))
                .min_by_key(|(low, high, _)| high - low)
                .map(|(low, high, url)| (format!("{}-{}", low, high), url.clone())),
        };

        found
            .map(|(pattern, server)| ServerEntry { pattern, server, kind: ServerKind::Rdap })
            .ok_or_else(|| WhoisError::NotFound(target.to_string()))
    }
}

/// "a.b.co.uk" -> "a.b.co.uk", "b.co.uk", "co.uk", "uk"
fn suffixes(domain: &str) -> impl Iterator<Item = &str> {
    let domain = domain.trim_end_matches('.');
    std::iter::once(domain).chain(
        domain
            .char_indices()
            .filter(|(_, c)| *c == '.')
            .map(move |(idx, _)| &domain[idx + 1..]),
    )
}

/// `<tld> <host>` per line, `;` starts a comment.
fn parse_whois_servers(text: &str) -> Vec<(String, String)> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(';'))
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let tld = parts.next()?;
            let host = parts.next()?;
            is_host(host).then(|| (tld.to_string(), host.to_string()))
        })
        .collect()
}

/// `host` or `host:port`, nothing markup-like.
fn is_host(host: &str) -> bool {
    host.contains('.')
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':'))
}

/// Rejects bodies that would not load, so they never reach the cache.
fn check_list(file: &str, text: &str) -> Result<(), WhoisError> {
    if file == WHOIS_SERVERS_FILE {
        if parse_whois_servers(text).is_empty() {
            return Err(WhoisError::registry(file, "no `<tld> <host>` entries"));
        }
        return Ok(());
    }
    RdapBootstrap::parse(file, text).map(|_| ())
}

fn parse_asn_range(range: &str) -> Option<(u32, u32)> {
    let range = range.trim();
    match range.split_once('-') {
        Some((low, high)) => {
            let (low, high) = (low.trim().parse().ok()?, high.trim().parse().ok()?);
            (low <= high).then_some((low, high))
        }
        None => range.parse().ok().map(|asn| (asn, asn)),
    }
}

async fn load_or_fetch(
    client: &reqwest::Client,
    config: &RegistryConfig,
    file: &str,
    url: &str,
) -> Result<String, WhoisError> {
    let path = config.cache_dir.join(file);

    if config.force_download || is_missing_or_empty(&path).await {
        return download(client, &path, file, url).await;
    }

    let bytes = tokio::fs::read(&path).await.map_err(|e| WhoisError::registry(file, e))?;
    let text = String::from_utf8_lossy(&bytes).into_owned();
    if let Err(e) = check_list(file, &text) {
        warn!("Cached {} is unusable, downloading again: {}", file, e);
        return download(client, &path, file, url).await;
    }
    debug!("Loaded {} from cache ({} bytes)", file, bytes.len());
    Ok(text)
}

async fn is_missing_or_empty(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(meta) => meta.len() == 0,
        Err(_) => true,
    }
}

async fn download(client: &reqwest::Client, path: &Path, file: &str, url: &str) -> Result<String, WhoisError> {
    info!("Downloading {} from {}", file, url);

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| WhoisError::registry(file, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(WhoisError::registry(file, format!("download failed with status {}", status)));
    }

    let bytes = response.bytes().await.map_err(|e| WhoisError::registry(file, e))?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(WhoisError::registry(file, "downloaded file is empty"));
    }

    let text = String::from_utf8_lossy(&bytes).into_owned();
    check_list(file, &text)?;

    tokio::fs::write(path, &bytes).await.map_err(|e| WhoisError::registry(file, e))?;
    debug!("Saved {} ({} bytes) to {}", file, bytes.len(), path.display());
    Ok(text)
}
