use crate::{
    config::Config,
    encoding::{EncodingDecision, EncodingResolver},
    errors::WhoisError,
    parser::{ParsedWhoisData, WhoisParser},
    registry::{QueryTarget, ServerRegistry},
    tld_mappings::{whois_server_patterns, IP_WHOIS_SERVERS},
};
use std::{collections::HashSet, sync::Arc, time::Duration};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::{timeout_at, Instant},
};
use tracing::{debug, info, warn};

pub const WHOIS_PORT: u16 = 43;

/// Bytes exactly as a WHOIS server sent them.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub bytes: Vec<u8>,
    pub declared_encoding: Option<String>,
    pub source_server: String,
}

/// The canonical response of a lookup, with derived data merged across the referral chain.
#[derive(Debug, Clone)]
pub struct WhoisResponse {
    pub server: String,
    pub raw: Vec<u8>,
    pub text: String,
    pub parsed: ParsedWhoisData,
    pub encoding: EncodingDecision,
}

/// Every server contacted, plus the outcome.
#[derive(Debug)]
pub struct WhoisAttempt {
    pub servers: Vec<String>,
    pub result: Result<WhoisResponse, WhoisError>,
}

pub struct WhoisRequest<'a> {
    pub target: &'a QueryTarget,
    /// Explicit servers replace registry resolution when non-empty.
    pub servers: &'a [String],
    pub timeout: Duration,
    pub declared_encoding: Option<&'a str>,
    pub resolver: &'a EncodingResolver,
}

pub struct WhoisService {
    config: Arc<Config>,
    parser: WhoisParser,
}

impl WhoisService {
    pub fn new(config: Arc<Config>) -> Self {
        debug!(
            "WhoisService ready: timeout {}s, {} retries, {} referrals",
            config.whois_timeout_seconds, config.whois_retries, config.max_whois_referrals
        );
        Self { config, parser: WhoisParser::new() }
    }

    /// One TCP round trip: send the query line, read until the peer closes.
    pub async fn query(&self, server: &str, query: &str, timeout_after: Duration) -> Result<RawResponse, WhoisError> {
        let (host, port) = split_host_port(server);
        let deadline = Instant::now() + timeout_after;

        let mut stream = timeout_at(deadline, TcpStream::connect((host, port)))
            .await
            .map_err(|_| WhoisError::network(server, "connection timed out"))?
            .map_err(|e| WhoisError::network(server, e))?;

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY: {}", e);
        }

        let query_line = format!("{}\r\n", query);
        timeout_at(deadline, stream.write_all(query_line.as_bytes()))
            .await
            .map_err(|_| WhoisError::network(server, "write timed out"))?
            .map_err(|e| WhoisError::network(server, e))?;

        let mut buffer = vec![0u8; self.config.buffer_size];
        let mut response = Vec::new();

        loop {
            match timeout_at(deadline, stream.read(&mut buffer)).await {
                Err(_) => return Err(WhoisError::network(server, "read timed out")),
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => {
                    response.extend_from_slice(&buffer[..n]);
                    if response.len() > self.config.max_response_size {
                        return Err(WhoisError::ResponseTooLarge);
                    }
                }
                Ok(Err(e)) => return Err(WhoisError::network(server, e)),
            }
        }

        debug!("{} answered with {} bytes", server, response.len());
        Ok(RawResponse {
            bytes: response,
            declared_encoding: None,
            source_server: server.to_string(),
        })
    }

    /// Queries candidate servers until one answers with data, then follows referrals.
    pub async fn lookup(&self, registry: &ServerRegistry, request: &WhoisRequest<'_>) -> WhoisAttempt {
        let mut contacted = Vec::new();
        let result = self.lookup_inner(registry, request, &mut contacted).await;
        WhoisAttempt { servers: contacted, result }
    }

    async fn lookup_inner(
        &self,
        registry: &ServerRegistry,
        request: &WhoisRequest<'_>,
        contacted: &mut Vec<String>,
    ) -> Result<WhoisResponse, WhoisError> {
        let query = request.target.to_string();
        let candidates = if request.servers.is_empty() {
            self.candidate_servers(registry, request.target, request.timeout, contacted).await
        } else {
            request.servers.to_vec()
        };

        if candidates.is_empty() {
            return Err(WhoisError::NotFound(query));
        }

        let mut last_error = None;
        let mut first = None;
        for server in &candidates {
            match self.fetch_and_parse(server, &query, request, contacted).await {
                Ok(response) => {
                    first = Some(response);
                    break;
                }
                Err(e @ WhoisError::Decode { .. }) => return Err(e),
                Err(e) => {
                    debug!("{} gave no usable answer for {}: {}", server, query, e);
                    last_error = Some(e);
                }
            }
        }

        let Some(first) = first else {
            return Err(last_error.unwrap_or(WhoisError::NotFound(query)));
        };

        Ok(self.follow_referrals(first, &query, request, contacted).await)
    }

    /// Bounded referral walk. The last response that parsed becomes canonical; dates and
    /// contact sets accumulate over the whole chain in query order.
    async fn follow_referrals(
        &self,
        first: WhoisResponse,
        query: &str,
        request: &WhoisRequest<'_>,
        contacted: &mut Vec<String>,
    ) -> WhoisResponse {
        let mut visited: HashSet<String> = contacted.iter().map(|s| s.to_lowercase()).collect();
        let mut merged = first.parsed.clone();
        let mut canonical = first;

        for _ in 0..self.config.max_whois_referrals {
            let Some(next) = self.parser.referral_server(&canonical.text) else {
                break;
            };
            if !visited.insert(next.clone()) {
                debug!("Referral to {} already visited", next);
                break;
            }

            debug!("Following referral from {} to {}", canonical.server, next);
            match self.fetch_and_parse(&next, query, request, contacted).await {
                Ok(response) => {
                    merged.absorb(&response.parsed);
                    canonical = response;
                }
                Err(e) => {
                    warn!("Referral to {} failed, keeping answer from {}: {}", next, canonical.server, e);
                    break;
                }
            }
        }

        let registrar = canonical.parsed.registrar.take().or(merged.registrar.take());
        canonical.parsed = ParsedWhoisData {
            fields: std::mem::take(&mut canonical.parsed.fields),
            unrecognized: std::mem::take(&mut canonical.parsed.unrecognized),
            registrar,
            ..merged
        };
        canonical
    }

    async fn fetch_and_parse(
        &self,
        server: &str,
        query: &str,
        request: &WhoisRequest<'_>,
        contacted: &mut Vec<String>,
    ) -> Result<WhoisResponse, WhoisError> {
        let mut raw = self.query_with_retry(server, query, request.timeout, contacted).await?;
        raw.declared_encoding = request.declared_encoding.map(str::to_string);

        let decoded = request.resolver.decode(&raw.bytes, raw.declared_encoding.as_deref())?;
        let parsed = self.parser.parse(&decoded.text);
        if self.parser.is_error_response(&parsed) {
            return Err(WhoisError::NotFound(format!("{} has no record for {}", server, query)));
        }

        info!("WHOIS answer for {} from {} ({} fields)", query, server, parsed.fields.len());
        Ok(WhoisResponse {
            server: raw.source_server,
            raw: raw.bytes,
            text: decoded.text,
            parsed,
            encoding: decoded.decision,
        })
    }

    async fn query_with_retry(
        &self,
        server: &str,
        query: &str,
        timeout_after: Duration,
        contacted: &mut Vec<String>,
    ) -> Result<RawResponse, WhoisError> {
        contacted.push(server.to_string());
        let mut attempt = 0;
        loop {
            match self.query(server, query, timeout_after).await {
                Ok(raw) => return Ok(raw),
                Err(e) if e.is_retryable() && attempt < self.config.whois_retries => {
                    attempt += 1;
                    debug!("Retrying {} after error: {}", server, e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Registry hosts, IANA discovery when the registry knows nothing, then common patterns.
    pub async fn candidate_servers(
        &self,
        registry: &ServerRegistry,
        target: &QueryTarget,
        timeout_after: Duration,
        contacted: &mut Vec<String>,
    ) -> Vec<String> {
        let domain = match target {
            QueryTarget::Ip(_) => return IP_WHOIS_SERVERS.iter().map(|s| s.to_string()).collect(),
            QueryTarget::Asn(_) => return Vec::new(),
            QueryTarget::Domain(domain) => domain,
        };
        let tld = target.tld().unwrap_or(domain);

        let mut candidates: Vec<String> = registry
            .whois_entries(domain)
            .into_iter()
            .map(|entry| entry.server)
            .collect();

        if candidates.is_empty() && self.config.iana_fallback {
            if let Some(server) = self.discover_via_iana(tld, timeout_after, contacted).await {
                candidates.push(server);
            }
        }

        for pattern in whois_server_patterns(tld) {
            if !candidates.contains(&pattern) {
                candidates.push(pattern);
            }
        }
        candidates
    }

    async fn discover_via_iana(&self, tld: &str, timeout_after: Duration, contacted: &mut Vec<String>) -> Option<String> {
        let server = self.config.iana_whois_server.as_str();
        debug!("Asking {} for the WHOIS server of .{}", server, tld);
        contacted.push(server.to_string());

        match self.query(server, tld, timeout_after).await {
            Ok(raw) => {
                let text = String::from_utf8_lossy(&raw.bytes);
                let found = self.parser.referral_server(&text);
                match &found {
                    Some(host) => info!("Discovered WHOIS server for .{}: {}", tld, host),
                    None => debug!("{} has no WHOIS server for .{}", server, tld),
                }
                found
            }
            Err(e) => {
                debug!("IANA discovery for .{} failed: {}", tld, e);
                None
            }
        }
    }
}

/// "host" -> (host, 43), "host:4343" -> (host, 4343), "[::1]:4343" -> ("::1", 4343)
pub fn split_host_port(server: &str) -> (&str, u16) {
    let server = server.trim();
    if let Some(rest) = server.strip_prefix('[') {
        if let Some((host, tail)) = rest.split_once(']') {
            let port = tail.strip_prefix(':').and_then(|p| p.parse().ok()).unwrap_or(WHOIS_PORT);
            return (host, port);
        }
    }
    match server.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => match port.parse() {
            Ok(port) => (host, port),
            Err(_) => (server, WHOIS_PORT),
        },
        _ => (server, WHOIS_PORT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::ErrorPolicy;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    /// Answers every connection with `response`, counting connections.
    async fn stub_server(response: &'static [u8]) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut line = Vec::new();
                let mut buf = [0u8; 256];
                while !line.ends_with(b"\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => line.extend_from_slice(&buf[..n]),
                    }
                }
                let _ = socket.write_all(response).await;
            }
        });
        (addr, hits)
    }

    async fn closed_port() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        addr
    }

    fn service(config: Config) -> WhoisService {
        WhoisService::new(Arc::new(config))
    }

    fn resolver() -> EncodingResolver {
        EncodingResolver::new(ErrorPolicy::Strict, 0.5)
    }

    const REGISTRY_ANSWER: &[u8] = b"Domain Name: EXAMPLE.COM\r\n\
Creation Date: 1995-08-14T04:00:00Z\r\n\
Name Server: A.IANA-SERVERS.NET\r\n";

    #[tokio::test]
    async fn test_query_reads_until_close() {
        let (addr, hits) = stub_server(REGISTRY_ANSWER).await;
        let raw = service(Config::default())
            .query(&addr, "example.com", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(raw.bytes, REGISTRY_ANSWER);
        assert_eq!(raw.source_server, addr);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_query_enforces_max_response_size() {
        let (addr, _) = stub_server(REGISTRY_ANSWER).await;
        let config = Config { max_response_size: 16, buffer_size: 8, ..Config::default() };
        let result = service(config).query(&addr, "example.com", Duration::from_secs(5)).await;
        assert!(matches!(result, Err(WhoisError::ResponseTooLarge)));
    }

    /// The first `stalled` connections are held open without an answer; later ones get `response`.
    async fn stalling_server(stalled: usize, response: &'static [u8]) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let seen = counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let mut buf = [0u8; 256];
                    let _ = socket.read(&mut buf).await;
                    if seen < stalled {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                    } else {
                        let _ = socket.write_all(response).await;
                    }
                });
            }
        });
        (addr, hits)
    }

    #[tokio::test]
    async fn test_stalled_server_is_retried_on_fresh_connection() {
        let (addr, hits) = stalling_server(1, REGISTRY_ANSWER).await;
        let whois = service(Config::default());
        let mut contacted = Vec::new();

        let raw = whois
            .query_with_retry(&addr, "example.com", Duration::from_millis(500), &mut contacted)
            .await
            .unwrap();

        assert_eq!(raw.bytes, REGISTRY_ANSWER);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(contacted, vec![addr]);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_one_extra_attempt() {
        let (addr, hits) = stalling_server(usize::MAX, REGISTRY_ANSWER).await;
        let whois = service(Config { whois_retries: 1, ..Config::default() });
        let mut contacted = Vec::new();

        let result = whois
            .query_with_retry(&addr, "example.com", Duration::from_millis(300), &mut contacted)
            .await;

        assert!(matches!(result, Err(WhoisError::Network { .. })));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_retry_when_disabled() {
        let (addr, hits) = stalling_server(usize::MAX, REGISTRY_ANSWER).await;
        let whois = service(Config { whois_retries: 0, ..Config::default() });
        let mut contacted = Vec::new();

        let result = whois
            .query_with_retry(&addr, "example.com", Duration::from_millis(300), &mut contacted)
            .await;

        assert!(result.is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let addr = closed_port().await;
        let whois = service(Config::default());
        let mut contacted = Vec::new();
        let result = whois
            .query_with_retry(&addr, "example.com", Duration::from_secs(2), &mut contacted)
            .await;
        assert!(matches!(result, Err(WhoisError::Network { .. })));
        assert_eq!(contacted, vec![addr]);
    }

    #[tokio::test]
    async fn test_error_answer_moves_to_next_candidate() {
        let (bad, _) = stub_server(b"No match for \"EXAMPLE.COM\".\r\n").await;
        let (good, _) = stub_server(REGISTRY_ANSWER).await;
        let target = QueryTarget::Domain("example.com".into());
        let servers = vec![bad.clone(), good.clone()];
        let resolver = resolver();
        let request = WhoisRequest {
            target: &target,
            servers: &servers,
            timeout: Duration::from_secs(5),
            declared_encoding: None,
            resolver: &resolver,
        };

        let attempt = service(Config::default()).lookup(&ServerRegistry::default(), &request).await;
        let response = attempt.result.unwrap();
        assert_eq!(response.server, good);
        assert_eq!(attempt.servers, vec![bad, good]);
        assert!(response.parsed.name_servers.contains("a.iana-servers.net"));
    }

    #[tokio::test]
    async fn test_referral_chain_merges_dates_and_keeps_last_raw() {
        let registrar_answer: &'static [u8] = b"Domain Name: example.com\r\n\
Registrar: Example Registrar, Inc.\r\n\
Updated Date: 2020-01-01T00:00:00Z\r\n\
Registrant Email: owner@example.com\r\n";
        let (registrar, registrar_hits) = stub_server(registrar_answer).await;
        let registry_answer: &'static [u8] = Box::leak(
            format!(
                "Domain Name: EXAMPLE.COM\r\nRegistrar WHOIS Server: {}\r\nCreation Date: 1995-08-14T04:00:00Z\r\n",
                registrar
            )
            .into_bytes()
            .into_boxed_slice(),
        );
        let (registry_server, _) = stub_server(registry_answer).await;

        let target = QueryTarget::Domain("example.com".into());
        let servers = vec![registry_server.clone()];
        let resolver = resolver();
        let request = WhoisRequest {
            target: &target,
            servers: &servers,
            timeout: Duration::from_secs(5),
            declared_encoding: None,
            resolver: &resolver,
        };

        let attempt = service(Config::default()).lookup(&ServerRegistry::default(), &request).await;
        let response = attempt.result.unwrap();
        assert_eq!(response.server, registrar);
        assert_eq!(response.raw, registrar_answer);
        assert_eq!(attempt.servers, vec![registry_server, registrar]);
        assert_eq!(response.parsed.creation_date.len(), 1);
        assert_eq!(response.parsed.updated_date.len(), 1);
        assert_eq!(response.parsed.registrar.as_deref(), Some("Example Registrar, Inc."));
        assert!(response.parsed.emails.contains("owner@example.com"));
        assert!(!response.parsed.fields.contains_key("registrar whois server"));
        assert_eq!(registrar_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_self_referral_is_not_requeried() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let looping = listener.local_addr().unwrap().to_string();
        let reply = format!("Domain Name: example.com\r\nrefer: {}\r\n", looping).into_bytes();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 256];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(&reply).await;
            }
        });

        let target = QueryTarget::Domain("example.com".into());
        let servers = vec![looping.clone()];
        let resolver = resolver();
        let request = WhoisRequest {
            target: &target,
            servers: &servers,
            timeout: Duration::from_secs(5),
            declared_encoding: None,
            resolver: &resolver,
        };
        let config = Config { max_whois_referrals: 5, ..Config::default() };
        let attempt = service(config).lookup(&ServerRegistry::default(), &request).await;
        assert!(attempt.result.is_ok());
        assert_eq!(attempt.servers, vec![looping]);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_every_candidate_failing_returns_last_error() {
        let addr = closed_port().await;
        let target = QueryTarget::Domain("example.com".into());
        let servers = vec![addr];
        let resolver = resolver();
        let request = WhoisRequest {
            target: &target,
            servers: &servers,
            timeout: Duration::from_secs(2),
            declared_encoding: None,
            resolver: &resolver,
        };
        let attempt = service(Config::default()).lookup(&ServerRegistry::default(), &request).await;
        assert!(matches!(attempt.result, Err(WhoisError::Network { .. })));
    }

    #[tokio::test]
    async fn test_candidates_without_registry_entry() {
        let config = Config { iana_fallback: false, ..Config::default() };
        let whois = service(config);
        let mut contacted = Vec::new();
        let candidates = whois
            .candidate_servers(
                &ServerRegistry::default(),
                &QueryTarget::Domain("example.zz".into()),
                Duration::from_secs(1),
                &mut contacted,
            )
            .await;
        assert_eq!(candidates, vec!["whois.nic.zz", "zz.whois-servers.net"]);
        assert!(contacted.is_empty());

        let candidates = whois
            .candidate_servers(
                &ServerRegistry::default(),
                &QueryTarget::Ip("8.8.8.8".parse().unwrap()),
                Duration::from_secs(1),
                &mut contacted,
            )
            .await;
        assert_eq!(candidates, vec!["whois.arin.net", "whois.lacnic.net"]);
    }

    #[tokio::test]
    async fn test_iana_discovery_adds_referred_server() {
        let (iana, hits) = stub_server(b"domain:       ZZ\r\n\r\nrefer:        whois.registry.zz\r\n").await;
        let config = Config { iana_whois_server: iana.clone(), ..Config::default() };
        let mut contacted = Vec::new();
        let candidates = service(config)
            .candidate_servers(
                &ServerRegistry::default(),
                &QueryTarget::Domain("example.zz".into()),
                Duration::from_secs(5),
                &mut contacted,
            )
            .await;
        assert_eq!(candidates, vec!["whois.registry.zz", "whois.nic.zz", "zz.whois-servers.net"]);
        assert_eq!(contacted, vec![iana]);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_split_host_port() {
        assert_eq!(split_host_port("whois.verisign-grs.com"), ("whois.verisign-grs.com", 43));
        assert_eq!(split_host_port("127.0.0.1:4343"), ("127.0.0.1", 4343));
        assert_eq!(split_host_port("[::1]:4343"), ("::1", 4343));
        assert_eq!(split_host_port("2001:db8::1"), ("2001:db8::1", 43));
        assert_eq!(split_host_port("host:notaport"), ("host:notaport", 43));
    }
}
