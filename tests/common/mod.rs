#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use whois21::{Config, ServerRegistry};

pub const GOOGLE_COM: &str = "   Domain Name: GOOGLE.COM\r\n\
   Registry Domain ID: 2138514_DOMAIN_COM-VRSN\r\n\
   Updated Date: 2019-09-09T15:39:04Z\r\n\
   Creation Date: 1997-09-15T04:00:00Z\r\n\
   Registry Expiry Date: 2028-09-14T04:00:00Z\r\n\
   Registrar: MarkMonitor Inc.\r\n\
   Registrar Abuse Contact Email: abusecomplaints@markmonitor.com\r\n\
   Domain Status: clientDeleteProhibited https://icann.org/epp#clientDeleteProhibited\r\n\
   Name Server: NS1.GOOGLE.COM\r\n\
   Name Server: NS2.GOOGLE.COM\r\n\
>>> Last update of whois database: 2024-05-01T10:00:00Z <<<\r\n";

pub const EMPTY_BOOTSTRAP: &str = r#"{"services": []}"#;

/// A WHOIS server on 127.0.0.1 answering every query with `response`.
/// Returns its `host:port` and the query lines it received.
pub async fn stub_whois(response: Vec<u8>) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let queries = Arc::new(Mutex::new(Vec::new()));
    let seen = queries.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut line = Vec::new();
            let mut buf = [0u8; 512];
            while !line.ends_with(b"\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => line.extend_from_slice(&buf[..n]),
                }
            }
            seen.lock()
                .unwrap()
                .push(String::from_utf8_lossy(&line).trim_end().to_string());
            let _ = socket.write_all(&response).await;
        }
    });

    (addr, queries)
}

/// An address nothing listens on.
pub async fn closed_port() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);
    addr
}

/// Registry mapping `.com` to `whois_server` and `.com`, AS and 8.0.0.0/8 to `rdap_base`.
pub fn registry(whois_server: &str, rdap_base: &str) -> ServerRegistry {
    let whois_list = format!("com {}\n", whois_server);
    let dns = format!(r#"{{"services": [[["com"], ["{}/"]]]}}"#, rdap_base);
    let ipv4 = format!(r#"{{"services": [[["8.0.0.0/8"], ["{}/"]]]}}"#, rdap_base);
    let asn = format!(r#"{{"services": [[["15000-16000"], ["{}/"]]]}}"#, rdap_base);
    ServerRegistry::from_sources(&whois_list, &dns, &ipv4, EMPTY_BOOTSTRAP, &asn).unwrap()
}

/// Defaults with every remote source pointed at a closed local port.
pub fn offline_config() -> Config {
    Config {
        whois_timeout_seconds: 5,
        http_timeout_seconds: 5,
        iana_fallback: false,
        cache_dir: std::env::temp_dir().join("whois21-tests-unused"),
        whois_servers_url: "http://127.0.0.1:9/whois-servers.txt".to_string(),
        rdap_bootstrap_url: "http://127.0.0.1:9/".to_string(),
        ip_api_url: "http://127.0.0.1:9".to_string(),
        ..Config::default()
    }
}
