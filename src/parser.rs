use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use tracing::debug;

/// Normalized key -> every value seen for it, in response order.
pub type FieldMap = BTreeMap<String, Vec<String>>;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[a-z0-9._%+\-]+@[a-z0-9\-]+(?:\.[a-z0-9\-]+)*\.[a-z]{2,}\b").unwrap()
});

static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\+?[0-9(][0-9 .()\-/]{4,}[0-9](?:\s*(?:ext\.?|x)\s*[0-9]+)?$").unwrap()
});

// A dot followed by a label character means the "key" is really a hostname.
static HOSTNAME_KEY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.[A-Za-z0-9]").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateKind {
    Creation,
    Updated,
    Expires,
}

/// A value the parser could not interpret. Never fails the query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseWarning {
    pub field: String,
    pub value: String,
    pub message: String,
}

/// Structured view of one registration response, from WHOIS text or RDAP JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedWhoisData {
    pub fields: FieldMap,
    pub registrar: Option<String>,
    pub creation_date: Vec<DateTime<Utc>>,
    pub updated_date: Vec<DateTime<Utc>>,
    pub expires_date: Vec<DateTime<Utc>>,
    pub emails: BTreeSet<String>,
    pub phone_numbers: BTreeSet<String>,
    pub fax_numbers: BTreeSet<String>,
    pub name_servers: BTreeSet<String>,
    pub status: BTreeSet<String>,
    pub unrecognized: Vec<String>,
    pub warnings: Vec<ParseWarning>,
}

impl ParsedWhoisData {
    pub fn add_field(&mut self, key: &str, value: &str) {
        self.fields.entry(key.to_string()).or_default().push(value.to_string());
    }

    pub fn add_date(&mut self, kind: DateKind, date: DateTime<Utc>) {
        let dates = match kind {
            DateKind::Creation => &mut self.creation_date,
            DateKind::Updated => &mut self.updated_date,
            DateKind::Expires => &mut self.expires_date,
        };
        if !dates.contains(&date) {
            dates.push(date);
        }
    }

    /// Parses `value` as a date of the given kind, recording a warning when it can't.
    pub fn add_date_str(&mut self, kind: DateKind, field: &str, value: &str) {
        match parse_date(value) {
            Some(date) => self.add_date(kind, date),
            None => {
                debug!("Failed to parse date for '{}': {}", field, value);
                self.warnings.push(ParseWarning {
                    field: field.to_string(),
                    value: value.to_string(),
                    message: "unrecognized date format".to_string(),
                });
            }
        }
    }

    pub fn add_name_servers(&mut self, value: &str) {
        for fragment in value.split(|c: char| c.is_whitespace() || c == ',' || c == ';') {
            if let Some(host) = normalize_host(fragment) {
                self.name_servers.insert(host);
            }
        }
    }

    /// Merges the derived collections of a later response into this one.
    /// Fields and unrecognized lines stay with whichever response is canonical.
    pub fn absorb(&mut self, other: &ParsedWhoisData) {
        if self.registrar.is_none() {
            self.registrar = other.registrar.clone();
        }
        for date in &other.creation_date {
            self.add_date(DateKind::Creation, *date);
        }
        for date in &other.updated_date {
            self.add_date(DateKind::Updated, *date);
        }
        for date in &other.expires_date {
            self.add_date(DateKind::Expires, *date);
        }
        self.emails.extend(other.emails.iter().cloned());
        self.phone_numbers.extend(other.phone_numbers.iter().cloned());
        self.fax_numbers.extend(other.fax_numbers.iter().cloned());
        self.name_servers.extend(other.name_servers.iter().cloned());
        self.status.extend(other.status.iter().cloned());
        self.warnings.extend(other.warnings.iter().cloned());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WhoisParser;

impl WhoisParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, data: &str) -> ParsedWhoisData {
        let mut parsed = ParsedWhoisData::default();
        let lines: Vec<&str> = data.lines().collect();
        let mut i = 0;

        while i < lines.len() {
            let raw_line = lines[i];
            let line = raw_line.trim();
            i += 1;

            if line.is_empty() {
                continue;
            }
            if is_comment(line) {
                parsed.unrecognized.push(raw_line.to_string());
                continue;
            }

            let (key, value) = match split_key_value(line) {
                Some(kv) => kv,
                None => {
                    parsed.unrecognized.push(raw_line.to_string());
                    continue;
                }
            };

            if !value.is_empty() {
                self.apply_field(&mut parsed, &key, &value);
                continue;
            }

            // An empty value opens a section of indented, colon-less lines.
            let mut absorbed = false;
            while i < lines.len() {
                let next = lines[i].trim();
                if next.is_empty() || split_key_value(next).is_some() {
                    break;
                }
                i += 1;
                if is_comment(next) {
                    parsed.unrecognized.push(lines[i - 1].to_string());
                    continue;
                }
                self.apply_field(&mut parsed, &key, strip_value(next));
                absorbed = true;
            }
            if !absorbed {
                parsed.unrecognized.push(raw_line.to_string());
            }
        }

        for found in EMAIL_RE.find_iter(data) {
            parsed.emails.insert(found.as_str().to_lowercase());
        }

        parsed
    }

    fn apply_field(&self, parsed: &mut ParsedWhoisData, key: &str, value: &str) {
        if value.is_empty() {
            return;
        }
        parsed.add_field(key, value);

        if let Some(kind) = date_kind(key) {
            parsed.add_date_str(kind, key, value);
        }

        if is_name_server_key(key) {
            parsed.add_name_servers(value);
        }

        if is_status_key(key) {
            if let Some(status) = normalize_status(value) {
                parsed.status.insert(status);
            }
        }

        if is_registrar_key(key) && parsed.registrar.is_none() {
            parsed.registrar = Some(value.to_string());
        }

        if key.contains("fax") {
            if PHONE_RE.is_match(value) {
                parsed.fax_numbers.insert(value.to_string());
            }
        } else if key.contains("phone") || key == "tel" || key.ends_with(" tel") {
            if PHONE_RE.is_match(value) {
                parsed.phone_numbers.insert(value.to_string());
            }
        }
    }

    /// The next server to ask, if the response points somewhere else.
    pub fn referral_server(&self, data: &str) -> Option<String> {
        for line in data.lines() {
            let line = line.trim();
            if is_comment(line) {
                continue;
            }
            let Some((key, value)) = split_key_value(line) else {
                continue;
            };

            let is_referral_key = key == "refer"
                || key == "whois"
                || key == "referralserver"
                || key.contains("whois server");
            if !is_referral_key {
                continue;
            }

            if let Some(server) = clean_referral(&value) {
                return Some(server);
            }
        }
        None
    }

    /// Empty replies and explicit error keys mean "try the next server".
    pub fn is_error_response(&self, parsed: &ParsedWhoisData) -> bool {
        parsed.is_empty() || parsed.fields.contains_key("error") || parsed.fields.contains_key("whois error")
    }
}

fn is_comment(line: &str) -> bool {
    line.starts_with('%') || line.starts_with('#')
}

fn strip_value(value: &str) -> &str {
    value.trim_matches(|c: char| c.is_whitespace() || c == '<' || c == '>')
}

pub fn normalize_key(key: &str) -> String {
    key.trim_matches(|c: char| c.is_whitespace() || c == '<' || c == '>' || c == '.')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn split_key_value(line: &str) -> Option<(String, String)> {
    let (raw_key, raw_value) = line.split_once(':')?;

    // "https://..." and "ns1.example.net 2001:db8::1" are not key/value pairs
    if raw_value.starts_with("//") || HOSTNAME_KEY_RE.is_match(raw_key) {
        return None;
    }

    let key = normalize_key(raw_key);
    if key.is_empty() || key.len() > 64 || !key.chars().any(char::is_alphabetic) {
        return None;
    }

    Some((key, strip_value(raw_value).to_string()))
}

pub fn date_kind(key: &str) -> Option<DateKind> {
    if key.contains("whois database") || key.contains("rdap database") {
        return None;
    }
    if key.contains("expir") || key.contains("paid-till") || key == "expires" || key == "expires on" {
        return Some(DateKind::Expires);
    }
    if key.contains("creat") || key == "registered" || key == "registered on" || key.contains("registration date") || key.contains("registration time") {
        return Some(DateKind::Creation);
    }
    if key.contains("updated") || key.contains("changed") || key.contains("modified") || key.contains("last update") {
        return Some(DateKind::Updated);
    }
    None
}

fn is_name_server_key(key: &str) -> bool {
    if key.contains("handle") || key.contains(" id") || key.contains("ip") {
        return false;
    }
    key.contains("name server")
        || key.contains("nameserver")
        || matches!(key, "nserver" | "ns" | "dns" | "domain servers in listed order" | "host name")
}

fn is_status_key(key: &str) -> bool {
    matches!(key, "status" | "domain status" | "epp status" | "registry status" | "state")
}

fn is_registrar_key(key: &str) -> bool {
    matches!(key, "registrar" | "registrar name" | "sponsoring registrar" | "registrar organization")
}

/// "clientHold https://icann.org/epp#clientHold" -> "clientHold"
fn normalize_status(value: &str) -> Option<String> {
    let mut parts = value.split_whitespace();
    let first = parts.next()?;
    match parts.next() {
        Some(rest) if rest.starts_with("http") || rest.starts_with('(') => Some(first.to_string()),
        _ => Some(value.to_string()),
    }
}

fn normalize_host(fragment: &str) -> Option<String> {
    let host = fragment.trim().trim_end_matches('.').to_lowercase();
    if host.is_empty() || !host.contains('.') || host.parse::<IpAddr>().is_ok() {
        return None;
    }
    if !host.chars().all(|c| c.is_alphanumeric() || matches!(c, '.' | '-' | '_')) {
        return None;
    }
    Some(host)
}

fn clean_referral(value: &str) -> Option<String> {
    let value = value.trim();
    if value.starts_with("rwhois://") {
        return None;
    }
    let value = value.strip_prefix("whois://").unwrap_or(value);
    let host = value.split('/').next()?.trim().to_lowercase();
    if host.is_empty() || host.contains(char::is_whitespace) || !host.contains('.') {
        return None;
    }
    Some(host)
}

/// Parse the date formats commonly found in whois data
pub fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    let cleaned = clean_date(date_str);
    if let Some(date) = parse_date_exact(cleaned) {
        return Some(date);
    }
    // "hostmaster@example.net 20020101" style values carry the date as one token
    cleaned.split_whitespace().find_map(parse_date_exact)
}

fn clean_date(date_str: &str) -> &str {
    let mut s = date_str.trim();
    if let Some(idx) = s.find('(') {
        s = s[..idx].trim_end();
    }
    for suffix in [" UTC", " GMT", " utc", " gmt"] {
        if let Some(stripped) = s.strip_suffix(suffix) {
            s = stripped.trim_end();
        }
    }
    s
}

fn parse_date_exact(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    let offset_formats = [
        "%Y-%m-%dT%H:%M:%S%.f%z",          // 2025-05-18T13:36:06.123+0000
        "%Y-%m-%dT%H:%M:%S%z",             // 2025-05-18T13:36:06+0000
        "%Y-%m-%d %H:%M:%S%.f%:z",         // 2025-05-18 13:36:06.123+03:00
        "%Y-%m-%d %H:%M:%S %z",            // 2025-05-18 13:36:06 +0300
        "%Y-%m-%d %H:%M:%S%:z",            // 2025-05-18 13:36:06+03:00
    ];
    for format in &offset_formats {
        if let Ok(dt) = DateTime::parse_from_str(s, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    let datetime_formats = [
        "%Y-%m-%dT%H:%M:%S%.fZ",           // 2025-05-18T13:36:06.0Z
        "%Y-%m-%dT%H:%M:%SZ",              // 2025-05-18T13:36:06Z
        "%Y-%m-%dT%H:%M:%S%.f",            // 2025-05-18T13:36:06.5
        "%Y-%m-%dT%H:%M:%S",               // 2025-05-18T13:36:06
        "%Y-%m-%d %H:%M:%S%.f",            // 2025-05-18 13:36:06.5
        "%Y-%m-%d %H:%M:%S",               // 2025-05-18 13:36:06
        "%Y-%m-%d %H:%M",                  // 2025-05-18 13:36
        "%Y.%m.%d %H:%M:%S",               // 2025.05.18 13:36:06
        "%Y/%m/%d %H:%M:%S",               // 2025/05/18 13:36:06
        "%d.%m.%Y %H:%M:%S",               // 18.05.2025 13:36:06
        "%d-%b-%Y %H:%M:%S",               // 18-May-2025 13:36:06
        "%a %b %d %H:%M:%S %Y",            // Sun May 18 13:36:06 2025
    ];
    for format in &datetime_formats {
        if let Ok(naive_dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(DateTime::from_naive_utc_and_offset(naive_dt, Utc));
        }
    }

    let date_only_formats = [
        "%Y-%m-%d",                        // 2025-05-18
        "%Y.%m.%d",                        // 2025.05.18
        "%Y/%m/%d",                        // 2025/05/18
        "%d-%b-%Y",                        // 18-May-2025
        "%d-%B-%Y",                        // 18-May-2025
        "%d %b %Y",                        // 18 May 2025
        "%d %B %Y",                        // 18 May 2025
        "%b %d %Y",                        // May 18 2025
        "%d.%m.%Y",                        // 18.05.2025
        "%m/%d/%Y",                        // 05/18/2025
        "%d/%m/%Y",                        // 18/05/2025
    ];
    for format in &date_only_formats {
        if let Ok(naive_date) = NaiveDate::parse_from_str(s, format) {
            return naive_date
                .and_hms_opt(0, 0, 0)
                .map(|naive_dt| DateTime::from_naive_utc_and_offset(naive_dt, Utc));
        }
    }

    // 20250518
    if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) {
        let year = s[0..4].parse().ok()?;
        let month = s[4..6].parse().ok()?;
        let day = s[6..8].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive_dt| DateTime::from_naive_utc_and_offset(naive_dt, Utc));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const VERISIGN_FIXTURE: &str = "   Domain Name: GOOGLE.COM\r\n\
   Registry Domain ID: 2138514_DOMAIN_COM-VRSN\r\n\
   Registrar WHOIS Server: whois.markmonitor.com\r\n\
   Registrar URL: http://www.markmonitor.com\r\n\
   Updated Date: 2019-09-09T15:39:04Z\r\n\
   Creation Date: 1997-09-15T04:00:00Z\r\n\
   Registry Expiry Date: 2028-09-14T04:00:00Z\r\n\
   Registrar: MarkMonitor Inc.\r\n\
   Registrar IANA ID: 292\r\n\
   Registrar Abuse Contact Email: abusecomplaints@markmonitor.com\r\n\
   Registrar Abuse Contact Phone: +1.2086851750\r\n\
   Domain Status: clientDeleteProhibited https://icann.org/epp#clientDeleteProhibited\r\n\
   Domain Status: serverHold https://icann.org/epp#serverHold\r\n\
   Name Server: NS1.GOOGLE.COM\r\n\
   Name Server: NS2.GOOGLE.COM\r\n\
   DNSSEC: unsigned\r\n\
>>> Last update of whois database: 2024-05-01T10:00:00Z <<<\r\n\
\r\n\
For more information on Whois status codes, please visit https://icann.org/epp\r\n";

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[test]
    fn test_parse_gtld_response() {
        let parsed = WhoisParser::new().parse(VERISIGN_FIXTURE);

        assert_eq!(parsed.creation_date, vec![utc(1997, 9, 15, 4, 0, 0)]);
        assert_eq!(parsed.updated_date, vec![utc(2019, 9, 9, 15, 39, 4)]);
        assert_eq!(parsed.expires_date, vec![utc(2028, 9, 14, 4, 0, 0)]);
        assert_eq!(parsed.registrar.as_deref(), Some("MarkMonitor Inc."));
        assert!(parsed.emails.contains("abusecomplaints@markmonitor.com"));
        assert!(parsed.phone_numbers.contains("+1.2086851750"));
        assert_eq!(
            parsed.status.iter().cloned().collect::<Vec<_>>(),
            vec!["clientDeleteProhibited".to_string(), "serverHold".to_string()]
        );
        assert_eq!(parsed.fields["registrar iana id"], vec!["292".to_string()]);
        assert_eq!(parsed.fields["domain status"].len(), 2);
        assert!(parsed.fields.contains_key("last update of whois database"));
        assert!(parsed
            .unrecognized
            .iter()
            .any(|l| l.starts_with("For more information")));
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn test_name_servers_never_concatenate() {
        let text = "Name Server: ns1.example.com\nName Server: ns2.example.com\n";
        let parsed = WhoisParser::new().parse(text);
        let expected: BTreeSet<String> =
            ["ns1.example.com", "ns2.example.com"].iter().map(|s| s.to_string()).collect();
        assert_eq!(parsed.name_servers, expected);
        assert!(!parsed.name_servers.contains("ns1.example.comns2.example.com"));
    }

    #[test]
    fn test_name_server_values_split_and_deduplicated() {
        let text = "nserver: NS1.Example.NET. 192.0.2.1\n\
                    nserver: ns2.example.net, ns3.example.net\n\
                    Name Server: ns1.example.net\n";
        let parsed = WhoisParser::new().parse(text);
        let hosts: Vec<_> = parsed.name_servers.iter().cloned().collect();
        assert_eq!(hosts, vec!["ns1.example.net", "ns2.example.net", "ns3.example.net"]);
    }

    #[test]
    fn test_multiline_section() {
        let text = "Domain:\n    example.co.uk\n\n\
                    Name servers:\n        ns1.example.net      192.0.2.53\n        ns2.example.net      2001:db8::53\n\n\
                    Registered on: 25-Jun-1999\n";
        let parsed = WhoisParser::new().parse(text);
        assert_eq!(parsed.fields["domain"], vec!["example.co.uk".to_string()]);
        assert_eq!(parsed.name_servers.len(), 2);
        assert!(parsed.name_servers.contains("ns2.example.net"));
        assert_eq!(parsed.creation_date, vec![utc(1999, 6, 25, 0, 0, 0)]);
    }

    #[test]
    fn test_empty_key_without_section_is_kept_verbatim() {
        let text = "Registrant Phone: +1.5555551234\nRegistrant Phone Ext:\nRegistrant Fax: +1.5555554321\n";
        let parsed = WhoisParser::new().parse(text);
        assert_eq!(parsed.unrecognized, vec!["Registrant Phone Ext:".to_string()]);
        assert!(!parsed.fields.contains_key("registrant phone ext"));
        assert_eq!(parsed.fields.len(), 2);
    }

    #[test]
    fn test_repeated_keys_accumulate_in_order() {
        let text = "e-mail: first@example.org\ne-mail: second@example.org\nE-Mail: third@example.org\n";
        let parsed = WhoisParser::new().parse(text);
        assert_eq!(
            parsed.fields["e-mail"],
            vec!["first@example.org", "second@example.org", "third@example.org"]
        );
        assert_eq!(parsed.emails.len(), 3);
    }

    #[test]
    fn test_unparsable_date_is_omitted_with_warning() {
        let text = "Domain Name: example.org\nCreation Date: unknown\nExpiry Date: 2030-01-01\n";
        let parsed = WhoisParser::new().parse(text);
        assert!(parsed.creation_date.is_empty());
        assert_eq!(parsed.expires_date, vec![utc(2030, 1, 1, 0, 0, 0)]);
        assert_eq!(parsed.warnings.len(), 1);
        assert_eq!(parsed.warnings[0].field, "creation date");
        assert_eq!(parsed.warnings[0].value, "unknown");
    }

    #[test]
    fn test_conflicting_dates_are_preserved() {
        let text = "Creation Date: 2001-01-01T00:00:00Z\ncreated: 2001-01-02\nCreated Date: 2001-01-01T00:00:00Z\n";
        let parsed = WhoisParser::new().parse(text);
        assert_eq!(parsed.creation_date, vec![utc(2001, 1, 1, 0, 0, 0), utc(2001, 1, 2, 0, 0, 0)]);
    }

    #[test]
    fn test_fax_and_phone_are_separated() {
        let text = "Registrant Phone: +1.5555551234\nRegistrant Phone Ext:\nRegistrant Fax: +1.5555554321\nfax-no: +49 69 27235 238\nphone: REDACTED FOR PRIVACY\n";
        let parsed = WhoisParser::new().parse(text);
        assert_eq!(parsed.phone_numbers.len(), 1);
        assert!(parsed.phone_numbers.contains("+1.5555551234"));
        assert_eq!(parsed.fax_numbers.len(), 2);
        assert!(parsed.fax_numbers.contains("+49 69 27235 238"));
    }

    #[test]
    fn test_parse_is_idempotent() {
        let parser = WhoisParser::new();
        assert_eq!(parser.parse(VERISIGN_FIXTURE), parser.parse(VERISIGN_FIXTURE));
    }

    #[test]
    fn test_referral_detection() {
        let parser = WhoisParser::new();
        assert_eq!(
            parser.referral_server(VERISIGN_FIXTURE).as_deref(),
            Some("whois.markmonitor.com")
        );
        assert_eq!(
            parser.referral_server("refer:        whois.verisign-grs.com\n\ndomain: COM\n").as_deref(),
            Some("whois.verisign-grs.com")
        );
        assert_eq!(
            parser.referral_server("ReferralServer:  whois://whois.ripe.net\n").as_deref(),
            Some("whois.ripe.net")
        );
        assert_eq!(parser.referral_server("ReferralServer: rwhois://rwhois.example.net:4321\n"), None);
        assert_eq!(parser.referral_server("Registrar WHOIS Server:\n"), None);
    }

    #[test]
    fn test_error_response_detection() {
        let parser = WhoisParser::new();
        assert!(parser.is_error_response(&parser.parse("No match for \"NOPE.COM\".\n")));
        assert!(parser.is_error_response(&parser.parse("Error: rate limit exceeded\n")));
        assert!(!parser.is_error_response(&parser.parse(VERISIGN_FIXTURE)));
    }

    #[test]
    fn test_key_normalization() {
        assert_eq!(normalize_key("  Registrar   Abuse Contact\tEmail "), "registrar abuse contact email");
        assert_eq!(normalize_key(">>> Last update of WHOIS database"), "last update of whois database");
        assert_eq!(normalize_key("Domain Name......"), "domain name");
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = utc(2025, 5, 18, 0, 0, 0);
        for input in [
            "2025-05-18",
            "2025.05.18",
            "2025/05/18",
            "18-May-2025",
            "18-MAY-2025",
            "18 May 2025",
            "18.05.2025",
            "05/18/2025",
            "20250518",
            "2025-05-18 (YYYY-MM-DD)",
        ] {
            assert_eq!(parse_date(input), Some(expected), "format: {}", input);
        }

        let expected = utc(2025, 5, 18, 13, 36, 6);
        for input in [
            "2025-05-18T13:36:06Z",
            "2025-05-18T13:36:06.0Z",
            "2025-05-18T16:36:06+03:00",
            "2025-05-18T13:36:06+0000",
            "2025-05-18 13:36:06",
            "2025-05-18 13:36:06 UTC",
            "2025-05-18 16:36:06+03:00",
        ] {
            assert_eq!(parse_date(input), Some(expected), "format: {}", input);
        }

        assert_eq!(
            parse_date("hostmaster@example.net 20020101"),
            Some(utc(2002, 1, 1, 0, 0, 0))
        );
        assert_eq!(parse_date("unknown"), None);
        assert_eq!(parse_date(""), None);
    }
}
