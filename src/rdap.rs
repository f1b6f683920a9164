//! RDAP (Registration Data Access Protocol) client.
//!
//! Fetches JSON from the bootstrap base URL, follows `related` links to the
//! registrar's server, merges the responses and flattens entities, vCards and
//! events into the same [`ParsedWhoisData`] shape the text parser produces.

use crate::{
    config::Config,
    errors::WhoisError,
    parser::{DateKind, ParsedWhoisData},
    registry::{QueryTarget, ServerRegistry},
};
use reqwest::header::ACCEPT;
use serde_json::{Map, Value};
use std::{
    collections::{HashSet, VecDeque},
    time::Duration,
};
use tracing::{debug, info, warn};
use url::Url;

pub const RDAP_ACCEPT: &str = "application/rdap+json, application/json";
const RDAP_MEDIA_TYPE: &str = "application/rdap+json";

/// Null-tolerant accessors for RDAP JSON.
pub trait ValueExt {
    fn str_at(&self, key: &str) -> Option<&str>;
    fn array_at(&self, key: &str) -> &[Value];
    /// Strings and numbers as text; anything else is `None`.
    fn as_text(&self) -> Option<String>;
}

impl ValueExt for Value {
    fn str_at(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    fn array_at(&self, key: &str) -> &[Value] {
        self.get(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn as_text(&self) -> Option<String> {
        match self {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RdapResponse {
    /// The first URL queried.
    pub url: String,
    /// Every URL that answered, in order.
    pub urls: Vec<String>,
    pub data: Value,
    pub parsed: ParsedWhoisData,
}

pub struct RdapService {
    client: reqwest::Client,
    timeout: Duration,
    max_referrals: usize,
}

impl RdapService {
    pub fn new(config: &Config) -> Result<Self, WhoisError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(config.max_rdap_referrals))
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            timeout: config.http_timeout(),
            max_referrals: config.max_rdap_referrals,
        })
    }

    /// Fetches `url` and its related links, then merges and flattens the answers.
    pub async fn lookup(&self, url: &str, timeout: Duration) -> Result<RdapResponse, WhoisError> {
        let (urls, responses) = self.fetch_all(url, timeout).await?;

        let data = merge(&responses);
        let parsed = flatten(&data);
        info!("RDAP answer from {} ({} responses)", url, responses.len());

        Ok(RdapResponse { url: url.to_string(), urls, data, parsed })
    }

    pub async fn fetch(&self, url: &str) -> Result<Vec<Value>, WhoisError> {
        self.fetch_all(url, self.timeout).await.map(|(_, responses)| responses)
    }

    async fn fetch_all(&self, url: &str, timeout: Duration) -> Result<(Vec<String>, Vec<Value>), WhoisError> {
        let first = self.get_json(url, timeout).await?;

        let mut visited = HashSet::from([url.to_string()]);
        let mut pending = VecDeque::new();
        queue_related(url, &first, &mut visited, &mut pending);

        let mut urls = vec![url.to_string()];
        let mut responses = vec![first];
        let mut followed = 0;

        while let Some(next) = pending.pop_front() {
            if followed >= self.max_referrals {
                return Err(WhoisError::TooManyReferrals(self.max_referrals));
            }
            followed += 1;

            debug!("Following RDAP referral to {}", next);
            match self.get_json(&next, timeout).await {
                Ok(value) => {
                    queue_related(&next, &value, &mut visited, &mut pending);
                    urls.push(next);
                    responses.push(value);
                }
                Err(e) => {
                    warn!("RDAP referral {} failed: {}", next, e);
                    break;
                }
            }
        }

        Ok((urls, responses))
    }

    async fn get_json(&self, url: &str, timeout: Duration) -> Result<Value, WhoisError> {
        debug!("Querying RDAP server: {}", url);

        let response = self
            .client
            .get(url)
            .header(ACCEPT, RDAP_ACCEPT)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WhoisError::Rdap { url: url.to_string(), status: status.as_u16() });
        }

        let body = response.bytes().await.map_err(|e| self.map_transport_error(e))?;
        debug!("RDAP response length: {} bytes", body.len());
        Ok(serde_json::from_slice(&body)?)
    }

    fn map_transport_error(&self, e: reqwest::Error) -> WhoisError {
        if e.is_redirect() {
            WhoisError::TooManyReferrals(self.max_referrals)
        } else if e.is_timeout() {
            WhoisError::Timeout
        } else {
            WhoisError::HttpError(e)
        }
    }
}

/// Query URL for `target` on the RDAP server the registry assigns to it.
pub fn endpoint(registry: &ServerRegistry, target: &QueryTarget) -> Result<String, WhoisError> {
    let entry = registry.resolve_rdap(target)?;
    query_url(&entry.server, target)
}

/// `<base>domain/<name>`, `<base>ip/<addr>` or `<base>autnum/<n>`.
pub fn query_url(base: &str, target: &QueryTarget) -> Result<String, WhoisError> {
    let base = if base.ends_with('/') { base.to_string() } else { format!("{}/", base) };
    let base = Url::parse(&base)
        .map_err(|e| WhoisError::Internal(format!("Invalid RDAP server URL '{}': {}", base, e)))?;
    base.join(&target.rdap_path())
        .map(String::from)
        .map_err(|e| WhoisError::Internal(format!("Failed to construct RDAP URL: {}", e)))
}

fn queue_related(current: &str, value: &Value, visited: &mut HashSet<String>, pending: &mut VecDeque<String>) {
    for link in related_links(current, value) {
        if visited.insert(link.clone()) {
            pending.push_back(link);
        }
    }
}

/// Absolute hrefs of `related` links that point at more RDAP data.
pub fn related_links(current: &str, value: &Value) -> Vec<String> {
    let base = Url::parse(current).ok();
    value
        .array_at("links")
        .iter()
        .filter(|link| link.str_at("rel") == Some("related"))
        .filter(|link| link.str_at("type").map_or(false, |t| t.eq_ignore_ascii_case(RDAP_MEDIA_TYPE)))
        .filter_map(|link| link.str_at("href"))
        .filter_map(|href| match &base {
            Some(base) => base.join(href).ok().map(String::from),
            None => Url::parse(href).ok().map(String::from),
        })
        .collect()
}

/// First value wins for scalars and objects, arrays concatenate, `links` are dropped.
pub fn merge(responses: &[Value]) -> Value {
    let mut merged = Map::new();
    for response in responses {
        let Value::Object(object) = response else {
            continue;
        };
        for (key, value) in object {
            if key == "links" {
                continue;
            }
            match (merged.get_mut(key), value) {
                (None, _) => {
                    merged.insert(key.clone(), value.clone());
                }
                (Some(Value::Array(existing)), Value::Array(more)) => {
                    existing.extend(more.iter().cloned());
                }
                _ => {}
            }
        }
    }
    Value::Object(merged)
}

const SCALAR_FIELDS: &[(&str, &str)] = &[
    ("handle", "handle"),
    ("ldhName", "domain name"),
    ("unicodeName", "unicode name"),
    ("name", "name"),
    ("type", "type"),
    ("country", "country"),
    ("ipVersion", "ip version"),
    ("startAddress", "start address"),
    ("endAddress", "end address"),
    ("startAutnum", "start autnum"),
    ("endAutnum", "end autnum"),
    ("port43", "port43"),
];

/// Maps an RDAP object onto the normalized schema. Missing members are omitted.
pub fn flatten(data: &Value) -> ParsedWhoisData {
    let mut parsed = ParsedWhoisData::default();

    for (member, label) in SCALAR_FIELDS {
        if let Some(text) = data.get(*member).and_then(ValueExt::as_text) {
            parsed.add_field(label, &text);
        }
    }

    for status in data.array_at("status").iter().filter_map(Value::as_str) {
        parsed.add_field("status", status);
        parsed.status.insert(status.to_string());
    }

    flatten_events(data, &mut parsed);
    flatten_public_ids(data, &mut parsed);

    for nameserver in data.array_at("nameservers") {
        if let Some(name) = nameserver.str_at("ldhName").or_else(|| nameserver.str_at("unicodeName")) {
            parsed.add_field("name server", name);
            parsed.add_name_servers(name);
        }
    }

    for entity in data.array_at("entities") {
        flatten_entity(entity, &mut parsed);
    }

    parsed
}

fn flatten_events(object: &Value, parsed: &mut ParsedWhoisData) {
    for event in object.array_at("events") {
        let (Some(action), Some(date)) = (event.str_at("eventAction"), event.str_at("eventDate")) else {
            continue;
        };
        let action = action.to_lowercase();
        match action.as_str() {
            "registration" => parsed.add_date_str(DateKind::Creation, "registration", date),
            "expiration" => parsed.add_date_str(DateKind::Expires, "expiration", date),
            "last changed" => parsed.add_date_str(DateKind::Updated, "last changed", date),
            "transfer" => parsed.add_field("transfer date", date),
            other => parsed.add_field(other, date),
        }
    }
}

fn flatten_public_ids(object: &Value, parsed: &mut ParsedWhoisData) {
    for id in object.array_at("publicIds") {
        if let (Some(kind), Some(identifier)) = (id.str_at("type"), id.str_at("identifier")) {
            parsed.add_field(&kind.to_lowercase(), identifier);
        }
    }
}

fn flatten_entity(entity: &Value, parsed: &mut ParsedWhoisData) {
    let mut roles: Vec<String> = entity
        .array_at("roles")
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_lowercase)
        .collect();
    if roles.is_empty() {
        roles.push("contact".to_string());
    }

    let add = |parsed: &mut ParsedWhoisData, label: &str, value: &str| {
        for role in &roles {
            parsed.add_field(&format!("{} {}", role, label), value);
        }
    };

    if let Some(handle) = entity.str_at("handle") {
        add(parsed, "handle", handle);
    }

    for property in vcard_properties(entity) {
        let Some(name) = property.get(0).and_then(Value::as_str) else {
            continue;
        };
        let params = property.get(1).unwrap_or(&Value::Null);
        let value = property.get(3).unwrap_or(&Value::Null);

        match name.to_lowercase().as_str() {
            "fn" => {
                if let Some(text) = vcard_text(value) {
                    if roles.iter().any(|r| r == "registrar") && parsed.registrar.is_none() {
                        parsed.registrar = Some(text.clone());
                    }
                    add(parsed, "name", &text);
                }
            }
            "org" => {
                if let Some(text) = vcard_text(value) {
                    add(parsed, "organization", &text);
                }
            }
            "adr" => {
                let label = params.str_at("label").map(|s| s.replace('\n', ", "));
                if let Some(text) = label.or_else(|| vcard_text(value)) {
                    add(parsed, "address", &text);
                }
            }
            "email" => {
                if let Some(text) = vcard_text(value) {
                    parsed.emails.insert(text.to_lowercase());
                    add(parsed, "email", &text);
                }
            }
            "tel" => {
                if let Some(text) = vcard_text(value) {
                    let number = text.strip_prefix("tel:").unwrap_or(&text).to_string();
                    if is_fax(params) {
                        parsed.fax_numbers.insert(number.clone());
                        add(parsed, "fax", &number);
                    } else {
                        parsed.phone_numbers.insert(number.clone());
                        add(parsed, "phone", &number);
                    }
                }
            }
            "version" => {}
            other => {
                if let Some(text) = vcard_text(value) {
                    add(parsed, other, &text);
                }
            }
        }
    }

    flatten_public_ids(entity, parsed);
    for id in entity.array_at("publicIds") {
        if let (Some(kind), Some(identifier)) = (id.str_at("type"), id.str_at("identifier")) {
            add(parsed, &kind.to_lowercase(), identifier);
        }
    }

    for nested in entity.array_at("entities") {
        flatten_entity(nested, parsed);
    }
}

/// `vcardArray` is `["vcard", [[name, params, type, value], ...]]`.
fn vcard_properties(entity: &Value) -> &[Value] {
    entity
        .get("vcardArray")
        .and_then(|v| v.get(1))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Structured values (addresses, names) are joined with ", ".
fn vcard_text(value: &Value) -> Option<String> {
    match value {
        Value::Array(parts) => {
            let parts: Vec<String> = parts.iter().filter_map(vcard_text).collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        other => other.as_text(),
    }
}

fn is_fax(params: &Value) -> bool {
    match params.get("type") {
        Some(Value::String(kind)) => kind.eq_ignore_ascii_case("fax"),
        Some(Value::Array(kinds)) => kinds
            .iter()
            .filter_map(Value::as_str)
            .any(|kind| kind.eq_ignore_ascii_case("fax")),
        _ => false,
    }
}
