//! IP geolocation through the ip-api.com JSON API.

use crate::{config::Config, errors::WhoisError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::IpAddr;
use tracing::{debug, warn};

/// ip-api accepts at most this many addresses per batch request.
const BATCH_LIMIT: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IpInfo {
    pub ip: String,
    pub success: bool,
    pub error: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub region: Option<String>,
    pub region_name: Option<String>,
    pub city: Option<String>,
    pub zip: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub timezone: Option<String>,
    pub isp: Option<String>,
    pub org: Option<String>,
    pub as_number: Option<String>,
    pub raw: Option<Value>,
}

impl IpInfo {
    fn failed(ip: &str, error: impl ToString) -> Self {
        Self {
            ip: ip.to_string(),
            success: false,
            error: Some(error.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpApiResponse {
    status: Option<String>,
    message: Option<String>,
    query: Option<String>,
    country: Option<String>,
    country_code: Option<String>,
    region: Option<String>,
    region_name: Option<String>,
    city: Option<String>,
    zip: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    timezone: Option<String>,
    isp: Option<String>,
    org: Option<String>,
    #[serde(rename = "as")]
    as_number: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn to_info(ip: &str, value: Value) -> IpInfo {
    let response: IpApiResponse = match serde_json::from_value(value.clone()) {
        Ok(response) => response,
        Err(e) => return IpInfo::failed(ip, format!("unexpected response: {}", e)),
    };

    if response.status.as_deref() != Some("success") {
        let message = non_empty(response.message).unwrap_or_else(|| "lookup failed".to_string());
        return IpInfo::failed(ip, message);
    }

    IpInfo {
        ip: response.query.unwrap_or_else(|| ip.to_string()),
        success: true,
        error: None,
        country: non_empty(response.country),
        country_code: non_empty(response.country_code),
        region: non_empty(response.region),
        region_name: non_empty(response.region_name),
        city: non_empty(response.city),
        zip: non_empty(response.zip),
        lat: response.lat,
        lon: response.lon,
        timezone: non_empty(response.timezone),
        isp: non_empty(response.isp),
        org: non_empty(response.org),
        as_number: non_empty(response.as_number),
        raw: Some(value),
    }
}

fn parse_address(ip: &str) -> Result<IpAddr, WhoisError> {
    ip.trim()
        .parse::<IpAddr>()
        .map_err(|_| WhoisError::InvalidAddress(ip.to_string()))
}

pub struct IpLookupService {
    client: reqwest::Client,
    base_url: String,
    fields: String,
    lang: String,
}

impl IpLookupService {
    pub fn new(config: &Config) -> Result<Self, WhoisError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            base_url: config.ip_api_url.trim_end_matches('/').to_string(),
            fields: config.ip_api_fields.clone(),
            lang: config.ip_api_lang.clone(),
        })
    }

    /// Geolocates one address. Only an unparsable address is an `Err`; every
    /// other failure is reported in the returned record.
    pub async fn lookup(&self, ip: &str) -> Result<IpInfo, WhoisError> {
        let addr = parse_address(ip)?.to_string();
        let url = format!("{}/json/{}", self.base_url, addr);
        debug!("Geolocating {} via {}", addr, url);

        let response = match self
            .client
            .get(&url)
            .query(&[("fields", self.fields.as_str()), ("lang", self.lang.as_str())])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("IP lookup for {} failed: {}", addr, e);
                return Ok(IpInfo::failed(&addr, e));
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Ok(IpInfo::failed(&addr, format!("HTTP status {}", status)));
        }

        Ok(match response.json::<Value>().await {
            Ok(value) => to_info(&addr, value),
            Err(e) => IpInfo::failed(&addr, e),
        })
    }

    /// Validates every address, then geolocates them in batches. Results keep input order.
    pub async fn lookup_batch(&self, ips: &[&str]) -> Result<Vec<IpInfo>, WhoisError> {
        let addrs = ips
            .iter()
            .map(|ip| parse_address(ip).map(|addr| addr.to_string()))
            .collect::<Result<Vec<_>, _>>()?;

        let mut results = Vec::with_capacity(addrs.len());
        for chunk in addrs.chunks(BATCH_LIMIT) {
            results.extend(self.post_batch(chunk).await);
        }
        Ok(results)
    }

    async fn post_batch(&self, addrs: &[String]) -> Vec<IpInfo> {
        let url = format!("{}/batch", self.base_url);
        debug!("Geolocating {} addresses via {}", addrs.len(), url);

        let fail_all = |error: String| -> Vec<IpInfo> {
            addrs.iter().map(|ip| IpInfo::failed(ip, &error)).collect()
        };

        let response = match self
            .client
            .post(&url)
            .query(&[("fields", self.fields.as_str()), ("lang", self.lang.as_str())])
            .json(addrs)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Batch IP lookup failed: {}", e);
                return fail_all(e.to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            return fail_all(format!("HTTP status {}", status));
        }

        let values = match response.json::<Vec<Value>>().await {
            Ok(values) => values,
            Err(e) => return fail_all(e.to_string()),
        };

        let mut values = values.into_iter();
        addrs
            .iter()
            .map(|ip| match values.next() {
                Some(value) => to_info(ip, value),
                None => IpInfo::failed(ip, "missing from batch response"),
            })
            .collect()
    }
}
