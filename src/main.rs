use anyhow::Context;
use futures::future::join_all;
use serde_json::json;
use tracing::info;
use whois21::{Config, IpLookupService, QueryTarget, WhoisClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "whois21=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let queries: Vec<String> = std::env::args().skip(1).collect();
    if queries.is_empty() {
        anyhow::bail!("usage: whois21 <domain|ip|asn>...");
    }

    let config = Config::load().context("loading configuration")?;
    let ip_lookup = IpLookupService::new(&config)?;
    let client = WhoisClient::new_with_config(config)?;
    info!("Looking up {} queries", queries.len());

    let results = join_all(queries.iter().map(|query| {
        let client = client.clone();
        let ip_lookup = &ip_lookup;
        async move {
            let record = client.lookup(query).await;
            let location = match QueryTarget::parse(query) {
                Ok(QueryTarget::Ip(ip)) => ip_lookup.lookup(&ip.to_string()).await.ok(),
                _ => None,
            };
            json!({ "whois": record, "location": location })
        }
    }))
    .await;

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
