//! Simple example of using the whois21 library
//!
//! Run with: cargo run --example simple_lookup --no-default-features

use whois21::{LookupOptions, WhoisClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("whois21=info")
        .init();

    let client = WhoisClient::new()?;

    for query in ["google.com", "rust-lang.org", "8.8.8.8", "AS15169"] {
        println!("\n{}", query);
        println!("{}", "-".repeat(50));

        let record = client.lookup(query).await;
        if !record.success {
            println!("  failed: {}", record.error.as_deref().unwrap_or("unknown error"));
            continue;
        }

        println!("  server:    {}", record.server.as_deref().unwrap_or("-"));
        println!("  registrar: {}", record.registrar.as_deref().unwrap_or("-"));
        for date in &record.creation_date {
            println!("  created:   {}", date);
        }
        for date in &record.expires_date {
            println!("  expires:   {}", date);
        }
        for ns in record.name_servers.iter().take(3) {
            println!("  ns:        {}", ns);
        }
    }

    // RDAP only
    let options = LookupOptions { force_rdap: Some(true), ..LookupOptions::default() };
    let record = client.lookup_with_options("example.com", &options).await;
    println!("\nexample.com over RDAP: success={} status={:?}", record.success, record.status);

    Ok(())
}
