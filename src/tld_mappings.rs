// Seed WHOIS servers merged under the downloaded server list. Several entries
// for one TLD are tried in order; the downloaded host always comes first.
pub static BUILTIN_WHOIS_SERVERS: &[(&str, &str)] = &[
    // Generic TLDs
    ("com", "whois.verisign-grs.com"),
    ("com", "whois.crsnic.net"),
    ("net", "whois.verisign-grs.com"),
    ("net", "whois.crsnic.net"),
    ("org", "whois.publicinterestregistry.org"),
    ("org", "whois.pir.org"),
    ("edu", "whois.educause.edu"),
    ("gov", "whois.nic.gov"),
    ("info", "whois.afilias.net"),
    ("biz", "whois.nic.biz"),
    ("name", "whois.nic.name"),
    ("jobs", "whois.nic.jobs"),
    ("ist", "whois.afilias-srs.net"),

    // Google registry
    ("app", "whois.nic.google"),
    ("dev", "whois.nic.google"),
    ("page", "whois.nic.google"),
    ("goog", "whois.nic.google"),
    ("google", "whois.nic.google"),

    // New gTLDs with their own nic host
    ("chat", "whois.nic.chat"),
    ("games", "whois.nic.games"),
    ("lat", "whois.nic.lat"),
    ("market", "whois.nic.market"),
    ("money", "whois.nic.money"),
    ("online", "whois.nic.online"),
    ("ooo", "whois.nic.ooo"),
    ("website", "whois.nic.website"),
    ("xyz", "whois.nic.xyz"),

    // Country code TLDs
    ("ai", "whois.nic.ai"),
    ("ar", "whois.nic.ar"),
    ("by", "whois.cctld.by"),
    ("ca", "whois.cira.ca"),
    ("cl", "whois.nic.cl"),
    ("co.uk", "whois.nic.uk"),
    ("cr", "whois.nic.cr"),
    ("de", "whois.denic.de"),
    ("do", "whois.nic.do"),
    ("hk", "whois.hkirc.hk"),
    ("hn", "whois.nic.hn"),
    ("hr", "whois.dns.hr"),
    ("id", "whois.pandi.or.id"),
    ("jp", "whois.jprs.jp"),
    ("kz", "whois.nic.kz"),
    ("li", "whois.nic.li"),
    ("lt", "whois.domreg.lt"),
    ("mx", "whois.mx"),
    ("nl", "whois.domain-registry.nl"),
    ("pe", "kero.yachay.pe"),
    ("ru", "whois.tcinet.ru"),
    ("uk", "whois.nic.uk"),
    ("za", "whois.registry.net.za"),
];

/// Regional registries asked about IP addresses, in order.
pub static IP_WHOIS_SERVERS: &[&str] = &["whois.arin.net", "whois.lacnic.net"];

/// Root server used to discover the WHOIS host of TLDs missing from the registry.
pub const IANA_WHOIS_SERVER: &str = "whois.iana.org";

/// Host names registries commonly use, tried after every known server failed.
pub fn whois_server_patterns(tld: &str) -> Vec<String> {
    vec![format!("whois.nic.{}", tld), format!("{}.whois-servers.net", tld)]
}
