use std::{env, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{anyhow, Context};

use crate::{
    metadata::{gateway::DEFAULT_GATEWAYS, pin::PINATA_ENDPOINT},
    models::Address,
    utils::parse_address,
};

const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 5;
const DEFAULT_METADATA_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";

/// Where chain state comes from, chosen once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Live,
    Fixture,
}

impl FromStr for DataSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" => Ok(DataSource::Live),
            "fixture" | "demo" => Ok(DataSource::Fixture),
            other => Err(anyhow!("unknown DATA_SOURCE `{other}`, expected `live` or `fixture`")),
        }
    }
}

/// Connection details for a deployed factory
#[derive(Debug, Clone)]
pub struct LiveSettings {
    pub rpc_url: String,
    pub chain_id: u64,
    pub factory: Address,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_source: DataSource,
    /// Only present for the live source
    pub live: Option<LiveSettings>,
    pub private_key: Option<String>,
    pub pinata_jwt: Option<String>,
    pub pinata_endpoint: String,
    /// Gateway base URLs in priority order
    pub gateways: Vec<String>,
    pub gateway_timeout: Duration,
    pub metadata_cache_ttl: Duration,
    pub fixture_path: Option<PathBuf>,
    pub cors_origins: Vec<String>,
    pub tls_cert: PathBuf,
    pub tls_key: PathBuf,
}

fn list(raw: Option<String>) -> Option<Vec<String>> {
    let items: Vec<String> = raw?
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    (!items.is_empty()).then_some(items)
}

fn secs(raw: Option<String>, key: &str, default: u64) -> anyhow::Result<Duration> {
    match raw {
        Some(v) => {
            let secs: u64 = v.trim().parse().with_context(|| format!("{key} must be a number of seconds"))?;
            Ok(Duration::from_secs(secs))
        },
        None => Ok(Duration::from_secs(default)),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Config> {
        Self::from_lookup(|key| env::var(key).ok().filter(|v| !v.trim().is_empty()))
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Config> {
        let data_source = match var("DATA_SOURCE") {
            Some(raw) => raw.parse()?,
            None => DataSource::Fixture,
        };

        let live = match data_source {
            DataSource::Live => {
                let rpc_url = var("RPC_URL").context("RPC_URL is required for the live data source")?;
                let chain_id = var("CHAIN_ID")
                    .context("CHAIN_ID is required for the live data source")?
                    .trim()
                    .parse()
                    .context("CHAIN_ID must be an integer")?;
                let factory = var("FACTORY_ADDRESS")
                    .context("FACTORY_ADDRESS is required for the live data source")?;
                let factory = parse_address(&factory)?;
                Some(LiveSettings {
                    rpc_url,
                    chain_id,
                    factory,
                })
            },
            DataSource::Fixture => None,
        };

        Ok(Config {
            data_source,
            live,
            private_key: var("PRIVATE_KEY"),
            pinata_jwt: var("PINATA_JWT"),
            pinata_endpoint: var("PINATA_ENDPOINT").unwrap_or_else(|| PINATA_ENDPOINT.to_string()),
            gateways: list(var("IPFS_GATEWAYS"))
                .unwrap_or_else(|| DEFAULT_GATEWAYS.iter().map(|g| g.to_string()).collect()),
            gateway_timeout: secs(var("GATEWAY_TIMEOUT_SECS"), "GATEWAY_TIMEOUT_SECS", DEFAULT_GATEWAY_TIMEOUT_SECS)?,
            metadata_cache_ttl: secs(
                var("METADATA_CACHE_TTL_SECS"),
                "METADATA_CACHE_TTL_SECS",
                DEFAULT_METADATA_CACHE_TTL_SECS,
            )?,
            fixture_path: var("FIXTURE_PATH").map(PathBuf::from),
            cors_origins: list(var("CORS_ORIGINS")).unwrap_or_else(|| vec![DEFAULT_CORS_ORIGIN.to_string()]),
            tls_cert: var("TLS_CERT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("certs").join("cert.pem")),
            tls_key: var("TLS_KEY")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("certs").join("key.pem")),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.data_source, DataSource::Fixture);
        assert!(config.live.is_none());
        assert_eq!(config.gateways.len(), 3);
        assert!(config.gateways[0].contains("pinata"));
        assert_eq!(config.gateway_timeout, Duration::from_secs(5));
        assert_eq!(config.metadata_cache_ttl, Duration::from_secs(300));
        assert_eq!(config.pinata_endpoint, PINATA_ENDPOINT);
        assert!(config.pinata_jwt.is_none());
    }

    #[test]
    fn test_live_requires_connection() {
        let err = Config::from_lookup(lookup(&[("DATA_SOURCE", "live")])).unwrap_err();
        assert!(err.to_string().contains("RPC_URL"));

        let config = Config::from_lookup(lookup(&[
            ("DATA_SOURCE", "live"),
            ("RPC_URL", "http://localhost:8545"),
            ("CHAIN_ID", "11155111"),
            ("FACTORY_ADDRESS", "0x000000000000000000000000000000000000f00d"),
        ]))
        .unwrap();
        let live = config.live.unwrap();
        assert_eq!(live.chain_id, 11155111);
        assert_eq!(live.factory, Address::from_low_u64_be(0xf00d));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("IPFS_GATEWAYS", "https://a.example/ipfs, ,https://b.example/ipfs"),
            ("GATEWAY_TIMEOUT_SECS", "2"),
            ("CORS_ORIGINS", "https://bounties.example"),
        ]))
        .unwrap();
        assert_eq!(config.gateways, vec!["https://a.example/ipfs", "https://b.example/ipfs"]);
        assert_eq!(config.gateway_timeout, Duration::from_secs(2));
        assert_eq!(config.cors_origins, vec!["https://bounties.example"]);

        assert!(Config::from_lookup(lookup(&[("GATEWAY_TIMEOUT_SECS", "soon")])).is_err());
        assert!(Config::from_lookup(lookup(&[("DATA_SOURCE", "mainnet")])).is_err());
    }
}
