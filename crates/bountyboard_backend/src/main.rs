use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{header, HeaderValue, Method};
use axum_server::tls_rustls::RustlsConfig;
use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info, warn};
use serde_json::Value;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    actions::BountyActions,
    cache::TtlCache,
    chain::{fixture::FixtureFile, live::LiveChain, ChainClient},
    config::{Config, DataSource},
    gate::ActionGate,
    metadata::{
        gateway::HttpGateway,
        pin::{PinataPinner, Pinner},
        Gateway, MetadataResolver,
    },
    projector::{Projector, DEFAULT_PAGE_LIMIT},
};

mod actions;
mod api;
mod cache;
mod chain;
mod commands;
mod config;
mod error;
mod gate;
mod liveness;
mod metadata;
mod models;
mod projector;
mod utils;

/// Lifetime of a document in the proxy's own read-through cache
const PROXY_CACHE_TTL: Duration = Duration::from_secs(5 * 60);
const PROXY_CACHE_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct AppState {
    chain: Arc<dyn ChainClient>,
    projector: Arc<Projector>,
    resolver: Arc<MetadataResolver>,
    pinner: Arc<dyn Pinner>,
    gate: Arc<ActionGate>,
    actions: Arc<BountyActions>,
    /// Backs GET /metadata/:cid, independent of the resolver's cache
    proxy_cache: Arc<TtlCache<Value>>,
}

impl AppState {
    /// Pick the data source once and wire everything on top of it
    pub async fn init(config: &Config) -> anyhow::Result<AppState> {
        let reqwest = reqwest::Client::new();

        let (chain, gateways, pinner): (Arc<dyn ChainClient>, Vec<Arc<dyn Gateway>>, Arc<dyn Pinner>) =
            match config.data_source {
                DataSource::Live => {
                    let live = config.live.as_ref().context("live data source is not configured")?;
                    let chain = LiveChain::connect(
                        &live.rpc_url,
                        live.chain_id,
                        live.factory,
                        config.private_key.as_deref(),
                    )
                    .await?;

                    let gateways = config
                        .gateways
                        .iter()
                        .map(|base| Arc::new(HttpGateway::new(base.as_str(), reqwest.clone())) as Arc<dyn Gateway>)
                        .collect();
                    let pinner = PinataPinner::new(
                        config.pinata_endpoint.as_str(),
                        config.pinata_jwt.clone(),
                        reqwest.clone(),
                    );
                    (Arc::new(chain), gateways, Arc::new(pinner))
                },
                DataSource::Fixture => {
                    let file = match &config.fixture_path {
                        Some(path) => FixtureFile::load(path)?,
                        None => FixtureFile::embedded()?,
                    };
                    let (chain, documents) = file.into_sources()?;
                    info!("Using fixture data, writes are signed as {:?}", chain.signer());

                    let gateway: Arc<dyn Gateway> = Arc::new(documents.clone());
                    (Arc::new(chain), vec![gateway], Arc::new(documents))
                },
            };

        info!("Reading bounties from chain {}", chain.chain_id());

        let resolver = MetadataResolver::new(gateways, config.gateway_timeout, config.metadata_cache_ttl);
        info!("Resolving metadata via {:?}", resolver.gateway_names());

        Ok(AppState::new(chain, Arc::new(resolver), pinner))
    }

    pub fn new(chain: Arc<dyn ChainClient>, resolver: Arc<MetadataResolver>, pinner: Arc<dyn Pinner>) -> AppState {
        let projector = Arc::new(Projector::new(chain.clone(), resolver.clone()));
        let gate = Arc::new(ActionGate::new());
        let actions = Arc::new(BountyActions::new(chain.clone(), projector.clone(), gate.clone()));

        AppState {
            chain,
            projector,
            resolver,
            pinner,
            gate,
            actions,
            proxy_cache: Arc::new(TtlCache::new(PROXY_CACHE_TTL, PROXY_CACHE_CAPACITY)),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "bountyboard")]
#[command(bin_name = "bountyboard")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Ballot {
    Yes,
    No,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP API and metadata proxy
    Serve {
        /// Flag to disable HTTPS
        #[arg(long)]
        no_https: bool,
        #[arg(long, default_value_t = 3001)]
        port: u16,
    },
    /// List bounties in factory order
    List {
        #[arg(long, default_value_t = 0)]
        offset: u64,
        #[arg(long, default_value_t = DEFAULT_PAGE_LIMIT)]
        limit: u64,
    },
    /// Print the full snapshot of a bounty
    Show { bounty: String },
    /// Follow a bounty until interrupted
    Watch {
        bounty: String,
        /// Seconds between refreshes
        #[arg(long, default_value_t = 10)]
        interval: u64,
    },
    /// Bounties an address joined or claimed, the signer by default
    Mine { address: Option<String> },
    /// Pin a metadata document
    Pin {
        title: String,
        description: String,
        #[arg(long)]
        image: Option<String>,
        #[arg(long)]
        external_url: Option<String>,
    },
    /// Create a bounty, amount in ether
    Create {
        metadata_uri: String,
        amount: String,
        /// Let other funders add stake
        #[arg(long)]
        joinable: bool,
    },
    /// Add stake to a joinable bounty, amount in ether
    Stake { bounty: String, amount: String },
    /// Submit a claim with a proof URI
    Claim {
        bounty: String,
        name: String,
        proof_uri: String,
    },
    /// Put a claim to a vote
    InitiateVote { bounty: String, claim_id: u64 },
    /// Vote on the active round
    Vote {
        bounty: String,
        #[arg(value_enum)]
        ballot: Ballot,
    },
    /// Resolve the active vote
    Resolve { bounty: String },
    /// Cancel a bounty (issuer only)
    Cancel { bounty: String },
    /// Withdraw your stake
    Withdraw { bounty: String },
    /// Pay out a claim directly on a solo bounty (issuer only)
    Accept { bounty: String, claim_id: u64 },
}

#[tokio::main]
async fn main() {
    env_logger::builder().format_timestamp(None).init();

    let cli = Cli::parse();

    if dotenvy::dotenv().is_err() {
        warn!("Error reading .env file");
    }

    if let Err(e) = run(cli).await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let app_state = AppState::init(&config).await?;

    match cli.command {
        Command::Serve { no_https, port } => serve(app_state, &config, no_https, port).await,
        command => commands::run(&app_state, command).await,
    }
}

async fn serve(app_state: AppState, config: &Config, no_https: bool, port: u16) -> anyhow::Result<()> {
    let origins = config
        .cors_origins
        .iter()
        .map(|origin| origin.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()
        .context("CORS_ORIGINS contains an invalid origin")?;

    let cors = CorsLayer::new()
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(origins);

    let app = api::router()
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    if no_https {
        info!("Starting server on {addr} with HTTPS disabled...");

        axum_server::bind(addr)
            .serve(app.into_make_service())
            .await?;
    } else {
        info!("Starting server on {addr} with HTTPS...");

        let rustls_config = RustlsConfig::from_pem_file(&config.tls_cert, &config.tls_key)
            .await
            .with_context(|| format!("loading TLS certificate {}", config.tls_cert.display()))?;

        axum_server::bind_rustls(addr, rustls_config)
            .serve(app.into_make_service())
            .await?;
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{chain::fixture::FixtureChain, metadata::pin::PINATA_ENDPOINT};

    /// Fixture chain with the fixture documents as both gateway and pinner
    pub(crate) fn fixture_state() -> AppState {
        let (chain, documents) = FixtureChain::embedded().unwrap();
        let gateway: Arc<dyn Gateway> = Arc::new(documents.clone());
        let resolver = MetadataResolver::new(vec![gateway], Duration::from_secs(1), Duration::from_secs(60));
        AppState::new(Arc::new(chain), Arc::new(resolver), Arc::new(documents))
    }

    /// Fixture chain behind a pinning client that has no credentials
    pub(crate) fn offline_state() -> AppState {
        let (chain, documents) = FixtureChain::embedded().unwrap();
        let gateway: Arc<dyn Gateway> = Arc::new(documents);
        let resolver = MetadataResolver::new(vec![gateway], Duration::from_secs(1), Duration::from_secs(60));
        let pinner = PinataPinner::new(PINATA_ENDPOINT, None, reqwest::Client::new());
        AppState::new(Arc::new(chain), Arc::new(resolver), Arc::new(pinner))
    }

    #[tokio::test]
    async fn test_init_fixture() {
        let config = Config::from_lookup(|_| None).unwrap();
        let state = AppState::init(&config).await.unwrap();
        assert_eq!(state.chain.chain_id(), crate::chain::fixture::FIXTURE_CHAIN_ID);
        assert_eq!(state.resolver.gateway_names(), vec!["fixture"]);
    }

    #[test]
    fn test_cli() {
        let cli = Cli::try_parse_from(["bountyboard", "serve", "--no-https", "--port", "8080"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Serve {
                no_https: true,
                port: 8080
            }
        ));

        let cli = Cli::try_parse_from([
            "bountyboard",
            "vote",
            "0x000000000000000000000000000000000000b003",
            "no",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Vote { ballot: Ballot::No, .. }));

        assert!(Cli::try_parse_from(["bountyboard", "vote", "0xb003", "maybe"]).is_err());
    }
}
