//! Content-addressed metadata resolution
//!
//! References come in as raw CIDs or `ipfs://` style URIs and are normalized to one
//! canonical identifier before lookup. Gateways are tried in a fixed priority order with
//! a timeout per attempt; only when every gateway fails does resolution fail.

pub mod fixture;
pub mod gateway;
pub mod pin;

use std::{sync::Arc, sync::OnceLock, time::Duration};

use async_trait::async_trait;
use log::{debug, warn};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{cache::TtlCache, error::MetadataError};

/// Number of resolved documents kept in memory
const CACHE_CAPACITY: usize = 512;

/// A single upstream that can serve content by identifier
#[async_trait]
pub trait Gateway: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, cid: &str) -> Result<Value, MetadataError>;
}

fn gateway_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^https?://[^/]+/ipfs/(?P<cid>.+)$").expect("valid regex"))
}

fn cid_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9]{2,}(/[A-Za-z0-9._\-]+)*$").expect("valid regex")
    })
}

/// Reduce any supported reference form to the bare identifier (plus optional sub-path)
pub fn normalize_cid(reference: &str) -> Result<String, MetadataError> {
    let trimmed = reference.trim();

    let rest = if let Some(caps) = gateway_url_re().captures(trimmed) {
        caps.name("cid").map(|m| m.as_str()).unwrap_or_default()
    } else if let Some(rest) = trimmed.strip_prefix("ipfs://") {
        rest.strip_prefix("ipfs/").unwrap_or(rest)
    } else if let Some(rest) = trimmed.strip_prefix("/ipfs/") {
        rest
    } else {
        trimmed
    };

    let rest = rest.split(['?', '#']).next().unwrap_or_default();
    let rest = rest.trim_end_matches('/');

    if cid_re().is_match(rest) {
        Ok(rest.to_string())
    } else {
        Err(MetadataError::InvalidReference(reference.to_string()))
    }
}

pub struct MetadataResolver {
    /// In priority order
    gateways: Vec<Arc<dyn Gateway>>,
    attempt_timeout: Duration,
    cache: TtlCache<Value>,
}

impl MetadataResolver {
    pub fn new(gateways: Vec<Arc<dyn Gateway>>, attempt_timeout: Duration, cache_ttl: Duration) -> Self {
        MetadataResolver {
            gateways,
            attempt_timeout,
            cache: TtlCache::new(cache_ttl, CACHE_CAPACITY),
        }
    }

    pub fn gateway_names(&self) -> Vec<&str> {
        self.gateways.iter().map(|g| g.name()).collect()
    }

    /// Resolve a reference through the cache, falling back to the gateways
    pub async fn resolve(&self, reference: &str) -> Result<Value, MetadataError> {
        let cid = normalize_cid(reference)?;

        if let Some(doc) = self.cache.get(&cid).await {
            debug!("metadata cache hit {cid}");
            return Ok(doc);
        }

        let doc = self.fetch(&cid).await?;
        self.cache.insert(cid, doc.clone()).await;
        Ok(doc)
    }

    /// Go straight to the gateways for an already normalized identifier
    pub async fn fetch(&self, cid: &str) -> Result<Value, MetadataError> {
        for gateway in self.gateways.iter() {
            let res = tokio::time::timeout(self.attempt_timeout, gateway.fetch(cid)).await;

            let err = match res {
                Ok(Ok(doc)) => {
                    debug!("resolved {cid} via {}", gateway.name());
                    return Ok(doc);
                },
                Ok(Err(e)) => e,
                Err(_) => MetadataError::Timeout {
                    gateway: gateway.name().to_string(),
                },
            };
            debug!("gateway attempt failed for {cid}: {err}");
        }

        Err(MetadataError::Exhausted {
            cid: cid.to_string(),
            attempts: self.gateways.len(),
        })
    }

    /// [`Self::resolve`] degrading any failure to `None`
    pub async fn resolve_or_warn(&self, reference: &str) -> Option<Value> {
        match self.resolve(reference).await {
            Ok(doc) => Some(doc),
            Err(e) => {
                warn!("metadata unavailable for `{reference}`: {e}");
                None
            },
        }
    }

    /// Read a resolved document as `T`, None if it does not have that shape
    pub fn decode<T: DeserializeOwned>(reference: &str, doc: Value) -> Option<T> {
        match serde_json::from_value(doc) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!("{}", MetadataError::Malformed(format!("{reference}: {e}")));
                None
            },
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use log::LevelFilter;
    use serde_json::json;

    use super::{fixture::FixtureDocuments, *};
    use crate::models::BountyMetadata;

    pub(crate) fn init() {
        let _ = env_logger::builder()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .try_init();
    }

    /// Gateway that always fails, recording that it was asked
    pub(crate) struct DownGateway {
        pub name: String,
        pub calls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Gateway for DownGateway {
        fn name(&self) -> &str {
            &self.name
        }

        async fn fetch(&self, cid: &str) -> Result<Value, MetadataError> {
            self.calls.lock().unwrap().push(self.name.clone());
            Err(MetadataError::Gateway {
                gateway: self.name.clone(),
                message: format!("502 for {cid}"),
            })
        }
    }

    /// Gateway that never answers within the attempt timeout
    pub(crate) struct SlowGateway;

    #[async_trait]
    impl Gateway for SlowGateway {
        fn name(&self) -> &str {
            "slow"
        }

        async fn fetch(&self, _cid: &str) -> Result<Value, MetadataError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(json!({}))
        }
    }

    /// Wraps another gateway and counts fetches
    struct CountingGateway {
        inner: FixtureDocuments,
        hits: Arc<Mutex<usize>>,
    }

    #[async_trait]
    impl Gateway for CountingGateway {
        fn name(&self) -> &str {
            "counting"
        }

        async fn fetch(&self, cid: &str) -> Result<Value, MetadataError> {
            *self.hits.lock().unwrap() += 1;
            self.inner.fetch(cid).await
        }
    }

    pub(crate) fn gw(gateway: impl Gateway + 'static) -> Arc<dyn Gateway> {
        Arc::new(gateway)
    }

    fn docs() -> FixtureDocuments {
        FixtureDocuments::new(
            [(
                "bafybeigdyrztest".to_string(),
                json!({"title": "Fix the bridge", "description": "It is broken"}),
            )]
            .into_iter()
            .collect(),
        )
    }

    #[test]
    fn test_normalize_cid() {
        let expected = "bafybeigdyrztest";
        for reference in [
            "bafybeigdyrztest",
            "  bafybeigdyrztest  ",
            "ipfs://bafybeigdyrztest",
            "ipfs://ipfs/bafybeigdyrztest",
            "/ipfs/bafybeigdyrztest",
            "https://gateway.pinata.cloud/ipfs/bafybeigdyrztest",
            "http://localhost:8080/ipfs/bafybeigdyrztest/",
            "https://ipfs.io/ipfs/bafybeigdyrztest?filename=meta.json",
        ] {
            assert_eq!(normalize_cid(reference).unwrap(), expected, "{reference}");
        }

        assert_eq!(
            normalize_cid("ipfs://QmHash/metadata.json").unwrap(),
            "QmHash/metadata.json"
        );

        for bad in ["", "ipfs://", "https://example.com/not-ipfs", "has space", "ipfs://../etc"] {
            assert!(
                matches!(normalize_cid(bad), Err(MetadataError::InvalidReference(_))),
                "{bad}"
            );
        }
    }

    #[tokio::test]
    async fn test_falls_through_in_priority_order() {
        init();

        let calls = Arc::new(Mutex::new(vec![]));
        let resolver = MetadataResolver::new(
            vec![
                gw(DownGateway {
                    name: "primary".into(),
                    calls: calls.clone(),
                }),
                gw(SlowGateway),
                gw(DownGateway {
                    name: "tertiary".into(),
                    calls: calls.clone(),
                }),
                gw(docs()),
            ],
            Duration::from_millis(50),
            Duration::from_secs(60),
        );

        let doc = resolver.resolve("ipfs://bafybeigdyrztest").await.unwrap();
        assert_eq!(doc["title"], "Fix the bridge");
        assert_eq!(*calls.lock().unwrap(), vec!["primary", "tertiary"]);
    }

    #[tokio::test]
    async fn test_exhausted() {
        init();

        let calls = Arc::new(Mutex::new(vec![]));
        let resolver = MetadataResolver::new(
            vec![
                gw(DownGateway {
                    name: "a".into(),
                    calls: calls.clone(),
                }),
                gw(SlowGateway),
                gw(DownGateway {
                    name: "c".into(),
                    calls: calls.clone(),
                }),
            ],
            Duration::from_millis(50),
            Duration::from_secs(60),
        );

        let err = resolver.resolve("bafybeigdyrztest").await.unwrap_err();
        assert_eq!(
            err,
            MetadataError::Exhausted {
                cid: "bafybeigdyrztest".into(),
                attempts: 3
            }
        );

        // partial data policy: no error, just no metadata
        assert!(resolver.resolve_or_warn("bafybeigdyrztest").await.is_none());
    }

    #[tokio::test]
    async fn test_cached_and_identical() {
        init();

        let hits = Arc::new(Mutex::new(0));
        let resolver = MetadataResolver::new(
            vec![gw(CountingGateway {
                inner: docs(),
                hits: hits.clone(),
            })],
            Duration::from_secs(1),
            Duration::from_secs(60),
        );

        let first = resolver.resolve("ipfs://bafybeigdyrztest").await.unwrap();
        let second = resolver
            .resolve("https://dweb.link/ipfs/bafybeigdyrztest")
            .await
            .unwrap();

        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
        assert_eq!(*hits.lock().unwrap(), 1);

        // fetch bypasses the cache
        resolver.fetch("bafybeigdyrztest").await.unwrap();
        assert_eq!(*hits.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_decode_malformed() {
        let docs = FixtureDocuments::new(
            [("bafynotitle".to_string(), json!({"name": "no title here"}))]
                .into_iter()
                .collect(),
        );
        let resolver =
            MetadataResolver::new(vec![gw(docs)], Duration::from_secs(1), Duration::from_secs(60));

        let doc = resolver.resolve_or_warn("bafynotitle").await.unwrap();
        let meta: Option<BountyMetadata> = MetadataResolver::decode("bafynotitle", doc);
        assert!(meta.is_none());
    }
}
