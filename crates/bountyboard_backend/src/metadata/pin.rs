use async_trait::async_trait;
use log::{debug, info};
use serde_json::{json, Value};

use crate::error::MetadataError;

pub const PINATA_ENDPOINT: &str = "https://api.pinata.cloud/pinning/pinJSONToIPFS";

/// Pins a JSON document and hands back its content identifier
#[async_trait]
pub trait Pinner: Send + Sync {
    async fn pin_json(&self, document: &Value) -> Result<String, MetadataError>;
}

pub struct PinataPinner {
    endpoint: String,
    /// Bearer token for the pinning API, pinning is refused without one
    jwt: Option<String>,
    reqwest: reqwest::Client,
}

impl PinataPinner {
    pub fn new(endpoint: impl Into<String>, jwt: Option<String>, reqwest: reqwest::Client) -> Self {
        PinataPinner {
            endpoint: endpoint.into(),
            jwt,
            reqwest,
        }
    }
}

#[async_trait]
impl Pinner for PinataPinner {
    async fn pin_json(&self, document: &Value) -> Result<String, MetadataError> {
        let jwt = self
            .jwt
            .as_deref()
            .ok_or(MetadataError::NotConfigured("PINATA_JWT"))?;

        let name = document["title"].as_str().unwrap_or("bounty metadata");
        let body = json!({
            "pinataContent": document,
            "pinataMetadata": { "name": name },
        });

        let res = self
            .reqwest
            .post(&self.endpoint)
            .bearer_auth(jwt)
            .json(&body)
            .send()
            .await
            .map_err(|e| MetadataError::Upstream(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(MetadataError::Upstream(format!("{status} {text}")));
        }

        let body = res
            .json::<Value>()
            .await
            .map_err(|e| MetadataError::Upstream(e.to_string()))?;
        debug!("pin response {body}");

        let cid = body["IpfsHash"]
            .as_str()
            .ok_or_else(|| MetadataError::Upstream("response has no IpfsHash".into()))?;

        info!("pinned metadata {cid}");
        Ok(cid.to_string())
    }
}
