use async_trait::async_trait;
use log::debug;
use serde_json::Value;

use super::Gateway;
use crate::error::MetadataError;

/// Public IPFS gateways, in the order they are tried
pub const DEFAULT_GATEWAYS: [&str; 3] = [
    "https://gateway.pinata.cloud/ipfs",
    "https://ipfs.io/ipfs",
    "https://dweb.link/ipfs",
];

/// Path-style HTTP gateway, fetches `{base}/{cid}`
pub struct HttpGateway {
    base: String,
    reqwest: reqwest::Client,
}

impl HttpGateway {
    pub fn new(base: impl Into<String>, reqwest: reqwest::Client) -> Self {
        let base: String = base.into();
        HttpGateway {
            base: base.trim_end_matches('/').to_string(),
            reqwest,
        }
    }

    fn error(&self, message: impl ToString) -> MetadataError {
        MetadataError::Gateway {
            gateway: self.base.clone(),
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    fn name(&self) -> &str {
        &self.base
    }

    async fn fetch(&self, cid: &str) -> Result<Value, MetadataError> {
        let url = format!("{}/{}", self.base, cid);
        debug!("GET {url}");

        let res = self
            .reqwest
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| self.error(e))?;

        let status = res.status();
        if !status.is_success() {
            return Err(self.error(format!("status {status}")));
        }

        res.json::<Value>().await.map_err(|e| self.error(e))
    }
}
