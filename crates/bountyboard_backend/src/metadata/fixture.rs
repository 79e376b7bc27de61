use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use ethers::utils::keccak256;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{pin::Pinner, Gateway};
use crate::error::MetadataError;

/// In-memory document store standing in for both the gateways and the pinning service
#[derive(Clone, Default)]
pub struct FixtureDocuments {
    documents: Arc<RwLock<HashMap<String, Value>>>,
}

impl FixtureDocuments {
    pub fn new(documents: HashMap<String, Value>) -> Self {
        FixtureDocuments {
            documents: Arc::new(RwLock::new(documents)),
        }
    }

    /// Deterministic identifier derived from the document bytes
    pub fn content_id(document: &Value) -> String {
        let bytes = serde_json::to_vec(document).unwrap_or_default();
        format!("fx{}", hex::encode(keccak256(bytes)))
    }
}

#[async_trait]
impl Gateway for FixtureDocuments {
    fn name(&self) -> &str {
        "fixture"
    }

    async fn fetch(&self, cid: &str) -> Result<Value, MetadataError> {
        self.documents
            .read()
            .await
            .get(cid)
            .cloned()
            .ok_or_else(|| MetadataError::Gateway {
                gateway: "fixture".into(),
                message: format!("{cid} not found"),
            })
    }
}

#[async_trait]
impl Pinner for FixtureDocuments {
    async fn pin_json(&self, document: &Value) -> Result<String, MetadataError> {
        let cid = Self::content_id(document);
        self.documents
            .write()
            .await
            .insert(cid.clone(), document.clone());
        Ok(cid)
    }
}
