//! Bounty State Projector
//!
//! Builds typed snapshots out of independent contract reads plus metadata documents.
//! Reads for one snapshot are dispatched together and joined; listings fan out per bounty
//! and tolerate individual failures. Metadata is resolved once per unique URI and a
//! failed resolution only leaves the metadata empty.

use std::{
    collections::{BTreeSet, HashMap},
    iter,
    sync::Arc,
};

use futures::future::{join_all, try_join_all};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    chain::ChainClient,
    error::ChainError,
    metadata::MetadataResolver,
    models::{
        Actor, Address, BountyListing, BountyMetadata, BountySnapshot, BountyState, BountySummary, Claim,
        Funder, ProofMetadata, UserRelationship,
    },
};

pub const DEFAULT_PAGE_LIMIT: u64 = 20;
pub const MAX_PAGE_LIMIT: u64 = 100;

fn default_limit() -> u64 {
    DEFAULT_PAGE_LIMIT
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub offset: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

impl Default for Page {
    fn default() -> Self {
        Page {
            offset: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl Page {
    pub fn clamped(self) -> Page {
        Page {
            offset: self.offset,
            limit: self.limit.clamp(1, MAX_PAGE_LIMIT),
        }
    }
}

/// Bounties an address has a hand in
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct UserBounties {
    /// Bounties the address currently has stake in
    pub joined: BTreeSet<Address>,
    /// Bounties the address has submitted at least one claim to
    pub claimed: BTreeSet<Address>,
}

pub struct Projector {
    chain: Arc<dyn ChainClient>,
    metadata: Arc<MetadataResolver>,
}

impl Projector {
    pub fn new(chain: Arc<dyn ChainClient>, metadata: Arc<MetadataResolver>) -> Self {
        Projector { chain, metadata }
    }

    /// Full snapshot including resolved metadata and proofs
    pub async fn bounty(&self, address: Address) -> Result<BountySnapshot, ChainError> {
        let mut snapshot = self.bounty_onchain(address).await?;

        // bounty and proof documents share one lookup per distinct URI
        let documents = self
            .resolve_unique(
                iter::once(snapshot.metadata_uri.as_str())
                    .chain(snapshot.claims.iter().map(|c| c.proof_uri.as_str())),
            )
            .await;
        let document = |uri: &str| documents.get(uri).cloned().flatten();

        snapshot.metadata = document(&snapshot.metadata_uri)
            .and_then(|doc| MetadataResolver::decode::<BountyMetadata>(&snapshot.metadata_uri, doc));
        for claim in snapshot.claims.iter_mut() {
            claim.proof = document(&claim.proof_uri)
                .and_then(|doc| MetadataResolver::decode::<ProofMetadata>(&claim.proof_uri, doc));
        }

        Ok(snapshot)
    }

    /// Snapshot from contract reads only, metadata left empty
    pub async fn bounty_onchain(&self, address: Address) -> Result<BountySnapshot, ChainError> {
        let chain = self.chain.as_ref();

        let (issuer, metadata_uri, state, joinable, total_staked, claims_count, vote, funder_addresses) = tokio::try_join!(
            chain.issuer(address),
            chain.metadata_uri(address),
            chain.state(address),
            chain.joinable(address),
            chain.total_staked(address),
            chain.claims_count(address),
            chain.current_vote(address),
            chain.funders(address),
        )?;

        let (raw_claims, stakes) = tokio::try_join!(
            try_join_all((0..claims_count).map(|id| chain.claim(address, id))),
            try_join_all(funder_addresses.iter().map(|f| chain.stake_of(address, *f))),
        )?;

        let claims = raw_claims
            .into_iter()
            .enumerate()
            .map(|(id, raw)| Claim {
                id: id as u64,
                claimant: raw.claimant,
                name: raw.name,
                proof_uri: raw.proof_uri,
                proof: None,
            })
            .collect();

        // withdrawn funders stay listed by the contract with a zero stake
        let funders = funder_addresses
            .into_iter()
            .zip(stakes)
            .filter(|(_, stake)| !stake.is_zero())
            .map(|(address, stake)| Funder { address, stake })
            .collect();

        let snapshot = BountySnapshot {
            address,
            issuer,
            metadata_uri,
            metadata: None,
            state,
            joinable,
            total_staked,
            claims_count,
            claims,
            funders,
            vote: (state == BountyState::Voting).then_some(vote),
        };

        if !snapshot.is_consistent() {
            warn!(
                "bounty {address:?} reads are inconsistent: staked {} vs funded {}",
                snapshot.total_staked,
                snapshot.funded_total()
            );
        }

        Ok(snapshot)
    }

    /// One page of bounties. A bounty whose reads fail is listed without a summary.
    pub async fn list(&self, page: Page) -> Result<Vec<BountyListing>, ChainError> {
        let page = page.clamped();
        let addresses = self.chain.bounty_addresses(page.offset, page.limit).await?;
        debug!("listing {} bounties from offset {}", addresses.len(), page.offset);

        let results = join_all(addresses.iter().map(|address| self.summary(*address))).await;

        let mut summaries: Vec<Option<BountySummary>> = addresses
            .iter()
            .zip(results)
            .map(|(address, res)| match res {
                Ok(summary) => Some(summary),
                Err(e) => {
                    warn!("skipping bounty {address:?}: {e}");
                    None
                },
            })
            .collect();

        let documents = self
            .resolve_unique(
                summaries
                    .iter()
                    .flatten()
                    .map(|s| s.metadata_uri.as_str()),
            )
            .await;

        for summary in summaries.iter_mut().flatten() {
            summary.metadata = documents
                .get(&summary.metadata_uri)
                .cloned()
                .flatten()
                .and_then(|doc| MetadataResolver::decode::<BountyMetadata>(&summary.metadata_uri, doc));
        }

        Ok(addresses
            .into_iter()
            .zip(summaries)
            .map(|(address, summary)| BountyListing { address, summary })
            .collect())
    }

    async fn summary(&self, address: Address) -> Result<BountySummary, ChainError> {
        let chain = self.chain.as_ref();
        let (issuer, metadata_uri, state, joinable, total_staked, claims_count) = tokio::try_join!(
            chain.issuer(address),
            chain.metadata_uri(address),
            chain.state(address),
            chain.joinable(address),
            chain.total_staked(address),
            chain.claims_count(address),
        )?;

        Ok(BountySummary {
            issuer,
            metadata_uri,
            metadata: None,
            state,
            joinable,
            total_staked,
            claims_count,
        })
    }

    /// Relationship and per-round vote flag for `user`
    pub async fn actor(&self, snapshot: &BountySnapshot, user: Address) -> Result<Actor, ChainError> {
        let has_voted = match snapshot.vote {
            Some(vote) => self.chain.has_voted(snapshot.address, user, vote.round).await?,
            None => false,
        };

        Ok(Actor {
            address: user,
            relationship: UserRelationship::derive(snapshot, user),
            stake: snapshot.stake_of(user),
            has_voted,
        })
    }

    /// Scan every bounty for ones `user` has joined or claimed
    pub async fn user_bounties(&self, user: Address) -> Result<UserBounties, ChainError> {
        let count = self.chain.bounty_count().await?;

        let pages = (0..count)
            .step_by(MAX_PAGE_LIMIT as usize)
            .map(|offset| self.chain.bounty_addresses(offset, MAX_PAGE_LIMIT));
        let addresses: Vec<Address> = try_join_all(pages).await?.into_iter().flatten().collect();

        let results = join_all(addresses.iter().map(|bounty| self.involvement(*bounty, user))).await;

        let mut found = UserBounties::default();
        for (bounty, res) in addresses.into_iter().zip(results) {
            match res {
                Ok((joined, claimed)) => {
                    if joined {
                        found.joined.insert(bounty);
                    }
                    if claimed {
                        found.claimed.insert(bounty);
                    }
                },
                Err(e) => warn!("skipping bounty {bounty:?} for {user:?}: {e}"),
            }
        }

        Ok(found)
    }

    async fn involvement(&self, bounty: Address, user: Address) -> Result<(bool, bool), ChainError> {
        let chain = self.chain.as_ref();
        let (stake, claims_count) = tokio::try_join!(chain.stake_of(bounty, user), chain.claims_count(bounty))?;
        let claims = try_join_all((0..claims_count).map(|id| chain.claim(bounty, id))).await?;

        Ok((!stake.is_zero(), claims.iter().any(|c| c.claimant == user)))
    }

    /// Resolve each distinct URI once, concurrently
    async fn resolve_unique<'a, I>(&self, uris: I) -> HashMap<String, Option<Value>>
    where
        I: Iterator<Item = &'a str>,
    {
        let unique: BTreeSet<&str> = uris.collect();
        let resolved = join_all(unique.iter().map(|uri| self.metadata.resolve_or_warn(uri))).await;

        unique
            .into_iter()
            .map(str::to_string)
            .zip(resolved)
            .collect()
    }
}
