//! In-memory emulation of the bounty contracts, seeded from a JSON fixture set.
//!
//! Writes follow the same rules the deployed contracts enforce and revert with a reason
//! string when they don't hold, so everything above the Chain Client behaves the same
//! against fixtures as against a live network. Time is the wall clock plus an offset
//! that tests can advance.

use std::{
    collections::{HashMap, HashSet},
    path::Path,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

use anyhow::Context;
use async_trait::async_trait;
use bountyboard_contract::{TxHash, U256};
use ethers::utils::keccak256;
use log::{debug, info};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;

use super::ChainClient;
use crate::{
    error::ChainError,
    metadata::fixture::FixtureDocuments,
    models::{Action, Address, BountyState, RawClaim, ResolutionOutcome, TxOutcome, VoteRound},
    utils::{now_unix, parse_amount},
};

const EMBEDDED_FIXTURE: &str = include_str!("../../fixtures/demo.json");

/// Chain id reported by the fixture source (anvil's default)
pub const FIXTURE_CHAIN_ID: u64 = 31337;

fn default_voting_period() -> u64 {
    3 * 24 * 60 * 60
}

fn default_state() -> BountyState {
    BountyState::Open
}

#[derive(Debug, Deserialize)]
pub struct FixtureFile {
    /// Address writes are signed as
    pub signer: Option<Address>,
    #[serde(default = "default_voting_period")]
    pub voting_period_secs: u64,
    pub bounties: Vec<FixtureBounty>,
    /// Metadata documents keyed by content identifier
    #[serde(default)]
    pub documents: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct FixtureBounty {
    pub address: Address,
    pub issuer: Address,
    pub metadata_uri: String,
    #[serde(default = "default_state")]
    pub state: BountyState,
    pub joinable: bool,
    /// Issuer first; amounts in ether
    #[serde(default)]
    pub funders: Vec<FixtureStake>,
    #[serde(default)]
    pub claims: Vec<FixtureClaim>,
    #[serde(default)]
    pub vote: Option<FixtureVote>,
}

#[derive(Debug, Deserialize)]
pub struct FixtureStake {
    pub address: Address,
    pub stake: String,
}

#[derive(Debug, Deserialize)]
pub struct FixtureClaim {
    pub claimant: Address,
    pub name: String,
    pub proof_uri: String,
}

#[derive(Debug, Deserialize)]
pub struct FixtureVote {
    pub claim_id: u64,
    pub yes: String,
    pub no: String,
    /// Relative to load time, may be negative for an expired round
    pub deadline_in_secs: i64,
    pub round: u64,
    #[serde(default)]
    pub voters: Vec<Address>,
}

impl FixtureFile {
    pub fn embedded() -> anyhow::Result<FixtureFile> {
        serde_json::from_str(EMBEDDED_FIXTURE).context("embedded fixture is malformed")
    }

    pub fn load(path: &Path) -> anyhow::Result<FixtureFile> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading fixture file {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing fixture file {}", path.display()))
    }

    /// Build the chain and the document store backing it
    pub fn into_sources(self) -> anyhow::Result<(FixtureChain, FixtureDocuments)> {
        let now = now_unix();
        let mut ledger = Ledger::default();

        for bounty in self.bounties {
            let mut stakes = vec![];
            for funder in bounty.funders.iter() {
                stakes.push((funder.address, parse_amount(&funder.stake)?));
            }

            let mut record = BountyRecord {
                issuer: bounty.issuer,
                metadata_uri: bounty.metadata_uri,
                state: bounty.state,
                joinable: bounty.joinable,
                stakes,
                claims: bounty
                    .claims
                    .into_iter()
                    .map(|c| RawClaim {
                        claimant: c.claimant,
                        name: c.name,
                        proof_uri: c.proof_uri,
                    })
                    .collect(),
                vote: empty_vote(),
                rounds_started: 0,
                voted: HashSet::new(),
            };

            if let Some(vote) = bounty.vote {
                let deadline = (now as i64 + vote.deadline_in_secs).max(0) as u64;
                record.vote = VoteRound {
                    claim_id: vote.claim_id,
                    yes: parse_amount(&vote.yes)?,
                    no: parse_amount(&vote.no)?,
                    deadline,
                    round: vote.round,
                };
                record.rounds_started = vote.round + 1;
                record.voted = vote.voters.into_iter().map(|v| (v, vote.round)).collect();

                if record.vote.cast_weight() > record.total_staked() {
                    anyhow::bail!("fixture bounty {:?} has more votes than stake", bounty.address);
                }
            }

            if record.state == BountyState::Voting && record.vote.claim_id >= record.claims.len() as u64 {
                anyhow::bail!("fixture bounty {:?} votes on a missing claim", bounty.address);
            }

            ledger.order.push(bounty.address);
            ledger.bounties.insert(bounty.address, record);
        }

        info!("Loaded {} fixture bounties", ledger.order.len());

        let chain = FixtureChain {
            ledger: Arc::new(RwLock::new(ledger)),
            clock_offset: Arc::new(AtomicI64::new(0)),
            signer: self.signer,
            voting_period: self.voting_period_secs,
        };
        Ok((chain, FixtureDocuments::new(self.documents)))
    }
}

/// What `currentVote()` reads as before any round has started
fn empty_vote() -> VoteRound {
    VoteRound {
        claim_id: 0,
        yes: U256::zero(),
        no: U256::zero(),
        deadline: 0,
        round: 0,
    }
}

#[derive(Debug, Clone)]
struct BountyRecord {
    issuer: Address,
    metadata_uri: String,
    state: BountyState,
    joinable: bool,
    /// In the order funders joined
    stakes: Vec<(Address, U256)>,
    claims: Vec<RawClaim>,
    vote: VoteRound,
    rounds_started: u64,
    /// (voter, round)
    voted: HashSet<(Address, u64)>,
}

impl BountyRecord {
    fn total_staked(&self) -> U256 {
        self.stakes
            .iter()
            .fold(U256::zero(), |acc, (_, stake)| acc.saturating_add(*stake))
    }

    fn stake_of(&self, who: Address) -> U256 {
        self.stakes
            .iter()
            .find(|(addr, _)| *addr == who)
            .map(|(_, stake)| *stake)
            .unwrap_or_default()
    }

    fn add_stake(&mut self, who: Address, value: U256) {
        match self.stakes.iter_mut().find(|(addr, _)| *addr == who) {
            Some((_, stake)) => *stake = stake.saturating_add(value),
            None => self.stakes.push((who, value)),
        }
    }

    fn transition(&mut self, next: BountyState) -> Result<(), String> {
        if !self.state.can_transition_to(next) {
            return Err(format!("invalid transition {} -> {}", self.state, next));
        }
        self.state = next;
        Ok(())
    }

    /// Pay the whole pool to the claimant and close
    fn pay_out(&mut self, claim_id: u64) -> Result<(), String> {
        let claimant = self
            .claims
            .get(claim_id as usize)
            .map(|c| c.claimant)
            .ok_or("unknown claim")?;
        self.transition(BountyState::Closed)?;
        let payout = self.total_staked();
        self.stakes.clear();
        debug!("paid {payout} wei to {claimant:?}");
        Ok(())
    }

    fn passes(&self) -> bool {
        self.vote.yes > self.vote.no
    }

    fn apply(&mut self, sender: Address, action: &Action, now: u64, voting_period: u64) -> Result<(), String> {
        match action {
            Action::Stake { value } => {
                if self.state != BountyState::Open {
                    return Err("bounty not open".into());
                }
                if !self.joinable {
                    return Err("bounty not joinable".into());
                }
                if value.is_zero() {
                    return Err("stake must be positive".into());
                }
                self.add_stake(sender, *value);
            },
            Action::SubmitClaim { name, proof_uri } => {
                if self.state != BountyState::Open {
                    return Err("bounty not open".into());
                }
                self.claims.push(RawClaim {
                    claimant: sender,
                    name: name.clone(),
                    proof_uri: proof_uri.clone(),
                });
            },
            Action::InitiateVote { claim_id } => {
                if self.state != BountyState::Open {
                    return Err("bounty not open".into());
                }
                if *claim_id >= self.claims.len() as u64 {
                    return Err("unknown claim".into());
                }
                let standing = sender == self.issuer || (self.joinable && !self.stake_of(sender).is_zero());
                if !standing {
                    return Err("no standing".into());
                }
                self.transition(BountyState::Voting)?;
                self.vote = VoteRound {
                    claim_id: *claim_id,
                    yes: U256::zero(),
                    no: U256::zero(),
                    deadline: now + voting_period,
                    round: self.rounds_started,
                };
                self.rounds_started += 1;
            },
            Action::Vote { support } => {
                if self.state != BountyState::Voting {
                    return Err("no active vote".into());
                }
                if now >= self.vote.deadline {
                    return Err("voting closed".into());
                }
                let weight = self.stake_of(sender);
                if weight.is_zero() {
                    return Err("no stake".into());
                }
                if !self.voted.insert((sender, self.vote.round)) {
                    return Err("already voted".into());
                }
                if *support {
                    self.vote.yes = self.vote.yes.saturating_add(weight);
                } else {
                    self.vote.no = self.vote.no.saturating_add(weight);
                }
            },
            Action::ResolveVote => {
                if self.state != BountyState::Voting {
                    return Err("no active vote".into());
                }
                let all_voted = self.vote.cast_weight() >= self.total_staked();
                if now < self.vote.deadline && !all_voted {
                    return Err("vote still running".into());
                }
                if self.passes() {
                    self.pay_out(self.vote.claim_id)?;
                } else {
                    self.transition(BountyState::Open)?;
                }
            },
            Action::Cancel => {
                if sender != self.issuer {
                    return Err("not issuer".into());
                }
                self.transition(BountyState::Cancelled)?;
            },
            Action::Withdraw => {
                let allowed = match self.state {
                    BountyState::Open => sender != self.issuer,
                    BountyState::Cancelled => true,
                    _ => false,
                };
                if !allowed {
                    return Err("withdraw not allowed".into());
                }
                if self.stake_of(sender).is_zero() {
                    return Err("no stake".into());
                }
                self.stakes.retain(|(addr, _)| *addr != sender);
            },
            Action::AcceptClaim { claim_id } => {
                if sender != self.issuer {
                    return Err("not issuer".into());
                }
                if self.joinable {
                    return Err("joinable bounties settle by vote".into());
                }
                if self.state != BountyState::Open {
                    return Err("bounty not open".into());
                }
                self.pay_out(*claim_id)?;
            },
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Ledger {
    /// Factory order
    order: Vec<Address>,
    bounties: HashMap<Address, BountyRecord>,
    transactions: HashMap<TxHash, TxOutcome>,
    nonce: u64,
}

impl Ledger {
    fn get(&self, bounty: Address) -> Result<&BountyRecord, ChainError> {
        self.bounties.get(&bounty).ok_or(ChainError::UnknownBounty(bounty))
    }

    fn next_hash(&mut self) -> TxHash {
        self.nonce += 1;
        TxHash::from(keccak256(self.nonce.to_be_bytes()))
    }
}

/// Fixture-backed chain. Clones made with [`FixtureChain::connect_as`] share state.
#[derive(Clone)]
pub struct FixtureChain {
    ledger: Arc<RwLock<Ledger>>,
    clock_offset: Arc<AtomicI64>,
    signer: Option<Address>,
    voting_period: u64,
}

impl FixtureChain {
    pub fn embedded() -> anyhow::Result<(FixtureChain, FixtureDocuments)> {
        FixtureFile::embedded()?.into_sources()
    }

    /// Same chain, different signer
    pub fn connect_as(&self, signer: Address) -> FixtureChain {
        FixtureChain {
            signer: Some(signer),
            ..self.clone()
        }
    }

    /// Move the fixture clock forward
    pub fn advance(&self, secs: i64) {
        self.clock_offset.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn now(&self) -> u64 {
        (now_unix() as i64 + self.clock_offset.load(Ordering::SeqCst)).max(0) as u64
    }

    async fn record(&self, outcome: impl FnOnce(&mut Ledger, Address) -> Result<Option<Address>, String>) -> Result<TxHash, ChainError> {
        let sender = self.signer.ok_or(ChainError::NoSigner)?;
        let mut ledger = self.ledger.write().await;

        let created_bounty = outcome(&mut ledger, sender).map_err(|reason| {
            debug!("fixture transaction from {sender:?} reverted: {reason}");
            ChainError::Reverted {
                reason: Some(reason),
            }
        })?;

        let hash = ledger.next_hash();
        let block = ledger.nonce;
        ledger.transactions.insert(
            hash,
            TxOutcome {
                hash,
                success: true,
                block: Some(block),
                created_bounty,
                revert_reason: None,
            },
        );
        Ok(hash)
    }

    async fn read<T>(&self, bounty: Address, f: impl FnOnce(&BountyRecord) -> T) -> Result<T, ChainError> {
        let ledger = self.ledger.read().await;
        ledger.get(bounty).map(f)
    }
}

#[async_trait]
impl ChainClient for FixtureChain {
    fn chain_id(&self) -> u64 {
        FIXTURE_CHAIN_ID
    }

    fn signer(&self) -> Option<Address> {
        self.signer
    }

    async fn block_timestamp(&self) -> Result<u64, ChainError> {
        Ok(self.now())
    }

    async fn bounty_count(&self) -> Result<u64, ChainError> {
        Ok(self.ledger.read().await.order.len() as u64)
    }

    async fn bounty_addresses(&self, offset: u64, limit: u64) -> Result<Vec<Address>, ChainError> {
        let ledger = self.ledger.read().await;
        Ok(ledger
            .order
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .copied()
            .collect())
    }

    async fn issuer(&self, bounty: Address) -> Result<Address, ChainError> {
        self.read(bounty, |b| b.issuer).await
    }

    async fn metadata_uri(&self, bounty: Address) -> Result<String, ChainError> {
        self.read(bounty, |b| b.metadata_uri.clone()).await
    }

    async fn state(&self, bounty: Address) -> Result<BountyState, ChainError> {
        self.read(bounty, |b| b.state).await
    }

    async fn joinable(&self, bounty: Address) -> Result<bool, ChainError> {
        self.read(bounty, |b| b.joinable).await
    }

    async fn total_staked(&self, bounty: Address) -> Result<U256, ChainError> {
        self.read(bounty, |b| b.total_staked()).await
    }

    async fn claims_count(&self, bounty: Address) -> Result<u64, ChainError> {
        self.read(bounty, |b| b.claims.len() as u64).await
    }

    async fn claim(&self, bounty: Address, claim_id: u64) -> Result<RawClaim, ChainError> {
        self.read(bounty, |b| b.claims.get(claim_id as usize).cloned())
            .await?
            .ok_or_else(|| ChainError::Reverted {
                reason: Some("unknown claim".into()),
            })
    }

    async fn current_vote(&self, bounty: Address) -> Result<VoteRound, ChainError> {
        self.read(bounty, |b| b.vote).await
    }

    async fn funders(&self, bounty: Address) -> Result<Vec<Address>, ChainError> {
        self.read(bounty, |b| b.stakes.iter().map(|(addr, _)| *addr).collect())
            .await
    }

    async fn stake_of(&self, bounty: Address, funder: Address) -> Result<U256, ChainError> {
        self.read(bounty, |b| b.stake_of(funder)).await
    }

    async fn has_voted(&self, bounty: Address, voter: Address, round: u64) -> Result<bool, ChainError> {
        self.read(bounty, |b| b.voted.contains(&(voter, round))).await
    }

    async fn resolution_outcome(&self, bounty: Address) -> Result<ResolutionOutcome, ChainError> {
        self.read(bounty, |b| {
            if b.passes() {
                ResolutionOutcome::Payout
            } else {
                ResolutionOutcome::Reopen
            }
        })
        .await
    }

    async fn create_bounty(
        &self,
        metadata_uri: &str,
        joinable: bool,
        value: U256,
    ) -> Result<TxHash, ChainError> {
        let metadata_uri = metadata_uri.to_string();
        self.record(move |ledger, sender| {
            if value.is_zero() {
                return Err("deposit must be positive".into());
            }
            let address = Address::from_low_u64_be(0xb000_0000 + ledger.order.len() as u64 + 1);
            ledger.order.push(address);
            ledger.bounties.insert(
                address,
                BountyRecord {
                    issuer: sender,
                    metadata_uri,
                    state: BountyState::Open,
                    joinable,
                    stakes: vec![(sender, value)],
                    claims: vec![],
                    vote: empty_vote(),
                    rounds_started: 0,
                    voted: HashSet::new(),
                },
            );
            info!("fixture bounty {address:?} created by {sender:?}");
            Ok(Some(address))
        })
        .await
    }

    async fn send(&self, bounty: Address, action: &Action) -> Result<TxHash, ChainError> {
        {
            let ledger = self.ledger.read().await;
            ledger.get(bounty)?;
        }

        let now = self.now();
        let voting_period = self.voting_period;
        self.record(|ledger, sender| {
            let record = ledger
                .bounties
                .get_mut(&bounty)
                .ok_or_else(|| "unknown bounty".to_string())?;

            // revert leaves the record untouched
            let mut next = record.clone();
            next.apply(sender, action, now, voting_period)?;
            *record = next;
            Ok(None)
        })
        .await
    }

    async fn wait_for(&self, tx: TxHash) -> Result<TxOutcome, ChainError> {
        self.ledger
            .read()
            .await
            .transactions
            .get(&tx)
            .cloned()
            .ok_or_else(|| ChainError::Connectivity(format!("unknown transaction {tx:?}")))
    }
}
