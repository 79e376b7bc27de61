//! Chain Client: typed access to the deployed bounty contracts
//!
//! One implementation is picked at startup, either [`live::LiveChain`] against an RPC
//! endpoint or [`fixture::FixtureChain`] over an in-memory fixture set. Everything above
//! this layer only sees the [`ChainClient`] trait.

pub mod fixture;
pub mod live;

use async_trait::async_trait;
use bountyboard_contract::{TxHash, U256};

use crate::{
    error::ChainError,
    models::{Action, Address, BountyState, RawClaim, ResolutionOutcome, TxOutcome, VoteRound},
};

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// The one network every call is scoped to
    fn chain_id(&self) -> u64;

    /// Address that signs writes, None for read-only clients
    fn signer(&self) -> Option<Address>;

    /// Timestamp of the latest block, the gate's notion of "now"
    async fn block_timestamp(&self) -> Result<u64, ChainError>;

    async fn bounty_count(&self) -> Result<u64, ChainError>;

    async fn bounty_addresses(&self, offset: u64, limit: u64) -> Result<Vec<Address>, ChainError>;

    async fn issuer(&self, bounty: Address) -> Result<Address, ChainError>;

    async fn metadata_uri(&self, bounty: Address) -> Result<String, ChainError>;

    async fn state(&self, bounty: Address) -> Result<BountyState, ChainError>;

    async fn joinable(&self, bounty: Address) -> Result<bool, ChainError>;

    async fn total_staked(&self, bounty: Address) -> Result<U256, ChainError>;

    async fn claims_count(&self, bounty: Address) -> Result<u64, ChainError>;

    async fn claim(&self, bounty: Address, claim_id: u64) -> Result<RawClaim, ChainError>;

    /// Raw vote fields; only meaningful while the bounty is VOTING
    async fn current_vote(&self, bounty: Address) -> Result<VoteRound, ChainError>;

    async fn funders(&self, bounty: Address) -> Result<Vec<Address>, ChainError>;

    async fn stake_of(&self, bounty: Address, funder: Address) -> Result<U256, ChainError>;

    async fn has_voted(&self, bounty: Address, voter: Address, round: u64) -> Result<bool, ChainError>;

    /// What `resolveVote` would do right now, as decided by the contract
    async fn resolution_outcome(&self, bounty: Address) -> Result<ResolutionOutcome, ChainError>;

    async fn create_bounty(
        &self,
        metadata_uri: &str,
        joinable: bool,
        value: U256,
    ) -> Result<TxHash, ChainError>;

    async fn send(&self, bounty: Address, action: &Action) -> Result<TxHash, ChainError>;

    /// Wait until the transaction is mined
    async fn wait_for(&self, tx: TxHash) -> Result<TxOutcome, ChainError>;
}

pub(crate) fn to_u64(value: U256) -> Result<u64, ChainError> {
    if value > U256::from(u64::MAX) {
        return Err(ChainError::Decode(format!("{value} does not fit in u64")));
    }
    Ok(value.as_u64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_u64() {
        assert_eq!(to_u64(U256::from(42u64)).unwrap(), 42);
        assert_eq!(to_u64(U256::from(u64::MAX)).unwrap(), u64::MAX);
        assert!(matches!(
            to_u64(U256::from(u64::MAX) + 1),
            Err(ChainError::Decode(_))
        ));
    }
}
