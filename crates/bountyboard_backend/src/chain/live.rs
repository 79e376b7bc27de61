use std::sync::Arc;

use async_trait::async_trait;
use bountyboard_contract::{
    connect_provider, connect_signer, get_bounty, get_factory, Bounty, BountyCreatedFilter,
    BountyFactory, ReadClient, SignerClient, TxHash, U256,
};
use ethers::{
    abi::Detokenize,
    contract::{parse_log, ContractCall, ContractError},
    providers::{Middleware, PendingTransaction},
    types::{BlockNumber, U64},
};
use log::{debug, info};

use super::{to_u64, ChainClient};
use crate::{
    error::ChainError,
    models::{Action, Address, BountyState, RawClaim, ResolutionOutcome, TxOutcome, VoteRound},
};

/// Chain client backed by a JSON-RPC endpoint
pub struct LiveChain {
    provider: Arc<ReadClient>,
    signer: Option<Arc<SignerClient>>,
    factory: Address,
    chain_id: u64,
}

impl LiveChain {
    pub async fn connect(
        rpc_url: &str,
        chain_id: u64,
        factory: Address,
        private_key: Option<&str>,
    ) -> anyhow::Result<LiveChain> {
        let provider = connect_provider(rpc_url)?;

        let remote_chain_id = provider.get_chainid().await?;
        if remote_chain_id != U256::from(chain_id) {
            anyhow::bail!("{rpc_url} serves chain {remote_chain_id}, expected {chain_id}");
        }

        let signer = private_key
            .map(|key| connect_signer(provider.clone(), key, chain_id))
            .transpose()?;

        match &signer {
            Some(signer) => info!("Connected to chain {chain_id} as {:?}", signer.address()),
            None => info!("Connected to chain {chain_id} read-only"),
        }

        Ok(LiveChain {
            provider,
            signer,
            factory,
            chain_id,
        })
    }

    fn bounty(&self, address: Address) -> Bounty<ReadClient> {
        get_bounty(address, self.provider.clone())
    }

    fn factory(&self) -> BountyFactory<ReadClient> {
        get_factory(self.factory, self.provider.clone())
    }

    fn signing(&self) -> Result<Arc<SignerClient>, ChainError> {
        self.signer.clone().ok_or(ChainError::NoSigner)
    }
}

/// Surface the revert reason when the node hands back `Error(string)` data
fn contract_error<M: Middleware>(err: ContractError<M>) -> ChainError {
    if let Some(reason) = err.decode_revert::<String>() {
        return ChainError::Reverted {
            reason: Some(reason),
        };
    }
    if err.is_revert() {
        return ChainError::Reverted { reason: None };
    }
    match err {
        ContractError::DetokenizationError(e) => ChainError::Decode(e.to_string()),
        other => ChainError::Connectivity(other.to_string()),
    }
}

async fn dispatch<D: Detokenize>(call: ContractCall<SignerClient, D>) -> Result<TxHash, ChainError> {
    let pending = call.send().await.map_err(contract_error)?;
    let hash = pending.tx_hash();
    debug!("submitted transaction {hash:?}");
    Ok(hash)
}

#[async_trait]
impl ChainClient for LiveChain {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn signer(&self) -> Option<Address> {
        self.signer.as_ref().map(|s| s.address())
    }

    async fn block_timestamp(&self) -> Result<u64, ChainError> {
        let block = self
            .provider
            .get_block(BlockNumber::Latest)
            .await
            .map_err(|e| ChainError::Connectivity(e.to_string()))?
            .ok_or_else(|| ChainError::Connectivity("node returned no latest block".into()))?;
        to_u64(block.timestamp)
    }

    async fn bounty_count(&self) -> Result<u64, ChainError> {
        let count = self
            .factory()
            .bounties_count()
            .call()
            .await
            .map_err(contract_error)?;
        to_u64(count)
    }

    async fn bounty_addresses(&self, offset: u64, limit: u64) -> Result<Vec<Address>, ChainError> {
        self.factory()
            .get_bounties(U256::from(offset), U256::from(limit))
            .call()
            .await
            .map_err(contract_error)
    }

    async fn issuer(&self, bounty: Address) -> Result<Address, ChainError> {
        self.bounty(bounty).issuer().call().await.map_err(contract_error)
    }

    async fn metadata_uri(&self, bounty: Address) -> Result<String, ChainError> {
        self.bounty(bounty)
            .metadata_uri()
            .call()
            .await
            .map_err(contract_error)
    }

    async fn state(&self, bounty: Address) -> Result<BountyState, ChainError> {
        let raw = self.bounty(bounty).state().call().await.map_err(contract_error)?;
        BountyState::try_from(raw).map_err(|v| ChainError::Decode(format!("unknown bounty state {v}")))
    }

    async fn joinable(&self, bounty: Address) -> Result<bool, ChainError> {
        self.bounty(bounty).joinable().call().await.map_err(contract_error)
    }

    async fn total_staked(&self, bounty: Address) -> Result<U256, ChainError> {
        self.bounty(bounty)
            .total_staked()
            .call()
            .await
            .map_err(contract_error)
    }

    async fn claims_count(&self, bounty: Address) -> Result<u64, ChainError> {
        let count = self
            .bounty(bounty)
            .claims_count()
            .call()
            .await
            .map_err(contract_error)?;
        to_u64(count)
    }

    async fn claim(&self, bounty: Address, claim_id: u64) -> Result<RawClaim, ChainError> {
        let (claimant, name, proof_uri) = self
            .bounty(bounty)
            .claims(U256::from(claim_id))
            .call()
            .await
            .map_err(contract_error)?;
        Ok(RawClaim {
            claimant,
            name,
            proof_uri,
        })
    }

    async fn current_vote(&self, bounty: Address) -> Result<VoteRound, ChainError> {
        let (claim_id, yes, no, deadline, round) = self
            .bounty(bounty)
            .current_vote()
            .call()
            .await
            .map_err(contract_error)?;
        Ok(VoteRound {
            claim_id: to_u64(claim_id)?,
            yes,
            no,
            deadline: to_u64(deadline)?,
            round: to_u64(round)?,
        })
    }

    async fn funders(&self, bounty: Address) -> Result<Vec<Address>, ChainError> {
        self.bounty(bounty).get_funders().call().await.map_err(contract_error)
    }

    async fn stake_of(&self, bounty: Address, funder: Address) -> Result<U256, ChainError> {
        self.bounty(bounty)
            .stakes(funder)
            .call()
            .await
            .map_err(contract_error)
    }

    async fn has_voted(&self, bounty: Address, voter: Address, round: u64) -> Result<bool, ChainError> {
        self.bounty(bounty)
            .has_voted(voter, U256::from(round))
            .call()
            .await
            .map_err(contract_error)
    }

    async fn resolution_outcome(&self, bounty: Address) -> Result<ResolutionOutcome, ChainError> {
        let passes = self
            .bounty(bounty)
            .preview_resolution()
            .call()
            .await
            .map_err(contract_error)?;
        Ok(if passes {
            ResolutionOutcome::Payout
        } else {
            ResolutionOutcome::Reopen
        })
    }

    async fn create_bounty(
        &self,
        metadata_uri: &str,
        joinable: bool,
        value: U256,
    ) -> Result<TxHash, ChainError> {
        let factory = get_factory(self.factory, self.signing()?);
        let call = factory
            .create_bounty(metadata_uri.to_string(), joinable)
            .value(value);
        dispatch(call).await
    }

    async fn send(&self, bounty: Address, action: &Action) -> Result<TxHash, ChainError> {
        let contract = get_bounty(bounty, self.signing()?);

        match action {
            Action::Stake { value } => dispatch(contract.join().value(*value)).await,
            Action::SubmitClaim { name, proof_uri } => {
                dispatch(contract.submit_claim(name.clone(), proof_uri.clone())).await
            },
            Action::InitiateVote { claim_id } => {
                dispatch(contract.initiate_vote(U256::from(*claim_id))).await
            },
            Action::Vote { support } => dispatch(contract.vote(*support)).await,
            Action::ResolveVote => dispatch(contract.resolve_vote()).await,
            Action::Cancel => dispatch(contract.cancel()).await,
            Action::Withdraw => dispatch(contract.withdraw()).await,
            Action::AcceptClaim { claim_id } => {
                dispatch(contract.accept_claim(U256::from(*claim_id))).await
            },
        }
    }

    async fn wait_for(&self, tx: TxHash) -> Result<TxOutcome, ChainError> {
        let receipt = PendingTransaction::new(tx, self.provider.as_ref())
            .await
            .map_err(|e| ChainError::Connectivity(e.to_string()))?
            .ok_or_else(|| ChainError::Connectivity(format!("transaction {tx:?} was dropped")))?;

        let created_bounty = receipt
            .logs
            .iter()
            .cloned()
            .find_map(|log| parse_log::<BountyCreatedFilter>(log).ok())
            .map(|event| event.bounty);

        Ok(TxOutcome {
            hash: tx,
            success: receipt.status == Some(U64::from(1)),
            block: receipt.block_number.map(|b| b.as_u64()),
            created_bounty,
            revert_reason: None,
        })
    }
}
