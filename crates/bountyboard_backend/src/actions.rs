use std::sync::Arc;

use bountyboard_contract::{TxHash, U256};
use log::{info, warn};
use serde::Serialize;

use crate::{
    chain::ChainClient,
    error::{ActionError, ChainError},
    gate::ActionGate,
    models::{Action, ActionKind, Address, ResolutionOutcome, TxOutcome},
    projector::Projector,
};

/// What a successful write reports back
#[derive(Debug, Clone, Serialize)]
pub struct ActionReceipt {
    pub action: ActionKind,
    pub bounty: Address,
    pub tx: TxOutcome,
    /// Only for resolveVote: what the contract decided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ResolutionOutcome>,
}

/// Write surface: every call is gated against a fresh snapshot before it is submitted
pub struct BountyActions {
    chain: Arc<dyn ChainClient>,
    projector: Arc<Projector>,
    gate: Arc<ActionGate>,
}

impl BountyActions {
    pub fn new(chain: Arc<dyn ChainClient>, projector: Arc<Projector>, gate: Arc<ActionGate>) -> Self {
        BountyActions {
            chain,
            projector,
            gate,
        }
    }

    fn signer(&self) -> Result<Address, ChainError> {
        self.chain.signer().ok_or(ChainError::NoSigner)
    }

    async fn confirm(&self, tx: TxHash) -> Result<TxOutcome, ChainError> {
        let outcome = self.chain.wait_for(tx).await?;
        if !outcome.success {
            warn!("transaction {tx:?} failed on chain");
            return Err(ChainError::Reverted {
                reason: outcome.revert_reason,
            });
        }
        Ok(outcome)
    }

    /// Create a bounty funded with `value`, returns the mined receipt with the new address
    pub async fn create(&self, metadata_uri: &str, joinable: bool, value: U256) -> Result<TxOutcome, ActionError> {
        ActionGate::validate_create(metadata_uri, value)?;
        let signer = self.signer()?;

        info!("creating bounty for {metadata_uri} as {signer:?}");
        let tx = self.chain.create_bounty(metadata_uri, joinable, value).await?;
        let outcome = self.confirm(tx).await?;

        if outcome.created_bounty.is_none() {
            warn!("transaction {tx:?} mined without a BountyCreated event");
        }
        Ok(outcome)
    }

    pub async fn perform(&self, bounty: Address, action: Action) -> Result<ActionReceipt, ActionError> {
        ActionGate::validate(&action)?;
        let signer = self.signer()?;

        // a proposal holds the bounty from before its snapshot is read until the write is mined
        let proposal = match action {
            Action::InitiateVote { .. } | Action::AcceptClaim { .. } => Some(self.gate.begin_proposal(bounty)?),
            _ => None,
        };

        let (snapshot, now) = tokio::try_join!(
            self.projector.bounty_onchain(bounty),
            self.chain.block_timestamp()
        )?;
        let actor = self.projector.actor(&snapshot, signer).await?;
        match &proposal {
            Some(guard) => guard.check(&snapshot, &actor, &action, now)?,
            None => self.gate.check(&snapshot, &actor, &action, now)?,
        }

        let resolution = match action {
            Action::ResolveVote => Some(self.chain.resolution_outcome(bounty).await?),
            _ => None,
        };

        info!("{} on {bounty:?} as {signer:?}", action.kind());
        let tx = self.chain.send(bounty, &action).await?;
        let tx = self.confirm(tx).await?;

        Ok(ActionReceipt {
            action: action.kind(),
            bounty,
            tx,
            resolution,
        })
    }

    pub async fn stake(&self, bounty: Address, value: U256) -> Result<ActionReceipt, ActionError> {
        self.perform(bounty, Action::Stake { value }).await
    }

    pub async fn submit_claim(&self, bounty: Address, name: &str, proof_uri: &str) -> Result<ActionReceipt, ActionError> {
        self.perform(
            bounty,
            Action::SubmitClaim {
                name: name.to_string(),
                proof_uri: proof_uri.to_string(),
            },
        )
        .await
    }

    pub async fn initiate_vote(&self, bounty: Address, claim_id: u64) -> Result<ActionReceipt, ActionError> {
        self.perform(bounty, Action::InitiateVote { claim_id }).await
    }

    pub async fn vote(&self, bounty: Address, support: bool) -> Result<ActionReceipt, ActionError> {
        self.perform(bounty, Action::Vote { support }).await
    }

    pub async fn resolve_vote(&self, bounty: Address) -> Result<ActionReceipt, ActionError> {
        self.perform(bounty, Action::ResolveVote).await
    }

    pub async fn cancel(&self, bounty: Address) -> Result<ActionReceipt, ActionError> {
        self.perform(bounty, Action::Cancel).await
    }

    pub async fn withdraw(&self, bounty: Address) -> Result<ActionReceipt, ActionError> {
        self.perform(bounty, Action::Withdraw).await
    }

    pub async fn accept_claim(&self, bounty: Address, claim_id: u64) -> Result<ActionReceipt, ActionError> {
        self.perform(bounty, Action::AcceptClaim { claim_id }).await
    }
}
