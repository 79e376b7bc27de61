//! Lifecycle / Action Gate
//!
//! Decides, from a snapshot and the caller's standing, whether an action may be submitted.
//! Everything here is synchronous and runs before any write reaches the chain.

use std::{collections::HashSet, sync::Mutex};

use bountyboard_contract::U256;
use log::debug;

use crate::{
    error::{ActionError, PreconditionError, ValidationError},
    models::{Action, ActionKind, Actor, Address, BountySnapshot, BountyState},
};

#[derive(Debug, Default)]
pub struct ActionGate {
    /// Bounties with an initiateVote or acceptClaim currently being submitted
    in_flight: Mutex<HashSet<Address>>,
}

/// Held while a proposal is submitted; dropping it frees the bounty for the next one
#[must_use]
pub struct ProposalGuard<'a> {
    gate: &'a ActionGate,
    bounty: Address,
}

impl ProposalGuard<'_> {
    /// Gate check for a proposal on the bounty this guard holds, against a snapshot read after it was taken
    pub fn check(
        &self,
        snapshot: &BountySnapshot,
        actor: &Actor,
        action: &Action,
        now: u64,
    ) -> Result<(), ActionError> {
        debug_assert_eq!(snapshot.address, self.bounty);
        ActionGate::validate(action)?;
        self.gate.preconditions(snapshot, actor, action, now, true)?;
        Ok(())
    }
}

impl Drop for ProposalGuard<'_> {
    fn drop(&mut self) {
        self.gate.in_flight().remove(&self.bounty);
    }
}

impl ActionGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn in_flight(&self) -> std::sync::MutexGuard<'_, HashSet<Address>> {
        // the set stays valid even if a holder panicked
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn validate_create(metadata_uri: &str, value: U256) -> Result<(), ValidationError> {
        if metadata_uri.trim().is_empty() {
            return Err(ValidationError::EmptyMetadataUri);
        }
        if value.is_zero() {
            return Err(ValidationError::NonPositiveAmount);
        }
        Ok(())
    }

    /// Input checks that need no bounty state
    pub fn validate(action: &Action) -> Result<(), ValidationError> {
        match action {
            Action::Stake { value } if value.is_zero() => Err(ValidationError::NonPositiveAmount),
            Action::SubmitClaim { name, .. } if name.trim().is_empty() => Err(ValidationError::EmptyClaimName),
            Action::SubmitClaim { proof_uri, .. } if proof_uri.trim().is_empty() => {
                Err(ValidationError::EmptyProofUri)
            },
            _ => Ok(()),
        }
    }

    /// Validation, then lifecycle and standing preconditions
    pub fn check(
        &self,
        snapshot: &BountySnapshot,
        actor: &Actor,
        action: &Action,
        now: u64,
    ) -> Result<(), ActionError> {
        Self::validate(action)?;
        self.preconditions(snapshot, actor, action, now, false)?;
        Ok(())
    }

    /// Every action the actor could submit right now
    pub fn available(&self, snapshot: &BountySnapshot, actor: &Actor, now: u64) -> Vec<ActionKind> {
        let candidates = [
            Action::Stake { value: U256::one() },
            Action::SubmitClaim {
                name: "-".into(),
                proof_uri: "-".into(),
            },
            Action::InitiateVote { claim_id: 0 },
            Action::Vote { support: true },
            Action::ResolveVote,
            Action::Cancel,
            Action::Withdraw,
            Action::AcceptClaim { claim_id: 0 },
        ];

        candidates
            .iter()
            .filter(|action| self.preconditions(snapshot, actor, action, now, false).is_ok())
            .map(Action::kind)
            .collect()
    }

    /// Reserve the bounty for a single proposal
    pub fn begin_proposal(&self, bounty: Address) -> Result<ProposalGuard<'_>, PreconditionError> {
        if !self.in_flight().insert(bounty) {
            debug!("rejecting concurrent proposal on {bounty:?}");
            return Err(PreconditionError::ProposalInFlight);
        }
        Ok(ProposalGuard { gate: self, bounty })
    }

    fn preconditions(
        &self,
        snapshot: &BountySnapshot,
        actor: &Actor,
        action: &Action,
        now: u64,
        proposal_held: bool,
    ) -> Result<(), PreconditionError> {
        let kind = action.kind();
        let standing = actor.relationship;
        let require = |state: BountyState| {
            if snapshot.state == state {
                Ok(())
            } else {
                Err(PreconditionError::WrongState {
                    action: kind,
                    state: snapshot.state,
                })
            }
        };
        let claim_exists = |claim_id: u64| {
            if claim_id < snapshot.claims_count {
                Ok(())
            } else {
                Err(PreconditionError::UnknownClaim {
                    claim_id,
                    claims_count: snapshot.claims_count,
                })
            }
        };

        match action {
            Action::Stake { .. } => {
                require(BountyState::Open)?;
                if !snapshot.joinable {
                    return Err(PreconditionError::NotJoinable);
                }
            },
            Action::SubmitClaim { .. } => require(BountyState::Open)?,
            Action::InitiateVote { claim_id } => {
                require(BountyState::Open)?;
                if !(standing.is_issuer || standing.has_stake) {
                    return Err(PreconditionError::NoStanding(kind));
                }
                claim_exists(*claim_id)?;
                if !proposal_held {
                    self.no_proposal_in_flight(snapshot.address)?;
                }
            },
            Action::Vote { .. } => {
                require(BountyState::Voting)?;
                let vote = snapshot.vote.ok_or(PreconditionError::WrongState {
                    action: kind,
                    state: snapshot.state,
                })?;
                if !standing.has_stake {
                    return Err(PreconditionError::NoStake);
                }
                if actor.has_voted {
                    return Err(PreconditionError::AlreadyVoted(vote.round));
                }
                if now >= vote.deadline {
                    return Err(PreconditionError::VotingClosed {
                        round: vote.round,
                        deadline: vote.deadline,
                    });
                }
            },
            Action::ResolveVote => {
                require(BountyState::Voting)?;
                let vote = snapshot.vote.ok_or(PreconditionError::WrongState {
                    action: kind,
                    state: snapshot.state,
                })?;
                let everyone_voted = vote.cast_weight() >= snapshot.total_staked;
                if now < vote.deadline && !everyone_voted {
                    return Err(PreconditionError::ResolutionNotReady {
                        deadline: vote.deadline,
                    });
                }
            },
            Action::Cancel => {
                require(BountyState::Open)?;
                if !standing.is_issuer {
                    return Err(PreconditionError::NotIssuer(kind));
                }
            },
            Action::Withdraw => {
                match snapshot.state {
                    BountyState::Open if standing.is_issuer => {
                        return Err(PreconditionError::IssuerCannotWithdraw)
                    },
                    BountyState::Open | BountyState::Cancelled => {},
                    state => return Err(PreconditionError::WrongState { action: kind, state }),
                }
                if actor.stake.is_zero() {
                    return Err(PreconditionError::NoStake);
                }
            },
            Action::AcceptClaim { claim_id } => {
                require(BountyState::Open)?;
                if !standing.is_issuer {
                    return Err(PreconditionError::NotIssuer(kind));
                }
                if snapshot.joinable {
                    return Err(PreconditionError::RequiresVote);
                }
                claim_exists(*claim_id)?;
                if !proposal_held {
                    self.no_proposal_in_flight(snapshot.address)?;
                }
            },
        }

        Ok(())
    }

    fn no_proposal_in_flight(&self, bounty: Address) -> Result<(), PreconditionError> {
        if self.in_flight().contains(&bounty) {
            Err(PreconditionError::ProposalInFlight)
        } else {
            Ok(())
        }
    }
}
