use thiserror::Error;

use crate::models::{ActionKind, Address, BountyState};

/// Failures talking to the chain, either transport level or a rejected transaction
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("chain unreachable: {0}")]
    Connectivity(String),

    #[error("transaction reverted: {}", .reason.as_deref().unwrap_or("no reason given"))]
    Reverted { reason: Option<String> },

    #[error("unexpected value from contract: {0}")]
    Decode(String),

    #[error("no bounty at {0:?}")]
    UnknownBounty(Address),

    #[error("no signer configured, writes are disabled")]
    NoSigner,
}

/// Malformed or missing input, rejected before any network call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("metadata URI must not be empty")]
    EmptyMetadataUri,

    #[error("amount must be greater than zero")]
    NonPositiveAmount,

    #[error("claim name must not be empty")]
    EmptyClaimName,

    #[error("proof URI must not be empty")]
    EmptyProofUri,

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid amount `{0}`")]
    InvalidAmount(String),

    #[error("invalid address `{0}`")]
    InvalidAddress(String),
}

/// Action not valid for the bounty's lifecycle state or the caller's standing
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("{action} is not allowed while the bounty is {state}")]
    WrongState { action: ActionKind, state: BountyState },

    #[error("only the issuer may {0}")]
    NotIssuer(ActionKind),

    #[error("caller has no standing to {0}: needs to be the issuer or a funder of a joinable bounty")]
    NoStanding(ActionKind),

    #[error("bounty is not joinable")]
    NotJoinable,

    #[error("joinable bounties settle by vote, claims cannot be accepted directly")]
    RequiresVote,

    #[error("claim {claim_id} does not exist (bounty has {claims_count} claims)")]
    UnknownClaim { claim_id: u64, claims_count: u64 },

    #[error("caller has no stake in this bounty")]
    NoStake,

    #[error("caller already voted in round {0}")]
    AlreadyVoted(u64),

    #[error("voting for round {round} closed at {deadline}")]
    VotingClosed { round: u64, deadline: u64 },

    #[error("vote cannot be resolved before {deadline} unless all stake has voted")]
    ResolutionNotReady { deadline: u64 },

    #[error("the issuer may only withdraw after the bounty is cancelled")]
    IssuerCannotWithdraw,

    #[error("another proposal for this bounty is already in flight")]
    ProposalInFlight,
}

/// Everything an action on the bounty surface can fail with
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("invalid content reference `{0}`")]
    InvalidReference(String),

    #[error("gateway {gateway} timed out")]
    Timeout { gateway: String },

    #[error("gateway {gateway} failed: {message}")]
    Gateway { gateway: String, message: String },

    #[error("all {attempts} gateway attempts failed for {cid}")]
    Exhausted { cid: String, attempts: usize },

    #[error("document is not valid metadata: {0}")]
    Malformed(String),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("pinning service failed: {0}")]
    Upstream(String),
}
