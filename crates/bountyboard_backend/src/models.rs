use bountyboard_contract::{H160, U256};
use serde::{Deserialize, Serialize};

use crate::utils::serialize_wei;

pub type Address = H160;

/// Lifecycle of a bounty, as reported by the contract's `state()` view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BountyState {
    Open,
    Voting,
    Closed,
    Cancelled,
}

impl BountyState {
    /// Every edge the lifecycle admits. CLOSED and CANCELLED are terminal.
    pub fn can_transition_to(self, next: BountyState) -> bool {
        use BountyState::*;

        matches!(
            (self, next),
            (Open, Voting) | (Open, Closed) | (Open, Cancelled) | (Voting, Closed) | (Voting, Open)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BountyState::Closed | BountyState::Cancelled)
    }
}

impl TryFrom<u8> for BountyState {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(BountyState::Open),
            1 => Ok(BountyState::Voting),
            2 => Ok(BountyState::Closed),
            3 => Ok(BountyState::Cancelled),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for BountyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BountyState::Open => "OPEN",
            BountyState::Voting => "VOTING",
            BountyState::Closed => "CLOSED",
            BountyState::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// Off-chain document a bounty's metadata URI points to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BountyMetadata {
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
}

/// Off-chain document a claim's proof URI points to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofMetadata {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub external_url: Option<String>,
}

/// Claim fields exactly as the contract returns them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawClaim {
    pub claimant: Address,
    pub name: String,
    pub proof_uri: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Claim {
    /// Sequential within the bounty, starting at 0
    pub id: u64,
    pub claimant: Address,
    pub name: String,
    pub proof_uri: String,
    /// None when the proof document could not be resolved
    pub proof: Option<ProofMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Funder {
    pub address: Address,
    #[serde(serialize_with = "serialize_wei")]
    pub stake: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoteRound {
    pub claim_id: u64,
    #[serde(serialize_with = "serialize_wei")]
    pub yes: U256,
    #[serde(serialize_with = "serialize_wei")]
    pub no: U256,
    /// Unix timestamp (seconds)
    pub deadline: u64,
    pub round: u64,
}

impl VoteRound {
    pub fn cast_weight(&self) -> U256 {
        self.yes.saturating_add(self.no)
    }
}

/// What resolving the active vote would do. Decided by the contract, including the yes == no case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionOutcome {
    /// Claimant gets paid and the bounty closes
    Payout,
    /// Vote failed, bounty goes back to OPEN
    Reopen,
}

/// Read-through copy of one bounty's full state. Recreated on every fetch.
#[derive(Debug, Clone, Serialize)]
pub struct BountySnapshot {
    pub address: Address,
    pub issuer: Address,
    pub metadata_uri: String,
    pub metadata: Option<BountyMetadata>,
    pub state: BountyState,
    pub joinable: bool,
    #[serde(serialize_with = "serialize_wei")]
    pub total_staked: U256,
    pub claims_count: u64,
    pub claims: Vec<Claim>,
    pub funders: Vec<Funder>,
    /// Present only while the bounty is VOTING
    pub vote: Option<VoteRound>,
}

impl BountySnapshot {
    pub fn stake_of(&self, address: Address) -> U256 {
        self.funders
            .iter()
            .filter(|f| f.address == address)
            .fold(U256::zero(), |acc, f| acc.saturating_add(f.stake))
    }

    pub fn funded_total(&self) -> U256 {
        self.funders
            .iter()
            .fold(U256::zero(), |acc, f| acc.saturating_add(f.stake))
    }

    /// Funder stakes add up to `total_staked` and no vote carries more weight than is staked.
    /// Payout zeroes the pool, so CLOSED bounties only need the vote check.
    pub fn is_consistent(&self) -> bool {
        let stakes_ok = self.state == BountyState::Closed || self.funded_total() == self.total_staked;
        let votes_ok = self
            .vote
            .map(|v| v.cast_weight() <= self.total_staked)
            .unwrap_or(true);
        stakes_ok && votes_ok
    }

    pub fn title(&self) -> Option<&str> {
        self.metadata.as_ref().map(|m| m.title.as_str())
    }
}

/// Fields read for every bounty in a listing
#[derive(Debug, Clone, Serialize)]
pub struct BountySummary {
    pub issuer: Address,
    pub metadata_uri: String,
    pub metadata: Option<BountyMetadata>,
    pub state: BountyState,
    pub joinable: bool,
    #[serde(serialize_with = "serialize_wei")]
    pub total_staked: U256,
    pub claims_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BountyListing {
    pub address: Address,
    /// None when any of this bounty's reads failed
    pub summary: Option<BountySummary>,
}

/// Derived from source data on every request, never stored
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UserRelationship {
    pub is_issuer: bool,
    pub has_stake: bool,
    pub has_claimed: bool,
}

impl UserRelationship {
    pub fn derive(snapshot: &BountySnapshot, user: Address) -> Self {
        UserRelationship {
            is_issuer: snapshot.issuer == user,
            has_stake: !snapshot.stake_of(user).is_zero(),
            has_claimed: snapshot.claims.iter().any(|c| c.claimant == user),
        }
    }
}

/// The acting user as seen by the action gate
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Actor {
    pub address: Address,
    pub relationship: UserRelationship,
    #[serde(serialize_with = "serialize_wei")]
    pub stake: U256,
    /// Whether this address already voted in the active round
    pub has_voted: bool,
}

/// A state-changing call on an existing bounty
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Stake { value: U256 },
    SubmitClaim { name: String, proof_uri: String },
    InitiateVote { claim_id: u64 },
    Vote { support: bool },
    ResolveVote,
    Cancel,
    Withdraw,
    AcceptClaim { claim_id: u64 },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Stake { .. } => ActionKind::Stake,
            Action::SubmitClaim { .. } => ActionKind::SubmitClaim,
            Action::InitiateVote { .. } => ActionKind::InitiateVote,
            Action::Vote { .. } => ActionKind::Vote,
            Action::ResolveVote => ActionKind::ResolveVote,
            Action::Cancel => ActionKind::Cancel,
            Action::Withdraw => ActionKind::Withdraw,
            Action::AcceptClaim { .. } => ActionKind::AcceptClaim,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Stake,
    SubmitClaim,
    InitiateVote,
    Vote,
    ResolveVote,
    Cancel,
    Withdraw,
    AcceptClaim,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionKind::Stake => "stake",
            ActionKind::SubmitClaim => "submitClaim",
            ActionKind::InitiateVote => "initiateVote",
            ActionKind::Vote => "vote",
            ActionKind::ResolveVote => "resolveVote",
            ActionKind::Cancel => "cancel",
            ActionKind::Withdraw => "withdraw",
            ActionKind::AcceptClaim => "acceptClaim",
        };
        f.write_str(s)
    }
}

/// Mined status of a submitted transaction
#[derive(Debug, Clone, Serialize)]
pub struct TxOutcome {
    pub hash: bountyboard_contract::TxHash,
    pub success: bool,
    pub block: Option<u64>,
    /// Set when the transaction created a bounty
    pub created_bounty: Option<Address>,
    /// Revert reason, when the source knows it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revert_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eth(tenths: u64) -> U256 {
        U256::exp10(17) * tenths
    }

    fn snapshot() -> BountySnapshot {
        BountySnapshot {
            address: Address::repeat_byte(0xb0),
            issuer: Address::repeat_byte(0x01),
            metadata_uri: "ipfs://bafy".into(),
            metadata: None,
            state: BountyState::Open,
            joinable: true,
            total_staked: eth(10),
            claims_count: 1,
            claims: vec![Claim {
                id: 0,
                claimant: Address::repeat_byte(0x03),
                name: "fix".into(),
                proof_uri: "ipfs://proof".into(),
                proof: None,
            }],
            funders: vec![
                Funder {
                    address: Address::repeat_byte(0x01),
                    stake: eth(5),
                },
                Funder {
                    address: Address::repeat_byte(0x02),
                    stake: eth(3),
                },
                Funder {
                    address: Address::repeat_byte(0x04),
                    stake: eth(2),
                },
            ],
            vote: None,
        }
    }

    #[test]
    fn test_lifecycle_edges() {
        use BountyState::*;

        let all = [Open, Voting, Closed, Cancelled];
        let allowed = [
            (Open, Voting),
            (Open, Closed),
            (Open, Cancelled),
            (Voting, Closed),
            (Voting, Open),
        ];

        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }

        assert!(Closed.is_terminal());
        assert!(Cancelled.is_terminal());
        assert!(!Voting.is_terminal());
    }

    #[test]
    fn test_state_from_u8() {
        assert_eq!(BountyState::try_from(1u8), Ok(BountyState::Voting));
        assert_eq!(BountyState::try_from(3u8), Ok(BountyState::Cancelled));
        assert_eq!(BountyState::try_from(4u8), Err(4));
    }

    #[test]
    fn test_relationship() {
        let snap = snapshot();

        let issuer = UserRelationship::derive(&snap, Address::repeat_byte(0x01));
        assert!(issuer.is_issuer && issuer.has_stake && !issuer.has_claimed);

        let claimant = UserRelationship::derive(&snap, Address::repeat_byte(0x03));
        assert_eq!(
            claimant,
            UserRelationship {
                is_issuer: false,
                has_stake: false,
                has_claimed: true
            }
        );

        let stranger = UserRelationship::derive(&snap, Address::repeat_byte(0x09));
        assert_eq!(stranger, UserRelationship::default());
    }

    #[test]
    fn test_consistency() {
        let mut snap = snapshot();
        assert_eq!(snap.funded_total(), eth(10));
        assert!(snap.is_consistent());

        snap.vote = Some(VoteRound {
            claim_id: 0,
            yes: eth(8),
            no: eth(3),
            deadline: 0,
            round: 0,
        });
        assert!(!snap.is_consistent());

        snap.vote = None;
        snap.total_staked = eth(11);
        assert!(!snap.is_consistent());

        // paid out pools read zero
        snap.state = BountyState::Closed;
        snap.total_staked = U256::zero();
        assert!(snap.is_consistent());
    }
}
