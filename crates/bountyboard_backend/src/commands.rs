//! One-shot CLI commands against the configured data source

use std::time::Duration;

use anyhow::Context;
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::time::MissedTickBehavior;

use crate::{
    liveness::{Latest, Liveness},
    models::{Address, BountySnapshot},
    projector::Page,
    utils::{format_amount, parse_address, parse_amount},
    AppState, Ballot, Command,
};

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn signer(state: &AppState) -> anyhow::Result<Address> {
    state
        .chain
        .signer()
        .context("no signer configured, set PRIVATE_KEY")
}

pub async fn run(state: &AppState, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Serve { .. } => anyhow::bail!("serve is handled by main"),
        Command::List { offset, limit } => {
            let listing = state.projector.list(Page { offset, limit }).await?;
            for entry in listing.iter() {
                match &entry.summary {
                    Some(summary) => println!(
                        "{:?}  {:<9}  {:>24}  {}",
                        entry.address,
                        summary.state,
                        format_amount(summary.total_staked),
                        summary
                            .metadata
                            .as_ref()
                            .map(|m| m.title.as_str())
                            .unwrap_or("(title unknown)"),
                    ),
                    None => println!("{:?}  (unavailable)", entry.address),
                }
            }
        },
        Command::Show { bounty } => {
            let bounty = parse_address(&bounty)?;
            let snapshot = state.projector.bounty(bounty).await?;
            print_json(&snapshot)?;

            if let Some(me) = state.chain.signer() {
                let actor = state.projector.actor(&snapshot, me).await?;
                let now = state.chain.block_timestamp().await?;
                let available = state.gate.available(&snapshot, &actor, now);
                info!("available to {me:?}: {available:?}");
            }
        },
        Command::Watch { bounty, interval } => {
            let bounty = parse_address(&bounty)?;
            watch(state, bounty, Duration::from_secs(interval.max(1))).await?;
        },
        Command::Mine { address } => {
            let user = match address {
                Some(address) => parse_address(&address)?,
                None => signer(state)?,
            };
            print_json(&state.projector.user_bounties(user).await?)?;
        },
        Command::Pin {
            title,
            description,
            image,
            external_url,
        } => {
            let mut document = json!({ "title": title, "description": description });
            if let Some(image) = image {
                document["image"] = Value::String(image);
            }
            if let Some(url) = external_url {
                document["external_url"] = Value::String(url);
            }
            let cid = state.pinner.pin_json(&document).await?;
            println!("ipfs://{cid}");
        },
        Command::Create {
            metadata_uri,
            amount,
            joinable,
        } => {
            let value = parse_amount(&amount)?;
            let outcome = state.actions.create(&metadata_uri, joinable, value).await?;
            print_json(&outcome)?;
        },
        Command::Stake { bounty, amount } => {
            let value = parse_amount(&amount)?;
            print_json(&state.actions.stake(parse_address(&bounty)?, value).await?)?;
        },
        Command::Claim {
            bounty,
            name,
            proof_uri,
        } => {
            let receipt = state
                .actions
                .submit_claim(parse_address(&bounty)?, &name, &proof_uri)
                .await?;
            print_json(&receipt)?;
        },
        Command::InitiateVote { bounty, claim_id } => {
            print_json(&state.actions.initiate_vote(parse_address(&bounty)?, claim_id).await?)?;
        },
        Command::Vote { bounty, ballot } => {
            let support = matches!(ballot, Ballot::Yes);
            print_json(&state.actions.vote(parse_address(&bounty)?, support).await?)?;
        },
        Command::Resolve { bounty } => {
            print_json(&state.actions.resolve_vote(parse_address(&bounty)?).await?)?;
        },
        Command::Cancel { bounty } => {
            print_json(&state.actions.cancel(parse_address(&bounty)?).await?)?;
        },
        Command::Withdraw { bounty } => {
            print_json(&state.actions.withdraw(parse_address(&bounty)?).await?)?;
        },
        Command::Accept { bounty, claim_id } => {
            print_json(&state.actions.accept_claim(parse_address(&bounty)?, claim_id).await?)?;
        },
    }

    Ok(())
}

fn describe(snapshot: &BountySnapshot) -> String {
    let mut line = format!(
        "{} {} staked, {} claims",
        snapshot.state,
        format_amount(snapshot.total_staked),
        snapshot.claims_count
    );
    if let Some(vote) = snapshot.vote {
        line.push_str(&format!(
            ", round {} on claim {}: yes {} / no {}",
            vote.round,
            vote.claim_id,
            format_amount(vote.yes),
            format_amount(vote.no)
        ));
    }
    line
}

/// Poll a bounty until Ctrl-C or a terminal state. A tick that lands while the
/// previous refresh is still running is skipped; teardown cancels whatever is in flight.
async fn watch(state: &AppState, bounty: Address, every: Duration) -> anyhow::Result<()> {
    let mut latest = Latest::default();
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<(Liveness, _)>();
    let mut last: Option<String> = None;
    let mut refreshing = false;

    info!("watching {bounty:?} every {}s", every.as_secs());

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if refreshing {
                    debug!("refresh of {bounty:?} still running, skipping tick");
                    continue;
                }
                refreshing = true;
                let liveness = latest.next();
                let projector = state.projector.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let res = projector.bounty(bounty).await;
                    let _ = tx.send((liveness, res));
                });
            },
            Some((liveness, res)) = rx.recv() => {
                refreshing = false;
                let Some(res) = liveness.commit(res) else {
                    continue;
                };
                match res {
                    Ok(snapshot) => {
                        let line = describe(&snapshot);
                        if last.as_deref() != Some(line.as_str()) {
                            println!("{line}");
                            last = Some(line);
                        }
                        if snapshot.state.is_terminal() {
                            latest.cancel();
                            info!("{} reached {}, nothing left to watch", snapshot.title().unwrap_or("bounty"), snapshot.state);
                            return Ok(());
                        }
                    },
                    Err(e) => warn!("refresh of {bounty:?} failed: {e}"),
                }
            },
            _ = tokio::signal::ctrl_c() => {
                latest.cancel();
                info!("stopped watching {bounty:?}");
                return Ok(());
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        chain::fixture::FixtureChain,
        metadata::{
            tests::{gw, init, SlowGateway},
            MetadataResolver,
        },
        tests::fixture_state,
    };

    #[tokio::test]
    async fn test_write_commands() {
        let state = fixture_state();
        let b001 = "0x000000000000000000000000000000000000b001".to_string();

        run(
            &state,
            Command::Claim {
                bounty: b001.clone(),
                name: "alice".into(),
                proof_uri: "ipfs://bafkreialiceproof".into(),
            },
        )
        .await
        .unwrap();

        let snapshot = state
            .projector
            .bounty_onchain(Address::from_low_u64_be(0xb001))
            .await
            .unwrap();
        assert_eq!(snapshot.claims_count, 2);

        let err = run(
            &state,
            Command::Stake {
                bounty: b001,
                amount: "zero".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("invalid amount"));
    }

    #[tokio::test]
    async fn test_watch_outlasting_interval() {
        init();
        let (chain, documents) = FixtureChain::embedded().unwrap();
        // every refresh waits out three gateway timeouts, far longer than the interval
        let resolver = MetadataResolver::new(
            vec![gw(SlowGateway), gw(SlowGateway), gw(SlowGateway)],
            Duration::from_millis(400),
            Duration::from_secs(60),
        );
        let state = AppState::new(Arc::new(chain), Arc::new(resolver), Arc::new(documents));

        // b004 is closed, so the first committed refresh ends the watch
        let res = tokio::time::timeout(
            Duration::from_secs(10),
            watch(&state, Address::from_low_u64_be(0xb004), Duration::from_millis(200)),
        )
        .await;
        assert!(matches!(res, Ok(Ok(()))));
    }

    #[test]
    fn test_describe() {
        let snapshot = BountySnapshot {
            address: Address::zero(),
            issuer: Address::zero(),
            metadata_uri: String::new(),
            metadata: None,
            state: crate::models::BountyState::Open,
            joinable: true,
            total_staked: parse_amount("1").unwrap(),
            claims_count: 0,
            claims: vec![],
            funders: vec![],
            vote: None,
        };
        assert_eq!(describe(&snapshot), "OPEN 1.000000000000000000 ETH staked, 0 claims");
    }
}
