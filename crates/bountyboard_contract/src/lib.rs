use std::{sync::Arc, time::Duration};

use ethers::{
    prelude::SignerMiddleware,
    providers::{Http, Provider},
    signers::{LocalWallet, Signer},
    types::Address,
};

mod bounty_abi {

    use ethers::prelude::abigen;

    abigen!(Bounty, "./contract/Bounty.json");
}

mod factory_abi {

    use ethers::prelude::abigen;

    abigen!(BountyFactory, "./contract/BountyFactory.json");
}

pub use bounty_abi::Bounty;
pub use ethers::types::{TxHash, H160, U256};
pub use factory_abi::{BountyCreatedFilter, BountyFactory};

/// Provider used for view calls
pub type ReadClient = Provider<Http>;

/// Provider wrapped with the configured wallet, used for state-changing calls
pub type SignerClient = SignerMiddleware<Arc<ReadClient>, LocalWallet>;

pub fn parse_address(address: &str) -> anyhow::Result<H160> {
    let res = address.trim().parse()?;
    Ok(res)
}

pub fn connect_provider(rpc_url: &str) -> anyhow::Result<Arc<ReadClient>> {
    let provider = Provider::<Http>::try_from(rpc_url)?.interval(Duration::from_millis(500u64));
    Ok(Arc::new(provider))
}

/// Wrap a provider with a wallet bound to `chain_id`, so every transaction is scoped to one network
pub fn connect_signer(
    provider: Arc<ReadClient>,
    private_key: &str,
    chain_id: u64,
) -> anyhow::Result<Arc<SignerClient>> {
    let wallet: LocalWallet = private_key.trim().trim_start_matches("0x").parse()?;
    let client = SignerMiddleware::new(provider, wallet.with_chain_id(chain_id));
    Ok(Arc::new(client))
}

pub fn get_bounty<M: ethers::providers::Middleware>(address: Address, client: Arc<M>) -> Bounty<M> {
    Bounty::new(address, client)
}

pub fn get_factory<M: ethers::providers::Middleware>(
    address: Address,
    client: Arc<M>,
) -> BountyFactory<M> {
    BountyFactory::new(address, client)
}
