use bountyboard_contract::U256;
use ethers::utils::{format_ether, parse_ether};
use serde::Serializer;

use crate::{error::ValidationError, models::Address};

/// Wei amounts go out as decimal strings, js numbers can't hold them
pub fn serialize_wei<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}

/// Parse a decimal ether amount (e.g. `0.5`) into wei
pub fn parse_amount(ether: &str) -> Result<U256, ValidationError> {
    let trimmed = ether.trim();
    if trimmed.is_empty() || trimmed.starts_with('-') {
        return Err(ValidationError::InvalidAmount(ether.into()));
    }
    parse_ether(trimmed).map_err(|_| ValidationError::InvalidAmount(ether.into()))
}

pub fn parse_address(address: &str) -> Result<Address, ValidationError> {
    bountyboard_contract::parse_address(address.trim())
        .map_err(|_| ValidationError::InvalidAddress(address.into()))
}

pub fn format_amount(wei: U256) -> String {
    format!("{} ETH", format_ether(wei))
}

pub fn now_unix() -> u64 {
    chrono::offset::Utc::now().timestamp().max(0) as u64
}
