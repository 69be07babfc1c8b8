//! The built-in Mercado contract.

use crate::validator::ContractError;
use crate::validator::Suite;
use crate::validator::load_contract;

pub const CONTRACT: &str = include_str!("../contracts/mercado.toml");

pub fn builtin_suite() -> Result<Suite, ContractError> {
    load_contract(CONTRACT, "contracts/mercado.toml")
}
