use alloy::{contract, primitives::Bytes};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContractError {
    /// The call reached the chain and the contract reverted.
    #[error("contract reverted (data: {data})")]
    Reverted { data: Bytes },
    #[error(transparent)]
    Contract(contract::Error),
    #[error("invalid provider configuration: {0}")]
    Provider(String),
}

pub type ContractResult<T> = Result<T, ContractError>;

impl From<contract::Error> for ContractError {
    fn from(err: contract::Error) -> Self {
        match err.as_revert_data() {
            Some(data) => ContractError::Reverted { data },
            None => ContractError::Contract(err),
        }
    }
}
