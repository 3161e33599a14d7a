pub mod error;
pub mod utils;
pub mod verifier;

pub use error::{ContractError, ContractResult};
