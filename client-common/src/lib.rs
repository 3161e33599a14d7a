pub mod contracts;
pub mod prover;
