use alloy::primitives::B256;
use thiserror::Error;

pub const PUBLIC_VALUES_LEN: usize = 80;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("public values must be {PUBLIC_VALUES_LEN} bytes, got {actual}")]
pub struct PublicValuesLengthError {
    pub actual: usize,
}

/// Verifier input binding a proof to a batch:
/// `from (u64 BE) || to (u64 BE) || pre_state_root || post_state_root`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicValues {
    pub from_height: u64,
    pub to_height: u64,
    pub pre_state_root: B256,
    pub post_state_root: B256,
}

impl PublicValues {
    pub fn encode(&self) -> [u8; PUBLIC_VALUES_LEN] {
        let mut out = [0u8; PUBLIC_VALUES_LEN];
        out[0..8].copy_from_slice(&self.from_height.to_be_bytes());
        out[8..16].copy_from_slice(&self.to_height.to_be_bytes());
        out[16..48].copy_from_slice(self.pre_state_root.as_slice());
        out[48..80].copy_from_slice(self.post_state_root.as_slice());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, PublicValuesLengthError> {
        let bytes: &[u8; PUBLIC_VALUES_LEN] = bytes
            .try_into()
            .map_err(|_| PublicValuesLengthError {
                actual: bytes.len(),
            })?;
        let mut height = [0u8; 8];
        height.copy_from_slice(&bytes[0..8]);
        let from_height = u64::from_be_bytes(height);
        height.copy_from_slice(&bytes[8..16]);
        let to_height = u64::from_be_bytes(height);
        Ok(Self {
            from_height,
            to_height,
            pre_state_root: B256::from_slice(&bytes[16..48]),
            post_state_root: B256::from_slice(&bytes[48..80]),
        })
    }
}
