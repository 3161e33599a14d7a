use alloy::{
    primitives::{Address, B256, Bytes},
    sol,
};

use crate::contracts::{ContractResult, utils::SettlementProvider};

sol!(
    #[sol(rpc)]
    interface OpenVmHalo2Verifier {
        function verify(
            bytes publicValues,
            bytes proofData,
            bytes32 appExeCommit,
            bytes32 appVmCommit
        ) external view;
    }
);

/// Binding for the settlement-chain proof verifier. `verify` is a view call
/// that reverts on an invalid proof and returns nothing otherwise.
#[derive(Clone)]
pub struct VerifierContract {
    provider: SettlementProvider,
    address: Address,
}

impl VerifierContract {
    pub fn new(provider: SettlementProvider, address: Address) -> Self {
        Self { provider, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    fn contract_with_provider(
        &self,
    ) -> OpenVmHalo2Verifier::OpenVmHalo2VerifierInstance<SettlementProvider> {
        OpenVmHalo2Verifier::new(self.address, self.provider.clone())
    }

    pub async fn verify(
        &self,
        public_values: &[u8],
        proof: &[u8],
        app_exe_commit: B256,
        app_vm_commit: B256,
    ) -> ContractResult<()> {
        self.contract_with_provider()
            .verify(
                Bytes::copy_from_slice(public_values),
                Bytes::copy_from_slice(proof),
                app_exe_commit,
                app_vm_commit,
            )
            .call()
            .await?;
        Ok(())
    }
}
