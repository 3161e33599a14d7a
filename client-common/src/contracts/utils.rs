use std::num::NonZeroUsize;

use alloy::{
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::client::RpcClient,
    transports::{
        http::Http,
        layers::{FallbackLayer, RetryBackoffLayer},
    },
};
use reqwest::Url;
use tower::ServiceBuilder;

use crate::contracts::{ContractError, ContractResult};

const MAX_RATE_LIMIT_RETRIES: u32 = 5;
const INITIAL_BACKOFF_MS: u64 = 1000;
const COMPUTE_UNITS_PER_SECOND: u64 = 100;

/// Read-only provider for the settlement chain. Verification is a view call,
/// so no wallet or nonce filler is attached.
pub type SettlementProvider = DynProvider;

fn retry_layer() -> RetryBackoffLayer {
    RetryBackoffLayer::new(
        MAX_RATE_LIMIT_RETRIES,
        INITIAL_BACKOFF_MS,
        COMPUTE_UNITS_PER_SECOND,
    )
}

fn parse_rpc_url(rpc_url: &str) -> ContractResult<Url> {
    rpc_url
        .trim()
        .parse()
        .map_err(|err| ContractError::Provider(format!("failed to parse rpc url {rpc_url}: {err}")))
}

pub fn get_provider(rpc_url: &str) -> ContractResult<SettlementProvider> {
    let url = parse_rpc_url(rpc_url)?;
    let client = RpcClient::builder().layer(retry_layer()).http(url);
    Ok(ProviderBuilder::default().connect_client(client).erased())
}

pub fn get_provider_with_fallback(rpc_urls: &[String]) -> ContractResult<SettlementProvider> {
    let transports = rpc_urls
        .iter()
        .map(|url| parse_rpc_url(url).map(Http::new))
        .collect::<ContractResult<Vec<_>>>()?;
    let active = NonZeroUsize::new(transports.len())
        .ok_or_else(|| ContractError::Provider("at least one rpc url is required".to_owned()))?;
    let fallback_layer = FallbackLayer::default().with_active_transport_count(active);
    let transport = ServiceBuilder::new()
        .layer(fallback_layer)
        .service(transports);
    let client = RpcClient::builder()
        .layer(retry_layer())
        .transport(transport, false);
    Ok(ProviderBuilder::default().connect_client(client).erased())
}

/// Single endpoint when one url is given, fallback transport otherwise.
pub fn provider_for_urls(rpc_urls: &[String]) -> ContractResult<SettlementProvider> {
    match rpc_urls {
        [] => Err(ContractError::Provider(
            "at least one rpc url is required".to_owned(),
        )),
        [single] => get_provider(single),
        many => get_provider_with_fallback(many),
    }
}
