//! RPC-backed implementation of the escrow/factory read interface.

use std::str::FromStr;

use alloy::{
    primitives::Address,
    providers::{ProviderBuilder, RootProvider},
    transports::http::{Client, Http},
};
use chrono::{DateTime, TimeZone, Utc};
use ipg_common::{ChainAddress, TokenAmount};

use super::events::{to_chain_address, to_token_amount, IIntentFactory, IPaymentIntent, IERC20};
use crate::traits::{ChainError, ContractIntentState, ContractReader, IntentLimits};

/// Reads the escrow contract's authoritative state over HTTP JSON-RPC.
///
/// This is where the "never trust the mirror for authorization" rule is anchored: the `spent` counter, the caps, the
/// lifecycle state and the allowlist all come from here, and the indexer writes them into the ledger for display
/// only.
#[derive(Clone)]
pub struct RpcContractReader {
    provider: RootProvider<Http<Client>>,
    factory: Address,
}

impl RpcContractReader {
    pub fn new(rpc_url: &str, factory: &ChainAddress) -> Result<Self, ChainError> {
        let url = rpc_url.parse().map_err(|e| ChainError::Rpc(format!("Invalid RPC URL {rpc_url}: {e}")))?;
        let provider = ProviderBuilder::new().on_http(url);
        let factory = parse_address(factory)?;
        Ok(Self { provider, factory })
    }

    fn intent_instance(
        &self,
        intent: &ChainAddress,
    ) -> Result<IPaymentIntent::IPaymentIntentInstance<Http<Client>, RootProvider<Http<Client>>>, ChainError> {
        Ok(IPaymentIntent::new(parse_address(intent)?, self.provider.clone()))
    }
}

fn parse_address(address: &ChainAddress) -> Result<Address, ChainError> {
    Address::from_str(address.as_str())
        .map_err(|e| ChainError::Rpc(format!("{address} is not a valid contract address: {e}")))
}

fn rpc_err(e: impl std::fmt::Display) -> ChainError {
    ChainError::Unavailable(e.to_string())
}

fn to_utc(seconds: u64) -> Result<DateTime<Utc>, ChainError> {
    Utc.timestamp_opt(seconds as i64, 0)
        .single()
        .ok_or_else(|| ChainError::Decode(format!("{seconds} is not a valid unix timestamp")))
}

impl ContractReader for RpcContractReader {
    async fn limits(&self, intent: &ChainAddress) -> Result<IntentLimits, ChainError> {
        let contract = self.intent_instance(intent)?;
        let limits = contract.limits().call().await.map_err(rpc_err)?;
        Ok(IntentLimits {
            total_cap: to_token_amount(limits.totalCap)?,
            per_tx_cap: to_token_amount(limits.perTxCap)?,
            spent: to_token_amount(limits.spent)?,
            start: to_utc(limits.start)?,
            end: to_utc(limits.end)?,
        })
    }

    async fn state(&self, intent: &ChainAddress) -> Result<ContractIntentState, ChainError> {
        let contract = self.intent_instance(intent)?;
        let state = contract.state().call().await.map_err(rpc_err)?;
        match state.status {
            0 => Ok(ContractIntentState::Active),
            1 => Ok(ContractIntentState::Paused),
            2 => Ok(ContractIntentState::Revoked),
            3 => Ok(ContractIntentState::Expired),
            other => Err(ChainError::Decode(format!("unknown intent state discriminant {other}"))),
        }
    }

    async fn get_balance(&self, intent: &ChainAddress) -> Result<TokenAmount, ChainError> {
        let contract = self.intent_instance(intent)?;
        let balance = contract.getBalance().call().await.map_err(rpc_err)?;
        to_token_amount(balance.balance)
    }

    async fn is_merchant_allowed(&self, intent: &ChainAddress, merchant: &ChainAddress) -> Result<bool, ChainError> {
        let contract = self.intent_instance(intent)?;
        let result = contract.isMerchantAllowed(parse_address(merchant)?).call().await.map_err(rpc_err)?;
        Ok(result.allowed)
    }

    async fn token_address(&self, intent: &ChainAddress) -> Result<ChainAddress, ChainError> {
        let contract = self.intent_instance(intent)?;
        let token = contract.token().call().await.map_err(rpc_err)?;
        Ok(to_chain_address(token.tokenAddress))
    }

    async fn metadata_uri(&self, intent: &ChainAddress) -> Result<Option<String>, ChainError> {
        let contract = self.intent_instance(intent)?;
        let uri = contract.metadataURI().call().await.map_err(rpc_err)?.uri;
        Ok(if uri.is_empty() { None } else { Some(uri) })
    }

    async fn allowed_merchants(&self, intent: &ChainAddress) -> Result<Vec<ChainAddress>, ChainError> {
        let contract = self.intent_instance(intent)?;
        let result = contract.allowedMerchants().call().await.map_err(rpc_err)?;
        Ok(result.merchants.into_iter().map(to_chain_address).collect())
    }

    async fn token_balance(&self, token: &ChainAddress, holder: &ChainAddress) -> Result<TokenAmount, ChainError> {
        let contract = IERC20::new(parse_address(token)?, self.provider.clone());
        let balance = contract.balanceOf(parse_address(holder)?).call().await.map_err(rpc_err)?;
        to_token_amount(balance.balance)
    }

    async fn payer_intents(&self, payer: &ChainAddress) -> Result<Vec<ChainAddress>, ChainError> {
        let factory = IIntentFactory::new(self.factory, self.provider.clone());
        let result = factory.getPayerIntents(parse_address(payer)?).call().await.map_err(rpc_err)?;
        Ok(result.intents.into_iter().map(to_chain_address).collect())
    }

    async fn agent_intents(&self, agent: &ChainAddress) -> Result<Vec<ChainAddress>, ChainError> {
        let factory = IIntentFactory::new(self.factory, self.provider.clone());
        let result = factory.getAgentIntents(parse_address(agent)?).call().await.map_err(rpc_err)?;
        Ok(result.intents.into_iter().map(to_chain_address).collect())
    }
}
