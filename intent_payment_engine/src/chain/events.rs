//! Solidity bindings and log decoding for the escrow factory and intent contracts.

use alloy::{primitives::B256, rpc::types::Log, sol, sol_types::SolEvent};
use ipg_common::{ChainAddress, TokenAmount};

use crate::traits::{
    ChainError,
    ChainEvent,
    EventKind,
    EventPayload,
    ExecutedEvent,
    IntentCreatedEvent,
    MerchantUpdatedEvent,
    RevokedEvent,
    ToppedUpEvent,
    WithdrawnEvent,
};

sol! {
    #[sol(rpc)]
    interface IIntentFactory {
        event IntentCreated(address indexed payer, address indexed intent, address indexed agent, bytes32 salt);

        function getPayerIntents(address payer) external view returns (address[] memory intents);
        function getAgentIntents(address agent) external view returns (address[] memory intents);
    }

    #[sol(rpc)]
    interface IPaymentIntent {
        event Executed(address indexed agent, address indexed merchant, address token, uint256 amount, bytes32 receiptHash, string receiptURI);
        event Revoked(address indexed by, string reason);
        event ToppedUp(uint256 amount);
        event Withdrawn(address indexed to, uint256 amount);
        event MerchantUpdated(address indexed merchant, bool allowed);

        function limits() external view returns (uint256 totalCap, uint256 perTxCap, uint256 spent, uint64 start, uint64 end);
        function state() external view returns (uint8 status);
        function getBalance() external view returns (uint256 balance);
        function isMerchantAllowed(address merchant) external view returns (bool allowed);
        function token() external view returns (address tokenAddress);
        function metadataURI() external view returns (string memory uri);
        function allowedMerchants() external view returns (address[] memory merchants);
    }

    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256 balance);
    }
}

/// The topic0 hash the reader filters on for each event stream.
pub(crate) fn signature_hash(kind: EventKind) -> B256 {
    match kind {
        EventKind::IntentCreated => IIntentFactory::IntentCreated::SIGNATURE_HASH,
        EventKind::Executed => IPaymentIntent::Executed::SIGNATURE_HASH,
        EventKind::Revoked => IPaymentIntent::Revoked::SIGNATURE_HASH,
        EventKind::ToppedUp => IPaymentIntent::ToppedUp::SIGNATURE_HASH,
        EventKind::Withdrawn => IPaymentIntent::Withdrawn::SIGNATURE_HASH,
        EventKind::MerchantUpdated => IPaymentIntent::MerchantUpdated::SIGNATURE_HASH,
    }
}

pub(crate) fn to_chain_address(address: alloy::primitives::Address) -> ChainAddress {
    ChainAddress::from(format!("{address:#x}"))
}

/// Converts an on-chain uint256 into the ledger's i64-backed amount. Values beyond i64 are a decode failure, not a
/// truncation.
pub(crate) fn to_token_amount(value: alloy::primitives::U256) -> Result<TokenAmount, ChainError> {
    let v: u64 = value.try_into().map_err(|_| ChainError::Decode(format!("amount {value} overflows u64")))?;
    TokenAmount::try_from(v).map_err(|e| ChainError::Decode(e.to_string()))
}

/// Decodes one raw log as the given event kind, attaching its block coordinates.
pub(crate) fn decode_event(kind: EventKind, log: &Log) -> Result<ChainEvent, ChainError> {
    let block_number = log.block_number.ok_or_else(|| ChainError::Decode("log is missing a block number".into()))?;
    let tx_hash = log
        .transaction_hash
        .map(|h| format!("{h:#x}"))
        .ok_or_else(|| ChainError::Decode("log is missing a transaction hash".into()))?;
    let log_index = log.log_index.ok_or_else(|| ChainError::Decode("log is missing a log index".into()))?;
    let emitter = to_chain_address(log.address());

    let payload = match kind {
        EventKind::IntentCreated => {
            let ev = IIntentFactory::IntentCreated::decode_log(log.as_ref(), true)
                .map_err(|e| ChainError::Decode(e.to_string()))?;
            EventPayload::IntentCreated(IntentCreatedEvent {
                payer: to_chain_address(ev.payer),
                intent: to_chain_address(ev.intent),
                agent: to_chain_address(ev.agent),
                salt: format!("{:#x}", ev.salt),
            })
        },
        EventKind::Executed => {
            let ev = IPaymentIntent::Executed::decode_log(log.as_ref(), true)
                .map_err(|e| ChainError::Decode(e.to_string()))?;
            EventPayload::Executed(ExecutedEvent {
                agent: to_chain_address(ev.agent),
                merchant: to_chain_address(ev.merchant),
                token: to_chain_address(ev.token),
                amount: to_token_amount(ev.amount)?,
                receipt_hash: format!("{:#x}", ev.receiptHash),
                receipt_uri: ev.receiptURI.clone(),
            })
        },
        EventKind::Revoked => {
            let ev = IPaymentIntent::Revoked::decode_log(log.as_ref(), true)
                .map_err(|e| ChainError::Decode(e.to_string()))?;
            EventPayload::Revoked(RevokedEvent { by: to_chain_address(ev.by), reason: ev.reason.clone() })
        },
        EventKind::ToppedUp => {
            let ev = IPaymentIntent::ToppedUp::decode_log(log.as_ref(), true)
                .map_err(|e| ChainError::Decode(e.to_string()))?;
            EventPayload::ToppedUp(ToppedUpEvent { amount: to_token_amount(ev.amount)? })
        },
        EventKind::Withdrawn => {
            let ev = IPaymentIntent::Withdrawn::decode_log(log.as_ref(), true)
                .map_err(|e| ChainError::Decode(e.to_string()))?;
            EventPayload::Withdrawn(WithdrawnEvent {
                to: to_chain_address(ev.to),
                amount: to_token_amount(ev.amount)?,
            })
        },
        EventKind::MerchantUpdated => {
            let ev = IPaymentIntent::MerchantUpdated::decode_log(log.as_ref(), true)
                .map_err(|e| ChainError::Decode(e.to_string()))?;
            EventPayload::MerchantUpdated(MerchantUpdatedEvent {
                merchant: to_chain_address(ev.merchant),
                allowed: ev.allowed,
            })
        },
    };
    Ok(ChainEvent { emitter, block_number, tx_hash, log_index, payload })
}
