//! The funded-payment protocol, run against the scripted escrow contract.

use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
};

use intent_payment_engine::{
    events::{EventHandler, EventProducers, PaymentRunEvent},
    orchestrator::{AuditAction, FundedPaymentOrchestrator, LimitKind, PaymentError, PaymentRequest},
    test_utils::{ContractIntentConfig, MemoryBlobStore, MemoryContracts},
    traits::BlobStore,
};
use ipg_common::{ChainAddress, TokenAmount};

fn payer() -> ChainAddress {
    ChainAddress::from("0x00000000000000000000000000000000000000aa")
}

fn agent() -> ChainAddress {
    ChainAddress::from("0x00000000000000000000000000000000000000ab")
}

fn merchant() -> ChainAddress {
    ChainAddress::from("0x00000000000000000000000000000000000000ac")
}

fn token() -> ChainAddress {
    ChainAddress::from("0x00000000000000000000000000000000000000ad")
}

fn intent() -> ChainAddress {
    ChainAddress::from("0x1000000000000000000000000000000000000001")
}

fn request(amount: i64) -> PaymentRequest {
    PaymentRequest {
        intent: intent(),
        merchant: merchant(),
        amount: TokenAmount::from(amount),
        receipt_hash: "0xhash01".to_string(),
        receipt_uri: "memory://transcript-1".to_string(),
    }
}

fn orchestrator(contracts: &MemoryContracts) -> FundedPaymentOrchestrator<MemoryContracts> {
    FundedPaymentOrchestrator::new(contracts.clone(), agent(), EventProducers::default())
}

#[tokio::test]
async fn a_covered_payment_executes_on_the_first_attempt() {
    let contracts = MemoryContracts::new(agent());
    contracts.add_intent(ContractIntentConfig::new(intent(), payer(), agent(), token()).with_balance(200));

    let report = orchestrator(&contracts).run(request(50)).await;
    let payment = report.result.expect("payment should succeed");
    assert_eq!(payment.attempts, 1);
    assert!(payment.funding_txid.is_none());
    assert_eq!(report.audit.execute_attempts(), 1);
    assert_eq!(report.audit.funding_attempts(), 0);
    assert_eq!(contracts.escrow_balance_of(&intent()), TokenAmount::from(150));
    assert_eq!(contracts.spent_of(&intent()), TokenAmount::from(50));
    assert_eq!(contracts.token_balance_of(&token(), &merchant()), TokenAmount::from(50));
}

#[tokio::test]
async fn remaining_cap_rejection_submits_nothing() {
    // totalCap 1000, perTxCap 100, spent 950: a request for 80 is under the per-tx cap but over the remaining 50.
    let contracts = MemoryContracts::new(agent());
    contracts.add_intent(
        ContractIntentConfig::new(intent(), payer(), agent(), token())
            .with_caps(1000, 100)
            .with_spent(950)
            .with_balance(1000),
    );

    let report = orchestrator(&contracts).run(request(80)).await;
    match report.result {
        Err(PaymentError::LimitExceeded { kind, .. }) => assert_eq!(kind, LimitKind::TotalCap),
        other => panic!("expected a total-cap rejection, got {other:?}"),
    }
    assert_eq!(report.audit.funding_attempts(), 0, "a hard limit must never trigger a funding transaction");
    assert_eq!(report.audit.execute_attempts(), 0, "pre-flight caught it before anything was submitted");
    assert_eq!(contracts.escrow_balance_of(&intent()), TokenAmount::from(1000));
}

#[tokio::test]
async fn underfunded_escrow_is_funded_and_retried_once() {
    // Escrow holds 0; the agent holds 500. A 120 payment fails once, gets 130 (120 + 10 buffer) of funding, and
    // succeeds on the single retry.
    let contracts = MemoryContracts::new(agent());
    contracts.add_intent(
        ContractIntentConfig::new(intent(), payer(), agent(), token()).with_caps(1000, 200).with_balance(0),
    );
    contracts.set_token_balance(&token(), &agent(), TokenAmount::from(500));

    let report = orchestrator(&contracts).run(request(120)).await;
    let payment = report.result.expect("funded retry should succeed");
    assert_eq!(payment.attempts, 2);
    assert!(payment.funding_txid.is_some());
    assert_eq!(report.audit.execute_attempts(), 2, "one failure plus exactly one retry");
    assert_eq!(report.audit.funding_attempts(), 1);

    // 130 went in, 120 went out to the merchant, 10 remains in the escrow.
    assert_eq!(contracts.escrow_balance_of(&intent()), TokenAmount::from(10));
    assert_eq!(contracts.token_balance_of(&token(), &agent()), TokenAmount::from(370));
    assert_eq!(contracts.token_balance_of(&token(), &merchant()), TokenAmount::from(120));
    assert_eq!(contracts.spent_of(&intent()), TokenAmount::from(120));
}

#[tokio::test]
async fn a_broke_agent_cannot_auto_fund() {
    let contracts = MemoryContracts::new(agent());
    contracts.add_intent(
        ContractIntentConfig::new(intent(), payer(), agent(), token()).with_caps(1000, 200).with_balance(0),
    );
    contracts.set_token_balance(&token(), &agent(), TokenAmount::from(50));

    let report = orchestrator(&contracts).run(request(120)).await;
    match report.result {
        Err(PaymentError::InsufficientAgentFunds { needed, available }) => {
            assert_eq!(needed, TokenAmount::from(120));
            assert_eq!(available, TokenAmount::from(50));
        },
        other => panic!("expected insufficient agent funds, got {other:?}"),
    }
    assert_eq!(report.audit.execute_attempts(), 1);
    assert_eq!(report.audit.funding_attempts(), 0, "no funding transfer may be attempted");
    assert_eq!(contracts.token_balance_of(&token(), &agent()), TokenAmount::from(50));
}

#[tokio::test]
async fn a_second_failure_after_funding_is_terminal() {
    let contracts = MemoryContracts::new(agent());
    contracts.add_intent(
        ContractIntentConfig::new(intent(), payer(), agent(), token()).with_caps(1000, 200).with_balance(0),
    );
    contracts.set_token_balance(&token(), &agent(), TokenAmount::from(500));
    // Force both execute attempts to report an underfunded escrow; there must be no second funding round.
    contracts.queue_execute_revert("PaymentIntent: insufficient balance");
    contracts.queue_execute_revert("PaymentIntent: insufficient balance");

    let report = orchestrator(&contracts).run(request(120)).await;
    match report.result {
        Err(PaymentError::InsufficientAllowance { .. }) => {},
        other => panic!("expected the retry failure to surface, got {other:?}"),
    }
    assert_eq!(report.audit.execute_attempts(), 2, "at most two execute attempts, ever");
    assert_eq!(report.audit.funding_attempts(), 1, "auto-funding never recurses");
}

#[tokio::test]
async fn disallowed_merchants_fail_during_checking() {
    let other = ChainAddress::from("0x00000000000000000000000000000000000000ff");
    let contracts = MemoryContracts::new(agent());
    contracts.add_intent(
        ContractIntentConfig::new(intent(), payer(), agent(), token())
            .with_balance(500)
            .with_merchants(vec![(other, true)]),
    );

    let report = orchestrator(&contracts).run(request(50)).await;
    match report.result {
        Err(PaymentError::LimitExceeded { kind, .. }) => assert_eq!(kind, LimitKind::MerchantNotAllowed),
        other => panic!("expected a merchant rejection, got {other:?}"),
    }
    assert_eq!(report.audit.execute_attempts(), 0);
    assert_eq!(report.audit.count(AuditAction::CheckMerchant), 1);
}

#[tokio::test]
async fn failed_runs_keep_their_audit_trail() {
    let contracts = MemoryContracts::new(agent());
    contracts.add_intent(
        ContractIntentConfig::new(intent(), payer(), agent(), token()).with_caps(1000, 200).with_balance(0),
    );
    contracts.set_token_balance(&token(), &agent(), TokenAmount::from(10));

    let report = orchestrator(&contracts).run(request(120)).await;
    assert!(report.result.is_err());
    // Every step up to the point of failure is retained: analysis, merchant check, balance read, the failed
    // execute, and the agent balance check that ruled funding out.
    assert_eq!(report.audit.count(AuditAction::AnalyzeIntent), 1);
    assert_eq!(report.audit.count(AuditAction::CheckMerchant), 1);
    assert_eq!(report.audit.count(AuditAction::CheckEscrowBalance), 1);
    assert_eq!(report.audit.count(AuditAction::ExecutePayment), 1);
    assert_eq!(report.audit.count(AuditAction::CheckAgentBalance), 1);
    let failures = report.audit.entries().iter().filter(|e| !e.outcome.is_success()).count();
    assert!(failures >= 1);
}

#[tokio::test]
async fn phase_transitions_are_published_for_subscribers() {
    let contracts = MemoryContracts::new(agent());
    contracts.add_intent(
        ContractIntentConfig::new(intent(), payer(), agent(), token()).with_caps(1000, 200).with_balance(0),
    );
    contracts.set_token_balance(&token(), &agent(), TokenAmount::from(500));

    let phases = Arc::new(Mutex::new(Vec::new()));
    let sink = phases.clone();
    let handler = Arc::new(move |ev: PaymentRunEvent| {
        let sink = sink.clone();
        Box::pin(async move {
            sink.lock().unwrap().push(ev.phase);
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    let event_handler = EventHandler::new(16, handler);
    let mut producers = EventProducers::default();
    producers.payment_run_producer.push(event_handler.subscribe());

    let orchestrator = FundedPaymentOrchestrator::new(contracts.clone(), agent(), producers);
    let report = orchestrator.run(request(120)).await;
    assert!(report.result.is_ok());
    drop(orchestrator);
    event_handler.start_handler().await;

    let phases = phases.lock().unwrap();
    for expected in ["Analyzing", "Checking", "Executing", "AutoFunding", "Retrying", "Success"] {
        assert!(phases.iter().any(|p| p == expected), "missing phase transition {expected}: {phases:?}");
    }
}

#[tokio::test]
async fn receipt_hashes_come_from_content_addressed_transcripts() {
    let store = MemoryBlobStore::new();
    let transcript = br#"{"action":"purchase","items":3}"#;
    let pinned = store.pin(transcript).await.unwrap();
    let pinned_again = store.pin(transcript).await.unwrap();
    // Identical transcripts yield identical addresses, so a retried attempt reuses the same commitment.
    assert_eq!(pinned, pinned_again);
    assert_eq!(store.fetch(&pinned.uri).await.unwrap(), transcript.to_vec());

    let contracts = MemoryContracts::new(agent());
    contracts.add_intent(ContractIntentConfig::new(intent(), payer(), agent(), token()).with_balance(200));
    let request = PaymentRequest {
        intent: intent(),
        merchant: merchant(),
        amount: TokenAmount::from(50),
        receipt_hash: pinned.content_hash.clone(),
        receipt_uri: pinned.uri.clone(),
    };
    let report = orchestrator(&contracts).run(request).await;
    assert!(report.result.is_ok());
}
