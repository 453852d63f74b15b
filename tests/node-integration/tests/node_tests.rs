//! Cumulative custody-flow tests against a live node.
//!
//! All steps run sequentially inside a single `#[tokio::test]`. Each step
//! assumes every previous step succeeded; if any step panics the run stops.

use custody_common::{LedgerCommand, LedgerConfig, LedgerEvent, OverpaymentPolicy, SignedCommand};
use custody_node_integration::harness::{Participant, SupplyChain, TestNode};
use custody_node_integration::make_draft;
use reqwest::StatusCode;

const ONE_ETHER: u128 = 1_000_000_000_000_000_000;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cumulative_node_tests() {
    tracing_subscriber::fmt::try_init().ok();

    let node = TestNode::start(LedgerConfig::default()).await;
    let SupplyChain {
        manufacturer,
        distributor,
        pharmacy,
    } = SupplyChain::new();

    // ═══════════════════════════════════════════════════════════════════
    // Step 1: Manufacturer registers DRUG001
    // ═══════════════════════════════════════════════════════════════════
    println!("── Step 1: manufacturer_creates_product ──");
    {
        let receipt = node
            .submit(&manufacturer, make_draft("DRUG001", "Amoxicillin 500mg", "1 ether"))
            .await;
        assert_eq!(receipt.event.seq, 1);
        assert_eq!(
            receipt.event.event,
            LedgerEvent::ProductCreated {
                id: "DRUG001".into(),
                name: "Amoxicillin 500mg".into(),
                manufacturer: manufacturer.id,
            }
        );

        let product = node.product("DRUG001").await;
        assert_eq!(product.manufacturer, manufacturer.id);
        assert_eq!(product.current_holder, manufacturer.id);
        assert_eq!(product.price, ONE_ETHER);
        assert!(!product.sold);
        assert_eq!(node.history("DRUG001").await.history, vec![manufacturer.id]);
    }

    // ═══════════════════════════════════════════════════════════════════
    // Step 2: Duplicate registration is refused, state unchanged
    // ═══════════════════════════════════════════════════════════════════
    println!("── Step 2: duplicate_create_is_refused ──");
    {
        let (status, err) = node
            .refuse(&distributor, make_draft("DRUG001", "Counterfeit", "1 wei"))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(err.error, "duplicate_identifier");
        assert_eq!(node.product("DRUG001").await.name, "Amoxicillin 500mg");
        assert_eq!(node.health().await.last_seq, 1);
    }

    // ═══════════════════════════════════════════════════════════════════
    // Step 3: Purchase rules
    // ═══════════════════════════════════════════════════════════════════
    println!("── Step 3: purchase_rules ──");
    {
        let (status, err) = node
            .refuse(&distributor, purchase("DRUG001", "0.5 ether"))
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.error, "insufficient_payment");

        let (_, err) = node
            .refuse(&manufacturer, purchase("DRUG001", "1 ether"))
            .await;
        assert_eq!(err.error, "self_purchase");

        let (status, err) = node.refuse(&distributor, purchase("DRUG404", "1 ether")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(err.error, "not_found");

        let (_, err) = node
            .refuse(&distributor, purchase("DRUG001", "a lot"))
            .await;
        assert_eq!(err.error, "invalid_payment");
    }

    // ═══════════════════════════════════════════════════════════════════
    // Step 4: Distributor buys DRUG001, manufacturer is paid
    // ═══════════════════════════════════════════════════════════════════
    println!("── Step 4: distributor_purchases ──");
    {
        let receipt = node.submit(&distributor, purchase("DRUG001", "1 ether")).await;
        assert_eq!(receipt.product.current_holder, distributor.id);
        assert!(receipt.product.sold);
        assert!(matches!(
            receipt.event.event,
            LedgerEvent::ProductPurchased { amount: ONE_ETHER, .. }
        ));

        let account = node.account(&manufacturer.id).await;
        assert_eq!(account.balance, ONE_ETHER);
        assert_eq!(account.entries.len(), 1);
        assert_eq!(account.entries[0].counterparty, distributor.id);
        assert_eq!(node.account(&distributor.id).await.balance, 0);
    }

    // ═══════════════════════════════════════════════════════════════════
    // Step 5: Transfer rules, then distributor hands DRUG001 to pharmacy
    // ═══════════════════════════════════════════════════════════════════
    println!("── Step 5: distributor_transfers_to_pharmacy ──");
    {
        let (status, err) = node
            .refuse(&distributor, transfer("DRUG001", "not-a-key"))
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.error, "invalid_recipient");

        let (_, err) = node
            .refuse(&distributor, transfer("DRUG001", &distributor.id.to_hex()))
            .await;
        assert_eq!(err.error, "invalid_recipient");

        let receipt = node
            .submit(&distributor, transfer("DRUG001", &pharmacy.id.to_hex()))
            .await;
        assert_eq!(receipt.product.current_holder, pharmacy.id);
        assert_eq!(
            receipt.event.event,
            LedgerEvent::ProductTransferred {
                id: "DRUG001".into(),
                from: distributor.id,
                to: pharmacy.id,
            }
        );
    }

    // ═══════════════════════════════════════════════════════════════════
    // Step 6: Former holders lose every privilege
    // ═══════════════════════════════════════════════════════════════════
    println!("── Step 6: former_holders_are_unauthorized ──");
    {
        let (status, err) = node
            .refuse(&manufacturer, transfer("DRUG001", &manufacturer.id.to_hex()))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(err.error, "unauthorized");

        let (_, err) = node
            .refuse(&distributor, update_status("DRUG001", "recalled"))
            .await;
        assert_eq!(err.error, "unauthorized");
    }

    // ═══════════════════════════════════════════════════════════════════
    // Step 7: Pharmacy updates the status
    // ═══════════════════════════════════════════════════════════════════
    println!("── Step 7: pharmacy_updates_status ──");
    {
        let (_, err) = node.refuse(&pharmacy, update_status("DRUG001", "   ")).await;
        assert_eq!(err.error, "empty_status");

        let receipt = node
            .submit(&pharmacy, update_status("DRUG001", "dispensed"))
            .await;
        assert_eq!(receipt.product.status, "dispensed");
        assert_eq!(receipt.product.current_holder, pharmacy.id);
    }

    // ═══════════════════════════════════════════════════════════════════
    // Step 8: Final custody state
    // ═══════════════════════════════════════════════════════════════════
    println!("── Step 8: final_custody_state ──");
    {
        let history = node.history("DRUG001").await;
        assert_eq!(
            history.history,
            vec![manufacturer.id, distributor.id, pharmacy.id]
        );

        let held = node.holdings(&pharmacy.id).await;
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].id.as_str(), "DRUG001");
        assert!(node.holdings(&manufacturer.id).await.is_empty());

        let health = node.health().await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.products, 1);
        assert_eq!(health.last_seq, 4);

        let events: Vec<custody_common::EventRecord> =
            node.get_json("/events?since=2").await.unwrap();
        let seqs: Vec<u64> = events.iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![3, 4]);
    }

    // ═══════════════════════════════════════════════════════════════════
    // Step 9: Refunded overpayment on a second product
    // ═══════════════════════════════════════════════════════════════════
    println!("── Step 9: overpayment_is_refunded ──");
    {
        node.submit(&manufacturer, make_draft("DRUG002", "Ibuprofen 200mg", "2 gwei"))
            .await;
        node.submit(&pharmacy, purchase("DRUG002", "5 gwei")).await;

        let pharmacy_account = node.account(&pharmacy.id).await;
        assert_eq!(pharmacy_account.balance, 3_000_000_000);
        let manufacturer_account = node.account(&manufacturer.id).await;
        assert_eq!(manufacturer_account.balance, ONE_ETHER + 2_000_000_000);
    }

    node.shutdown().await;
}

#[tokio::test]
async fn rejecting_node_refuses_overpayment() {
    let node = TestNode::start(LedgerConfig {
        overpayment: OverpaymentPolicy::Reject,
    })
    .await;
    let chain = SupplyChain::new();

    node.submit(&chain.manufacturer, make_draft("VAX-7", "Vaccine", "100 wei"))
        .await;
    let (status, err) = node
        .refuse(&chain.distributor, purchase("VAX-7", "101 wei"))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err.error, "overpayment");
    assert_eq!(node.product("VAX-7").await.current_holder, chain.manufacturer.id);

    node.submit(&chain.distributor, purchase("VAX-7", "100 wei")).await;
    assert_eq!(node.account(&chain.manufacturer.id).await.balance, 100);
    node.shutdown().await;
}

#[tokio::test]
async fn tampered_and_replayed_commands_are_refused() {
    let node = TestNode::start(LedgerConfig::default()).await;
    let mallory = Participant::new("Mallory");
    let chain = SupplyChain::new();

    let mut forged = chain.manufacturer.sign(make_draft("DRUG900", "Saline", "1 wei"));
    forged.caller = mallory.id;
    let (status, body) = node.post(&forged).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "bad_signature");

    let signed = chain.manufacturer.sign(make_draft("DRUG900", "Saline", "1 wei"));
    let (status, _) = node.post(&signed).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = node.post(&signed).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "replayed_nonce");

    assert_eq!(node.health().await.last_seq, 1);
    node.shutdown().await;
}

#[tokio::test]
async fn nonces_are_scoped_to_their_caller() {
    let node = TestNode::start(LedgerConfig::default()).await;
    let chain = SupplyChain::new();

    for (who, id) in [(&chain.manufacturer, "A-1"), (&chain.distributor, "B-1")] {
        let signed = SignedCommand::sign(make_draft(id, "Saline", "1 wei"), 7, &who.key);
        let (status, body) = node.post(&signed).await;
        assert_eq!(status, StatusCode::OK, "{}: {body}", who.name);
    }

    let stale = SignedCommand::sign(make_draft("A-2", "Saline", "1 wei"), 6, &chain.manufacturer.key);
    let (status, body) = node.post(&stale).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "replayed_nonce");
    assert_eq!(node.health().await.products, 2);
    node.shutdown().await;
}

#[tokio::test]
async fn read_endpoints_report_missing_and_malformed_inputs() {
    let node = TestNode::start(LedgerConfig::default()).await;

    let (status, err) = node
        .get_json::<serde_json::Value>("/products/NOPE")
        .await
        .unwrap_err();
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err.error, "not_found");

    let (status, err) = node
        .get_json::<serde_json::Value>("/products/NOPE/history")
        .await
        .unwrap_err();
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err.error, "not_found");

    let (status, err) = node
        .get_json::<serde_json::Value>("/holders/xyz/products")
        .await
        .unwrap_err();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err.error, "bad_identity");

    let stranger = Participant::new("Stranger");
    assert!(node.holdings(&stranger.id).await.is_empty());
    let account = node.account(&stranger.id).await;
    assert_eq!(account.balance, 0);
    assert!(account.entries.is_empty());

    let products: Vec<custody_common::Product> = node.get_json("/products").await.unwrap();
    assert!(products.is_empty());
    node.shutdown().await;
}

fn purchase(id: &str, payment: &str) -> LedgerCommand {
    LedgerCommand::Purchase {
        id: id.to_string(),
        payment: payment.to_string(),
    }
}

fn transfer(id: &str, recipient: &str) -> LedgerCommand {
    LedgerCommand::Transfer {
        id: id.to_string(),
        recipient: recipient.to_string(),
    }
}

fn update_status(id: &str, status: &str) -> LedgerCommand {
    LedgerCommand::UpdateStatus {
        id: id.to_string(),
        status: status.to_string(),
    }
}
