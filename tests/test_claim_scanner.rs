//! Integration tests for claimable scans
//!
//! Tests cover:
//! - Total failure vs verified empty
//! - Zero filtering and symbol ordering
//! - Early exit of `has_any_claimables`
//! - Capability and account gates

mod common;

use common::*;
use ethers::types::U256;
use std::sync::Arc;
use token_ledger_sdk::types::truncated_symbol;
use token_ledger_sdk::{AggregatorError, ClaimScanner, WalletContext};

fn user() -> ethers::types::Address {
    addr(0xB0B)
}

fn wallet() -> WalletContext {
    WalletContext::new(Some(user()), CHAIN_ID)
}

#[tokio::test]
async fn test_all_reads_failing_is_an_error_not_empty() {
    let claims = Arc::new(
        FakeClaims::listing(vec![addr(1), addr(2), addr(3)])
            .failing(addr(1), "header not found")
            .failing(addr(2), "header not found")
            .failing(addr(3), "execution timeout"),
    );
    let exchange = FakeExchange::with_claims(claims.clone());

    let err = ClaimScanner::new()
        .get_claimable_snapshot(&exchange, &wallet())
        .await
        .unwrap_err();

    match err.downcast_ref::<AggregatorError>() {
        Some(AggregatorError::AllReadsFailed { attempted, .. }) => assert_eq!(*attempted, 3),
        other => panic!("expected AllReadsFailed, got {:?}", other),
    }
    assert_eq!(claims.reads(), 3);
}

#[tokio::test]
async fn test_all_zero_amounts_is_a_verified_empty_snapshot() {
    let claims = Arc::new(FakeClaims::listing(vec![addr(1), addr(2)]));
    let exchange = FakeExchange::with_claims(claims);

    let rows = ClaimScanner::new()
        .get_claimable_snapshot(&exchange, &wallet())
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_partial_failure_keeps_successful_rows() {
    let claims = Arc::new(
        FakeClaims::listing(vec![addr(1), addr(2), addr(3)])
            .failing(addr(1), "reverted")
            .owing(addr(2), U256::from(5u64) * U256::exp10(17)),
    );
    let exchange = FakeExchange::with_claims(claims);

    let rows = ClaimScanner::new()
        .get_claimable_snapshot(&exchange, &wallet())
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].token, addr(2));
    assert_eq!(rows[0].formatted_amount, "0.5");
    assert_eq!(rows[0].decimals, 18);
}

/// Without metadata rows are labelled by truncated address
#[tokio::test]
async fn test_rows_without_metadata_use_truncated_address() {
    let token = addr(0x1234);
    let claims = Arc::new(FakeClaims::listing(vec![token]).owing(token, units(2, 18)));
    let exchange = FakeExchange::with_claims(claims);

    let rows = ClaimScanner::new()
        .get_claimable_snapshot(&exchange, &wallet())
        .await
        .unwrap();

    assert_eq!(rows[0].symbol, truncated_symbol(&token));
    assert_eq!(rows[0].name, "Unknown Token");
    assert_eq!(rows[0].formatted_amount, "2.0");
    assert_eq!(rows[0].icon_url, None);
}

/// Metadata decimals drive formatting, symbols sort case-sensitively
#[tokio::test]
async fn test_rows_are_enriched_and_sorted_by_symbol() {
    let chain = FakeChain::new()
        .with_token(addr(1), FakeToken::new("usdc", "USD Coin (lower)", 6))
        .with_token(addr(2), FakeToken::new("WETH", "Wrapped Ether", 18))
        .with_token(addr(3), FakeToken::new("ARB", "Arbitrum", 18));
    let h = harness(chain);

    let claims = Arc::new(
        FakeClaims::listing(vec![addr(1), addr(2), addr(3), addr(4)])
            .owing(addr(1), U256::from(1_500_000u64))
            .owing(addr(2), units(1, 18))
            .owing(addr(3), units(7, 18)),
    );
    let exchange = FakeExchange::with_claims(claims);

    let rows = ClaimScanner::with_metadata(h.registry.clone())
        .with_concurrency(2)
        .get_claimable_snapshot(&exchange, &wallet())
        .await
        .unwrap();

    let symbols: Vec<&str> = rows.iter().map(|r| r.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["ARB", "WETH", "usdc"]);
    assert_eq!(rows[2].formatted_amount, "1.5");
    assert_eq!(rows[2].decimals, 6);
    assert_eq!(rows[0].raw_amount, units(7, 18));
}

#[tokio::test]
async fn test_unknown_token_with_metadata_falls_back_to_truncated_symbol() {
    let h = harness(FakeChain::new());
    let token = addr(0xBEEF);
    let claims = Arc::new(FakeClaims::listing(vec![token]).owing(token, units(1, 18)));
    let exchange = FakeExchange::with_claims(claims);

    let rows = ClaimScanner::with_metadata(h.registry.clone())
        .get_claimable_snapshot(&exchange, &wallet())
        .await
        .unwrap();
    assert_eq!(rows[0].symbol, truncated_symbol(&token));
    assert_eq!(rows[0].decimals, 18);
}

#[tokio::test]
async fn test_duplicate_candidates_are_read_once() {
    let claims = Arc::new(
        FakeClaims::listing(vec![addr(1), addr(1), addr(2)]).owing(addr(1), units(1, 18)),
    );
    let exchange = FakeExchange::with_claims(claims.clone());

    let rows = ClaimScanner::new()
        .get_claimable_snapshot(&exchange, &wallet())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(claims.reads(), 2);
}

#[tokio::test]
async fn test_list_failure_propagates() {
    let claims = Arc::new(FakeClaims {
        list_fails: true,
        ..Default::default()
    });
    let exchange = FakeExchange::with_claims(claims);

    assert!(ClaimScanner::new()
        .get_claimable_snapshot(&exchange, &wallet())
        .await
        .is_err());
    assert!(ClaimScanner::new()
        .has_any_claimables(&exchange, &wallet())
        .await
        .is_err());
}

/// Missing claim interface or account is a gate, not an error
#[tokio::test]
async fn test_gates_return_empty_and_false() {
    let scanner = ClaimScanner::new();

    let no_interface = FakeExchange::allowing(vec![addr(1)]);
    assert!(scanner.get_claimable_snapshot(&no_interface, &wallet()).await.unwrap().is_empty());
    assert!(!scanner.has_any_claimables(&no_interface, &wallet()).await.unwrap());

    let claims = Arc::new(FakeClaims::listing(vec![addr(1)]).owing(addr(1), units(1, 18)));
    let exchange = FakeExchange::with_claims(claims.clone());
    let disconnected = WalletContext::new(None, CHAIN_ID);
    assert!(scanner.get_claimable_snapshot(&exchange, &disconnected).await.unwrap().is_empty());
    assert!(!scanner.has_any_claimables(&exchange, &disconnected).await.unwrap());
    assert_eq!(claims.reads(), 0);
}

/// Scenario: token 2 of 3 has a positive amount
#[tokio::test]
async fn test_has_any_claimables_finds_positive_amount() {
    let claims = Arc::new(
        FakeClaims::listing(vec![addr(1), addr(2), addr(3)]).owing(addr(2), U256::from(1u64)),
    );
    let exchange = FakeExchange::with_claims(claims.clone());

    let found = ClaimScanner::new()
        .with_concurrency(1)
        .has_any_claimables(&exchange, &wallet())
        .await
        .unwrap();

    assert!(found);
    assert!(claims.reads() <= 3);
}

#[tokio::test]
async fn test_has_any_claimables_distinguishes_zero_from_failure() {
    let zeros = Arc::new(FakeClaims::listing(vec![addr(1), addr(2)]));
    let exchange = FakeExchange::with_claims(zeros);
    assert!(!ClaimScanner::new().has_any_claimables(&exchange, &wallet()).await.unwrap());

    let failing = Arc::new(
        FakeClaims::listing(vec![addr(1), addr(2)])
            .failing(addr(1), "boom")
            .failing(addr(2), "boom"),
    );
    let exchange = FakeExchange::with_claims(failing);
    let err = ClaimScanner::new()
        .has_any_claimables(&exchange, &wallet())
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AggregatorError>(),
        Some(AggregatorError::AllReadsFailed { attempted: 2, .. })
    ));
}

#[tokio::test]
async fn test_empty_candidate_list_is_empty_not_error() {
    let exchange = FakeExchange::with_claims(Arc::new(FakeClaims::default()));
    let scanner = ClaimScanner::new();
    assert!(scanner.get_claimable_snapshot(&exchange, &wallet()).await.unwrap().is_empty());
    assert!(!scanner.has_any_claimables(&exchange, &wallet()).await.unwrap());
}
