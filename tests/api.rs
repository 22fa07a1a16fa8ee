use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use zkpay::api::{self, CALLER_HEADER};
use zkpay::seal::KeyMaterial;
use zkpay::types::*;
use zkpay::{DeploymentConfig, Ledger, LedgerError, ZkPayError};

fn acct(n: u8) -> Address {
    Address::from_bytes([n; 20])
}

fn as_caller(who: Address) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CALLER_HEADER, HeaderValue::from_str(&who.to_string()).unwrap());
    headers
}

fn ledger(minter: Option<Address>) -> Arc<Ledger> {
    let mut cfg = DeploymentConfig::new("ZkPay", "ZKPAY").with_allocation(acct(1), Amount::new(100)).unwrap();
    if let Some(m) = minter {
        cfg = cfg.with_minter(m);
    }
    Arc::new(Ledger::new(&cfg, KeyMaterial::none()).unwrap())
}

#[tokio::test]
async fn token_and_balance_queries() {
    let l = ledger(None);
    let Json(token) = api::token(State(l.clone()), HeaderMap::new()).await.unwrap();
    assert_eq!(token["name"], "ZkPay");
    assert_eq!(token["symbol"], "ZKPAY");
    assert_eq!(token["total_supply"], "100");
    assert_eq!(token["supply"]["model"], "fixed");

    let Json(bal) = api::balance_of(State(l.clone()), HeaderMap::new(), Path(acct(1).to_string()))
        .await
        .unwrap();
    assert_eq!(bal["balance"], "100");

    let err = api::balance_of(State(l), HeaderMap::new(), Path("not-an-address".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, ZkPayError::Validation(_)));
}

#[tokio::test]
async fn transfer_uses_caller_identity() {
    let l = ledger(None);
    let req = TransferReq { to: acct(2), amount: Amount::new(30) };
    let Json(out) = api::transfer(State(l.clone()), as_caller(acct(1)), Json(req)).await.unwrap();
    assert_eq!(out["status"], "applied");
    assert_eq!(l.balance_of(&acct(2)), Amount::new(30));

    let req = TransferReq { to: acct(2), amount: Amount::new(1) };
    let err = api::transfer(State(l.clone()), HeaderMap::new(), Json(req.clone())).await.unwrap_err();
    assert!(matches!(err, ZkPayError::Unauthorized));

    let err = api::transfer(State(l.clone()), as_caller(Address::NULL), Json(req)).await.unwrap_err();
    assert!(matches!(err, ZkPayError::Unauthorized));

    let req = TransferReq { to: acct(3), amount: Amount::new(31) };
    let err = api::transfer(State(l), as_caller(acct(2)), Json(req)).await.unwrap_err();
    assert!(matches!(err, ZkPayError::Ledger(LedgerError::InsufficientBalance { .. })));
}

#[tokio::test]
async fn delegated_transfer_and_event_feed() {
    let l = ledger(None);
    api::approve(
        State(l.clone()),
        as_caller(acct(1)),
        Json(ApproveReq { spender: acct(3), amount: Amount::new(10) }),
    )
    .await
    .unwrap();
    api::transfer_from(
        State(l.clone()),
        as_caller(acct(3)),
        Json(TransferFromReq { from: acct(1), to: acct(2), amount: Amount::new(10) }),
    )
    .await
    .unwrap();

    let Json(allowance) = api::allowance_of(
        State(l.clone()),
        HeaderMap::new(),
        Path((acct(1).to_string(), acct(3).to_string())),
    )
    .await
    .unwrap();
    assert_eq!(allowance["allowance"], "0");

    let Json(feed) = api::events(State(l.clone()), HeaderMap::new(), Query(EventsQuery { after: Some(0) }))
        .await
        .unwrap();
    let events = feed["events"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["notification"]["type"], "approval");
    assert_eq!(events[1]["notification"]["type"], "transfer");

    let Json(audit) = api::audit(State(l), HeaderMap::new()).await.unwrap();
    assert_eq!(audit["ok"], true);
}

#[tokio::test]
async fn supply_routes_follow_deployment_model() {
    let fixed = ledger(None);
    let err = api::mint(
        State(fixed),
        as_caller(acct(1)),
        Json(MintReq { to: acct(2), amount: Amount::new(1) }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ZkPayError::Unsupported(_)));

    let minter = acct(9);
    let elastic = ledger(Some(minter));
    let err = api::mint(
        State(elastic.clone()),
        as_caller(acct(1)),
        Json(MintReq { to: acct(2), amount: Amount::new(1) }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ZkPayError::Unauthorized));

    api::mint(
        State(elastic.clone()),
        as_caller(minter),
        Json(MintReq { to: acct(2), amount: Amount::new(5) }),
    )
    .await
    .unwrap();
    api::burn(State(elastic.clone()), as_caller(acct(2)), Json(BurnReq { amount: Amount::new(2) }))
        .await
        .unwrap();
    assert_eq!(elastic.total_supply(), Amount::new(103));
    assert_eq!(elastic.balance_of(&acct(2)), Amount::new(3));
}

#[test]
fn errors_map_to_status_and_code() {
    let resp = ZkPayError::from(LedgerError::ArithmeticOverflow).into_response();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let resp = ZkPayError::Unauthorized.into_response();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(LedgerError::InvalidSpender(Address::NULL).code(), "ZKPAY-0x04");
}

#[test]
fn router_builds_for_both_supply_models() {
    let _ = api::router(ledger(None));
    let _ = api::router(ledger(Some(acct(9))));
}

#[tokio::test]
async fn applied_transfer_is_reported_even_when_commit_fails() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = DeploymentConfig::new("ZkPay", "ZKPAY").with_allocation(acct(1), Amount::new(100)).unwrap();

    let unwritable = dir.path().join("missing").join("ledger.json");
    let l = Arc::new(Ledger::open(&cfg, KeyMaterial::none(), Some(unwritable)).unwrap());
    let req = TransferReq { to: acct(2), amount: Amount::new(40) };
    let Json(out) = api::transfer(State(l.clone()), as_caller(acct(1)), Json(req)).await.unwrap();
    assert_eq!(out["status"], "applied");
    assert_eq!(out["persisted"], false);
    assert_eq!(l.balance_of(&acct(1)), Amount::new(60));
    assert_eq!(l.balance_of(&acct(2)), Amount::new(40));

    let l = Arc::new(Ledger::open(&cfg, KeyMaterial::none(), Some(dir.path().join("ledger.json"))).unwrap());
    let req = TransferReq { to: acct(2), amount: Amount::new(40) };
    let Json(out) = api::transfer(State(l), as_caller(acct(1)), Json(req)).await.unwrap();
    assert_eq!(out["persisted"], true);
}
