use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json as AxumJson, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::error::ZkPayError;
use crate::ledger::{Ledger, SupplyControl};
use crate::types::*;

pub const API_KEY_HEADER: &str = "x-zkpay-key";
pub const CALLER_HEADER: &str = "x-zkpay-caller";

/// Routes for `ledger`. Supply routes exist only when the deployment is elastic.
pub fn router(ledger: Arc<Ledger>) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/token", get(token))
        .route("/balances/:account", get(balance_of))
        .route("/allowances/:owner/:spender", get(allowance_of))
        .route("/transfer", post(transfer))
        .route("/approve", post(approve))
        .route("/transfer_from", post(transfer_from))
        .route("/events", get(events))
        .route("/audit", get(audit));

    if ledger.supply_control().is_some() {
        app = app
            .route("/mint", post(mint))
            .route("/burn", post(burn))
            .route("/burn_from", post(burn_from));
    }

    app.layer(CorsLayer::permissive()).with_state(ledger)
}

fn require_auth(headers: &HeaderMap) -> Result<(), ZkPayError> {
    if let Ok(expected) = std::env::var("ZKPAY_API_KEY") {
        let got = headers.get(API_KEY_HEADER).and_then(|h| h.to_str().ok()).unwrap_or("");
        if got != expected { return Err(ZkPayError::Unauthorized); }
    }
    Ok(())
}

/// Caller identity as vouched for by the hosting environment.
fn caller(headers: &HeaderMap) -> Result<Address, ZkPayError> {
    require_auth(headers)?;
    let raw = headers.get(CALLER_HEADER).and_then(|h| h.to_str().ok()).ok_or(ZkPayError::Unauthorized)?;
    let addr: Address = raw.parse().map_err(|_| ZkPayError::Unauthorized)?;
    if addr.is_null() {
        return Err(ZkPayError::Unauthorized);
    }
    Ok(addr)
}

fn parse_address(raw: &str) -> Result<Address, ZkPayError> {
    raw.parse().map_err(|e: ParseAddressError| ZkPayError::Validation(e.to_string()))
}

fn supply(ledger: &Ledger) -> Result<SupplyControl<'_>, ZkPayError> {
    ledger
        .supply_control()
        .ok_or_else(|| ZkPayError::Unsupported("fixed-supply deployment".into()))
}

fn receipt(record: EventRecord, persisted: bool) -> AxumJson<Value> {
    AxumJson(json!({ "status": "applied", "persisted": persisted, "record": record }))
}

/// Commits after an applied mutation. A failed commit is reported in the receipt, not as an error.
async fn persist(ledger: &Ledger) -> bool {
    match ledger.commit().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Commit failed; mutation applied in memory only");
            false
        }
    }
}

pub async fn health() -> AxumJson<Value> {
    AxumJson(json!({ "ok": true }))
}

pub async fn token(
    State(ledger): State<Arc<Ledger>>,
    headers: HeaderMap,
) -> Result<AxumJson<Value>, ZkPayError> {
    require_auth(&headers)?;
    Ok(AxumJson(json!({
        "name": ledger.name(),
        "symbol": ledger.symbol(),
        "decimals": ledger.decimals(),
        "total_supply": ledger.total_supply(),
        "supply": ledger.supply_model(),
    })))
}

pub async fn balance_of(
    State(ledger): State<Arc<Ledger>>,
    headers: HeaderMap,
    Path(account): Path<String>,
) -> Result<AxumJson<Value>, ZkPayError> {
    require_auth(&headers)?;
    let account = parse_address(&account)?;
    Ok(AxumJson(json!({ "account": account, "balance": ledger.balance_of(&account) })))
}

pub async fn allowance_of(
    State(ledger): State<Arc<Ledger>>,
    headers: HeaderMap,
    Path((owner, spender)): Path<(String, String)>,
) -> Result<AxumJson<Value>, ZkPayError> {
    require_auth(&headers)?;
    let owner = parse_address(&owner)?;
    let spender = parse_address(&spender)?;
    Ok(AxumJson(json!({
        "owner": owner,
        "spender": spender,
        "allowance": ledger.allowance_of(&owner, &spender),
    })))
}

pub async fn transfer(
    State(ledger): State<Arc<Ledger>>,
    headers: HeaderMap,
    AxumJson(req): AxumJson<TransferReq>,
) -> Result<AxumJson<Value>, ZkPayError> {
    let sender = caller(&headers)?;
    let record = ledger.transfer(sender, req.to, req.amount)?;
    let persisted = persist(&ledger).await;
    Ok(receipt(record, persisted))
}

pub async fn approve(
    State(ledger): State<Arc<Ledger>>,
    headers: HeaderMap,
    AxumJson(req): AxumJson<ApproveReq>,
) -> Result<AxumJson<Value>, ZkPayError> {
    let owner = caller(&headers)?;
    let record = ledger.approve(owner, req.spender, req.amount)?;
    let persisted = persist(&ledger).await;
    Ok(receipt(record, persisted))
}

pub async fn transfer_from(
    State(ledger): State<Arc<Ledger>>,
    headers: HeaderMap,
    AxumJson(req): AxumJson<TransferFromReq>,
) -> Result<AxumJson<Value>, ZkPayError> {
    let spender = caller(&headers)?;
    let record = ledger.transfer_from(spender, req.from, req.to, req.amount)?;
    let persisted = persist(&ledger).await;
    Ok(receipt(record, persisted))
}

pub async fn mint(
    State(ledger): State<Arc<Ledger>>,
    headers: HeaderMap,
    AxumJson(req): AxumJson<MintReq>,
) -> Result<AxumJson<Value>, ZkPayError> {
    let who = caller(&headers)?;
    let control = supply(&ledger)?;
    if who != control.minter() {
        return Err(ZkPayError::Unauthorized);
    }
    let record = control.mint(req.to, req.amount)?;
    let persisted = persist(&ledger).await;
    Ok(receipt(record, persisted))
}

pub async fn burn(
    State(ledger): State<Arc<Ledger>>,
    headers: HeaderMap,
    AxumJson(req): AxumJson<BurnReq>,
) -> Result<AxumJson<Value>, ZkPayError> {
    let who = caller(&headers)?;
    let record = supply(&ledger)?.burn(who, req.amount)?;
    let persisted = persist(&ledger).await;
    Ok(receipt(record, persisted))
}

pub async fn burn_from(
    State(ledger): State<Arc<Ledger>>,
    headers: HeaderMap,
    AxumJson(req): AxumJson<BurnFromReq>,
) -> Result<AxumJson<Value>, ZkPayError> {
    let spender = caller(&headers)?;
    let record = supply(&ledger)?.burn_from(spender, req.from, req.amount)?;
    let persisted = persist(&ledger).await;
    Ok(receipt(record, persisted))
}

pub async fn events(
    State(ledger): State<Arc<Ledger>>,
    headers: HeaderMap,
    Query(q): Query<EventsQuery>,
) -> Result<AxumJson<Value>, ZkPayError> {
    require_auth(&headers)?;
    Ok(AxumJson(json!({ "events": ledger.events_after(q.after) })))
}

pub async fn audit(
    State(ledger): State<Arc<Ledger>>,
    headers: HeaderMap,
) -> Result<AxumJson<Value>, ZkPayError> {
    require_auth(&headers)?;
    let report = ledger.audit()?;
    Ok(AxumJson(json!({ "ok": true, "report": report })))
}
