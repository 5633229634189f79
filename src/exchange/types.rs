//! Type definitions for Bitfinex v2 API payloads.
//!
//! The v2 API returns positional JSON arrays rather than objects. Every
//! decoder here takes a `serde_json::Value` and treats a missing or malformed
//! field as absent, so a schema hiccup degrades to "no data" instead of
//! failing the run.

use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashSet;

/// Protocol flag bit for auto-renewing funding offers.
pub const FLAG_AUTO_RENEW: u32 = 1024;

/// Decode a JSON value into a `Decimal`, accepting numbers or numeric strings.
pub(crate) fn value_to_decimal(v: &Value) -> Option<Decimal> {
    match v {
        Value::Number(n) => n.to_string().parse().ok(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn value_to_i64(v: &Value) -> Option<i64> {
    v.as_i64()
}

/// Funding offer kind, mapped to the v2 `type` field on submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferKind {
    /// Rate field is an offset against the floating reference rate; the offer
    /// re-prices as the reference moves.
    FrrDelta,
    /// Absolute daily rate, resting until matched or canceled.
    Limit,
}

impl OfferKind {
    pub fn as_wire(&self) -> &'static str {
        match self {
            OfferKind::FrrDelta => "FRRDELTA",
            OfferKind::Limit => "LIMIT",
        }
    }
}

/// One wallet row from `v2/auth/r/wallets`:
/// `[WALLET_TYPE, CURRENCY, BALANCE, UNSETTLED_INTEREST, AVAILABLE_BALANCE, ...]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Wallet {
    pub wallet_type: String,
    pub currency: String,
    pub balance: Decimal,
}

impl Wallet {
    /// Decode one row. Rows shorter than five fields are rejected.
    pub fn from_row(row: &Value) -> Option<Self> {
        let arr = row.as_array()?;
        if arr.len() < 5 {
            return None;
        }
        Some(Self {
            wallet_type: arr[0].as_str()?.to_lowercase(),
            currency: arr[1].as_str()?.to_uppercase(),
            balance: value_to_decimal(&arr[2])?,
        })
    }
}

/// Free balance of an asset in the funding sub-wallet: the maximum balance
/// across matching rows, zero when none match.
pub fn free_funding_balance(wallets: &[Wallet], asset_code: &str) -> Decimal {
    wallets
        .iter()
        .filter(|w| w.wallet_type == "funding" && w.currency == asset_code)
        .map(|w| w.balance)
        .max()
        .unwrap_or(Decimal::ZERO)
        .max(Decimal::ZERO)
}

/// Run-scoped market identifiers, resolved once per run and threaded as a
/// parameter.
///
/// The exchange lists the same stablecoin under two aliases: wallets may
/// report `UST` while the public funding market answers on `fUSDT`.
/// Submissions try the preferred symbol first and fall back once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketContext {
    /// Wallet currency code scoping balance reads and bulk cancels.
    pub asset_code: String,
    /// Symbol used for all public market-data endpoints.
    pub public_symbol: String,
    /// Symbol tried first on offer submission.
    pub preferred_symbol: String,
    /// Symbol retried once when the preferred submission fails.
    pub fallback_symbol: String,
}

impl MarketContext {
    /// Detect the wallet currency alias from the account's wallet rows,
    /// preferring `USDT` when both aliases appear.
    pub fn detect(wallets: &[Wallet]) -> Self {
        let seen: HashSet<&str> = wallets.iter().map(|w| w.currency.as_str()).collect();
        let asset = if seen.contains("USDT") {
            "USDT"
        } else if seen.contains("UST") {
            "UST"
        } else {
            "USDT"
        };
        Self::for_asset(asset)
    }

    pub fn for_asset(asset_code: &str) -> Self {
        Self {
            asset_code: asset_code.to_string(),
            public_symbol: "fUSDT".to_string(),
            preferred_symbol: "fUSDT".to_string(),
            fallback_symbol: "fUST".to_string(),
        }
    }
}

/// One `R0` funding-book row carrying a rate and a signed size: positive
/// size is a bid, negative size is an ask.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BookRow {
    pub rate: Decimal,
    pub amount: Decimal,
}

impl BookRow {
    /// Decode one row, reading rate and signed amount positionally.
    ///
    /// The exact field layout of R0 funding rows is an external-protocol
    /// detail; this is the only place it is interpreted.
    pub fn from_row(row: &Value) -> Option<Self> {
        let arr = row.as_array()?;
        if arr.len() < 4 {
            return None;
        }
        Some(Self {
            rate: value_to_decimal(&arr[1])?,
            amount: value_to_decimal(&arr[2])?,
        })
    }

    pub fn is_bid(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    pub fn is_ask(&self) -> bool {
        self.amount < Decimal::ZERO
    }
}

/// Best bid (maximum rate among bids) and best ask (minimum rate among asks)
/// of a funding book. A side with no rows yields `None`.
pub fn best_bid_ask(rows: &[BookRow]) -> (Option<Decimal>, Option<Decimal>) {
    let best_bid = rows.iter().filter(|r| r.is_bid()).map(|r| r.rate).max();
    let best_ask = rows.iter().filter(|r| r.is_ask()).map(|r| r.rate).min();
    (best_bid, best_ask)
}

/// Extract the published floating reference rate from
/// `v2/funding/stats/{symbol}/last`.
///
/// Deployments disagree on the shape: `[MTS, FRR]`, `[FRR]`, or a bare
/// scalar all occur. Non-positive values are treated as absent.
pub fn reference_rate_from_payload(payload: &Value) -> Option<Decimal> {
    let rate = match payload {
        Value::Array(arr) if arr.len() >= 2 => value_to_decimal(&arr[1]),
        Value::Array(arr) if arr.len() == 1 => value_to_decimal(&arr[0]),
        other => value_to_decimal(other),
    };
    rate.filter(|r| *r > Decimal::ZERO)
}

/// Consolidated funding ticker:
/// `[FRR, BID, BID_PERIOD, BID_SIZE, ASK, ASK_PERIOD, ASK_SIZE,
///   DAILY_CHANGE, DAILY_CHANGE_REL, LAST_PRICE, VOLUME, HIGH, LOW]`.
///
/// Only the fields the anchor resolver consumes are kept; each is optional
/// since the exchange nulls them out on quiet markets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FundingTicker {
    pub frr: Option<Decimal>,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub last_price: Option<Decimal>,
}

impl FundingTicker {
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let arr = payload.as_array()?;
        if arr.len() < 10 {
            return None;
        }
        Some(Self {
            frr: value_to_decimal(&arr[0]),
            bid: value_to_decimal(&arr[1]),
            ask: value_to_decimal(&arr[4]),
            last_price: value_to_decimal(&arr[9]),
        })
    }
}

/// One matched funding trade: `[ID, MTS, AMOUNT, RATE, PERIOD]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FundingTrade {
    pub id: i64,
    pub mts: i64,
    pub amount: Decimal,
    pub rate: Decimal,
    pub period: i64,
}

impl FundingTrade {
    pub fn from_row(row: &Value) -> Option<Self> {
        let arr = row.as_array()?;
        if arr.len() < 5 {
            return None;
        }
        Some(Self {
            id: value_to_i64(&arr[0])?,
            mts: value_to_i64(&arr[1])?,
            amount: value_to_decimal(&arr[2])?,
            rate: value_to_decimal(&arr[3])?,
            period: value_to_i64(&arr[4])?,
        })
    }
}

/// Acknowledgement for a submitted offer, pulled out of the v2 notification
/// envelope `[MTS, TYPE, MESSAGE_ID, null, [OFFER...], CODE, STATUS, TEXT]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmittedOffer {
    pub offer_id: Option<i64>,
    pub status: Option<String>,
    pub text: Option<String>,
}

impl SubmittedOffer {
    pub fn from_notification(payload: &Value) -> Self {
        let arr = match payload.as_array() {
            Some(a) => a,
            None => return Self::default(),
        };
        let offer_id = arr
            .get(4)
            .and_then(|o| o.as_array())
            .and_then(|o| o.first())
            .and_then(value_to_i64);
        Self {
            offer_id,
            status: arr.get(6).and_then(|s| s.as_str()).map(str::to_string),
            text: arr.get(7).and_then(|s| s.as_str()).map(str::to_string),
        }
    }

    /// The exchange answers 200 even for rejected submissions; the
    /// notification status carries the real outcome.
    pub fn is_rejected(&self) -> bool {
        matches!(self.status.as_deref(), Some("ERROR"))
    }
}
