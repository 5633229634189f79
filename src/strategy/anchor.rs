//! Rate anchoring: derive one usable daily rate from partially-unreliable
//! public market signals.
//!
//! Every signal is fetched once into a [`MarketSnapshot`], each degrading to
//! absent on any transport or shape error. Resolution itself is pure, so the
//! precedence rules are testable without a network.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::exchange::{best_bid_ask, FundingTicker, MarketData};

/// Fallback daily rate when no market signal is available at all:
/// 2 bps/day, conservative enough to fill eventually.
pub const CONSERVATIVE_FLOOR: Decimal = dec!(0.0002);

const MID_WEIGHT: Decimal = dec!(0.7);
const LAST_WEIGHT: Decimal = dec!(0.3);

/// Anchor derivation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnchorStrategy {
    /// Published reference rate, then book midpoint, then a single book
    /// side, then [`CONSERVATIVE_FLOOR`]. Total: always yields a positive
    /// rate.
    #[default]
    ReferenceChain,
    /// Weighted blend of ticker midpoint and last traded rate. Refuses to
    /// guess: with no usable ticker data the run aborts.
    BlendMidLast,
    /// Most recent matched trade's rate, falling back to the full
    /// reference chain when there is no trade history.
    LastTrade,
}

/// One-per-run snapshot of every signal the resolver may consult.
#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot {
    pub reference_rate: Option<Decimal>,
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub ticker: FundingTicker,
    pub last_trade_rate: Option<Decimal>,
}

impl MarketSnapshot {
    /// Fetch all signals for `symbol`, logging and absorbing each failure.
    pub async fn gather(market: &dyn MarketData, symbol: &str) -> Self {
        let reference_rate = match market.reference_rate(symbol).await {
            Ok(rate) => rate,
            Err(e) => {
                warn!(%symbol, error = %e, "Reference-rate fetch failed");
                None
            }
        };

        let (best_bid, best_ask) = match market.funding_book(symbol).await {
            Ok(rows) => best_bid_ask(&rows),
            Err(e) => {
                warn!(%symbol, error = %e, "Funding-book fetch failed");
                (None, None)
            }
        };

        let ticker = match market.funding_ticker(symbol).await {
            Ok(t) => t,
            Err(e) => {
                warn!(%symbol, error = %e, "Ticker fetch failed");
                FundingTicker::default()
            }
        };

        let last_trade_rate = match market.last_trade(symbol).await {
            Ok(trade) => trade.map(|t| t.rate),
            Err(e) => {
                warn!(%symbol, error = %e, "Trade-history fetch failed");
                None
            }
        };

        Self {
            reference_rate,
            best_bid,
            best_ask,
            ticker,
            last_trade_rate,
        }
    }
}

/// Raised only by [`AnchorStrategy::BlendMidLast`], which aborts the run
/// rather than lend against a guessed rate.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("no market data available to anchor against")]
pub struct AnchorUnavailable;

/// Resolve the snapshot into one daily anchor rate.
pub fn resolve_anchor(
    strategy: AnchorStrategy,
    snapshot: &MarketSnapshot,
) -> Result<Decimal, AnchorUnavailable> {
    match strategy {
        AnchorStrategy::ReferenceChain => Ok(reference_chain(snapshot)),
        AnchorStrategy::BlendMidLast => blend_mid_last(snapshot),
        AnchorStrategy::LastTrade => Ok(last_trade(snapshot)),
    }
}

fn positive(rate: Option<Decimal>) -> Option<Decimal> {
    rate.filter(|r| *r > Decimal::ZERO)
}

fn reference_chain(snapshot: &MarketSnapshot) -> Decimal {
    if let Some(frr) = positive(snapshot.reference_rate) {
        return frr;
    }

    let bid = positive(snapshot.best_bid);
    let ask = positive(snapshot.best_ask);
    match (bid, ask) {
        (Some(b), Some(a)) => (b + a) / dec!(2),
        (Some(b), None) => b,
        (None, Some(a)) => a,
        (None, None) => CONSERVATIVE_FLOOR,
    }
}

fn blend_mid_last(snapshot: &MarketSnapshot) -> Result<Decimal, AnchorUnavailable> {
    let bid = positive(snapshot.ticker.bid);
    let ask = positive(snapshot.ticker.ask);
    let mid = match (bid, ask) {
        (Some(b), Some(a)) => Some((b + a) / dec!(2)),
        (Some(b), None) => Some(b),
        (None, Some(a)) => Some(a),
        (None, None) => None,
    };
    let last = positive(snapshot.ticker.last_price);

    match (mid, last) {
        (Some(m), Some(l)) => Ok(MID_WEIGHT * m + LAST_WEIGHT * l),
        (Some(m), None) => Ok(m),
        (None, Some(l)) => Ok(l),
        (None, None) => Err(AnchorUnavailable),
    }
}

fn last_trade(snapshot: &MarketSnapshot) -> Decimal {
    positive(snapshot.last_trade_rate).unwrap_or_else(|| reference_chain(snapshot))
}
