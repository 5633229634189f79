//! Adapter seams between the strategy core and the exchange.
//!
//! The strategy never touches HTTP directly: market data, account access,
//! and offer submission each sit behind a trait so the run orchestrator can
//! be exercised against the in-memory mock exchange.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::exchange::types::{
    BookRow, FundingTicker, FundingTrade, MarketContext, OfferKind, SubmittedOffer, Wallet,
};
use crate::exchange::ExchangeError;

/// Public market-data endpoints for a funding instrument. Any of these may
/// legitimately come back empty on a quiet market.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Raw funding-book snapshot, bids and asks mixed.
    async fn funding_book(&self, symbol: &str) -> Result<Vec<BookRow>, ExchangeError>;

    /// Published floating reference rate, if the venue currently exposes one.
    async fn reference_rate(&self, symbol: &str) -> Result<Option<Decimal>, ExchangeError>;

    /// Consolidated funding ticker.
    async fn funding_ticker(&self, symbol: &str) -> Result<FundingTicker, ExchangeError>;

    /// Most recent matched funding trade, if any trade history exists.
    async fn last_trade(&self, symbol: &str) -> Result<Option<FundingTrade>, ExchangeError>;
}

/// Authenticated account operations scoped to the funding sub-account.
#[async_trait]
pub trait FundingAccount: Send + Sync {
    /// All wallet rows for the account. The response both carries the free
    /// balance and drives wallet-currency alias detection.
    async fn wallets(&self) -> Result<Vec<Wallet>, ExchangeError>;

    /// Best-effort bulk cancellation of open funding offers for an asset.
    async fn cancel_all_offers(&self, asset_code: &str) -> Result<(), ExchangeError>;
}

/// Single offer submission.
#[async_trait]
pub trait OfferSubmitter: Send + Sync {
    /// Submit one funding offer.
    ///
    /// Implementations must try `ctx.preferred_symbol` first and, on any
    /// failure (transport, HTTP, or API-level rejection), retry exactly once
    /// with `ctx.fallback_symbol` before propagating the failure. The retry
    /// covers symbol-alias robustness only; it never fires twice.
    async fn submit_offer(
        &self,
        ctx: &MarketContext,
        amount: Decimal,
        rate: Decimal,
        period_days: u8,
        kind: OfferKind,
        auto_renew: bool,
    ) -> Result<SubmittedOffer, ExchangeError>;
}
