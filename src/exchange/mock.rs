//! In-memory exchange for exercising the run orchestration without a
//! network.
//!
//! Market data and wallet contents are scripted up front; submissions are
//! recorded for assertions. Failure injection covers the error paths the
//! orchestrator must survive: failing market data, failing cancels, and
//! submissions that start failing after N successes.

use super::traits::{FundingAccount, MarketData, OfferSubmitter};
use super::types::*;
use super::ExchangeError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::RwLock;

/// One recorded submission, with the symbol that finally carried it.
#[derive(Debug, Clone, PartialEq)]
pub struct MockSubmission {
    pub symbol: String,
    pub amount: Decimal,
    pub rate: Decimal,
    pub period_days: u8,
    pub kind: OfferKind,
    pub auto_renew: bool,
}

#[derive(Debug, Default)]
struct MockState {
    wallets: Vec<Wallet>,
    book: Vec<BookRow>,
    reference_rate: Option<Decimal>,
    ticker: FundingTicker,
    last_trade: Option<FundingTrade>,

    submitted: Vec<MockSubmission>,
    /// Symbols attempted across all submissions, in order.
    attempted_symbols: Vec<String>,
    cancel_calls: Vec<String>,

    fail_market_data: bool,
    fail_cancel: bool,
    fail_wallets: bool,
    reject_preferred_symbol: bool,
    /// Offer kinds rejected on every symbol (e.g. a venue refusing FRRDELTA).
    reject_kinds: Vec<OfferKind>,
    /// Submissions from this count onward fail on every symbol.
    fail_submissions_after: Option<usize>,

    next_offer_id: i64,
}

/// Scriptable exchange double implementing all three adapter traits.
pub struct MockExchange {
    state: Arc<RwLock<MockState>>,
}

impl Default for MockExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExchange {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MockState {
                next_offer_id: 1,
                ..MockState::default()
            })),
        }
    }

    /// Script a single funding wallet holding `balance` of `currency`.
    pub async fn set_funding_wallet(&self, currency: &str, balance: Decimal) {
        self.state.write().await.wallets = vec![Wallet {
            wallet_type: "funding".to_string(),
            currency: currency.to_uppercase(),
            balance,
        }];
    }

    pub async fn set_book(&self, rows: Vec<BookRow>) {
        self.state.write().await.book = rows;
    }

    pub async fn set_reference_rate(&self, rate: Option<Decimal>) {
        self.state.write().await.reference_rate = rate;
    }

    pub async fn set_ticker(&self, ticker: FundingTicker) {
        self.state.write().await.ticker = ticker;
    }

    pub async fn set_last_trade(&self, trade: Option<FundingTrade>) {
        self.state.write().await.last_trade = trade;
    }

    /// Every market-data call returns a transport-style error.
    pub async fn fail_market_data(&self) {
        self.state.write().await.fail_market_data = true;
    }

    pub async fn fail_cancel(&self) {
        self.state.write().await.fail_cancel = true;
    }

    pub async fn fail_wallets(&self) {
        self.state.write().await.fail_wallets = true;
    }

    /// Reject every attempt on the preferred symbol, forcing the fallback.
    pub async fn reject_preferred_symbol(&self) {
        self.state.write().await.reject_preferred_symbol = true;
    }

    /// Reject every submission of the given offer kind, on both symbols.
    pub async fn reject_kind(&self, kind: OfferKind) {
        self.state.write().await.reject_kinds.push(kind);
    }

    /// Let the first `n` submissions succeed, then fail all later ones.
    pub async fn fail_submissions_after(&self, n: usize) {
        self.state.write().await.fail_submissions_after = Some(n);
    }

    pub async fn submissions(&self) -> Vec<MockSubmission> {
        self.state.read().await.submitted.clone()
    }

    pub async fn attempted_symbols(&self) -> Vec<String> {
        self.state.read().await.attempted_symbols.clone()
    }

    pub async fn cancel_calls(&self) -> Vec<String> {
        self.state.read().await.cancel_calls.clone()
    }
}

#[async_trait]
impl MarketData for MockExchange {
    async fn funding_book(&self, _symbol: &str) -> Result<Vec<BookRow>, ExchangeError> {
        let state = self.state.read().await;
        if state.fail_market_data {
            return Err(ExchangeError::Api {
                status: 500,
                body: "mock book failure".to_string(),
            });
        }
        Ok(state.book.clone())
    }

    async fn reference_rate(&self, _symbol: &str) -> Result<Option<Decimal>, ExchangeError> {
        let state = self.state.read().await;
        if state.fail_market_data {
            return Err(ExchangeError::Api {
                status: 500,
                body: "mock stats failure".to_string(),
            });
        }
        Ok(state.reference_rate)
    }

    async fn funding_ticker(&self, _symbol: &str) -> Result<FundingTicker, ExchangeError> {
        let state = self.state.read().await;
        if state.fail_market_data {
            return Err(ExchangeError::Api {
                status: 500,
                body: "mock ticker failure".to_string(),
            });
        }
        Ok(state.ticker.clone())
    }

    async fn last_trade(&self, _symbol: &str) -> Result<Option<FundingTrade>, ExchangeError> {
        let state = self.state.read().await;
        if state.fail_market_data {
            return Err(ExchangeError::Api {
                status: 500,
                body: "mock trades failure".to_string(),
            });
        }
        Ok(state.last_trade.clone())
    }
}

#[async_trait]
impl FundingAccount for MockExchange {
    async fn wallets(&self) -> Result<Vec<Wallet>, ExchangeError> {
        let state = self.state.read().await;
        if state.fail_wallets {
            return Err(ExchangeError::Api {
                status: 500,
                body: "mock wallets failure".to_string(),
            });
        }
        Ok(state.wallets.clone())
    }

    async fn cancel_all_offers(&self, asset_code: &str) -> Result<(), ExchangeError> {
        let mut state = self.state.write().await;
        state.cancel_calls.push(asset_code.to_string());
        if state.fail_cancel {
            return Err(ExchangeError::Api {
                status: 500,
                body: "mock cancel failure".to_string(),
            });
        }
        Ok(())
    }
}

impl MockExchange {
    /// One raw submission attempt against a specific symbol, mirroring the
    /// real client's per-symbol behavior.
    async fn try_submit(
        &self,
        ctx: &MarketContext,
        symbol: &str,
        amount: Decimal,
        rate: Decimal,
        period_days: u8,
        kind: OfferKind,
        auto_renew: bool,
    ) -> Result<SubmittedOffer, ExchangeError> {
        let mut state = self.state.write().await;
        state.attempted_symbols.push(symbol.to_string());

        if let Some(limit) = state.fail_submissions_after {
            if state.submitted.len() >= limit {
                return Err(ExchangeError::Api {
                    status: 500,
                    body: "mock submission failure".to_string(),
                });
            }
        }
        if state.reject_preferred_symbol && symbol == ctx.preferred_symbol {
            return Err(ExchangeError::Rejected("symbol: invalid".to_string()));
        }
        if state.reject_kinds.contains(&kind) {
            return Err(ExchangeError::Rejected(format!(
                "type: {} not accepted",
                kind.as_wire()
            )));
        }

        state.submitted.push(MockSubmission {
            symbol: symbol.to_string(),
            amount,
            rate,
            period_days,
            kind,
            auto_renew,
        });
        let id = state.next_offer_id;
        state.next_offer_id += 1;
        Ok(SubmittedOffer {
            offer_id: Some(id),
            status: Some("SUCCESS".to_string()),
            text: None,
        })
    }
}

#[async_trait]
impl OfferSubmitter for MockExchange {
    async fn submit_offer(
        &self,
        ctx: &MarketContext,
        amount: Decimal,
        rate: Decimal,
        period_days: u8,
        kind: OfferKind,
        auto_renew: bool,
    ) -> Result<SubmittedOffer, ExchangeError> {
        match self
            .try_submit(ctx, &ctx.preferred_symbol, amount, rate, period_days, kind, auto_renew)
            .await
        {
            Ok(ack) => Ok(ack),
            Err(_) => {
                self.try_submit(ctx, &ctx.fallback_symbol, amount, rate, period_days, kind, auto_renew)
                    .await
            }
        }
    }
}
