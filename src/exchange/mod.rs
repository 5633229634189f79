//! Bitfinex exchange integration.
//!
//! REST connectivity for:
//! - Public funding market data (order book, reference rate, ticker, trades)
//! - Account operations (wallets, bulk cancel, offer submission)
//!
//! The strategy core consumes the `MarketData`, `FundingAccount`, and
//! `OfferSubmitter` traits; `BitfinexClient` is the live implementation and
//! `MockExchange` the in-memory one.

mod client;
pub mod mock;
mod traits;
mod types;

pub use client::BitfinexClient;
pub use mock::MockExchange;
pub use traits::*;
pub use types::*;

use thiserror::Error;

/// Error taxonomy for exchange adapter calls.
///
/// Call sites decide recovery: market-data and cancel failures degrade to
/// safe defaults, submission failures fail the current allocation phase
/// fast, and missing credentials abort before any request goes out.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("missing API credentials: set BFX_KEY and BFX_SEC")]
    MissingCredentials,

    /// Transport-level failure, including timeouts.
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx HTTP response.
    #[error("api error ({status}): {body}")]
    Api { status: u16, body: String },

    /// 2xx response whose notification envelope carries an ERROR status.
    #[error("offer rejected: {0}")]
    Rejected(String),

    /// Response parsed but did not have the expected layout.
    #[error("unexpected response shape: {0}")]
    Shape(String),
}
