//! Offer-placement strategy.
//!
//! Contains the core logic for:
//! - Rate anchoring from public market signals
//! - Balance laddering into discrete offer intents
//! - Driving one full placement run against the exchange

mod anchor;
mod executor;
mod planner;

pub use anchor::{resolve_anchor, AnchorStrategy, AnchorUnavailable, MarketSnapshot};
pub use executor::{run_once, RunOutcome, RunReport};
pub use planner::{LadderPlan, LadderPlanner, OfferIntent};
