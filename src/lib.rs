//! # Funding Lender
//!
//! An automated funding-offer placement tool for the Bitfinex peer-to-peer
//! margin-funding market. Each run cancels stale offers, derives a reference
//! daily rate from public market data, and ladders the available balance
//! into a sequence of offers balancing yield against fill probability.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `exchange`: Bitfinex v2 REST client, wire types, and adapter traits
//! - `strategy`: Rate anchoring, balance laddering, and run orchestration
//! - `utils`: Shared decimal arithmetic helpers

pub mod config;
pub mod exchange;
pub mod strategy;
pub mod utils;

pub use config::Config;
