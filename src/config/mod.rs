//! Configuration management for the funding lender.
//!
//! Loads settings from environment variables and config files.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::strategy::AnchorStrategy;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Bitfinex API credentials
    #[serde(default)]
    pub bitfinex: BitfinexConfig,
    /// Offer sizing and lifecycle settings
    #[serde(default)]
    pub offer: OfferConfig,
    /// Rate laddering parameters
    #[serde(default)]
    pub ladder: LadderConfig,
    /// Maker-leg parameters
    #[serde(default)]
    pub maker: MakerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BitfinexConfig {
    /// API key for authentication
    #[serde(default)]
    pub api_key: String,
    /// Secret key for signing requests
    #[serde(default)]
    pub api_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferConfig {
    /// Hard floor below which no order is placed
    #[serde(default = "default_min_offer")]
    pub min_offer: Decimal,
    /// Per-order deployment unit
    #[serde(default = "default_chunk_size")]
    pub chunk_size: Decimal,
    /// Loan duration in days (the venue accepts 2-120)
    #[serde(default = "default_duration_days")]
    pub duration_days: u8,
    /// Whether offers renew themselves when matched funding returns
    #[serde(default = "default_auto_renew")]
    pub auto_renew: bool,
    /// Balance still idle after the final sweep that warrants a warning
    #[serde(default = "default_idle_warn_threshold")]
    pub idle_warn_threshold: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LadderConfig {
    /// Ordered additive offsets (daily-rate deltas) applied round-robin
    #[serde(default = "default_offsets")]
    pub offsets: Vec<Decimal>,
    /// Percent APY below which the ladder collapses to a single zero offset
    /// (0 disables the guard)
    #[serde(default)]
    pub min_apy_guard: Decimal,
    /// Strictly positive floor applied to every computed fixed rate
    #[serde(default = "default_rate_floor")]
    pub rate_floor: Decimal,
    /// How the reference daily rate is derived from market data
    #[serde(default)]
    pub anchor_strategy: AnchorStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MakerConfig {
    /// Whether to place maker legs near the best bid after the primary ladder
    #[serde(default = "default_maker_enabled")]
    pub enabled: bool,
    /// Maximum maker chunks placed per run
    #[serde(default = "default_maker_max_chunks")]
    pub max_chunks_per_run: u32,
    /// How far inside the best bid maker legs rest
    #[serde(default = "default_maker_epsilon")]
    pub epsilon: Decimal,
}

// Default value functions

fn default_min_offer() -> Decimal {
    Decimal::new(150, 0)
}

fn default_chunk_size() -> Decimal {
    Decimal::new(500, 0)
}

fn default_duration_days() -> u8 {
    2
}

fn default_auto_renew() -> bool {
    true
}

fn default_idle_warn_threshold() -> Decimal {
    Decimal::new(200, 0)
}

fn default_offsets() -> Vec<Decimal> {
    // bps/day spread: on-reference plus four progressively richer asks
    vec![
        Decimal::ZERO,
        Decimal::new(2, 4),  // 0.0002
        Decimal::new(5, 4),  // 0.0005
        Decimal::new(8, 4),  // 0.0008
        Decimal::new(12, 4), // 0.0012
    ]
}

fn default_rate_floor() -> Decimal {
    Decimal::new(1, 6) // 0.000001
}

fn default_maker_enabled() -> bool {
    true
}

fn default_maker_max_chunks() -> u32 {
    6
}

fn default_maker_epsilon() -> Decimal {
    Decimal::new(1, 5) // 0.00001
}

impl Config {
    /// Load configuration from environment variables and config files.
    ///
    /// Credentials come from `BFX_KEY`/`BFX_SEC` when not set through the
    /// config file or `LENDER__`-prefixed environment.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("LENDER"))
            .build()
            .context("Failed to build configuration")?;

        let mut config: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        if config.bitfinex.api_key.is_empty() {
            if let Ok(key) = std::env::var("BFX_KEY") {
                config.bitfinex.api_key = key;
            }
        }
        if config.bitfinex.api_secret.is_empty() {
            if let Ok(secret) = std::env::var("BFX_SEC") {
                config.bitfinex.api_secret = secret;
            }
        }

        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.offer.min_offer > Decimal::ZERO,
            "min_offer must be positive"
        );

        anyhow::ensure!(
            self.offer.chunk_size >= self.offer.min_offer,
            "chunk_size must be at least min_offer"
        );

        anyhow::ensure!(
            (2..=120).contains(&self.offer.duration_days),
            "duration_days must be between 2 and 120"
        );

        anyhow::ensure!(
            !self.ladder.offsets.is_empty(),
            "ladder offsets must not be empty"
        );

        anyhow::ensure!(
            self.ladder.rate_floor > Decimal::ZERO,
            "rate_floor must be strictly positive"
        );

        anyhow::ensure!(
            self.ladder.min_apy_guard >= Decimal::ZERO,
            "min_apy_guard must not be negative"
        );

        anyhow::ensure!(
            self.maker.epsilon > Decimal::ZERO,
            "maker epsilon must be strictly positive"
        );

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bitfinex: BitfinexConfig::default(),
            offer: OfferConfig::default(),
            ladder: LadderConfig::default(),
            maker: MakerConfig::default(),
        }
    }
}

impl Default for OfferConfig {
    fn default() -> Self {
        Self {
            min_offer: default_min_offer(),
            chunk_size: default_chunk_size(),
            duration_days: default_duration_days(),
            auto_renew: default_auto_renew(),
            idle_warn_threshold: default_idle_warn_threshold(),
        }
    }
}

impl Default for LadderConfig {
    fn default() -> Self {
        Self {
            offsets: default_offsets(),
            min_apy_guard: Decimal::ZERO,
            rate_floor: default_rate_floor(),
            anchor_strategy: AnchorStrategy::default(),
        }
    }
}

impl Default for MakerConfig {
    fn default() -> Self {
        Self {
            enabled: default_maker_enabled(),
            max_chunks_per_run: default_maker_max_chunks(),
            epsilon: default_maker_epsilon(),
        }
    }
}
