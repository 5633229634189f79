//! Balance laddering: turn (balance, anchor) into an ordered sequence of
//! offer intents.
//!
//! Planning is pure. Three phases share the chunking rules:
//! - the primary ladder sweeps the balance across round-robin rate offsets,
//! - the optional maker leg rests chunks just inside the best bid,
//! - the final sweep covers whatever remainder the chunk size left behind.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info};

use crate::config::{LadderConfig, MakerConfig, OfferConfig};
use crate::exchange::OfferKind;
use crate::utils::decimal::{apy_display, daily_to_apy, floor_rate};

/// One planned unit of deployment. Immutable once created; a failed
/// submission is never retried.
#[derive(Debug, Clone, PartialEq)]
pub struct OfferIntent {
    pub amount: Decimal,
    /// Absolute daily rate for `Limit` offers; effective rate for
    /// `FrrDelta` offers (zero marks a pure reference-tracking order).
    pub rate: Decimal,
    pub period_days: u8,
    pub kind: OfferKind,
    pub auto_renew: bool,
}

/// Intents for one phase plus the balance they leave unallocated.
#[derive(Debug, Clone, PartialEq)]
pub struct LadderPlan {
    pub intents: Vec<OfferIntent>,
    pub leftover: Decimal,
}

impl LadderPlan {
    fn untouched(balance: Decimal) -> Self {
        Self {
            intents: Vec::new(),
            leftover: balance,
        }
    }
}

/// Pure allocation planner over the offer, ladder, and maker configuration.
pub struct LadderPlanner {
    offer: OfferConfig,
    ladder: LadderConfig,
    maker: MakerConfig,
}

impl LadderPlanner {
    pub fn new(offer: OfferConfig, ladder: LadderConfig, maker: MakerConfig) -> Self {
        Self {
            offer,
            ladder,
            maker,
        }
    }

    /// Sweep the balance across the ladder, one chunk per offset,
    /// round-robin, until the remainder drops below the minimum order size.
    pub fn plan_primary(&self, balance: Decimal, anchor: Decimal) -> LadderPlan {
        let offsets = self.effective_offsets(anchor);

        let mut intents = Vec::new();
        let mut remaining = balance;
        let mut chunk_idx = 0usize;

        while remaining >= self.offer.min_offer {
            let amount = self.offer.chunk_size.min(remaining);
            if amount < self.offer.min_offer {
                break;
            }
            let offset = offsets[chunk_idx % offsets.len()];
            let rate = floor_rate(anchor + offset, self.ladder.rate_floor);

            debug!(
                chunk = chunk_idx + 1,
                %amount,
                %offset,
                %rate,
                apy = %apy_display(daily_to_apy(rate)),
                "Planned ladder chunk"
            );

            intents.push(OfferIntent {
                amount,
                rate,
                period_days: self.offer.duration_days,
                kind: OfferKind::FrrDelta,
                auto_renew: self.offer.auto_renew,
            });
            remaining -= amount;
            chunk_idx += 1;
        }

        LadderPlan {
            intents,
            leftover: remaining,
        }
    }

    /// Ladder offsets after the low-yield guard: when the anchor's
    /// compounded APY sits under the configured percent threshold, collapse
    /// to a single zero offset — capital still deploys, just on-reference.
    fn effective_offsets(&self, anchor: Decimal) -> Vec<Decimal> {
        let guard = self.ladder.min_apy_guard;
        if guard <= Decimal::ZERO {
            return self.ladder.offsets.clone();
        }
        let apy = daily_to_apy(anchor);
        if apy * dec!(100) < guard {
            info!(
                anchor_apy = %apy_display(apy),
                guard_pct = %guard,
                "Low-yield environment, collapsing ladder to zero offset"
            );
            vec![Decimal::ZERO]
        } else {
            self.ladder.offsets.clone()
        }
    }

    /// Rest additional chunks just inside the best bid to improve fill odds.
    ///
    /// Capped both by the configured per-run maximum and by how many whole
    /// chunks the remainder holds.
    pub fn plan_maker(
        &self,
        remaining: Decimal,
        best_bid: Option<Decimal>,
        anchor: Decimal,
    ) -> LadderPlan {
        if !self.maker.enabled || remaining < self.offer.min_offer {
            return LadderPlan::untouched(remaining);
        }

        let whole_chunks = (remaining / self.offer.chunk_size)
            .floor()
            .to_u32()
            .unwrap_or(0);
        let max_chunks = self.maker.max_chunks_per_run.min(whole_chunks);
        if max_chunks == 0 {
            return LadderPlan::untouched(remaining);
        }

        let rate = match best_bid {
            Some(bid) => floor_rate(bid - self.maker.epsilon, self.ladder.rate_floor),
            None => floor_rate(anchor, self.ladder.rate_floor),
        };

        let mut intents = Vec::new();
        let mut remaining = remaining;
        for _ in 0..max_chunks {
            if remaining < self.offer.min_offer {
                break;
            }
            let amount = self.offer.chunk_size.min(remaining);
            if amount < self.offer.min_offer {
                break;
            }
            intents.push(OfferIntent {
                amount,
                rate,
                period_days: self.offer.duration_days,
                kind: OfferKind::Limit,
                auto_renew: self.offer.auto_renew,
            });
            remaining -= amount;
        }

        LadderPlan {
            intents,
            leftover: remaining,
        }
    }

    /// One catch-all reference-tracking offer for the whole remainder, so
    /// chunk-size rounding never strands eligible balance.
    pub fn plan_sweep(&self, remaining: Decimal) -> Option<OfferIntent> {
        if remaining <= Decimal::ZERO {
            return None;
        }
        Some(OfferIntent {
            amount: remaining,
            rate: Decimal::ZERO,
            period_days: self.offer.duration_days,
            kind: OfferKind::FrrDelta,
            auto_renew: self.offer.auto_renew,
        })
    }
}
