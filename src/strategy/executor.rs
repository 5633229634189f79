//! Single-run orchestration: cancel stale offers, read the balance, resolve
//! the anchor, then deploy through the primary ladder, the maker leg, and
//! the final sweep.
//!
//! The remaining balance is the only mutable state, threaded explicitly
//! from phase to phase. A failed submission aborts its phase immediately
//! (no retry of the same chunk, no skipping ahead) so a misbehaving API is
//! never hammered in a loop; later phases still run against whatever is
//! left.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::exchange::{
    free_funding_balance, FundingAccount, MarketContext, MarketData, OfferSubmitter,
};
use crate::strategy::anchor::{resolve_anchor, MarketSnapshot};
use crate::strategy::planner::{LadderPlanner, OfferIntent};
use crate::utils::decimal::{apy_display, daily_to_apy};

/// What one run did.
#[derive(Debug)]
pub enum RunOutcome {
    /// Free balance was below the minimum order size; nothing was submitted.
    NothingToDeploy { free_balance: Decimal },
    Completed(RunReport),
}

#[derive(Debug)]
pub struct RunReport {
    pub context: MarketContext,
    pub anchor: Decimal,
    pub free_balance: Decimal,
    /// Intents actually accepted by the exchange, in submission order.
    pub submitted: Vec<OfferIntent>,
    /// Balance left unsubmitted after all phases.
    pub leftover: Decimal,
    pub idle_warning: bool,
}

/// Execute one full placement run against the exchange.
pub async fn run_once<E>(exchange: &E, config: &Config) -> Result<RunOutcome>
where
    E: MarketData + FundingAccount + OfferSubmitter,
{
    // Resolve the market context once; without wallet data the USDT alias
    // is assumed.
    let wallets = match exchange.wallets().await {
        Ok(rows) => rows,
        Err(e) => {
            warn!(error = %e, "Wallet fetch failed, assuming USDT alias and zero balance");
            Vec::new()
        }
    };
    let ctx = MarketContext::detect(&wallets);
    info!(
        asset = %ctx.asset_code,
        public_symbol = %ctx.public_symbol,
        "Resolved market context"
    );

    // Stale offers from the previous run would double-commit the balance.
    // Best effort: a failed cancel is logged, never fatal.
    match exchange.cancel_all_offers(&ctx.asset_code).await {
        Ok(()) => info!(asset = %ctx.asset_code, "Canceled open funding offers"),
        Err(e) => warn!(error = %e, "Cancel-all failed, continuing"),
    }

    let free_balance = free_funding_balance(&wallets, &ctx.asset_code);
    info!(asset = %ctx.asset_code, balance = %free_balance, "Free funding balance");

    if free_balance < config.offer.min_offer {
        info!(
            balance = %free_balance,
            min_offer = %config.offer.min_offer,
            "Nothing to lend (below minimum offer)"
        );
        return Ok(RunOutcome::NothingToDeploy { free_balance });
    }

    let snapshot = MarketSnapshot::gather(exchange, &ctx.public_symbol).await;
    if let Some(bid) = snapshot.best_bid {
        info!(best_bid = %bid, apy = %apy_display(daily_to_apy(bid)), "Best bid/day");
    }
    if let Some(ask) = snapshot.best_ask {
        info!(best_ask = %ask, apy = %apy_display(daily_to_apy(ask)), "Best ask/day");
    }

    let anchor = resolve_anchor(config.ladder.anchor_strategy, &snapshot)
        .context("anchor resolution failed")?;
    info!(
        %anchor,
        apy = %apy_display(daily_to_apy(anchor)),
        strategy = ?config.ladder.anchor_strategy,
        "Resolved anchor rate"
    );

    let planner = LadderPlanner::new(
        config.offer.clone(),
        config.ladder.clone(),
        config.maker.clone(),
    );

    let mut remaining = free_balance;
    let mut submitted = Vec::new();

    // Phase 1: primary ladder
    let primary = planner.plan_primary(remaining, anchor);
    submit_phase(
        exchange,
        &ctx,
        "ladder",
        &primary.intents,
        &mut remaining,
        &mut submitted,
    )
    .await;

    // Phase 2: maker leg, planned against whatever actually remains
    let maker = planner.plan_maker(remaining, snapshot.best_bid, anchor);
    submit_phase(
        exchange,
        &ctx,
        "maker",
        &maker.intents,
        &mut remaining,
        &mut submitted,
    )
    .await;

    // Phase 3: final sweep
    if let Some(sweep) = planner.plan_sweep(remaining) {
        match submit_intent(exchange, &ctx, &sweep).await {
            Ok(()) => {
                info!(amount = %sweep.amount, "Final sweep offer placed at reference rate");
                remaining -= sweep.amount;
                submitted.push(sweep);
            }
            Err(e) => error!(amount = %sweep.amount, error = %e, "Final sweep failed"),
        }
    }

    let idle_warning = remaining >= config.offer.idle_warn_threshold;
    if idle_warning {
        warn!(
            idle = %remaining,
            threshold = %config.offer.idle_warn_threshold,
            "Balance still idle after sweep; consider more maker chunks or a lower APY guard"
        );
    }

    Ok(RunOutcome::Completed(RunReport {
        context: ctx,
        anchor,
        free_balance,
        submitted,
        leftover: remaining,
        idle_warning,
    }))
}

/// Submit one phase's intents in order, fail-fast: the first failure aborts
/// the rest of the phase and leaves their balance for the next phase.
async fn submit_phase<E: OfferSubmitter>(
    exchange: &E,
    ctx: &MarketContext,
    phase: &str,
    intents: &[OfferIntent],
    remaining: &mut Decimal,
    submitted: &mut Vec<OfferIntent>,
) {
    for (i, intent) in intents.iter().enumerate() {
        match submit_intent(exchange, ctx, intent).await {
            Ok(()) => {
                info!(
                    phase,
                    chunk = i + 1,
                    amount = %intent.amount,
                    rate = %intent.rate,
                    apy = %apy_display(daily_to_apy(intent.rate)),
                    "Offer placed"
                );
                *remaining -= intent.amount;
                submitted.push(intent.clone());
            }
            Err(e) => {
                error!(
                    phase,
                    chunk = i + 1,
                    amount = %intent.amount,
                    rate = %intent.rate,
                    error = %e,
                    "Offer submission failed, aborting phase"
                );
                break;
            }
        }
    }
}

async fn submit_intent<E: OfferSubmitter>(
    exchange: &E,
    ctx: &MarketContext,
    intent: &OfferIntent,
) -> Result<()> {
    let ack = exchange
        .submit_offer(
            ctx,
            intent.amount,
            intent.rate,
            intent.period_days,
            intent.kind,
            intent.auto_renew,
        )
        .await?;
    if let Some(id) = ack.offer_id {
        info!(offer_id = id, "Offer acknowledged");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::exchange::{BookRow, MockExchange, OfferKind};
    use crate::strategy::anchor::AnchorStrategy;
    use rust_decimal_macros::dec;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.ladder.offsets = vec![Decimal::ZERO, dec!(0.0002)];
        config
    }

    async fn seeded_mock(balance: Decimal) -> MockExchange {
        let mock = MockExchange::new();
        mock.set_funding_wallet("USDT", balance).await;
        mock.set_reference_rate(Some(dec!(0.0003))).await;
        mock.set_book(vec![
            BookRow {
                rate: dec!(0.00028),
                amount: dec!(10000),
            },
            BookRow {
                rate: dec!(0.00034),
                amount: dec!(-8000),
            },
        ])
        .await;
        mock
    }

    fn completed(outcome: RunOutcome) -> RunReport {
        match outcome {
            RunOutcome::Completed(report) => report,
            other => panic!("expected completed run, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_full_run_deploys_everything() {
        let mock = seeded_mock(dec!(1620)).await;
        let config = test_config();

        let report = completed(run_once(&mock, &config).await.unwrap());

        // 3 ladder chunks of 500 plus a 120 sweep
        let subs = mock.submissions().await;
        assert_eq!(subs.len(), 4);
        assert_eq!(subs[0].amount, dec!(500));
        assert_eq!(subs[0].rate, dec!(0.0003));
        assert_eq!(subs[1].rate, dec!(0.0005));
        assert_eq!(subs[2].rate, dec!(0.0003));
        assert_eq!(subs[3].amount, dec!(120));
        assert_eq!(subs[3].rate, Decimal::ZERO);

        assert_eq!(report.anchor, dec!(0.0003));
        assert_eq!(report.leftover, Decimal::ZERO);
        assert!(!report.idle_warning);
        assert_eq!(mock.cancel_calls().await, vec!["USDT"]);
    }

    #[tokio::test]
    async fn test_below_minimum_exits_before_any_submission() {
        let mock = seeded_mock(dec!(100)).await;
        let config = test_config();

        let outcome = run_once(&mock, &config).await.unwrap();
        match outcome {
            RunOutcome::NothingToDeploy { free_balance } => {
                assert_eq!(free_balance, dec!(100));
            }
            other => panic!("expected nothing-to-deploy, got {:?}", other),
        }
        assert!(mock.submissions().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_submission_aborts_phase_and_warns_idle() {
        let mock = seeded_mock(dec!(1620)).await;
        mock.fail_submissions_after(1).await;
        let config = test_config();

        let report = completed(run_once(&mock, &config).await.unwrap());

        // first ladder chunk lands, everything after fails
        assert_eq!(mock.submissions().await.len(), 1);
        assert_eq!(report.leftover, dec!(1120));
        assert!(report.idle_warning);
    }

    #[tokio::test]
    async fn test_maker_leg_consumes_post_ladder_remainder() {
        // ladder fails immediately, leaving the full balance to the maker leg
        let mock = seeded_mock(dec!(1620)).await;
        mock.fail_submissions_after(0).await;
        let config = test_config();

        let report = completed(run_once(&mock, &config).await.unwrap());
        assert!(mock.submissions().await.is_empty());
        assert_eq!(report.leftover, dec!(1620));
        assert!(report.idle_warning);
    }

    #[tokio::test]
    async fn test_maker_legs_deploy_when_reference_orders_rejected() {
        // the venue refusing FRRDELTA is exactly what the maker leg exists
        // for: the balance still deploys as resting limit offers
        let mock = MockExchange::new();
        mock.set_funding_wallet("USDT", dec!(1620)).await;
        mock.set_reference_rate(Some(dec!(0.0003))).await;
        mock.set_book(vec![BookRow {
            rate: dec!(0.0004),
            amount: dec!(5000),
        }])
        .await;
        mock.reject_kind(OfferKind::FrrDelta).await;
        let config = test_config();

        let report = completed(run_once(&mock, &config).await.unwrap());

        // primary ladder aborts on its first chunk; the maker leg places
        // three whole chunks inside the best bid; the sweep (FRRDELTA) fails
        let subs = mock.submissions().await;
        assert_eq!(subs.len(), 3);
        for sub in &subs {
            assert_eq!(sub.kind, OfferKind::Limit);
            assert_eq!(sub.amount, dec!(500));
            assert_eq!(sub.rate, dec!(0.0004) - dec!(0.00001));
        }
        assert_eq!(report.leftover, dec!(120));
        assert!(!report.idle_warning);
    }

    #[tokio::test]
    async fn test_all_market_data_failing_still_completes() {
        let mock = MockExchange::new();
        mock.set_funding_wallet("USDT", dec!(500)).await;
        mock.fail_market_data().await;
        let config = test_config();

        let report = completed(run_once(&mock, &config).await.unwrap());

        // canonical strategy anchors at the conservative floor
        assert_eq!(report.anchor, dec!(0.0002));
        let subs = mock.submissions().await;
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].amount, dec!(500));
    }

    #[tokio::test]
    async fn test_blend_strategy_aborts_without_market_data() {
        let mock = MockExchange::new();
        mock.set_funding_wallet("USDT", dec!(500)).await;
        let mut config = test_config();
        config.ladder.anchor_strategy = AnchorStrategy::BlendMidLast;

        assert!(run_once(&mock, &config).await.is_err());
        assert!(mock.submissions().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_failure_is_not_fatal() {
        let mock = seeded_mock(dec!(500)).await;
        mock.fail_cancel().await;
        let config = test_config();

        let report = completed(run_once(&mock, &config).await.unwrap());
        assert_eq!(report.leftover, Decimal::ZERO);
        assert_eq!(mock.submissions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_wallet_alias_detection_scopes_cancel() {
        let mock = MockExchange::new();
        mock.set_funding_wallet("UST", dec!(500)).await;
        mock.set_reference_rate(Some(dec!(0.0003))).await;
        let config = test_config();

        let report = completed(run_once(&mock, &config).await.unwrap());
        assert_eq!(report.context.asset_code, "UST");
        assert_eq!(mock.cancel_calls().await, vec!["UST"]);
    }

    #[tokio::test]
    async fn test_submissions_recover_through_fallback_symbol() {
        let mock = seeded_mock(dec!(500)).await;
        mock.reject_preferred_symbol().await;
        let config = test_config();

        let report = completed(run_once(&mock, &config).await.unwrap());
        assert_eq!(report.leftover, Decimal::ZERO);
        let subs = mock.submissions().await;
        assert!(!subs.is_empty());
        assert!(subs.iter().all(|s| s.symbol == "fUST"));
    }

    #[tokio::test]
    async fn test_wallet_failure_degrades_to_zero_balance() {
        let mock = MockExchange::new();
        mock.fail_wallets().await;
        let config = test_config();

        let outcome = run_once(&mock, &config).await.unwrap();
        assert!(matches!(
            outcome,
            RunOutcome::NothingToDeploy { free_balance } if free_balance == Decimal::ZERO
        ));
    }

    #[tokio::test]
    async fn test_sweep_kind_is_reference_tracking() {
        let mock = seeded_mock(dec!(620)).await;
        let config = test_config();

        completed(run_once(&mock, &config).await.unwrap());
        let subs = mock.submissions().await;
        let sweep = subs.last().unwrap();
        assert_eq!(sweep.kind, OfferKind::FrrDelta);
        assert_eq!(sweep.rate, Decimal::ZERO);
        assert_eq!(sweep.amount, dec!(120));
    }
}
