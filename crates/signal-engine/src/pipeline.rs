//! The signal pipeline: filter → enrich → score → gate, with every outcome
//! appended to the signal log.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use walltrack_core::stores::SignalLog;
use walltrack_core::types::{
    EligibilityStatus, FilterStatus, GateDecision, ScoredSignal, SignalRecord, SwapEvent,
    TokenCharacteristics,
};
use walltrack_core::Result;

use crate::enrichment::{TokenEnricher, WalletEnricher};
use crate::filter::SignalFilter;
use crate::scorer::SignalScorer;
use crate::threshold::ThresholdGate;

/// Terminal outcome of processing one swap event.
#[derive(Debug)]
pub enum PipelineOutcome {
    /// The filter rejected the event.
    Filtered(FilterStatus),
    /// Scored but under the trade threshold (or vetoed by token flags).
    BelowThreshold {
        record: SignalRecord,
    },
    /// Cleared the gate; ready for admission, sizing, and execution.
    Eligible {
        record: SignalRecord,
        scored: ScoredSignal,
        decision: GateDecision,
        token: TokenCharacteristics,
    },
}

/// Orchestrates the signal stages and owns signal-log bookkeeping.
pub struct SignalPipeline {
    filter: SignalFilter,
    wallets: WalletEnricher,
    tokens: TokenEnricher,
    scorer: SignalScorer,
    gate: ThresholdGate,
    signals: Arc<dyn SignalLog>,
}

impl SignalPipeline {
    pub fn new(
        filter: SignalFilter,
        wallets: WalletEnricher,
        tokens: TokenEnricher,
        scorer: SignalScorer,
        gate: ThresholdGate,
        signals: Arc<dyn SignalLog>,
    ) -> Self {
        Self {
            filter,
            wallets,
            tokens,
            scorer,
            gate,
            signals,
        }
    }

    /// Process one event end to end.
    ///
    /// Exactly one signal-log row is appended per distinct `tx_signature`;
    /// a concurrent duplicate loses the insert race and is reported as
    /// filtered.
    pub async fn process(&self, event: &SwapEvent) -> Result<PipelineOutcome> {
        let start = Instant::now();
        event.validate()?;

        let filter_result = self.filter.filter(event).await?;
        if !filter_result.is_passed() {
            debug!(
                wallet = %short(&event.wallet_address),
                status = filter_result.status.as_str(),
                "signal filtered out"
            );
            let record =
                SignalRecord::filtered(event, filter_result.status, elapsed_ms(start));
            self.signals.append(&record).await?;
            return Ok(PipelineOutcome::Filtered(filter_result.status));
        }

        let wallet = self.wallets.enrich(&event.wallet_address).await;
        let token = self.tokens.enrich(&event.token_address).await;

        let scored = self.scorer.score(event, &wallet).await;
        let decision = self.gate.gate(&scored, &token).await;

        let record = SignalRecord::scored(&scored, &decision, elapsed_ms(start));
        let inserted = self.signals.append(&record).await?;
        if !inserted {
            // Lost the dedup race to a concurrent event with the same tx.
            warn!(tx = %short(&event.tx_signature), "duplicate signal dropped at log insert");
            return Ok(PipelineOutcome::Filtered(FilterStatus::DuplicateTx));
        }

        match decision.eligibility {
            EligibilityStatus::Eligible => {
                info!(
                    wallet = %short(&event.wallet_address),
                    token = %short(&event.token_address),
                    score = format!("{:.3}", scored.final_score),
                    conviction = decision.conviction.as_str(),
                    "signal trade eligible"
                );
                Ok(PipelineOutcome::Eligible {
                    record,
                    scored,
                    decision,
                    token,
                })
            }
            _ => {
                info!(
                    wallet = %short(&event.wallet_address),
                    score = format!("{:.3}", scored.final_score),
                    threshold = decision.threshold_used,
                    "signal below threshold"
                );
                Ok(PipelineOutcome::BelowThreshold { record })
            }
        }
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

fn short(address: &str) -> &str {
    &address[..address.len().min(8)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use walltrack_core::config::TradingConfig;
    use walltrack_core::ports::{ClusterInfo, MockClusterService, MockTokenFetcher};
    use walltrack_core::stores::{MockSignalLog, MockWalletStore};
    use walltrack_core::types::{SwapDirection, TokenSource, WalletProfile, WalletStatus};

    fn event(tx: &str) -> SwapEvent {
        SwapEvent {
            tx_signature: tx.into(),
            wallet_address: "W1".into(),
            token_address: "TokenA".into(),
            direction: SwapDirection::Buy,
            amount_token: dec!(1000),
            amount_sol: dec!(1.2),
            slot: 1,
            block_time: Utc::now(),
        }
    }

    fn strong_wallet() -> WalletProfile {
        let mut w = WalletProfile::default_for("W1");
        w.status = WalletStatus::Active;
        w.win_rate = Some(0.9);
        w.avg_pnl_per_trade_sol = dec!(4.0);
        w.total_trades = 40;
        w
    }

    fn pipeline_with(
        wallet: WalletProfile,
        honeypot: bool,
        tx_seen: bool,
        log: MockSignalLog,
    ) -> SignalPipeline {
        let config = TradingConfig::default().shared();

        let mut wallet_store = MockWalletStore::new();
        let monitored = wallet.clone();
        wallet_store
            .expect_list_by_status()
            .returning(move |status, _| match status {
                WalletStatus::Active => Ok(vec![monitored.clone()]),
                _ => Ok(vec![]),
            });
        let cached = wallet.clone();
        wallet_store
            .expect_get_by_address()
            .returning(move |_| Ok(Some(cached.clone())));
        let wallet_store: Arc<dyn walltrack_core::stores::WalletStore> = Arc::new(wallet_store);

        let mut fetcher = MockTokenFetcher::new();
        fetcher.expect_fetch().returning(move |token| {
            Ok(Some(TokenCharacteristics {
                address: token.to_string(),
                liquidity_usd: Some(dec!(250000)),
                market_cap_usd: Some(dec!(1000000)),
                age_minutes: Some(600),
                is_honeypot: honeypot,
                is_new_token: false,
                source: TokenSource::PrimaryFeed,
            }))
        });

        let mut clusters = MockClusterService::new();
        clusters
            .expect_get_cluster_for()
            .returning(|_| Ok(None::<ClusterInfo>));

        let mut sink = log;
        sink.expect_exists_tx().returning(move |_| Ok(tx_seen));
        let sink: Arc<dyn SignalLog> = Arc::new(sink);

        SignalPipeline::new(
            SignalFilter::new(wallet_store.clone(), sink.clone(), config.clone()),
            WalletEnricher::new(wallet_store),
            TokenEnricher::new(Arc::new(fetcher)),
            SignalScorer::new(Arc::new(clusters), config.clone()),
            ThresholdGate::new(config),
            sink,
        )
    }

    #[tokio::test]
    async fn test_strong_signal_is_eligible() {
        let mut log = MockSignalLog::new();
        log.expect_append().times(1).returning(|_| Ok(true));

        let pipeline = pipeline_with(strong_wallet(), false, false, log);
        let outcome = pipeline.process(&event("sig1")).await.unwrap();

        match outcome {
            PipelineOutcome::Eligible { scored, .. } => {
                assert!(scored.final_score >= 0.65);
            }
            other => panic!("expected eligible, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_weak_wallet_below_threshold() {
        let mut weak = strong_wallet();
        weak.win_rate = Some(0.3);
        weak.avg_pnl_per_trade_sol = dec!(-0.5);

        let mut log = MockSignalLog::new();
        log.expect_append().times(1).returning(|_| Ok(true));

        let pipeline = pipeline_with(weak, false, false, log);
        let outcome = pipeline.process(&event("sig1")).await.unwrap();
        assert!(matches!(outcome, PipelineOutcome::BelowThreshold { .. }));
    }

    #[tokio::test]
    async fn test_honeypot_vetoes_strong_signal() {
        let mut log = MockSignalLog::new();
        log.expect_append().times(1).returning(|_| Ok(true));

        let pipeline = pipeline_with(strong_wallet(), true, false, log);
        let outcome = pipeline.process(&event("sig1")).await.unwrap();
        assert!(matches!(outcome, PipelineOutcome::BelowThreshold { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_tx_filtered_before_scoring() {
        let mut log = MockSignalLog::new();
        // Only the filtered record is appended.
        log.expect_append().times(1).returning(|_| Ok(true));

        let pipeline = pipeline_with(strong_wallet(), false, true, log);
        let outcome = pipeline.process(&event("sig1")).await.unwrap();
        assert!(matches!(
            outcome,
            PipelineOutcome::Filtered(FilterStatus::DuplicateTx)
        ));
    }

    #[tokio::test]
    async fn test_insert_race_reports_duplicate() {
        let mut log = MockSignalLog::new();
        log.expect_append().times(1).returning(|_| Ok(false));

        let pipeline = pipeline_with(strong_wallet(), false, false, log);
        let outcome = pipeline.process(&event("sig1")).await.unwrap();
        assert!(matches!(
            outcome,
            PipelineOutcome::Filtered(FilterStatus::DuplicateTx)
        ));
    }
}
