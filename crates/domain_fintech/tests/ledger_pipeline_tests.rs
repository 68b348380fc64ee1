//! Ledger Pipeline Tests
//!
//! End-to-end runs of the financial core on the in-memory store:
//!
//! - Bank ingestion: dedup of the golden dataset, sync failures, connection gating
//! - Payment matching: DRY_RUN vs LIVE_ALL, auto-confirm, suspense, first money
//! - Settlement reconciliation: FULL, TOLERATED and MISMATCH statements
//! - Safety breaker: suspense and failure thresholds, skipped auto-confirm
//! - Profitability: the P&L identity over random sale/fee/refund traffic
//! - Rule learning and control-tower metrics

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::Marketplace;
use domain_fintech::chart;
use domain_fintech::{
    AutopilotConfig, BankErrorCode, ConfidenceBucket, BankSyncEngine, BreakerThresholds, ConnectionStatus, FeeType, FintechError,
    HealthGrade, LedgerTx, MatchStatus, OperatingMode, OpenLineQuery, ProcessingStatus, ReconciliationConfig,
    ReconciliationMetrics, ReconciliationStatus, RuleLearner, SafetyBreaker, SettlementReconciliationEngine,
    TargetType,
};
use test_utils::{
    assert_account_balance, assert_entry_posted, assert_event_count, assert_ledger_balanced, assert_pnl_identity,
    pnl_sequence_strategy, statement, FakeTransactionSource, GoldenDataset, LedgerHarness, RawRecordBuilder,
    SaleEventBuilder, SettledTransactionBuilder, TemporalFixtures,
};

// ============================================================================
// BANK INGESTION
// ============================================================================

mod bank_ingestion {
    use super::*;

    #[tokio::test]
    async fn test_golden_dataset_dedups_to_seven_rows() {
        let h = LedgerHarness::new(OperatingMode::DryRun);
        h.seed_rules().await.unwrap();
        let connection = h.active_connection("Mock Bank").await.unwrap();
        let source = FakeTransactionSource::with_records(GoldenDataset::records());
        let sync = BankSyncEngine::new(h.log.clone());

        let first = sync.sync_connection(connection, &source).await.unwrap();
        assert_eq!(first.fetched, GoldenDataset::RECORDS);
        assert_eq!(first.imported, GoldenDataset::UNIQUE);
        assert_eq!(first.duplicates, 2);
        assert_eq!(first.failed, 0);

        let second = sync.sync_connection(connection, &source).await.unwrap();
        assert_eq!(second.imported, 0);
        assert_eq!(second.duplicates, GoldenDataset::RECORDS);

        let state = h.snapshot().await;
        assert_eq!(state.bank_transactions(h.company_id).len(), GoldenDataset::UNIQUE);
        assert_event_count(&state, h.company_id, "BANK_TRANSACTION_IMPORTED", GoldenDataset::UNIQUE);
    }

    #[tokio::test]
    async fn test_dry_run_scores_but_posts_nothing() {
        let h = LedgerHarness::new(OperatingMode::DryRun);
        h.seed_rules().await.unwrap();
        let connection = h.active_connection("Mock Bank").await.unwrap();
        let source = FakeTransactionSource::with_records(GoldenDataset::records());

        BankSyncEngine::new(h.log.clone())
            .sync_connection(connection, &source)
            .await
            .unwrap();

        let state = h.snapshot().await;
        assert!(state.entries_for_company(h.company_id).is_empty());
        assert_eq!(state.matches_since(h.company_id, TemporalFixtures::booking_day()).len(), GoldenDataset::UNIQUE);
        assert_event_count(&state, h.company_id, "BANK_MATCH_CONFIRMED", 0);

        // HEPSIBURADA, EFT, POS, N11 and FAST GIDEN have no rule and no open line
        let diary = h.diary.entries();
        assert_eq!(diary.len(), 5);
        assert!(diary.iter().all(|e| !e.posted_to_suspense && e.mode == OperatingMode::DryRun));
    }

    #[tokio::test]
    async fn test_diary_written_only_after_commit() {
        use core_kernel::{BankConnectionId, BankTransactionId, Currency};
        use domain_fintech::{AggregateType, Direction, EventKind, NewEvent, TransactionNormalizer};

        let h = LedgerHarness::new(OperatingMode::DryRun);
        let imported = |description: &str| {
            let id = BankTransactionId::new();
            NewEvent::new(
                h.company_id,
                AggregateType::Journal,
                id,
                EventKind::BankTransactionImported {
                    bank_transaction_id: id,
                    bank_connection_id: BankConnectionId::new(),
                    amount: dec!(42.00),
                    currency: Currency::TRY,
                    direction: Direction::In,
                    description: description.to_string(),
                    tags: TransactionNormalizer::parse(description),
                },
            )
        };

        let log = h.log.clone();
        let rolled_back = imported("EFT GELEN BILINMEYEN");
        let err = h
            .log
            .transaction(|tx| {
                log.emit_in(tx, rolled_back)?;
                Err::<(), _>(FintechError::validation("abort import"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, FintechError::Validation(_)));
        assert!(h.diary.entries().is_empty());
        assert!(h.snapshot().await.matches_since(h.company_id, TemporalFixtures::booking_day()).is_empty());

        h.log.emit(imported("EFT GELEN BILINMEYEN")).await.unwrap();
        let diary = h.diary.entries();
        assert_eq!(diary.len(), 1);
        assert_eq!(diary[0].confidence_score, 0);
        assert!(!diary[0].posted_to_suspense);
    }

    #[tokio::test]
    async fn test_fetch_failure_moves_connection_to_error() {
        let h = LedgerHarness::new(OperatingMode::DryRun);
        let connection = h.active_connection("Mock Bank").await.unwrap();
        let source = FakeTransactionSource::failing_with(BankErrorCode::AuthFailed, "token rejected");

        let err = BankSyncEngine::new(h.log.clone())
            .sync_connection(connection, &source)
            .await
            .unwrap_err();
        assert!(matches!(err, FintechError::BankSync { code: BankErrorCode::AuthFailed, .. }));

        let state = h.snapshot().await;
        let stored = state.bank_connection(connection).unwrap();
        assert_eq!(stored.status, ConnectionStatus::Error);
        assert_eq!(stored.consecutive_failures, 1);
        assert_eq!(stored.last_error_code, Some(BankErrorCode::AuthFailed));
        assert_eq!(stored.next_retry_at, Some(h.now() + chrono::Duration::minutes(5)));
        assert_event_count(&state, h.company_id, "BANK_SYNC_FAILED", 1);
    }

    #[tokio::test]
    async fn test_draft_connection_is_not_synced() {
        let h = LedgerHarness::new(OperatingMode::DryRun);
        let connection = h.draft_connection("Mock Bank").await.unwrap();
        let source = FakeTransactionSource::with_records(GoldenDataset::records());

        let err = BankSyncEngine::new(h.log.clone())
            .sync_connection(connection, &source)
            .await
            .unwrap_err();
        assert!(matches!(err, FintechError::InvalidTransition { from: ConnectionStatus::Draft, .. }));
        assert_eq!(source.calls(), 0);
    }
}

// ============================================================================
// PAYMENT MATCHING
// ============================================================================

mod live_matching {
    use super::*;

    #[tokio::test]
    async fn test_live_all_confirms_rules_and_parks_the_rest() {
        let h = LedgerHarness::new(OperatingMode::LiveAll);
        h.seed_rules().await.unwrap();
        let connection = h.active_connection("Mock Bank").await.unwrap();
        let source = FakeTransactionSource::with_records(GoldenDataset::records());

        BankSyncEngine::new(h.log.clone())
            .sync_connection(connection, &source)
            .await
            .unwrap();

        let state = h.snapshot().await;
        // Two rule matches plus five suspense postings
        assert_eq!(assert_ledger_balanced(&state, h.company_id), 7);
        assert_event_count(&state, h.company_id, "BANK_MATCH_CONFIRMED", 2);
        assert_event_count(&state, h.company_id, "FIRST_REAL_MONEY_RECEIVED", 1);

        // Rent goes out against the rule's expense account
        assert_account_balance(&state, h.company_id, chart::RENT_EXPENSE, dec!(25000.00));
        // 8230.10 + 1200.00 + 349.90 + 2150.00 in, 845.20 out
        assert_account_balance(&state, h.company_id, chart::SUSPENSE, dec!(11084.80));

        let confirmed = state
            .matches_since(h.company_id, TemporalFixtures::booking_day())
            .into_iter()
            .filter(|m| m.status == MatchStatus::Confirmed)
            .count();
        assert_eq!(confirmed, 2);
        assert!(h.diary.entries().iter().all(|e| e.posted_to_suspense));
    }

    #[tokio::test]
    async fn test_systematic_match_closes_the_open_receivable() {
        let h = LedgerHarness::new(OperatingMode::LiveAll);
        let connection = h.active_connection("Mock Bank").await.unwrap();
        h.log
            .emit(SaleEventBuilder::new(h.company_id).with_gross_amount(dec!(4321.00)).build())
            .await
            .unwrap();

        let source = FakeTransactionSource::with_records(vec![RawRecordBuilder::new("R1")
            .amount(dec!(4321.00))
            .description("HAVALE GELEN MUSTERI")
            .build()]);
        BankSyncEngine::new(h.log.clone())
            .sync_connection(connection, &source)
            .await
            .unwrap();

        let state = h.snapshot().await;
        let open = state.open_lines(&OpenLineQuery::new(h.company_id, chart::MARKETPLACE_RECEIVABLE));
        assert!(open.is_empty());
        assert_account_balance(&state, h.company_id, chart::BANK, dec!(4321.00));
        assert_event_count(&state, h.company_id, "FIRST_REAL_MONEY_RECEIVED", 1);
    }

    #[tokio::test]
    async fn test_learned_rule_drives_the_next_import() {
        let h = LedgerHarness::new(OperatingMode::LiveAll);
        let connection = h.active_connection("Mock Bank").await.unwrap();

        let rule = RuleLearner::new(h.log.clone())
            .learn_pattern(
                h.company_id,
                "EFT GELEN ACME LTD SIPARIS#4411",
                TargetType::Customer,
                "120.01",
                "ops@example.com",
            )
            .await
            .unwrap();
        assert_eq!(rule.pattern, "EFT GELEN ACME");
        assert_eq!(rule.confidence, 100);

        let source = FakeTransactionSource::with_records(vec![RawRecordBuilder::new("R2")
            .amount(dec!(980.00))
            .description("Eft gelen Acme Ltd siparis#5000")
            .build()]);
        BankSyncEngine::new(h.log.clone())
            .sync_connection(connection, &source)
            .await
            .unwrap();

        let state = h.snapshot().await;
        assert_event_count(&state, h.company_id, "MATCHING_RULE_LEARNED", 1);
        assert!(state
            .audit_records(h.company_id)
            .iter()
            .any(|a| a.action == "MATCHING_RULE_LEARNED" && a.who == "ops@example.com"));
        assert_account_balance(&state, h.company_id, "120.01", dec!(-980.00));
    }
}

// ============================================================================
// SETTLEMENT RECONCILIATION
// ============================================================================

mod reconciliation {
    use super::*;

    fn engine(h: &LedgerHarness) -> SettlementReconciliationEngine {
        SettlementReconciliationEngine::new(h.log.clone(), ReconciliationConfig::default())
    }

    async fn sale(h: &LedgerHarness, gross: Decimal) {
        h.log
            .emit(SaleEventBuilder::new(h.company_id).with_gross_amount(gross).build())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_small_shortfall_is_tolerated() {
        let h = LedgerHarness::new(OperatingMode::DryRun);
        sale(&h, dec!(1000.00)).await;
        let stmt = statement(h.company_id, "TY-PAYOUT-1", dec!(999.25));
        let statement_id = stmt.id;
        h.put_statement(stmt).await.unwrap();

        let outcome = engine(&h)
            .reconcile_statement(h.company_id, statement_id)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.status, ReconciliationStatus::Tolerated);
        assert_eq!(outcome.difference, dec!(-0.75));
        assert_eq!(outcome.closed_lines, 1);

        let state = h.snapshot().await;
        assert!(state
            .open_lines(&OpenLineQuery::new(h.company_id, chart::MARKETPLACE_RECEIVABLE))
            .is_empty());
        assert_account_balance(&state, h.company_id, chart::ROUNDING_LOSS, dec!(0.75));
        assert_entry_posted(&state, &format!("TOLERANCE_{statement_id}"));
        assert_event_count(&state, h.company_id, "SETTLEMENT_RECONCILED", 1);
    }

    #[tokio::test]
    async fn test_large_shortfall_goes_to_suspense() {
        let h = LedgerHarness::new(OperatingMode::DryRun);
        sale(&h, dec!(10000.00)).await;
        let stmt = statement(h.company_id, "TY-PAYOUT-2", dec!(9990.00));
        let statement_id = stmt.id;
        h.put_statement(stmt).await.unwrap();

        let outcome = engine(&h)
            .reconcile_statement(h.company_id, statement_id)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.status, ReconciliationStatus::Mismatch);
        assert_eq!(outcome.closed_lines, 0);

        let state = h.snapshot().await;
        assert_account_balance(&state, h.company_id, chart::SUSPENSE, dec!(9990.00));
        assert_eq!(
            state
                .open_lines(&OpenLineQuery::new(h.company_id, chart::MARKETPLACE_RECEIVABLE))
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_exact_payout_closes_sale_and_fee_lines() {
        let h = LedgerHarness::new(OperatingMode::DryRun);
        sale(&h, dec!(1200.00)).await;
        let engine = engine(&h);
        let fee = engine
            .record_settled_transaction(
                h.company_id,
                Marketplace::Trendyol,
                SettledTransactionBuilder::commission("TY-FEE-1").build(),
            )
            .await
            .unwrap();
        assert_eq!(fee.processing_status, ProcessingStatus::Matched);

        let stmt = statement(h.company_id, "TY-PAYOUT-3", dec!(1050.00));
        let statement_id = stmt.id;
        h.put_statement(stmt).await.unwrap();

        let outcome = engine
            .reconcile_statement(h.company_id, statement_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.status, ReconciliationStatus::Full);
        assert_eq!(outcome.closed_lines, 2);
        assert!(outcome.adjustment_entry_id.is_none());

        let state = h.snapshot().await;
        let settled = state
            .settlement_by_reference(h.company_id, Marketplace::Trendyol, "TY-FEE-1")
            .unwrap();
        assert_eq!(settled.processing_status, ProcessingStatus::Reconciled);
        assert_eq!(settled.reconciliation_status, Some(ReconciliationStatus::Full));
        assert_eq!(settled.matched_bank_statement_id, Some(statement_id));

        // A matched statement is left alone
        assert!(engine
            .reconcile_statement(h.company_id, statement_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_settlement_line_is_recorded_once() {
        let h = LedgerHarness::new(OperatingMode::DryRun);
        let engine = engine(&h);
        let line = SettledTransactionBuilder::commission("HB-FEE-7")
            .with_fee_type(FeeType::Shipping)
            .with_amount(dec!(-42.50));

        let first = engine
            .record_settled_transaction(h.company_id, Marketplace::Hepsiburada, line.build())
            .await
            .unwrap();
        let again = SettledTransactionBuilder::commission("HB-FEE-7")
            .with_fee_type(FeeType::Shipping)
            .with_amount(dec!(-42.50))
            .build();
        let second = engine
            .record_settled_transaction(h.company_id, Marketplace::Hepsiburada, again)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        let state = h.snapshot().await;
        assert_event_count(&state, h.company_id, "HEPSIBURADA_TRANSACTION_RECORDED", 1);
        assert_account_balance(&state, h.company_id, chart::SHIPPING_EXPENSE, dec!(42.50));
    }
}

// ============================================================================
// SAFETY BREAKER
// ============================================================================

mod safety_breaker {
    use super::*;

    async fn park_in_suspense(h: &LedgerHarness, amount: Decimal) {
        let connection = h.active_connection("Suspense Bank").await.unwrap();
        let source = FakeTransactionSource::with_records(vec![RawRecordBuilder::new(format!("S-{amount}"))
            .amount(amount)
            .description("BILINMEYEN HAVALE")
            .build()]);
        BankSyncEngine::new(h.log.clone())
            .sync_connection(connection, &source)
            .await
            .unwrap();
    }

    async fn fail_syncs(h: &LedgerHarness, times: usize) {
        let connection = h.active_connection("Flaky Bank").await.unwrap();
        let source = FakeTransactionSource::failing("Service unavailable");
        let sync = BankSyncEngine::new(h.log.clone());
        for _ in 0..times {
            assert!(sync.sync_connection(connection, &source).await.is_err());
        }
    }

    async fn enable_autopilot(h: &LedgerHarness) {
        let configs = vec![
            AutopilotConfig::enabled(h.company_id, "auto-match", h.now()),
            AutopilotConfig::enabled(h.company_id, "auto-reconcile", h.now()),
        ];
        h.log
            .store()
            .transaction(|tx| {
                for config in configs {
                    tx.put_autopilot_config(config);
                }
                Ok(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_trips_above_suspense_limit() {
        let h = LedgerHarness::new(OperatingMode::LiveAll);
        enable_autopilot(&h).await;
        park_in_suspense(&h, dec!(50001.00)).await;

        let breaker = SafetyBreaker::new(h.log.clone(), BreakerThresholds::default());
        assert!(!breaker.check_health(h.company_id).await.unwrap());
        assert!(breaker.is_tripped(h.company_id).await.unwrap());
        // Already tripped: no second event
        assert!(!breaker.check_health(h.company_id).await.unwrap());

        let state = h.snapshot().await;
        assert!(state.autopilot_configs(h.company_id).iter().all(|c| !c.enabled));
        assert_event_count(&state, h.company_id, "SAFETY_BREAKER_TRIPPED", 1);
        assert!(state
            .audit_records(h.company_id)
            .iter()
            .any(|a| a.action == "AUTOPILOT_DISABLED"));
    }

    #[tokio::test]
    async fn test_holds_at_the_limits() {
        let h = LedgerHarness::new(OperatingMode::LiveAll);
        enable_autopilot(&h).await;
        park_in_suspense(&h, dec!(49999.00)).await;
        fail_syncs(&h, 10).await;

        let breaker = SafetyBreaker::new(h.log.clone(), BreakerThresholds::default());
        assert!(breaker.check_health(h.company_id).await.unwrap());

        let state = h.snapshot().await;
        assert!(state.autopilot_configs(h.company_id).iter().all(|c| c.enabled));
    }

    #[tokio::test]
    async fn test_trips_on_the_eleventh_failure() {
        let h = LedgerHarness::new(OperatingMode::LiveAll);
        fail_syncs(&h, 11).await;

        let breaker = SafetyBreaker::new(h.log.clone(), BreakerThresholds::default());
        assert!(!breaker.check_health(h.company_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_tripped_breaker_leaves_high_matches_pending() {
        let h = LedgerHarness::new(OperatingMode::LiveAll);
        h.seed_rules().await.unwrap();
        park_in_suspense(&h, dec!(60000.00)).await;
        let breaker = SafetyBreaker::new(h.log.clone(), BreakerThresholds::default());
        assert!(!breaker.check_health(h.company_id).await.unwrap());

        let connection = h.active_connection("Mock Bank").await.unwrap();
        let source = FakeTransactionSource::with_records(vec![RawRecordBuilder::new("TY-1")
            .amount(dec!(15400.50))
            .description("TRENDYOL HAKEDIS ODEMESI")
            .build()]);
        BankSyncEngine::new(h.log.clone())
            .sync_connection(connection, &source)
            .await
            .unwrap();

        let state = h.snapshot().await;
        assert_event_count(&state, h.company_id, "BANK_MATCH_CONFIRMED", 0);
        let pending = state
            .matches_since(h.company_id, TemporalFixtures::booking_day())
            .into_iter()
            .filter(|m| m.confidence_bucket == ConfidenceBucket::High && m.status == MatchStatus::Pending)
            .count();
        assert_eq!(pending, 1);

        breaker.rearm(h.company_id, "ops@example.com").await.unwrap();
        assert!(!breaker.is_tripped(h.company_id).await.unwrap());
    }
}

// ============================================================================
// METRICS
// ============================================================================

mod control_tower {
    use super::*;

    #[tokio::test]
    async fn test_snapshot_after_live_golden_run() {
        let h = LedgerHarness::new(OperatingMode::LiveAll);
        h.seed_rules().await.unwrap();
        let connection = h.active_connection("Mock Bank").await.unwrap();
        let source = FakeTransactionSource::with_records(GoldenDataset::records());
        BankSyncEngine::new(h.log.clone())
            .sync_connection(connection, &source)
            .await
            .unwrap();

        let snapshot = ReconciliationMetrics::new(h.log.clone())
            .snapshot(h.company_id)
            .await
            .unwrap();

        assert_eq!(snapshot.suspense_amount, dec!(11930.00));
        assert_eq!(snapshot.confidence_today.high, 2);
        assert_eq!(snapshot.confidence_today.low, 5);
        assert_eq!(snapshot.failed_events_7d, 0);
        assert_eq!(snapshot.grade, HealthGrade::Warning);
    }
}

// ============================================================================
// PROFITABILITY
// ============================================================================

mod profitability {
    use super::*;
    use proptest::prelude::*;
    use domain_fintech::MarketplaceProductPnl;
    use test_utils::PnlInput;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn test_pnl_identity_holds(inputs in pnl_sequence_strategy(20)) {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            runtime.block_on(async {
                let h = LedgerHarness::new(OperatingMode::DryRun);
                let mut previous: Option<MarketplaceProductPnl> = None;
                for (seq, input) in inputs.iter().enumerate() {
                    let event = input.to_event(h.company_id, Marketplace::N11, "SKU-P", seq);
                    h.log.emit(event).await.unwrap();

                    let state = h.snapshot().await;
                    let rows = state.pnl_rows(h.company_id);
                    assert_eq!(rows.len(), 1);
                    let row = rows[0].clone();
                    assert_pnl_identity(&row);
                    if let Some(prev) = &previous {
                        assert_counters_never_decrease(prev, &row);
                    }
                    previous = Some(row);
                }

                let state = h.snapshot().await;
                let rows = state.pnl_rows(h.company_id);
                let row = &rows[0];
                let sales = inputs.iter().filter(|i| matches!(i, PnlInput::Sale { .. })).count();
                let gross: Decimal = inputs
                    .iter()
                    .filter_map(|i| match i {
                        PnlInput::Sale { gross, .. } => Some(gross.abs()),
                        _ => None,
                    })
                    .sum();
                assert_eq!(row.sale_count as usize, sales);
                assert_eq!(row.gross_revenue, gross);
                assert_ledger_balanced(&state, h.company_id);
            });
        }
    }

    fn assert_counters_never_decrease(prev: &MarketplaceProductPnl, row: &MarketplaceProductPnl) {
        assert!(row.gross_revenue >= prev.gross_revenue, "gross revenue went down");
        assert!(row.commission_total >= prev.commission_total, "commission went down");
        assert!(row.shipping_total >= prev.shipping_total, "shipping went down");
        assert!(row.other_fees_total >= prev.other_fees_total, "other fees went down");
        assert!(row.fifo_cost_total >= prev.fifo_cost_total, "FIFO cost went down");
        assert!(row.refund_cost_total >= prev.refund_cost_total, "refund cost went down");
        assert!(row.sale_count >= prev.sale_count);
        assert!(row.refund_count >= prev.refund_count);
    }

    #[tokio::test]
    async fn test_fees_and_refund_reduce_profit() {
        let h = LedgerHarness::new(OperatingMode::DryRun);
        h.log
            .emit(SaleEventBuilder::new(h.company_id).with_product("SKU-9").build())
            .await
            .unwrap();
        SettlementReconciliationEngine::new(h.log.clone(), ReconciliationConfig::default())
            .record_settled_transaction(
                h.company_id,
                Marketplace::Trendyol,
                SettledTransactionBuilder::commission("TY-C-9").with_product(Some("SKU-9")).build(),
            )
            .await
            .unwrap();
        h.log
            .emit(test_utils::refund_event(h.company_id, "TY-1001", "SKU-9", Marketplace::Trendyol, dec!(100.00)))
            .await
            .unwrap();

        let state = h.snapshot().await;
        let rows = state.pnl_rows(h.company_id);
        let row = rows.iter().find(|r| r.product_id == "SKU-9").unwrap();
        // 1200 - 100 - 600 - 150
        assert_eq!(row.net_profit, dec!(350.00));
        assert_eq!(row.refund_count, 1);
        assert_pnl_identity(row);
    }
}

#[test]
fn test_harness_starts_at_fixed_instant() {
    let h = LedgerHarness::new(OperatingMode::DryRun);
    assert_eq!(h.now(), TemporalFixtures::now());
}
