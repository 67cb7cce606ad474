//! Matching semantics: crossing, priority, immediate orders, rejects and
//! the order state machine, driven synchronously through `MatchingCore`.

use crate::common::{self, core, limit, order_of_kind, px, sym};
use venue_core::prelude::*;

fn submit(core: &mut MatchingCore, order: Order) {
    core.process(Command::Submit(order));
}

#[test]
fn test_simple_cross_partial_passive() {
    let (mut core, captured) = core(&["AAPL"]);
    submit(&mut core, limit(1, "AAPL", Side::Sell, "10.00", 100));
    submit(&mut core, limit(2, "AAPL", Side::Buy, "10.00", 60));

    let fills = captured.fills();
    assert_eq!(fills.len(), 1);
    assert_eq!(fills[0].aggressive_id, OrderId::new(2));
    assert_eq!(fills[0].passive_id, OrderId::new(1));
    assert_eq!(fills[0].price, px("10.00"));
    assert_eq!(fills[0].quantity, 60);

    let book = core.book(sym("AAPL")).unwrap();
    assert_eq!(book.best_ask(), Some(px("10.00")));
    assert_eq!(book.depth(Side::Sell, 1)[0].quantity, 40);
    assert_eq!(book.best_bid(), None);

    let report = captured.last_report(OrderId::new(2)).unwrap();
    assert_eq!(report.status, OrderStatus::Filled);
    assert_eq!(report.filled_quantity, 60);
    assert_eq!(report.remaining_quantity, 0);
}

#[test]
fn test_price_time_priority_within_level() {
    let (mut core, captured) = core(&["AAPL"]);
    submit(&mut core, limit(1, "AAPL", Side::Sell, "10.00", 50));
    submit(&mut core, limit(2, "AAPL", Side::Sell, "10.00", 50));
    submit(&mut core, limit(3, "AAPL", Side::Buy, "10.00", 60));

    let fills = captured.fills();
    assert_eq!(fills.len(), 2);
    assert_eq!(
        (fills[0].passive_id, fills[0].quantity),
        (OrderId::new(1), 50)
    );
    assert_eq!(
        (fills[1].passive_id, fills[1].quantity),
        (OrderId::new(2), 10)
    );

    let book = core.book(sym("AAPL")).unwrap();
    assert_eq!(book.orders_at(Side::Sell, px("10.00")), vec![(OrderId::new(2), 40)]);
}

#[test]
fn test_aggressor_pays_the_touch() {
    let (mut core, captured) = core(&["AAPL"]);
    submit(&mut core, limit(1, "AAPL", Side::Sell, "10.00", 100));
    submit(&mut core, limit(2, "AAPL", Side::Sell, "10.01", 100));
    submit(&mut core, limit(3, "AAPL", Side::Buy, "10.02", 150));

    let fills = captured.fills();
    assert_eq!(fills.len(), 2);
    assert_eq!((fills[0].price, fills[0].quantity), (px("10.00"), 100));
    assert_eq!((fills[1].price, fills[1].quantity), (px("10.01"), 50));
    assert!(fills.iter().all(|f| f.price < px("10.02")));

    let book = core.book(sym("AAPL")).unwrap();
    assert_eq!(book.best_ask(), Some(px("10.01")));
    assert_eq!(book.depth(Side::Sell, 1)[0].quantity, 50);

    // Volume-weighted average: (10.00·100 + 10.01·50) / 150
    let report = captured.last_report(OrderId::new(3)).unwrap();
    assert_eq!(report.avg_price, Price::from_raw(100_033));
}

#[test]
fn test_ioc_leftover_is_cancelled_not_rested() {
    let (mut core, captured) = core(&["AAPL"]);
    submit(&mut core, limit(1, "AAPL", Side::Sell, "10.00", 30));
    submit(
        &mut core,
        order_of_kind(2, "AAPL", Side::Buy, OrderKind::Ioc, "10.00", 100),
    );

    let fills = captured.fills();
    assert_eq!(fills.len(), 1);
    assert_eq!(fills[0].quantity, 30);

    let report = captured.last_report(OrderId::new(2)).unwrap();
    assert_eq!(report.status, OrderStatus::Cancelled);
    assert_eq!(report.filled_quantity, 30);
    assert_eq!(report.remaining_quantity, 70);

    let book = core.book(sym("AAPL")).unwrap();
    assert_eq!(book.best_ask(), None);
    assert_eq!(book.best_bid(), None);
    assert!(book.is_empty());
}

#[test]
fn test_fok_rejects_atomically() {
    let (mut core, captured) = core(&["AAPL"]);
    submit(&mut core, limit(1, "AAPL", Side::Sell, "10.00", 30));
    let depth_before = core.book(sym("AAPL")).unwrap().depth(Side::Sell, 8);

    submit(
        &mut core,
        order_of_kind(2, "AAPL", Side::Buy, OrderKind::Fok, "10.00", 100),
    );

    assert!(captured.fills().is_empty());
    let report = captured.last_report(OrderId::new(2)).unwrap();
    assert_eq!(report.status, OrderStatus::Rejected);
    assert_eq!(
        report.reject_reason,
        Some(RejectReason::InsufficientLiquidity)
    );

    let book = core.book(sym("AAPL")).unwrap();
    assert_eq!(book.depth(Side::Sell, 8), depth_before);
    assert_eq!(book.orders_at(Side::Sell, px("10.00")), vec![(OrderId::new(1), 30)]);
}

#[test]
fn test_fok_fills_completely_when_liquid() {
    let (mut core, captured) = core(&["AAPL"]);
    submit(&mut core, limit(1, "AAPL", Side::Sell, "10.00", 60));
    submit(&mut core, limit(2, "AAPL", Side::Sell, "10.01", 60));
    submit(
        &mut core,
        order_of_kind(3, "AAPL", Side::Buy, OrderKind::Fok, "10.01", 100),
    );

    let report = captured.last_report(OrderId::new(3)).unwrap();
    assert_eq!(report.status, OrderStatus::Filled);
    assert_eq!(report.filled_quantity, 100);
    assert_eq!(captured.fills().len(), 2);
}

#[test]
fn test_market_order_on_empty_book_is_rejected() {
    let (mut core, captured) = core(&["AAPL"]);
    submit(
        &mut core,
        order_of_kind(1, "AAPL", Side::Buy, OrderKind::Market, "0", 50),
    );

    let report = captured.last_report(OrderId::new(1)).unwrap();
    assert_eq!(report.status, OrderStatus::Rejected);
    assert_eq!(
        report.reject_reason,
        Some(RejectReason::InsufficientLiquidity)
    );
    assert!(captured.fills().is_empty());
}

#[test]
fn test_market_order_partial_sweep_cancels_residue() {
    let (mut core, captured) = core(&["AAPL"]);
    submit(&mut core, limit(1, "AAPL", Side::Sell, "10.00", 30));
    submit(
        &mut core,
        order_of_kind(2, "AAPL", Side::Buy, OrderKind::Market, "0", 100),
    );

    let report = captured.last_report(OrderId::new(2)).unwrap();
    assert_eq!(report.status, OrderStatus::Cancelled);
    assert_eq!(report.filled_quantity, 30);
    assert!(core.book(sym("AAPL")).unwrap().is_empty());
}

#[test]
fn test_validation_rejects() {
    let (mut core, captured) = core(&["AAPL"]);

    // Zero quantity.
    submit(&mut core, limit(1, "AAPL", Side::Buy, "10.00", 0));
    // Zero price on a priced kind.
    submit(&mut core, limit(2, "AAPL", Side::Buy, "0", 10));
    // Quantity above the cap.
    submit(&mut core, limit(3, "AAPL", Side::Buy, "10.00", 1_000_001));
    // Unrecognised symbol.
    submit(&mut core, limit(4, "MSFT", Side::Buy, "10.00", 10));

    let reports = captured.reports();
    assert_eq!(reports.len(), 4);
    assert!(reports.iter().all(|r| r.status == OrderStatus::Rejected));
    assert_eq!(reports[0].reject_reason, Some(RejectReason::InvalidQuantity));
    assert_eq!(reports[1].reject_reason, Some(RejectReason::InvalidPrice));
    assert_eq!(reports[2].reject_reason, Some(RejectReason::InvalidQuantity));
    assert_eq!(reports[3].reject_reason, Some(RejectReason::UnknownSymbol));
    assert_eq!(captured.stats.snapshot().orders_rejected, 4);
}

#[test]
fn test_duplicate_order_id_rejected() {
    let (mut core, captured) = core(&["AAPL"]);
    submit(&mut core, limit(7, "AAPL", Side::Buy, "10.00", 10));
    submit(&mut core, limit(7, "AAPL", Side::Buy, "9.99", 10));

    let report = captured.reports().pop().unwrap();
    assert_eq!(report.status, OrderStatus::Rejected);
    assert_eq!(report.reject_reason, Some(RejectReason::DuplicateOrderId));
    // The original order is untouched.
    assert_eq!(
        core.book(sym("AAPL")).unwrap().orders_at(Side::Buy, px("10.00")),
        vec![(OrderId::new(7), 10)]
    );
}

#[test]
fn test_cancel_lifecycle_and_unknown_cancel() {
    let (mut core, captured) = core(&["AAPL"]);
    submit(&mut core, limit(1, "AAPL", Side::Buy, "10.00", 10));
    core.process(Command::Cancel(OrderId::new(1)));

    let report = captured.last_report(OrderId::new(1)).unwrap();
    assert_eq!(report.status, OrderStatus::Cancelled);
    assert!(core.book(sym("AAPL")).unwrap().is_empty());

    // Cancelling again is unknown: an error event, no report.
    let reports_before = captured.reports().len();
    core.process(Command::Cancel(OrderId::new(1)));
    assert_eq!(captured.reports().len(), reports_before);
    assert!(captured.errors().iter().any(|(code, _)| code == "UNKNOWN_ORDER"));
}

#[test]
fn test_modify_loses_time_priority_and_uses_fresh_id() {
    let (mut core, captured) = core(&["AAPL"]);
    submit(&mut core, limit(1, "AAPL", Side::Buy, "10.00", 10));
    submit(&mut core, limit(2, "AAPL", Side::Buy, "10.00", 10));

    core.process(Command::Modify {
        order_id: OrderId::new(1),
        new_price: px("10.00"),
        new_quantity: 5,
    });

    let book = core.book(sym("AAPL")).unwrap();
    let level = book.orders_at(Side::Buy, px("10.00"));
    assert_eq!(level.len(), 2);
    // Order 2 is now at the front; the replacement queues behind it.
    assert_eq!(level[0].0, OrderId::new(2));
    let replacement = level[1].0;
    assert!(replacement.raw() >= 1 << 63);
    assert_eq!(level[1].1, 5);
    assert!(!book.contains(OrderId::new(1)));

    // Cancel report for the original, then an ack for the replacement.
    assert_eq!(
        captured.last_report(OrderId::new(1)).unwrap().status,
        OrderStatus::Cancelled
    );
    assert_eq!(
        captured.last_report(replacement).unwrap().status,
        OrderStatus::Pending
    );
}

#[test]
fn test_reports_in_submission_order_with_fills_in_match_order() {
    let (mut core, captured) = core(&["AAPL"]);
    submit(&mut core, limit(1, "AAPL", Side::Sell, "10.00", 50));
    submit(&mut core, limit(2, "AAPL", Side::Sell, "10.00", 50));
    submit(&mut core, limit(3, "AAPL", Side::Buy, "10.00", 80));

    let reports = captured.reports();
    let ids: Vec<_> = reports.iter().map(|r| r.order_id.raw()).collect();
    assert_eq!(ids, vec![1, 2, 3]);

    let report = &reports[2];
    assert_eq!(report.fills.len(), 2);
    assert_eq!(report.fills[0].passive_id, OrderId::new(1));
    assert_eq!(report.fills[1].passive_id, OrderId::new(2));
    assert_eq!(
        report.filled_quantity,
        report.fills.iter().map(|f| f.quantity).sum::<u64>()
    );
}

#[test]
fn test_resting_ack_is_pending() {
    let (mut core, captured) = core(&["AAPL"]);
    submit(&mut core, limit(1, "AAPL", Side::Buy, "9.00", 10));
    let report = captured.last_report(OrderId::new(1)).unwrap();
    assert_eq!(report.status, OrderStatus::Pending);
    assert!(report.fills.is_empty());
}

#[test]
fn test_pro_rata_allocation_within_level() {
    let mut config = common::test_config(&["AAPL"]);
    config.matching_algorithm = MatchingAlgorithm::ProRata;
    let (mut core, captured) = common::core_with(config);

    submit(&mut core, limit(1, "AAPL", Side::Sell, "10.00", 60));
    submit(&mut core, limit(2, "AAPL", Side::Sell, "10.00", 40));
    submit(&mut core, limit(3, "AAPL", Side::Buy, "10.00", 50));

    let fills = captured.fills();
    assert_eq!(fills.len(), 2);
    // 50 · 60/100 = 30 and 50 · 40/100 = 20, in arrival order.
    assert_eq!(
        (fills[0].passive_id, fills[0].quantity),
        (OrderId::new(1), 30)
    );
    assert_eq!(
        (fills[1].passive_id, fills[1].quantity),
        (OrderId::new(2), 20)
    );

    let book = core.book(sym("AAPL")).unwrap();
    assert_eq!(
        book.orders_at(Side::Sell, px("10.00")),
        vec![(OrderId::new(1), 30), (OrderId::new(2), 20)]
    );
}

#[test]
fn test_size_priority_fills_largest_first() {
    let mut config = common::test_config(&["AAPL"]);
    config.matching_algorithm = MatchingAlgorithm::SizePriority;
    let (mut core, captured) = common::core_with(config);

    submit(&mut core, limit(1, "AAPL", Side::Sell, "10.00", 30));
    submit(&mut core, limit(2, "AAPL", Side::Sell, "10.00", 70));
    submit(&mut core, limit(3, "AAPL", Side::Buy, "10.00", 50));

    let fills = captured.fills();
    assert_eq!(fills.len(), 1);
    assert_eq!(
        (fills[0].passive_id, fills[0].quantity),
        (OrderId::new(2), 50)
    );

    let book = core.book(sym("AAPL")).unwrap();
    assert_eq!(
        book.orders_at(Side::Sell, px("10.00")),
        vec![(OrderId::new(1), 30), (OrderId::new(2), 20)]
    );
}

#[test]
fn test_better_priced_level_matches_first_across_levels() {
    let (mut core, captured) = core(&["AAPL"]);
    submit(&mut core, limit(1, "AAPL", Side::Buy, "9.99", 10));
    submit(&mut core, limit(2, "AAPL", Side::Buy, "10.00", 10));
    submit(&mut core, limit(3, "AAPL", Side::Sell, "9.99", 15));

    let fills = captured.fills();
    // Best bid 10.00 first, then 9.99; both print at the resting price.
    assert_eq!((fills[0].passive_id, fills[0].price), (OrderId::new(2), px("10.00")));
    assert_eq!((fills[1].passive_id, fills[1].price), (OrderId::new(1), px("9.99")));
    assert_eq!(fills[1].quantity, 5);
}

#[test]
fn test_position_limit_enforced() {
    let mut config = common::test_config(&["AAPL"]);
    config.per_symbol_position_limit = 100;
    let (mut core, captured) = common::core_with(config);

    // Fill 80 units: position 80.
    submit(&mut core, limit(1, "AAPL", Side::Sell, "10.00", 80));
    submit(&mut core, limit(2, "AAPL", Side::Buy, "10.00", 80));
    assert_eq!(core.position(sym("AAPL")), 80);

    // A further 50 buy would project to 130 > 100.
    submit(&mut core, limit(3, "AAPL", Side::Buy, "10.00", 50));
    let report = captured.last_report(OrderId::new(3)).unwrap();
    assert_eq!(report.status, OrderStatus::Rejected);
    assert_eq!(report.reject_reason, Some(RejectReason::PositionLimit));
}

#[test]
fn test_stats_track_matching_activity() {
    let (mut core, captured) = core(&["AAPL"]);
    submit(&mut core, limit(1, "AAPL", Side::Sell, "10.00", 50));
    submit(&mut core, limit(2, "AAPL", Side::Buy, "10.00", 50));
    submit(&mut core, limit(3, "AAPL", Side::Buy, "10.00", 0)); // reject

    let stats = captured.stats.snapshot();
    assert_eq!(stats.orders_processed, 3);
    assert_eq!(stats.orders_matched, 1);
    assert_eq!(stats.orders_rejected, 1);
    assert_eq!(stats.total_fills, 1);
    assert_eq!(stats.total_volume, 50);
    assert_eq!(stats.total_notional, px("10.00").notional(50) as u64);
    assert!(stats.matching_operations >= 2);
}
