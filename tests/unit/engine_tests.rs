//! Threaded engine and full-venue wiring: lifecycle, ordering,
//! backpressure and the byte-stream path from decoder to report.

use crate::common::{self, capture_bus, limit, order_of_kind, px, sym, test_config, wait_until};
use std::sync::Arc;
use venue_core::prelude::*;
use venue_core::session::tags;

#[test]
fn test_threaded_engine_matches_and_reports() {
    let (bus, captured) = capture_bus();
    let mut engine =
        MatchingEngine::new(&test_config(&["AAPL"]), bus, Timebase::new()).unwrap();
    engine.start().unwrap();

    engine.submit(limit(1, "AAPL", Side::Sell, "10.00", 100)).unwrap();
    engine.submit(limit(2, "AAPL", Side::Buy, "10.00", 60)).unwrap();

    assert!(wait_until(2_000, || captured.reports().len() == 2));
    engine.stop();

    assert_eq!(captured.fills().len(), 1);
    let stats = engine.stats();
    assert_eq!(stats.orders_processed, 2);
    assert_eq!(stats.orders_matched, 1);

    // Post-stop inspection of the book through the reclaimed core.
    let core = engine.core().unwrap();
    let book = core.book(sym("AAPL")).unwrap();
    assert_eq!(book.depth(Side::Sell, 1)[0].quantity, 40);
}

#[test]
fn test_reports_follow_submission_order() {
    let (bus, captured) = capture_bus();
    let mut engine =
        MatchingEngine::new(&test_config(&["AAPL"]), bus, Timebase::new()).unwrap();
    engine.start().unwrap();

    for id in 1..=50u64 {
        engine
            .submit(limit(id, "AAPL", Side::Buy, "9.00", 1))
            .unwrap();
    }
    assert!(wait_until(2_000, || captured.reports().len() == 50));
    engine.stop();

    let ids: Vec<u64> = captured.reports().iter().map(|r| r.order_id.raw()).collect();
    assert_eq!(ids, (1..=50).collect::<Vec<_>>());
}

#[test]
fn test_backpressure_is_reported_not_blocked() {
    let (bus, _captured) = capture_bus();
    let mut config = test_config(&["AAPL"]);
    config.ingress_capacity = 1 << 10;
    let engine = MatchingEngine::new(&config, bus, Timebase::new()).unwrap();
    // Worker not started: the ring fills up.
    for id in 0..1024u64 {
        engine
            .submit(limit(id + 1, "AAPL", Side::Buy, "9.00", 1))
            .unwrap();
    }
    let overflow = engine.submit(limit(9_999, "AAPL", Side::Buy, "9.00", 1));
    assert_eq!(overflow, Err(EngineError::Backpressure));
    assert_eq!(engine.stats().queue_drops, 1);
}

#[test]
fn test_stop_drains_pending_commands() {
    let (bus, captured) = capture_bus();
    let mut engine =
        MatchingEngine::new(&test_config(&["AAPL"]), bus, Timebase::new()).unwrap();
    engine.start().unwrap();
    for id in 1..=20u64 {
        engine
            .submit(limit(id, "AAPL", Side::Buy, "9.00", 1))
            .unwrap();
    }
    engine.stop();
    // Everything enqueued before stop is processed within the grace bound.
    assert_eq!(captured.reports().len(), 20);
}

#[test]
fn test_multi_producer_submissions_all_processed() {
    let (bus, captured) = capture_bus();
    let mut engine =
        MatchingEngine::new(&test_config(&["AAPL"]), bus, Timebase::new()).unwrap();
    engine.start().unwrap();

    let mut producers = Vec::new();
    for p in 0..4u64 {
        let handle = engine.handle();
        producers.push(std::thread::spawn(move || {
            for i in 0..100u64 {
                let id = p * 1_000 + i + 1;
                let mut order = limit(id, "AAPL", Side::Buy, "9.00", 1);
                order.arrival_time = 0;
                while handle.submit(order).is_err() {
                    std::thread::yield_now();
                }
            }
        }));
    }
    for producer in producers {
        producer.join().unwrap();
    }
    assert!(wait_until(3_000, || captured.reports().len() == 400));
    engine.stop();
    assert_eq!(engine.stats().orders_processed, 400);
}

#[test]
fn test_venue_end_to_end_bytes_to_report() {
    let (bus, captured) = capture_bus();
    let mut venue = Venue::new(test_config(&["AAPL"]), bus).unwrap();
    venue.start().unwrap();

    let sell = FixMessageBuilder::new("CLIENT", "VENUE")
        .msg_type("D")
        .msg_seq_num(1)
        .sending_time("20260801-12:00:00.000")
        .field(tags::CL_ORD_ID, "1")
        .field(tags::SYMBOL, "AAPL")
        .field(tags::SIDE, "2")
        .field(tags::ORDER_QTY, "100")
        .field(tags::PRICE, "10")
        .encode();
    let buy = FixMessageBuilder::new("CLIENT", "VENUE")
        .msg_type("D")
        .msg_seq_num(2)
        .sending_time("20260801-12:00:00.000")
        .field(tags::CL_ORD_ID, "2")
        .field(tags::SYMBOL, "AAPL")
        .field(tags::SIDE, "1")
        .field(tags::ORDER_QTY, "60")
        .field(tags::PRICE, "10")
        .encode();

    venue.feed(1, &sell);
    assert!(wait_until(2_000, || venue.stats().orders_processed == 1));
    venue.feed(1, &buy);
    assert!(wait_until(2_000, || captured.reports().len() == 2));

    let fills = captured.fills();
    assert_eq!(fills.len(), 1);
    assert_eq!(fills[0].aggressive_id, OrderId::new(2));
    assert_eq!(fills[0].price, px("10"));
    assert_eq!(fills[0].quantity, 60);

    assert_eq!(venue.decoder_stats().messages_parsed, 2);
    venue.stop();

    // The execution report round-trips onto the wire as a type-8 frame.
    let report = captured.last_report(OrderId::new(2)).unwrap();
    let frame = encode_execution_report(&report, "VENUE", "CLIENT", 1);
    let parsed = FixMessage::parse(&frame).unwrap();
    assert_eq!(parsed.msg_type, "8");
    assert_eq!(parsed.get_field(tags::ORD_STATUS), Some("2"));
}

#[test]
fn test_venue_direct_submission_and_cancel() {
    let (bus, captured) = capture_bus();
    let mut venue = Venue::new(test_config(&["AAPL"]), bus).unwrap();
    venue.start().unwrap();

    venue.submit(limit(1, "AAPL", Side::Buy, "9.99", 10)).unwrap();
    assert!(wait_until(2_000, || captured.reports().len() == 1));
    venue.cancel(OrderId::new(1)).unwrap();
    assert!(wait_until(2_000, || {
        captured
            .last_report(OrderId::new(1))
            .map(|r| r.status == OrderStatus::Cancelled)
            .unwrap_or(false)
    }));
    venue.stop();
    assert!(venue.core().unwrap().book(sym("AAPL")).unwrap().is_empty());
}

#[test]
fn test_immediate_kinds_never_rest_via_engine() {
    let (bus, captured) = capture_bus();
    let mut engine =
        MatchingEngine::new(&test_config(&["AAPL"]), bus, Timebase::new()).unwrap();
    engine.start().unwrap();

    engine
        .submit(order_of_kind(1, "AAPL", Side::Buy, OrderKind::Ioc, "10.00", 5))
        .unwrap();
    engine
        .submit(order_of_kind(2, "AAPL", Side::Sell, OrderKind::Market, "0", 5))
        .unwrap();
    assert!(wait_until(2_000, || captured.reports().len() == 2));
    engine.stop();

    let book = engine.core().unwrap().book(common::sym("AAPL")).unwrap();
    assert!(book.is_empty());
    // IOC on an empty book cancels; market on an empty book rejects.
    assert_eq!(
        captured.last_report(OrderId::new(1)).unwrap().status,
        OrderStatus::Cancelled
    );
    assert_eq!(
        captured.last_report(OrderId::new(2)).unwrap().status,
        OrderStatus::Rejected
    );
}
