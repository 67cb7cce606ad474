//! Order book behaviour through the public API, exercised against both
//! backends.

use crate::common::{limit, px, sym};
use venue_core::prelude::*;

fn both_backends() -> [Book; 2] {
    [Book::new(sym("AAPL"), true), Book::new(sym("AAPL"), false)]
}

fn rest(book: &mut Book, id: u64, side: Side, price: &str, quantity: u64) {
    let mut order = limit(id, "AAPL", side, price, quantity);
    order.arrival_time = id;
    book.add(order).unwrap();
}

#[test]
fn test_cancel_mid_level_keeps_fifo_and_totals() {
    for mut book in both_backends() {
        for id in 1..=1_000 {
            rest(&mut book, id, Side::Buy, "10.00", 1);
        }
        book.cancel(OrderId::new(500)).unwrap();

        let depth = book.depth(Side::Buy, 1);
        assert_eq!(depth[0].quantity, 999);
        assert_eq!(depth[0].orders, 999);

        let level = book.orders_at(Side::Buy, px("10.00"));
        assert_eq!(level.len(), 999);
        let expected: Vec<u64> = (1..=1_000).filter(|&id| id != 500).collect();
        let actual: Vec<u64> = level.iter().map(|(id, _)| id.raw()).collect();
        assert_eq!(actual, expected);

        assert!(!book.contains(OrderId::new(500)));
        book.verify_integrity().unwrap();
    }
}

#[test]
fn test_best_price_cache_tracks_mutations() {
    for mut book in both_backends() {
        rest(&mut book, 1, Side::Buy, "9.99", 10);
        rest(&mut book, 2, Side::Buy, "10.00", 10);
        rest(&mut book, 3, Side::Sell, "10.05", 10);
        assert_eq!(book.best_bid(), Some(px("10.00")));
        assert_eq!(book.best_ask(), Some(px("10.05")));

        book.cancel(OrderId::new(2)).unwrap();
        assert_eq!(book.best_bid(), Some(px("9.99")));

        book.cancel(OrderId::new(3)).unwrap();
        assert_eq!(book.best_ask(), None);
        book.verify_integrity().unwrap();
    }
}

#[test]
fn test_every_live_order_resolves_through_the_index() {
    for mut book in both_backends() {
        for id in 1..=50 {
            let price = format!("10.{:02}", id % 7);
            let side = if id % 2 == 0 { Side::Buy } else { Side::Sell };
            // Keep the book uncrossed: bids low, asks high.
            let price = if side == Side::Buy {
                format!("9.{:02}", id % 7)
            } else {
                price
            };
            rest(&mut book, id, side, &price, id);
        }
        for id in 1..=50 {
            let order = book.order(OrderId::new(id)).unwrap();
            assert_eq!(order.id, OrderId::new(id));
            let level = book.orders_at(order.side, order.price);
            assert_eq!(
                level.iter().filter(|(lid, _)| *lid == order.id).count(),
                1
            );
        }
        book.verify_integrity().unwrap();
    }
}

#[test]
fn test_level_totals_match_fifo_sums() {
    for mut book in both_backends() {
        rest(&mut book, 1, Side::Sell, "10.00", 10);
        rest(&mut book, 2, Side::Sell, "10.00", 20);
        rest(&mut book, 3, Side::Sell, "10.00", 30);

        let depth = book.depth(Side::Sell, 1);
        let level = book.orders_at(Side::Sell, px("10.00"));
        assert_eq!(
            depth[0].quantity,
            level.iter().map(|(_, q)| q).sum::<u64>()
        );
        book.verify_integrity().unwrap();
    }
}

#[test]
fn test_submit_then_cancel_round_trip_restores_book() {
    for mut book in both_backends() {
        rest(&mut book, 1, Side::Buy, "9.99", 10);
        rest(&mut book, 2, Side::Sell, "10.01", 10);
        let bids = book.depth(Side::Buy, 16);
        let asks = book.depth(Side::Sell, 16);
        let count = book.order_count();

        rest(&mut book, 99, Side::Buy, "9.50", 7);
        book.cancel(OrderId::new(99)).unwrap();

        assert_eq!(book.depth(Side::Buy, 16), bids);
        assert_eq!(book.depth(Side::Sell, 16), asks);
        assert_eq!(book.order_count(), count);
        assert!(!book.contains(OrderId::new(99)));
        book.verify_integrity().unwrap();
    }
}

#[test]
fn test_depth_snapshot_limits_and_ordering() {
    for mut book in both_backends() {
        for (id, price) in [(1, "9.97"), (2, "9.98"), (3, "9.99")] {
            rest(&mut book, id, Side::Buy, price, 10);
        }
        for (id, price) in [(4, "10.01"), (5, "10.02"), (6, "10.03")] {
            rest(&mut book, id, Side::Sell, price, 10);
        }

        let bids = book.depth(Side::Buy, 2);
        assert_eq!(bids.len(), 2);
        assert_eq!(bids[0].price, px("9.99"));
        assert_eq!(bids[1].price, px("9.98"));

        let asks = book.depth(Side::Sell, 2);
        assert_eq!(asks[0].price, px("10.01"));
        assert_eq!(asks[1].price, px("10.02"));
    }
}

#[test]
fn test_peek_match_is_pure_inspection() {
    for mut book in both_backends() {
        rest(&mut book, 1, Side::Sell, "10.00", 100);
        let before = book.depth(Side::Sell, 4);

        assert_eq!(book.peek_match(Side::Buy, 60, Some(px("10.00"))), 60);
        assert_eq!(book.peek_match(Side::Buy, 200, Some(px("10.00"))), 100);
        assert_eq!(book.peek_match(Side::Buy, 200, Some(px("9.99"))), 0);

        assert_eq!(book.depth(Side::Sell, 4), before);
    }
}
