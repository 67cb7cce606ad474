//! Randomised invariant checks: a reference model tracks every order
//! through reports and fills, and the book must agree with it after
//! every command.

use crate::common::{self, sym};
use proptest::prelude::*;
use std::collections::HashMap;
use venue_core::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Submit {
        side: Side,
        kind: OrderKind,
        price_ticks: u64,
        quantity: u64,
    },
    Cancel {
        target: u64,
    },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        8 => (
            prop::bool::ANY,
            prop_oneof![
                5 => Just(OrderKind::Limit),
                1 => Just(OrderKind::Ioc),
                1 => Just(OrderKind::Fok),
                1 => Just(OrderKind::Market),
            ],
            95u64..=105,
            1u64..=50,
        )
            .prop_map(|(buy, kind, price_ticks, quantity)| Op::Submit {
                side: if buy { Side::Buy } else { Side::Sell },
                kind,
                price_ticks,
                quantity,
            }),
        2 => (1u64..=200).prop_map(|target| Op::Cancel { target }),
    ]
}

/// Reference state for one submitted order.
#[derive(Debug, Clone, Copy)]
struct ModelOrder {
    kind: OrderKind,
    side: Side,
    price: Price,
    quantity: u64,
    filled: u64,
    live: bool,
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_command_streams_preserve_book_invariants(
        ops in prop::collection::vec(op_strategy(), 1..120)
    ) {
        let (mut core, captured) = common::core(&["AAPL"]);
        let symbol = sym("AAPL");
        let mut model: HashMap<u64, ModelOrder> = HashMap::new();
        let mut next_id = 0u64;
        let mut all_fills: Vec<Fill> = Vec::new();
        let mut all_reports: Vec<ExecutionReport> = Vec::new();

        for op in ops {
            match op {
                Op::Submit { side, kind, price_ticks, quantity } => {
                    next_id += 1;
                    let price = if kind == OrderKind::Market {
                        Price::ZERO
                    } else {
                        Price::from_raw(price_ticks * 1_000)
                    };
                    model.insert(next_id, ModelOrder {
                        kind, side, price, quantity, filled: 0, live: false,
                    });
                    core.process(Command::Submit(Order::new(
                        OrderId::new(next_id), symbol, side, kind, price, quantity,
                    )));
                }
                Op::Cancel { target } => {
                    core.process(Command::Cancel(OrderId::new(target)));
                }
            }

            // Replay new events into the model.
            let new_fills = {
                let mut guard = captured.fills.lock().unwrap();
                std::mem::take(&mut *guard)
            };
            let new_reports = {
                let mut guard = captured.reports.lock().unwrap();
                std::mem::take(&mut *guard)
            };
            sync_model(&mut model, &new_fills, &new_reports);
            all_fills.extend(new_fills);
            all_reports.extend(new_reports);

            let book = core.book(symbol).unwrap();
            book.verify_integrity().unwrap();

            // Immediate kinds never rest.
            for (id, order) in &model {
                if order.kind != OrderKind::Limit {
                    prop_assert!(!book.contains(OrderId::new(*id)));
                }
            }

            // The book agrees with the model: same live set, same
            // remaining quantity per order.
            let mut live_in_model = 0usize;
            for (id, order) in &model {
                if order.live {
                    live_in_model += 1;
                    let resting = book.order(OrderId::new(*id));
                    prop_assert!(resting.is_some(), "order {id} missing from book");
                    let resting = resting.unwrap();
                    prop_assert_eq!(resting.remaining(), order.quantity - order.filled);
                } else {
                    prop_assert!(!book.contains(OrderId::new(*id)));
                }
            }
            prop_assert_eq!(book.order_count(), live_in_model);
        }

        // Every fill printed at the passive price, marketable for the
        // aggressor.
        for fill in &all_fills {
            let aggressor = model.get(&fill.aggressive_id.raw()).unwrap();
            match aggressor.kind {
                OrderKind::Market => {}
                _ => match aggressor.side {
                    Side::Buy => prop_assert!(fill.price <= aggressor.price),
                    Side::Sell => prop_assert!(fill.price >= aggressor.price),
                },
            }
        }

        // Reports account for their own fills.
        for report in &all_reports {
            let from_fills: u64 = report.fills.iter().map(|f| f.quantity).sum();
            if report.status != OrderStatus::Cancelled || !report.fills.is_empty() {
                prop_assert_eq!(report.filled_quantity, from_fills);
            }
        }
    }
}

/// Apply one batch of reports and fills to the reference model, in
/// emission order.
fn sync_model(model: &mut HashMap<u64, ModelOrder>, fills: &[Fill], reports: &[ExecutionReport]) {
    // Passive fills first: they are the only mutation a resting order
    // sees without a report of its own.
    for fill in fills {
        if let Some(passive) = model.get_mut(&fill.passive_id.raw())
            && passive.live
        {
            passive.filled += fill.quantity;
            if passive.filled == passive.quantity {
                passive.live = false;
            }
        }
    }

    for report in reports {
        let Some(order) = model.get_mut(&report.order_id.raw()) else {
            continue;
        };
        order.filled = report.filled_quantity;
        order.live = matches!(
            report.status,
            OrderStatus::Pending | OrderStatus::PartiallyFilled
        ) && order.kind == OrderKind::Limit;
    }
}
