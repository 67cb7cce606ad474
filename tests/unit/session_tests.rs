//! Session layer end to end: framing recovery, checksum handling,
//! admission at decoder egress, and session teardown.

use crate::common::{test_config, wait_until};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use venue_core::admission::RateGate;
use venue_core::prelude::*;
use venue_core::session::{MessageCallback, SessionErrorCallback, tags};

fn order_frame(seq: u32, cl_ord_id: u64) -> Vec<u8> {
    FixMessageBuilder::new("CLIENT", "VENUE")
        .msg_type("D")
        .msg_seq_num(seq)
        .sending_time("20260801-12:00:00.000")
        .field(tags::CL_ORD_ID, &cl_ord_id.to_string())
        .field(tags::SYMBOL, "AAPL")
        .field(tags::SIDE, "1")
        .field(tags::ORDER_QTY, "100")
        .field(tags::PRICE, "10")
        .encode()
}

struct DecoderHarness {
    decoder: SessionDecoder,
    messages: Arc<Mutex<Vec<FixMessage>>>,
    errors: Arc<Mutex<Vec<(String, String)>>>,
}

fn harness(config: &VenueConfig) -> DecoderHarness {
    let messages = Arc::new(Mutex::new(Vec::new()));
    let errors = Arc::new(Mutex::new(Vec::new()));

    let mut decoder = SessionDecoder::new(config);
    let sink = Arc::clone(&messages);
    let message_cb: MessageCallback = Arc::new(move |message: &FixMessage| {
        sink.lock().unwrap().push(message.clone());
    });
    decoder.set_message_callback(message_cb);
    let sink = Arc::clone(&errors);
    let error_cb: SessionErrorCallback = Arc::new(move |code: &str, message: &str| {
        sink.lock()
            .unwrap()
            .push((code.to_string(), message.to_string()));
    });
    decoder.set_error_callback(error_cb);

    DecoderHarness {
        decoder,
        messages,
        errors,
    }
}

#[test]
fn test_frame_recovery_across_junk() {
    let config = test_config(&[]);
    let mut h = harness(&config);
    h.decoder.start();

    let mut stream = order_frame(1, 1);
    stream.extend_from_slice(b"0123456789abcdef"); // 16 junk bytes
    stream.extend_from_slice(&order_frame(2, 2));
    h.decoder.feed(7, &stream);

    assert!(wait_until(2_000, || h.messages.lock().unwrap().len() == 2));
    let stats = h.decoder.stats();
    assert_eq!(stats.messages_parsed, 2);
    assert_eq!(stats.parse_errors, 1);
    assert!(!h.decoder.session_closed(7));

    let seqs: Vec<u32> = h
        .messages
        .lock()
        .unwrap()
        .iter()
        .map(|m| m.msg_seq_num)
        .collect();
    assert_eq!(seqs, vec![1, 2]);
    h.decoder.stop();
}

#[test]
fn test_checksum_failure_counted_and_frame_dropped() {
    let config = test_config(&[]);
    let mut h = harness(&config);
    h.decoder.start();

    let mut bad = order_frame(1, 1);
    let idx = bad.len() / 2;
    bad[idx] = bad[idx].wrapping_add(1);
    h.decoder.feed(1, &bad);
    h.decoder.feed(1, &order_frame(2, 2));

    assert!(wait_until(2_000, || h.messages.lock().unwrap().len() == 1));
    assert!(wait_until(2_000, || h.decoder.stats().checksum_errors == 1));
    assert_eq!(h.messages.lock().unwrap()[0].msg_seq_num, 2);
    assert!(
        h.errors
            .lock()
            .unwrap()
            .iter()
            .any(|(code, _)| code == "CHECKSUM_ERROR")
    );
    h.decoder.stop();
}

#[test]
fn test_admission_gate_rejects_at_session_layer() {
    let config = test_config(&[]);
    let mut h = harness(&config);
    // Two permits per tick, no controller rolling the tick over.
    h.decoder
        .set_admission_gate(Arc::new(RateGate::new(2, 200.0)));
    h.decoder.start();

    for i in 1..=5 {
        h.decoder.feed(1, &order_frame(i, i as u64));
    }

    assert!(wait_until(2_000, || h.messages.lock().unwrap().len() == 2));
    let stats = h.decoder.stats();
    assert_eq!(stats.admission_rejects, 3);
    assert_eq!(
        h.errors
            .lock()
            .unwrap()
            .iter()
            .filter(|(code, _)| code == "ADMISSION_REJECT")
            .count(),
        3
    );
    h.decoder.stop();
}

#[test]
fn test_session_teardown_after_error_budget() {
    let mut config = test_config(&[]);
    config.session_error_window = 8;
    config.session_error_limit = 2;
    let mut h = harness(&config);
    h.decoder.start();

    for _ in 0..5 {
        h.decoder.feed(3, b"8=FIX.4.4\x019=notanumber\x01trailing");
    }
    assert!(h.decoder.session_closed(3));
    assert!(
        h.errors
            .lock()
            .unwrap()
            .iter()
            .any(|(code, _)| code == "SESSION_CLOSED")
    );

    // A healthy session on the same decoder keeps working.
    h.decoder.feed(4, &order_frame(1, 1));
    assert!(wait_until(2_000, || !h.messages.lock().unwrap().is_empty()));
    h.decoder.stop();
}

#[test]
fn test_callback_panic_is_counted_and_workers_survive() {
    let config = test_config(&[]);
    let calls = Arc::new(AtomicU64::new(0));
    let mut decoder = SessionDecoder::new(&config);
    let counter = Arc::clone(&calls);
    decoder.set_message_callback(Arc::new(move |message: &FixMessage| {
        counter.fetch_add(1, Ordering::SeqCst);
        if message.msg_seq_num == 1 {
            panic!("listener bug");
        }
    }));
    decoder.start();

    decoder.feed(1, &order_frame(1, 1));
    decoder.feed(1, &order_frame(2, 2));

    assert!(wait_until(2_000, || calls.load(Ordering::SeqCst) == 2));
    assert!(wait_until(2_000, || decoder.stats().callback_errors == 1));
    decoder.stop();
}

#[test]
fn test_bytes_and_parse_time_accounting() {
    let config = test_config(&[]);
    let mut h = harness(&config);
    h.decoder.start();

    let frame = order_frame(1, 1);
    h.decoder.feed(1, &frame);
    assert!(wait_until(2_000, || h.decoder.stats().messages_parsed == 1));

    let stats = h.decoder.stats();
    assert_eq!(stats.bytes_processed, frame.len() as u64);
    assert!(stats.avg_parse_time_ns > 0);
    h.decoder.stop();
}
