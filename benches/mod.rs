use criterion::{criterion_group, criterion_main};


use matching::register_benchmarks as register_matching_benchmarks;
use order_book::register_benchmarks as register_order_book_benchmarks;
use session_codec::register_benchmarks as register_session_codec_benchmarks;

// Define the benchmark groups
criterion_group!(
    benches,
    register_order_book_benchmarks,
    register_matching_benchmarks,
    register_session_codec_benchmarks,
);

criterion_main!(benches);
