#[allow(dead_code)]
pub mod bench_test_utils;
