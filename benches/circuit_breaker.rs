use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sentrymesh::breaker::{calculate_backoff_delay, is_healthy, record_failure, record_success, CircuitBreakerStats};
use sentrymesh::clock::{Clock, ManualClock};
use sentrymesh::config::BreakerConfig;
use std::sync::Arc;

fn bench_record_success(c: &mut Criterion) {
    c.bench_function("record_success", |b| {
        b.iter(|| {
            let stats = CircuitBreakerStats::default();
            black_box(record_success(&stats));
        })
    });
}

fn bench_record_failure(c: &mut Criterion) {
    let cfg = BreakerConfig::default();
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new());
    c.bench_function("record_failure", |b| {
        b.iter(|| {
            let stats = CircuitBreakerStats::default();
            black_box(record_failure(&stats, &cfg, clock.as_ref()));
        })
    });
}

fn bench_is_healthy(c: &mut Criterion) {
    let cfg = BreakerConfig::default();
    let stats = CircuitBreakerStats::default();
    c.bench_function("is_healthy", |b| {
        b.iter(|| black_box(is_healthy(&stats, &cfg)));
    });
}

fn bench_calculate_backoff_delay(c: &mut Criterion) {
    let cfg = BreakerConfig::default();
    c.bench_function("calculate_backoff_delay", |b| {
        b.iter(|| black_box(calculate_backoff_delay(black_box(4), &cfg)));
    });
}

fn bench_failure_then_recovery_cycle(c: &mut Criterion) {
    let cfg = BreakerConfig::default();
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new());
    c.bench_function("failure_then_recovery_cycle", |b| {
        b.iter(|| {
            let mut stats = CircuitBreakerStats::default();
            for _ in 0..cfg.failure_threshold {
                stats = record_failure(&stats, &cfg, clock.as_ref());
            }
            black_box(&stats);
            stats = record_success(&stats);
            black_box(stats);
        })
    });
}

criterion_group!(
    breaker_policy,
    bench_record_success,
    bench_record_failure,
    bench_is_healthy,
    bench_calculate_backoff_delay,
    bench_failure_then_recovery_cycle,
);
criterion_main!(breaker_policy);
