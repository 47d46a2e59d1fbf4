//! Failure-path overhead benchmarks.
//!
//! Every iteration makes a wrapper refuse a negative descriptor, so the
//! cost measured is validation plus whatever the diagnostic does next:
//! dropped by the threshold, delivered to a null sink, or captured.

use std::cell::RefCell;
use std::sync::Arc;
use std::time::{Duration, Instant};

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use guardlibc_abi::unistd_abi;
use guardlibc_membrane::config::{LogThreshold, set_log_threshold};
use guardlibc_membrane::diag::{self, NullSink};

#[derive(Default)]
struct BenchStats {
    samples_ns_per_op: Vec<f64>,
    total_iters: u64,
    total_ns: u128,
}

impl BenchStats {
    fn record(&mut self, iters: u64, dur: Duration) {
        let ns = dur.as_nanos();
        self.total_iters = self.total_iters.saturating_add(iters);
        self.total_ns = self.total_ns.saturating_add(ns);
        self.samples_ns_per_op.push(ns as f64 / iters as f64);
    }

    fn report(&self, bench_label: &str) {
        let mut samples = self.samples_ns_per_op.clone();
        if samples.is_empty() {
            return;
        }
        samples.sort_by(f64::total_cmp);
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        println!(
            "DIAG_BENCH bench={} samples={} p50_ns_op={:.3} p95_ns_op={:.3} p99_ns_op={:.3} mean_ns_op={:.3}",
            bench_label,
            samples.len(),
            percentile_sorted(&samples, 0.50),
            percentile_sorted(&samples, 0.95),
            percentile_sorted(&samples, 0.99),
            mean,
        );
    }
}

fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    debug_assert!((0.0..=1.0).contains(&p));
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * p).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn measure(c: &mut Criterion, label: &str, op: impl Fn()) {
    let stats = RefCell::new(BenchStats::default());
    c.bench_function(&format!("diag/{label}"), |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();
            for _ in 0..iters {
                op();
            }
            let dur = start.elapsed().max(Duration::from_nanos(1));
            stats.borrow_mut().record(iters, dur);
            dur
        });
    });
    stats.borrow().report(label);
}

fn bench_failure_path(c: &mut Criterion) {
    let refused = || {
        black_box(unistd_abi::close(black_box(-1)).is_err());
    };

    set_log_threshold(LogThreshold::Off);
    measure(c, "filtered", refused);
    set_log_threshold(LogThreshold::Warn);

    let null = Arc::new(NullSink);
    measure(c, "null_sink", || diag::with_sink(null.clone(), refused));

    measure(c, "captured", || {
        black_box(diag::capture(refused).1.len());
    });

    let mut group = c.benchmark_group("diag_success_path");
    group.throughput(Throughput::Elements(1));
    group.bench_function(BenchmarkId::new("close_pipe", "guardlibc"), |b| {
        b.iter_custom(|iters| {
            let mut total = Duration::ZERO;
            for _ in 0..iters {
                let Ok([rd, wr]) = unistd_abi::pipe() else {
                    continue;
                };
                let start = Instant::now();
                let _ = unistd_abi::close(rd);
                let _ = unistd_abi::close(wr);
                total += start.elapsed();
            }
            total.max(Duration::from_nanos(1))
        });
    });
    group.finish();
}

criterion_group!(
    name = benches;
    config = Criterion::default()
        .warm_up_time(Duration::from_millis(100))
        .measurement_time(Duration::from_secs(2))
        .sample_size(100);
    targets = bench_failure_path
);
criterion_main!(benches);
