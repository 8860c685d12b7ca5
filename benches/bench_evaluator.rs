//! Admission decision benchmarks.
//!
//! Measures `LimitsEvaluator::evaluate` in isolation: bucket classification,
//! the check-and-count step under the store lock and the fair-share
//! computation once the soft limit is exceeded. Admitted decisions are
//! dropped inside the iteration, so each one also pays for its release.
//! No network involved.
//!
//! ## Run
//! ```bash
//! cargo bench --bench bench_evaluator
//! # Save a named baseline for regression comparison:
//! cargo bench --bench bench_evaluator -- --save-baseline v0_1_0
//! ```

use std::hint::black_box;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use http::Request;
use rate_limiter_proxy_lib::limits::{
    Decision, EvaluatorOptions, LimitsEvaluator, RawLimitsConfig,
};
use rate_limiter_proxy_lib::ForwardedIpResolver;
use serde_json::json;

const PEER: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 10));

fn evaluator(buckets: usize) -> LimitsEvaluator {
    let mut raw: Vec<_> = (0..buckets)
        .map(|i| {
            json!({
                "name": format!("tenant-{i}"),
                "conditions": [
                    ["header", "x-tenant", "eq", format!("{i}")],
                    ["path", "matches", "^/api/"]
                ],
                "limits": {"capacity_unit": 1 + i % 4}
            })
        })
        .collect();
    raw.push(json!({"name": "default", "limits": {"capacity_unit": 2}}));

    let config: RawLimitsConfig =
        serde_json::from_value(json!({"max_requests": 1000, "buffer_ratio": 0.2, "buckets": raw}))
            .unwrap_or_else(|e| panic!("benchmark configuration is invalid: {e}"));
    let evaluator = LimitsEvaluator::new(
        EvaluatorOptions::default(),
        Arc::new(ForwardedIpResolver::default()),
    );
    evaluator
        .update_config(&config)
        .unwrap_or_else(|e| panic!("benchmark configuration is rejected: {e}"));
    evaluator
}

fn request(tenant: usize) -> Request<()> {
    Request::builder()
        .uri("/api/orders?limit=20")
        .header("x-tenant", tenant.to_string())
        .header("x-forwarded-for", "198.51.100.7, 10.0.0.2")
        .body(())
        .unwrap_or_else(|e| panic!("benchmark request is invalid: {e}"))
}

fn bench_classification(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate_soft_zone");
    for buckets in [1usize, 8, 32] {
        let evaluator = evaluator(buckets);
        // Last specific bucket: every condition list before it is tried
        let req = request(buckets - 1);
        group.bench_with_input(BenchmarkId::from_parameter(buckets), &req, |b, req| {
            b.iter(|| black_box(evaluator.evaluate(black_box(req), Some(PEER))))
        });
    }
    group.finish();
}

fn bench_fair_share(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate_over_soft_limit");
    for buckets in [8usize, 32] {
        let evaluator = evaluator(buckets);
        // Push global past the 800 soft limit, spread across every bucket
        let mut in_flight = Vec::new();
        for i in 0..850 {
            if let Decision::Forward(Some(guard)) =
                evaluator.evaluate(&request(i % buckets), Some(PEER))
            {
                in_flight.push(guard);
            }
        }
        let req = request(0);
        group.bench_with_input(BenchmarkId::from_parameter(buckets), &req, |b, req| {
            b.iter(|| black_box(evaluator.evaluate(black_box(req), Some(PEER))))
        });
        drop(in_flight);
    }
    group.finish();
}

criterion_group!(benches, bench_classification, bench_fair_share);
criterion_main!(benches);
