use criterion::{black_box, criterion_group, criterion_main, Criterion};
use chrono::{Duration, TimeZone, Utc};
use rusty_fxlens::{
    analytics::VolatilityCalculator,
    record::{CurrencyRecord, SpotObservation},
    sources::{InMemoryRateProvider, InMemorySpotHistoryProvider},
    orchestrator::FetchOrchestrator,
    store::{RecordStore, SqliteStore},
};
use std::sync::Arc;

fn history(days: i64) -> Vec<SpotObservation> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..days)
        .map(|i| {
            let price = 150.0 * f64::exp(0.004 * (i as f64 * 0.7).sin());
            SpotObservation::new(start + Duration::days(i), price)
        })
        .collect()
}

fn benchmark_realised_vol(c: &mut Criterion) {
    let calculator = VolatilityCalculator::daily();
    let month = history(30);
    let decade = history(2520);

    c.bench_function("realised_vol_30d", |b| {
        b.iter(|| calculator.compute(black_box(&month)).unwrap())
    });

    c.bench_function("realised_vol_10y", |b| {
        b.iter(|| calculator.compute(black_box(&decade)).unwrap())
    });
}

fn benchmark_store_upsert(c: &mut Criterion) {
    let store = SqliteStore::new_in_memory().unwrap();
    let runtime = tokio::runtime::Runtime::new().unwrap();

    // Seed one realistic record from a cycle, then rewrite it repeatedly
    let rates = InMemoryRateProvider::with_rates(&[("USD", 5.25), ("JPY", 0.1)]);
    let spots = InMemorySpotHistoryProvider::new();
    spots.set_history("JPY", history(30));
    let orchestrator = FetchOrchestrator::new(Arc::new(rates), Arc::new(spots), Arc::new(store))
        .with_currencies(&["USD", "JPY"])
        .unwrap();
    let result = runtime.block_on(orchestrator.run_cycle()).unwrap();
    let record: CurrencyRecord = result.records[1].clone();

    c.bench_function("store_upsert_30d_history", |b| {
        b.iter(|| orchestrator.store().upsert(black_box(&record)).unwrap())
    });
}

fn benchmark_full_cycle(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("cycle_18_currencies", |b| {
        b.iter(|| {
            let rates = InMemoryRateProvider::with_rates(&[("USD", 5.25)]);
            let spots = InMemorySpotHistoryProvider::new();
            for spec in rusty_fxlens::currency::CURRENCIES.iter().filter(|c| !c.is_pegged()) {
                rates.set_rate(spec.code, 3.0);
                spots.set_history(spec.code, history(30));
            }
            let store = SqliteStore::new_in_memory().unwrap();
            let orchestrator = FetchOrchestrator::new(Arc::new(rates), Arc::new(spots), Arc::new(store));
            runtime.block_on(orchestrator.run_cycle()).unwrap()
        });
    });
}

criterion_group!(
    benches,
    benchmark_realised_vol,
    benchmark_store_upsert,
    benchmark_full_cycle
);
criterion_main!(benches);
