use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use zonewatch::{
    classify, EventBus, LatLng, MonitoringSession, PositionSample, SessionOptions, Zone, ZoneStore,
};

/// Mixed zone set spread over roughly a 20 km square.
fn make_zones(count: usize) -> Vec<Zone> {
    (0..count)
        .map(|i| {
            let lat = 28.5 + (i % 64) as f64 * 0.003;
            let lng = 77.1 + (i / 64) as f64 * 0.003;
            let center = LatLng::new(lat, lng);
            match i % 3 {
                0 => Zone::circle(format!("c{i}"), "circle", center, 0.5).with_risk_label("High"),
                1 => Zone::point(format!("p{i}"), "point", center).with_risk_label("Medium"),
                _ => Zone::polygon(
                    format!("g{i}"),
                    "polygon",
                    &[
                        center,
                        LatLng::new(lat + 0.002, lng),
                        LatLng::new(lat + 0.002, lng + 0.002),
                        LatLng::new(lat, lng + 0.002),
                    ],
                ),
            }
        })
        .collect()
}

fn bench_classify(c: &mut Criterion) {
    let zones = make_zones(3);
    let point = LatLng::new(28.5005, 77.1005);
    let mut group = c.benchmark_group("evaluation/classify");
    for zone in &zones {
        group.bench_function(zone.shape.kind(), |b| b.iter(|| classify(black_box(zone), black_box(point))));
    }
    group.finish();
}

fn bench_session_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluation/session_pass");
    for count in [16usize, 256, 2048] {
        let store = Arc::new(ZoneStore::with_zones(make_zones(count)));
        let bus = Arc::new(EventBus::new());
        let _stream = bus.stream(&[], 1 << 16);
        let session = MonitoringSession::detached(store, bus, SessionOptions::default());
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            let mut tick = 0i64;
            b.iter(|| {
                tick += 1;
                // Walk back and forth so transitions keep firing.
                let offset = (tick % 200) as f64 * 0.0005;
                let sample = PositionSample::new(
                    LatLng::new(28.5 + offset, 77.1 + offset),
                    start + Duration::seconds(tick * 11),
                );
                session.on_sample(black_box(&sample));
            });
        });
    }
    group.finish();
}

criterion_group!(evaluation, bench_classify, bench_session_pass);
criterion_main!(evaluation);
