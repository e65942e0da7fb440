use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::time::Duration;
use wisp::{
    ComparisonEngine, EngineConfig, GhostProfile, GhostType, LocationFix, RouteBuilder,
    RunSession, SessionPhase,
    geo::{Coordinate, offset_north, polyline},
    ghost::GhostRoutePoint,
};

const ORIGIN: Coordinate = Coordinate {
    latitude: 45.4642,
    longitude: 9.19,
};

fn fixes(count: usize) -> Vec<LocationFix> {
    (0..count)
        .map(|i| {
            let t = (i * 2) as f64;
            LocationFix::new(offset_north(&ORIGIN, t * 3.5), t, 5.)
        })
        .collect()
}

fn route_ghost(points: usize) -> GhostProfile {
    let points = (0..=points)
        .map(|i| GhostRoutePoint {
            elapsed_seconds: i as f64 * 2.,
            cumulative_distance: i as f64 * 7.5,
        })
        .collect();
    GhostProfile::from_route_points(GhostType::PastRun, "past", points).unwrap()
}

fn bench_route_builder(c: &mut Criterion) {
    let mut group = c.benchmark_group("route_builder");

    for count in [100, 1_000, 10_000] {
        let fixes = fixes(count);
        group.bench_with_input(BenchmarkId::new("ingest", count), &fixes, |b, fixes| {
            b.iter(|| {
                let mut builder = RouteBuilder::new(&EngineConfig::default());
                for fix in fixes {
                    black_box(builder.ingest(fix));
                }
                builder.total_distance()
            });
        });
    }

    group.finish();
}

fn bench_ghost_clock(c: &mut Criterion) {
    let mut group = c.benchmark_group("ghost_clock");

    // a marathon recorded every two seconds
    let clock = route_ghost(5_600).clock();
    group.bench_function("time_at_distance", |b| {
        let mut distance = 0.;
        b.iter(|| {
            distance = (distance + 13.7) % 42_000.;
            black_box(clock.time_at_distance(black_box(distance)))
        });
    });
    group.bench_function("distance_at_time", |b| {
        let mut time = 0.;
        b.iter(|| {
            time = (time + 3.1) % 11_200.;
            black_box(clock.distance_at_time(black_box(time)))
        });
    });

    group.finish();
}

fn bench_comparison(c: &mut Criterion) {
    let mut group = c.benchmark_group("comparison");

    group.bench_function("sample_one_hour", |b| {
        let ghost = route_ghost(1_800);
        b.iter(|| {
            let mut engine = ComparisonEngine::new(ghost.clock(), &EngineConfig::default());
            for t in 0..3_600 {
                let t = t as f64;
                black_box(engine.sample(t, t, t * 3.6));
            }
            engine.finish(3_600., 12_960.)
        });
    });

    group.finish();
}

fn bench_session(c: &mut Criterion) {
    let mut group = c.benchmark_group("session");
    group.measurement_time(Duration::from_secs(10));

    let fixes = fixes(1_800);
    let ghost = route_ghost(1_800);
    group.bench_function("one_hour_run", |b| {
        b.iter(|| {
            let mut session = RunSession::new(EngineConfig {
                countdown_ticks: 0,
                ..Default::default()
            });
            session.start_countdown(ghost.clone()).unwrap();
            assert_eq!(session.phase(), SessionPhase::Running);
            for fix in &fixes {
                session.tick();
                session.tick();
                session.on_fix(fix);
            }
            session.stop().cloned()
        });
    });

    group.finish();
}

fn bench_polyline(c: &mut Criterion) {
    let coordinates: Vec<Coordinate> = (0..2_000)
        .map(|i| offset_north(&ORIGIN, i as f64 * 10.))
        .collect();
    let encoded = polyline::encode(&coordinates, polyline::DEFAULT_PRECISION);

    c.bench_function("polyline_decode_2000", |b| {
        b.iter(|| polyline::decode(black_box(&encoded), polyline::DEFAULT_PRECISION))
    });
}

criterion_group!(
    benches,
    bench_route_builder,
    bench_ghost_clock,
    bench_comparison,
    bench_session,
    bench_polyline
);
criterion_main!(benches);
