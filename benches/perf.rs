use std::sync::Arc;

use chrono::{TimeZone, Utc};
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use seriea_forecast::evaluation::{EvaluationRecord, FinalScore, evaluate};
use seriea_forecast::fitter::{FitConfig, FitMode, Fitter};
use seriea_forecast::forecast::Forecaster;
use seriea_forecast::params::{ParameterSet, TeamRating};
use seriea_forecast::scoreline::{DEFAULT_MAX_GOALS, ScoreGrid};
use seriea_forecast::synthetic::simulate_season;

fn league(n: usize) -> ParameterSet {
    let ratings = (0..n)
        .map(|i| {
            let z = i as f64 / (n - 1) as f64 - 0.5;
            TeamRating {
                team: format!("Club {i:02}"),
                attack: 1.0 + 0.5 * z,
                defence: 1.0 - 0.4 * z,
            }
        })
        .collect();
    ParameterSet::from_ratings(ratings, 1.25, 0.0, 0.0).expect("valid ratings")
}

fn bench_grid_build(c: &mut Criterion) {
    c.bench_function("grid_build", |b| {
        b.iter(|| {
            let grid = ScoreGrid::build(black_box(1.45), black_box(1.05), 0.03, DEFAULT_MAX_GOALS);
            black_box(grid.outcome_probs());
        })
    });
}

fn bench_forecast(c: &mut Criterion) {
    let forecaster = Forecaster::new(Arc::new(league(20)));
    c.bench_function("forecast", |b| {
        b.iter(|| {
            let bundle = forecaster
                .forecast(black_box("Club 03"), black_box("Club 17"))
                .unwrap();
            black_box(bundle.home_win);
        })
    });
}

fn bench_goal_fit(c: &mut Criterion) {
    let start = Utc.with_ymd_and_hms(2024, 8, 18, 18, 45, 0).unwrap();
    let season = simulate_season(&league(20), 19, start, 5);
    let fitter = Fitter::new(FitConfig::default());
    let mut group = c.benchmark_group("fit");
    group.sample_size(10);
    group.bench_function("goal_fit_half_season", |b| {
        b.iter(|| {
            let params = fitter.fit(black_box(&season), FitMode::Goals).unwrap();
            black_box(params.home_advantage());
        })
    });
    group.finish();
}

fn bench_evaluate_season(c: &mut Criterion) {
    let truth = league(20);
    let start = Utc.with_ymd_and_hms(2024, 8, 18, 18, 45, 0).unwrap();
    let season = simulate_season(&truth, 38, start, 9);
    let forecaster = Forecaster::new(Arc::new(truth));
    let records: Vec<EvaluationRecord> = season
        .iter()
        .map(|m| {
            EvaluationRecord::new(
                forecaster.forecast(&m.home, &m.away).unwrap(),
                FinalScore::new(m.home_goals, m.away_goals),
            )
        })
        .collect();

    c.bench_function("evaluate_season", |b| {
        b.iter(|| {
            let report = evaluate(black_box(&records));
            black_box(report.one_x_two.log_loss);
        })
    });
}

criterion_group!(
    perf,
    bench_grid_build,
    bench_forecast,
    bench_goal_fit,
    bench_evaluate_season
);
criterion_main!(perf);
