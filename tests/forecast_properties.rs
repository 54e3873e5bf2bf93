use std::sync::Arc;

use chrono::{TimeZone, Utc};

use seriea_forecast::evaluation::Outcome;
use seriea_forecast::fitter::{FitConfig, FitMode, Fitter};
use seriea_forecast::forecast::{Forecaster, FormFactors};
use seriea_forecast::params::{ParameterSet, TeamRating};
use seriea_forecast::scoreline::{DEFAULT_MAX_GOALS, ScoreGrid, poisson_pmf};
use seriea_forecast::synthetic::simulate_season;

fn rating(team: &str, attack: f64, defence: f64) -> TeamRating {
    TeamRating {
        team: team.to_string(),
        attack,
        defence,
    }
}

fn fitted_league() -> Forecaster {
    let truth = ParameterSet::from_ratings(
        vec![
            rating("Atalanta", 1.3, 0.85),
            rating("Empoli", 0.75, 1.2),
            rating("Inter", 1.4, 0.8),
            rating("Monza", 0.85, 1.1),
            rating("Napoli", 1.15, 0.9),
            rating("Salernitana", 0.7, 1.3),
        ],
        1.25,
        0.0,
        0.0,
    )
    .unwrap();
    let start = Utc.with_ymd_and_hms(2023, 8, 19, 18, 30, 0).unwrap();
    let season = simulate_season(&truth, 30, start, 42);
    let params = Fitter::new(FitConfig::default())
        .fit(&season, FitMode::Goals)
        .unwrap();
    Forecaster::new(Arc::new(params))
}

#[test]
fn every_pair_yields_consistent_bundle() {
    let forecaster = fitted_league();
    let teams = forecaster.params().teams().to_vec();
    for home in &teams {
        for away in &teams {
            if home == away {
                continue;
            }
            let b = forecaster.forecast(home, away).unwrap();
            assert!((b.outcome_probs().sum() - 1.0).abs() < 1e-9);
            assert!((b.over_25 + b.under_25 - 1.0).abs() < 1e-9);
            assert!((b.btts_yes + b.btts_no - 1.0).abs() < 1e-9);
            for p in [
                b.home_win,
                b.draw,
                b.away_win,
                b.over_25,
                b.under_25,
                b.btts_yes,
                b.btts_no,
                b.modal_probability,
            ] {
                assert!((0.0..=1.0).contains(&p), "{home} v {away}: {p}");
            }
            assert!(b.expected_home_goals > 0.0 && b.expected_away_goals > 0.0);
            assert_eq!(b.clamped_mass, 0.0);
        }
    }
}

#[test]
fn grid_normalises_without_clamping_across_rate_range() {
    let rates = [0.05, 0.1, 0.5, 1.0, 1.7, 2.5, 4.0, 6.0];
    let rhos = [-0.1, -0.05, 0.0, 0.03, 0.1];
    for &lambda in &rates {
        for &mu in &rates {
            for &rho in &rhos {
                let g = ScoreGrid::build(lambda, mu, rho, DEFAULT_MAX_GOALS);
                assert!((g.total() - 1.0).abs() < 1e-9, "{lambda} {mu} {rho}");
                assert_eq!(g.clamped_mass(), 0.0);
                assert!(g.iter().all(|(_, _, p)| p >= 0.0));
                if lambda <= 4.0 && mu <= 4.0 && lambda >= 0.1 && mu >= 0.1 {
                    let p = g.outcome_probs();
                    assert!((p.home + p.draw + p.away - 1.0).abs() < 1e-9);
                }
            }
        }
    }
}

#[test]
fn low_score_correction_shifts_draw_mass() {
    let corrected = ScoreGrid::build(1.0, 1.0, 0.1, DEFAULT_MAX_GOALS);
    let raw_00 = corrected.prob(0, 0) * corrected.raw_mass();
    assert!((raw_00 - 0.9 * poisson_pmf(0, 1.0).powi(2)).abs() < 1e-15);

    let independent = ScoreGrid::build(1.0, 1.0, 0.0, DEFAULT_MAX_GOALS);
    let inflated = ScoreGrid::build(1.0, 1.0, -0.1, DEFAULT_MAX_GOALS);
    let draw = |g: &ScoreGrid| g.outcome_probs().draw;
    // Positive rho moves mass from 0-0 and 1-1 onto 1-0 and 0-1; negative rho does the reverse.
    assert!(draw(&independent) - draw(&corrected) >= 0.01);
    assert!(draw(&inflated) - draw(&independent) >= 0.01);
}

#[test]
fn repeated_calls_are_bitwise_identical() {
    let forecaster = fitted_league();
    let form = FormFactors::new(1.07, 0.93);
    let a = forecaster.forecast_with_form("Inter", "Monza", form).unwrap();
    let b = forecaster.forecast_with_form("Inter", "Monza", form).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.home_win.to_bits(), b.home_win.to_bits());
}

#[test]
fn stronger_home_attack_raises_home_win() {
    let base = ParameterSet::from_ratings(
        vec![rating("Bologna", 1.0, 1.0), rating("Torino", 1.0, 1.0)],
        1.2,
        0.05,
        0.0,
    )
    .unwrap();
    let mut last: Option<(f64, f64)> = None;
    for step in 0..8 {
        let attack = 0.6 + 0.2 * step as f64;
        let params = base.with_rating("Bologna", attack, 1.0).unwrap();
        let b = Forecaster::new(Arc::new(params))
            .forecast("Bologna", "Torino")
            .unwrap();
        if let Some((home_win, lambda)) = last {
            assert!(b.home_win > home_win);
            assert!(b.expected_home_goals > lambda);
        }
        last = Some((b.home_win, b.expected_home_goals));
    }
}

#[test]
fn swapping_roles_mirrors_probabilities_without_home_advantage() {
    let params = ParameterSet::from_ratings(
        vec![rating("Lazio", 1.2, 0.9), rating("Verona", 0.8, 1.15)],
        1.0,
        -0.04,
        0.0,
    )
    .unwrap();
    let forecaster = Forecaster::new(Arc::new(params));
    let ab = forecaster.forecast("Lazio", "Verona").unwrap();
    let ba = forecaster.forecast("Verona", "Lazio").unwrap();
    let mirrored = ba.outcome_probs().mirrored();
    for outcome in Outcome::ALL {
        assert!((ab.outcome_probs().get(outcome) - mirrored.get(outcome)).abs() < 1e-12);
    }
    assert_eq!(ab.modal_score.0, ba.modal_score.1);
}

#[test]
fn scoreline_grid_matches_bundle() {
    let forecaster = fitted_league();
    let grid = forecaster
        .scoreline_grid("Napoli", "Empoli", FormFactors::default())
        .unwrap();
    let bundle = forecaster.forecast("Napoli", "Empoli").unwrap();
    assert_eq!(grid.outcome_probs().home, bundle.home_win);
    assert_eq!(grid.modal_score().0, bundle.modal_score);
    let marginal_mean: f64 = grid
        .home_marginal()
        .iter()
        .enumerate()
        .map(|(k, p)| k as f64 * p)
        .sum();
    assert!((marginal_mean - bundle.expected_home_goals).abs() < 0.05);
}
