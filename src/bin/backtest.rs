use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::{TimeZone, Utc};
use tracing::info;
use tracing_subscriber::EnvFilter;

use seriea_forecast::evaluation::{self, EvaluationRecord, FinalScore, Outcome};
use seriea_forecast::fitter::{FitConfig, FitMode};
use seriea_forecast::form::{FormConfig, fixture_form};
use seriea_forecast::model::DixonColesModel;
use seriea_forecast::params::{ParameterSet, TeamRating};
use seriea_forecast::synthetic::simulate_season;

const SERIE_A: &[&str] = &[
    "Atalanta",
    "Bologna",
    "Cagliari",
    "Como",
    "Cremonese",
    "Fiorentina",
    "Genoa",
    "Hellas Verona",
    "Inter",
    "Juventus",
    "Lazio",
    "Lecce",
    "Milan",
    "Napoli",
    "Parma",
    "Pisa",
    "Roma",
    "Sassuolo",
    "Torino",
    "Udinese",
];

const DEFAULT_SEED: u64 = 2024;
const DEFAULT_MATCHDAYS: usize = 38;
const DEFAULT_WARMUP: usize = 10;
const DEFAULT_REFIT_EVERY: usize = 4;

#[derive(Debug, Clone)]
struct Settings {
    seed: u64,
    matchdays: usize,
    warmup: usize,
    refit_every: usize,
    xi: f64,
    mode: FitMode,
    use_form: bool,
    out: Option<PathBuf>,
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings()?;
    let truth = truth_params(settings.seed)?;
    let start = Utc
        .with_ymd_and_hms(2025, 8, 23, 18, 30, 0)
        .single()
        .context("invalid season start")?;
    let season = simulate_season(&truth, settings.matchdays, start, settings.seed);
    let per_day = SERIE_A.len() / 2;
    info!(matches = season.len(), ?settings, "simulated season");

    let model = DixonColesModel::new(FitConfig {
        xi: settings.xi,
        ..FitConfig::default()
    });
    let form_cfg = FormConfig::default();

    let mut records = Vec::new();
    for day in settings.warmup..settings.matchdays {
        let played = &season[..day * per_day];
        if (day - settings.warmup) % settings.refit_every == 0 {
            model
                .fit(played, settings.mode)
                .with_context(|| format!("fit before matchday {}", day + 1))?;
        }
        let forecaster = model.forecaster();
        for m in &season[day * per_day..(day + 1) * per_day] {
            let form = if settings.use_form {
                fixture_form(played, &m.home, &m.away, &form_cfg)
            } else {
                Default::default()
            };
            let bundle = forecaster.forecast_with_form(&m.home, &m.away, form)?;
            records.push(EvaluationRecord::new(
                bundle,
                FinalScore::new(m.home_goals, m.away_goals),
            ));
        }
    }

    if records.is_empty() {
        return Err(anyhow!(
            "no matchdays left to evaluate (warmup {} >= matchdays {})",
            settings.warmup,
            settings.matchdays
        ));
    }

    let report = evaluation::evaluate(&records);
    let params = model.snapshot();

    println!("Walk-forward Dixon-Coles backtest (synthetic Serie A)");
    println!(
        "seed={} matchdays={} warmup={} refit_every={} mode={:?} xi={} form={}",
        settings.seed,
        settings.matchdays,
        settings.warmup,
        settings.refit_every,
        settings.mode,
        settings.xi,
        settings.use_form
    );
    println!();
    println!(
        "1x2   samples={} acc={:.4} ll={:.4} brier={:.4} ece={:.4}",
        report.one_x_two.samples,
        report.one_x_two.accuracy,
        report.one_x_two.log_loss,
        report.one_x_two.brier,
        report.one_x_two.ece
    );
    for (label, m) in [("o/u2.5", &report.over_under_25), ("btts", &report.btts)] {
        println!(
            "{label:<6}samples={} acc={:.4} ll={:.4} brier={:.4}",
            m.samples, m.accuracy, m.log_loss, m.brier
        );
    }
    println!();
    for c in &report.per_class {
        println!(
            "class {:<5} n={:<4} precision={:.3} recall={:.3} f1={:.3}",
            c.class.label(),
            c.occurrences,
            c.precision,
            c.recall,
            c.f1
        );
    }

    let preds: Vec<_> = records.iter().map(|r| r.forecast.outcome_probs()).collect();
    let outcomes: Vec<_> = records.iter().map(|r| r.outcome).collect();
    println!();
    println!("home-win calibration");
    for bin in evaluation::calibration_bins(&preds, &outcomes, Outcome::Home, 10) {
        if bin.count == 0 {
            continue;
        }
        println!(
            "  [{:.1}, {:.1}) n={:<4} pred={:.3} actual={:.3}",
            bin.bucket_start, bin.bucket_end, bin.count, bin.avg_pred, bin.actual_rate
        );
    }

    println!();
    println!(
        "final fit: home_adv={:.3} rho={:+.3} converged={}",
        params.home_advantage(),
        params.rho(),
        params.converged()
    );
    for r in params.top_attacks(5) {
        let true_attack = truth.rating(&r.team)?.attack;
        println!(
            "  {:<14} attack={:.3} (true {:.3}) defence={:.3}",
            r.team, r.attack, true_attack, r.defence
        );
    }

    if let Some(path) = settings.out {
        let file = File::create(&path).with_context(|| format!("create {}", path.display()))?;
        params.write_to(BufWriter::new(file))?;
        println!();
        println!("Wrote parameters to {}", path.display());
    }

    Ok(())
}

/// Ground-truth league: strengths spread around 1 and shuffled by the seed.
fn truth_params(seed: u64) -> Result<Arc<ParameterSet>> {
    let n = SERIE_A.len();
    let ratings = SERIE_A
        .iter()
        .enumerate()
        .map(|(i, team)| {
            let rank = (i as u64 * 7 + seed) % n as u64;
            let z = rank as f64 / (n - 1) as f64 - 0.5;
            TeamRating {
                team: team.to_string(),
                attack: 1.0 + 0.6 * z,
                defence: 1.0 - 0.45 * z,
            }
        })
        .collect();
    Ok(Arc::new(ParameterSet::from_ratings(ratings, 1.25, 0.0, 0.0)?))
}

fn load_settings() -> Result<Settings> {
    let seed = parse_arg::<u64>("--seed")
        .or_else(|| env_parse("BACKTEST_SEED"))
        .unwrap_or(DEFAULT_SEED);
    let matchdays = parse_arg::<usize>("--rounds")
        .or_else(|| env_parse("BACKTEST_ROUNDS"))
        .unwrap_or(DEFAULT_MATCHDAYS)
        .clamp(2, 2 * (SERIE_A.len() - 1));
    let xi = parse_arg::<f64>("--xi")
        .or_else(|| env_parse("BACKTEST_XI"))
        .unwrap_or(FitConfig::default().xi);
    if !(xi >= 0.0 && xi.is_finite()) {
        return Err(anyhow!("xi must be a non-negative number, got {xi}"));
    }
    let mode = match parse_str_arg("--mode").as_deref() {
        None | Some("goals") => FitMode::Goals,
        Some("xg") => FitMode::ExpectedGoals,
        Some(other) => return Err(anyhow!("unknown --mode {other} (expected goals|xg)")),
    };

    Ok(Settings {
        seed,
        matchdays,
        warmup: parse_arg::<usize>("--warmup")
            .unwrap_or(DEFAULT_WARMUP)
            .max(1),
        refit_every: parse_arg::<usize>("--refit-every")
            .unwrap_or(DEFAULT_REFIT_EVERY)
            .max(1),
        xi,
        mode,
        use_form: !has_flag("--no-form"),
        out: parse_str_arg("--out").map(PathBuf::from),
    })
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn parse_str_arg(name: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    arg_value(&args, name)
}

fn arg_value(args: &[String], name: &str) -> Option<String> {
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}=")) {
            return Some(raw.trim().to_string());
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

/// Parses `--name=value` (or `--name value`) as `T`; unparsable input is treated as absent.
fn parse_arg<T: FromStr>(name: &str) -> Option<T> {
    parse_str_arg(name).and_then(|raw| raw.parse::<T>().ok())
}

fn has_flag(name: &str) -> bool {
    std::env::args().skip(1).any(|arg| arg == name)
}
