use serde::{Deserialize, Serialize};

use crate::forecast::ForecastBundle;

pub const DEFAULT_CALIBRATION_BINS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Home,
    Draw,
    Away,
}

impl Outcome {
    pub const ALL: [Outcome; 3] = [Outcome::Home, Outcome::Draw, Outcome::Away];

    pub fn label(self) -> &'static str {
        match self {
            Outcome::Home => "home",
            Outcome::Draw => "draw",
            Outcome::Away => "away",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prob3 {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

impl Prob3 {
    pub fn uniform() -> Self {
        Self {
            home: 1.0 / 3.0,
            draw: 1.0 / 3.0,
            away: 1.0 / 3.0,
        }
    }

    pub fn get(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::Home => self.home,
            Outcome::Draw => self.draw,
            Outcome::Away => self.away,
        }
    }

    pub fn sum(&self) -> f64 {
        self.home + self.draw + self.away
    }

    /// Same probabilities seen from the other side of the fixture.
    pub fn mirrored(&self) -> Self {
        Self {
            home: self.away,
            draw: self.draw,
            away: self.home,
        }
    }
}

pub fn classify_outcome(home_goals: u32, away_goals: u32) -> Outcome {
    if home_goals > away_goals {
        Outcome::Home
    } else if home_goals < away_goals {
        Outcome::Away
    } else {
        Outcome::Draw
    }
}

/// Most likely class; ties resolve home, then draw.
pub fn argmax(p: Prob3) -> Outcome {
    if p.home >= p.draw && p.home >= p.away {
        Outcome::Home
    } else if p.draw >= p.away {
        Outcome::Draw
    } else {
        Outcome::Away
    }
}

pub fn one_hot(outcome: Outcome) -> Prob3 {
    match outcome {
        Outcome::Home => Prob3 {
            home: 1.0,
            draw: 0.0,
            away: 0.0,
        },
        Outcome::Draw => Prob3 {
            home: 0.0,
            draw: 1.0,
            away: 0.0,
        },
        Outcome::Away => Prob3 {
            home: 0.0,
            draw: 0.0,
            away: 1.0,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalScore {
    pub home_goals: u32,
    pub away_goals: u32,
}

impl FinalScore {
    pub fn new(home_goals: u32, away_goals: u32) -> Self {
        Self {
            home_goals,
            away_goals,
        }
    }

    pub fn outcome(&self) -> Outcome {
        classify_outcome(self.home_goals, self.away_goals)
    }

    pub fn over_25(&self) -> bool {
        self.home_goals + self.away_goals >= 3
    }

    pub fn btts(&self) -> bool {
        self.home_goals > 0 && self.away_goals > 0
    }
}

/// One past forecast next to what actually happened.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EvaluationRecord {
    pub forecast: ForecastBundle,
    pub final_score: FinalScore,
    pub outcome: Outcome,
    pub over_25: bool,
    pub btts: bool,
    pub predicted: Outcome,
    pub predicted_over_25: bool,
    pub predicted_btts: bool,
    pub correct_1x2: bool,
    pub correct_over_25: bool,
    pub correct_btts: bool,
    pub brier_1x2: f64,
    pub brier_over_25: f64,
    pub brier_btts: f64,
}

impl EvaluationRecord {
    pub fn new(forecast: ForecastBundle, final_score: FinalScore) -> Self {
        let probs = forecast.outcome_probs();
        let outcome = final_score.outcome();
        let over_25 = final_score.over_25();
        let btts = final_score.btts();
        let predicted = argmax(probs);
        let predicted_over_25 = forecast.over_25 > 0.5;
        let predicted_btts = forecast.btts_yes > 0.5;
        Self {
            forecast,
            final_score,
            outcome,
            over_25,
            btts,
            predicted,
            predicted_over_25,
            predicted_btts,
            correct_1x2: predicted == outcome,
            correct_over_25: predicted_over_25 == over_25,
            correct_btts: predicted_btts == btts,
            brier_1x2: brier_3(probs, outcome),
            brier_over_25: brier_binary(forecast.over_25, over_25),
            brier_btts: brier_binary(forecast.btts_yes, btts),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct OneXTwoMetrics {
    pub samples: usize,
    pub accuracy: f64,
    pub log_loss: f64,
    pub brier: f64,
    pub ece: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BinaryMetrics {
    pub samples: usize,
    pub accuracy: f64,
    pub log_loss: f64,
    pub brier: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub class: Outcome,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub occurrences: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalibrationBin {
    pub bucket_start: f64,
    pub bucket_end: f64,
    pub count: usize,
    pub avg_pred: f64,
    pub actual_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub samples: usize,
    pub one_x_two: OneXTwoMetrics,
    pub over_under_25: BinaryMetrics,
    pub btts: BinaryMetrics,
    pub per_class: Vec<ClassMetrics>,
}

pub fn evaluate(records: &[EvaluationRecord]) -> EvaluationReport {
    evaluate_with_bins(records, DEFAULT_CALIBRATION_BINS)
}

pub fn evaluate_with_bins(records: &[EvaluationRecord], bins: usize) -> EvaluationReport {
    let predictions: Vec<Prob3> = records.iter().map(|r| r.forecast.outcome_probs()).collect();
    let outcomes: Vec<Outcome> = records.iter().map(|r| r.outcome).collect();
    let over_pred: Vec<f64> = records.iter().map(|r| r.forecast.over_25).collect();
    let over_real: Vec<bool> = records.iter().map(|r| r.over_25).collect();
    let btts_pred: Vec<f64> = records.iter().map(|r| r.forecast.btts_yes).collect();
    let btts_real: Vec<bool> = records.iter().map(|r| r.btts).collect();

    let mut one_x_two = evaluate_probs(&predictions, &outcomes);
    one_x_two.ece = expected_calibration_error(&predictions, &outcomes, bins);

    EvaluationReport {
        samples: records.len(),
        one_x_two,
        over_under_25: evaluate_binary(&over_pred, &over_real),
        btts: evaluate_binary(&btts_pred, &btts_real),
        per_class: class_breakdown(&predictions, &outcomes),
    }
}

/// Convenience over [`evaluate`] for callers holding raw (forecast, final score) pairs.
pub fn evaluate_pairs(pairs: &[(ForecastBundle, FinalScore)]) -> EvaluationReport {
    let records: Vec<EvaluationRecord> = pairs
        .iter()
        .map(|(forecast, score)| EvaluationRecord::new(*forecast, *score))
        .collect();
    evaluate(&records)
}

/// Accuracy, log-loss and Brier (mean over the three components) of 1X2 forecasts. A realised
/// class forecast at probability 0 makes the log-loss infinite. `ece` is left at 0.
pub fn evaluate_probs(predictions: &[Prob3], outcomes: &[Outcome]) -> OneXTwoMetrics {
    if predictions.is_empty() || predictions.len() != outcomes.len() {
        return OneXTwoMetrics::default();
    }

    let mut brier_sum = 0.0_f64;
    let mut log_loss_sum = 0.0_f64;
    let mut correct = 0usize;

    for (p, outcome) in predictions.iter().zip(outcomes) {
        brier_sum += brier_3(*p, *outcome);
        log_loss_sum += -p.get(*outcome).clamp(0.0, 1.0).ln();
        if argmax(*p) == *outcome {
            correct += 1;
        }
    }

    let n = predictions.len() as f64;
    OneXTwoMetrics {
        samples: predictions.len(),
        accuracy: correct as f64 / n,
        log_loss: log_loss_sum / n,
        brier: brier_sum / n,
        ece: 0.0,
    }
}

/// Metrics for a yes/no market; "yes" is predicted when `p > 0.5`.
pub fn evaluate_binary(predictions: &[f64], outcomes: &[bool]) -> BinaryMetrics {
    if predictions.is_empty() || predictions.len() != outcomes.len() {
        return BinaryMetrics::default();
    }

    let mut brier_sum = 0.0_f64;
    let mut log_loss_sum = 0.0_f64;
    let mut correct = 0usize;

    for (p, y) in predictions.iter().zip(outcomes) {
        let p = p.clamp(0.0, 1.0);
        brier_sum += brier_binary(p, *y);
        log_loss_sum += -(if *y { p } else { 1.0 - p }).ln();
        if (p > 0.5) == *y {
            correct += 1;
        }
    }

    let n = predictions.len() as f64;
    BinaryMetrics {
        samples: predictions.len(),
        accuracy: correct as f64 / n,
        log_loss: log_loss_sum / n,
        brier: brier_sum / n,
    }
}

/// ECE of the arg-max confidence over `bins` equal-width buckets `(k/B, (k+1)/B]`, each weighted
/// by its share of the forecasts.
pub fn expected_calibration_error(predictions: &[Prob3], outcomes: &[Outcome], bins: usize) -> f64 {
    if predictions.is_empty() || predictions.len() != outcomes.len() {
        return 0.0;
    }
    let bins = bins.max(1);
    let mut counts = vec![0usize; bins];
    let mut conf_sum = vec![0.0_f64; bins];
    let mut hit_sum = vec![0.0_f64; bins];

    for (p, outcome) in predictions.iter().zip(outcomes) {
        let predicted = argmax(*p);
        let confidence = p.get(predicted).clamp(0.0, 1.0);
        let idx = ((confidence * bins as f64).ceil() as usize)
            .saturating_sub(1)
            .min(bins - 1);
        counts[idx] += 1;
        conf_sum[idx] += confidence;
        if predicted == *outcome {
            hit_sum[idx] += 1.0;
        }
    }

    let n = predictions.len() as f64;
    (0..bins)
        .filter(|&i| counts[i] > 0)
        .map(|i| {
            let c = counts[i] as f64;
            (c / n) * (conf_sum[i] / c - hit_sum[i] / c).abs()
        })
        .sum()
}

/// Reliability curve for one class: bucket `[k/B, (k+1)/B)`, the last one closed. Every bucket is
/// reported, empty ones with zero counts.
pub fn calibration_bins(
    predictions: &[Prob3],
    outcomes: &[Outcome],
    class: Outcome,
    bins: usize,
) -> Vec<CalibrationBin> {
    let bins = bins.max(2);
    let mut counts = vec![0usize; bins];
    let mut pred_sum = vec![0.0_f64; bins];
    let mut actual_sum = vec![0.0_f64; bins];

    for (p, outcome) in predictions.iter().zip(outcomes) {
        let class_prob = p.get(class).clamp(0.0, 1.0);
        let idx = ((class_prob * bins as f64).floor() as usize).min(bins - 1);
        counts[idx] += 1;
        pred_sum[idx] += class_prob;
        if *outcome == class {
            actual_sum[idx] += 1.0;
        }
    }

    (0..bins)
        .map(|i| {
            let count = counts[i];
            let (avg_pred, actual_rate) = if count > 0 {
                (pred_sum[i] / count as f64, actual_sum[i] / count as f64)
            } else {
                (0.0, 0.0)
            };
            CalibrationBin {
                bucket_start: i as f64 / bins as f64,
                bucket_end: (i + 1) as f64 / bins as f64,
                count,
                avg_pred,
                actual_rate,
            }
        })
        .collect()
}

/// Precision, recall and F1 of the arg-max prediction for each of home, draw and away.
pub fn class_breakdown(predictions: &[Prob3], outcomes: &[Outcome]) -> Vec<ClassMetrics> {
    let paired = predictions.len() == outcomes.len();
    Outcome::ALL
        .iter()
        .map(|&class| {
            let mut true_pos = 0usize;
            let mut predicted = 0usize;
            let mut occurrences = 0usize;
            if paired {
                for (p, outcome) in predictions.iter().zip(outcomes) {
                    let hit = argmax(*p) == class;
                    if hit {
                        predicted += 1;
                    }
                    if *outcome == class {
                        occurrences += 1;
                        if hit {
                            true_pos += 1;
                        }
                    }
                }
            }
            let precision = ratio(true_pos, predicted);
            let recall = ratio(true_pos, occurrences);
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };
            ClassMetrics {
                class,
                precision,
                recall,
                f1,
                occurrences,
            }
        })
        .collect()
}

fn brier_3(p: Prob3, outcome: Outcome) -> f64 {
    let y = one_hot(outcome);
    ((p.home - y.home).powi(2) + (p.draw - y.draw).powi(2) + (p.away - y.away).powi(2)) / 3.0
}

fn brier_binary(p: f64, outcome: bool) -> f64 {
    let y = if outcome { 1.0 } else { 0.0 };
    (p - y).powi(2)
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}
