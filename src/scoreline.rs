use crate::evaluation::Prob3;

pub const DEFAULT_MAX_GOALS: u32 = 10;

/// Joint probability table over (home goals, away goals) in `0..=max_goals` for both sides,
/// independent Poisson marginals corrected by the Dixon-Coles `tau` factor and renormalised.
#[derive(Debug, Clone)]
pub struct ScoreGrid {
    max_goals: u32,
    lambda_home: f64,
    lambda_away: f64,
    rho: f64,
    // Row-major: index = home * (max_goals + 1) + away.
    cells: Vec<f64>,
    raw_mass: f64,
    clamped_mass: f64,
    degenerate: bool,
}

impl ScoreGrid {
    pub fn build(lambda_home: f64, lambda_away: f64, rho: f64, max_goals: u32) -> Self {
        let rho = admissible_rho(lambda_home, lambda_away, rho);
        let pmf_home = poisson_row(lambda_home, max_goals);
        let pmf_away = poisson_row(lambda_away, max_goals);
        let side = max_goals as usize + 1;

        let mut cells = vec![0.0_f64; side * side];
        let mut raw_mass = 0.0_f64;
        let mut clamped_mass = 0.0_f64;
        for (h, p_h) in pmf_home.iter().enumerate() {
            for (a, p_a) in pmf_away.iter().enumerate() {
                let tau = dc_tau(h as u32, a as u32, lambda_home, lambda_away, rho);
                let mut p = p_h * p_a * tau;
                if !p.is_finite() || p < 0.0 {
                    if p.is_finite() {
                        clamped_mass += -p;
                    }
                    p = 0.0;
                }
                cells[h * side + a] = p;
                raw_mass += p;
            }
        }

        let mut degenerate = false;
        if raw_mass <= 0.0 || !raw_mass.is_finite() {
            degenerate = true;
            // Every cell underflowed or was clamped: fall back to the independent model, and
            // failing that, a point mass at the rounded rates.
            raw_mass = 0.0;
            for (h, p_h) in pmf_home.iter().enumerate() {
                for (a, p_a) in pmf_away.iter().enumerate() {
                    let p = (p_h * p_a).max(0.0);
                    cells[h * side + a] = p;
                    raw_mass += p;
                }
            }
            if raw_mass <= 0.0 || !raw_mass.is_finite() {
                cells.iter_mut().for_each(|c| *c = 0.0);
                let h = nearest_cell(lambda_home, max_goals);
                let a = nearest_cell(lambda_away, max_goals);
                cells[h * side + a] = 1.0;
                raw_mass = 1.0;
            }
        }

        for c in cells.iter_mut() {
            *c /= raw_mass;
        }

        Self {
            max_goals,
            lambda_home,
            lambda_away,
            rho,
            cells,
            raw_mass,
            clamped_mass,
            degenerate,
        }
    }

    pub fn max_goals(&self) -> u32 {
        self.max_goals
    }

    pub fn lambda_home(&self) -> f64 {
        self.lambda_home
    }

    pub fn lambda_away(&self) -> f64 {
        self.lambda_away
    }

    /// The dependency parameter actually applied (after restriction to the admissible range).
    pub fn rho(&self) -> f64 {
        self.rho
    }

    /// Mass of the corrected table before renormalisation.
    pub fn raw_mass(&self) -> f64 {
        self.raw_mass
    }

    /// Negative mass removed by clamping before renormalisation.
    ///
    /// `build` first restricts `rho` to the admissible range, where every `tau` is non-negative,
    /// so for finite positive rates this stays 0; it only picks up round-off.
    pub fn clamped_mass(&self) -> f64 {
        self.clamped_mass
    }

    /// True when every corrected cell underflowed and the table fell back to the independent
    /// model or to a point mass at the rounded rates.
    pub fn is_degenerate(&self) -> bool {
        self.degenerate
    }

    pub fn prob(&self, home_goals: u32, away_goals: u32) -> f64 {
        if home_goals > self.max_goals || away_goals > self.max_goals {
            return 0.0;
        }
        self.cells[self.idx(home_goals, away_goals)]
    }

    pub fn total(&self) -> f64 {
        self.cells.iter().sum()
    }

    pub fn outcome_probs(&self) -> Prob3 {
        let mut home = 0.0_f64;
        let mut draw = 0.0_f64;
        let mut away = 0.0_f64;
        for (h, a, p) in self.iter() {
            if h > a {
                home += p;
            } else if h == a {
                draw += p;
            } else {
                away += p;
            }
        }
        Prob3 { home, draw, away }
    }

    /// P(total goals >= 3).
    pub fn over_25(&self) -> f64 {
        self.iter()
            .filter(|(h, a, _)| h + a >= 3)
            .map(|(_, _, p)| p)
            .sum::<f64>()
            .clamp(0.0, 1.0)
    }

    /// P(at least one side blank) = P(X = 0) + P(Y = 0) - P(0, 0).
    pub fn btts_no(&self) -> f64 {
        let home_blank: f64 = (0..=self.max_goals).map(|a| self.prob(0, a)).sum();
        let away_blank: f64 = (0..=self.max_goals).map(|h| self.prob(h, 0)).sum();
        (home_blank + away_blank - self.prob(0, 0)).clamp(0.0, 1.0)
    }

    pub fn home_marginal(&self) -> Vec<f64> {
        (0..=self.max_goals)
            .map(|h| (0..=self.max_goals).map(|a| self.prob(h, a)).sum())
            .collect()
    }

    /// Most likely scoreline; ties go to the smaller home score, then the smaller away score.
    pub fn modal_score(&self) -> ((u32, u32), f64) {
        let mut best = ((0, 0), f64::NEG_INFINITY);
        for (h, a, p) in self.iter() {
            if p > best.1 {
                best = ((h, a), p);
            }
        }
        best
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, u32, f64)> + '_ {
        let side = self.max_goals + 1;
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, p)| (i as u32 / side, i as u32 % side, *p))
    }

    fn idx(&self, home_goals: u32, away_goals: u32) -> usize {
        (home_goals * (self.max_goals + 1) + away_goals) as usize
    }
}

/// Dixon-Coles low-score correction.
pub fn dc_tau(home_goals: u32, away_goals: u32, lambda_home: f64, lambda_away: f64, rho: f64) -> f64 {
    match (home_goals, away_goals) {
        (0, 0) => 1.0 - lambda_home * lambda_away * rho,
        (0, 1) => 1.0 + lambda_home * rho,
        (1, 0) => 1.0 + lambda_away * rho,
        (1, 1) => 1.0 - rho,
        _ => 1.0,
    }
}

/// Restricts `rho` to `[max(-1/lambda, -1/mu), min(1/(lambda*mu), 1)]`, the range on which every
/// `tau` value is non-negative.
pub fn admissible_rho(lambda_home: f64, lambda_away: f64, rho: f64) -> f64 {
    if !(lambda_home > 0.0 && lambda_away > 0.0) {
        return rho;
    }
    let lo = (-1.0 / lambda_home).max(-1.0 / lambda_away);
    let hi = (1.0 / (lambda_home * lambda_away)).min(1.0);
    rho.clamp(lo, hi)
}

pub fn poisson_pmf(goals: u32, lambda: f64) -> f64 {
    if lambda <= 0.0 {
        return if goals == 0 { 1.0 } else { 0.0 };
    }
    (goals as f64 * lambda.ln() - lambda - ln_factorial(goals)).exp()
}

pub fn ln_factorial(k: u32) -> f64 {
    (2..=k).map(|i| (i as f64).ln()).sum()
}

fn poisson_row(lambda: f64, max_goals: u32) -> Vec<f64> {
    let lambda = lambda.max(0.0);
    let mut out = vec![0.0; max_goals as usize + 1];
    out[0] = (-lambda).exp();
    for k in 1..out.len() {
        out[k] = out[k - 1] * lambda / k as f64;
    }
    out
}

fn nearest_cell(lambda: f64, max_goals: u32) -> usize {
    if !lambda.is_finite() {
        return max_goals as usize;
    }
    (lambda.max(0.0).round() as usize).min(max_goals as usize)
}
