//! Box-constrained limited-memory quasi-Newton minimiser.
//!
//! The search direction comes from the usual L-BFGS two-loop recursion restricted to the free
//! variables (those not pinned against a bound by the gradient); steps follow the projected path
//! `P(x + t·d)` with Armijo backtracking. Gradients are central finite differences, switching to
//! one-sided differences at a bound so that every probe stays feasible.

use std::collections::VecDeque;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

const ARMIJO_C1: f64 = 1e-4;
const ACTIVE_EPS: f64 = 1e-10;
const CURVATURE_EPS: f64 = 1e-10;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub max_iterations: usize,
    /// Number of correction pairs kept for the inverse-Hessian approximation.
    pub memory: usize,
    /// Stop once the largest projected-gradient component falls below this.
    pub gradient_tolerance: f64,
    /// Stop once an accepted step reduces the objective by less than this (relative).
    pub relative_tolerance: f64,
    /// Finite-difference step, scaled by `max(1, |x_i|)`.
    pub gradient_step: f64,
    pub max_line_search_steps: usize,
    pub parallel_gradient: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            memory: 10,
            gradient_tolerance: 1e-5,
            relative_tolerance: 2.2e-9,
            gradient_step: 1e-6,
            max_line_search_steps: 50,
            parallel_gradient: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Bounds {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl Bounds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `count` coordinates sharing the same `[lo, hi]` box.
    pub fn push(&mut self, lo: f64, hi: f64, count: usize) {
        self.lower.extend(std::iter::repeat_n(lo, count));
        self.upper.extend(std::iter::repeat_n(hi, count));
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    pub fn lower(&self, i: usize) -> f64 {
        self.lower[i]
    }

    pub fn upper(&self, i: usize) -> f64 {
        self.upper[i]
    }

    pub fn project(&self, x: &mut [f64]) {
        for (i, v) in x.iter_mut().enumerate() {
            *v = v.clamp(self.lower[i], self.upper[i]);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    ProjectedGradient,
    RelativeReduction,
    MaxIterations,
    LineSearchFailed,
}

impl Termination {
    pub fn converged(self) -> bool {
        matches!(
            self,
            Termination::ProjectedGradient | Termination::RelativeReduction
        )
    }
}

#[derive(Debug, Clone)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub termination: Termination,
}

impl Minimum {
    pub fn converged(&self) -> bool {
        self.termination.converged()
    }
}

pub fn minimize<F>(objective: F, x0: &[f64], bounds: &Bounds, cfg: &OptimizerConfig) -> Minimum
where
    F: Fn(&[f64]) -> f64 + Sync,
{
    debug_assert_eq!(x0.len(), bounds.len());

    let mut x = x0.to_vec();
    bounds.project(&mut x);
    let mut fx = objective(x.as_slice());
    let mut evaluations = 1usize;
    let (mut g, used) = gradient(&objective, &x, fx, bounds, cfg);
    evaluations += used;

    let mut s_hist: VecDeque<Vec<f64>> = VecDeque::with_capacity(cfg.memory + 1);
    let mut y_hist: VecDeque<Vec<f64>> = VecDeque::with_capacity(cfg.memory + 1);

    for iter in 0..cfg.max_iterations {
        if projected_gradient_norm(&x, &g, bounds) < cfg.gradient_tolerance {
            return Minimum {
                x,
                value: fx,
                iterations: iter,
                evaluations,
                termination: Termination::ProjectedGradient,
            };
        }

        let free: Vec<bool> = (0..x.len())
            .map(|i| {
                let at_lower = x[i] <= bounds.lower(i) + ACTIVE_EPS && g[i] > 0.0;
                let at_upper = x[i] >= bounds.upper(i) - ACTIVE_EPS && g[i] < 0.0;
                !(at_lower || at_upper)
            })
            .collect();

        let mut direction = None;
        if !s_hist.is_empty() {
            let d = two_loop_direction(&g, &free, &s_hist, &y_hist);
            if dot(&d, &g) < 0.0 {
                direction = Some(d);
            } else {
                s_hist.clear();
                y_hist.clear();
            }
        }
        let d = direction.unwrap_or_else(|| steepest_direction(&g, &free));

        let mut step = 1.0_f64;
        let mut accepted = None;
        for _ in 0..cfg.max_line_search_steps {
            let mut candidate: Vec<f64> = x.iter().zip(&d).map(|(xi, di)| xi + step * di).collect();
            bounds.project(&mut candidate);
            let f_candidate = objective(candidate.as_slice());
            evaluations += 1;
            let predicted: f64 = g
                .iter()
                .zip(candidate.iter().zip(&x))
                .map(|(gi, (c, xi))| gi * (c - xi))
                .sum();
            if f_candidate <= fx + ARMIJO_C1 * predicted {
                accepted = Some((candidate, f_candidate));
                break;
            }
            step *= 0.5;
        }

        let Some((x_next, f_next)) = accepted else {
            debug!(iter, value = fx, "line search failed to find a decrease");
            return Minimum {
                x,
                value: fx,
                iterations: iter,
                evaluations,
                termination: Termination::LineSearchFailed,
            };
        };

        let (g_next, used) = gradient(&objective, &x_next, f_next, bounds, cfg);
        evaluations += used;

        let s: Vec<f64> = x_next.iter().zip(&x).map(|(a, b)| a - b).collect();
        let y: Vec<f64> = g_next.iter().zip(&g).map(|(a, b)| a - b).collect();
        let sy = dot(&s, &y);
        if sy > 0.0 && sy > CURVATURE_EPS * dot(&y, &y) {
            s_hist.push_back(s);
            y_hist.push_back(y);
            if s_hist.len() > cfg.memory {
                s_hist.pop_front();
                y_hist.pop_front();
            }
        }

        let reduction = (fx - f_next) / fx.abs().max(f_next.abs()).max(1.0);
        x = x_next;
        fx = f_next;
        g = g_next;

        if reduction <= cfg.relative_tolerance {
            return Minimum {
                x,
                value: fx,
                iterations: iter + 1,
                evaluations,
                termination: Termination::RelativeReduction,
            };
        }
    }

    Minimum {
        x,
        value: fx,
        iterations: cfg.max_iterations,
        evaluations,
        termination: Termination::MaxIterations,
    }
}

fn gradient<F>(
    objective: &F,
    x: &[f64],
    fx: f64,
    bounds: &Bounds,
    cfg: &OptimizerConfig,
) -> (Vec<f64>, usize)
where
    F: Fn(&[f64]) -> f64 + Sync,
{
    let parts: Vec<(f64, usize)> = if cfg.parallel_gradient {
        (0..x.len())
            .into_par_iter()
            .map(|i| partial(objective, x, fx, i, bounds, cfg.gradient_step))
            .collect()
    } else {
        (0..x.len())
            .map(|i| partial(objective, x, fx, i, bounds, cfg.gradient_step))
            .collect()
    };
    let used = parts.iter().map(|(_, n)| n).sum();
    (parts.into_iter().map(|(g, _)| g).collect(), used)
}

fn partial<F>(objective: &F, x: &[f64], fx: f64, i: usize, bounds: &Bounds, step: f64) -> (f64, usize)
where
    F: Fn(&[f64]) -> f64,
{
    let h = step * x[i].abs().max(1.0);
    let up_ok = x[i] + h <= bounds.upper(i);
    let down_ok = x[i] - h >= bounds.lower(i);
    let mut probe = x.to_vec();
    match (up_ok, down_ok) {
        (true, true) => {
            probe[i] = x[i] + h;
            let f_up = objective(probe.as_slice());
            probe[i] = x[i] - h;
            let f_down = objective(probe.as_slice());
            ((f_up - f_down) / (2.0 * h), 2)
        }
        (true, false) => {
            probe[i] = x[i] + h;
            ((objective(probe.as_slice()) - fx) / h, 1)
        }
        (false, true) => {
            probe[i] = x[i] - h;
            ((fx - objective(probe.as_slice())) / h, 1)
        }
        (false, false) => (0.0, 0),
    }
}

fn projected_gradient_norm(x: &[f64], g: &[f64], bounds: &Bounds) -> f64 {
    (0..x.len())
        .map(|i| (x[i] - (x[i] - g[i]).clamp(bounds.lower(i), bounds.upper(i))).abs())
        .fold(0.0, f64::max)
}

fn steepest_direction(g: &[f64], free: &[bool]) -> Vec<f64> {
    let norm = g
        .iter()
        .zip(free)
        .filter(|(_, f)| **f)
        .map(|(gi, _)| gi * gi)
        .sum::<f64>()
        .sqrt();
    let scale = 1.0 / norm.max(1.0);
    g.iter()
        .zip(free)
        .map(|(gi, f)| if *f { -gi * scale } else { 0.0 })
        .collect()
}

fn two_loop_direction(
    g: &[f64],
    free: &[bool],
    s_hist: &VecDeque<Vec<f64>>,
    y_hist: &VecDeque<Vec<f64>>,
) -> Vec<f64> {
    let mut q: Vec<f64> = g
        .iter()
        .zip(free)
        .map(|(gi, f)| if *f { *gi } else { 0.0 })
        .collect();

    let mut alphas = Vec::with_capacity(s_hist.len());
    for (s, y) in s_hist.iter().zip(y_hist).rev() {
        let rho = 1.0 / dot(y, s);
        let alpha = rho * dot(s, &q);
        for (qi, yi) in q.iter_mut().zip(y) {
            *qi -= alpha * yi;
        }
        alphas.push((alpha, rho));
    }

    if let (Some(s), Some(y)) = (s_hist.back(), y_hist.back()) {
        let scale = dot(s, y) / dot(y, y);
        q.iter_mut().for_each(|qi| *qi *= scale);
    }

    for ((s, y), (alpha, rho)) in s_hist.iter().zip(y_hist).zip(alphas.into_iter().rev()) {
        let beta = rho * dot(y, &q);
        for (qi, si) in q.iter_mut().zip(s) {
            *qi += (alpha - beta) * si;
        }
    }

    q.iter()
        .zip(free)
        .map(|(qi, f)| if *f { -qi } else { 0.0 })
        .collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
