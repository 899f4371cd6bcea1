//! Two-player TrueSkill belief update.

use serde::{Deserialize, Serialize};

use crate::types::Outcome;

use super::gaussian::{ppf, v_draw, v_win, w_draw, w_win};

/// Gaussian skill belief for one photo.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub mu: f64,
    pub sigma: f64,
    /// Decisive comparisons this photo took part in.
    pub comparisons: u32,
}

impl Rating {
    pub fn prior(params: &RatingParams) -> Self {
        Self {
            mu: params.mu0,
            sigma: params.sigma0,
            comparisons: 0,
        }
    }

    /// Conservative estimate `mu - k * sigma` used for the leaderboard.
    pub fn score(&self, k: f64) -> f64 {
        self.mu - k * self.sigma
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingParams {
    pub mu0: f64,
    pub sigma0: f64,
    /// Skill-class width: the performance gap that gives ~76% win odds.
    pub beta: f64,
    pub draw_probability: f64,
    pub sigma_min: f64,
    /// Sigma multiplier in the leaderboard score.
    pub score_k: f64,
    /// Comparisons every photo needs before the engine leaves Bootstrap.
    pub min_comparisons: u32,
    /// Decisive comparisons after which Bootstrap ends regardless of coverage.
    pub bootstrap_budget: Option<u64>,
}

impl Default for RatingParams {
    fn default() -> Self {
        let mu0 = 25.0;
        let sigma0 = mu0 / 3.0;
        Self {
            mu0,
            sigma0,
            beta: sigma0 / 2.0,
            draw_probability: 0.10,
            sigma_min: sigma0 * 0.05,
            score_k: 3.0,
            min_comparisons: 3,
            bootstrap_budget: None,
        }
    }
}

impl RatingParams {
    /// Performance gap below which a comparison counts as a draw.
    ///
    /// Standard inverse-CDF relation for two players:
    /// `eps = ppf((p + 1) / 2) * sqrt(2) * beta`.
    pub fn draw_margin(&self) -> f64 {
        if self.draw_probability <= 0.0 {
            return 0.0;
        }
        let p = self.draw_probability.min(0.999);
        ppf((p + 1.0) / 2.0) * 2f64.sqrt() * self.beta
    }
}

/// Applies one comparison to a pair of ratings and returns the updated pair.
///
/// `Skip` returns both ratings unchanged. For every other outcome both
/// sigmas shrink (floored at `sigma_min`) and both comparison counts grow.
pub fn rate_pair(left: Rating, right: Rating, outcome: Outcome, params: &RatingParams) -> (Rating, Rating) {
    if !outcome.is_decisive() {
        return (left, right);
    }

    let c2 = 2.0 * params.beta * params.beta + left.sigma.powi(2) + right.sigma.powi(2);
    let c = c2.sqrt();
    let eps = params.draw_margin() / c;
    let t = (left.mu - right.mu) / c;
    let (v, w) = match outcome {
        Outcome::LeftWin => (v_win(t, eps), w_win(t, eps)),
        Outcome::RightWin => (-v_win(-t, eps), w_win(-t, eps)),
        Outcome::Tie | Outcome::Skip => (v_draw(t, eps), w_draw(t, eps)),
    };

    // `v` is signed from the left player's point of view.
    let left_next = Rating {
        mu: left.mu + left.sigma.powi(2) / c * v,
        sigma: shrink(left.sigma, c2, w, params.sigma_min),
        comparisons: left.comparisons.saturating_add(1),
    };
    let right_next = Rating {
        mu: right.mu - right.sigma.powi(2) / c * v,
        sigma: shrink(right.sigma, c2, w, params.sigma_min),
        comparisons: right.comparisons.saturating_add(1),
    };
    (left_next, right_next)
}

fn shrink(sigma: f64, c2: f64, w: f64, sigma_min: f64) -> f64 {
    let var = sigma * sigma;
    let next = (var * (1.0 - var / c2 * w)).max(0.0).sqrt();
    next.max(sigma_min).min(sigma)
}
