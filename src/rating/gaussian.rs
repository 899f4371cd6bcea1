//! Standard normal helpers and the truncated-Gaussian correction terms used
//! by the two-player TrueSkill update.

use std::f64::consts::{PI, SQRT_2};

/// Complementary error function, fractional error below 1.2e-7.
pub fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + z / 2.0);
    let poly = -z * z - 1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87 + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    let r = t * poly.exp();
    if x >= 0.0 { r } else { 2.0 - r }
}

/// Inverse of [`erfc`] on `(0, 2)`, refined with two Newton steps.
pub fn erfcinv(y: f64) -> f64 {
    if y >= 2.0 {
        return -100.0;
    }
    if y <= 0.0 {
        return 100.0;
    }
    let lower_half = y < 1.0;
    let y = if lower_half { y } else { 2.0 - y };
    let t = (-2.0 * (y / 2.0).ln()).sqrt();
    let mut x = -0.707_11 * ((2.307_53 + t * 0.270_61) / (1.0 + t * (0.992_29 + t * 0.044_81)) - t);
    for _ in 0..2 {
        let err = erfc(x) - y;
        x += err / (1.128_379_167_095_512_6 * (-x * x).exp() - x * err);
    }
    if lower_half { x } else { -x }
}

pub fn pdf(x: f64) -> f64 {
    (-x * x / 2.0).exp() / (2.0 * PI).sqrt()
}

pub fn cdf(x: f64) -> f64 {
    0.5 * erfc(-x / SQRT_2)
}

/// Quantile function of the standard normal.
pub fn ppf(p: f64) -> f64 {
    -SQRT_2 * erfcinv(2.0 * p)
}

/// Mean shift for a win, `t` and `eps` already scaled by `c`.
pub fn v_win(t: f64, eps: f64) -> f64 {
    let x = t - eps;
    let denom = cdf(x);
    if denom > f64::MIN_POSITIVE { pdf(x) / denom } else { -x }
}

/// Variance shrink for a win; always in `[0, 1]`.
pub fn w_win(t: f64, eps: f64) -> f64 {
    let x = t - eps;
    let v = v_win(t, eps);
    (v * (v + x)).clamp(0.0, 1.0)
}

/// Mean shift for a draw; pulls the two estimates toward each other.
pub fn v_draw(t: f64, eps: f64) -> f64 {
    let abs_t = t.abs();
    let a = eps - abs_t;
    let b = -eps - abs_t;
    let denom = cdf(a) - cdf(b);
    let v = if denom > f64::MIN_POSITIVE {
        (pdf(b) - pdf(a)) / denom
    } else {
        a
    };
    if t < 0.0 { -v } else { v }
}

/// Variance shrink for a draw; always in `[0, 1]`.
pub fn w_draw(t: f64, eps: f64) -> f64 {
    let abs_t = t.abs();
    let a = eps - abs_t;
    let b = -eps - abs_t;
    let denom = cdf(a) - cdf(b);
    if denom <= f64::MIN_POSITIVE {
        return 1.0;
    }
    let v = v_draw(abs_t, eps);
    (v * v + (a * pdf(a) - b * pdf(b)) / denom).clamp(0.0, 1.0)
}
