//! Linear trend of sentiment against sample index.
//!
//! - `TrendFitter`: ordinary least squares with a two-sided t-test on the slope
//! - `TrendDirection` / `Significance`: the labels derived from a fit

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
    #[serde(rename = "Insufficient Data")]
    InsufficientData,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Improving => "Improving",
            TrendDirection::Declining => "Declining",
            TrendDirection::Stable => "Stable",
            TrendDirection::InsufficientData => "Insufficient Data",
        }
    }
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Significance {
    Significant,
    #[serde(rename = "Not Significant")]
    NotSignificant,
}

impl Significance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Significance::Significant => "Significant",
            Significance::NotSignificant => "Not Significant",
        }
    }
}

impl fmt::Display for Significance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitResult {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub std_err: f64,
    pub p_value: f64,
}

/// Fits `score = intercept + slope * index` by least squares.
#[derive(Debug, Clone, Copy)]
pub struct TrendFitter {
    min_points: usize,
    slope_threshold: f64,
    significance_level: f64,
}

impl TrendFitter {
    pub fn new(min_points: usize, slope_threshold: f64, significance_level: f64) -> Self {
        Self {
            // the t-test needs at least one degree of freedom
            min_points: min_points.max(3),
            slope_threshold,
            significance_level,
        }
    }

    /// Returns `None` when there are fewer than `min_points` values.
    pub fn fit(&self, values: &[f64]) -> Option<FitResult> {
        if values.len() < self.min_points {
            return None;
        }

        let n = values.len() as f64;
        let mean_x = (n - 1.0) / 2.0;
        let mean_y = values.iter().sum::<f64>() / n;

        let (sxx, sxy, syy) = values.iter().enumerate().fold(
            (0.0, 0.0, 0.0),
            |(sxx, sxy, syy), (i, &y)| {
                let dx = i as f64 - mean_x;
                let dy = y - mean_y;
                (sxx + dx * dx, sxy + dx * dy, syy + dy * dy)
            },
        );

        let df = n - 2.0;

        if syy == 0.0 {
            return Some(FitResult {
                slope: 0.0,
                intercept: mean_y,
                r_squared: 0.0,
                std_err: 0.0,
                p_value: 1.0,
            });
        }

        let slope = sxy / sxx;
        let intercept = mean_y - slope * mean_x;
        let r = (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0);
        let r_squared = r * r;

        let residual = (1.0 - r_squared).max(0.0);
        let std_err = (residual * syy / df / sxx).sqrt();

        let p_value = if residual <= f64::EPSILON {
            0.0
        } else {
            let t = r * (df / residual).sqrt();
            students_t_two_sided(t, df)
        };

        Some(FitResult {
            slope,
            intercept,
            r_squared,
            std_err,
            p_value,
        })
    }

    pub fn direction(&self, fit: Option<&FitResult>) -> TrendDirection {
        match fit {
            None => TrendDirection::InsufficientData,
            Some(f) if f.slope > self.slope_threshold => TrendDirection::Improving,
            Some(f) if f.slope < -self.slope_threshold => TrendDirection::Declining,
            Some(_) => TrendDirection::Stable,
        }
    }

    pub fn significance(&self, p_value: f64) -> Significance {
        if p_value < self.significance_level {
            Significance::Significant
        } else {
            Significance::NotSignificant
        }
    }
}

/// Two-sided p-value of Student's t statistic with `df` degrees of freedom.
pub fn students_t_two_sided(t: f64, df: f64) -> f64 {
    if !t.is_finite() {
        return 0.0;
    }
    let x = df / (df + t * t);
    regularized_incomplete_beta(df / 2.0, 0.5, x).clamp(0.0, 1.0)
}

fn regularized_incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }

    let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();

    // the continued fraction converges fastest on this side of the mean
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITER: usize = 300;
    const EPS: f64 = 1e-14;
    const TINY: f64 = 1e-300;

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;

    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < TINY {
        d = TINY;
    }
    d = 1.0 / d;
    let mut h = d;

    for m in 1..=MAX_ITER {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < EPS {
            break;
        }
    }

    h
}

/// Lanczos approximation (g = 7, n = 9).
fn ln_gamma(x: f64) -> f64 {
    const G: f64 = 7.0;
    const COEF: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];

    if x < 0.5 {
        // reflection
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }

    let x = x - 1.0;
    let mut acc = COEF[0];
    for (i, &c) in COEF.iter().enumerate().skip(1) {
        acc += c / (x + i as f64);
    }
    let t = x + G + 0.5;
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + acc.ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fitter() -> TrendFitter {
        TrendFitter::new(3, 0.01, 0.05)
    }

    #[test]
    fn ln_gamma_matches_known_values() {
        assert!(ln_gamma(1.0).abs() < 1e-12);
        assert!((ln_gamma(5.0) - 24f64.ln()).abs() < 1e-10);
        assert!((ln_gamma(0.5) - std::f64::consts::PI.sqrt().ln()).abs() < 1e-10);
    }

    #[test]
    fn t_distribution_reference_points() {
        // one degree of freedom is Cauchy: P(|T| > 1) = 0.5
        assert!((students_t_two_sided(1.0, 1.0) - 0.5).abs() < 1e-9);
        assert!((students_t_two_sided(0.0, 8.0) - 1.0).abs() < 1e-12);
        // critical value t(0.975, 10) = 2.228
        assert!((students_t_two_sided(2.228, 10.0) - 0.05).abs() < 1e-3);
    }

    #[test]
    fn short_series_has_no_fit() {
        let f = fitter();
        assert!(f.fit(&[0.1, 0.2]).is_none());
        assert_eq!(f.direction(None), TrendDirection::InsufficientData);
    }

    #[test]
    fn steady_rise_is_improving_and_significant() {
        let f = fitter();
        let values: Vec<f64> = (0..10).map(|i| i as f64 * 0.05).collect();
        let fit = f.fit(&values).unwrap();
        assert!((fit.slope - 0.05).abs() < 1e-9);
        assert!(fit.p_value < 1e-6);
        assert_eq!(f.direction(Some(&fit)), TrendDirection::Improving);
        assert_eq!(f.significance(fit.p_value), Significance::Significant);
    }

    #[test]
    fn falling_series_is_declining() {
        let f = fitter();
        let fit = f.fit(&[0.5, 0.3, 0.35, 0.1, -0.2, -0.1]).unwrap();
        assert!(fit.slope < -0.01);
        assert_eq!(f.direction(Some(&fit)), TrendDirection::Declining);
    }

    #[test]
    fn flat_series_is_stable_with_unit_p_value() {
        let f = fitter();
        let fit = f.fit(&[0.2; 6]).unwrap();
        assert_eq!(fit.slope, 0.0);
        assert_eq!(fit.p_value, 1.0);
        assert_eq!(f.direction(Some(&fit)), TrendDirection::Stable);
        assert_eq!(f.significance(fit.p_value), Significance::NotSignificant);
    }

    #[test]
    fn noisy_series_is_not_significant() {
        let f = fitter();
        let fit = f.fit(&[0.5, -0.5, 0.4, -0.4, 0.5, -0.5, 0.45]).unwrap();
        assert!(fit.p_value > 0.05);
    }

    #[test]
    fn labels_render_for_display() {
        assert_eq!(TrendDirection::InsufficientData.to_string(), "Insufficient Data");
        assert_eq!(Significance::NotSignificant.to_string(), "Not Significant");
    }
}
