/// Statistical tests used by the analyzer.
///
/// - `pearson` — correlation coefficient with a two-tailed t-test (n−2 df)
/// - `linear_regression` — OLS slope over (year, value) with slope p-value
/// - `mann_kendall` — rank-based monotonic trend test, tie-corrected
/// - `one_way_anova` — variance test across groups
/// - `describe` — count, mean, sample std, min, quartiles, max
///
/// Every test reports `InsufficientDataError` instead of a degenerate
/// number. p-values are returned unrounded; no multiple-comparison
/// correction is applied anywhere.
///
/// Distribution tails come from `statrs`.

use serde::Serialize;
use statrs::distribution::{ContinuousCDF, FisherSnedecor, Normal, StudentsT};
use statrs::statistics::{Data, Distribution, Max, Min, OrderStatistics};

/// Significance threshold used throughout.
pub const ALPHA: f64 = 0.05;

/// Minimum observations for correlation and trend tests.
pub const MIN_OBSERVATIONS: usize = 3;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InsufficientDataError {
    #[error("{test} needs at least {required} observations, got {actual}")]
    TooFewObservations {
        test: &'static str,
        required: usize,
        actual: usize,
    },

    #[error("{test} needs at least {required} groups with 2+ observations, got {actual}")]
    TooFewGroups {
        test: &'static str,
        required: usize,
        actual: usize,
    },

    #[error("{test} is undefined: input has zero variance")]
    ZeroVariance { test: &'static str },
}

/// Qualitative label for a correlation coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strength {
    Strong,
    Moderate,
    Weak,
}

impl Strength {
    pub fn from_r(r: f64) -> Self {
        let r = r.abs();
        if r > 0.7 {
            Strength::Strong
        } else if r > 0.4 {
            Strength::Moderate
        } else {
            Strength::Weak
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strength::Strong => "strong",
            Strength::Moderate => "moderate",
            Strength::Weak => "weak",
        }
    }
}

// ---------------------------------------------------------------------------
// Correlation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Correlation {
    pub r: f64,
    pub p_value: f64,
    pub n: usize,
}

impl Correlation {
    pub fn significant(&self) -> bool {
        self.p_value < ALPHA
    }

    pub fn strength(&self) -> Strength {
        Strength::from_r(self.r)
    }
}

/// Pearson correlation of paired values.
pub fn pearson(pairs: &[(f64, f64)]) -> Result<Correlation, InsufficientDataError> {
    const TEST: &str = "pearson correlation";
    let n = pairs.len();
    if n < MIN_OBSERVATIONS {
        return Err(InsufficientDataError::TooFewObservations {
            test: TEST,
            required: MIN_OBSERVATIONS,
            actual: n,
        });
    }

    let (xs, ys): (Vec<f64>, Vec<f64>) = pairs.iter().copied().unzip();
    let (sxx, syy, sxy) = sums_of_squares(&xs, &ys);
    if sxx <= 0.0 || syy <= 0.0 {
        return Err(InsufficientDataError::ZeroVariance { test: TEST });
    }

    let r = (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0);
    let df = (n - 2) as f64;
    let p_value = if (1.0 - r.abs()) <= f64::EPSILON {
        0.0
    } else {
        let t = r * (df / (1.0 - r * r)).sqrt();
        student_t_two_tailed(t, df)
    };

    Ok(Correlation { r, p_value, n })
}

// ---------------------------------------------------------------------------
// Trend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Regression {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    /// Two-tailed p-value for slope ≠ 0.
    pub p_value: f64,
    pub std_err: f64,
    pub n: usize,
}

/// Ordinary least squares fit of `y = slope * x + intercept`.
///
/// A flat series fits with slope 0 and p = 1; an exact fit has p = 0.
pub fn linear_regression(points: &[(f64, f64)]) -> Result<Regression, InsufficientDataError> {
    const TEST: &str = "linear regression";
    let n = points.len();
    if n < MIN_OBSERVATIONS {
        return Err(InsufficientDataError::TooFewObservations {
            test: TEST,
            required: MIN_OBSERVATIONS,
            actual: n,
        });
    }

    let (xs, ys): (Vec<f64>, Vec<f64>) = points.iter().copied().unzip();
    let (sxx, syy, sxy) = sums_of_squares(&xs, &ys);
    if sxx <= 0.0 {
        return Err(InsufficientDataError::ZeroVariance { test: TEST });
    }

    let slope = sxy / sxx;
    let intercept = mean(&ys) - slope * mean(&xs);
    let df = (n - 2) as f64;

    if syy <= 0.0 {
        return Ok(Regression {
            slope: 0.0,
            intercept,
            r_squared: 0.0,
            p_value: 1.0,
            std_err: 0.0,
            n,
        });
    }

    let r_squared = ((sxy * sxy) / (sxx * syy)).clamp(0.0, 1.0);
    let residual = ((1.0 - r_squared) * syy).max(0.0);
    let std_err = (residual / sxx / df).sqrt();
    let p_value = if residual <= syy * 1e-12 {
        0.0
    } else {
        student_t_two_tailed(slope / std_err, df)
    };

    Ok(Regression {
        slope,
        intercept,
        r_squared,
        p_value,
        std_err,
        n,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    NoTrend,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Increasing => "increasing",
            TrendDirection::Decreasing => "decreasing",
            TrendDirection::NoTrend => "no trend",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MannKendall {
    pub s: i64,
    pub variance: f64,
    pub z: f64,
    pub p_value: f64,
    pub tau: f64,
    pub n: usize,
}

impl MannKendall {
    pub fn direction(&self) -> TrendDirection {
        if self.p_value >= ALPHA {
            TrendDirection::NoTrend
        } else if self.s > 0 {
            TrendDirection::Increasing
        } else {
            TrendDirection::Decreasing
        }
    }
}

/// Mann-Kendall test on a series in time order.
pub fn mann_kendall(series: &[f64]) -> Result<MannKendall, InsufficientDataError> {
    let n = series.len();
    if n < MIN_OBSERVATIONS {
        return Err(InsufficientDataError::TooFewObservations {
            test: "mann-kendall",
            required: MIN_OBSERVATIONS,
            actual: n,
        });
    }

    let mut s: i64 = 0;
    for i in 0..n {
        for j in (i + 1)..n {
            s += match series[j].partial_cmp(&series[i]) {
                Some(std::cmp::Ordering::Greater) => 1,
                Some(std::cmp::Ordering::Less) => -1,
                _ => 0,
            };
        }
    }

    // Tie correction: sum of t(t-1)(2t+5) over groups of equal values.
    let mut sorted = series.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mut tie_term = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i + 1;
        while j < n && sorted[j] == sorted[i] {
            j += 1;
        }
        let t = (j - i) as f64;
        tie_term += t * (t - 1.0) * (2.0 * t + 5.0);
        i = j;
    }

    let nf = n as f64;
    let variance = (nf * (nf - 1.0) * (2.0 * nf + 5.0) - tie_term) / 18.0;
    let z = if variance <= 0.0 || s == 0 {
        0.0
    } else if s > 0 {
        (s as f64 - 1.0) / variance.sqrt()
    } else {
        (s as f64 + 1.0) / variance.sqrt()
    };

    Ok(MannKendall {
        s,
        variance,
        z,
        p_value: normal_two_tailed(z),
        tau: s as f64 / (nf * (nf - 1.0) / 2.0),
        n,
    })
}

// ---------------------------------------------------------------------------
// Group comparison
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Anova {
    pub f_statistic: f64,
    pub p_value: f64,
    pub df_between: usize,
    pub df_within: usize,
    pub groups: usize,
    /// Groups dropped for having fewer than two observations.
    pub groups_set_aside: usize,
    pub n: usize,
}

/// One-way ANOVA across groups.
pub fn one_way_anova(groups: &[Vec<f64>]) -> Result<Anova, InsufficientDataError> {
    const TEST: &str = "one-way anova";
    let usable: Vec<&Vec<f64>> = groups.iter().filter(|g| g.len() >= 2).collect();
    if usable.len() < 2 {
        return Err(InsufficientDataError::TooFewGroups {
            test: TEST,
            required: 2,
            actual: usable.len(),
        });
    }

    let n: usize = usable.iter().map(|g| g.len()).sum();
    let grand_mean = usable.iter().flat_map(|g| g.iter()).sum::<f64>() / n as f64;

    let mut ss_between = 0.0;
    let mut ss_within = 0.0;
    for group in &usable {
        let m = mean(group);
        ss_between += group.len() as f64 * (m - grand_mean).powi(2);
        ss_within += group.iter().map(|x| (x - m).powi(2)).sum::<f64>();
    }

    let df_between = usable.len() - 1;
    let df_within = n - usable.len();
    let ms_within = ss_within / df_within as f64;
    if ms_within <= 0.0 {
        return Err(InsufficientDataError::ZeroVariance { test: TEST });
    }
    let f_statistic = (ss_between / df_between as f64) / ms_within;

    Ok(Anova {
        f_statistic,
        p_value: f_survival(f_statistic, df_between as f64, df_within as f64),
        df_between,
        df_within,
        groups: usable.len(),
        groups_set_aside: groups.len() - usable.len(),
        n,
    })
}

// ---------------------------------------------------------------------------
// Descriptive statistics
// ---------------------------------------------------------------------------

/// Quartiles use the median-unbiased (R-8) estimator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Descriptive {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; `None` below two observations.
    pub std_dev: Option<f64>,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

pub fn describe(values: &[f64]) -> Result<Descriptive, InsufficientDataError> {
    if values.is_empty() {
        return Err(InsufficientDataError::TooFewObservations {
            test: "descriptive statistics",
            required: 1,
            actual: 0,
        });
    }

    let mut data = Data::new(values.to_vec());
    let std_dev = if values.len() >= 2 {
        data.std_dev().filter(|s| s.is_finite())
    } else {
        None
    };

    Ok(Descriptive {
        count: values.len(),
        mean: mean(values),
        std_dev,
        min: data.min(),
        q1: data.quantile(0.25),
        median: data.quantile(0.5),
        q3: data.quantile(0.75),
        max: data.max(),
    })
}

// ---------------------------------------------------------------------------
// Helpers and distribution tails
// ---------------------------------------------------------------------------

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Median of the values; `None` for an empty slice.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

// Centered sums (Sxx, Syy, Sxy).
fn sums_of_squares(xs: &[f64], ys: &[f64]) -> (f64, f64, f64) {
    let mx = mean(xs);
    let my = mean(ys);
    xs.iter().zip(ys).fold((0.0, 0.0, 0.0), |(sxx, syy, sxy), (x, y)| {
        let dx = x - mx;
        let dy = y - my;
        (sxx + dx * dx, syy + dy * dy, sxy + dx * dy)
    })
}

/// Two-tailed p-value of Student's t with `df` degrees of freedom.
pub fn student_t_two_tailed(t: f64, df: f64) -> f64 {
    if !t.is_finite() {
        return 0.0;
    }
    // Invalid degrees of freedom yield p = 1.
    StudentsT::new(0.0, 1.0, df).map_or(1.0, |dist| (2.0 * dist.sf(t.abs())).clamp(0.0, 1.0))
}

/// Upper tail of the F distribution.
pub fn f_survival(f: f64, df1: f64, df2: f64) -> f64 {
    if f <= 0.0 {
        return 1.0;
    }
    FisherSnedecor::new(df1, df2).map_or(1.0, |dist| dist.sf(f).clamp(0.0, 1.0))
}

/// Two-tailed p-value of a standard normal z.
pub fn normal_two_tailed(z: f64) -> f64 {
    Normal::new(0.0, 1.0).map_or(1.0, |dist| (2.0 * dist.sf(z.abs())).clamp(0.0, 1.0))
}
