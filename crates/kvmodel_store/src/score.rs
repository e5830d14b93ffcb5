//! Score intervals for sorted-set range queries.

use std::fmt;

/// One end of a score interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreBound {
    /// The score itself is part of the interval.
    Inclusive(f64),
    /// The score itself is not part of the interval.
    Exclusive(f64),
    /// No bound (`-inf` or `+inf`).
    Unbounded,
}

/// An interval of sorted-set scores, equivalent to the `min`/`max`
/// arguments of `ZRANGEBYSCORE`.
///
/// # Example
///
/// ```rust
/// use kvmodel_store::ScoreRange;
///
/// let range = ScoreRange::below(7.0);
/// assert!(range.contains(6.0));
/// assert!(!range.contains(7.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRange {
    /// Lower end.
    pub min: ScoreBound,
    /// Upper end.
    pub max: ScoreBound,
}

impl ScoreRange {
    /// Creates an interval from explicit bounds.
    #[must_use]
    pub const fn new(min: ScoreBound, max: ScoreBound) -> Self {
        Self { min, max }
    }

    /// `[v, v]`
    #[must_use]
    pub const fn exact(v: f64) -> Self {
        Self::new(ScoreBound::Inclusive(v), ScoreBound::Inclusive(v))
    }

    /// `(v, +inf)`
    #[must_use]
    pub const fn above(v: f64) -> Self {
        Self::new(ScoreBound::Exclusive(v), ScoreBound::Unbounded)
    }

    /// `[v, +inf)`
    #[must_use]
    pub const fn at_least(v: f64) -> Self {
        Self::new(ScoreBound::Inclusive(v), ScoreBound::Unbounded)
    }

    /// `(-inf, v)`
    #[must_use]
    pub const fn below(v: f64) -> Self {
        Self::new(ScoreBound::Unbounded, ScoreBound::Exclusive(v))
    }

    /// `(-inf, v]`
    #[must_use]
    pub const fn at_most(v: f64) -> Self {
        Self::new(ScoreBound::Unbounded, ScoreBound::Inclusive(v))
    }

    /// `(-inf, +inf)`
    #[must_use]
    pub const fn all() -> Self {
        Self::new(ScoreBound::Unbounded, ScoreBound::Unbounded)
    }

    /// Returns true if `score` lies inside the interval.
    #[must_use]
    pub fn contains(&self, score: f64) -> bool {
        self.above_min(score) && self.below_max(score)
    }

    pub(crate) fn above_min(&self, score: f64) -> bool {
        match self.min {
            ScoreBound::Inclusive(min) => score >= min,
            ScoreBound::Exclusive(min) => score > min,
            ScoreBound::Unbounded => true,
        }
    }

    pub(crate) fn below_max(&self, score: f64) -> bool {
        match self.max {
            ScoreBound::Inclusive(max) => score <= max,
            ScoreBound::Exclusive(max) => score < max,
            ScoreBound::Unbounded => true,
        }
    }

    /// The lowest score the interval can start at, if bounded below.
    pub(crate) fn lower_score(&self) -> Option<f64> {
        match self.min {
            ScoreBound::Inclusive(v) | ScoreBound::Exclusive(v) => Some(v),
            ScoreBound::Unbounded => None,
        }
    }
}

impl fmt::Display for ScoreBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inclusive(v) => write!(f, "{v}"),
            Self::Exclusive(v) => write!(f, "({v}"),
            Self::Unbounded => write!(f, "inf"),
        }
    }
}

impl fmt::Display for ScoreRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let min = match self.min {
            ScoreBound::Unbounded => "-inf".to_string(),
            bound => bound.to_string(),
        };
        let max = match self.max {
            ScoreBound::Unbounded => "+inf".to_string(),
            bound => bound.to_string(),
        };
        write!(f, "[{min} {max}]")
    }
}
