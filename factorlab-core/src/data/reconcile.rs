//! Interval reconciliation between a requested range and recorded coverage.
//!
//! Coverage is stored as a flat, strictly increasing list of boundary points
//! with even length: `[s0, e0, s1, e1, ...]`. A point at an even index starts a
//! covered span, a point at an odd index ends one. Spans never touch or
//! overlap, so a request that meets a span at a boundary is fused with it.
//!
//! Everything here is pure: no I/O, no state.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IntervalError {
    #[error("invalid interval: {0}")]
    InvalidInterval(String),
}

/// Closed interval `[start, end]` with `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval<T> {
    pub start: T,
    pub end: T,
}

impl<T: Copy + PartialOrd + fmt::Debug> Interval<T> {
    pub fn new(start: T, end: T) -> Result<Self, IntervalError> {
        if start < end {
            Ok(Self { start, end })
        } else {
            Err(IntervalError::InvalidInterval(format!(
                "start {start:?} must be strictly less than end {end:?}"
            )))
        }
    }

    /// Build from a flat `[start, end]` slice.
    pub fn from_slice(bounds: &[T]) -> Result<Self, IntervalError> {
        match bounds {
            [start, end] => Self::new(*start, *end),
            _ => Err(IntervalError::InvalidInterval(format!(
                "expected exactly two bounds, got {}",
                bounds.len()
            ))),
        }
    }
}

/// Ordered set of disjoint, non-touching closed intervals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Coverage<T> {
    bounds: Vec<T>,
}

impl<T> Default for Coverage<T> {
    fn default() -> Self {
        Self { bounds: Vec::new() }
    }
}

impl<T: Copy + PartialOrd + fmt::Debug> Coverage<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a flat boundary list: even length, strictly increasing.
    pub fn from_bounds(bounds: Vec<T>) -> Result<Self, IntervalError> {
        if bounds.len() % 2 != 0 {
            return Err(IntervalError::InvalidInterval(format!(
                "coverage must have an even number of bounds, got {}",
                bounds.len()
            )));
        }
        if let Some(w) = bounds
            .windows(2)
            .find(|w| w[0].partial_cmp(&w[1]) != Some(Ordering::Less))
        {
            return Err(IntervalError::InvalidInterval(format!(
                "coverage bounds must be strictly increasing, found {:?} before {:?}",
                w[0], w[1]
            )));
        }
        Ok(Self { bounds })
    }

    pub fn bounds(&self) -> &[T] {
        &self.bounds
    }

    pub fn into_bounds(self) -> Vec<T> {
        self.bounds
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    /// Number of covered intervals.
    pub fn len(&self) -> usize {
        self.bounds.len() / 2
    }

    pub fn intervals(&self) -> impl Iterator<Item = Interval<T>> + '_ {
        self.bounds.chunks_exact(2).map(|pair| Interval {
            start: pair[0],
            end: pair[1],
        })
    }

    pub fn first(&self) -> Option<T> {
        self.bounds.first().copied()
    }

    pub fn last(&self) -> Option<T> {
        self.bounds.last().copied()
    }

    /// True if `interval` lies inside a single covered span.
    pub fn covers(&self, interval: &Interval<T>) -> bool {
        self.intervals()
            .any(|span| span.start <= interval.start && interval.end <= span.end)
    }

    /// Restrict the coverage to `[lo, hi]`, dropping spans outside it.
    ///
    /// A span that meets `[lo, hi]` at a single point is kept whole, so the
    /// point stays covered.
    pub fn clamp(&self, lo: T, hi: T) -> Self {
        let mut bounds = Vec::with_capacity(self.bounds.len());
        for span in self.intervals() {
            let start = if span.start < lo { lo } else { span.start };
            let end = if span.end > hi { hi } else { span.end };
            if start < end {
                bounds.push(start);
                bounds.push(end);
            } else if start == end {
                bounds.push(span.start);
                bounds.push(span.end);
            }
        }
        Self { bounds }
    }
}

/// Outcome of [`reconcile`]: the gaps to fetch and the coverage once they are.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation<T> {
    pub to_fetch: Vec<Interval<T>>,
    pub coverage: Coverage<T>,
}

/// Compute the parts of `request` not yet in `coverage`, and the fused union.
///
/// `to_fetch` is the minimal disjoint decomposition of `request \ coverage`.
/// A request bound equal to an existing boundary is treated as inside the
/// adjacent covered span, so no zero-length gap is ever produced.
pub fn reconcile<T>(
    request: Interval<T>,
    coverage: &Coverage<T>,
) -> Result<Reconciliation<T>, IntervalError>
where
    T: Copy + PartialOrd + fmt::Debug,
{
    // Re-check: both may have been built with struct literals or deserialized.
    let request = Interval::new(request.start, request.end)?;
    let coverage = Coverage::from_bounds(coverage.bounds.clone())?;

    let (s, e) = (request.start, request.end);
    let a = coverage.bounds();
    let n = a.len();

    if n == 0 {
        return Ok(Reconciliation {
            to_fetch: vec![request],
            coverage: Coverage { bounds: vec![s, e] },
        });
    }

    // Number of boundary points strictly below each request bound.
    let mut s_i = a.partition_point(|p| *p < s);
    let mut e_i = a.partition_point(|p| *p < e);

    // Entirely right of everything, not touching.
    if s_i == n {
        let mut bounds = a.to_vec();
        bounds.extend([s, e]);
        return Ok(Reconciliation {
            to_fetch: vec![request],
            coverage: Coverage { bounds },
        });
    }

    // A bound sitting exactly on a span start belongs to that span.
    if s_i < n && a[s_i] == s && s_i % 2 == 0 {
        s_i += 1;
    }
    if e_i < n && a[e_i] == e && e_i % 2 == 0 {
        e_i += 1;
    }

    // Entirely left of everything, not touching.
    if e_i == 0 {
        let mut bounds = vec![s, e];
        bounds.extend_from_slice(a);
        return Ok(Reconciliation {
            to_fetch: vec![request],
            coverage: Coverage { bounds },
        });
    }

    if s_i == e_i {
        return Ok(if s_i % 2 == 1 {
            // Both bounds inside the same covered span.
            Reconciliation {
                to_fetch: Vec::new(),
                coverage,
            }
        } else {
            // Both bounds inside the same gap.
            let mut bounds = Vec::with_capacity(n + 2);
            bounds.extend_from_slice(&a[..s_i]);
            bounds.extend([s, e]);
            bounds.extend_from_slice(&a[s_i..]);
            Reconciliation {
                to_fetch: vec![request],
                coverage: Coverage { bounds },
            }
        });
    }

    // Gap boundaries inside the request, alternating start/end.
    let mut gaps: Vec<T> = Vec::with_capacity(e_i - s_i + 2);
    let (prefix, fused_start) = if s_i % 2 == 0 {
        gaps.push(s);
        (&a[..s_i], s)
    } else {
        (&a[..s_i - 1], a[s_i - 1])
    };
    gaps.extend_from_slice(&a[s_i..e_i]);
    let (suffix, fused_end) = if e_i % 2 == 0 {
        gaps.push(e);
        (&a[e_i..], e)
    } else {
        (&a[e_i + 1..], a[e_i])
    };

    let to_fetch = gaps
        .chunks_exact(2)
        .map(|pair| Interval {
            start: pair[0],
            end: pair[1],
        })
        .collect();

    let mut bounds = Vec::with_capacity(prefix.len() + 2 + suffix.len());
    bounds.extend_from_slice(prefix);
    bounds.extend([fused_start, fused_end]);
    bounds.extend_from_slice(suffix);

    Ok(Reconciliation {
        to_fetch,
        coverage: Coverage { bounds },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cov(bounds: &[f64]) -> Coverage<f64> {
        Coverage::from_bounds(bounds.to_vec()).unwrap()
    }

    fn run(request: [f64; 2], coverage: &[f64]) -> (Vec<[f64; 2]>, Vec<f64>) {
        let r = reconcile(Interval::from_slice(&request).unwrap(), &cov(coverage)).unwrap();
        (
            r.to_fetch.iter().map(|i| [i.start, i.end]).collect(),
            r.coverage.into_bounds(),
        )
    }

    const COV: [f64; 6] = [0.0, 1.0, 2.0, 8.0, 10.0, 20.0];

    #[test]
    fn request_inside_span_fetches_nothing() {
        assert_eq!(run([0.0, 1.0], &COV), (vec![], COV.to_vec()));
        assert_eq!(run([3.0, 7.0], &COV), (vec![], COV.to_vec()));
    }

    #[test]
    fn request_left_of_coverage_is_inserted_first() {
        assert_eq!(
            run([-2.0, -1.0], &COV),
            (vec![[-2.0, -1.0]], vec![-2.0, -1.0, 0.0, 1.0, 2.0, 8.0, 10.0, 20.0])
        );
    }

    #[test]
    fn request_right_of_coverage_is_appended() {
        assert_eq!(
            run([30.0, 40.0], &COV),
            (vec![[30.0, 40.0]], vec![0.0, 1.0, 2.0, 8.0, 10.0, 20.0, 30.0, 40.0])
        );
    }

    #[test]
    fn abutting_request_fuses_neighbours() {
        assert_eq!(run([0.0, 2.0], &COV), (vec![[1.0, 2.0]], vec![0.0, 8.0, 10.0, 20.0]));
        assert_eq!(
            run([1.5, 2.0], &COV),
            (vec![[1.5, 2.0]], vec![0.0, 1.0, 1.5, 8.0, 10.0, 20.0])
        );
    }

    #[test]
    fn request_spanning_several_gaps() {
        assert_eq!(
            run([1.5, 15.0], &COV),
            (vec![[1.5, 2.0], [8.0, 10.0]], vec![0.0, 1.0, 1.5, 20.0])
        );
        assert_eq!(
            run([0.0, 40.0], &COV),
            (vec![[1.0, 2.0], [8.0, 10.0], [20.0, 40.0]], vec![0.0, 40.0])
        );
        assert_eq!(
            run([-1.0, 40.0], &COV),
            (
                vec![[-1.0, 0.0], [1.0, 2.0], [8.0, 10.0], [20.0, 40.0]],
                vec![-1.0, 40.0]
            )
        );
        assert_eq!(
            run([-1.0, 20.0], &COV),
            (vec![[-1.0, 0.0], [1.0, 2.0], [8.0, 10.0]], vec![-1.0, 20.0])
        );
    }

    #[test]
    fn small_coverages() {
        assert_eq!(
            run([0.0, 10.0], &[1.0, 2.0]),
            (vec![[0.0, 1.0], [2.0, 10.0]], vec![0.0, 10.0])
        );
        assert_eq!(run([0.0, 10.0], &[]), (vec![[0.0, 10.0]], vec![0.0, 10.0]));
        assert_eq!(run([0.0, 10.0], &[-1.0, 8.0]), (vec![[8.0, 10.0]], vec![-1.0, 10.0]));
        assert_eq!(run([0.0, 1.0], &[5.0, 6.0]), (vec![[0.0, 1.0]], vec![0.0, 1.0, 5.0, 6.0]));
    }

    #[test]
    fn request_in_single_gap_is_inserted_between_spans() {
        assert_eq!(
            run([8.5, 9.5], &COV),
            (vec![[8.5, 9.5]], vec![0.0, 1.0, 2.0, 8.0, 8.5, 9.5, 10.0, 20.0])
        );
    }

    #[test]
    fn touching_the_tail_extends_last_span() {
        assert_eq!(
            run([20.0, 30.0], &COV),
            (vec![[20.0, 30.0]], vec![0.0, 1.0, 2.0, 8.0, 10.0, 30.0])
        );
    }

    #[test]
    fn malformed_requests_are_rejected() {
        assert!(Interval::<f64>::from_slice(&[0.0, 0.0]).is_err());
        assert!(Interval::<f64>::from_slice(&[0.0]).is_err());
        assert!(Interval::<f64>::from_slice(&[0.0, -1.0]).is_err());

        let bad = Interval { start: 0.0, end: 0.0 };
        assert!(matches!(
            reconcile(bad, &Coverage::new()),
            Err(IntervalError::InvalidInterval(_))
        ));
    }

    #[test]
    fn malformed_coverage_is_rejected() {
        assert!(Coverage::from_bounds(vec![4.0]).is_err());
        assert!(Coverage::from_bounds(vec![0.0, 2.0, 2.0, 3.0]).is_err());
        assert!(Coverage::from_bounds(vec![3.0, 1.0]).is_err());
    }

    #[test]
    fn reconcile_is_idempotent() {
        let first = reconcile(Interval::new(1.5, 15.0).unwrap(), &cov(&COV)).unwrap();
        let second = reconcile(Interval::new(1.5, 15.0).unwrap(), &first.coverage).unwrap();
        assert!(second.to_fetch.is_empty());
        assert_eq!(second.coverage, first.coverage);
    }

    #[test]
    fn works_with_integer_millis() {
        let coverage = Coverage::from_bounds(vec![1_000_i64, 5_000]).unwrap();
        let r = reconcile(Interval::new(4_000, 9_000).unwrap(), &coverage).unwrap();
        assert_eq!(r.to_fetch, vec![Interval { start: 5_000, end: 9_000 }]);
        assert_eq!(r.coverage.bounds(), &[1_000, 9_000]);
    }

    #[test]
    fn clamp_trims_and_drops_outside_spans() {
        let c = cov(&COV);
        assert_eq!(c.clamp(0.5, 15.0).bounds(), &[0.5, 1.0, 2.0, 8.0, 10.0, 15.0]);
        assert_eq!(c.clamp(1.5, 9.0).bounds(), &[2.0, 8.0]);
        assert!(c.clamp(30.0, 40.0).is_empty());
    }

    #[test]
    fn clamp_keeps_span_touching_range_at_one_point() {
        let c = cov(&COV);
        // [0, 1] meets [1, 9] only at 1.
        assert_eq!(c.clamp(1.0, 9.0).bounds(), &[0.0, 1.0, 2.0, 8.0]);
        assert_eq!(cov(&[0.0, 4.0]).clamp(2.0, 2.0).bounds(), &[0.0, 4.0]);
        assert_eq!(c.clamp(20.0, 30.0).bounds(), &[10.0, 20.0]);
    }

    #[test]
    fn covers_checks_single_span() {
        let c = cov(&COV);
        assert!(c.covers(&Interval::new(2.0, 8.0).unwrap()));
        assert!(!c.covers(&Interval::new(0.0, 2.0).unwrap()));
    }
}
