//! Strong Wolfe line search.
//!
//! Follows the bracketing scheme of Algorithm 3.5 in Nocedal & Wright: trial
//! steps double until one of them brackets an acceptable step, and [`zoom`]
//! then refines the bracket by quadratic interpolation. The Wolfe constants
//! live in a single [`WolfeParams`] value shared by both phases.

use std::cell::Cell;

use crate::BfgsError;
use crate::numdiff::central_difference_1d;

/// Standard sufficient-decrease constant.
pub const DEFAULT_C1: f64 = 1e-4;
/// Standard curvature constant for quasi-Newton methods.
pub const DEFAULT_C2: f64 = 0.9;
/// Default number of bracketing trials.
pub const DEFAULT_LINE_SEARCH_ITERATIONS: usize = 10;
/// Default cap on zoom refinements.
pub const DEFAULT_ZOOM_ITERATIONS: usize = 100;

/// The pair of constants `0 < c1 < c2 < 1` defining the strong Wolfe conditions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WolfeParams {
    c1: f64,
    c2: f64,
}

impl WolfeParams {
    pub fn new(c1: f64, c2: f64) -> Result<Self, BfgsError> {
        if 0.0 < c1 && c1 < c2 && c2 < 1.0 {
            Ok(Self { c1, c2 })
        } else {
            Err(BfgsError::InvalidWolfeParameters { c1, c2 })
        }
    }

    pub fn c1(&self) -> f64 {
        self.c1
    }

    pub fn c2(&self) -> f64 {
        self.c2
    }

    /// `φ(α) ≤ φ(0) + c1·α·φ'(0)`. A non-finite `φ(α)` never qualifies.
    #[inline]
    pub fn sufficient_decrease(&self, phi0: f64, dphi0: f64, alpha: f64, phi_alpha: f64) -> bool {
        phi_alpha.is_finite() && phi_alpha <= phi0 + self.c1 * alpha * dphi0
    }

    /// `|φ'(α)| ≤ c2·|φ'(0)|`.
    #[inline]
    pub fn curvature(&self, dphi0: f64, dphi_alpha: f64) -> bool {
        dphi_alpha.abs() <= self.c2 * dphi0.abs()
    }

    /// Both strong Wolfe conditions at once.
    pub fn holds(&self, phi0: f64, dphi0: f64, alpha: f64, phi_alpha: f64, dphi_alpha: f64) -> bool {
        self.sufficient_decrease(phi0, dphi0, alpha, phi_alpha) && self.curvature(dphi0, dphi_alpha)
    }
}

impl Default for WolfeParams {
    fn default() -> Self {
        Self {
            c1: DEFAULT_C1,
            c2: DEFAULT_C2,
        }
    }
}

/// Configuration for [`line_search`] and its zoom phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSearchOptions {
    pub wolfe: WolfeParams,
    /// Upper bound on any trial step. `None` lets the bracket grow freely.
    pub alpha_max: Option<f64>,
    /// Number of bracketing trials before giving up.
    pub max_iterations: usize,
    /// Hard cap on zoom refinements.
    pub zoom_max_iterations: usize,
}

impl Default for LineSearchOptions {
    fn default() -> Self {
        Self {
            wolfe: WolfeParams::default(),
            alpha_max: None,
            max_iterations: DEFAULT_LINE_SEARCH_ITERATIONS,
            zoom_max_iterations: DEFAULT_ZOOM_ITERATIONS,
        }
    }
}

impl LineSearchOptions {
    fn first_trial(&self) -> f64 {
        self.alpha_max.map_or(1.0, |cap| cap.min(1.0))
    }

    fn next_trial(&self, alpha: f64) -> f64 {
        let doubled = 2.0 * alpha;
        self.alpha_max.map_or(doubled, |cap| doubled.min(cap))
    }

    pub(crate) fn validate(&self) -> Result<(), BfgsError> {
        match self.alpha_max {
            Some(cap) if !(cap > 0.0) => Err(BfgsError::InvalidParameter {
                name: "alpha_max",
                value: cap,
            }),
            _ => Ok(()),
        }
    }
}

/// Which path produced the returned step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSearchExit {
    /// A bracketing trial satisfied both conditions directly.
    Wolfe,
    /// Zoom found a step satisfying both conditions.
    Zoom,
    /// Zoom hit its cap or its bracket collapsed; the step is the best known
    /// point satisfying sufficient decrease.
    ZoomExhausted,
    /// Bracketing ran out of trials; the step is the last trial.
    Exhausted,
}

/// Result of a line search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSearchOutcome {
    /// The chosen step length.
    pub alpha: f64,
    /// `φ(alpha)`, as evaluated during the search.
    pub value: f64,
    pub exit: LineSearchExit,
    /// Number of `φ` evaluations made by the search, excluding `φ(0)` and derivative probes.
    pub evaluations: usize,
}

impl LineSearchOutcome {
    /// True when the step is known to satisfy both strong Wolfe conditions.
    pub fn is_wolfe(&self) -> bool {
        matches!(self.exit, LineSearchExit::Wolfe | LineSearchExit::Zoom)
    }
}

/// The zoom interval at the start of one refinement.
///
/// `lo` is always a step satisfying sufficient decrease with the lowest `φ`
/// seen so far; `hi` may lie on either side of it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bracket {
    pub lo: f64,
    pub hi: f64,
    pub phi_lo: f64,
    pub dphi_lo: f64,
    pub phi_hi: f64,
}

/// Finds a step length along `φ` satisfying the strong Wolfe conditions.
///
/// `phi` is the line restriction `φ(α) = f(x + α·p)` and `dphi` its derivative.
/// If no trial qualifies within `options.max_iterations`, the last trial step is
/// returned with [`LineSearchExit::Exhausted`]; callers must tolerate a step that
/// does not meet the conditions.
pub fn line_search<P, D>(phi: P, dphi: D, options: &LineSearchOptions) -> LineSearchOutcome
where
    P: Fn(f64) -> f64,
    D: Fn(f64) -> f64,
{
    let phi0 = phi(0.0);
    let dphi0 = dphi(0.0);
    line_search_with(phi, dphi, phi0, dphi0, options, |_: &Bracket| ())
}

/// [`line_search`] with `φ'` estimated by central differences of step `eps`.
pub fn line_search_numeric<P>(phi: P, eps: f64, options: &LineSearchOptions) -> LineSearchOutcome
where
    P: Fn(f64) -> f64,
{
    let dphi = |alpha: f64| central_difference_1d(&phi, alpha, eps);
    line_search(&phi, dphi, options)
}

/// [`line_search`] with `φ(0)` and `φ'(0)` already known, reporting every zoom
/// bracket to `observer`.
pub fn line_search_with<P, D, O>(
    phi: P,
    dphi: D,
    phi0: f64,
    dphi0: f64,
    options: &LineSearchOptions,
    mut observer: O,
) -> LineSearchOutcome
where
    P: Fn(f64) -> f64,
    D: Fn(f64) -> f64,
    O: FnMut(&Bracket),
{
    let evaluations = Cell::new(0);
    let counted = |alpha: f64| {
        evaluations.set(evaluations.get() + 1);
        phi(alpha)
    };
    let mut outcome = bracketing(&counted, &dphi, phi0, dphi0, options, &mut observer);
    outcome.evaluations = evaluations.get();
    outcome
}

// Doubling phase; hands the first bracket that must contain a Wolfe step to zoom.
fn bracketing<P, D, O>(
    phi: &P,
    dphi: &D,
    phi0: f64,
    dphi0: f64,
    options: &LineSearchOptions,
    observer: &mut O,
) -> LineSearchOutcome
where
    P: Fn(f64) -> f64,
    D: Fn(f64) -> f64,
    O: FnMut(&Bracket),
{
    let wolfe = &options.wolfe;
    if dphi0 >= 0.0 {
        log::warn!(
            "[BFGS Wolfe] Non-descent direction detected (φ'(0) = {:.2e} >= 0).",
            dphi0
        );
    }

    let mut alpha_prev = 0.0;
    let mut phi_prev = phi0;
    let mut dphi_prev = dphi0;
    let mut alpha = options.first_trial();

    for k in 1..=options.max_iterations {
        let phi_k = phi(alpha);
        if !wolfe.sufficient_decrease(phi0, dphi0, alpha, phi_k) || (k > 1 && phi_k >= phi_prev) {
            let initial = Bracket {
                lo: alpha_prev,
                hi: alpha,
                phi_lo: phi_prev,
                dphi_lo: dphi_prev,
                phi_hi: phi_k,
            };
            return zoom(phi, dphi, initial, phi0, dphi0, options, observer);
        }

        let dphi_k = dphi(alpha);
        if wolfe.curvature(dphi0, dphi_k) {
            return LineSearchOutcome {
                alpha,
                value: phi_k,
                exit: LineSearchExit::Wolfe,
                evaluations: 0,
            };
        }
        if dphi_k >= 0.0 {
            let initial = Bracket {
                lo: alpha,
                hi: alpha_prev,
                phi_lo: phi_k,
                dphi_lo: dphi_k,
                phi_hi: phi_prev,
            };
            return zoom(phi, dphi, initial, phi0, dphi0, options, observer);
        }

        alpha_prev = alpha;
        phi_prev = phi_k;
        dphi_prev = dphi_k;
        alpha = options.next_trial(alpha);
    }

    log::debug!(
        "[BFGS Wolfe] No trial met both conditions after {} attempts; using α = {:.3e}.",
        options.max_iterations,
        alpha_prev
    );
    LineSearchOutcome {
        alpha: alpha_prev,
        value: phi_prev,
        exit: LineSearchExit::Exhausted,
        evaluations: 0,
    }
}

/// Refines a bracket until a step satisfies both strong Wolfe conditions.
///
/// The trial step is the minimizer of the quadratic through `φ(lo)`, `φ'(lo)`
/// and `φ(hi)`. A trial within 10% of the bracket width from `lo` is replaced
/// by `0.5·(hi − lo)`, which is the bracket midpoint only when `lo = 0`.
fn zoom<P, D, O>(
    phi: &P,
    dphi: &D,
    bracket: Bracket,
    phi0: f64,
    dphi0: f64,
    options: &LineSearchOptions,
    observer: &mut O,
) -> LineSearchOutcome
where
    P: Fn(f64) -> f64,
    D: Fn(f64) -> f64,
    O: FnMut(&Bracket),
{
    let wolfe = &options.wolfe;
    let Bracket {
        mut lo,
        mut hi,
        mut phi_lo,
        mut dphi_lo,
        mut phi_hi,
    } = bracket;

    for _ in 0..options.zoom_max_iterations {
        observer(&Bracket {
            lo,
            hi,
            phi_lo,
            dphi_lo,
            phi_hi,
        });
        let width = hi - lo;
        if width.abs() <= f64::EPSILON * lo.abs().max(1.0) {
            log::trace!("[BFGS Zoom] Bracket collapsed at α = {:.3e}.", lo);
            return LineSearchOutcome {
                alpha: lo,
                value: phi_lo,
                exit: LineSearchExit::ZoomExhausted,
                evaluations: 0,
            };
        }

        let mut alpha = lo - dphi_lo * width * width / (2.0 * (phi_hi - phi_lo - dphi_lo * width));
        if !alpha.is_finite() || (alpha - lo).abs() < 0.1 * width.abs() {
            alpha = 0.5 * (hi - lo);
        }
        log::trace!(
            "[BFGS Zoom] lo = {:.6e}, hi = {:.6e}, trial = {:.6e}",
            lo,
            hi,
            alpha
        );

        let phi_alpha = phi(alpha);
        if !wolfe.sufficient_decrease(phi0, dphi0, alpha, phi_alpha) || phi_alpha >= phi_lo {
            hi = alpha;
            phi_hi = phi_alpha;
        } else {
            let dphi_alpha = dphi(alpha);
            if wolfe.curvature(dphi0, dphi_alpha) {
                return LineSearchOutcome {
                    alpha,
                    value: phi_alpha,
                    exit: LineSearchExit::Zoom,
                    evaluations: 0,
                };
            }
            if dphi_alpha * (hi - lo) >= 0.0 {
                hi = lo;
                phi_hi = phi_lo;
            }
            lo = alpha;
            phi_lo = phi_alpha;
            dphi_lo = dphi_alpha;
        }
    }

    log::debug!(
        "[BFGS Zoom] No qualifying step after {} refinements; using α_low = {:.3e}.",
        options.zoom_max_iterations,
        lo
    );
    LineSearchOutcome {
        alpha: lo,
        value: phi_lo,
        exit: LineSearchExit::ZoomExhausted,
        evaluations: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Bracket, LineSearchExit, LineSearchOptions, WolfeParams, line_search, line_search_numeric,
        line_search_with,
    };
    use crate::BfgsError;
    use spectral::prelude::*;

    // The regression function from the classic line-search test set:
    // steep quartic well near α = 0.1 plus a gentle sine.
    fn quartic_sine(alpha: f64) -> f64 {
        (10.0 * alpha - 1.0).powi(4) + alpha.sin()
    }

    fn quartic_sine_derivative(alpha: f64) -> f64 {
        40.0 * (10.0 * alpha - 1.0).powi(3) + alpha.cos()
    }

    fn assert_strong_wolfe<P, D>(phi: P, dphi: D, alpha: f64)
    where
        P: Fn(f64) -> f64,
        D: Fn(f64) -> f64,
    {
        let wolfe = WolfeParams::default();
        let (phi0, dphi0) = (phi(0.0), dphi(0.0));
        assert!(
            wolfe.sufficient_decrease(phi0, dphi0, alpha, phi(alpha)),
            "sufficient decrease fails at α = {alpha}"
        );
        assert!(
            wolfe.curvature(dphi0, dphi(alpha)),
            "curvature fails at α = {alpha}"
        );
    }

    #[test]
    fn quartic_sine_step_satisfies_both_conditions() {
        let options = LineSearchOptions {
            alpha_max: Some(1.0),
            ..LineSearchOptions::default()
        };
        let outcome = line_search(quartic_sine, quartic_sine_derivative, &options);
        assert_eq!(outcome.exit, LineSearchExit::Zoom);
        assert_that!(&outcome.alpha).is_greater_than(0.0);
        assert_that!(&outcome.alpha).is_less_than_or_equal_to(1.0);
        assert_that!(&outcome.value).is_close_to(quartic_sine(outcome.alpha), 1e-15);
        assert_strong_wolfe(quartic_sine, quartic_sine_derivative, outcome.alpha);
    }

    #[test]
    fn quartic_sine_with_numeric_derivative() {
        let options = LineSearchOptions {
            alpha_max: Some(1.0),
            ..LineSearchOptions::default()
        };
        let outcome = line_search_numeric(quartic_sine, 1e-6, &options);
        assert!(outcome.is_wolfe());
        assert_strong_wolfe(quartic_sine, quartic_sine_derivative, outcome.alpha);
    }

    #[test]
    fn unit_step_is_accepted_directly() {
        let phi = |a: f64| (a - 2.0).powi(2);
        let dphi = |a: f64| 2.0 * (a - 2.0);
        let outcome = line_search(phi, dphi, &LineSearchOptions::default());
        assert_eq!(outcome.exit, LineSearchExit::Wolfe);
        assert_eq!(outcome.alpha, 1.0);
        assert_eq!(outcome.evaluations, 1);
        assert_strong_wolfe(phi, dphi, outcome.alpha);
    }

    #[test]
    fn bracket_expands_by_doubling() {
        // φ'(α) = 2(α − 30): the curvature test first passes at α = 4.
        let phi = |a: f64| (a - 30.0).powi(2);
        let dphi = |a: f64| 2.0 * (a - 30.0);
        let outcome = line_search(phi, dphi, &LineSearchOptions::default());
        assert_eq!(outcome.exit, LineSearchExit::Wolfe);
        assert_eq!(outcome.alpha, 4.0);
        assert_eq!(outcome.evaluations, 3);
        assert_strong_wolfe(phi, dphi, outcome.alpha);
    }

    #[test]
    fn expansion_respects_alpha_max() {
        let phi = |a: f64| (a - 30.0).powi(2);
        let dphi = |a: f64| 2.0 * (a - 30.0);
        let options = LineSearchOptions {
            alpha_max: Some(3.0),
            ..LineSearchOptions::default()
        };
        let outcome = line_search(phi, dphi, &options);
        assert_that!(&outcome.alpha).is_less_than_or_equal_to(3.0);
    }

    #[test]
    fn unbounded_descent_returns_last_trial() {
        let phi = |a: f64| -a;
        let dphi = |_: f64| -1.0;
        let outcome = line_search(phi, dphi, &LineSearchOptions::default());
        assert_eq!(outcome.exit, LineSearchExit::Exhausted);
        assert_eq!(outcome.alpha, 512.0);
        assert_eq!(outcome.value, -512.0);
        assert_eq!(outcome.evaluations, 10);
    }

    #[test]
    fn increasing_slope_swaps_bracket_order() {
        // α = 1 overshoots the minimizer at 0.75 but still decreases φ enough,
        // so zoom starts with lo = 1 and hi = 0.
        let phi = |a: f64| (a - 0.75).powi(2);
        let dphi = |a: f64| 2.0 * (a - 0.75);
        let options = LineSearchOptions {
            wolfe: WolfeParams::new(1e-4, 0.1).unwrap(),
            ..LineSearchOptions::default()
        };
        let mut first = None;
        let outcome = line_search_with(phi, dphi, phi(0.0), dphi(0.0), &options, |b: &Bracket| {
            if first.is_none() {
                first = Some(*b);
            }
        });
        let first = first.expect("zoom was not entered");
        assert_eq!((first.lo, first.hi), (1.0, 0.0));
        assert!(outcome.is_wolfe());
        assert!(options.wolfe.holds(
            phi(0.0),
            dphi(0.0),
            outcome.alpha,
            phi(outcome.alpha),
            dphi(outcome.alpha)
        ));
    }

    #[test]
    fn zoom_low_end_always_satisfies_sufficient_decrease() {
        let wolfe = WolfeParams::default();
        let (phi0, dphi0) = (quartic_sine(0.0), quartic_sine_derivative(0.0));
        let options = LineSearchOptions {
            alpha_max: Some(1.0),
            ..LineSearchOptions::default()
        };
        let mut brackets = Vec::new();
        let outcome = line_search_with(
            quartic_sine,
            quartic_sine_derivative,
            phi0,
            dphi0,
            &options,
            |b: &Bracket| brackets.push(*b),
        );
        assert!(outcome.is_wolfe());
        assert_that!(&brackets.len()).is_greater_than(1);
        for b in &brackets {
            assert!(wolfe.sufficient_decrease(phi0, dphi0, b.lo, b.phi_lo));
            assert_that!(&b.phi_lo).is_less_than_or_equal_to(phi0);
        }
        // Every refinement here pulls the high end inward.
        for pair in brackets.windows(2) {
            let before = (pair[0].hi - pair[0].lo).abs();
            let after = (pair[1].hi - pair[1].lo).abs();
            assert_that!(&after).is_less_than_or_equal_to(before);
        }
    }

    #[test]
    fn infinite_wall_is_bracketed() {
        let phi = |a: f64| if a > 0.5 { f64::INFINITY } else { (a - 0.3).powi(2) };
        let dphi = |a: f64| if a > 0.5 { f64::INFINITY } else { 2.0 * (a - 0.3) };
        let outcome = line_search(phi, dphi, &LineSearchOptions::default());
        assert!(outcome.alpha.is_finite());
        assert_that!(&outcome.alpha).is_greater_than(0.0);
        assert_that!(&outcome.value).is_less_than(phi(0.0));
    }

    #[test]
    fn zoom_cap_returns_best_low_end() {
        let options = LineSearchOptions {
            alpha_max: Some(1.0),
            zoom_max_iterations: 0,
            ..LineSearchOptions::default()
        };
        let outcome = line_search(quartic_sine, quartic_sine_derivative, &options);
        assert_eq!(outcome.exit, LineSearchExit::ZoomExhausted);
        assert_eq!(outcome.alpha, 0.0);
    }

    #[test]
    fn wolfe_constants_are_validated() {
        assert!(WolfeParams::new(1e-4, 0.9).is_ok());
        for (c1, c2) in [(0.0, 0.9), (0.5, 0.4), (1e-4, 1.0), (f64::NAN, 0.9)] {
            assert!(matches!(
                WolfeParams::new(c1, c2),
                Err(BfgsError::InvalidWolfeParameters { .. })
            ));
        }
    }
}
