//! The BFGS outer iteration.
//!
//! Each iteration computes `p = −H·∇f(x)`, chooses a step along `p` with the
//! strong Wolfe line search, and applies the rank-two inverse update
//!
//! ```text
//! H⁺ = (I − ρ·s·yᵀ)·H·(I − ρ·y·sᵀ) + ρ·s·sᵀ,   ρ = 1 / (yᵀs)
//! ```
//!
//! Only the current iterate and the proposed next one are held at any time.

use ndarray::{Array1, Array2};
use std::cell::Cell;
use std::ops::ControlFlow;

use crate::BfgsError;
use crate::line_search::{
    Bracket, LineSearchExit, LineSearchOptions, WolfeParams, line_search_with,
};
use crate::numdiff::{Analytic, CentralDifference, Gradient};

/// Default gradient-norm tolerance.
pub const DEFAULT_GTOL: f64 = 1e-9;

// `yᵀs` must exceed this fraction of `‖s‖·‖y‖` for an update to be applied.
const CURVATURE_EPS: f64 = 1e-12;

/// What to do when the curvature condition `yᵀs > 0` fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CurvaturePolicy {
    /// Keep the current inverse Hessian for this iteration.
    #[default]
    Skip,
    /// Abort with [`BfgsError::NonPositiveCurvature`].
    Fail,
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// `‖∇f(x)‖ ≤ gtol`.
    GradientTolerance,
    /// The last step was shorter than `tol`.
    StepTolerance,
    /// The line search returned a zero step, so the iterate can no longer move.
    Stalled,
    /// The iteration budget was used up.
    MaxIterations,
    /// The observer asked the run to stop.
    Cancelled,
    /// A step failed the curvature condition under [`CurvaturePolicy::Fail`].
    /// Only carried by the `last_solution` of [`BfgsError::NonPositiveCurvature`].
    CurvatureFailure,
}

/// Whether the inverse Hessian was updated in an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    Applied,
    Skipped,
}

/// A summary of a finished optimization run.
///
/// Note that for non-convex functions, convergence to a local minimum is not guaranteed.
#[derive(Debug, Clone)]
pub struct BfgsSolution {
    /// The last iterate.
    pub final_point: Array1<f64>,
    /// The objective value at the final point.
    pub final_value: f64,
    /// The norm of the gradient at the final point.
    pub final_gradient_norm: f64,
    /// The inverse-Hessian approximation in effect when the run ended.
    pub inverse_hessian: Array2<f64>,
    /// The number of completed iterations. A step that triggers the step-size
    /// tolerance is reflected in `final_point` but not counted.
    pub iterations: usize,
    /// The total number of objective evaluations, including finite-difference probes.
    pub func_evals: usize,
    /// The total number of full gradient evaluations.
    pub grad_evals: usize,
    /// Iterations whose inverse-Hessian update was skipped for lack of curvature.
    pub skipped_updates: usize,
    pub termination: Termination,
}

impl BfgsSolution {
    /// True when a tolerance, rather than a budget or a stall, ended the run.
    pub fn converged(&self) -> bool {
        matches!(
            self.termination,
            Termination::GradientTolerance | Termination::StepTolerance
        )
    }
}

/// Progress handed to the observer after every completed iteration.
#[derive(Debug)]
pub struct IterationReport<'r> {
    /// Number of completed iterations, including this one.
    pub iteration: usize,
    pub point: &'r Array1<f64>,
    pub value: f64,
    pub gradient_norm: f64,
    pub step_length: f64,
    pub line_search_exit: LineSearchExit,
    pub update: UpdateStatus,
    pub inverse_hessian: &'r Array2<f64>,
}

type Observer<'a> = Box<dyn FnMut(&IterationReport<'_>) -> ControlFlow<()> + 'a>;

/// Configuration record for [`minimize`].
#[derive(Debug, Clone)]
pub struct MinimizeOptions<G = CentralDifference> {
    /// Stop when a step is shorter than this. `None` disables the test.
    pub tol: Option<f64>,
    /// Stop when the gradient norm falls to this value.
    pub gtol: f64,
    /// Gradient source; central differences unless an analytic gradient is given.
    pub gradient: G,
    /// Iteration cap. `None` runs until a tolerance is met.
    pub max_iterations: Option<usize>,
    pub line_search: LineSearchOptions,
    pub curvature_policy: CurvaturePolicy,
}

impl Default for MinimizeOptions {
    fn default() -> Self {
        Self {
            tol: None,
            gtol: DEFAULT_GTOL,
            gradient: CentralDifference::default(),
            max_iterations: None,
            line_search: LineSearchOptions::default(),
            curvature_policy: CurvaturePolicy::default(),
        }
    }
}

impl MinimizeOptions<CentralDifference> {
    /// Sets the finite-difference step.
    pub fn with_eps(mut self, eps: f64) -> Self {
        self.gradient.eps = eps;
        self
    }

    /// Replaces the finite-difference estimator with an analytic gradient.
    pub fn with_gradient<H>(self, gradient: H) -> MinimizeOptions<Analytic<H>>
    where
        H: Fn(&Array1<f64>) -> Array1<f64>,
    {
        MinimizeOptions {
            tol: self.tol,
            gtol: self.gtol,
            gradient: Analytic(gradient),
            max_iterations: self.max_iterations,
            line_search: self.line_search,
            curvature_policy: self.curvature_policy,
        }
    }
}

impl<G: Gradient> MinimizeOptions<G> {
    fn validate(&self) -> Result<(), BfgsError> {
        if !(self.gtol >= 0.0) {
            return Err(BfgsError::InvalidParameter {
                name: "gtol",
                value: self.gtol,
            });
        }
        if let Some(tol) = self.tol {
            if !(tol >= 0.0) {
                return Err(BfgsError::InvalidParameter {
                    name: "tol",
                    value: tol,
                });
            }
        }
        self.line_search.validate()?;
        self.gradient.validate()
    }
}

/// Minimizes `objective` from `x0`.
///
/// Equivalent to `Bfgs::with_options(x0, objective, options).run()`.
pub fn minimize<F, G>(
    objective: F,
    x0: Array1<f64>,
    options: MinimizeOptions<G>,
) -> Result<BfgsSolution, BfgsError>
where
    F: Fn(&Array1<f64>) -> f64,
    G: Gradient,
{
    Bfgs::with_options(x0, objective, options).run()
}

/// A BFGS solver with a builder-style configuration.
pub struct Bfgs<'a, F, G = CentralDifference> {
    x0: Array1<f64>,
    objective: F,
    options: MinimizeOptions<G>,
    observer: Option<Observer<'a>>,
}

impl<'a, F> Bfgs<'a, F, CentralDifference>
where
    F: Fn(&Array1<f64>) -> f64,
{
    /// Creates a new BFGS solver using central-difference gradients.
    ///
    /// # Arguments
    /// * `x0` - The initial guess for the minimum.
    /// * `objective` - The scalar objective function.
    pub fn new(x0: Array1<f64>, objective: F) -> Self {
        Self::with_options(x0, objective, MinimizeOptions::default())
    }

    /// Sets the finite-difference step (default: 1e-6).
    pub fn with_eps(mut self, eps: f64) -> Self {
        self.options.gradient.eps = eps;
        self
    }

    /// Uses a caller-supplied gradient instead of central differences.
    pub fn with_gradient<H>(self, gradient: H) -> Bfgs<'a, F, Analytic<H>>
    where
        H: Fn(&Array1<f64>) -> Array1<f64>,
    {
        Bfgs {
            x0: self.x0,
            objective: self.objective,
            options: self.options.with_gradient(gradient),
            observer: self.observer,
        }
    }
}

impl<'a, F, G> Bfgs<'a, F, G>
where
    F: Fn(&Array1<f64>) -> f64,
    G: Gradient,
{
    /// Creates a solver from a complete options record.
    pub fn with_options(x0: Array1<f64>, objective: F, options: MinimizeOptions<G>) -> Self {
        Self {
            x0,
            objective,
            options,
            observer: None,
        }
    }

    /// Stops once a step moves the iterate by less than `tol`.
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.options.tol = Some(tol);
        self
    }

    /// Sets the gradient-norm tolerance (default: 1e-9).
    pub fn with_gtol(mut self, gtol: f64) -> Self {
        self.options.gtol = gtol;
        self
    }

    /// Caps the number of iterations (default: unbounded).
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.options.max_iterations = Some(max_iterations);
        self
    }

    /// Caps every trial step of the line search.
    pub fn with_alpha_max(mut self, alpha_max: f64) -> Self {
        self.options.line_search.alpha_max = Some(alpha_max);
        self
    }

    /// Sets the number of bracketing trials per line search (default: 10).
    pub fn with_line_search_iterations(mut self, iterations: usize) -> Self {
        self.options.line_search.max_iterations = iterations;
        self
    }

    /// Sets the cap on zoom refinements per line search (default: 100).
    pub fn with_zoom_iterations(mut self, iterations: usize) -> Self {
        self.options.line_search.zoom_max_iterations = iterations;
        self
    }

    /// Replaces the strong Wolfe constants (default: `c1 = 1e-4`, `c2 = 0.9`).
    pub fn with_wolfe(mut self, wolfe: WolfeParams) -> Self {
        self.options.line_search.wolfe = wolfe;
        self
    }

    /// Chooses how a failed curvature condition is handled (default: skip the update).
    pub fn with_curvature_policy(mut self, policy: CurvaturePolicy) -> Self {
        self.options.curvature_policy = policy;
        self
    }

    /// Installs a callback run after every completed iteration. Returning
    /// `ControlFlow::Break(())` ends the run with [`Termination::Cancelled`].
    pub fn with_observer<O>(mut self, observer: O) -> Self
    where
        O: FnMut(&IterationReport<'_>) -> ControlFlow<()> + 'a,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Executes the BFGS iteration.
    pub fn run(&mut self) -> Result<BfgsSolution, BfgsError> {
        let Self {
            x0,
            objective,
            options,
            observer,
        } = self;
        let (x0, objective, options) = (&*x0, &*objective, &*options);
        options.validate()?;
        let n = x0.len();
        if n == 0 {
            return Err(BfgsError::EmptyInitialPoint);
        }
        if let Some((index, &value)) = x0.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(BfgsError::NonFiniteInitialPoint { index, value });
        }

        let counters = Counters::default();
        let f = |x: &Array1<f64>| {
            counters.func_evals.set(counters.func_evals.get() + 1);
            objective(x)
        };

        let mut x_k = x0.clone();
        let mut f_k = f(&x_k);
        if !f_k.is_finite() {
            return Err(BfgsError::NonFiniteObjective { iteration: 0 });
        }
        let mut g_k = counters.gradient(&options.gradient, &f, &x_k)?;
        let mut h_k = Array2::<f64>::eye(n);
        let mut skipped_updates = 0;
        let mut k = 0;

        let finish = |point: Array1<f64>,
                      value: f64,
                      gradient_norm: f64,
                      inverse_hessian: Array2<f64>,
                      iterations: usize,
                      skipped_updates: usize,
                      termination: Termination| {
            let sol = BfgsSolution {
                final_point: point,
                final_value: value,
                final_gradient_norm: gradient_norm,
                inverse_hessian,
                iterations,
                func_evals: counters.func_evals.get(),
                grad_evals: counters.grad_evals.get(),
                skipped_updates,
                termination,
            };
            log::info!(
                "[BFGS] Finished ({:?}): iters={}, f={:.6e}, ||g||={:.3e}, fe={}, ge={}, skipped={}",
                sol.termination,
                sol.iterations,
                sol.final_value,
                sol.final_gradient_norm,
                sol.func_evals,
                sol.grad_evals,
                sol.skipped_updates
            );
            sol
        };

        loop {
            let g_norm = norm(&g_k);
            if !g_norm.is_finite() {
                log::warn!(
                    "[BFGS] Non-finite gradient norm at iter {}: g_norm={:?}",
                    k,
                    g_norm
                );
                return Err(BfgsError::NonFiniteGradient { iteration: k });
            }
            if g_norm <= options.gtol {
                let termination = Termination::GradientTolerance;
                return Ok(finish(x_k, f_k, g_norm, h_k, k, skipped_updates, termination));
            }
            if options.max_iterations.is_some_and(|cap| k >= cap) {
                let termination = Termination::MaxIterations;
                return Ok(finish(x_k, f_k, g_norm, h_k, k, skipped_updates, termination));
            }

            let mut p = -h_k.dot(&g_k);
            let mut slope = g_k.dot(&p);
            if !(slope < 0.0) {
                log::warn!("[BFGS] Non-descent direction at iter {k}; resetting to -g and H=I.");
                h_k = Array2::eye(n);
                p = -&g_k;
                slope = g_k.dot(&p);
            }

            let phi = |alpha: f64| f(&(&x_k + &(&p * alpha)));
            let dphi = |alpha: f64| options.gradient.directional(&f, &x_k, &p, alpha);
            let outcome = line_search_with(
                phi,
                dphi,
                f_k,
                slope,
                &options.line_search,
                |_: &Bracket| (),
            );
            let x_next = &x_k + &(&p * outcome.alpha);
            let s = &x_next - &x_k;
            let step_norm = norm(&s);

            if options.tol.is_some_and(|tol| step_norm < tol) {
                let f_next = outcome.value;
                let g_next = counters.gradient(&options.gradient, &f, &x_next)?;
                let termination = Termination::StepTolerance;
                return Ok(finish(
                    x_next,
                    f_next,
                    norm(&g_next),
                    h_k,
                    k,
                    skipped_updates,
                    termination,
                ));
            }
            if step_norm == 0.0 {
                log::warn!(
                    "[BFGS] Line search returned a zero step at iter {} ({:?}).",
                    k,
                    outcome.exit
                );
                let termination = Termination::Stalled;
                return Ok(finish(x_k, f_k, g_norm, h_k, k, skipped_updates, termination));
            }

            let f_next = outcome.value;
            if !f_next.is_finite() {
                return Err(BfgsError::NonFiniteObjective { iteration: k + 1 });
            }
            let g_next = counters.gradient(&options.gradient, &f, &x_next)?;
            let y = &g_next - &g_k;
            let sy = y.dot(&s);

            let update = if sy.is_finite() && sy > CURVATURE_EPS * step_norm * norm(&y) {
                h_k = inverse_hessian_update(&h_k, &s, &y, 1.0 / sy);
                UpdateStatus::Applied
            } else {
                match options.curvature_policy {
                    CurvaturePolicy::Skip => {
                        log::warn!(
                            "[BFGS] Non-positive curvature (yᵀs = {:.3e}) at iter {}; inverse Hessian update skipped.",
                            sy,
                            k
                        );
                        skipped_updates += 1;
                        UpdateStatus::Skipped
                    }
                    CurvaturePolicy::Fail => {
                        log::warn!(
                            "[BFGS] Non-positive curvature (yᵀs = {:.3e}) at iter {}; aborting.",
                            sy,
                            k
                        );
                        let g_next_norm = norm(&g_next);
                        let last_solution = Box::new(BfgsSolution {
                            final_point: x_next,
                            final_value: f_next,
                            final_gradient_norm: g_next_norm,
                            inverse_hessian: h_k,
                            iterations: k + 1,
                            func_evals: counters.func_evals.get(),
                            grad_evals: counters.grad_evals.get(),
                            skipped_updates,
                            termination: Termination::CurvatureFailure,
                        });
                        return Err(BfgsError::NonPositiveCurvature {
                            iteration: k,
                            curvature: sy,
                            last_solution,
                        });
                    }
                }
            };

            x_k = x_next;
            f_k = f_next;
            g_k = g_next;
            k += 1;

            let g_next_norm = norm(&g_k);
            log::debug!(
                "[BFGS] iter {}: f={:.6e}, ||g||={:.3e}, α={:.3e} via {:?}, update {:?}",
                k,
                f_k,
                g_next_norm,
                outcome.alpha,
                outcome.exit,
                update
            );

            if let Some(observe) = observer.as_mut() {
                let report = IterationReport {
                    iteration: k,
                    point: &x_k,
                    value: f_k,
                    gradient_norm: g_next_norm,
                    step_length: outcome.alpha,
                    line_search_exit: outcome.exit,
                    update,
                    inverse_hessian: &h_k,
                };
                if observe(&report).is_break() {
                    let termination = Termination::Cancelled;
                    return Ok(finish(x_k, f_k, g_next_norm, h_k, k, skipped_updates, termination));
                }
            }
        }
    }
}

#[derive(Default)]
struct Counters {
    func_evals: Cell<usize>,
    grad_evals: Cell<usize>,
}

impl Counters {
    fn gradient<G, F>(&self, source: &G, f: &F, x: &Array1<f64>) -> Result<Array1<f64>, BfgsError>
    where
        G: Gradient,
        F: Fn(&Array1<f64>) -> f64,
    {
        self.grad_evals.set(self.grad_evals.get() + 1);
        let g = source.gradient(f, x);
        if g.len() != x.len() {
            return Err(BfgsError::GradientDimensionMismatch {
                expected: x.len(),
                found: g.len(),
            });
        }
        Ok(g)
    }
}

#[inline]
fn norm(v: &Array1<f64>) -> f64 {
    v.dot(v).sqrt()
}

/// Rank-two BFGS update of the inverse Hessian approximation.
///
/// The result is symmetrised explicitly so rounding in the two matrix
/// products cannot leave `H⁺ ≠ H⁺ᵀ`.
fn inverse_hessian_update(
    h: &Array2<f64>,
    s: &Array1<f64>,
    y: &Array1<f64>,
    rho: f64,
) -> Array2<f64> {
    let n = s.len();
    // left = I - rho s y^T, right = I - rho y s^T
    let mut left = Array2::<f64>::eye(n);
    let mut right = Array2::<f64>::eye(n);
    for i in 0..n {
        let si = s[i];
        let yi = y[i];
        for j in 0..n {
            left[[i, j]] -= rho * si * y[j];
            right[[i, j]] -= rho * yi * s[j];
        }
    }
    let mut updated = left.dot(h).dot(&right);
    for i in 0..n {
        for j in 0..n {
            updated[[i, j]] += rho * s[i] * s[j];
        }
    }
    for i in 0..n {
        for j in (i + 1)..n {
            let v = 0.5 * (updated[[i, j]] + updated[[j, i]]);
            updated[[i, j]] = v;
            updated[[j, i]] = v;
        }
    }
    updated
}
