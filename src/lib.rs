//! Unconstrained minimization with the BFGS quasi-Newton method.
//!
//! This crate finds a local minimizer of a smooth function `f: ℝⁿ → ℝ`,
//! following the line-search framework of "Numerical Optimization" by
//! Nocedal & Wright.
//!
//! # Features
//! - Inverse-Hessian BFGS update `H⁺ = (I − ρ·s·yᵀ)·H·(I − ρ·y·sᵀ) + ρ·s·sᵀ`, starting from
//!   the identity, with an explicit policy for steps that violate `yᵀs > 0`.
//! - Strong Wolfe line search: doubling bracketing phase followed by a zoom phase using
//!   quadratic interpolation with a fallback step.
//! - Central-difference gradients when no analytic gradient is supplied; the same estimator
//!   differentiates the line restriction `φ(α) = f(x + α·p)`.
//! - Gradient-norm, step-size and iteration-budget termination; an observer callback that
//!   sees every iteration and can cancel the run.
//!
//! ## Defaults
//! - Wolfe constants: `c1 = 1e-4`, `c2 = 0.9`.
//! - Line search: first trial `α = min(1, alpha_max)`, 10 bracketing trials, at most 100
//!   zoom refinements.
//! - Tolerances: `gtol = 1e-9`, no step tolerance, no iteration cap.
//! - Finite-difference step: `eps = 1e-6`.
//! - Curvature failures skip the update and keep the current inverse Hessian.
//!
//! # Example
//!
//! Minimize the Rosenbrock function, a classic test case for optimization algorithms.
//!
//! ```
//! use bfgs_minimize::{Bfgs, BfgsSolution, Termination};
//! use ndarray::{array, Array1};
//!
//! let rosenbrock = |x: &Array1<f64>| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0].powi(2)).powi(2);
//! let gradient = |x: &Array1<f64>| {
//!     array![
//!         -2.0 * (1.0 - x[0]) - 400.0 * (x[1] - x[0].powi(2)) * x[0],
//!         200.0 * (x[1] - x[0].powi(2)),
//!     ]
//! };
//!
//! let BfgsSolution {
//!     final_point: x_min,
//!     final_value,
//!     iterations,
//!     termination,
//!     ..
//! } = Bfgs::new(array![4.0, 2.0], rosenbrock)
//!     .with_gradient(gradient)
//!     .with_gtol(1e-6)
//!     .with_max_iterations(200)
//!     .run()
//!     .expect("BFGS failed to solve");
//!
//! println!(
//!     "Found minimum f({}) = {:.4} in {} iterations.",
//!     x_min, final_value, iterations
//! );
//!
//! // The known minimum is at [1.0, 1.0].
//! assert_eq!(termination, Termination::GradientTolerance);
//! assert!((x_min[0] - 1.0).abs() < 1e-5);
//! assert!((x_min[1] - 1.0).abs() < 1e-5);
//! ```
//!
//! Without `with_gradient`, gradients are estimated by central differences:
//!
//! ```
//! use bfgs_minimize::{minimize, MinimizeOptions};
//! use ndarray::{array, Array1};
//!
//! let bowl = |x: &Array1<f64>| (x[0] - 3.0).powi(2) + 2.0 * (x[1] + 1.0).powi(2);
//! let options = MinimizeOptions {
//!     gtol: 1e-6,
//!     max_iterations: Some(100),
//!     ..MinimizeOptions::default()
//! };
//! let sol = minimize(bowl, array![0.0, 0.0], options).unwrap();
//! assert!(sol.converged());
//! assert!((sol.final_point[0] - 3.0).abs() < 1e-5);
//! assert!((sol.final_point[1] + 1.0).abs() < 1e-5);
//! ```

pub mod bfgs;
pub mod line_search;
pub mod numdiff;

pub use bfgs::{
    Bfgs, BfgsSolution, CurvaturePolicy, DEFAULT_GTOL, IterationReport, MinimizeOptions,
    Termination, UpdateStatus, minimize,
};
pub use line_search::{
    Bracket, LineSearchExit, LineSearchOptions, LineSearchOutcome, WolfeParams, line_search,
    line_search_numeric, line_search_with,
};
pub use numdiff::{
    Analytic, CentralDifference, DEFAULT_EPS, Gradient, central_difference, central_difference_1d,
};

/// An error type for clear diagnostics.
#[derive(Debug, thiserror::Error)]
pub enum BfgsError {
    #[error("The initial point is empty; at least one coordinate is required.")]
    EmptyInitialPoint,
    #[error("The initial point has a non-finite entry {value} at index {index}.")]
    NonFiniteInitialPoint {
        /// Position of the first non-finite coordinate.
        index: usize,
        /// The offending coordinate.
        value: f64,
    },
    #[error("The objective returned a non-finite value at iteration {iteration}.")]
    NonFiniteObjective {
        /// Iteration whose iterate produced the value; 0 is the initial point.
        iteration: usize,
    },
    #[error("The gradient norm was NaN or infinity at iteration {iteration}, indicating numerical instability.")]
    NonFiniteGradient {
        /// Iteration at which the gradient norm was checked.
        iteration: usize,
    },
    #[error("The gradient has {found} components but the point has {expected}.")]
    GradientDimensionMismatch {
        /// Dimension of the initial point.
        expected: usize,
        /// Length of the vector returned by the gradient.
        found: usize,
    },
    #[error("Wolfe constants must satisfy 0 < c1 < c2 < 1 (got c1 = {c1}, c2 = {c2}).")]
    InvalidWolfeParameters { c1: f64, c2: f64 },
    #[error("Invalid value {value} for parameter `{name}`.")]
    InvalidParameter {
        /// Name of the rejected option.
        name: &'static str,
        value: f64,
    },
    #[error(
        "Non-positive curvature (yᵀs = {curvature:.3e}) at iteration {iteration}; the inverse Hessian cannot be updated."
    )]
    NonPositiveCurvature {
        /// Iteration whose step failed the test.
        iteration: usize,
        /// The value of `yᵀs` that was rejected.
        curvature: f64,
        /// The state reached by the step that failed the curvature test, tagged
        /// [`Termination::CurvatureFailure`].
        last_solution: Box<BfgsSolution>,
    },
}
