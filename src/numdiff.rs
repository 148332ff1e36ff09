//! Central-difference derivatives and the gradient capability used by the driver.
//!
//! When the caller does not supply an analytic gradient, every component is
//! estimated as
//!
//! ```text
//! g[i] = (f(x + ε·eᵢ) − f(x − ε·eᵢ)) / (2ε)
//! ```
//!
//! which costs `2n` objective evaluations and has truncation error `O(ε²)`.
//! The same formula specialised to one scalar argument differentiates the
//! line restriction `φ(α) = f(x + α·p)`.

use ndarray::Array1;

use crate::BfgsError;

/// Default finite-difference step.
pub const DEFAULT_EPS: f64 = 1e-6;

/// Estimates the gradient of `f` at `x` by central differences.
///
/// The probe vector is perturbed in place and restored after each coordinate,
/// so `f` only ever sees `x ± ε·eᵢ`.
pub fn central_difference<F>(f: &F, x: &Array1<f64>, eps: f64) -> Array1<f64>
where
    F: Fn(&Array1<f64>) -> f64 + ?Sized,
{
    let mut probe = x.clone();
    let mut g = Array1::<f64>::zeros(x.len());
    for i in 0..x.len() {
        let xi = probe[i];
        probe[i] = xi + eps;
        let f_plus = f(&probe);
        probe[i] = xi - eps;
        let f_minus = f(&probe);
        probe[i] = xi;
        g[i] = (f_plus - f_minus) / (2.0 * eps);
    }
    g
}

/// Central-difference derivative of a univariate function at `alpha`.
#[inline]
pub fn central_difference_1d<P>(phi: &P, alpha: f64, eps: f64) -> f64
where
    P: Fn(f64) -> f64 + ?Sized,
{
    (phi(alpha + eps) - phi(alpha - eps)) / (2.0 * eps)
}

/// Source of first-order information for the BFGS driver.
///
/// The driver is generic over this trait instead of branching on whether a
/// gradient closure was supplied. [`CentralDifference`] is the default;
/// [`Analytic`] wraps a caller gradient.
pub trait Gradient {
    /// Gradient of `f` at `x`.
    fn gradient<F>(&self, f: &F, x: &Array1<f64>) -> Array1<f64>
    where
        F: Fn(&Array1<f64>) -> f64;

    /// Derivative of `φ(α) = f(x + α·p)` at `alpha`.
    fn directional<F>(&self, f: &F, x: &Array1<f64>, p: &Array1<f64>, alpha: f64) -> f64
    where
        F: Fn(&Array1<f64>) -> f64;

    /// Checks the configuration before a run starts.
    fn validate(&self) -> Result<(), BfgsError> {
        Ok(())
    }
}

/// Finite-difference gradient estimator with step `eps`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CentralDifference {
    pub eps: f64,
}

impl CentralDifference {
    pub fn new(eps: f64) -> Self {
        Self { eps }
    }
}

impl Default for CentralDifference {
    fn default() -> Self {
        Self::new(DEFAULT_EPS)
    }
}

impl Gradient for CentralDifference {
    fn gradient<F>(&self, f: &F, x: &Array1<f64>) -> Array1<f64>
    where
        F: Fn(&Array1<f64>) -> f64,
    {
        central_difference(f, x, self.eps)
    }

    fn directional<F>(&self, f: &F, x: &Array1<f64>, p: &Array1<f64>, alpha: f64) -> f64
    where
        F: Fn(&Array1<f64>) -> f64,
    {
        let phi = |a: f64| f(&(x + &(p * a)));
        central_difference_1d(&phi, alpha, self.eps)
    }

    fn validate(&self) -> Result<(), BfgsError> {
        if self.eps.is_finite() && self.eps > 0.0 {
            Ok(())
        } else {
            Err(BfgsError::InvalidParameter {
                name: "eps",
                value: self.eps,
            })
        }
    }
}

/// Caller-supplied analytic gradient.
#[derive(Debug, Clone, Copy)]
pub struct Analytic<G>(pub G);

impl<G> Gradient for Analytic<G>
where
    G: Fn(&Array1<f64>) -> Array1<f64>,
{
    fn gradient<F>(&self, _: &F, x: &Array1<f64>) -> Array1<f64>
    where
        F: Fn(&Array1<f64>) -> f64,
    {
        (self.0)(x)
    }

    fn directional<F>(&self, _: &F, x: &Array1<f64>, p: &Array1<f64>, alpha: f64) -> f64
    where
        F: Fn(&Array1<f64>) -> f64,
    {
        let probe = x + &(p * alpha);
        (self.0)(&probe).dot(p)
    }
}
