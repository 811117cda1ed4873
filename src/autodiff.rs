//! Forward-mode automatic differentiation via a `Scalar` abstraction.
//!
//! Generates the plain and autodiff projection variants from one source of
//! truth rather than maintaining two hand-synced copies. We do that with a
//! `Scalar` trait implemented both by `f64` (the plain variant) and by
//! [`Dual`] (the autodiff variant, carrying a dense gradient against
//! whichever columns the calling provider cares about). Every function in
//! [`crate::projection`] is written once, generic over `S: Scalar`.

use std::ops::{Add, Div, Mul, Neg, Sub};

/// Minimal numeric interface shared by `f64` and [`Dual`]. Only the
/// operations the projection/residual code actually needs are exposed.
pub trait Scalar:
    Copy
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
{
    fn constant(v: f64) -> Self;
    fn value(self) -> f64;
    fn sqrt(self) -> Self;
    fn powi(self, n: i32) -> Self;
    fn recip(self) -> Self;
    /// Clamp to `[-1, 1]` before feeding an `acos` -- a numerical safety net
    /// for values that drift a hair outside the domain, not an active
    /// constraint region, so the gradient passes through unclamped (a
    /// straight-through estimator) rather than going to zero at the clamp
    /// boundary.
    fn clamp_unit(self) -> Self;
    fn acos(self) -> Self;
}

impl Scalar for f64 {
    #[inline]
    fn constant(v: f64) -> Self {
        v
    }
    #[inline]
    fn value(self) -> f64 {
        self
    }
    #[inline]
    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }
    #[inline]
    fn powi(self, n: i32) -> Self {
        f64::powi(self, n)
    }
    #[inline]
    fn recip(self) -> Self {
        1.0 / self
    }
    #[inline]
    fn clamp_unit(self) -> Self {
        self.clamp(-1.0, 1.0)
    }
    #[inline]
    fn acos(self) -> Self {
        f64::acos(self)
    }
}

/// A forward-mode dual number: a value plus its gradient against a fixed,
/// caller-chosen set of active variables (one slot per column the provider
/// that built it cares about).
#[derive(Debug, Clone)]
pub struct Dual {
    pub value: f64,
    pub grad: Vec<f64>,
}

impl Dual {
    /// A constant (zero gradient against `n` active variables).
    pub fn constant(value: f64, n: usize) -> Self {
        Self { value, grad: vec![0.0; n] }
    }

    /// The `i`-th active variable: value `x`, unit gradient in slot `i`.
    pub fn variable(value: f64, i: usize, n: usize) -> Self {
        let mut grad = vec![0.0; n];
        grad[i] = 1.0;
        Self { value, grad }
    }

    /// Active-variable count this dual's gradient is carried against. A
    /// dual produced by [`Scalar::constant`] (length unknown at the call
    /// site) reports 0 and is broadcast against whichever operand in a
    /// binary op actually knows the count.
    fn len(&self) -> usize {
        self.grad.len()
    }

    fn binary(&self, other: &Dual, value: f64, da: f64, db: f64) -> Dual {
        let n = if self.len() != 0 { self.len() } else { other.len() };
        assert!(
            self.len() == 0 || other.len() == 0 || self.len() == other.len(),
            "dual numbers from different active-variable contexts combined"
        );
        let grad = (0..n)
            .map(|i| {
                let ga = if self.len() == 0 { 0.0 } else { self.grad[i] };
                let gb = if other.len() == 0 { 0.0 } else { other.grad[i] };
                da * ga + db * gb
            })
            .collect();
        Dual { value, grad }
    }
}

impl Add for Dual {
    type Output = Dual;
    fn add(self, rhs: Dual) -> Dual {
        self.binary(&rhs, self.value + rhs.value, 1.0, 1.0)
    }
}
impl Sub for Dual {
    type Output = Dual;
    fn sub(self, rhs: Dual) -> Dual {
        self.binary(&rhs, self.value - rhs.value, 1.0, -1.0)
    }
}
impl Mul for Dual {
    type Output = Dual;
    fn mul(self, rhs: Dual) -> Dual {
        self.binary(&rhs, self.value * rhs.value, rhs.value, self.value)
    }
}
impl Div for Dual {
    type Output = Dual;
    fn div(self, rhs: Dual) -> Dual {
        let value = self.value / rhs.value;
        // d(a/b) = da/b - a*db/b^2
        self.binary(&rhs, value, 1.0 / rhs.value, -self.value / (rhs.value * rhs.value))
    }
}
impl Neg for Dual {
    type Output = Dual;
    fn neg(self) -> Dual {
        Dual { value: -self.value, grad: self.grad.iter().map(|g| -g).collect() }
    }
}
impl Scalar for Dual {
    fn constant(v: f64) -> Self {
        // Gradient length is determined by context; a bare `constant` call
        // without an active-variable count can't size it, so `Dual` only
        // implements `Scalar` for generic code paths that always combine
        // with at least one variable-carrying `Dual` first. `Dual::constant`
        // (the inherent method) is what call sites use directly instead.
        Dual { value: v, grad: Vec::new() }
    }
    fn value(self) -> f64 {
        self.value
    }
    fn sqrt(self) -> Self {
        let s = self.value.sqrt();
        let d = 0.5 / s;
        Dual { value: s, grad: self.grad.iter().map(|g| g * d).collect() }
    }
    fn powi(self, n: i32) -> Self {
        let value = self.value.powi(n);
        let d = (n as f64) * self.value.powi(n - 1);
        Dual { value, grad: self.grad.iter().map(|g| g * d).collect() }
    }
    fn recip(self) -> Self {
        let value = 1.0 / self.value;
        let d = -value * value;
        Dual { value, grad: self.grad.iter().map(|g| g * d).collect() }
    }
    fn clamp_unit(self) -> Self {
        // Straight-through: the clamped *value* feeds acos, but the
        // gradient keeps flowing as if no clamp happened, since the clamp
        // only ever fires from floating-point overshoot at |cos| ~ 1, not
        // from a real constraint boundary.
        Dual { value: self.value.clamp(-1.0, 1.0), grad: self.grad }
    }
    fn acos(self) -> Self {
        let value = self.value.clamp(-1.0, 1.0).acos();
        let d = -1.0 / (1.0 - self.value * self.value).max(1e-12).sqrt();
        Dual { value, grad: self.grad.iter().map(|g| g * d).collect() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dual_product_rule() {
        let n = 2;
        let x = Dual::variable(3.0, 0, n);
        let y = Dual::variable(4.0, 1, n);
        let z = x * y;
        assert_eq!(z.value, 12.0);
        assert_eq!(z.grad, vec![4.0, 3.0]); // d(xy)/dx = y, d(xy)/dy = x
    }

    #[test]
    fn dual_acos_matches_finite_difference() {
        let n = 1;
        let x = Dual::variable(0.5, 0, n);
        let z = Scalar::acos(x);
        assert!((z.value - (0.5f64).acos()).abs() < 1e-12);
        let eps = 1e-6;
        let fd = (0.5 + eps).acos() - (0.5f64).acos();
        assert!((z.grad[0] - fd / eps).abs() < 1e-3);
    }

    #[test]
    fn dual_sqrt_matches_finite_difference() {
        let n = 1;
        let x = Dual::variable(9.0, 0, n);
        let z = Scalar::sqrt(x);
        assert!((z.value - 3.0).abs() < 1e-12);
        let eps = 1e-6;
        let fd = ((9.0 + eps) as f64).sqrt() - (9.0f64).sqrt();
        assert!((z.grad[0] - fd / eps).abs() < 1e-4);
    }
}
