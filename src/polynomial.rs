//! Component C: closed-form real-root extraction for quadratics, cubics
//! (Cardano), and quartics (Ferrari via the resolvent cubic). Complex roots
//! are discarded; degenerate leading coefficients fall back to the
//! next-lower-degree solver. Consumed by P3P ([`crate::init::p3p`]) and the
//! angular constraint providers.

use num_complex::Complex64;

use crate::constants::EPS_ZERO;

/// Real roots of `a*x^2 + b*x + c = 0`, sorted ascending. Falls back to the
/// linear case when `a` is (numerically) zero.
pub fn solve_quadratic(a: f64, b: f64, c: f64) -> Vec<f64> {
    if a.abs() < EPS_ZERO {
        if b.abs() < EPS_ZERO {
            return Vec::new();
        }
        return vec![-c / b];
    }
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return Vec::new();
    }
    if disc.abs() < EPS_ZERO {
        return vec![-b / (2.0 * a)];
    }
    let sqrt_disc = disc.sqrt();
    let mut roots = vec![(-b - sqrt_disc) / (2.0 * a), (-b + sqrt_disc) / (2.0 * a)];
    roots.sort_by(|x, y| x.partial_cmp(y).unwrap());
    roots
}

/// Real roots of `a*x^3 + b*x^2 + c*x + d = 0` via Cardano's formula,
/// sorted ascending. Falls back to [`solve_quadratic`] when `a` is zero.
pub fn solve_cubic(a: f64, b: f64, c: f64, d: f64) -> Vec<f64> {
    if a.abs() < EPS_ZERO {
        return solve_quadratic(b, c, d);
    }

    // Normalise to monic x^3 + px + q via the depressed-cubic substitution
    // x = t - b/(3a).
    let b = b / a;
    let c = c / a;
    let d = d / a;

    let shift = b / 3.0;
    let p = c - b * b / 3.0;
    let q = 2.0 * b * b * b / 27.0 - b * c / 3.0 + d;

    let discriminant = (q * q) / 4.0 + (p * p * p) / 27.0;

    let mut roots = if discriminant > EPS_ZERO {
        // One real root.
        let sqrt_disc = discriminant.sqrt();
        let u = cbrt(-q / 2.0 + sqrt_disc);
        let v = cbrt(-q / 2.0 - sqrt_disc);
        vec![u + v]
    } else if discriminant.abs() <= EPS_ZERO {
        // Triple or double root, all real.
        if p.abs() < EPS_ZERO {
            vec![0.0]
        } else {
            let u = cbrt(-q / 2.0);
            vec![2.0 * u, -u]
        }
    } else {
        // Three distinct real roots via the trigonometric method.
        let r = (-(p * p * p) / 27.0).sqrt();
        let phi = (-q / (2.0 * r)).clamp(-1.0, 1.0).acos();
        let m = 2.0 * r.cbrt();
        (0..3)
            .map(|k| m * ((phi + 2.0 * std::f64::consts::PI * k as f64) / 3.0).cos())
            .collect()
    };

    for r in roots.iter_mut() {
        *r -= shift;
    }
    roots.sort_by(|x, y| x.partial_cmp(y).unwrap());
    roots
}

fn cbrt(x: f64) -> f64 {
    x.signum() * x.abs().cbrt()
}

/// Real roots of `a*x^4 + b*x^3 + c*x^2 + d*x + e = 0` via Ferrari's method
/// through the resolvent cubic, sorted ascending. Falls back to
/// [`solve_cubic`] when `a` is zero.
pub fn solve_quartic(a: f64, b: f64, c: f64, d: f64, e: f64) -> Vec<f64> {
    if a.abs() < EPS_ZERO {
        return solve_cubic(b, c, d, e);
    }

    let b = b / a;
    let c = c / a;
    let d = d / a;
    let e = e / a;

    // Depress: x = y - b/4.
    let shift = b / 4.0;
    let p = c - 3.0 * b * b / 8.0;
    let q = d - b * c / 2.0 + b * b * b / 8.0;
    let r = e - b * d / 4.0 + b * b * c / 16.0 - 3.0 * b * b * b * b / 256.0;

    if q.abs() < 1e-9 {
        // Biquadratic: y^4 + p y^2 + r = 0.
        let z_roots = solve_quadratic(1.0, p, r);
        let mut roots = Vec::new();
        for z in z_roots {
            if z >= -EPS_ZERO {
                let z = z.max(0.0);
                let y = z.sqrt();
                roots.push(y - shift);
                if y > EPS_ZERO {
                    roots.push(-y - shift);
                }
            }
        }
        roots.sort_by(|x, y| x.partial_cmp(y).unwrap());
        roots.dedup_by(|x, y| (*x - *y).abs() < 1e-9);
        return roots;
    }

    // Resolvent cubic: m^3 + p m^2 + (p^2/4 - r) m - q^2/8 = 0 (Wikipedia's
    // Ferrari derivation, `8m^3 + 8p m^2 + (2p^2 - 8r) m - q^2 = 0` divided
    // by 8). Any nonzero real root works; `q != 0` here guarantees one
    // exists.
    let resolvent_roots = solve_cubic(1.0, p, p * p / 4.0 - r, -q * q / 8.0);
    let m = match resolvent_roots.into_iter().find(|m| m.abs() > 1e-9) {
        Some(m) => m,
        None => return Vec::new(),
    };

    let sqrt_2m = (2.0 * m).max(0.0).sqrt();
    let mut roots: Vec<f64> = Vec::new();

    if sqrt_2m.abs() < EPS_ZERO {
        let inner = solve_quadratic(1.0, 0.0, p + m);
        for y in inner {
            roots.push(y - shift);
        }
    } else {
        for sign in [1.0, -1.0] {
            let inner_disc = -(2.0 * p + 2.0 * m) + sign * 2.0 * q / sqrt_2m;
            if inner_disc >= -1e-9 {
                let half = sign * sqrt_2m / 2.0;
                let rad = (inner_disc.max(0.0)).sqrt() / 2.0;
                roots.push(-half + rad - shift);
                roots.push(-half - rad - shift);
            }
        }
    }

    roots.retain(|r| r.is_finite());
    roots.sort_by(|x, y| x.partial_cmp(y).unwrap());
    roots.dedup_by(|x, y| (*x - *y).abs() < 1e-7);
    roots
}

/// Discard the imaginary part of a complex root list, keeping only those
/// within `eps` of purely real.
pub fn real_parts(roots: &[Complex64], eps: f64) -> Vec<f64> {
    roots.iter().filter(|z| z.im.abs() < eps).map(|z| z.re).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quadratic_two_roots() {
        let roots = solve_quadratic(1.0, -3.0, 2.0); // (x-1)(x-2)
        assert_eq!(roots.len(), 2);
        assert!((roots[0] - 1.0).abs() < 1e-9);
        assert!((roots[1] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn quadratic_no_real_roots() {
        assert!(solve_quadratic(1.0, 0.0, 1.0).is_empty());
    }

    #[test]
    fn cubic_one_real_root() {
        // x^3 - 1 = 0 has one real root at x=1 (plus two complex).
        let roots = solve_cubic(1.0, 0.0, 0.0, -1.0);
        assert_eq!(roots.len(), 1);
        assert!((roots[0] - 1.0).abs() < 1e-7);
    }

    #[test]
    fn cubic_three_real_roots() {
        // (x-1)(x-2)(x-3) = x^3 - 6x^2 + 11x - 6
        let roots = solve_cubic(1.0, -6.0, 11.0, -6.0);
        assert_eq!(roots.len(), 3);
        assert!((roots[0] - 1.0).abs() < 1e-6);
        assert!((roots[1] - 2.0).abs() < 1e-6);
        assert!((roots[2] - 3.0).abs() < 1e-6);
    }

    #[test]
    fn quartic_biquadratic_case() {
        // (x^2-1)(x^2-4) = x^4 - 5x^2 + 4, roots +/-1, +/-2.
        let mut roots = solve_quartic(1.0, 0.0, -5.0, 0.0, 4.0);
        roots.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(roots.len(), 4);
        assert!((roots[0] - (-2.0)).abs() < 1e-6);
        assert!((roots[1] - (-1.0)).abs() < 1e-6);
        assert!((roots[2] - 1.0).abs() < 1e-6);
        assert!((roots[3] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn quartic_four_real_roots_general() {
        // (x-1)(x-2)(x-3)(x-4) = x^4 -10x^3+35x^2-50x+24
        let mut roots = solve_quartic(1.0, -10.0, 35.0, -50.0, 24.0);
        roots.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(roots.len(), 4);
        for (got, expect) in roots.iter().zip([1.0, 2.0, 3.0, 4.0]) {
            assert!((got - expect).abs() < 1e-4, "got {got}, expect {expect}");
        }
    }

    #[test]
    fn quartic_general_asymmetric_roots() {
        // (x+1)(x-0.5)(x-2)(x-3) = x^4 - 4.5x^3 + 3x^2 + 5.5x - 3
        let mut roots = solve_quartic(1.0, -4.5, 3.0, 5.5, -3.0);
        roots.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(roots.len(), 4);
        for (got, expect) in roots.iter().zip([-1.0, 0.5, 2.0, 3.0]) {
            assert!((got - expect).abs() < 1e-3, "got {got}, expect {expect}");
        }
    }

    #[test]
    fn quartic_two_real_two_complex_roots() {
        // (x-1)(x-2)(x^2+1) = x^4 - 3x^3 + 3x^2 - 3x + 2; complex pair +/-i discarded.
        let mut roots = solve_quartic(1.0, -3.0, 3.0, -3.0, 2.0);
        roots.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(roots.len(), 2);
        assert!((roots[0] - 1.0).abs() < 1e-6);
        assert!((roots[1] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn degenerate_leading_coefficient_falls_back() {
        // a=0: cubic -> quadratic x^2 - 1.
        let roots = solve_cubic(0.0, 1.0, 0.0, -1.0);
        assert_eq!(roots.len(), 2);
    }
}
