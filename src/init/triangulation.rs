//! Ray-ray triangulation: for a point observed from two or more already-posed
//! cameras, average the pairwise closest-approach midpoints of the
//! world-space rays those cameras cast through their observed pixel.
//! Deliberately the classical two-line formula rather than a general
//! multi-view least-squares fit -- a starting guess refined by LM
//! afterwards, not a final estimate.

use glam::DVec3;

use crate::constants::TRIANGULATION_PARALLEL_EPS;

/// A world-space ray: `origin + t * direction`, `direction` unit length.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: DVec3,
    pub direction: DVec3,
}

/// The midpoint of the shortest segment connecting two rays, or `None` if
/// they are (near-)parallel -- no well-defined closest approach.
pub fn closest_approach_midpoint(r1: Ray, r2: Ray) -> Option<DVec3> {
    let d1 = r1.direction;
    let d2 = r2.direction;
    let w0 = r1.origin - r2.origin;

    let a = d1.dot(d1);
    let b = d1.dot(d2);
    let c = d2.dot(d2);
    let d = d1.dot(w0);
    let e = d2.dot(w0);

    let denom = a * c - b * b;
    if denom.abs() < TRIANGULATION_PARALLEL_EPS {
        return None;
    }

    let t1 = (b * e - c * d) / denom;
    let t2 = (a * e - b * d) / denom;

    let p1 = r1.origin + d1 * t1;
    let p2 = r2.origin + d2 * t2;
    Some((p1 + p2) * 0.5)
}

/// Triangulates one point from every pairwise combination of its observing
/// rays, averaging the resulting closest-approach midpoints. `None` if
/// fewer than two rays are given or every pair turned out parallel.
pub fn triangulate(rays: &[Ray]) -> Option<DVec3> {
    if rays.len() < 2 {
        return None;
    }
    let mut sum = DVec3::ZERO;
    let mut count = 0usize;
    for i in 0..rays.len() {
        for j in (i + 1)..rays.len() {
            if let Some(mid) = closest_approach_midpoint(rays[i], rays[j]) {
                sum += mid;
                count += 1;
            }
        }
    }
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_rays_meeting_at_a_point_recover_it_exactly() {
        let target = DVec3::new(1.0, 2.0, 10.0);
        let r1 = Ray { origin: DVec3::new(0.0, 0.0, 0.0), direction: (target - DVec3::ZERO).normalize() };
        let r2 = Ray {
            origin: DVec3::new(5.0, 0.0, 0.0),
            direction: (target - DVec3::new(5.0, 0.0, 0.0)).normalize(),
        };
        let p = triangulate(&[r1, r2]).unwrap();
        assert!((p - target).length() < 1e-9);
    }

    #[test]
    fn parallel_rays_return_none() {
        let r1 = Ray { origin: DVec3::ZERO, direction: DVec3::Z };
        let r2 = Ray { origin: DVec3::new(1.0, 0.0, 0.0), direction: DVec3::Z };
        assert!(closest_approach_midpoint(r1, r2).is_none());
    }

    #[test]
    fn three_rays_average_pairwise_midpoints() {
        let target = DVec3::new(0.5, -0.5, 8.0);
        let origins =
            [DVec3::new(0.0, 0.0, 0.0), DVec3::new(2.0, 0.0, 0.0), DVec3::new(0.0, 2.0, 0.0)];
        let rays: Vec<Ray> = origins
            .iter()
            .map(|&o| Ray { origin: o, direction: (target - o).normalize() })
            .collect();
        let p = triangulate(&rays).unwrap();
        assert!((p - target).length() < 1e-9);
    }

    #[test]
    fn single_ray_is_insufficient() {
        let r = Ray { origin: DVec3::ZERO, direction: DVec3::Z };
        assert!(triangulate(&[r]).is_none());
    }
}
