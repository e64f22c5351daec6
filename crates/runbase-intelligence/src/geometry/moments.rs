// ABOUTME: Polygon image moments and Hu invariants for rotation / scale independent shape comparison
// ABOUTME: Green's theorem moments over polygon edges plus the I1 log-scaled Hu distance
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

/// Hu invariants below this magnitude carry no shape information and are skipped
const HU_EPSILON: f64 = 1e-5;

/// Raw area moments of a simple polygon up to third order
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct RawMoments {
    m00: f64,
    m10: f64,
    m01: f64,
    m20: f64,
    m11: f64,
    m02: f64,
    m30: f64,
    m21: f64,
    m12: f64,
    m03: f64,
}

fn raw_moments(vertices: &[(f64, f64)]) -> RawMoments {
    let mut m = RawMoments::default();
    if vertices.len() < 3 {
        return m;
    }

    for (idx, &(x0, y0)) in vertices.iter().enumerate() {
        let (x1, y1) = vertices[(idx + 1) % vertices.len()];
        let a = x0.mul_add(y1, -(x1 * y0));
        let (xx0, yy0, xx1, yy1) = (x0 * x0, y0 * y0, x1 * x1, y1 * y1);

        m.m00 += a;
        m.m10 += a * (x0 + x1);
        m.m01 += a * (y0 + y1);
        m.m20 += a * (xx0 + x0 * x1 + xx1);
        m.m11 += a * (2.0 * x0 * y0 + x0 * y1 + x1 * y0 + 2.0 * x1 * y1);
        m.m02 += a * (yy0 + y0 * y1 + yy1);
        m.m30 += a * (x0 + x1) * (xx0 + xx1);
        m.m21 += a * (xx0 * (3.0 * y0 + y1) + 2.0 * x0 * x1 * (y0 + y1) + xx1 * (y0 + 3.0 * y1));
        m.m12 += a * (yy0 * (3.0 * x0 + x1) + 2.0 * y0 * y1 * (x0 + x1) + yy1 * (x0 + 3.0 * x1));
        m.m03 += a * (y0 + y1) * (yy0 + yy1);
    }

    // Clockwise rings produce negative sums
    let sign = if m.m00 < 0.0 { -1.0 } else { 1.0 };
    RawMoments {
        m00: sign * m.m00 / 2.0,
        m10: sign * m.m10 / 6.0,
        m01: sign * m.m01 / 6.0,
        m20: sign * m.m20 / 12.0,
        m11: sign * m.m11 / 24.0,
        m02: sign * m.m02 / 12.0,
        m30: sign * m.m30 / 20.0,
        m21: sign * m.m21 / 60.0,
        m12: sign * m.m12 / 60.0,
        m03: sign * m.m03 / 20.0,
    }
}

/// The seven Hu moment invariants of a polygon
///
/// Returns `None` for degenerate (zero-area) polygons.
#[must_use]
pub fn hu_moments(vertices: &[(f64, f64)]) -> Option<[f64; 7]> {
    let raw = raw_moments(vertices);
    if raw.m00.abs() < f64::EPSILON {
        return None;
    }

    // Central moments: recompute on centroid-shifted vertices
    let (cx, cy) = (raw.m10 / raw.m00, raw.m01 / raw.m00);
    let shifted: Vec<(f64, f64)> = vertices.iter().map(|(x, y)| (x - cx, y - cy)).collect();
    let mu = raw_moments(&shifted);

    let norm = |value: f64, order: i32| value / mu.m00.powf(f64::from(order) / 2.0 + 1.0);
    let n20 = norm(mu.m20, 2);
    let n11 = norm(mu.m11, 2);
    let n02 = norm(mu.m02, 2);
    let n30 = norm(mu.m30, 3);
    let n21 = norm(mu.m21, 3);
    let n12 = norm(mu.m12, 3);
    let n03 = norm(mu.m03, 3);

    let t0 = n30 + n12;
    let t1 = n21 + n03;
    let q0 = 3.0f64.mul_add(-n12, n30);
    let q1 = 3.0f64.mul_add(n21, -n03);
    let diff = n20 - n02;

    Some([
        n20 + n02,
        diff.mul_add(diff, 4.0 * n11 * n11),
        q0.mul_add(q0, q1 * q1),
        t0.mul_add(t0, t1 * t1),
        (q0 * t0).mul_add(
            t0.mul_add(t0, -3.0 * t1 * t1),
            q1 * t1 * (3.0 * t0).mul_add(t0, -(t1 * t1)),
        ),
        diff.mul_add(t0.mul_add(t0, -(t1 * t1)), 4.0 * n11 * t0 * t1),
        (q1 * t0).mul_add(
            t0.mul_add(t0, -3.0 * t1 * t1),
            -(q0 * t1 * (3.0 * t0).mul_add(t0, -(t1 * t1))),
        ),
    ])
}

fn log_scaled(value: f64) -> f64 {
    value.signum() * value.abs().log10()
}

/// I1 shape distance between two Hu moment vectors (0 for identical shapes)
#[must_use]
pub fn i1_distance(a: &[f64; 7], b: &[f64; 7]) -> f64 {
    a.iter()
        .zip(b)
        .filter(|(ha, hb)| ha.abs() > HU_EPSILON && hb.abs() > HU_EPSILON)
        .map(|(ha, hb)| (1.0 / log_scaled(*ha) - 1.0 / log_scaled(*hb)).abs())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rectangle(w: f64, h: f64) -> Vec<(f64, f64)> {
        vec![(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)]
    }

    #[test]
    fn test_invariant_under_translation_scale_rotation() {
        let base = hu_moments(&rectangle(4.0, 2.0)).unwrap();

        let moved: Vec<(f64, f64)> = rectangle(8.0, 4.0)
            .into_iter()
            .map(|(x, y)| {
                let (s, c) = 30.0_f64.to_radians().sin_cos();
                (x.mul_add(c, -y * s) + 100.0, x.mul_add(s, y * c) - 50.0)
            })
            .collect();
        let other = hu_moments(&moved).unwrap();

        assert!(i1_distance(&base, &other) < 1e-6);
    }

    #[test]
    fn test_orientation_independent() {
        let mut ring = rectangle(3.0, 1.0);
        let ccw = hu_moments(&ring).unwrap();
        ring.reverse();
        let cw = hu_moments(&ring).unwrap();
        assert!(i1_distance(&ccw, &cw) < 1e-9);
    }

    #[test]
    fn test_different_shapes_have_distance() {
        let square = hu_moments(&rectangle(1.0, 1.0)).unwrap();
        let long = hu_moments(&rectangle(6.0, 1.0)).unwrap();
        assert!(i1_distance(&square, &long) > 0.05);
    }

    #[test]
    fn test_degenerate_polygon() {
        assert!(hu_moments(&[(0.0, 0.0), (1.0, 1.0)]).is_none());
        assert!(hu_moments(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]).is_none());
    }
}
