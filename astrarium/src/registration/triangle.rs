//! Large-triangle bootstrap.
//!
//! Seeds the match with an initial transform before any voting, which keeps
//! the matcher robust to large rotation/translation between frames: the pair
//! of stars with the largest separation in each set anchors a triangle with
//! a well-separated third star, and side-length agreement identifies the
//! correspondence.

use glam::DVec2;
use nalgebra::{Matrix3, Vector3};

use super::config::MatchConfig;
use super::distances::{DistanceTable, StarsDistance};
use super::transform::Transformation;

/// Minimum side length for a usable triangle.
const MIN_TRIANGLE_SIDE: f64 = 1e-10;

/// Minimum triangle area in px²; flatter triangles give unstable fits.
const MIN_TRIANGLE_AREA: f64 = 1.0;

/// How many of the largest distance pairs to try per set.
const PAIR_CANDIDATES: usize = 12;

/// How many third-star candidates to try per pair.
const THIRD_CANDIDATES: usize = 3;

/// Best bootstrap estimate and the number of stars it explains.
#[derive(Debug, Clone)]
pub(crate) struct Bootstrap {
    pub transform: Transformation,
    pub support: usize,
}

/// Find an initial transform from one consistent triangle correspondence.
///
/// Returns the candidate explaining the most reference stars (a star is
/// explained when its projection lands within the position tolerance of some
/// target star). Deterministic: candidates are scanned in a fixed order and
/// ties keep the earlier candidate.
pub(crate) fn bootstrap_transform(
    ref_positions: &[DVec2],
    target_positions: &[DVec2],
    ref_distances: &[StarsDistance],
    target_distances: &[StarsDistance],
    ref_table: &DistanceTable,
    target_table: &DistanceTable,
    x_width: f64,
    y_width: f64,
    config: &MatchConfig,
) -> Option<Bootstrap> {
    let delta = config.max_distance_delta;
    let pos_tol = config.position_tolerance();

    let mut best: Option<Bootstrap> = None;

    for rd in ref_distances.iter().take(PAIR_CANDIDATES) {
        for td in target_distances.iter().take(PAIR_CANDIDATES) {
            // The frames are near-rigid: the matched longest sides must agree
            if (rd.distance - td.distance).abs() > delta {
                continue;
            }

            let ref_thirds = third_star_candidates(ref_positions, ref_table, rd);
            let target_thirds = third_star_candidates(target_positions, target_table, td);

            for &rk in &ref_thirds {
                for &tk in &target_thirds {
                    for &(t_first, t_second) in
                        &[(td.index1, td.index2), (td.index2, td.index1)]
                    {
                        let sides_match = (ref_table.get(rd.index1, rk)
                            - target_table.get(t_first, tk))
                        .abs()
                            <= delta
                            && (ref_table.get(rd.index2, rk) - target_table.get(t_second, tk))
                                .abs()
                                <= delta;
                        if !sides_match {
                            continue;
                        }

                        let Some(transform) = affine_from_triangle(
                            [
                                ref_positions[rd.index1],
                                ref_positions[rd.index2],
                                ref_positions[rk],
                            ],
                            [
                                target_positions[t_first],
                                target_positions[t_second],
                                target_positions[tk],
                            ],
                            x_width,
                            y_width,
                        ) else {
                            continue;
                        };

                        let support =
                            count_support(ref_positions, target_positions, &transform, pos_tol);
                        if best.as_ref().is_none_or(|b| support > b.support) {
                            best = Some(Bootstrap { transform, support });
                        }
                    }
                }
            }
        }
    }

    best.filter(|b| b.support >= 3)
}

/// Third-star candidates for a base pair, ranked by how far they sit from
/// both endpoints (the most separated first). Collinear choices are skipped.
fn third_star_candidates(
    positions: &[DVec2],
    table: &DistanceTable,
    base: &StarsDistance,
) -> Vec<usize> {
    let mut scored: Vec<(f64, usize)> = (0..positions.len())
        .filter(|&k| k != base.index1 && k != base.index2)
        .filter_map(|k| {
            let d1 = table.get(base.index1, k);
            let d2 = table.get(base.index2, k);
            if d1 < MIN_TRIANGLE_SIDE || d2 < MIN_TRIANGLE_SIDE {
                return None;
            }
            let v1 = positions[base.index2] - positions[base.index1];
            let v2 = positions[k] - positions[base.index1];
            let area = 0.5 * (v1.x * v2.y - v1.y * v2.x).abs();
            if area < MIN_TRIANGLE_AREA {
                return None;
            }
            Some((d1.min(d2), k))
        })
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
    scored.truncate(THIRD_CANDIDATES);
    scored.into_iter().map(|(_, k)| k).collect()
}

/// Exact affine map from three point correspondences, in normalized
/// coordinates. None when the triangle is numerically degenerate.
fn affine_from_triangle(
    from: [DVec2; 3],
    to: [DVec2; 3],
    x_width: f64,
    y_width: f64,
) -> Option<Transformation> {
    let design = Matrix3::from_fn(|r, c| match c {
        0 => 1.0,
        1 => from[r].x / x_width,
        _ => from[r].y / y_width,
    });
    let lu = design.lu();

    let bx = Vector3::from_fn(|r, _| to[r].x / x_width);
    let by = Vector3::from_fn(|r, _| to[r].y / y_width);

    let a = lu.solve(&bx)?;
    let b = lu.solve(&by)?;

    let transform = Transformation {
        a: [a[0], a[1], a[2], 0.0],
        b: [b[0], b[1], b[2], 0.0],
        x_width,
        y_width,
    };
    transform.is_valid().then_some(transform)
}

/// Number of reference stars whose projection lands near some target star.
fn count_support(
    ref_positions: &[DVec2],
    target_positions: &[DVec2],
    transform: &Transformation,
    pos_tol: f64,
) -> usize {
    ref_positions
        .iter()
        .filter(|&&p| {
            let projected = transform.apply(p);
            target_positions
                .iter()
                .any(|&t| (t - projected).length() <= pos_tol)
        })
        .count()
}
