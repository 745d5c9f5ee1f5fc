//! Geometric frame-to-frame matching.
//!
//! Given two star lists, recovers the transform mapping the reference frame
//! onto the target frame. Purely geometric: no pixel data, only coordinates:
//!
//! 1. Cap both lists to their brightest N stars
//! 2. Build pairwise distance lists
//! 3. Large-triangle bootstrap seeds an initial affine estimate
//! 4. Vote candidate correspondences over consistent third-star triangles
//! 5. Resolve the highest-voted mutually exclusive correspondence set
//! 6. Sigma-clipped least-squares fit of the bilinear model
//! 7. Validate against the full correspondence set
//!
//! Deterministic: identical inputs produce bit-identical coefficients: no
//! randomized sampling, all orderings use stable sort keys. Failure is always
//! reported; the matcher never silently falls back to an identity transform.

pub(crate) mod config;
mod distances;
mod solve;
mod transform;
mod triangle;
mod voting;
mod warp;


pub use config::MatchConfig;
pub use transform::Transformation;
pub use voting::VotingPair;
pub use warp::warp_into_reference;

use glam::DVec2;
use thiserror::Error;

use crate::astro_image::ImageDimensions;
use crate::star_detection::{Star, sort_by_quality};

use distances::{DistanceTable, build_distances};

/// Matching failure modes. All are reported to the caller; a failed match
/// must never be papered over with an identity transform, which would
/// silently corrupt the stack.
#[derive(Debug, Clone, Error)]
pub enum RegistrationError {
    #[error("Not enough stars to match: {found} found, at least {required} required")]
    InsufficientStars { found: usize, required: usize },

    #[error("No consistent triangle found between the two star fields")]
    NoTriangleFound,

    #[error("Transform fit degenerated (near-singular normal equations)")]
    SingularFit,

    #[error("Too few consistent star pairs: {found} found, at least {required} required")]
    TooFewMatches { found: usize, required: usize },
}

/// Compute the transform mapping `reference_stars` onto `target_stars`.
///
/// `dims` is the size of the image the star lists came from; it defines the
/// normalization widths of the returned [`Transformation`].
pub fn compute_transformation(
    reference_stars: &[Star],
    target_stars: &[Star],
    dims: ImageDimensions,
    config: &MatchConfig,
) -> Result<Transformation, RegistrationError> {
    if reference_stars.len() < 3 || target_stars.len() < 3 {
        return Err(RegistrationError::InsufficientStars {
            found: reference_stars.len().min(target_stars.len()),
            required: 3,
        });
    }

    let x_width = dims.width as f64;
    let y_width = dims.height as f64;

    // 1. Cap to the brightest stars; bounds the O(n²) distance stage
    let (ref_positions, ref_qualities) = cap_brightest(reference_stars, config.max_stars);
    let (target_positions, target_qualities) = cap_brightest(target_stars, config.max_stars);

    // 2. Pairwise distances
    let ref_distances = build_distances(&ref_positions);
    let target_distances = build_distances(&target_positions);
    let ref_table = DistanceTable::new(&ref_positions);
    let target_table = DistanceTable::new(&target_positions);

    // 3. Large-triangle bootstrap
    let bootstrap = triangle::bootstrap_transform(
        &ref_positions,
        &target_positions,
        &ref_distances,
        &target_distances,
        &ref_table,
        &target_table,
        x_width,
        y_width,
        config,
    )
    .ok_or(RegistrationError::NoTriangleFound)?;

    tracing::debug!(
        support = bootstrap.support,
        transform = %bootstrap.transform,
        "triangle bootstrap"
    );

    // 4. Voting over consistent third-star triangles
    let mut pairs = voting::collect_candidate_pairs(
        &ref_positions,
        &target_positions,
        &bootstrap.transform,
        config,
    );
    voting::accumulate_votes(&mut pairs, &ref_table, &target_table, config);

    // 5. Mutually exclusive resolution with quality tie-break
    let resolved = voting::resolve_pairs(&mut pairs, &ref_qualities, &target_qualities);
    if resolved.len() < config.min_pairs.max(3) {
        return Err(RegistrationError::TooFewMatches {
            found: resolved.len(),
            required: config.min_pairs.max(3),
        });
    }

    let matched: Vec<(DVec2, DVec2)> = resolved
        .iter()
        .map(|&(i, j)| (ref_positions[i], target_positions[j]))
        .collect();

    // 6. Sigma-clipped least squares
    let transform = solve::sigma_clipped_fit(&matched, x_width, y_width, config.min_pairs)?;

    // 7. Validate against the full correspondence set, not just the fitted
    // subset
    let consistent = matched
        .iter()
        .filter(|(r, t)| (transform.apply(*r) - *t).length() <= config.max_distance_delta)
        .count();
    if consistent < config.min_pairs {
        return Err(RegistrationError::TooFewMatches {
            found: consistent,
            required: config.min_pairs,
        });
    }

    tracing::debug!(
        matched = matched.len(),
        consistent,
        transform = %transform,
        "registration complete"
    );

    Ok(transform)
}

/// Positions and qualities of the brightest `max_stars` stars, in a stable
/// deterministic order.
fn cap_brightest(stars: &[Star], max_stars: usize) -> (Vec<DVec2>, Vec<f32>) {
    let mut sorted = stars.to_vec();
    sort_by_quality(&mut sorted);
    sorted.truncate(max_stars);

    let positions = sorted
        .iter()
        .map(|s| DVec2::new(f64::from(s.x), f64::from(s.y)))
        .collect();
    let qualities = sorted.iter().map(|s| s.quality).collect();
    (positions, qualities)
}
