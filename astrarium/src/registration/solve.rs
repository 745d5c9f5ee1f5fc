//! Least-squares fit of the transformation model.

use glam::DVec2;
use nalgebra::{Cholesky, DMatrix, DVector};

use super::RegistrationError;
use super::transform::Transformation;
use crate::math;

/// Accepted pairs below this count are fitted without the bilinear cross
/// term; the 4-parameter exact system is too ill-conditioned for it.
pub(crate) const BILINEAR_MIN_PAIRS: usize = 8;

/// Sigma multiplier for outlier rejection between fit iterations.
const CLIP_SIGMA: f64 = 2.0;

/// Maximum refit iterations.
const MAX_CLIP_ITERATIONS: usize = 8;

/// Fit the model to (reference, target) pixel-coordinate pairs.
pub(crate) fn fit_transformation(
    pairs: &[(DVec2, DVec2)],
    x_width: f64,
    y_width: f64,
    use_cross_term: bool,
) -> Result<Transformation, RegistrationError> {
    let params = if use_cross_term { 4 } else { 3 };
    if pairs.len() < params {
        return Err(RegistrationError::TooFewMatches {
            found: pairs.len(),
            required: params,
        });
    }

    let design = DMatrix::from_fn(pairs.len(), params, |r, c| {
        let x = pairs[r].0.x / x_width;
        let y = pairs[r].0.y / y_width;
        match c {
            0 => 1.0,
            1 => x,
            2 => y,
            _ => x * y,
        }
    });
    let bx = DVector::from_fn(pairs.len(), |r, _| pairs[r].1.x / x_width);
    let by = DVector::from_fn(pairs.len(), |r, _| pairs[r].1.y / y_width);

    // Normal equations; Cholesky fails exactly when the system degenerates
    let normal = design.transpose() * &design;
    let chol = Cholesky::new(normal).ok_or(RegistrationError::SingularFit)?;
    let a = chol.solve(&(design.transpose() * bx));
    let b = chol.solve(&(design.transpose() * by));

    let mut coeff_a = [0.0; 4];
    let mut coeff_b = [0.0; 4];
    for i in 0..params {
        coeff_a[i] = a[i];
        coeff_b[i] = b[i];
    }

    let transform = Transformation {
        a: coeff_a,
        b: coeff_b,
        x_width,
        y_width,
    };
    if !transform.is_valid() {
        return Err(RegistrationError::SingularFit);
    }
    Ok(transform)
}

/// Sigma-clipped least squares: fit, drop residual outliers beyond
/// `mean + 2σ`, refit until residuals stabilize or too few pairs remain.
pub(crate) fn sigma_clipped_fit(
    pairs: &[(DVec2, DVec2)],
    x_width: f64,
    y_width: f64,
    min_pairs: usize,
) -> Result<Transformation, RegistrationError> {
    let mut active: Vec<(DVec2, DVec2)> = pairs.to_vec();
    let mut transform = fit_transformation(
        &active,
        x_width,
        y_width,
        active.len() >= BILINEAR_MIN_PAIRS,
    )?;

    for _ in 0..MAX_CLIP_ITERATIONS {
        let residuals: Vec<f64> = active
            .iter()
            .map(|(r, t)| (transform.apply(*r) - *t).length())
            .collect();
        let mean = math::mean_f64(&residuals);
        let sigma = math::std_dev_f64(&residuals, mean);

        if sigma < 1e-9 {
            break;
        }

        let threshold = mean + CLIP_SIGMA * sigma;
        let survivors: Vec<(DVec2, DVec2)> = active
            .iter()
            .zip(residuals.iter())
            .filter(|&(_, &res)| res <= threshold)
            .map(|(pair, _)| *pair)
            .collect();

        if survivors.len() == active.len() || survivors.len() < min_pairs {
            break;
        }

        tracing::trace!(
            dropped = active.len() - survivors.len(),
            remaining = survivors.len(),
            "sigma-clip iteration"
        );

        active = survivors;
        transform = fit_transformation(
            &active,
            x_width,
            y_width,
            active.len() >= BILINEAR_MIN_PAIRS,
        )?;
    }

    Ok(transform)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translated_pairs(offset: DVec2) -> Vec<(DVec2, DVec2)> {
        let points = [
            DVec2::new(20.0, 30.0),
            DVec2::new(400.0, 50.0),
            DVec2::new(100.0, 420.0),
            DVec2::new(300.0, 310.0),
            DVec2::new(250.0, 120.0),
            DVec2::new(60.0, 200.0),
        ];
        points.iter().map(|&p| (p, p + offset)).collect()
    }

    #[test]
    fn test_fit_recovers_translation() {
        let offset = DVec2::new(15.0, -8.0);
        let pairs = translated_pairs(offset);
        let t = fit_transformation(&pairs, 512.0, 512.0, false).unwrap();

        let translation = t.translation();
        assert!((translation.x - offset.x).abs() < 1e-9);
        assert!((translation.y - offset.y).abs() < 1e-9);
        assert!(t.rotation_angle().abs() < 1e-9);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let pairs = translated_pairs(DVec2::new(3.0, 4.0));
        let t1 = fit_transformation(&pairs, 512.0, 512.0, false).unwrap();
        let t2 = fit_transformation(&pairs, 512.0, 512.0, false).unwrap();
        assert_eq!(t1.a, t2.a, "coefficients must be bit-identical");
        assert_eq!(t1.b, t2.b);
    }

    #[test]
    fn test_fit_degenerate_points_fails() {
        // All reference points identical: the normal equations collapse
        let p = DVec2::new(100.0, 100.0);
        let pairs = vec![(p, p); 6];
        assert!(matches!(
            fit_transformation(&pairs, 512.0, 512.0, false),
            Err(RegistrationError::SingularFit)
        ));
    }

    #[test]
    fn test_fit_too_few_pairs() {
        let pairs = vec![(DVec2::ZERO, DVec2::ZERO); 2];
        assert!(matches!(
            fit_transformation(&pairs, 512.0, 512.0, false),
            Err(RegistrationError::TooFewMatches { .. })
        ));
    }

    #[test]
    fn test_sigma_clip_discards_outlier() {
        let offset = DVec2::new(10.0, 10.0);
        let mut pairs = translated_pairs(offset);
        // A grossly wrong correspondence
        pairs.push((DVec2::new(480.0, 480.0), DVec2::new(100.0, 20.0)));

        let t = sigma_clipped_fit(&pairs, 512.0, 512.0, 4).unwrap();
        let translation = t.translation();
        assert!((translation.x - offset.x).abs() < 0.1, "dx = {}", translation.x);
        assert!((translation.y - offset.y).abs() < 0.1, "dy = {}", translation.y);
    }
}
