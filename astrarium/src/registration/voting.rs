//! Correspondence voting.
//!
//! Candidate pairs survive the bootstrap position gate, then accumulate one
//! vote for every other candidate pair whose reference-side and target-side
//! distances agree, i.e. for every consistent third-star triangle across
//! the two sets. The highest-voted, mutually exclusive set wins.

use glam::DVec2;

use super::config::MatchConfig;
use super::distances::DistanceTable;
use super::transform::Transformation;

/// Candidate correspondence between a reference star and a target star.
#[derive(Debug, Clone, Copy)]
pub struct VotingPair {
    pub ref_index: usize,
    pub target_index: usize,
    /// Accumulated triangle votes.
    pub votes: usize,
    /// Still eligible for selection.
    pub active: bool,
    /// Consumed by a winning correspondence.
    pub used: bool,
}

/// Build candidate pairs from stars whose bootstrap projection lands close
/// to a target star. Pairs are ordered by (ref, target) index.
pub(crate) fn collect_candidate_pairs(
    ref_positions: &[DVec2],
    target_positions: &[DVec2],
    bootstrap: &Transformation,
    config: &MatchConfig,
) -> Vec<VotingPair> {
    let pos_tol = config.position_tolerance();
    let mut pairs = Vec::new();

    for (i, &ref_pos) in ref_positions.iter().enumerate() {
        let projected = bootstrap.apply(ref_pos);
        for (j, &target_pos) in target_positions.iter().enumerate() {
            if (target_pos - projected).length() <= pos_tol {
                pairs.push(VotingPair {
                    ref_index: i,
                    target_index: j,
                    votes: 0,
                    active: true,
                    used: false,
                });
            }
        }
    }

    pairs
}

/// Accumulate triangle votes over all candidate pair combinations.
pub(crate) fn accumulate_votes(
    pairs: &mut [VotingPair],
    ref_table: &DistanceTable,
    target_table: &DistanceTable,
    config: &MatchConfig,
) {
    let delta = config.max_distance_delta;

    for p in 0..pairs.len() {
        let mut votes = 0;
        for q in 0..pairs.len() {
            if p == q {
                continue;
            }
            let (a, b) = (pairs[p], pairs[q]);
            if a.ref_index == b.ref_index || a.target_index == b.target_index {
                continue;
            }
            let ref_side = ref_table.get(a.ref_index, b.ref_index);
            let target_side = target_table.get(a.target_index, b.target_index);
            if (ref_side - target_side).abs() <= delta {
                votes += 1;
            }
        }
        pairs[p].votes = votes;
    }
}

/// Greedily resolve pairs into a mutually exclusive correspondence set.
///
/// Ranking: vote count, then summed star quality, then the index pair for
/// full determinism. Winners are flagged `used`; conflicting pairs are
/// deactivated.
pub(crate) fn resolve_pairs(
    pairs: &mut [VotingPair],
    ref_qualities: &[f32],
    target_qualities: &[f32],
) -> Vec<(usize, usize)> {
    let mut order: Vec<usize> = (0..pairs.len()).collect();
    order.sort_by(|&a, &b| {
        let pa = &pairs[a];
        let pb = &pairs[b];
        let qa = f64::from(ref_qualities[pa.ref_index]) + f64::from(target_qualities[pa.target_index]);
        let qb = f64::from(ref_qualities[pb.ref_index]) + f64::from(target_qualities[pb.target_index]);
        pb.votes
            .cmp(&pa.votes)
            .then(qb.total_cmp(&qa))
            .then(pa.ref_index.cmp(&pb.ref_index))
            .then(pa.target_index.cmp(&pb.target_index))
    });

    let n_ref = ref_qualities.len();
    let n_target = target_qualities.len();
    let mut used_ref = vec![false; n_ref];
    let mut used_target = vec![false; n_target];
    let mut resolved = Vec::new();

    for idx in order {
        let pair = pairs[idx];
        if pair.votes == 0 {
            continue;
        }
        if used_ref[pair.ref_index] || used_target[pair.target_index] {
            pairs[idx].active = false;
            continue;
        }
        used_ref[pair.ref_index] = true;
        used_target[pair.target_index] = true;
        pairs[idx].used = true;
        resolved.push((pair.ref_index, pair.target_index));
    }

    resolved
}
