//! Pairwise star distances.

use glam::DVec2;

/// An unordered pair of star indices with their Euclidean distance.
///
/// Canonicalized so `index1 <= index2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StarsDistance {
    pub index1: usize,
    pub index2: usize,
    pub distance: f64,
}

impl StarsDistance {
    pub fn new(i: usize, j: usize, distance: f64) -> Self {
        let (index1, index2) = if i <= j { (i, j) } else { (j, i) };
        Self {
            index1,
            index2,
            distance,
        }
    }

    /// The pair member that is not `index`, if `index` belongs to the pair.
    pub fn other(&self, index: usize) -> Option<usize> {
        if index == self.index1 {
            Some(self.index2)
        } else if index == self.index2 {
            Some(self.index1)
        } else {
            None
        }
    }
}

/// All pairwise distances, sorted by descending distance then by indices so
/// identical inputs always produce identical ordering.
pub fn build_distances(positions: &[DVec2]) -> Vec<StarsDistance> {
    let n = positions.len();
    let mut distances = Vec::with_capacity(n * (n.saturating_sub(1)) / 2);

    for i in 0..n {
        for j in (i + 1)..n {
            distances.push(StarsDistance::new(i, j, (positions[j] - positions[i]).length()));
        }
    }

    distances.sort_by(|a, b| {
        b.distance
            .total_cmp(&a.distance)
            .then(a.index1.cmp(&b.index1))
            .then(a.index2.cmp(&b.index2))
    });

    distances
}

/// Distance lookup table indexed by (i, j) in either order.
pub struct DistanceTable {
    distances: Vec<f64>,
    n: usize,
}

impl DistanceTable {
    pub fn new(positions: &[DVec2]) -> Self {
        let n = positions.len();
        let mut distances = vec![0.0; n * n];
        for i in 0..n {
            for j in (i + 1)..n {
                let d = (positions[j] - positions[i]).length();
                distances[i * n + j] = d;
                distances[j * n + i] = d;
            }
        }
        Self { distances, n }
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        debug_assert!(i < self.n && j < self.n);
        self.distances[i * self.n + j]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_is_canonicalized() {
        let d = StarsDistance::new(5, 2, 10.0);
        assert_eq!(d.index1, 2);
        assert_eq!(d.index2, 5);
        assert_eq!(d.other(2), Some(5));
        assert_eq!(d.other(5), Some(2));
        assert_eq!(d.other(3), None);
    }

    #[test]
    fn test_build_distances_sorted_descending() {
        let positions = vec![
            DVec2::new(0.0, 0.0),
            DVec2::new(3.0, 4.0),
            DVec2::new(10.0, 0.0),
        ];
        let distances = build_distances(&positions);
        assert_eq!(distances.len(), 3);
        assert!((distances[0].distance - 10.0).abs() < 1e-12);
        assert_eq!((distances[0].index1, distances[0].index2), (0, 2));
        assert!(distances[0].distance >= distances[1].distance);
        assert!(distances[1].distance >= distances[2].distance);
    }

    #[test]
    fn test_distance_table_symmetry() {
        let positions = vec![DVec2::new(0.0, 0.0), DVec2::new(6.0, 8.0)];
        let table = DistanceTable::new(&positions);
        assert!((table.get(0, 1) - 10.0).abs() < 1e-12);
        assert!((table.get(1, 0) - 10.0).abs() < 1e-12);
        assert_eq!(table.get(0, 0), 0.0);
    }
}
