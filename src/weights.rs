//! Latitude area weights.
//!
//! Grid cells shrink towards the poles in proportion to cos(latitude), so any
//! spatial average over a regular lat/lon grid must weight rows accordingly.

/// Raw, un-normalized area weight of a latitude row.
pub fn area_weight(latitude_deg: f64) -> f64 {
    // cos(90deg) evaluates to a tiny positive number, but clamp in case of
    // coordinates marginally outside [-90, 90].
    latitude_deg.to_radians().cos().max(0.0)
}

/// Normalized cos(latitude) weights over a subset of latitude rows.
#[derive(Debug, Clone, PartialEq)]
pub struct LatitudeWeights {
    rows: Vec<usize>,
    weights: Vec<f64>,
}

impl LatitudeWeights {
    /// Weights over every row of `latitudes`.
    pub fn whole(latitudes: &[f64]) -> Option<Self> {
        Self::for_rows(latitudes, 0..latitudes.len())
    }

    /// Weights over the rows whose latitude satisfies `predicate`.
    pub fn matching<F>(latitudes: &[f64], predicate: F) -> Option<Self>
    where
        F: Fn(f64) -> bool,
    {
        let rows = latitudes
            .iter()
            .enumerate()
            .filter(|(_, lat)| predicate(**lat))
            .map(|(i, _)| i);
        Self::for_rows(latitudes, rows)
    }

    /// Weights over an explicit set of row indices. Returns `None` when the
    /// subset is empty or carries no area (every row at a pole).
    pub fn for_rows<I>(latitudes: &[f64], rows: I) -> Option<Self>
    where
        I: IntoIterator<Item = usize>,
    {
        let rows: Vec<usize> = rows.into_iter().filter(|&i| i < latitudes.len()).collect();
        let raw: Vec<f64> = rows.iter().map(|&i| area_weight(latitudes[i])).collect();
        let total: f64 = raw.iter().sum();

        if rows.is_empty() || total <= 0.0 || !total.is_finite() {
            return None;
        }

        Some(Self {
            rows,
            weights: raw.into_iter().map(|w| w / total).collect(),
        })
    }

    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// `(row index, normalized weight)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.rows.iter().copied().zip(self.weights.iter().copied())
    }

    pub fn sum(&self) -> f64 {
        self.weights.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis(step: f64) -> Vec<f64> {
        let n = (180.0 / step) as usize + 1;
        (0..n).map(|i| 90.0 - i as f64 * step).collect()
    }

    #[test]
    fn test_whole_grid_sums_to_one() {
        let lats = axis(0.25);
        let w = LatitudeWeights::whole(&lats).unwrap();
        assert_eq!(w.len(), lats.len());
        assert!((w.sum() - 1.0).abs() < 1e-9);
        assert!(w.weights().iter().all(|&x| x >= 0.0));
    }

    #[test]
    fn test_subsets_sum_to_one() {
        let lats = axis(2.5);
        let polar = 66.0 + 34.0 / 60.0;

        let subsets: Vec<Box<dyn Fn(f64) -> bool>> = vec![
            Box::new(|lat| lat >= 0.0),
            Box::new(|lat| lat < 0.0),
            Box::new(move |lat| lat >= polar),
            Box::new(move |lat| lat <= -polar),
            Box::new(|lat| (lat - 10.0).abs() < 1e-9),
        ];

        for predicate in subsets {
            let w = LatitudeWeights::matching(&lats, predicate).unwrap();
            assert!((w.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_equator_outweighs_high_latitude() {
        let lats = [0.0, 60.0];
        let w = LatitudeWeights::whole(&lats).unwrap();
        // cos(60) = 0.5, so weights are 2/3 and 1/3.
        assert!((w.weights()[0] - 2.0 / 3.0).abs() < 1e-12);
        assert!((w.weights()[1] - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_subset_is_none() {
        let lats = [10.0, 20.0];
        assert!(LatitudeWeights::matching(&lats, |lat| lat < 0.0).is_none());
        assert!(LatitudeWeights::for_rows(&lats, Vec::new()).is_none());
    }

    #[test]
    fn test_rows_preserved_in_order() {
        let lats = [80.0, 40.0, 0.0, -40.0, -80.0];
        let w = LatitudeWeights::matching(&lats, |lat| lat < 0.0).unwrap();
        assert_eq!(w.rows(), &[3, 4]);
        let pairs: Vec<(usize, f64)> = w.iter().collect();
        assert_eq!(pairs[0].0, 3);
        assert!((pairs[0].1 - pairs[1].1).abs() < 1e-12);
    }
}
