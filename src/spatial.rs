//! Nearest grid cell lookup.
//!
//! A 2-D k-d tree over cell centres, treating (latitude, longitude) as flat
//! Euclidean coordinates in degrees. Queries near the antimeridian do not
//! wrap: a point at 179.9 is far from a cell at -180.

use crate::error::ClimateResult;
use crate::grid::normalized_longitude_order;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellMatch {
    /// Row-major index `lat_index * n_lon + lon_index`.
    pub flat_index: usize,
    pub lat_index: usize,
    pub lon_index: usize,
    /// Euclidean distance in degrees.
    pub distance: f64,
}

#[derive(Debug)]
pub struct SpatialIndex {
    nodes: Vec<Node>,
    /// Cell centres by flat index.
    points: Vec<[f64; 2]>,
    n_lon: usize,
    longitudes: Vec<f64>,
}

#[derive(Debug)]
struct Node {
    point: usize,
    /// 0 = latitude, 1 = longitude
    axis: usize,
    left: Option<usize>,
    right: Option<usize>,
}

impl SpatialIndex {
    /// Index every cell of a regular grid. Longitudes are normalized to
    /// [-180, 180) and sorted before indexing, so `lon_index` refers to the
    /// normalized axis returned by [`SpatialIndex::longitudes`].
    pub fn build(latitudes: &[f64], longitudes: &[f64]) -> ClimateResult<Self> {
        let (longitudes, _) = normalized_longitude_order(longitudes)?;
        let n_lon = longitudes.len();

        let points: Vec<[f64; 2]> = latitudes
            .iter()
            .flat_map(|&lat| longitudes.iter().map(move |&lon| [lat, lon]))
            .collect();

        let mut nodes = Vec::with_capacity(points.len());
        if !points.is_empty() {
            let mut order: Vec<usize> = (0..points.len()).collect();
            build_recursive(&points, &mut order, 0, &mut nodes);
        }

        Ok(Self {
            nodes,
            points,
            n_lon,
            longitudes,
        })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn longitudes(&self) -> &[f64] {
        &self.longitudes
    }

    /// Closest cell centre to `(lat, lon)`. Equidistant cells resolve to the
    /// smallest flat index. `None` for an empty grid or non-finite query.
    pub fn nearest(&self, lat: f64, lon: f64) -> Option<CellMatch> {
        if self.nodes.is_empty() || !lat.is_finite() || !lon.is_finite() {
            return None;
        }

        let mut best = (f64::INFINITY, usize::MAX);
        self.nearest_recursive(0, [lat, lon], &mut best);

        let (dist_sq, flat_index) = best;
        Some(CellMatch {
            flat_index,
            lat_index: flat_index / self.n_lon,
            lon_index: flat_index % self.n_lon,
            distance: dist_sq.sqrt(),
        })
    }

    fn nearest_recursive(&self, node_idx: usize, q: [f64; 2], best: &mut (f64, usize)) {
        let node = &self.nodes[node_idx];
        let p = self.points[node.point];

        let d0 = q[0] - p[0];
        let d1 = q[1] - p[1];
        let dist_sq = d0 * d0 + d1 * d1;

        if dist_sq < best.0 || (dist_sq == best.0 && node.point < best.1) {
            *best = (dist_sq, node.point);
        }

        let diff = q[node.axis] - p[node.axis];
        let (near, far) = if diff < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };

        if let Some(child) = near {
            self.nearest_recursive(child, q, best);
        }

        // `<=` so that equidistant cells across the split are still visited.
        if diff * diff <= best.0 {
            if let Some(child) = far {
                self.nearest_recursive(child, q, best);
            }
        }
    }
}

fn build_recursive(
    points: &[[f64; 2]],
    order: &mut [usize],
    depth: usize,
    nodes: &mut Vec<Node>,
) -> usize {
    let axis = depth % 2;
    order.sort_by(|&a, &b| points[a][axis].total_cmp(&points[b][axis]));

    let median = order.len() / 2;
    let node_idx = nodes.len();
    nodes.push(Node {
        point: order[median],
        axis,
        left: None,
        right: None,
    });

    let (lower, rest) = order.split_at_mut(median);
    let upper = &mut rest[1..];

    if !lower.is_empty() {
        let left = build_recursive(points, lower, depth + 1, nodes);
        nodes[node_idx].left = Some(left);
    }
    if !upper.is_empty() {
        let right = build_recursive(points, upper, depth + 1, nodes);
        nodes[node_idx].right = Some(right);
    }

    node_idx
}
