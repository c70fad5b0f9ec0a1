//! Static k-d tree supporting nearest-neighbour queries under the
//! Euclidean metric
//!
//! The tree is stored implicitly: `order` is a permutation of point indices
//! where the median of every sub-slice is the splitting node, and the two
//! halves on either side of it are its subtrees.

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Neighbour {
    /// Index of the point in the slice the tree was built from
    pub index: usize,
    /// Euclidean distance to the query
    pub distance: f64,
}

pub struct KdTree {
    dims: usize,
    /// Row-major point coordinates, `dims` values per point
    points: Vec<f64>,
    order: Vec<usize>,
}

impl KdTree {
    /// Build a tree from points of dimensionality `dims`.
    ///
    /// # Panics
    ///
    /// * Panics if any point does not have exactly `dims` coordinates
    pub fn new(points: &[Vec<f64>], dims: usize) -> Self {
        let mut flat = Vec::with_capacity(points.len() * dims);
        for point in points {
            assert_eq!(point.len(), dims, "point does not have {} dimensions", dims);
            flat.extend_from_slice(point);
        }

        let mut tree = KdTree {
            dims,
            points: flat,
            order: (0..points.len()).collect(),
        };
        if dims > 0 {
            tree.build(0, tree.order.len(), 0);
        }
        tree
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn coord(&self, point: usize, axis: usize) -> f64 {
        self.points[point * self.dims + axis]
    }

    fn point(&self, point: usize) -> &[f64] {
        &self.points[point * self.dims..(point + 1) * self.dims]
    }

    fn build(&mut self, lo: usize, hi: usize, depth: usize) {
        if hi - lo <= 1 {
            return;
        }
        let axis = depth % self.dims;
        let mid = lo + (hi - lo) / 2;

        let (dims, points) = (self.dims, &self.points);
        self.order[lo..hi].select_nth_unstable_by(mid - lo, |a, b| {
            points[a * dims + axis].total_cmp(&points[b * dims + axis])
        });

        self.build(lo, mid, depth + 1);
        self.build(mid + 1, hi, depth + 1);
    }

    /// Find the point closest to `query`. Ties are broken towards the lower
    /// point index. Points with non-finite coordinates are never returned.
    pub fn nearest(&self, query: &[f64]) -> Option<Neighbour> {
        assert_eq!(
            query.len(),
            self.dims,
            "query does not have {} dimensions",
            self.dims
        );
        if query.iter().any(|x| !x.is_finite()) {
            return None;
        }

        let mut best: Option<(usize, f64)> = None;
        self.search(query, 0, self.order.len(), 0, &mut best);
        best.map(|(index, dist2)| Neighbour {
            index,
            distance: dist2.sqrt(),
        })
    }

    fn search(
        &self,
        query: &[f64],
        lo: usize,
        hi: usize,
        depth: usize,
        best: &mut Option<(usize, f64)>,
    ) {
        if lo >= hi {
            return;
        }
        let axis = depth % self.dims;
        let mid = lo + (hi - lo) / 2;
        let node = self.order[mid];

        let dist2 = self
            .point(node)
            .iter()
            .zip(query)
            .fold(0.0, |acc, (p, q)| acc + (p - q).powi(2));

        let better = match *best {
            None => dist2.is_finite(),
            Some((index, d)) => dist2 < d || (dist2 == d && node < index),
        };
        if better {
            *best = Some((node, dist2));
        }

        let diff = query[axis] - self.coord(node, axis);
        let (near, far) = if diff < 0.0 {
            ((lo, mid), (mid + 1, hi))
        } else {
            ((mid + 1, hi), (lo, mid))
        };

        self.search(query, near.0, near.1, depth + 1, best);

        // The far side can only hold a closer point if the splitting plane
        // is within the current best radius. A non-finite difference says
        // nothing about the plane, so both sides are searched.
        let visit_far = match *best {
            None => true,
            Some((_, d)) => !diff.is_finite() || diff.powi(2) <= d,
        };
        if visit_far {
            self.search(query, far.0, far.1, depth + 1, best);
        }
    }
}
