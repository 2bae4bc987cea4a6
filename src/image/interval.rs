//! Axis-aligned integer intervals.

/// An N-dimensional axis-aligned box with inclusive bounds.
///
/// Positions are iterated with dimension 0 varying fastest, which is also
/// the memory order of [`super::Image`] buffers and cell data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Interval {
    min: Vec<i64>,
    max: Vec<i64>,
}

impl Interval {
    /// Create an interval from inclusive bounds.
    ///
    /// # Panics
    /// Panics if the bound vectors differ in length or `max < min - 1` in any
    /// dimension.
    pub fn new(min: Vec<i64>, max: Vec<i64>) -> Self {
        assert_eq!(min.len(), max.len(), "interval bounds differ in length");
        assert!(
            min.iter().zip(&max).all(|(lo, hi)| *hi >= *lo - 1),
            "interval max below min"
        );
        Self { min, max }
    }

    /// Interval starting at the origin with the given extents.
    pub fn from_dimensions(dimensions: &[usize]) -> Self {
        Self {
            min: vec![0; dimensions.len()],
            max: dimensions.iter().map(|&d| d as i64 - 1).collect(),
        }
    }

    pub fn num_dimensions(&self) -> usize {
        self.min.len()
    }

    pub fn min(&self) -> &[i64] {
        &self.min
    }

    pub fn max(&self) -> &[i64] {
        &self.max
    }

    /// Extent of dimension `d`.
    pub fn dimension(&self, d: usize) -> usize {
        (self.max[d] - self.min[d] + 1) as usize
    }

    pub fn dimensions(&self) -> Vec<usize> {
        (0..self.num_dimensions()).map(|d| self.dimension(d)).collect()
    }

    /// Number of positions inside the interval.
    pub fn volume(&self) -> usize {
        (0..self.num_dimensions()).map(|d| self.dimension(d)).product()
    }

    pub fn is_empty(&self) -> bool {
        self.volume() == 0
    }

    pub fn contains(&self, position: &[i64]) -> bool {
        position.len() == self.num_dimensions()
            && position
                .iter()
                .zip(self.min.iter().zip(&self.max))
                .all(|(p, (lo, hi))| p >= lo && p <= hi)
    }

    /// Intersection of two intervals, `None` when they do not overlap.
    pub fn intersect(&self, other: &Interval) -> Option<Interval> {
        if self.num_dimensions() != other.num_dimensions() {
            return None;
        }
        let min: Vec<i64> = self.min.iter().zip(&other.min).map(|(a, b)| *a.max(b)).collect();
        let max: Vec<i64> = self.max.iter().zip(&other.max).map(|(a, b)| *a.min(b)).collect();
        if min.iter().zip(&max).any(|(lo, hi)| lo > hi) {
            return None;
        }
        Some(Interval { min, max })
    }

    /// Drop the last dimension.
    pub fn drop_last(&self) -> Interval {
        let n = self.num_dimensions().saturating_sub(1);
        Interval {
            min: self.min[..n].to_vec(),
            max: self.max[..n].to_vec(),
        }
    }

    /// Offset of `position` within this interval in dimension-0-fastest order.
    ///
    /// The caller guarantees that the position is contained.
    pub fn offset_of(&self, position: &[i64]) -> usize {
        let mut offset = 0usize;
        let mut stride = 1usize;
        for d in 0..self.num_dimensions() {
            offset += (position[d] - self.min[d]) as usize * stride;
            stride *= self.dimension(d);
        }
        offset
    }

    /// Iterate all positions, dimension 0 fastest.
    pub fn positions(&self) -> Positions<'_> {
        Positions {
            interval: self,
            next: if self.is_empty() {
                None
            } else {
                Some(self.min.clone())
            },
        }
    }
}

/// Iterator over the positions of an [`Interval`].
pub struct Positions<'a> {
    interval: &'a Interval,
    next: Option<Vec<i64>>,
}

impl Iterator for Positions<'_> {
    type Item = Vec<i64>;

    fn next(&mut self) -> Option<Vec<i64>> {
        let current = self.next.take()?;
        let mut successor = current.clone();
        for d in 0..successor.len() {
            if successor[d] < self.interval.max[d] {
                successor[d] += 1;
                self.next = Some(successor);
                return Some(current);
            }
            successor[d] = self.interval.min[d];
        }
        // Zero-dimensional intervals hold exactly one (empty) position.
        Some(current)
    }
}
