use super::{PredicateOp, QueryError, QueryResult};

/// Equi-width histogram over an INT column
///
/// Values outside `[min, max]` are ignored. Bucket `i` covers
/// `[min + i * width, min + (i + 1) * width)`, where `width` is
/// `(max - min + 1) / buckets` rounded down (at least 1). The last bucket
/// also absorbs any remainder of the range.
#[derive(Debug, Clone)]
pub struct ColumnStats {
    min: i32,
    max: i32,
    width: i64,
    buckets: Vec<usize>,
    total: usize,
}

impl ColumnStats {
    pub fn new(buckets: usize, min: i32, max: i32) -> QueryResult<Self> {
        if buckets == 0 {
            return Err(QueryError::InvalidHistogram(
                "bucket count must be positive".to_string(),
            ));
        }
        if min > max {
            return Err(QueryError::InvalidHistogram(format!(
                "min {} is greater than max {}",
                min, max
            )));
        }

        let span = i64::from(max) - i64::from(min) + 1;
        let width = (span / buckets as i64).max(1);

        Ok(Self {
            min,
            max,
            width,
            buckets: vec![0; buckets],
            total: 0,
        })
    }

    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    pub fn bucket_width(&self) -> i64 {
        self.width
    }

    /// Number of values recorded so far
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn bucket_counts(&self) -> &[usize] {
        &self.buckets
    }

    pub fn add_value(&mut self, v: i32) {
        if v < self.min || v > self.max {
            return;
        }

        let b = self.bucket_of(v);
        self.buckets[b] += 1;
        self.total += 1;
    }

    fn bucket_of(&self, v: i32) -> usize {
        let b = ((i64::from(v) - i64::from(self.min)) / self.width) as usize;
        b.min(self.buckets.len() - 1)
    }

    /// Estimated number of recorded values `x` with `x op v`
    pub fn estimate_cardinality(&self, op: PredicateOp, v: i32) -> usize {
        if self.total == 0 {
            return 0;
        }

        if v < self.min {
            return match op {
                PredicateOp::Lt | PredicateOp::Le | PredicateOp::Eq => 0,
                _ => self.total,
            };
        }
        if v > self.max {
            return match op {
                PredicateOp::Gt | PredicateOp::Ge | PredicateOp::Eq => 0,
                _ => self.total,
            };
        }

        let b = self.bucket_of(v);
        let height = self.buckets[b];
        let left = i64::from(self.min) + b as i64 * self.width;
        let right = left + self.width;
        let x = i64::from(v);

        // Share of the bucket height for `offset` of `width` values, never negative
        let portion = |offset: i64| -> usize {
            if offset <= 0 {
                return 0;
            }
            (height as f64 * offset as f64 / self.width as f64) as usize
        };
        let below: usize = self.buckets[..b].iter().sum();
        let above: usize = self.buckets[b + 1..].iter().sum();

        match op {
            PredicateOp::Eq => height / self.width as usize,
            PredicateOp::Ne => self.total - self.estimate_cardinality(PredicateOp::Eq, v),
            PredicateOp::Lt => below + portion(x - left),
            PredicateOp::Le => below + portion(x - left + 1),
            PredicateOp::Gt => portion(right - x - 1) + above,
            PredicateOp::Ge => portion(right - x) + above,
        }
    }
}
