//! # Speed statistics

use crate::motion_field::MagnitudeField;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Summary of the foreground motion of a clip, in pixels per sampled frame.
///
/// All values are zero when no motion was observed.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpeedStats {
    pub max_speed: f32,
    pub min_speed: f32,
    pub avg_speed: f32,
    /// Number of strictly positive magnitudes the statistics were computed over.
    pub samples: usize,
}

/// Online reduction of masked magnitude fields.
#[derive(Clone, Debug, Default)]
pub struct MotionAggregator {
    max: f32,
    min: f32,
    sum: f64,
    count: usize,
}

impl MotionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate the strictly positive values of a field.
    pub fn add(&mut self, field: &MagnitudeField) {
        for v in field.positive() {
            if self.count == 0 {
                self.max = v;
                self.min = v;
            } else {
                self.max = self.max.max(v);
                self.min = self.min.min(v);
            }
            self.sum += v as f64;
            self.count += 1;
        }
    }

    /// Reduce the accumulated values.
    pub fn finish(&self) -> SpeedStats {
        if self.count == 0 {
            return SpeedStats::default();
        }

        let avg = (self.sum / self.count as f64) as f32;

        SpeedStats {
            max_speed: self.max,
            min_speed: self.min,
            // Summation error must not push the mean out of range.
            avg_speed: avg.clamp(self.min, self.max),
            samples: self.count,
        }
    }
}

impl<'a> Extend<&'a MagnitudeField> for MotionAggregator {
    fn extend<T: IntoIterator<Item = &'a MagnitudeField>>(&mut self, iter: T) {
        iter.into_iter().for_each(|f| self.add(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion_field::FlowField;
    use assert_approx_eq::assert_approx_eq;

    fn field(values: &[f32]) -> MagnitudeField {
        FlowField::from_components(values.len(), values, &vec![0.0; values.len()]).magnitudes()
    }

    #[test]
    fn empty_is_zero() {
        let agg = MotionAggregator::new();
        assert_eq!(agg.finish(), SpeedStats::default());

        let mut agg = MotionAggregator::new();
        agg.add(&MagnitudeField::zeros(4, 4));
        assert_eq!(agg.finish(), SpeedStats::default());
    }

    #[test]
    fn reduces_across_fields() {
        let mut agg = MotionAggregator::new();
        agg.extend([&field(&[0.0, 1.0, 3.0]), &field(&[-2.0, 0.0, 0.0])]);

        let stats = agg.finish();
        assert_eq!(stats.samples, 3);
        assert_approx_eq!(stats.max_speed, 3.0);
        assert_approx_eq!(stats.min_speed, 1.0);
        assert_approx_eq!(stats.avg_speed, 2.0);
    }

    #[test]
    fn single_value() {
        let mut agg = MotionAggregator::new();
        agg.add(&field(&[0.1]));

        let stats = agg.finish();
        assert_eq!(stats.max_speed, stats.min_speed);
        assert_eq!(stats.avg_speed, stats.min_speed);
    }

    #[test]
    fn ordering_holds() {
        let mut agg = MotionAggregator::new();
        let values = (1..1000).map(|i| 0.1 + i as f32 * 1e-7).collect::<Vec<_>>();
        agg.add(&field(&values));

        let stats = agg.finish();
        assert!(stats.min_speed <= stats.avg_speed);
        assert!(stats.avg_speed <= stats.max_speed);
    }
}
