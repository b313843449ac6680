// Property-Based Tests for Streaming Algorithm Mergeability
// For every way of splitting a finite sequence into two sub-streams, merging
// the two partial accumulators must reproduce the single-pass result within
// floating-point tolerance.

use loadstats::{
    DegradationComputation, IncrementComputation, MaxComputation, MeanComputation, MinComputation,
    PercentileComputation, StdDevComputation, StreamingAlgorithm,
};
use proptest::prelude::*;

// Custom strategies for generating test data
mod strategies {
    use super::*;

    // Durations in a realistic range, away from float extremes
    pub fn durations() -> impl Strategy<Value = Vec<f64>> {
        prop::collection::vec(0.001f64..10_000.0, 1..200)
    }

    // A sequence plus a split point inside it
    pub fn durations_with_split() -> impl Strategy<Value = (Vec<f64>, usize)> {
        durations().prop_flat_map(|values| {
            let len = values.len();
            (Just(values), 0..=len)
        })
    }
}

fn feed<A: StreamingAlgorithm>(algo: &mut A, values: &[f64]) {
    for &value in values {
        algo.add(value).unwrap();
    }
}

/// Relative tolerance comparison for merged-vs-single-pass results.
fn close(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance * (1.0 + a.abs().max(b.abs()))
}

macro_rules! partition_property {
    ($name:ident, $algo:ty, $tolerance:expr) => {
        proptest! {
            #[test]
            fn $name((values, split) in strategies::durations_with_split()) {
                let mut whole = <$algo>::default();
                feed(&mut whole, &values);

                let mut left = <$algo>::default();
                let mut right = <$algo>::default();
                feed(&mut left, &values[..split]);
                feed(&mut right, &values[split..]);
                left.merge(&right).unwrap();

                match (left.result(), whole.result()) {
                    (Some(merged), Some(single)) => {
                        prop_assert!(
                            close(merged, single, $tolerance),
                            "merged {} != single-pass {}",
                            merged,
                            single
                        );
                    }
                    (merged, single) => prop_assert_eq!(merged, single),
                }
            }
        }
    };
}

partition_property!(mean_partition_merge, MeanComputation, 1e-9);
partition_property!(stddev_partition_merge, StdDevComputation, 1e-6);
partition_property!(min_partition_merge, MinComputation, 0.0);
partition_property!(max_partition_merge, MaxComputation, 0.0);
partition_property!(increment_partition_merge, IncrementComputation, 0.0);
partition_property!(degradation_partition_merge, DegradationComputation, 1e-9);

proptest! {
    // Merge must also be associative: ((a + b) + c) == (a + (b + c)).
    #[test]
    fn stddev_merge_is_associative(
        a in strategies::durations(),
        b in strategies::durations(),
        c in strategies::durations(),
    ) {
        let make = |values: &[f64]| {
            let mut algo = StdDevComputation::default();
            feed(&mut algo, values);
            algo
        };

        let mut left_first = make(&a);
        left_first.merge(&make(&b)).unwrap();
        left_first.merge(&make(&c)).unwrap();

        let mut right_first = make(&b);
        right_first.merge(&make(&c)).unwrap();
        let mut outer = make(&a);
        outer.merge(&right_first).unwrap();

        match (left_first.result(), outer.result()) {
            (Some(x), Some(y)) => prop_assert!(close(x, y, 1e-6), "{} != {}", x, y),
            (x, y) => prop_assert_eq!(x, y),
        }
    }

    // Without compression, the streaming percentile is exact for every rank.
    #[test]
    fn percentile_exact_without_compression(
        values in prop::collection::vec(0.001f64..10_000.0, 1..500),
        percent in 0.01f64..0.99,
    ) {
        let mut computation = PercentileComputation::new(percent, values.len()).unwrap();
        feed(&mut computation, &values);

        let mut sorted = values.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let k = (sorted.len() - 1) as f64 * percent;
        let (floor, ceil) = (k.floor(), k.ceil());
        let expected = if floor == ceil {
            sorted[k as usize]
        } else {
            sorted[floor as usize] * (ceil - k) + sorted[ceil as usize] * (k - floor)
        };

        let result = computation.result().unwrap();
        prop_assert!(close(result, expected, 1e-12), "{} != {}", result, expected);
    }

    // Feeding a declared-size stream always succeeds and the zipped series
    // never exceeds its target size.
    #[test]
    fn zipper_respects_declared_sizes(
        values in prop::collection::vec(-1000.0f64..1000.0, 1..300),
        zipped_size in 1usize..50,
    ) {
        let mut zipper = loadstats::GraphZipper::new(values.len(), zipped_size).unwrap();
        for &value in &values {
            zipper.add_point(value).unwrap();
        }
        prop_assert!(zipper.get_zipped_graph().len() <= zipped_size);
        prop_assert!(zipper.add_point(0.0).is_err());
    }
}
