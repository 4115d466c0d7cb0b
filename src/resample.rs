// NRTRACE: Post-Processing of 5G NR Simulation Traces into Diagnostic Charts
// Copyright (C) 2025 The NRTRACE authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//! Time-bucketed aggregation of trace samples.
//!
//! Samples are `(time, value)` pairs with the time in seconds. Times are converted to integer
//! nanoseconds before bucketing, so bucket boundaries do not suffer from floating point rounding.
//! Buckets are aligned to multiples of the period, starting at time zero.
use std::collections::BTreeMap;

const NANOS_PER_SEC: f64 = 1e9;

/// How samples inside a bucket are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Mean,
    Sum,
    Max,
}

/// One resampled bucket. Empty buckets have no value, except for sums which are zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket {
    /// start of the bucket in seconds
    pub start: f64,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    sum: f64,
    count: usize,
    max: f64,
}

impl Accumulator {
    fn push(&mut self, value: f64) {
        if self.count == 0 || value > self.max {
            self.max = value;
        }
        self.sum += value;
        self.count += 1;
    }

    fn value(&self, aggregation: Aggregation) -> Option<f64> {
        match aggregation {
            Aggregation::Sum => Some(self.sum),
            _ if self.count == 0 => None,
            Aggregation::Mean => Some(self.sum / self.count as f64),
            Aggregation::Max => Some(self.max),
        }
    }
}

fn to_nanos(time: f64) -> i64 {
    (time * NANOS_PER_SEC).round() as i64
}

/// Groups samples into fixed-size time buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resampler {
    period_ns: i64,
}

impl Resampler {
    pub fn from_millis(period_ms: u64) -> Self {
        Self {
            period_ns: (period_ms.max(1) * 1_000_000) as i64,
        }
    }

    /// Length of a bucket in seconds.
    pub fn period(&self) -> f64 {
        self.period_ns as f64 / NANOS_PER_SEC
    }

    fn bucket_of(&self, time: f64) -> i64 {
        to_nanos(time).div_euclid(self.period_ns)
    }

    fn bucket_start(&self, bucket: i64) -> f64 {
        (bucket * self.period_ns) as f64 / NANOS_PER_SEC
    }

    /// Aggregate the samples per bucket. The result covers every bucket between the first and the
    /// last sample, including empty ones.
    pub fn resample(
        &self,
        samples: impl IntoIterator<Item = (f64, f64)>,
        aggregation: Aggregation,
    ) -> Vec<Bucket> {
        let mut buckets: BTreeMap<i64, Accumulator> = BTreeMap::new();
        for (time, value) in samples {
            buckets.entry(self.bucket_of(time)).or_default().push(value);
        }

        let (Some(first), Some(last)) = (
            buckets.keys().next().copied(),
            buckets.keys().next_back().copied(),
        ) else {
            return Vec::new();
        };

        (first..=last)
            .map(|bucket| Bucket {
                start: self.bucket_start(bucket),
                value: buckets
                    .get(&bucket)
                    .copied()
                    .unwrap_or_default()
                    .value(aggregation),
            })
            .collect()
    }

    /// Throughput in Mb/s per bucket from the number of bytes in each bucket.
    pub fn throughput(&self, samples: impl IntoIterator<Item = (f64, f64)>) -> Vec<(f64, f64)> {
        let period = self.period();
        self.resample(samples, Aggregation::Sum)
            .into_iter()
            .map(|bucket| (bucket.start, bucket.value.unwrap_or(0.0) * 8.0 / period / 1e6))
            .collect()
    }
}

/// Split records into `(time, value)` series per key.
pub fn group_by_key<T, K, F, G>(records: &[T], key: F, sample: G) -> BTreeMap<K, Vec<(f64, f64)>>
where
    K: Ord,
    F: Fn(&T) -> K,
    G: Fn(&T) -> (f64, f64),
{
    let mut groups: BTreeMap<K, Vec<(f64, f64)>> = BTreeMap::new();
    for record in records {
        groups.entry(key(record)).or_default().push(sample(record));
    }
    groups
}

/// Average all samples sharing the exact same timestamp. The result is sorted by time.
pub fn mean_per_instant(samples: impl IntoIterator<Item = (f64, f64)>) -> Vec<(f64, f64)> {
    let mut instants: BTreeMap<i64, Accumulator> = BTreeMap::new();
    for (time, value) in samples {
        instants.entry(to_nanos(time)).or_default().push(value);
    }
    instants
        .into_iter()
        .filter_map(|(nanos, acc)| {
            acc.value(Aggregation::Mean)
                .map(|value| (nanos as f64 / NANOS_PER_SEC, value))
        })
        .collect()
}

/// Split a series into `(times, values)`, dropping empty buckets.
pub fn unzip_buckets(buckets: &[Bucket]) -> (Vec<f64>, Vec<f64>) {
    buckets
        .iter()
        .filter_map(|b| b.value.map(|v| (b.start, v)))
        .unzip()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_input() {
        let resampler = Resampler::from_millis(100);
        assert!(resampler.resample(vec![], Aggregation::Mean).is_empty());
        assert!(resampler.throughput(vec![]).is_empty());
    }

    #[test]
    fn buckets_are_aligned() {
        let resampler = Resampler::from_millis(100);
        // 0.3 / 0.1 is slightly below 3 in floating point
        let buckets = resampler.resample(vec![(0.3, 1.0), (0.35, 3.0)], Aggregation::Mean);
        assert_eq!(
            buckets,
            vec![Bucket {
                start: 0.3,
                value: Some(2.0)
            }]
        );
    }

    #[test]
    fn gaps_are_filled() {
        let resampler = Resampler::from_millis(100);
        let samples = vec![(0.05, 1.0), (0.07, 5.0), (0.31, 2.0)];

        let sums = resampler.resample(samples.clone(), Aggregation::Sum);
        assert_eq!(
            sums.iter().map(|b| b.value).collect::<Vec<_>>(),
            vec![Some(6.0), Some(0.0), Some(0.0), Some(2.0)]
        );
        assert_eq!(sums[3].start, 0.3);

        let maxima = resampler.resample(samples.clone(), Aggregation::Max);
        assert_eq!(
            maxima.iter().map(|b| b.value).collect::<Vec<_>>(),
            vec![Some(5.0), None, None, Some(2.0)]
        );

        let means = resampler.resample(samples, Aggregation::Mean);
        assert_eq!(unzip_buckets(&means), (vec![0.0, 0.3], vec![3.0, 2.0]));
    }

    #[test]
    fn negative_maximum() {
        let resampler = Resampler::from_millis(10);
        let buckets = resampler.resample(vec![(0.001, -4.0), (0.002, -2.0)], Aggregation::Max);
        assert_eq!(buckets[0].value, Some(-2.0));
    }

    #[test]
    fn throughput_in_mbps() {
        let resampler = Resampler::from_millis(100);
        // 12500 bytes in 100ms are 1 Mb/s
        let thr = resampler.throughput(vec![(1.0, 10_000.0), (1.05, 2_500.0)]);
        assert_eq!(thr.len(), 1);
        assert_eq!(thr[0].0, 1.0);
        assert!((thr[0].1 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn grouping_and_instants() {
        let records = vec![(1u16, 0.1, 1.0), (2, 0.1, 7.0), (1, 0.1, 3.0), (1, 0.2, 4.0)];
        let groups = group_by_key(&records, |r| r.0, |r| (r.1, r.2));
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&2], vec![(0.1, 7.0)]);
        assert_eq!(
            mean_per_instant(groups[&1].clone()),
            vec![(0.1, 2.0), (0.2, 4.0)]
        );
    }
}
