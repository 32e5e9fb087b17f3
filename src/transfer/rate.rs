// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Transfer rate over a sliding time window.
#[derive(Debug)]
pub struct RateMeter {
    window: Duration,
    samples: VecDeque<(Instant, u64)>,
}

impl RateMeter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
        }
    }

    /// Record the cumulative byte count at `now` and return bytes/second.
    pub fn record(&mut self, now: Instant, transferred: u64) -> f64 {
        self.samples.push_back((now, transferred));
        // Keep one sample at or beyond the window edge as the baseline.
        while self.samples.len() > 2
            && now.duration_since(self.samples[1].0) >= self.window
        {
            self.samples.pop_front();
        }
        self.rate()
    }

    pub fn rate(&self) -> f64 {
        let (Some(&(start, first)), Some(&(end, last))) = (self.samples.front(), self.samples.back())
        else {
            return 0.0;
        };
        let elapsed = end.duration_since(start).as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        last.saturating_sub(first) as f64 / elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_single_sample() {
        let mut meter = RateMeter::new(Duration::from_secs(2));
        assert_eq!(meter.record(Instant::now(), 100), 0.0);
    }

    #[test]
    fn test_rate_over_window() {
        let start = Instant::now();
        let mut meter = RateMeter::new(Duration::from_secs(2));
        meter.record(start, 0);
        let rate = meter.record(start + Duration::from_secs(1), 1000);
        assert!((rate - 1000.0).abs() < 1e-6);

        // Old samples fall out of the window.
        meter.record(start + Duration::from_secs(2), 2000);
        meter.record(start + Duration::from_secs(4), 2000);
        let rate = meter.record(start + Duration::from_secs(5), 2000);
        assert!(rate < 1000.0);
        assert!((rate - 0.0).abs() < 1e-6);
    }
}
