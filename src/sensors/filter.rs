//! Sample smoothing primitives shared by the sensor hub.
//!
//! - [`MovingAverage`]: fixed-size ring buffer mean, used for the
//!   thermistor ADC counts and the power meter channels.
//! - [`OutlierFilter`]: median/MAD gate for the ultrasonic ranger, which
//!   occasionally reports echoes off the tank wall or condensate drops.

/// Ring-buffer running mean over the last `N` samples.
#[derive(Debug, Clone)]
pub struct MovingAverage<const N: usize> {
    ring: [f32; N],
    head: usize,
    count: usize,
}

impl<const N: usize> MovingAverage<N> {
    pub const fn new() -> Self {
        Self {
            ring: [0.0; N],
            head: 0,
            count: 0,
        }
    }

    /// Push a sample and return the updated mean.
    pub fn push(&mut self, value: f32) -> f32 {
        self.ring[self.head] = value;
        self.head = (self.head + 1) % N;
        if self.count < N {
            self.count += 1;
        }
        self.mean().unwrap_or(value)
    }

    pub fn mean(&self) -> Option<f32> {
        if self.count == 0 {
            return None;
        }
        let sum: f32 = self.ring[..self.count].iter().sum();
        Some(sum / self.count as f32)
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.count = 0;
    }
}

impl<const N: usize> Default for MovingAverage<N> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Median / MAD outlier gate
// ---------------------------------------------------------------------------

/// Window of accepted readings the median is computed over.
const OUTLIER_WINDOW: usize = 7;
/// Fewer accepted readings than this and everything passes.
const OUTLIER_MIN_HISTORY: usize = 3;
/// Scale factor turning a MAD into a standard-deviation estimate.
const MAD_SCALE: f32 = 1.4826;
/// Floor on the spread so a perfectly still surface does not reject 1 mm of noise.
const MIN_SPREAD_CM: f32 = 0.5;

/// Rejects readings more than `k` robust deviations from the recent median.
///
/// A level that genuinely jumps (tank drained by hand) would be rejected
/// forever, so after a full window of consecutive rejections the history is
/// discarded and the new reading accepted.
#[derive(Debug, Clone)]
pub struct OutlierFilter {
    accepted: MovingWindow,
    rejected_run: usize,
}

#[derive(Debug, Clone)]
struct MovingWindow {
    buf: [f32; OUTLIER_WINDOW],
    head: usize,
    count: usize,
}

impl OutlierFilter {
    pub const fn new() -> Self {
        Self {
            accepted: MovingWindow {
                buf: [0.0; OUTLIER_WINDOW],
                head: 0,
                count: 0,
            },
            rejected_run: 0,
        }
    }

    /// Gate one reading.  Returns the median of the accepted window including
    /// this reading, or `None` if the reading was rejected.
    pub fn filter(&mut self, value: f32, k: f32) -> Option<f32> {
        if !value.is_finite() {
            return None;
        }

        if self.accepted.count >= OUTLIER_MIN_HISTORY {
            let median = self.accepted.median();
            let spread = (self.accepted.mad(median) * MAD_SCALE).max(MIN_SPREAD_CM);
            if (value - median).abs() > k * spread {
                self.rejected_run += 1;
                if self.rejected_run < OUTLIER_WINDOW {
                    return None;
                }
                self.accepted.count = 0;
                self.accepted.head = 0;
            }
        }

        self.rejected_run = 0;
        self.accepted.push(value);
        Some(self.accepted.median())
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for OutlierFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl MovingWindow {
    fn push(&mut self, value: f32) {
        self.buf[self.head] = value;
        self.head = (self.head + 1) % OUTLIER_WINDOW;
        if self.count < OUTLIER_WINDOW {
            self.count += 1;
        }
    }

    fn median(&self) -> f32 {
        let mut sorted = self.buf;
        median_of(&mut sorted[..self.count])
    }

    fn mad(&self, median: f32) -> f32 {
        let mut dev = [0.0f32; OUTLIER_WINDOW];
        for (d, v) in dev.iter_mut().zip(&self.buf[..self.count]) {
            *d = (v - median).abs();
        }
        median_of(&mut dev[..self.count])
    }
}

fn median_of(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_unstable_by(f32::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_of_partial_window() {
        let mut avg = MovingAverage::<4>::new();
        assert!(avg.mean().is_none());
        avg.push(2.0);
        assert!((avg.push(4.0) - 3.0).abs() < 1e-6);
        assert_eq!(avg.count, 2);
    }

    #[test]
    fn average_drops_oldest_when_full() {
        let mut avg = MovingAverage::<3>::new();
        for v in [1.0, 2.0, 3.0, 10.0] {
            avg.push(v);
        }
        // 2 + 3 + 10
        assert!((avg.mean().unwrap() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn outlier_filter_passes_while_warming_up() {
        let mut f = OutlierFilter::new();
        assert!(f.filter(30.0, 3.5).is_some());
        assert!(f.filter(300.0, 3.5).is_some());
    }

    #[test]
    fn spike_is_rejected() {
        let mut f = OutlierFilter::new();
        for v in [30.0, 30.2, 29.9, 30.1, 30.0] {
            assert!(f.filter(v, 3.5).is_some());
        }
        assert!(f.filter(5.0, 3.5).is_none());
        let m = f.filter(30.1, 3.5).unwrap();
        assert!((m - 30.05).abs() < 0.2);
    }

    #[test]
    fn sustained_jump_is_eventually_accepted() {
        let mut f = OutlierFilter::new();
        for v in [30.0, 30.0, 30.0, 30.0] {
            f.filter(v, 3.5);
        }
        let mut accepted = None;
        for _ in 0..OUTLIER_WINDOW {
            accepted = f.filter(80.0, 3.5);
        }
        assert_eq!(accepted, Some(80.0));
    }

    #[test]
    fn non_finite_rejected() {
        let mut f = OutlierFilter::new();
        assert!(f.filter(f32::NAN, 3.5).is_none());
        assert!(f.filter(f32::INFINITY, 3.5).is_none());
    }
}
