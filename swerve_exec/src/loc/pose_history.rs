//! Time-ordered history of odometry poses

use std::collections::VecDeque;

use super::Pose;

/// A buffer of timestamped poses covering the last `window_s` seconds.
///
/// Used to look up where odometry thought the robot was when a delayed vision
/// measurement was captured.
#[derive(Debug, Clone)]
pub struct PoseHistory {
    window_s: f64,
    samples: VecDeque<(f64, Pose)>,
}

impl PoseHistory {
    pub fn new(window_s: f64) -> Self {
        Self {
            window_s,
            samples: VecDeque::new(),
        }
    }

    /// Record a pose, discarding samples which have aged out of the window.
    ///
    /// Samples at or after `time_s` are replaced, so the buffer is always
    /// strictly ordered.
    pub fn add(&mut self, time_s: f64, pose: Pose) {
        while matches!(self.samples.back(), Some((t, _)) if *t >= time_s) {
            self.samples.pop_back();
        }

        while matches!(self.samples.front(), Some((t, _)) if *t < time_s - self.window_s) {
            self.samples.pop_front();
        }

        self.samples.push_back((time_s, pose));
    }

    /// The pose at `time_s`, interpolated between the neighbouring samples.
    ///
    /// Times outside the buffered range are clamped to its ends. Returns
    /// `None` if the buffer is empty or `time_s` is not finite.
    pub fn sample(&self, time_s: f64) -> Option<Pose> {
        if !time_s.is_finite() {
            return None;
        }

        let (first_t, first) = *self.samples.front()?;
        let (last_t, last) = *self.samples.back()?;

        if time_s <= first_t {
            return Some(first);
        }
        if time_s >= last_t {
            return Some(last);
        }

        // First sample strictly after time_s, guaranteed to be > 0 here
        let upper = self.samples.partition_point(|(t, _)| *t <= time_s);
        let (t0, p0) = self.samples[upper - 1];
        let (t1, p1) = self.samples[upper];

        Some(p0.interpolate(&p1, (time_s - t0) / (t1 - t0)))
    }

    pub fn first_time_s(&self) -> Option<f64> {
        self.samples.front().map(|(t, _)| *t)
    }

    pub fn last_time_s(&self) -> Option<f64> {
        self.samples.back().map(|(t, _)| *t)
    }

    pub fn window_s(&self) -> f64 {
        self.window_s
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
