//! Ramp schedules and the arrival times they imply
//!
//! A schedule is a piecewise-linear level over elapsed time. For the open
//! model the level is an arrival rate, and the k-th arrival is placed at the
//! first instant where the integral of the rate reaches k. Each stage's
//! integral is a quadratic, so the inversion is closed-form and the number of
//! arrivals in any interval stays within one of the integral over it.

use std::time::Duration;
use volley_config::{ExecutorKind, ScenarioConfig, StageConfig};

const EPSILON: f64 = 1e-9;

/// One linear ramp, in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
struct Segment {
    start: f64,
    duration: f64,
    from: f64,
    to: f64,
    /// Integral of all earlier segments
    before: f64,
}

impl Segment {
    fn end(&self) -> f64 {
        self.start + self.duration
    }

    fn slope(&self) -> f64 {
        (self.to - self.from) / self.duration
    }

    fn level_at(&self, offset: f64) -> f64 {
        self.from + self.slope() * offset
    }

    /// Integral from the segment start to `offset`
    fn area_until(&self, offset: f64) -> f64 {
        self.from * offset + self.slope() * offset * offset / 2.0
    }

    fn area(&self) -> f64 {
        (self.from + self.to) * self.duration / 2.0
    }

    /// Smallest offset whose integral equals `x`. Solves
    /// `a·τ² + b·τ = x` with `a = slope/2`, `b = from`, in the form that
    /// stays stable when `a` is close to zero.
    fn offset_for_area(&self, x: f64) -> f64 {
        if x <= 0.0 {
            return 0.0;
        }
        let a = self.slope() / 2.0;
        let b = self.from;
        let discriminant = (b * b + 4.0 * a * x).max(0.0);
        let denominator = b + discriminant.sqrt();
        if denominator <= f64::EPSILON {
            return 0.0;
        }
        (2.0 * x / denominator).clamp(0.0, self.duration)
    }
}

/// Piecewise-linear level over elapsed time
#[derive(Debug, Clone, PartialEq)]
pub struct RampSchedule {
    segments: Vec<Segment>,
    initial: f64,
    last: f64,
}

impl RampSchedule {
    /// Ramp from `start` through each stage's target. Zero-duration stages
    /// are step changes: the next stage ramps from their target.
    pub fn new(start: f64, stages: &[StageConfig]) -> Self {
        let mut segments = Vec::with_capacity(stages.len());
        let mut level = start;
        let mut elapsed = 0.0;
        let mut area = 0.0;

        for stage in stages {
            let duration = stage.duration.as_secs_f64();
            if duration > 0.0 {
                let segment = Segment {
                    start: elapsed,
                    duration,
                    from: level,
                    to: stage.target,
                    before: area,
                };
                area += segment.area();
                elapsed = segment.end();
                segments.push(segment);
            }
            level = stage.target;
        }

        Self {
            segments,
            initial: start,
            last: level,
        }
    }

    /// Same shape with every level multiplied by `factor`
    pub fn scaled(&self, factor: f64) -> Self {
        let mut scaled = self.clone();
        for segment in &mut scaled.segments {
            segment.from *= factor;
            segment.to *= factor;
            segment.before *= factor;
        }
        scaled.initial *= factor;
        scaled.last *= factor;
        scaled
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs())
    }

    fn duration_secs(&self) -> f64 {
        self.segments.last().map(Segment::end).unwrap_or(0.0)
    }

    /// Interpolated level at `elapsed`; the final target holds afterwards
    pub fn level_at(&self, elapsed: Duration) -> f64 {
        let t = elapsed.as_secs_f64();
        match self.segments.iter().find(|s| t < s.end()) {
            Some(segment) if t >= segment.start => segment.level_at(t - segment.start),
            Some(_) => self.initial,
            None => self.last,
        }
    }

    /// Integral of the level over `[0, elapsed]`, clamped to the schedule
    pub fn cumulative(&self, elapsed: Duration) -> f64 {
        let t = elapsed.as_secs_f64();
        for segment in &self.segments {
            if t < segment.end() {
                return segment.before + segment.area_until((t - segment.start).max(0.0));
            }
        }
        self.total()
    }

    /// Integral over the whole schedule
    pub fn total(&self) -> f64 {
        self.segments
            .last()
            .map(|s| s.before + s.area())
            .unwrap_or(0.0)
    }

    /// First instant at which the integral reaches `area`
    pub fn time_of(&self, area: f64) -> Option<Duration> {
        if area <= 0.0 {
            return Some(Duration::ZERO);
        }
        self.segments
            .iter()
            .find(|s| area <= s.before + s.area() + EPSILON)
            .map(|s| {
                let offset = s.offset_for_area(area - s.before);
                Duration::from_secs_f64(s.start + offset)
            })
    }
}

/// Arrival times for an open-model scenario
#[derive(Debug, Clone, PartialEq)]
pub struct ArrivalPlan {
    /// Arrivals per second
    rate: RampSchedule,
}

impl ArrivalPlan {
    /// Targets are arrivals per `time_unit`
    pub fn new(start: f64, stages: &[StageConfig], time_unit: Duration) -> Self {
        let per_second = 1.0 / time_unit.as_secs_f64().max(f64::EPSILON);
        Self {
            rate: RampSchedule::new(start, stages).scaled(per_second),
        }
    }

    pub fn for_scenario(scenario: &ScenarioConfig) -> Self {
        let (start, stages) = scenario.schedule();
        Self::new(start, &stages, scenario.time_unit)
    }

    pub fn duration(&self) -> Duration {
        self.rate.duration()
    }

    /// Instantaneous arrivals per second
    pub fn rate_at(&self, elapsed: Duration) -> f64 {
        self.rate.level_at(elapsed)
    }

    /// Arrivals the schedule asks for between two instants
    pub fn expected_between(&self, from: Duration, to: Duration) -> f64 {
        self.rate.cumulative(to) - self.rate.cumulative(from)
    }

    /// Total arrivals over the schedule
    pub fn expected_total(&self) -> u64 {
        (self.rate.total() + EPSILON).floor() as u64
    }

    /// Offsets from the scenario start, in order
    pub fn arrivals(&self) -> Arrivals<'_> {
        Arrivals {
            rate: &self.rate,
            next: 0,
            limit: self.expected_total(),
        }
    }
}

/// Iterator over arrival offsets
#[derive(Debug, Clone)]
pub struct Arrivals<'a> {
    rate: &'a RampSchedule,
    next: u64,
    limit: u64,
}

impl Iterator for Arrivals<'_> {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.next >= self.limit {
            return None;
        }
        self.next += 1;
        self.rate.time_of(self.next as f64)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.limit - self.next) as usize;
        (remaining, Some(remaining))
    }
}

/// Desired virtual user count over time for a closed-model scenario
#[derive(Debug, Clone, PartialEq)]
pub struct VuPlan {
    level: RampSchedule,
    max: usize,
}

impl VuPlan {
    pub fn new(start: f64, stages: &[StageConfig], max: usize) -> Self {
        Self {
            level: RampSchedule::new(start, stages),
            max,
        }
    }

    pub fn for_scenario(scenario: &ScenarioConfig) -> Self {
        debug_assert_eq!(scenario.executor, ExecutorKind::ClosedVuCount);
        let (start, stages) = scenario.schedule();
        Self::new(start, &stages, scenario.max_workers())
    }

    pub fn duration(&self) -> Duration {
        self.level.duration()
    }

    /// Interpolated VU count rounded to the nearest whole user, capped at `max`
    pub fn vus_at(&self, elapsed: Duration) -> usize {
        let level = self.level.level_at(elapsed).max(0.0).round() as usize;
        level.min(self.max)
    }
}
