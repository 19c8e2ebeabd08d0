//! Scheduled parameter automation
//!
//! Control-side calls never mutate a value the audio callback is reading;
//! they enqueue automation events (value-at-time or linear-ramp-to-value)
//! against a lane. The callback evaluates the lane per sample, so every
//! parameter change lands as a glitch-free ramp at a deterministic sample
//! time and the control side returns immediately.

use std::collections::VecDeque;

/// One scheduled change to a parameter, timed on the sample clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AutomationEvent {
    /// Jump to `value` once the clock reaches `time`
    SetValueAtTime { value: f32, time: u64 },
    /// Ramp linearly from the previous anchor to `value`, arriving at `time`
    LinearRampToValueAtTime { value: f32, time: u64 },
}

impl AutomationEvent {
    fn time(&self) -> u64 {
        match self {
            AutomationEvent::SetValueAtTime { time, .. } => *time,
            AutomationEvent::LinearRampToValueAtTime { time, .. } => *time,
        }
    }

    fn value(&self) -> f32 {
        match self {
            AutomationEvent::SetValueAtTime { value, .. } => *value,
            AutomationEvent::LinearRampToValueAtTime { value, .. } => *value,
        }
    }
}

/// A single automated parameter with clamped range.
///
/// Written once per update from the control thread, read per sample from
/// the audio callback (under the renderer lock).
#[derive(Debug, Clone)]
pub struct AutomationLane {
    min: f32,
    max: f32,
    current: f32,
    anchor_time: u64,
    anchor_value: f32,
    events: VecDeque<AutomationEvent>,
}

impl AutomationLane {
    pub fn new(initial: f32, min: f32, max: f32) -> Self {
        let current = initial.clamp(min, max);
        Self {
            min,
            max,
            current,
            anchor_time: 0,
            anchor_value: current,
            events: VecDeque::new(),
        }
    }

    /// The value most recently evaluated.
    pub fn current(&self) -> f32 {
        self.current
    }

    /// The final scheduled target: the last pending event's value, or the
    /// current value when nothing is pending.
    pub fn target(&self) -> f32 {
        self.events.back().map_or(self.current, |e| e.value())
    }

    /// Clamp into the lane's range; NaN and infinities collapse to the
    /// lane minimum so they can never reach the render path.
    fn clamp(&self, value: f32) -> f32 {
        if value.is_finite() {
            value.clamp(self.min, self.max)
        } else {
            self.min
        }
    }

    /// Schedule an instantaneous value change. The value is clamped into
    /// the lane's range, never rejected.
    pub fn set_value_at(&mut self, value: f32, time: u64) {
        self.push(AutomationEvent::SetValueAtTime {
            value: self.clamp(value),
            time,
        });
    }

    /// Schedule a linear ramp arriving at `time`.
    pub fn linear_ramp_to(&mut self, value: f32, time: u64) {
        self.push(AutomationEvent::LinearRampToValueAtTime {
            value: self.clamp(value),
            time,
        });
    }

    /// Replace all pending automation with a ramp from the value at `now`
    /// to `target` over `ramp_samples`. This is the scheduling discipline
    /// behind every `update*` operation.
    pub fn schedule_ramp(&mut self, now: u64, target: f32, ramp_samples: u64) {
        let from = self.value_at(now);
        self.events.clear();
        self.anchor_time = now;
        self.anchor_value = from;
        if ramp_samples == 0 {
            self.set_value_at(target, now);
        } else {
            self.linear_ramp_to(target, now + ramp_samples);
        }
    }

    fn push(&mut self, event: AutomationEvent) {
        // Events are consumed in order; a late-scheduled earlier event
        // would re-anchor the tail, so keep the queue time-sorted.
        let time = event.time();
        while self
            .events
            .back()
            .is_some_and(|last| last.time() > time)
        {
            self.events.pop_back();
        }
        self.events.push_back(event);
    }

    /// Evaluate the lane at sample time `t`, consuming elapsed events.
    /// `t` must be monotonically non-decreasing across calls.
    pub fn value_at(&mut self, t: u64) -> f32 {
        while let Some(event) = self.events.front().copied() {
            match event {
                AutomationEvent::SetValueAtTime { value, time } => {
                    if t >= time {
                        self.current = value;
                        self.anchor_time = time;
                        self.anchor_value = value;
                        self.events.pop_front();
                    } else {
                        break;
                    }
                }
                AutomationEvent::LinearRampToValueAtTime { value, time } => {
                    if t >= time {
                        self.current = value;
                        self.anchor_time = time;
                        self.anchor_value = value;
                        self.events.pop_front();
                    } else {
                        let span = (time - self.anchor_time) as f32;
                        let frac = if span > 0.0 {
                            (t - self.anchor_time) as f32 / span
                        } else {
                            1.0
                        };
                        self.current = self.anchor_value + (value - self.anchor_value) * frac;
                        break;
                    }
                }
            }
        }
        self.current
    }
}
