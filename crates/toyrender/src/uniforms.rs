use std::time::Instant;

use chrono::{Datelike, Local, Timelike};

use crate::error::Result;
use crate::gl::{Program, UniformValue};
use crate::inputs::CHANNEL_COUNT;
use crate::program::ProgramInterface;
use crate::size::Rsize;

/// Per-frame values of the Shadertoy uniforms.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadertoyUniforms {
    pub resolution: [f32; 3],
    pub time: f32,
    pub time_delta: f32,
    pub frame: i32,
    pub frame_rate: f32,
    pub mouse: [f32; 4],
    pub date: [f32; 4],
    pub sample_rate: f32,
    pub channel_time: [f32; CHANNEL_COUNT],
    pub channel_resolution: [[f32; 3]; CHANNEL_COUNT],
}

impl ShadertoyUniforms {
    pub fn new(size: Rsize) -> Self {
        let mut uniforms = Self {
            resolution: size.as_vec3(),
            time: 0.0,
            time_delta: 0.0,
            frame: 0,
            frame_rate: 0.0,
            mouse: [0.0; 4],
            date: [0.0; 4],
            sample_rate: 44100.0,
            channel_time: [0.0; CHANNEL_COUNT],
            channel_resolution: [[0.0; 3]; CHANNEL_COUNT],
        };
        uniforms.refresh_date();
        uniforms
    }

    pub fn set_resolution(&mut self, size: Rsize) {
        self.resolution = size.as_vec3();
    }

    pub fn set_channel_resolution(&mut self, index: usize, resolution: [f32; 3]) {
        if let Some(slot) = self.channel_resolution.get_mut(index) {
            *slot = resolution;
        }
    }

    /// Advances time from `clock`; `frame_rate` overrides the measured rate.
    pub fn update_time(&mut self, clock: &mut FrameClock, now: Instant, frame_rate: Option<f32>) {
        let (seconds, delta, frame) = clock.tick(now);
        self.time = seconds;
        self.time_delta = delta;
        self.frame = frame;
        self.frame_rate = match frame_rate {
            Some(rate) => rate,
            None if delta > 0.0 => 1.0 / delta,
            None => 0.0,
        };
        self.channel_time = [seconds; CHANNEL_COUNT];
        self.refresh_date();
    }

    fn refresh_date(&mut self) {
        let local_now = Local::now();
        let seconds_since_midnight = local_now.num_seconds_from_midnight() as f32
            + local_now.nanosecond() as f32 / 1_000_000_000.0;
        self.date = [
            local_now.year() as f32,
            local_now.month() as f32,
            local_now.day() as f32,
            seconds_since_midnight,
        ];
    }

    /// Uploads every uniform the program actually uses.
    pub fn apply(&self, interface: &ProgramInterface, program: &Program) -> Result<()> {
        let values: [(&str, UniformValue); 10] = [
            ("iResolution", self.resolution.into()),
            ("iTime", self.time.into()),
            ("iTimeDelta", self.time_delta.into()),
            ("iFrame", self.frame.into()),
            ("iFrameRate", self.frame_rate.into()),
            ("iMouse", self.mouse.into()),
            ("iDate", self.date.into()),
            ("iSampleRate", self.sample_rate.into()),
            (
                "iChannelTime",
                UniformValue::FloatArray(self.channel_time.to_vec()),
            ),
            (
                "iChannelResolution",
                UniformValue::Vec3Array(self.channel_resolution.to_vec()),
            ),
        ];
        for (name, value) in values {
            interface.set_uniform(program, name, value)?;
        }
        Ok(())
    }
}

/// Start time, previous frame time and frame counter of a context.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameClock {
    start: Option<Instant>,
    last: Option<Instant>,
    frame_count: u32,
}

impl FrameClock {
    /// Returns elapsed seconds, seconds since the previous tick and the
    /// index of the frame being rendered.
    pub fn tick(&mut self, now: Instant) -> (f32, f32, i32) {
        let start = *self.start.get_or_insert(now);
        let last = self.last.replace(now).unwrap_or(now);
        let frame = self.frame_count.min(i32::MAX as u32) as i32;
        self.frame_count = self.frame_count.saturating_add(1);
        (
            now.saturating_duration_since(start).as_secs_f32(),
            now.saturating_duration_since(last).as_secs_f32(),
            frame,
        )
    }

    /// Number of frames ticked so far.
    pub fn frames(&self) -> u32 {
        self.frame_count
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn clock_counts_frames_from_first_tick() {
        let mut clock = FrameClock::default();
        let start = Instant::now();
        assert_eq!(clock.tick(start), (0.0, 0.0, 0));
        let (time, delta, frame) = clock.tick(start + Duration::from_millis(500));
        assert_eq!(frame, 1);
        assert!((time - 0.5).abs() < 1e-6);
        assert!((delta - 0.5).abs() < 1e-6);
        assert_eq!(clock.frames(), 2);
    }

    #[test]
    fn update_time_fills_channel_times() {
        let mut uniforms = ShadertoyUniforms::new(Rsize::new(4, 2));
        assert_eq!(uniforms.resolution, [4.0, 2.0, 1.0]);
        let mut clock = FrameClock::default();
        let start = Instant::now();
        uniforms.update_time(&mut clock, start, Some(60.0));
        uniforms.update_time(&mut clock, start + Duration::from_secs(2), Some(60.0));
        assert_eq!(uniforms.frame, 1);
        assert_eq!(uniforms.channel_time, [2.0; CHANNEL_COUNT]);
        assert_eq!(uniforms.frame_rate, 60.0);
        assert!(uniforms.date[0] >= 2024.0);
    }
}
