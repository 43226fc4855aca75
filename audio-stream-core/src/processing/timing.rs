use std::time::Duration;

use crate::models::config::{StreamConfiguration, TimingMode};
use crate::traits::audio_client::DevicePeriod;

/// Shared/exclusive timing policy, selected once when a session opens.
///
/// Both the ring buffer duration computation and every wait timeout in the
/// I/O loops consult this one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingStrategy {
    mode: TimingMode,
    period: DevicePeriod,
    read_poll: Duration,
    drain_poll: Duration,
}

impl TimingStrategy {
    pub fn new(mode: TimingMode, period: DevicePeriod, config: &StreamConfiguration) -> Self {
        Self {
            mode,
            period,
            read_poll: config.read_poll_timeout(),
            drain_poll: config.drain_poll_timeout(),
        }
    }

    pub fn mode(&self) -> TimingMode {
        self.mode
    }

    pub fn device_period(&self) -> DevicePeriod {
        self.period
    }

    /// Ring buffer duration handed to client initialization.
    ///
    /// Shared: `requested_frames / sample_rate`. Exclusive: the device's
    /// minimum period; the requested size is ignored.
    pub fn buffer_duration(&self, requested_frames: u32, sample_rate: u32) -> Duration {
        match self.mode {
            TimingMode::Shared => {
                if sample_rate == 0 {
                    return Duration::ZERO;
                }
                Duration::from_nanos(u64::from(requested_frames) * 1_000_000_000 / u64::from(sample_rate))
            }
            TimingMode::Exclusive => self.period.minimum,
        }
    }

    /// Periodicity handed to client initialization (zero in shared mode).
    pub fn periodicity(&self) -> Duration {
        match self.mode {
            TimingMode::Shared => Duration::ZERO,
            TimingMode::Exclusive => self.period.minimum,
        }
    }

    /// Wait bound while a write is blocked on a full buffer.
    pub fn write_wait(&self) -> Option<Duration> {
        match self.mode {
            TimingMode::Shared => None,
            TimingMode::Exclusive => Some(self.period.minimum),
        }
    }

    /// Wait bound while a read is blocked on an empty buffer.
    pub fn read_wait(&self) -> Duration {
        match self.mode {
            TimingMode::Shared => self.read_poll,
            TimingMode::Exclusive => self.read_poll.min(self.period.minimum.max(Duration::from_millis(1))),
        }
    }

    /// Wait bound for one drain poll.
    pub fn drain_wait(&self) -> Duration {
        match self.mode {
            TimingMode::Shared => self.drain_poll,
            TimingMode::Exclusive => self.drain_poll.min(self.period.default.max(Duration::from_millis(1))),
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn period() -> DevicePeriod {
        DevicePeriod {
            default: Duration::from_millis(10),
            minimum: Duration::from_millis(3),
        }
    }

    fn strategy(mode: TimingMode) -> TimingStrategy {
        TimingStrategy::new(mode, period(), &StreamConfiguration::default())
    }

    #[test]
    fn shared_duration_follows_requested_frames() {
        let timing = strategy(TimingMode::Shared);
        let duration = timing.buffer_duration(128, 48000);
        assert_relative_eq!(duration.as_secs_f64(), 128.0 / 48000.0, epsilon = 1e-9);
        assert_eq!(timing.periodicity(), Duration::ZERO);
    }

    #[test]
    fn shared_duration_with_zero_rate_is_zero() {
        assert_eq!(strategy(TimingMode::Shared).buffer_duration(128, 0), Duration::ZERO);
    }

    #[test]
    fn exclusive_duration_is_minimum_period() {
        let timing = strategy(TimingMode::Exclusive);
        assert_eq!(timing.buffer_duration(1_000_000, 48000), Duration::from_millis(3));
        assert_eq!(timing.periodicity(), Duration::from_millis(3));
    }

    #[test]
    fn waits_per_mode() {
        let shared = strategy(TimingMode::Shared);
        assert_eq!(shared.write_wait(), None);
        assert_eq!(shared.read_wait(), Duration::from_millis(40));
        assert_eq!(shared.drain_wait(), Duration::from_millis(100));

        let exclusive = strategy(TimingMode::Exclusive);
        assert_eq!(exclusive.write_wait(), Some(Duration::from_millis(3)));
        assert_eq!(exclusive.read_wait(), Duration::from_millis(3));
        assert_eq!(exclusive.drain_wait(), Duration::from_millis(10));
    }
}
