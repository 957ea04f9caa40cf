// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Deadline for the next loop-boundary transition.

use std::time::Duration;

use tokio::time::Instant;

/// The single outstanding loop-boundary transition. Scheduling a new
/// transition replaces the previous one.
#[derive(Debug, Default)]
pub struct TransitionTimer {
    deadline: Option<Instant>,
}

impl TransitionTimer {
    pub fn new() -> TransitionTimer {
        TransitionTimer::default()
    }

    pub fn schedule(&mut self, after: Duration) {
        self.deadline = Some(Instant::now() + after);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Consumes the scheduled transition. Returns false if it was cancelled.
    pub fn fire(&mut self) -> bool {
        self.deadline.take().is_some()
    }
}

/// How long a buffer takes to play at the given rate.
pub fn effective_duration(duration: Duration, rate: f32) -> Duration {
    if rate <= 0.0 {
        return duration;
    }
    Duration::from_secs_f64(duration.as_secs_f64() / rate as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces() {
        let mut timer = TransitionTimer::new();
        timer.schedule(Duration::from_secs(1));
        timer.schedule(Duration::from_secs(2));
        assert_eq!(
            timer.deadline(),
            Some(Instant::now() + Duration::from_secs(2))
        );
        assert!(timer.fire());
        assert!(!timer.fire());

        timer.schedule(Duration::from_secs(1));
        timer.cancel();
        assert!(!timer.fire());
    }

    #[test]
    fn test_effective_duration() {
        let d = effective_duration(Duration::from_secs(2), 2.0);
        assert!((d.as_secs_f64() - 1.0).abs() < 1e-9);
        let d = effective_duration(Duration::from_secs(1), 0.5);
        assert!((d.as_secs_f64() - 2.0).abs() < 1e-9);
    }
}
