use std::time::Duration;

use tokio::time::Instant;

/// The single pending "poll again" timer of a session.
///
/// Arming replaces any earlier deadline; cancelling is always safe, whether
/// the timer already fired, was already cancelled, or was never armed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    deadline: Option<Instant>,
}

impl PollSchedule {
    pub fn arm_after(&mut self, delay: Duration) {
        self.deadline = Some(Instant::now() + delay);
    }

    /// Returns whether a deadline was actually pending.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Consumes the deadline if it has passed.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Sleeps until `deadline`, or forever when nothing is scheduled.
pub async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn cancel_is_idempotent() {
        let mut schedule = PollSchedule::default();
        assert!(!schedule.cancel());

        schedule.arm_after(Duration::from_secs(1));
        assert!(schedule.cancel());
        assert!(!schedule.cancel());
        assert!(!schedule.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_becomes_due_after_delay() {
        let mut schedule = PollSchedule::default();
        schedule.arm_after(Duration::from_secs(1));
        assert!(!schedule.take_due(Instant::now()));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(schedule.take_due(Instant::now()));
        // Already fired: a second take and a cancel are both no-ops.
        assert!(!schedule.take_due(Instant::now()));
        assert!(!schedule.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_replaces_previous_deadline() {
        let mut schedule = PollSchedule::default();
        schedule.arm_after(Duration::from_secs(5));
        schedule.arm_after(Duration::from_secs(1));
        let deadline = schedule.deadline().expect("armed");
        assert_eq!(deadline - Instant::now(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_wakes_at_deadline() {
        let start = Instant::now();
        sleep_until_deadline(Some(start + Duration::from_millis(250))).await;
        assert!(start.elapsed() >= Duration::from_millis(250));
        assert!(start.elapsed() < Duration::from_millis(300));
    }
}
