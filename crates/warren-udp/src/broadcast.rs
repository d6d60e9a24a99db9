//! LAN broadcast discovery scheduling.
//!
//! Each enabled interface announces our identity roughly once a minute:
//! IPv4 via the subnet broadcast address, IPv6 via a link-local multicast
//! group joined at interface discovery. Send times jitter around the
//! nominal period so co-started nodes do not synchronize.

use std::net::{Ipv6Addr, SocketAddr};

use rand::Rng;

use warren_types::{AbsoluteTime, RelativeTime};

/// The IPv6 multicast group communicator broadcasts join.
pub const MULTICAST_GROUP_V6: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0x13ad);

/// Jitter applied on both sides of the nominal period (±10 s).
const JITTER: RelativeTime = RelativeTime::from_secs(10);

/// Tracks when the next announcement on one destination is due.
#[derive(Debug)]
pub struct BroadcastSchedule {
    destination: SocketAddr,
    period: RelativeTime,
    next_due: AbsoluteTime,
}

impl BroadcastSchedule {
    /// Schedule announcements towards `destination`; the first one is due
    /// immediately.
    pub fn new(destination: SocketAddr, period: RelativeTime, now: AbsoluteTime) -> Self {
        Self {
            destination,
            period,
            next_due: now,
        }
    }

    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    pub fn next_due(&self) -> AbsoluteTime {
        self.next_due
    }

    /// Whether an announcement is due at `now`.
    pub fn is_due(&self, now: AbsoluteTime) -> bool {
        self.next_due <= now
    }

    /// Mark an announcement sent and pick the next send time with jitter.
    pub fn mark_sent<R: Rng>(&mut self, now: AbsoluteTime, rng: &mut R) {
        let base = self.period.as_micros();
        let jitter = JITTER.as_micros().min(base / 2);
        let low = base - jitter;
        let high = base + jitter;
        let delay = if low < high {
            rng.gen_range(low..=high)
        } else {
            base
        };
        self.next_due = now.saturating_add(RelativeTime::from_micros(delay));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn dst() -> SocketAddr {
        "255.255.255.255:2086".parse().expect("addr")
    }

    #[test]
    fn test_first_broadcast_due_immediately() {
        let schedule = BroadcastSchedule::new(dst(), crate::BROADCAST_FREQUENCY, AbsoluteTime(5));
        assert!(schedule.is_due(AbsoluteTime(5)));
    }

    #[test]
    fn test_mark_sent_schedules_within_jitter_window() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let now = AbsoluteTime(1_000_000);
        let period = crate::BROADCAST_FREQUENCY;
        let mut schedule = BroadcastSchedule::new(dst(), period, now);

        for _ in 0..32 {
            schedule.mark_sent(now, &mut rng);
            let delay = schedule.next_due().saturating_duration_since(now).as_micros();
            let base = period.as_micros();
            assert!(delay >= base - 10_000_000, "delay {delay} below window");
            assert!(delay <= base + 10_000_000, "delay {delay} above window");
            assert!(!schedule.is_due(now));
        }
    }

    #[test]
    fn test_tiny_period_does_not_underflow() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let now = AbsoluteTime(0);
        let mut schedule =
            BroadcastSchedule::new(dst(), RelativeTime::from_micros(4), now);
        schedule.mark_sent(now, &mut rng);
        assert!(schedule.next_due() > now);
    }

    #[test]
    fn test_multicast_group_is_link_local() {
        assert_eq!(MULTICAST_GROUP_V6.segments()[0], 0xff02);
    }
}
