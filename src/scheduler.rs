//! Repeating interval timers.
//!
//! The ticker does not push events itself: when an interval elapses it
//! notifies a [`TickDelegate`], and the timer thread implements the
//! delegate by enqueueing an event for the dispatch loop.
//!
//! ```text
//!   timer thread ──tick(now_ms)──▶ Ticker ──on_tick(kind)──▶ TickDelegate
//!                                                             (EventQueue)
//! ```

use log::{debug, info};

/// What an interval is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickKind {
    /// Log every registered channel.
    ChannelInfo,
    /// Expire pending calls past their timeout.
    TimeoutSweep,
}

/// Receives fire notifications from [`Ticker::tick`].
pub trait TickDelegate {
    fn on_tick(&mut self, kind: TickKind);
}

/// A single repeating timer.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub label: &'static str,
    pub kind: TickKind,
    pub interval_ms: u64,
    pub enabled: bool,
}

const MAX_SCHEDULES: usize = 4;

#[derive(Debug, Clone)]
struct ScheduleEntry {
    schedule: Schedule,
    /// Absolute time of the next fire; set on the first tick.
    next_due_ms: Option<u64>,
}

pub struct Ticker {
    schedules: [Option<ScheduleEntry>; MAX_SCHEDULES],
    enabled: bool,
}

impl Default for Ticker {
    fn default() -> Self {
        Self::new()
    }
}

impl Ticker {
    pub fn new() -> Self {
        Self {
            schedules: [const { None }; MAX_SCHEDULES],
            enabled: true,
        }
    }

    /// Add a timer. Returns the slot index, or `None` if full or the
    /// interval is zero.
    pub fn add(&mut self, schedule: Schedule) -> Option<usize> {
        if schedule.interval_ms == 0 {
            return None;
        }
        let (i, slot) = self
            .schedules
            .iter_mut()
            .enumerate()
            .find(|(_, s)| s.is_none())?;
        info!(
            "Ticker: added '{}' every {} ms at slot {}",
            schedule.label, schedule.interval_ms, i
        );
        *slot = Some(ScheduleEntry {
            schedule,
            next_due_ms: None,
        });
        Some(i)
    }

    pub fn remove(&mut self, slot: usize) {
        if let Some(s) = self.schedules.get_mut(slot) {
            *s = None;
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Advance to `now_ms` (monotonic). Each timer fires at most once per
    /// call; a timer that fell behind by several intervals fires once and
    /// resumes one interval after `now_ms`.
    pub fn tick(&mut self, now_ms: u64, delegate: &mut dyn TickDelegate) {
        if !self.enabled {
            return;
        }

        for entry in self.schedules.iter_mut().flatten() {
            if !entry.schedule.enabled {
                continue;
            }
            let interval = entry.schedule.interval_ms;
            let due = *entry.next_due_ms.get_or_insert(now_ms + interval);
            if now_ms < due {
                continue;
            }

            debug!("Ticker: '{}' fired", entry.schedule.label);
            delegate.on_tick(entry.schedule.kind);
            let next = due + interval;
            entry.next_due_ms = Some(if next <= now_ms { now_ms + interval } else { next });
        }
    }

    /// Milliseconds until the earliest enabled timer is due, for the
    /// timer thread's sleep. `None` with nothing scheduled.
    pub fn time_to_next(&self, now_ms: u64) -> Option<u64> {
        if !self.enabled {
            return None;
        }
        self.schedules
            .iter()
            .flatten()
            .filter(|e| e.schedule.enabled)
            .map(|e| {
                e.next_due_ms
                    .unwrap_or(now_ms + e.schedule.interval_ms)
                    .saturating_sub(now_ms)
            })
            .min()
    }

    pub fn active_count(&self) -> usize {
        self.schedules
            .iter()
            .flatten()
            .filter(|e| e.schedule.enabled)
            .count()
    }
}
