//! Single-threaded timer queue and frame-request registry.
//!
//! Nothing here runs callbacks. Components arm timers and request frames,
//! keep the returned ids, and the host routes ids that come due back to the
//! component that owns them. A cleared id never comes back.

use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameId(u64);

#[derive(Debug, Clone, Copy)]
struct Timer {
    deadline: f64,
    interval: Option<f64>,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    now_ms: f64,
    next_id: u64,
    timers: BTreeMap<TimerId, Timer>,
    frames: BTreeSet<FrameId>,
}

impl Scheduler {
    pub fn new(now_ms: f64) -> Self {
        Self {
            now_ms,
            ..Default::default()
        }
    }

    pub fn now(&self) -> f64 {
        self.now_ms
    }

    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Fires once, `delay_ms` from now.
    pub fn set_timeout(&mut self, delay_ms: f64) -> TimerId {
        let id = TimerId(self.allocate());
        self.timers.insert(id, Timer { deadline: self.now_ms + delay_ms.max(0.0), interval: None });
        id
    }

    /// Fires every `interval_ms`, first time one interval from now.
    pub fn set_interval(&mut self, interval_ms: f64) -> TimerId {
        let interval = interval_ms.max(1.0);
        let id = TimerId(self.allocate());
        self.timers.insert(id, Timer { deadline: self.now_ms + interval, interval: Some(interval) });
        id
    }

    pub fn clear_timer(&mut self, id: TimerId) {
        self.timers.remove(&id);
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.timers.contains_key(&id)
    }

    /// Asks for one display frame. Ids are one-shot; re-request from the frame handler.
    pub fn request_frame(&mut self) -> FrameId {
        let id = FrameId(self.allocate());
        self.frames.insert(id);
        id
    }

    pub fn cancel_frame(&mut self, id: FrameId) {
        self.frames.remove(&id);
    }

    pub fn is_frame_pending(&self, id: FrameId) -> bool {
        self.frames.contains(&id)
    }

    /// Moves time forward and returns every timer due by `now_ms`, earliest
    /// deadline first. An interval that fell several periods behind fires once
    /// and is re-armed from its last deadline, skipping the missed periods.
    pub fn advance_to(&mut self, now_ms: f64) -> Vec<TimerId> {
        if now_ms > self.now_ms {
            self.now_ms = now_ms;
        }

        let mut due: Vec<(f64, TimerId)> = self
            .timers
            .iter()
            .filter(|(_, timer)| timer.deadline <= self.now_ms)
            .map(|(id, timer)| (timer.deadline, *id))
            .collect();
        due.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        for (_, id) in &due {
            let rearm = match self.timers.get_mut(id) {
                Some(Timer { deadline, interval: Some(interval) }) => {
                    let mut next = *deadline + *interval;
                    if next <= self.now_ms {
                        let behind = ((self.now_ms - next) / *interval).floor() + 1.0;
                        next += behind * *interval;
                    }
                    *deadline = next;
                    true
                }
                _ => false,
            };
            if !rearm {
                self.timers.remove(id);
            }
        }

        due.into_iter().map(|(_, id)| id).collect()
    }

    /// Drains the pending frame requests.
    pub fn take_frames(&mut self) -> Vec<FrameId> {
        std::mem::take(&mut self.frames).into_iter().collect()
    }

    /// Deadline of the earliest timer, if any.
    pub fn next_deadline(&self) -> Option<f64> {
        self.timers.values().map(|t| t.deadline).min_by(|a, b| a.total_cmp(b))
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn pending_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn is_idle(&self) -> bool {
        self.timers.is_empty() && self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_fires_once() {
        let mut sched = Scheduler::new(0.0);
        let id = sched.set_timeout(2_000.0);
        assert!(sched.advance_to(1_999.0).is_empty());
        assert_eq!(sched.advance_to(2_000.0), vec![id]);
        assert!(sched.advance_to(10_000.0).is_empty());
        assert!(!sched.is_pending(id));
    }

    #[test]
    fn interval_rearms_and_skips_missed_periods() {
        let mut sched = Scheduler::new(0.0);
        let id = sched.set_interval(10_000.0);
        assert_eq!(sched.advance_to(10_000.0), vec![id]);
        assert_eq!(sched.next_deadline(), Some(20_000.0));

        // fell 3 periods behind: one firing, next deadline stays on the grid
        assert_eq!(sched.advance_to(45_000.0), vec![id]);
        assert_eq!(sched.next_deadline(), Some(50_000.0));
    }

    #[test]
    fn cleared_timer_never_fires() {
        let mut sched = Scheduler::new(0.0);
        let a = sched.set_interval(100.0);
        let b = sched.set_timeout(50.0);
        sched.clear_timer(a);
        assert_eq!(sched.advance_to(1_000.0), vec![b]);
        assert!(sched.is_idle());
    }

    #[test]
    fn due_timers_come_back_in_deadline_order() {
        let mut sched = Scheduler::new(0.0);
        let late = sched.set_timeout(300.0);
        let early = sched.set_timeout(100.0);
        let mid = sched.set_interval(200.0);
        assert_eq!(sched.advance_to(300.0), vec![early, mid, late]);
    }

    #[test]
    fn frames_are_one_shot_and_cancellable() {
        let mut sched = Scheduler::new(0.0);
        let a = sched.request_frame();
        let b = sched.request_frame();
        sched.cancel_frame(a);
        assert_eq!(sched.take_frames(), vec![b]);
        assert!(sched.take_frames().is_empty());
    }

    #[test]
    fn time_never_moves_backwards() {
        let mut sched = Scheduler::new(5_000.0);
        sched.advance_to(1_000.0);
        assert_eq!(sched.now(), 5_000.0);
    }
}
