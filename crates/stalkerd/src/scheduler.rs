use stalker_core::SteamId;
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleSpec {
    /// Reconcile every tracked profile.
    Sweep,
    /// Reconcile one profile (post-add seeding, operator check).
    Targeted(SteamId),
}

/// Single-in-flight gate for reconciliation cycles. Timer ticks landing
/// while a sweep runs are skipped outright; while a targeted cycle runs
/// they coalesce into at most one pending sweep. Targeted requests dedupe
/// per id and drain FIFO ahead of a pending sweep, since an operator is
/// usually waiting on them.
#[derive(Debug, Default)]
pub struct CycleQueue {
    pending_sweep: bool,
    pending_targets: VecDeque<SteamId>,
    active: Option<CycleSpec>,
}

impl CycleQueue {
    /// Returns whether the request added work.
    pub fn request_sweep(&mut self) -> bool {
        if self.pending_sweep || matches!(self.active, Some(CycleSpec::Sweep)) {
            return false;
        }
        self.pending_sweep = true;
        true
    }

    pub fn request_target(&mut self, id: SteamId) {
        if !self.pending_targets.contains(&id) {
            self.pending_targets.push_back(id);
        }
    }

    /// Claim the next cycle to run, or `None` while one is in flight.
    pub fn claim(&mut self) -> Option<CycleSpec> {
        if self.active.is_some() {
            return None;
        }
        if let Some(id) = self.pending_targets.pop_front() {
            self.active = Some(CycleSpec::Targeted(id));
        } else if self.pending_sweep {
            self.pending_sweep = false;
            self.active = Some(CycleSpec::Sweep);
        }
        self.active.clone()
    }

    pub fn complete(&mut self) {
        self.active = None;
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none() && !self.pending_sweep && self.pending_targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(last: char) -> SteamId {
        SteamId::parse(&format!("7656119800000000{last}")).expect("valid id")
    }

    #[test]
    fn only_one_cycle_is_claimable_at_a_time() {
        let mut queue = CycleQueue::default();
        queue.request_sweep();
        queue.request_target(id('1'));

        assert_eq!(queue.claim(), Some(CycleSpec::Targeted(id('1'))));
        assert_eq!(queue.claim(), None);

        queue.complete();
        assert_eq!(queue.claim(), Some(CycleSpec::Sweep));
    }

    #[test]
    fn timer_ticks_during_a_sweep_are_skipped() {
        let mut queue = CycleQueue::default();
        assert!(queue.request_sweep());
        assert_eq!(queue.claim(), Some(CycleSpec::Sweep));

        assert!(!queue.request_sweep());
        assert!(!queue.request_sweep());

        queue.complete();
        assert_eq!(queue.claim(), None);
        assert!(queue.is_idle());
    }

    #[test]
    fn ticks_during_a_targeted_cycle_coalesce_into_one_sweep() {
        let mut queue = CycleQueue::default();
        queue.request_target(id('1'));
        assert_eq!(queue.claim(), Some(CycleSpec::Targeted(id('1'))));

        assert!(queue.request_sweep());
        assert!(!queue.request_sweep());

        queue.complete();
        assert_eq!(queue.claim(), Some(CycleSpec::Sweep));
        queue.complete();
        assert!(queue.is_idle());
    }

    #[test]
    fn duplicate_targets_are_deduped_while_pending() {
        let mut queue = CycleQueue::default();
        queue.request_target(id('1'));
        queue.request_target(id('2'));
        queue.request_target(id('1'));

        assert_eq!(queue.claim(), Some(CycleSpec::Targeted(id('1'))));
        queue.complete();
        assert_eq!(queue.claim(), Some(CycleSpec::Targeted(id('2'))));
        queue.complete();
        assert_eq!(queue.claim(), None);
    }

    #[test]
    fn targeted_cycles_run_before_a_pending_sweep() {
        let mut queue = CycleQueue::default();
        queue.request_sweep();
        queue.request_target(id('1'));

        assert_eq!(queue.claim(), Some(CycleSpec::Targeted(id('1'))));
        queue.complete();
        assert_eq!(queue.claim(), Some(CycleSpec::Sweep));
    }
}
