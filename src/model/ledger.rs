/// Shared contention state for the whole run: stack locks, in-flight
/// relocations and vehicles parked until another request finishes.
///
/// One ledger is owned by the warehouse and borrowed mutably by whichever
/// component acts in the current tick.

use std::collections::{BTreeMap, HashMap};

use super::request::RequestId;
use super::storage::StackId;
use super::time::Time;
use super::vehicle::VehicleId;

/// A box moved off one stack onto a temporary one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Relocation {
    /// Stack the vehicle stood at when it left with the box.
    pub source: Option<StackId>,
    pub target: StackId,
    pub request: RequestId,
    pub expires_at: Time,
}

/// Why a lock attempt failed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StackBusy {
    pub stack: StackId,
    pub until: Time,
}

#[derive(Debug, Clone, Default)]
pub struct ResourceLedger {
    stack_busy_until: HashMap<StackId, Time>,
    relocations: Vec<Relocation>,
    waiting: BTreeMap<RequestId, VehicleId>,
}

impl ResourceLedger {
    pub fn new<I>(stacks: I) -> Self
    where
        I: IntoIterator<Item = StackId>,
    {
        ResourceLedger {
            stack_busy_until: stacks.into_iter().map(|id| (id, -1.0)).collect(),
            relocations: Vec::new(),
            waiting: BTreeMap::new(),
        }
    }

    pub fn busy_until(&self, stack: StackId) -> Time {
        self.stack_busy_until.get(&stack).copied().unwrap_or(-1.0)
    }

    pub fn is_stack_available(&self, stack: StackId, now: Time) -> bool {
        self.busy_until(stack) <= now
    }

    /// Checks that `stack` is free at `now` and locks it until `until` in the
    /// same step.
    pub fn try_lock(&mut self, stack: StackId, now: Time, until: Time) -> Result<(), StackBusy> {
        let current = self.busy_until(stack);
        if current > now {
            return Err(StackBusy {
                stack,
                until: current,
            });
        }
        self.stack_busy_until.insert(stack, until);
        Ok(())
    }

    pub fn record_relocation(&mut self, relocation: Relocation) {
        self.relocations.push(relocation);
    }

    /// Forgets relocations whose expiry lies before `now`.
    pub fn prune_relocations(&mut self, now: Time) {
        self.relocations.retain(|r| r.expires_at >= now);
    }

    pub fn relocations(&self) -> &[Relocation] {
        &self.relocations
    }

    /// A relocation running the opposite way: onto `from`, coming off `to`.
    pub fn conflicting_relocation(&self, from: StackId, to: StackId) -> Option<&Relocation> {
        self.relocations
            .iter()
            .find(|r| r.target == from && r.source == Some(to))
    }

    pub fn wait_for(&mut self, request: RequestId, vehicle: VehicleId) {
        self.waiting.insert(request, vehicle);
    }

    /// Takes the vehicle waiting on `request` off the wait-queue.
    pub fn release_waiter(&mut self, request: RequestId) -> Option<VehicleId> {
        self.waiting.remove(&request)
    }

    /// True while a lock or a relocation still runs past `now`.
    pub fn has_pending_activity(&self, now: Time) -> bool {
        self.stack_busy_until.values().any(|until| *until > now)
            || self.relocations.iter().any(|r| r.expires_at >= now)
    }
}
