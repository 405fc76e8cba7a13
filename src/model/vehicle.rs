use std::fmt;

use super::graph::{Location, NodeId};
use super::request::RequestId;
use super::storage::{BoxId, StackId};
use super::time::{Time, PARKED};
use crate::error::SchedulingError;

pub type VehicleId = u32;

/// A transport vehicle with a small LIFO load.
///
/// Request queues hold ids only; the requests themselves live in the
/// warehouse's request book.
#[derive(Debug, Clone)]
pub struct Vehicle {
    pub id: VehicleId,
    pub name: String,
    pub capacity: usize,
    pub location: Location,
    /// `None` until the vehicle first drives to a node.
    pub current_node: Option<NodeId>,
    carried: Vec<BoxId>,
    busy_until: Time,
    /// Handed out by distribution, not started yet.
    pub assigned: Vec<RequestId>,
    /// Committed and being worked on, in order.
    pub open: Vec<RequestId>,
    pub simulated: Vec<RequestId>,
    pub open_simulated: Vec<RequestId>,
    pub current_request: Option<RequestId>,
    my_stacks: Vec<StackId>,
}

impl Vehicle {
    pub fn new(id: VehicleId, name: &str, capacity: usize, location: Location) -> Self {
        Vehicle {
            id,
            name: name.to_string(),
            capacity,
            location,
            current_node: None,
            carried: Vec::new(),
            busy_until: -1.0,
            assigned: Vec::new(),
            open: Vec::new(),
            simulated: Vec::new(),
            open_simulated: Vec::new(),
            current_request: None,
            my_stacks: Vec::new(),
        }
    }

    // Cargo

    pub fn add_box(&mut self, box_id: BoxId) -> Result<(), SchedulingError> {
        if self.carried.len() >= self.capacity {
            return Err(SchedulingError::CapacityExceeded {
                vehicle: self.name.clone(),
                capacity: self.capacity,
            });
        }
        self.carried.push(box_id);
        Ok(())
    }

    pub fn remove_box(&mut self, box_id: &str) -> Result<BoxId, SchedulingError> {
        match self.carried.iter().rposition(|b| b == box_id) {
            Some(index) => Ok(self.carried.remove(index)),
            None => Err(SchedulingError::BoxNotCarried {
                vehicle: self.name.clone(),
                box_id: box_id.to_string(),
            }),
        }
    }

    pub fn carries(&self, box_id: &str) -> bool {
        self.carried.iter().any(|b| b == box_id)
    }

    /// The most recently loaded box.
    pub fn top_box(&self) -> Option<&BoxId> {
        self.carried.last()
    }

    pub fn carried(&self) -> &[BoxId] {
        &self.carried
    }

    pub fn load(&self) -> usize {
        self.carried.len()
    }

    pub fn is_full(&self) -> bool {
        self.carried.len() >= self.capacity
    }

    // Availability

    pub fn is_available(&self, now: Time) -> bool {
        self.busy_until <= now
    }

    pub fn busy_until(&self) -> Time {
        self.busy_until
    }

    pub fn set_busy_until(&mut self, time: Time) {
        self.busy_until = time;
    }

    /// Parks the vehicle until another vehicle releases it.
    pub fn park(&mut self) {
        self.busy_until = PARKED;
    }

    pub fn is_parked(&self) -> bool {
        self.busy_until == PARKED
    }

    pub fn move_to(&mut self, node: NodeId, location: Location) {
        self.current_node = Some(node);
        self.location = location;
    }

    // Stacks touched this phase

    pub fn claim_stack(&mut self, stack: StackId) {
        if !self.my_stacks.contains(&stack) {
            self.my_stacks.push(stack);
        }
    }

    pub fn my_stacks(&self) -> &[StackId] {
        &self.my_stacks
    }

    pub fn reset_stacks(&mut self) {
        self.my_stacks.clear();
    }

    // Request queues

    pub fn assign(&mut self, requests: Vec<RequestId>) {
        self.assigned.extend(requests);
    }

    /// Moves an assigned request to the open queue and makes it current.
    pub fn open_request(&mut self, id: RequestId) {
        self.assigned.retain(|r| *r != id);
        if !self.open.contains(&id) {
            self.open.push(id);
        }
        self.current_request = Some(id);
    }

    /// Moves an assigned request to the open queue without switching to it.
    pub fn queue_open(&mut self, id: RequestId) {
        self.assigned.retain(|r| *r != id);
        if !self.open.contains(&id) {
            self.open.push(id);
        }
    }

    /// Removes a finished request; the first remaining open request becomes
    /// current.
    pub fn close_request(&mut self, id: RequestId) {
        self.open.retain(|r| *r != id);
        self.current_request = self.open.first().copied();
    }

    /// Removes a finished request and continues with `next`.
    pub fn close_request_then(&mut self, id: RequestId, next: RequestId) {
        self.open.retain(|r| *r != id);
        self.current_request = Some(next);
    }

    pub fn add_simulated(&mut self, id: RequestId) {
        self.simulated.push(id);
    }

    /// Opens the most recently made simulated request and makes it current.
    pub fn open_last_simulated(&mut self) -> Option<RequestId> {
        let id = self.simulated.pop()?;
        self.open_simulated.push(id);
        self.current_request = Some(id);
        Some(id)
    }

    pub fn close_simulated(&mut self, id: RequestId) {
        self.open_simulated.retain(|r| *r != id);
        self.current_request = self.open_simulated.first().copied();
    }

    /// True while any assigned or open work remains.
    pub fn has_work(&self) -> bool {
        !self.assigned.is_empty() || !self.open.is_empty() || !self.open_simulated.is_empty()
    }
}

impl fmt::Display for Vehicle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {} carrying {}/{} [{}]",
            self.name,
            self.location,
            self.carried.len(),
            self.capacity,
            self.carried.join(", ")
        )
    }
}
