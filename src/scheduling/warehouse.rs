/// Warehouse state shared by every scheduling phase
///
/// This module holds:
/// - The graph with all stacks and buffer points
/// - The vehicle fleet and the request book
/// - The resource ledger, the virtual clock and the operation log

use crate::model::graph::{Graph, NodeId};
use crate::model::ledger::ResourceLedger;
use crate::model::log::OperationLog;
use crate::model::request::{Request, RequestBook, RequestId, RequestStatus};
use crate::model::storage::BoxStorage;
use crate::model::time::{truncate, Clock, Time};
use crate::model::vehicle::{Vehicle, VehicleId};

/// Everything the scheduler mutates while it runs
pub struct Warehouse {
    pub graph: Graph,
    pub vehicles: Vec<Vehicle>,
    pub requests: RequestBook,
    /// Requests no phase has taken yet, in input order
    pub pending: Vec<RequestId>,
    pub ledger: ResourceLedger,
    pub clock: Clock,
    pub log: OperationLog,
    pub loading_duration: Time,
    phase: usize,
}

impl Warehouse {
    pub fn new(graph: Graph, vehicles: Vec<Vehicle>, loading_duration: Time) -> Self {
        let stacks: Vec<_> = graph
            .nodes()
            .iter()
            .filter_map(|node| node.stack_id())
            .collect();
        Warehouse {
            graph,
            vehicles,
            requests: RequestBook::new(),
            pending: Vec::new(),
            ledger: ResourceLedger::new(stacks),
            clock: Clock::new(),
            log: OperationLog::new(),
            loading_duration,
            phase: 0,
        }
    }

    /// Add a request to the pending pool. A request with a known id is handed back.
    pub fn add_request(&mut self, request: Request) -> Result<(), Request> {
        let id = request.id;
        self.requests.insert(request)?;
        self.pending.push(id);
        Ok(())
    }

    pub fn now(&self) -> Time {
        self.clock.now()
    }

    /// Index of the running phase, 0 for the first
    pub fn phase(&self) -> usize {
        self.phase
    }

    /// Close the running phase: vehicles forget the stacks they touched
    pub fn end_phase(&mut self) {
        for vehicle in &mut self.vehicles {
            vehicle.reset_stacks();
        }
        self.phase += 1;
    }

    pub fn remove_pending(&mut self, taken: &[RequestId]) {
        self.pending.retain(|id| !taken.contains(id));
    }

    pub fn vehicle_index(&self, id: VehicleId) -> Option<usize> {
        self.vehicles.iter().position(|v| v.id == id)
    }

    pub fn all_idle(&self) -> bool {
        self.vehicles.iter().all(|v| !v.has_work())
    }

    /// Record that `box_id` now sits on `node`. Unfinished requests for the
    /// box pick it up from there; a request that had the box on board starts
    /// over.
    pub fn rehome_box(&mut self, box_id: &str, node: NodeId) {
        for request in self.requests.iter_mut() {
            if request.box_id != box_id || request.is_done() {
                continue;
            }
            request.pickup = node;
            if request.status == RequestStatus::Src {
                request.status = RequestStatus::Initial;
            }
        }
    }

    /// Hand the completer's availability to a vehicle parked on `request`.
    pub fn release_waiter(&mut self, request: RequestId, completer: usize) -> Option<usize> {
        let waiter = self.ledger.release_waiter(request)?;
        let index = self.vehicle_index(waiter)?;
        let until = self.vehicles[completer].busy_until();
        self.vehicles[index].set_busy_until(until);
        Some(index)
    }

    /// True when nothing will change by waiting: no vehicle finishes a move
    /// later and no lock or relocation runs past `now`.
    pub fn is_frozen(&self, now: Time) -> bool {
        let moving = self
            .vehicles
            .iter()
            .any(|v| !v.is_parked() && v.busy_until() > now);
        !moving && !self.ledger.has_pending_activity(now)
    }

    /// Names of vehicles that still have work.
    pub fn busy_vehicle_names(&self) -> Vec<String> {
        self.vehicles
            .iter()
            .filter(|v| v.has_work())
            .map(|v| v.name.clone())
            .collect()
    }

    /// Requests read from the scenario that never reached their place.
    pub fn unfinished_requests(&self) -> Vec<RequestId> {
        self.requests
            .iter()
            .filter(|r| !r.is_simulated() && !r.is_done())
            .map(|r| r.id)
            .collect()
    }

    /// Get a summary of current state
    pub fn status(&self) -> String {
        let now = self.now();
        let mut status = format!("Warehouse status at time {}\n", truncate(now));
        status.push_str("Vehicles:\n");
        for vehicle in &self.vehicles {
            let availability = if vehicle.is_parked() {
                "Parked".to_string()
            } else if vehicle.is_available(now) {
                "Available".to_string()
            } else {
                format!("Busy until {}", truncate(vehicle.busy_until()))
            };
            status.push_str(&format!(
                "  - {} (ID: {}): {} | {} | open {} assigned {}\n",
                vehicle,
                vehicle.id,
                availability,
                vehicle
                    .current_request
                    .map(|r| format!("working on {}", r))
                    .unwrap_or_else(|| "idle".to_string()),
                vehicle.open.len(),
                vehicle.assigned.len()
            ));
        }
        status.push_str("Stacks:\n");
        for node in self.graph.nodes() {
            if let Some(stack) = node.as_stack() {
                let lock = self.ledger.busy_until(stack.id);
                status.push_str(&format!(
                    "  - {} (ID: {}) at {}: {} boxes, {} free{}\n",
                    stack.name,
                    stack.id,
                    node.location,
                    stack.len(),
                    stack.free_slots(),
                    if lock > now {
                        format!(" | Locked until {}", truncate(lock))
                    } else {
                        "".to_string()
                    }
                ));
            }
        }
        status
    }
}
