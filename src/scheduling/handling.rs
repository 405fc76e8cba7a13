/// Request handling - how a vehicle advances one request by one step
///
/// This module demonstrates:
/// - One state machine per request status (Initial, Src, DestPickup)
/// - Check-and-lock of stacks before anything moves
/// - Relocating blocking boxes to temporary stacks
/// - Stalls: a step that cannot run now changes nothing and is retried later

use std::fmt;

use super::resolver::{find_temp_stacks, Anchor, TempStackQuery};
use super::warehouse::Warehouse;
use crate::error::SchedulingError;
use crate::logger::{LogLevel, Logger};
use crate::model::graph::{Location, NodeId};
use crate::model::ledger::Relocation;
use crate::model::log::{Operation, OperationKind};
use crate::model::request::{RequestId, RequestStatus};
use crate::model::storage::{BoxId, BoxStorage, StackId};
use crate::model::time::{truncate, Time};

/// Why a vehicle could not act this tick
#[derive(Debug, Clone, PartialEq)]
pub enum Stall {
    StackInUse { stack: StackId, until: Time },
    NoTempStack,
    DestinationFull { stack: StackId },
    WaitingOn { request: RequestId },
    BoxElsewhere { box_id: BoxId },
}

impl fmt::Display for Stall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stall::StackInUse { stack, until } => {
                write!(f, "stack {} is in use until {}", stack, truncate(*until))
            }
            Stall::NoTempStack => write!(f, "no temporary stack available"),
            Stall::DestinationFull { stack } => write!(f, "destination stack {} is full", stack),
            Stall::WaitingOn { request } => write!(f, "waiting for request {} to finish", request),
            Stall::BoxElsewhere { box_id } => {
                write!(f, "box {} is not at its pickup location", box_id)
            }
        }
    }
}

enum Step {
    Done,
    Skipped,
    Blocked(Stall),
}

/// A committed move: where the vehicle came from and when it is free again
struct Move {
    start: Location,
    end_time: Time,
}

/// Advances requests through their status machine
pub struct RequestHandler {
    stall: Option<Stall>,
    logger: Logger,
}

impl RequestHandler {
    pub fn new(logger: Logger) -> Self {
        RequestHandler {
            stall: None,
            logger,
        }
    }

    /// The reason the last handled step could not run, if any. Clears it.
    pub fn take_stall(&mut self) -> Option<Stall> {
        self.stall.take()
    }

    /// Take one step on request `request` for the vehicle at index
    /// `vehicle`. `siblings` counts the vehicle's other open requests with
    /// the same place node.
    ///
    /// Returns true when something changed. Contention is not an error: the
    /// step is left for a later tick and the reason is kept for
    /// [`RequestHandler::take_stall`].
    pub fn handle_request(
        &mut self,
        wh: &mut Warehouse,
        vehicle: usize,
        request: RequestId,
        now: Time,
        siblings: usize,
    ) -> Result<bool, SchedulingError> {
        let step = match wh.requests[request].status {
            RequestStatus::Initial => self.handle_initial(wh, vehicle, request, now)?,
            RequestStatus::Src => self.handle_src(wh, vehicle, request, now)?,
            RequestStatus::DestPickup => {
                self.handle_dest_pickup(wh, vehicle, request, now, siblings)?
            }
            RequestStatus::Dest => Step::Skipped,
        };

        match step {
            Step::Done => Ok(true),
            Step::Skipped => Ok(false),
            Step::Blocked(stall) => {
                self.stall = Some(stall);
                Ok(false)
            }
        }
    }

    fn handle_initial(
        &mut self,
        wh: &mut Warehouse,
        v: usize,
        r: RequestId,
        now: Time,
    ) -> Result<Step, SchedulingError> {
        match self.unload_unneeded(wh, v, r, now)? {
            Step::Skipped => {}
            step => return Ok(step),
        }
        match self.make_room_at_place(wh, v, r, now)? {
            Step::Skipped => {}
            step => return Ok(step),
        }
        self.pick_up_at_source(wh, v, r, now)
    }

    fn handle_src(
        &mut self,
        wh: &mut Warehouse,
        v: usize,
        r: RequestId,
        now: Time,
    ) -> Result<Step, SchedulingError> {
        let vehicle = &wh.vehicles[v];
        let carried = vehicle.carries(&wh.requests[r].box_id);
        if !carried && vehicle.is_full() {
            return self.relocate_carried(wh, v, r, now);
        }
        if !carried {
            return self.pick_another_at_source(wh, v, r, now);
        }
        self.place_at_destination(wh, v, r, now)
    }

    fn handle_dest_pickup(
        &mut self,
        wh: &mut Warehouse,
        v: usize,
        r: RequestId,
        now: Time,
        siblings: usize,
    ) -> Result<Step, SchedulingError> {
        let place = wh.requests[r].place;
        let dig_deeper = match wh.graph.node(place).as_stack() {
            Some(stack) => {
                siblings > 0
                    && !wh.vehicles[v].is_full()
                    && !stack.is_empty()
                    && stack.free_slots() < siblings + 1
            }
            None => false,
        };
        if !dig_deeper {
            return self.relocate_carried(wh, v, r, now);
        }

        let moved = match reserve(wh, v, place, now) {
            Ok(moved) => moved,
            Err(stall) => return Ok(Step::Blocked(stall)),
        };
        let box_id = take_from(wh, place, None)?;
        wh.vehicles[v].add_box(box_id.clone())?;
        self.record(wh, v, now, moved, box_id, OperationKind::Pickup);
        Ok(Step::Done)
    }

    /// Drop a box no request of this vehicle needs on the stack it stands at.
    fn unload_unneeded(
        &mut self,
        wh: &mut Warehouse,
        v: usize,
        r: RequestId,
        now: Time,
    ) -> Result<Step, SchedulingError> {
        let vehicle = &wh.vehicles[v];
        if vehicle.load() == 0 {
            return Ok(Step::Skipped);
        }
        let needed = vehicle
            .open
            .iter()
            .chain(vehicle.assigned.iter())
            .chain(vehicle.open_simulated.iter())
            .filter_map(|id| wh.requests.get(*id))
            .any(|request| vehicle.carries(&request.box_id));
        if needed {
            return Ok(Step::Skipped);
        }
        let here = match vehicle.current_node {
            Some(node) if node != wh.requests[r].pickup => node,
            _ => return Ok(Step::Skipped),
        };
        let has_room = wh
            .graph
            .node(here)
            .as_stack()
            .map_or(false, |stack| stack.free_slots() > 0);
        if !has_room {
            return Ok(Step::Skipped);
        }
        let box_id = match vehicle.top_box() {
            Some(box_id) => box_id.clone(),
            None => return Ok(Step::Skipped),
        };

        let moved = match reserve(wh, v, here, now) {
            Ok(moved) => moved,
            Err(stall) => return Ok(Step::Blocked(stall)),
        };
        let box_id = wh.vehicles[v].remove_box(&box_id)?;
        put_on(wh, here, box_id.clone())?;
        wh.rehome_box(&box_id, here);
        self.record(wh, v, now, moved, box_id, OperationKind::PlaceRelocation);
        Ok(Step::Done)
    }

    /// Take the top box off a full place stack.
    fn make_room_at_place(
        &mut self,
        wh: &mut Warehouse,
        v: usize,
        r: RequestId,
        now: Time,
    ) -> Result<Step, SchedulingError> {
        let place = wh.requests[r].place;
        let place_full = wh
            .graph
            .node(place)
            .as_stack()
            .map_or(false, |stack| stack.is_full());
        if !place_full {
            return Ok(Step::Skipped);
        }
        if wh.vehicles[v].is_full() {
            return self.relocate_carried(wh, v, r, now);
        }

        let moved = match reserve(wh, v, place, now) {
            Ok(moved) => moved,
            Err(stall) => return Ok(Step::Blocked(stall)),
        };
        let box_id = take_from(wh, place, None)?;
        wh.vehicles[v].add_box(box_id.clone())?;
        self.record(wh, v, now, moved, box_id, OperationKind::Pickup);
        wh.requests[r].status = RequestStatus::DestPickup;
        Ok(Step::Done)
    }

    fn pick_up_at_source(
        &mut self,
        wh: &mut Warehouse,
        v: usize,
        r: RequestId,
        now: Time,
    ) -> Result<Step, SchedulingError> {
        if wh.vehicles[v].carries(&wh.requests[r].box_id) {
            wh.requests[r].status = RequestStatus::Src;
            return Ok(Step::Done);
        }
        if wh.vehicles[v].is_full() {
            return self.relocate_carried(wh, v, r, now);
        }
        match self.take_at_pickup(wh, v, r, now)? {
            Step::Done => {
                wh.requests[r].status = RequestStatus::Src;
                Ok(Step::Done)
            }
            step => Ok(step),
        }
    }

    /// Keep digging: the wanted box is still below other boxes.
    fn pick_another_at_source(
        &mut self,
        wh: &mut Warehouse,
        v: usize,
        r: RequestId,
        now: Time,
    ) -> Result<Step, SchedulingError> {
        self.take_at_pickup(wh, v, r, now)
    }

    /// Drive to the pickup node and load its top box (stacks) or the
    /// request's box (buffer points).
    fn take_at_pickup(
        &mut self,
        wh: &mut Warehouse,
        v: usize,
        r: RequestId,
        now: Time,
    ) -> Result<Step, SchedulingError> {
        let pickup = wh.requests[r].pickup;
        let wanted = wh.requests[r].box_id.clone();
        if let Some(stack) = wh.graph.node(pickup).as_stack() {
            if !stack.contains(&wanted) {
                return Ok(Step::Blocked(Stall::BoxElsewhere { box_id: wanted }));
            }
        }

        let moved = match reserve(wh, v, pickup, now) {
            Ok(moved) => moved,
            Err(stall) => return Ok(Step::Blocked(stall)),
        };
        let box_id = take_from(wh, pickup, Some(&wanted))?;
        wh.vehicles[v].add_box(box_id.clone())?;
        self.record(wh, v, now, moved, box_id, OperationKind::Pickup);
        Ok(Step::Done)
    }

    fn place_at_destination(
        &mut self,
        wh: &mut Warehouse,
        v: usize,
        r: RequestId,
        now: Time,
    ) -> Result<Step, SchedulingError> {
        let place = wh.requests[r].place;
        if let Some(stack) = wh.graph.node(place).as_stack() {
            if stack.is_full() {
                return Ok(Step::Blocked(Stall::DestinationFull { stack: stack.id }));
            }
        }

        let moved = match reserve(wh, v, place, now) {
            Ok(moved) => moved,
            Err(stall) => return Ok(Step::Blocked(stall)),
        };
        let box_id = wh.vehicles[v].remove_box(&wh.requests[r].box_id)?;
        put_on(wh, place, box_id.clone())?;

        let kind = if wh.requests[r].is_simulated() {
            OperationKind::PlaceRelocation
        } else {
            OperationKind::Place
        };
        wh.requests[r].status = RequestStatus::Dest;
        wh.rehome_box(&box_id, place);
        self.record(wh, v, now, moved, box_id, kind);
        Ok(Step::Done)
    }

    /// Move the top carried box to a temporary stack and start the request
    /// over.
    fn relocate_carried(
        &mut self,
        wh: &mut Warehouse,
        v: usize,
        r: RequestId,
        now: Time,
    ) -> Result<Step, SchedulingError> {
        let box_id = match wh.vehicles[v].top_box() {
            Some(box_id) => box_id.clone(),
            None => {
                return Err(SchedulingError::NothingCarried {
                    vehicle: wh.vehicles[v].name.clone(),
                })
            }
        };
        let request = &wh.requests[r];
        let query = TempStackQuery {
            count: 1,
            src: request.pickup,
            dest: request.place,
            anchor: Anchor::for_status(request.status),
        };
        let temp = match find_temp_stacks(wh, &query, v, now).first() {
            Some(node) => *node,
            None => return Ok(Step::Blocked(Stall::NoTempStack)),
        };
        let temp_stack = match wh.graph.node(temp).stack_id() {
            Some(id) => id,
            None => return Ok(Step::Blocked(Stall::NoTempStack)),
        };

        let here_stack = wh.vehicles[v]
            .current_node
            .and_then(|node| wh.graph.node(node).stack_id());
        if let Some(here) = here_stack {
            if let Some(conflict) = wh.ledger.conflicting_relocation(here, temp_stack) {
                let blocking = conflict.request;
                let finished = wh.requests.get(blocking).map_or(true, |q| q.is_done());
                if !finished {
                    let id = wh.vehicles[v].id;
                    wh.ledger.wait_for(blocking, id);
                    wh.vehicles[v].park();
                }
                return Ok(Step::Blocked(Stall::WaitingOn { request: blocking }));
            }
        }

        let moved = match reserve(wh, v, temp, now) {
            Ok(moved) => moved,
            Err(stall) => return Ok(Step::Blocked(stall)),
        };
        let expires_at = moved.end_time;
        let box_id = wh.vehicles[v].remove_box(&box_id)?;
        put_on(wh, temp, box_id.clone())?;
        wh.rehome_box(&box_id, temp);
        self.record(wh, v, now, moved, box_id, OperationKind::PlaceRelocation);
        wh.requests[r].status = RequestStatus::Initial;
        wh.ledger.record_relocation(Relocation {
            source: here_stack,
            target: temp_stack,
            request: r,
            expires_at,
        });
        Ok(Step::Done)
    }

    fn record(
        &self,
        wh: &mut Warehouse,
        v: usize,
        now: Time,
        moved: Move,
        box_id: BoxId,
        kind: OperationKind,
    ) {
        let vehicle = &wh.vehicles[v];
        let operation = Operation {
            vehicle: vehicle.name.clone(),
            start: moved.start,
            start_time: now,
            end: vehicle.location,
            end_time: moved.end_time,
            box_id,
            kind,
        };
        if self.logger.enabled(LogLevel::Debug) {
            self.logger.debug("handling", &operation.to_record());
        }
        wh.log.push(operation);
    }
}

/// Lock the node's stack, then drive the vehicle there and keep it busy for
/// travel plus one loading operation.
fn reserve(wh: &mut Warehouse, v: usize, node: NodeId, now: Time) -> Result<Move, Stall> {
    let vehicle = &wh.vehicles[v];
    let travel = if vehicle.current_node == Some(node) {
        0.0
    } else {
        wh.graph.travel_time_from(vehicle, node)
    };
    let end_time = now + travel + wh.loading_duration;
    let start = vehicle.location;

    if let Some(stack) = wh.graph.node(node).stack_id() {
        wh.ledger
            .try_lock(stack, now, end_time)
            .map_err(|busy| Stall::StackInUse {
                stack: busy.stack,
                until: busy.until,
            })?;
    }

    let location = wh.graph.node(node).location;
    let vehicle = &mut wh.vehicles[v];
    vehicle.set_busy_until(end_time);
    vehicle.move_to(node, location);
    Ok(Move { start, end_time })
}

/// Take the top box of a stack, or `wanted` from a buffer point.
fn take_from(
    wh: &mut Warehouse,
    node: NodeId,
    wanted: Option<&str>,
) -> Result<BoxId, SchedulingError> {
    let storage = &mut wh.graph.node_mut(node).storage;
    let taken = match wanted {
        Some(wanted) => storage.take(wanted),
        None => storage.pop(),
    };
    taken.ok_or_else(|| SchedulingError::EmptyStack {
        stack: storage.name().to_string(),
    })
}

fn put_on(wh: &mut Warehouse, node: NodeId, box_id: BoxId) -> Result<(), SchedulingError> {
    let storage = &mut wh.graph.node_mut(node).storage;
    storage.push(box_id).map_err(|box_id| SchedulingError::StackOverflow {
        stack: storage.name().to_string(),
        box_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::request::Request;
    use crate::scheduling::warehouse::fixtures::{node, warehouse};

    fn stack_boxes(wh: &Warehouse, name: &str) -> Vec<String> {
        wh.graph
            .node(node(wh, name))
            .as_stack()
            .unwrap()
            .boxes()
            .to_vec()
    }

    fn open(wh: &mut Warehouse, v: usize, request: Request) -> RequestId {
        let id = request.id;
        wh.add_request(request).unwrap();
        wh.vehicles[v].assign(vec![id]);
        wh.vehicles[v].open_request(id);
        id
    }

    #[test]
    fn top_box_goes_straight_to_the_buffer() {
        let mut wh = warehouse(&[("A", 3, "b1 b2 b3")], &[2]);
        let (a, buf) = (node(&wh, "A"), node(&wh, "BUF"));
        let r = open(&mut wh, 0, Request::new(1, a, buf, "b3"));
        let mut handler = RequestHandler::new(Logger::silent());

        assert!(handler.handle_request(&mut wh, 0, r, 0.0, 0).unwrap());
        assert_eq!(wh.requests[r].status, RequestStatus::Src);
        assert_eq!(stack_boxes(&wh, "A"), vec!["b1", "b2"]);

        let now = wh.vehicles[0].busy_until();
        assert!(handler.handle_request(&mut wh, 0, r, now, 0).unwrap());
        assert_eq!(wh.requests[r].status, RequestStatus::Dest);
        assert_eq!(wh.vehicles[0].load(), 0);

        let kinds: Vec<_> = wh.log.entries().iter().map(|op| op.kind).collect();
        assert_eq!(kinds, vec![OperationKind::Pickup, OperationKind::Place]);
    }

    #[test]
    fn moves_charge_travel_plus_loading() {
        let mut wh = warehouse(&[("A", 3, "b1")], &[2]);
        let (a, buf) = (node(&wh, "A"), node(&wh, "BUF"));
        let r = open(&mut wh, 0, Request::new(1, a, buf, "b1"));
        let mut handler = RequestHandler::new(Logger::silent());

        handler.handle_request(&mut wh, 0, r, 0.0, 0).unwrap();
        // vehicle starts at (0, 5): 5 to A, plus 2 for loading
        assert_eq!(wh.vehicles[0].busy_until(), 7.0);
        assert_eq!(wh.ledger.busy_until(1), 7.0);

        handler.handle_request(&mut wh, 0, r, 7.0, 0).unwrap();
        // A to BUF is 10
        assert_eq!(wh.vehicles[0].busy_until(), 19.0);
        let last = wh.log.entries().last().unwrap();
        assert_eq!(last.start_time, 7.0);
        assert_eq!(last.end, Location::new(-10, 0));
    }

    #[test]
    fn locked_stack_stalls_without_changes() {
        let mut wh = warehouse(&[("A", 3, "b1")], &[2]);
        let (a, buf) = (node(&wh, "A"), node(&wh, "BUF"));
        let r = open(&mut wh, 0, Request::new(1, a, buf, "b1"));
        wh.ledger.try_lock(1, 0.0, 50.0).unwrap();
        let mut handler = RequestHandler::new(Logger::silent());

        assert!(!handler.handle_request(&mut wh, 0, r, 3.0, 0).unwrap());
        assert_eq!(
            handler.take_stall(),
            Some(Stall::StackInUse {
                stack: 1,
                until: 50.0
            })
        );
        assert!(handler.take_stall().is_none());
        assert_eq!(wh.requests[r].status, RequestStatus::Initial);
        assert!(wh.log.is_empty());
        assert_eq!(wh.vehicles[0].current_node, None);
    }

    #[test]
    fn digging_picks_boxes_above_the_wanted_one() {
        let mut wh = warehouse(&[("A", 3, "b1 b2 b3"), ("B", 3, "")], &[2]);
        let (a, buf) = (node(&wh, "A"), node(&wh, "BUF"));
        let r = open(&mut wh, 0, Request::new(1, a, buf, "b1"));
        let mut handler = RequestHandler::new(Logger::silent());

        // b3 then b2 fill the vehicle
        handler.handle_request(&mut wh, 0, r, 0.0, 0).unwrap();
        let now = wh.vehicles[0].busy_until();
        handler.handle_request(&mut wh, 0, r, now, 0).unwrap();
        assert_eq!(wh.vehicles[0].carried(), &["b3", "b2"]);
        assert_eq!(wh.requests[r].status, RequestStatus::Src);

        // full without b1: relocate b2 and start over
        let now = wh.vehicles[0].busy_until();
        handler.handle_request(&mut wh, 0, r, now, 0).unwrap();
        assert_eq!(wh.requests[r].status, RequestStatus::Initial);
        assert_eq!(stack_boxes(&wh, "B"), vec!["b2"]);
        assert_eq!(wh.ledger.relocations().len(), 1);
        assert_eq!(
            wh.log.entries().last().unwrap().kind,
            OperationKind::PlaceRelocation
        );
    }

    #[test]
    fn full_destination_is_emptied_first() {
        let mut wh = warehouse(&[("A", 2, "b1 b2"), ("B", 3, "")], &[2]);
        let (a, buf) = (node(&wh, "A"), node(&wh, "BUF"));
        let r = open(&mut wh, 0, Request::new(1, buf, a, "n1"));
        let mut handler = RequestHandler::new(Logger::silent());

        handler.handle_request(&mut wh, 0, r, 0.0, 0).unwrap();
        assert_eq!(wh.requests[r].status, RequestStatus::DestPickup);
        assert_eq!(wh.vehicles[0].carried(), &["b2"]);

        let now = wh.vehicles[0].busy_until();
        handler.handle_request(&mut wh, 0, r, now, 0).unwrap();
        assert_eq!(wh.requests[r].status, RequestStatus::Initial);
        assert_eq!(stack_boxes(&wh, "B"), vec!["b2"]);
    }

    #[test]
    fn box_already_on_board_skips_the_pickup() {
        let mut wh = warehouse(&[("A", 3, "")], &[2]);
        let (a, buf) = (node(&wh, "A"), node(&wh, "BUF"));
        wh.vehicles[0].add_box("b7".to_string()).unwrap();
        let r = open(&mut wh, 0, Request::new(1, a, buf, "b7"));
        let mut handler = RequestHandler::new(Logger::silent());

        assert!(handler.handle_request(&mut wh, 0, r, 0.0, 0).unwrap());
        assert_eq!(wh.requests[r].status, RequestStatus::Src);
        assert!(wh.log.is_empty());
    }

    #[test]
    fn opposite_relocation_parks_the_vehicle() {
        let mut wh = warehouse(&[("A", 3, "b1 b2"), ("B", 3, "")], &[1, 1]);
        let (a, b, buf) = (node(&wh, "A"), node(&wh, "B"), node(&wh, "BUF"));
        let other = open(&mut wh, 1, Request::new(9, b, buf, "zz"));
        wh.ledger.record_relocation(Relocation {
            source: Some(2),
            target: 1,
            request: other,
            expires_at: 100.0,
        });
        let r = open(&mut wh, 0, Request::new(1, a, buf, "b1"));
        let location = wh.graph.node(a).location;
        wh.vehicles[0].move_to(a, location);
        wh.vehicles[0].add_box("b2".to_string()).unwrap();
        wh.graph.node_mut(a).as_stack_mut().unwrap().pop();
        wh.requests[r].status = RequestStatus::Src;
        let mut handler = RequestHandler::new(Logger::silent());

        assert!(!handler.handle_request(&mut wh, 0, r, 0.0, 0).unwrap());
        assert_eq!(handler.take_stall(), Some(Stall::WaitingOn { request: 9 }));
        assert!(wh.vehicles[0].is_parked());
        assert_eq!(wh.release_waiter(9, 1), Some(0));
    }

    #[test]
    fn simulated_placements_are_relocations() {
        let mut wh = warehouse(&[("A", 2, "b1 b2"), ("B", 3, "")], &[2]);
        let (a, b) = (node(&wh, "A"), node(&wh, "B"));
        let id = wh.requests.next_simulated_id();
        let r = open(&mut wh, 0, Request::simulated(id, a, b, "b2"));
        let mut handler = RequestHandler::new(Logger::silent());

        handler.handle_request(&mut wh, 0, r, 0.0, 0).unwrap();
        let now = wh.vehicles[0].busy_until();
        handler.handle_request(&mut wh, 0, r, now, 0).unwrap();

        assert!(wh.requests[r].is_done());
        let kinds: Vec<_> = wh.log.entries().iter().map(|op| op.kind).collect();
        assert_eq!(
            kinds,
            vec![OperationKind::Pickup, OperationKind::PlaceRelocation]
        );
        assert_eq!(stack_boxes(&wh, "A"), vec!["b1"]);
    }
}
