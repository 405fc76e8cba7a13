/// Buffer to stack phase - bringing boxes from the buffer points into stacks
///
/// A vehicle works one destination stack at a time. Before the first real
/// placement it frees the room its open requests need by moving top boxes
/// away through simulated requests. Placements then run with the vehicle
/// loading as many boxes at the buffer as it can carry.

use super::distribution::GroupBy;
use super::handling::RequestHandler;
use super::phase::{next_to_open, siblings, SchedulingStrategy};
use super::resolver::{find_temp_stacks, Anchor, TempStackQuery};
use super::warehouse::Warehouse;
use crate::error::SchedulingError;
use crate::logger::Logger;
use crate::model::request::{Request, RequestId};
use crate::model::storage::BoxStorage;
use crate::model::time::Time;

pub struct BufferToStackStrategy;

impl BufferToStackStrategy {
    pub fn new() -> Self {
        BufferToStackStrategy
    }

    /// Open every assigned request that shares the place of the first one the
    /// phase allows to start.
    fn open_destination_group(wh: &mut Warehouse, vehicle: usize, now: Time) -> bool {
        let first = match next_to_open(wh, vehicle, now) {
            Some(first) => first,
            None => return false,
        };
        let place = wh.requests[first].place;
        let id = wh.vehicles[vehicle].id;
        let group: Vec<RequestId> = wh.vehicles[vehicle]
            .assigned
            .iter()
            .copied()
            .filter(|r| wh.requests[*r].place == place)
            .collect();
        for request in group {
            wh.requests[request].assigned_vehicle = Some(id);
            wh.vehicles[vehicle].queue_open(request);
        }
        true
    }

    /// Queue a simulated request that moves the place stack's top box to a
    /// temporary stack. Returns its id, or None when no stack can take it.
    fn simulate_room(wh: &mut Warehouse, vehicle: usize, first: RequestId, now: Time) -> Option<RequestId> {
        let (pickup, place) = (wh.requests[first].pickup, wh.requests[first].place);
        let query = TempStackQuery {
            count: 1,
            src: pickup,
            dest: place,
            anchor: Anchor::Lookahead,
        };
        let temp = *find_temp_stacks(wh, &query, vehicle, now).first()?;
        let top = wh.graph.node(place).storage.peek()?.clone();

        let id = wh.requests.next_simulated_id();
        let mut request = Request::simulated(id, place, temp, &top);
        request.assigned_vehicle = Some(wh.vehicles[vehicle].id);
        wh.requests.insert(request).ok()?;
        let v = &mut wh.vehicles[vehicle];
        v.add_simulated(id);
        v.open_last_simulated()
    }

    /// While the current box is on board at its pickup and there is room,
    /// switch to another open request to load in the same stop: first one
    /// from the same pickup, else any from a buffer point.
    fn find_next_request(wh: &Warehouse, vehicle: usize, current: RequestId) -> Option<RequestId> {
        let v = &wh.vehicles[vehicle];
        let request = &wh.requests[current];
        let holds_it = v.top_box() == Some(&request.box_id);
        if v.open.len() < 2 || !holds_it || v.current_node != Some(request.pickup) || v.is_full() {
            return None;
        }
        let not_loaded = |id: &RequestId| !v.carries(&wh.requests[*id].box_id);
        v.open
            .iter()
            .copied()
            .filter(not_loaded)
            .find(|id| wh.requests[*id].pickup == request.pickup)
            .or_else(|| {
                v.open
                    .iter()
                    .copied()
                    .filter(not_loaded)
                    .find(|id| wh.graph.node(wh.requests[*id].pickup).is_buffer())
            })
    }

    fn step_simulated(
        wh: &mut Warehouse,
        handler: &mut RequestHandler,
        vehicle: usize,
        simulated: RequestId,
        now: Time,
    ) -> Result<bool, SchedulingError> {
        let progress = handler.handle_request(wh, vehicle, simulated, now, 0)?;
        if wh.requests[simulated].is_done() {
            wh.vehicles[vehicle].close_simulated(simulated);
            wh.release_waiter(simulated, vehicle);
            return Ok(true);
        }
        Ok(progress)
    }
}

impl SchedulingStrategy for BufferToStackStrategy {
    fn name(&self) -> &'static str {
        "buffer to stack"
    }

    fn select(&self, wh: &Warehouse) -> Vec<RequestId> {
        wh.pending
            .iter()
            .copied()
            .filter(|id| {
                let request = &wh.requests[*id];
                wh.graph.node(request.pickup).is_buffer() && !wh.graph.node(request.place).is_buffer()
            })
            .collect()
    }

    fn group_by(&self) -> GroupBy {
        GroupBy::Place
    }

    fn admits(&self, wh: &Warehouse, batch: &[RequestId], logger: &Logger) -> bool {
        let free = wh.graph.total_free_stack_space();
        if free < batch.len() {
            logger.warning(
                "scheduler",
                &format!(
                    "Not enough space for {} requests, only {} free stack slots. Skipping phase",
                    batch.len(),
                    free
                ),
            );
            return false;
        }
        true
    }

    fn step_vehicle(
        &mut self,
        wh: &mut Warehouse,
        handler: &mut RequestHandler,
        vehicle: usize,
        now: Time,
    ) -> Result<bool, SchedulingError> {
        if let Some(simulated) = wh.vehicles[vehicle].open_simulated.first().copied() {
            return Self::step_simulated(wh, handler, vehicle, simulated, now);
        }

        if wh.vehicles[vehicle].open.is_empty() && !Self::open_destination_group(wh, vehicle, now) {
            return Ok(false);
        }
        let first = match wh.vehicles[vehicle].open.first() {
            Some(first) => *first,
            None => return Ok(false),
        };

        let place = wh.requests[first].place;
        let (free, place_empty) = match wh.graph.node(place).as_stack() {
            Some(stack) => (stack.free_slots(), stack.is_empty()),
            None => (usize::MAX, true),
        };
        let required_extra = wh.vehicles[vehicle].open.len().saturating_sub(free);
        if required_extra > 0 && !place_empty {
            return match Self::simulate_room(wh, vehicle, first, now) {
                Some(simulated) => Self::step_simulated(wh, handler, vehicle, simulated, now),
                None => Ok(false),
            };
        }

        let v = &wh.vehicles[vehicle];
        let mut current = match v.current_request {
            Some(current) if v.open.contains(&current) => current,
            _ => first,
        };
        if let Some(next) = Self::find_next_request(wh, vehicle, current) {
            current = next;
        }
        wh.vehicles[vehicle].current_request = Some(current);

        let sib = siblings(wh, vehicle, current);
        let progress = handler.handle_request(wh, vehicle, current, now, sib)?;
        if !wh.requests[current].is_done() {
            return Ok(progress);
        }

        let v = &wh.vehicles[vehicle];
        let loaded = v
            .open
            .iter()
            .copied()
            .find(|id| *id != current && v.carries(&wh.requests[*id].box_id));
        match loaded {
            Some(next) => wh.vehicles[vehicle].close_request_then(current, next),
            None => wh.vehicles[vehicle].close_request(current),
        }
        wh.release_waiter(current, vehicle);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::log::OperationKind;
    use crate::scheduling::phase::run_phase;
    use crate::scheduling::warehouse::fixtures::{node, warehouse};

    fn run(wh: &mut Warehouse) -> bool {
        // third phase
        wh.end_phase();
        wh.end_phase();
        let mut handler = RequestHandler::new(Logger::silent());
        run_phase(&mut BufferToStackStrategy::new(), wh, &mut handler, &Logger::silent())
            .unwrap()
            .skipped
    }

    fn kinds(wh: &Warehouse) -> Vec<OperationKind> {
        wh.log.entries().iter().map(|op| op.kind).collect()
    }

    #[test]
    fn selects_buffer_to_stack_requests() {
        let mut wh = warehouse(&[("A", 3, "b1"), ("B", 3, "")], &[2]);
        let (a, b, buf) = (node(&wh, "A"), node(&wh, "B"), node(&wh, "BUF"));
        wh.add_request(Request::new(1, a, buf, "b1")).unwrap();
        wh.add_request(Request::new(2, buf, b, "n1")).unwrap();
        wh.add_request(Request::new(3, buf, a, "n2")).unwrap();
        assert_eq!(BufferToStackStrategy::new().select(&wh), vec![2, 3]);
    }

    #[test]
    fn full_destination_is_cleared_by_a_simulated_request() {
        let mut wh = warehouse(&[("A", 2, "b1 b2"), ("B", 3, "")], &[2]);
        let (a, buf) = (node(&wh, "A"), node(&wh, "BUF"));
        wh.add_request(Request::new(1, buf, a, "n1")).unwrap();

        assert!(!run(&mut wh));
        assert_eq!(
            kinds(&wh),
            vec![
                OperationKind::Pickup,
                OperationKind::PlaceRelocation,
                OperationKind::Pickup,
                OperationKind::Place
            ]
        );
        assert_eq!(wh.log.entries()[1].box_id, "b2");
        let a_boxes = wh.graph.node(a).as_stack().unwrap().boxes().to_vec();
        assert_eq!(a_boxes, vec!["b1", "n1"]);
        assert!(wh.vehicles[0].open_simulated.is_empty());
    }

    #[test]
    fn one_relocation_makes_room_for_two_boxes() {
        let mut wh = warehouse(&[("A", 3, "b1 b2"), ("B", 3, "")], &[2]);
        let (a, buf) = (node(&wh, "A"), node(&wh, "BUF"));
        wh.add_request(Request::new(1, buf, a, "n1")).unwrap();
        wh.add_request(Request::new(2, buf, a, "n2")).unwrap();

        assert!(!run(&mut wh));
        let relocations = kinds(&wh)
            .into_iter()
            .filter(|k| *k == OperationKind::PlaceRelocation)
            .count();
        assert_eq!(relocations, 1);
        assert!(wh.requests[1].is_done() && wh.requests[2].is_done());

        // both boxes were loaded in one stop at the buffer
        assert_eq!(
            kinds(&wh)[2..].to_vec(),
            vec![
                OperationKind::Pickup,
                OperationKind::Pickup,
                OperationKind::Place,
                OperationKind::Place
            ]
        );
    }

    #[test]
    fn phase_is_skipped_without_enough_space() {
        let mut wh = warehouse(&[("A", 1, "b1")], &[2]);
        let (a, buf) = (node(&wh, "A"), node(&wh, "BUF"));
        wh.add_request(Request::new(1, buf, a, "n1")).unwrap();

        assert!(run(&mut wh));
        assert!(wh.log.is_empty());
        assert_eq!(wh.unfinished_requests(), vec![1]);
    }
}
