use super::distribution::{apply_distribution, plan_distribution, GroupBy};
use super::handling::RequestHandler;
use super::warehouse::Warehouse;
use crate::error::SchedulingError;
use crate::logger::Logger;
use crate::model::graph::NodeId;
use crate::model::request::RequestId;
use crate::model::time::{truncate, Time};

/// One scheduling phase: which requests it takes and how a vehicle acts on
/// them each tick.
pub trait SchedulingStrategy {
    fn name(&self) -> &'static str;

    /// Pick this phase's batch from the pending pool, in execution order.
    fn select(&self, wh: &Warehouse) -> Vec<RequestId>;

    fn group_by(&self) -> GroupBy;

    /// Whether the batch can run at all. A refused batch skips the phase.
    fn admits(&self, _wh: &Warehouse, _batch: &[RequestId], _logger: &Logger) -> bool {
        true
    }

    /// Reset per-phase state once the batch is distributed.
    fn begin(&mut self, _wh: &Warehouse) {}

    /// Let the available vehicle at index `vehicle` take one action.
    /// Returns true when anything changed.
    fn step_vehicle(
        &mut self,
        wh: &mut Warehouse,
        handler: &mut RequestHandler,
        vehicle: usize,
        now: Time,
    ) -> Result<bool, SchedulingError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhaseReport {
    pub name: &'static str,
    pub batch: usize,
    pub skipped: bool,
    pub finished_at: Time,
}

/// Run one phase to completion on the shared clock.
pub fn run_phase(
    strategy: &mut dyn SchedulingStrategy,
    wh: &mut Warehouse,
    handler: &mut RequestHandler,
    logger: &Logger,
) -> Result<PhaseReport, SchedulingError> {
    let batch = strategy.select(wh);
    wh.remove_pending(&batch);
    logger.info(
        "scheduler",
        &format!(
            "Phase {} ({}) starts at time {} with {} requests",
            wh.phase(),
            strategy.name(),
            truncate(wh.now()),
            batch.len()
        ),
    );

    let mut report = PhaseReport {
        name: strategy.name(),
        batch: batch.len(),
        skipped: false,
        finished_at: wh.now(),
    };
    if batch.is_empty() {
        return Ok(report);
    }
    if !strategy.admits(wh, &batch, logger) {
        report.skipped = true;
        return Ok(report);
    }

    let plan = plan_distribution(&batch, &wh.requests, strategy.group_by(), wh.vehicles.len())?;
    apply_distribution(wh, plan);
    strategy.begin(wh);

    while !wh.all_idle() {
        let now = wh.now();
        wh.ledger.prune_relocations(now);

        let mut progress = false;
        for vehicle in 0..wh.vehicles.len() {
            let candidate = &wh.vehicles[vehicle];
            if !candidate.is_available(now) || !candidate.has_work() {
                continue;
            }
            if strategy.step_vehicle(wh, handler, vehicle, now)? {
                progress = true;
            }
            if let Some(stall) = handler.take_stall() {
                logger.debug(
                    "scheduler",
                    &format!("{} waits at time {}: {}", wh.vehicles[vehicle].name, truncate(now), stall),
                );
            }
        }

        if wh.all_idle() {
            break;
        }
        if !progress && wh.is_frozen(now) {
            logger.debug("scheduler", &wh.status());
            return Err(SchedulingError::Stalled {
                time: now,
                vehicles: wh.busy_vehicle_names(),
            });
        }
        wh.clock.advance();
    }

    report.finished_at = wh.now();
    logger.info(
        "scheduler",
        &format!(
            "Phase {} ({}) done at time {}",
            wh.phase(),
            strategy.name(),
            truncate(report.finished_at)
        ),
    );
    Ok(report)
}

/// Other open requests of the vehicle that share this request's place node.
pub(crate) fn siblings(wh: &Warehouse, vehicle: usize, request: RequestId) -> usize {
    let place = wh.requests[request].place;
    wh.vehicles[vehicle]
        .open
        .iter()
        .filter(|id| **id != request && wh.requests[**id].place == place)
        .count()
}

/// Whether the stack behind a node is free at `now`. Buffer points always are.
pub(crate) fn node_available(wh: &Warehouse, node: NodeId, now: Time) -> bool {
    match wh.graph.node(node).stack_id() {
        Some(stack) => wh.ledger.is_stack_available(stack, now),
        None => true,
    }
}

/// Next assigned request the running phase allows the vehicle to open.
/// The first phase takes requests in queue order, the second waits for a
/// free pickup stack, later phases wait for a free place stack.
pub(crate) fn next_to_open(wh: &Warehouse, vehicle: usize, now: Time) -> Option<RequestId> {
    let assigned = &wh.vehicles[vehicle].assigned;
    match wh.phase() {
        0 => assigned.first().copied(),
        1 => assigned
            .iter()
            .copied()
            .find(|id| node_available(wh, wh.requests[*id].pickup, now)),
        _ => assigned
            .iter()
            .copied()
            .find(|id| node_available(wh, wh.requests[*id].place, now)),
    }
}

/// Depth of the request's box in its pickup stack, 1 for the top box.
/// Boxes not found in a stack sort last.
pub(crate) fn pickup_depth(wh: &Warehouse, request: RequestId) -> usize {
    let request = &wh.requests[request];
    wh.graph
        .node(request.pickup)
        .as_stack()
        .and_then(|stack| stack.depth_of(&request.box_id))
        .unwrap_or(usize::MAX)
}

/// The vehicle-driving loop shared by the two phases that carry boxes out of
/// the stacks.
///
/// A vehicle either tops up (loads the next queued request while it still
/// has room), opens a new request, or works its oldest open request.
pub(crate) struct OutboundDriver {
    top_up: Vec<bool>,
}

impl OutboundDriver {
    pub fn new() -> Self {
        OutboundDriver { top_up: Vec::new() }
    }

    pub fn begin(&mut self, vehicles: usize) {
        self.top_up = vec![false; vehicles];
    }

    fn open_and_handle(
        &mut self,
        wh: &mut Warehouse,
        handler: &mut RequestHandler,
        vehicle: usize,
        request: RequestId,
        now: Time,
        top_up: &dyn Fn(&Warehouse, usize, Time) -> bool,
    ) -> Result<bool, SchedulingError> {
        let id = wh.vehicles[vehicle].id;
        wh.requests[request].assigned_vehicle = Some(id);
        wh.vehicles[vehicle].open_request(request);
        let sib = siblings(wh, vehicle, request);
        handler.handle_request(wh, vehicle, request, now, sib)?;
        self.top_up[vehicle] = top_up(wh, vehicle, now);
        Ok(true)
    }

    pub fn step(
        &mut self,
        wh: &mut Warehouse,
        handler: &mut RequestHandler,
        vehicle: usize,
        now: Time,
        top_up: &dyn Fn(&Warehouse, usize, Time) -> bool,
    ) -> Result<bool, SchedulingError> {
        if self.top_up.len() < wh.vehicles.len() {
            self.top_up.resize(wh.vehicles.len(), false);
        }
        let v = &wh.vehicles[vehicle];
        if v.assigned.is_empty() {
            self.top_up[vehicle] = false;
        }

        if self.top_up[vehicle] {
            let first = v.assigned[0];
            if !node_available(wh, wh.requests[first].pickup, now) {
                return Ok(false);
            }
            return self.open_and_handle(wh, handler, vehicle, first, now, top_up);
        }

        if v.current_request.is_none() && v.open.is_empty() && !v.assigned.is_empty() {
            return match next_to_open(wh, vehicle, now) {
                Some(request) => self.open_and_handle(wh, handler, vehicle, request, now, top_up),
                None => Ok(false),
            };
        }

        let request = match v.open.first() {
            Some(request) => *request,
            None => return Ok(false),
        };
        let sib = siblings(wh, vehicle, request);
        let progress = handler.handle_request(wh, vehicle, request, now, sib)?;
        if wh.requests[request].is_done() {
            wh.vehicles[vehicle].close_request(request);
            wh.release_waiter(request, vehicle);
            return Ok(true);
        }
        Ok(progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::request::Request;
    use crate::scheduling::warehouse::fixtures::{node, warehouse};

    /// Takes whatever is pending and works requests one at a time.
    struct Everything {
        driver: OutboundDriver,
    }

    impl SchedulingStrategy for Everything {
        fn name(&self) -> &'static str {
            "everything"
        }

        fn select(&self, wh: &Warehouse) -> Vec<RequestId> {
            wh.pending.clone()
        }

        fn group_by(&self) -> GroupBy {
            GroupBy::Pickup
        }

        fn begin(&mut self, wh: &Warehouse) {
            self.driver.begin(wh.vehicles.len());
        }

        fn step_vehicle(
            &mut self,
            wh: &mut Warehouse,
            handler: &mut RequestHandler,
            vehicle: usize,
            now: Time,
        ) -> Result<bool, SchedulingError> {
            self.driver
                .step(wh, handler, vehicle, now, &|_: &Warehouse, _: usize, _: Time| false)
        }
    }

    fn everything() -> Everything {
        Everything {
            driver: OutboundDriver::new(),
        }
    }

    #[test]
    fn empty_batch_finishes_immediately() {
        let mut wh = warehouse(&[("A", 3, "b1")], &[2]);
        let mut handler = RequestHandler::new(Logger::silent());
        let report = run_phase(&mut everything(), &mut wh, &mut handler, &Logger::silent()).unwrap();

        assert_eq!(report.batch, 0);
        assert_eq!(report.finished_at, 0.0);
        assert!(wh.log.is_empty());
    }

    #[test]
    fn phase_runs_until_vehicles_are_idle() {
        let mut wh = warehouse(&[("A", 3, "b1 b2")], &[1]);
        let (a, buf) = (node(&wh, "A"), node(&wh, "BUF"));
        wh.add_request(Request::new(1, a, buf, "b2")).unwrap();
        wh.add_request(Request::new(2, a, buf, "b1")).unwrap();
        let mut handler = RequestHandler::new(Logger::silent());

        let report = run_phase(&mut everything(), &mut wh, &mut handler, &Logger::silent()).unwrap();
        assert_eq!(report.batch, 2);
        assert!(wh.all_idle());
        assert!(wh.requests.iter().all(|r| r.is_done()));
        assert_eq!(wh.log.len(), 4);
        assert!(wh.pending.is_empty());
    }

    #[test]
    fn impossible_work_is_reported_as_a_stall() {
        // the box is nowhere to be found and nothing else moves
        let mut wh = warehouse(&[("A", 3, "b1")], &[1]);
        let (a, buf) = (node(&wh, "A"), node(&wh, "BUF"));
        wh.add_request(Request::new(1, a, buf, "ghost")).unwrap();
        let mut handler = RequestHandler::new(Logger::silent());

        let err = run_phase(&mut everything(), &mut wh, &mut handler, &Logger::silent()).unwrap_err();
        match err {
            SchedulingError::Stalled { vehicles, .. } => assert_eq!(vehicles, vec!["V1"]),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn siblings_count_other_open_requests_to_the_same_place() {
        let mut wh = warehouse(&[("A", 3, ""), ("B", 3, "")], &[2]);
        let (a, b, buf) = (node(&wh, "A"), node(&wh, "B"), node(&wh, "BUF"));
        wh.add_request(Request::new(1, buf, a, "x")).unwrap();
        wh.add_request(Request::new(2, buf, a, "y")).unwrap();
        wh.add_request(Request::new(3, buf, b, "z")).unwrap();
        wh.vehicles[0].assign(vec![1, 2, 3]);
        for id in [1, 2, 3] {
            wh.vehicles[0].queue_open(id);
        }
        assert_eq!(siblings(&wh, 0, 1), 1);
        assert_eq!(siblings(&wh, 0, 3), 0);
    }

    #[test]
    fn opening_waits_for_the_stack_each_phase_needs() {
        let mut wh = warehouse(&[("A", 3, "a1"), ("B", 3, "b1"), ("C", 3, "")], &[2]);
        let (a, b, c, buf) = (node(&wh, "A"), node(&wh, "B"), node(&wh, "C"), node(&wh, "BUF"));
        wh.add_request(Request::new(1, a, buf, "a1")).unwrap();
        wh.add_request(Request::new(2, b, c, "b1")).unwrap();
        wh.add_request(Request::new(3, buf, a, "n1")).unwrap();
        wh.ledger.try_lock(1, 0.0, 10.0).unwrap();
        wh.vehicles[0].assigned = vec![1, 2];

        // queue order, locks or not
        assert_eq!(next_to_open(&wh, 0, 5.0), Some(1));

        // pickup stack must be free
        wh.end_phase();
        assert_eq!(next_to_open(&wh, 0, 5.0), Some(2));
        assert_eq!(next_to_open(&wh, 0, 10.0), Some(1));

        // place stack must be free
        wh.end_phase();
        wh.vehicles[0].assigned = vec![3, 2];
        assert_eq!(next_to_open(&wh, 0, 5.0), Some(2));
        wh.ledger.try_lock(3, 0.0, 10.0).unwrap();
        assert_eq!(next_to_open(&wh, 0, 5.0), None);
        assert_eq!(next_to_open(&wh, 0, 10.0), Some(3));
    }
}
