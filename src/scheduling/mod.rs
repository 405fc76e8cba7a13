/// The scheduling module drives the fleet through the three phases
///
/// This module contains:
/// - The shared warehouse state and the request state machine
/// - The temporary stack search and the request distribution
/// - The phase driver and its three strategies, run in a fixed order

pub mod buffer_to_stack;
pub mod distribution;
pub mod handling;
pub mod phase;
pub mod resolver;
pub mod stack_to_buffer;
pub mod top_box;
pub mod warehouse;

use std::fmt;
use std::time::{Duration, Instant};

use crate::error::SchedulingError;
use crate::logger::Logger;
use crate::model::request::RequestId;
use crate::model::storage::BoxId;
use crate::model::time::{truncate, Time};
use buffer_to_stack::BufferToStackStrategy;
use handling::RequestHandler;
use phase::{run_phase, PhaseReport, SchedulingStrategy};
use stack_to_buffer::StackToBufferStrategy;
use top_box::TopBoxStrategy;
use warehouse::Warehouse;

/// Outcome of a full scheduling run
#[derive(Debug, Clone)]
pub struct ScheduleReport {
    pub phases: Vec<PhaseReport>,
    pub moves: usize,
    /// Time the last operation ends
    pub makespan: Time,
    /// Clock value when the last phase finished
    pub final_time: Time,
    pub unscheduled: Vec<RequestId>,
    /// Boxes left on vehicles, by vehicle name
    pub carried: Vec<(String, Vec<BoxId>)>,
    pub elapsed: Duration,
}

impl fmt::Display for ScheduleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scheduling summary")?;
        for (index, phase) in self.phases.iter().enumerate() {
            writeln!(
                f,
                "  Phase {} ({}): {} requests{}",
                index,
                phase.name,
                phase.batch,
                if phase.skipped { ", skipped" } else { "" }
            )?;
        }
        writeln!(f, "  Moves: {}", self.moves)?;
        writeln!(f, "  Makespan: {}", truncate(self.makespan))?;
        writeln!(f, "  Final time: {}", truncate(self.final_time))?;
        if !self.unscheduled.is_empty() {
            writeln!(f, "  Unscheduled requests: {:?}", self.unscheduled)?;
        }
        for (vehicle, boxes) in &self.carried {
            writeln!(f, "  {} still carries {:?}", vehicle, boxes)?;
        }
        write!(f, "  Computed in {} ms", self.elapsed.as_millis())
    }
}

/// Runs the top box, stack to buffer and buffer to stack phases in order
pub struct Scheduler {
    handler: RequestHandler,
    logger: Logger,
    strategies: Vec<Box<dyn SchedulingStrategy>>,
}

impl Scheduler {
    pub fn new(logger: Logger) -> Self {
        Scheduler {
            handler: RequestHandler::new(logger.clone()),
            logger,
            strategies: vec![
                Box::new(TopBoxStrategy::new()),
                Box::new(StackToBufferStrategy::new()),
                Box::new(BufferToStackStrategy::new()),
            ],
        }
    }

    pub fn run(&mut self, wh: &mut Warehouse) -> Result<ScheduleReport, SchedulingError> {
        let started = Instant::now();
        let mut phases = Vec::with_capacity(self.strategies.len());
        for strategy in self.strategies.iter_mut() {
            let report = run_phase(strategy.as_mut(), wh, &mut self.handler, &self.logger)?;
            wh.end_phase();
            phases.push(report);
        }

        let carried = wh
            .vehicles
            .iter()
            .filter(|v| v.load() > 0)
            .map(|v| (v.name.clone(), v.carried().to_vec()))
            .collect();
        Ok(ScheduleReport {
            phases,
            moves: wh.log.len(),
            makespan: wh.log.makespan(),
            final_time: wh.now(),
            unscheduled: wh.unfinished_requests(),
            carried,
            elapsed: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::warehouse::fixtures::{node, warehouse};
    use super::*;
    use crate::model::graph::{Location, Node};
    use crate::model::log::OperationKind;
    use crate::model::request::Request;
    use crate::model::storage::{BoxStorage, BufferPoint, Capacity, Storage};
    use std::collections::HashSet;

    fn schedule(wh: &mut Warehouse) -> ScheduleReport {
        Scheduler::new(Logger::silent()).run(wh).unwrap()
    }

    fn kinds(wh: &Warehouse) -> Vec<OperationKind> {
        wh.log.entries().iter().map(|op| op.kind).collect()
    }

    /// Stack bounds, vehicle bounds, no duplicated box and a gap-free,
    /// non-overlapping log per vehicle.
    fn assert_consistent(wh: &Warehouse) {
        let mut seen = HashSet::new();
        for node in wh.graph.nodes() {
            if let Some(stack) = node.as_stack() {
                if let Capacity::Bounded(capacity) = stack.capacity() {
                    assert!(stack.len() <= capacity, "{} over capacity", stack.name);
                }
            }
            let boxes: Vec<BoxId> = match &node.storage {
                Storage::Stack(stack) => stack.boxes().to_vec(),
                Storage::Buffer(buffer) => buffer.boxes().to_vec(),
            };
            for box_id in boxes {
                assert!(seen.insert(box_id.clone()), "{} stored twice", box_id);
            }
        }
        for vehicle in &wh.vehicles {
            assert!(vehicle.load() <= vehicle.capacity);
            for box_id in vehicle.carried() {
                assert!(seen.insert(box_id.clone()), "{} stored twice", box_id);
            }
            let mut last_end = f64::NEG_INFINITY;
            for op in wh.log.entries().iter().filter(|op| op.vehicle == vehicle.name) {
                assert!(op.start_time >= last_end, "overlap for {}", vehicle.name);
                assert!(op.end_time >= op.start_time);
                last_end = op.end_time;
            }
        }
    }

    #[test]
    fn top_box_leaves_without_relocation() {
        let mut wh = warehouse(&[("A", 3, "b1 b2 b3")], &[2]);
        let (a, buf) = (node(&wh, "A"), node(&wh, "BUF"));
        wh.add_request(Request::new(1, a, buf, "b3")).unwrap();

        let report = schedule(&mut wh);
        assert_eq!(kinds(&wh), vec![OperationKind::Pickup, OperationKind::Place]);
        assert_eq!(report.phases[0].batch, 1);
        let stack = wh.graph.node(a).as_stack().unwrap();
        assert_eq!(stack.boxes(), &["b1", "b2"]);
        assert!(wh.graph.node(buf).storage.contains("b3"));
        assert_consistent(&wh);
    }

    #[test]
    fn full_destination_relocates_before_placing() {
        let mut wh = warehouse(&[("A", 2, "b1 b2"), ("B", 3, "")], &[2]);
        let (a, buf) = (node(&wh, "A"), node(&wh, "BUF"));
        wh.add_request(Request::new(1, buf, a, "n1")).unwrap();

        schedule(&mut wh);
        let ops = wh.log.entries();
        let reloc = ops
            .iter()
            .position(|op| op.kind == OperationKind::PlaceRelocation)
            .unwrap();
        let place = ops
            .iter()
            .position(|op| op.kind == OperationKind::Place)
            .unwrap();
        assert!(reloc < place);
        assert_eq!(ops[reloc].box_id, "b2");
        assert_eq!(ops[place].box_id, "n1");
        assert_consistent(&wh);
    }

    #[test]
    fn two_buffers_share_one_relocation() {
        let mut wh = warehouse(&[("A", 3, "b1 b2"), ("B", 3, "")], &[2]);
        let second = wh.graph.add_node(Node::new(
            Location::new(-10, 10),
            Storage::Buffer(BufferPoint::new(101, "BUF2")),
        ));
        let (a, buf) = (node(&wh, "A"), node(&wh, "BUF"));
        wh.add_request(Request::new(1, buf, a, "n1")).unwrap();
        wh.add_request(Request::new(2, second, a, "n2")).unwrap();

        let report = schedule(&mut wh);
        let relocations = kinds(&wh)
            .into_iter()
            .filter(|k| *k == OperationKind::PlaceRelocation)
            .count();
        assert_eq!(relocations, 1);
        assert!(report.unscheduled.is_empty());
        let stack = wh.graph.node(a).as_stack().unwrap();
        assert_eq!(stack.len(), 3);
        assert!(stack.contains("n1") && stack.contains("n2"));
        assert_consistent(&wh);
    }

    #[test]
    fn second_relocation_lands_on_the_stack_underfoot() {
        // after the first relocation V1 stands on S1, the only stack with room
        let mut wh = warehouse(&[("S0", 3, "b1 b2 b3"), ("S1", 3, "b4")], &[2, 1, 3]);
        let second = wh.graph.add_node(Node::new(
            Location::new(-10, 10),
            Storage::Buffer(BufferPoint::new(101, "BUF2")),
        ));
        let (s0, s1, buf) = (node(&wh, "S0"), node(&wh, "S1"), node(&wh, "BUF"));
        wh.add_request(Request::new(1, second, s0, "n0")).unwrap();
        wh.add_request(Request::new(2, buf, s0, "n1")).unwrap();

        let report = schedule(&mut wh);
        assert!(report.unscheduled.is_empty());
        let relocations = kinds(&wh)
            .into_iter()
            .filter(|k| *k == OperationKind::PlaceRelocation)
            .count();
        assert_eq!(relocations, 2);
        let target = wh.graph.node(s0).as_stack().unwrap();
        assert_eq!(target.boxes()[0], "b1");
        assert!(target.contains("n0") && target.contains("n1"));
        let temp = wh.graph.node(s1).as_stack().unwrap();
        assert_eq!(temp.boxes(), &["b4", "b3", "b2"]);
        assert_consistent(&wh);
    }

    #[test]
    fn no_requests_no_operations() {
        let mut wh = warehouse(&[("A", 3, "b1")], &[2]);
        let report = schedule(&mut wh);
        assert!(wh.log.is_empty());
        assert_eq!(report.moves, 0);
        assert_eq!(report.makespan, 0.0);
        assert_eq!(report.phases.len(), 3);
        assert!(report.phases.iter().all(|p| p.batch == 0));
    }

    #[test]
    fn mixed_requests_run_through_all_phases() {
        let mut wh = warehouse(&[("A", 3, "a1 a2 a3"), ("B", 3, "b1 b2"), ("C", 3, "")], &[2]);
        let (a, b, c, buf) = (node(&wh, "A"), node(&wh, "B"), node(&wh, "C"), node(&wh, "BUF"));
        wh.add_request(Request::new(1, a, buf, "a3")).unwrap();
        wh.add_request(Request::new(2, a, buf, "a1")).unwrap();
        wh.add_request(Request::new(3, b, buf, "b2")).unwrap();
        wh.add_request(Request::new(4, buf, c, "n1")).unwrap();

        let report = schedule(&mut wh);
        let batches: Vec<_> = report.phases.iter().map(|p| p.batch).collect();
        assert_eq!(batches, vec![2, 1, 1]);
        assert!(report.unscheduled.is_empty());
        assert!(wh.requests.iter().all(|r| r.is_done()));
        assert_eq!(report.moves, 9);
        assert_eq!(truncate(report.makespan), 103);
        // a2 was picked on the way to a1 and never needed again
        assert_eq!(report.carried, vec![("V1".to_string(), vec!["a2".to_string()])]);
        assert_consistent(&wh);
    }

    #[test]
    fn vehicles_work_their_own_stacks() {
        let mut wh = warehouse(&[("A", 3, "a1 a2"), ("B", 3, "b1 b2")], &[1, 1]);
        let (a, b, buf) = (node(&wh, "A"), node(&wh, "B"), node(&wh, "BUF"));
        wh.add_request(Request::new(1, a, buf, "a2")).unwrap();
        wh.add_request(Request::new(2, b, buf, "b2")).unwrap();

        schedule(&mut wh);
        let moves_by = |name: &str| wh.log.entries().iter().filter(|op| op.vehicle == name).count();
        assert_eq!(moves_by("V1"), 2);
        assert_eq!(moves_by("V2"), 2);
        let first = wh.log.entries().first().unwrap();
        assert_eq!((first.vehicle.as_str(), first.box_id.as_str()), ("V1", "a2"));
        assert_consistent(&wh);
    }

    #[test]
    fn summary_mentions_skipped_phases() {
        let mut wh = warehouse(&[("A", 1, "b1")], &[2]);
        let (a, buf) = (node(&wh, "A"), node(&wh, "BUF"));
        wh.add_request(Request::new(1, buf, a, "n1")).unwrap();

        let report = schedule(&mut wh);
        assert!(report.phases[2].skipped);
        assert_eq!(report.unscheduled, vec![1]);
        let summary = report.to_string();
        assert!(summary.contains("Phase 2 (buffer to stack): 1 requests, skipped"));
        assert!(summary.contains("Unscheduled requests: [1]"));
    }
}
