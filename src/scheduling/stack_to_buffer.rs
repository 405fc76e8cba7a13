use super::distribution::GroupBy;
use super::handling::RequestHandler;
use super::phase::{node_available, pickup_depth, OutboundDriver, SchedulingStrategy};
use super::warehouse::Warehouse;
use crate::error::SchedulingError;
use crate::model::request::RequestId;
use crate::model::time::Time;

/// Second phase: every remaining request that starts on a stack.
///
/// Boxes buried under others are dug out, relocating whatever sits on top.
/// Requests run shallowest-first so a stack is never popped past a box
/// another request still needs.
pub struct StackToBufferStrategy {
    driver: OutboundDriver,
}

impl StackToBufferStrategy {
    pub fn new() -> Self {
        StackToBufferStrategy {
            driver: OutboundDriver::new(),
        }
    }
}

/// Top up when the next queued box is already on board, there is room left
/// and the vehicle is not standing at that request's place.
fn box_on_board(wh: &Warehouse, vehicle: usize, now: Time) -> bool {
    let v = &wh.vehicles[vehicle];
    let next = match v.assigned.first() {
        Some(next) => &wh.requests[*next],
        None => return false,
    };
    v.carries(&next.box_id)
        && !v.is_full()
        && v.current_node != Some(next.place)
        && node_available(wh, next.pickup, now)
}

impl SchedulingStrategy for StackToBufferStrategy {
    fn name(&self) -> &'static str {
        "stack to buffer"
    }

    fn select(&self, wh: &Warehouse) -> Vec<RequestId> {
        let mut batch: Vec<RequestId> = wh
            .pending
            .iter()
            .copied()
            .filter(|id| !wh.graph.node(wh.requests[*id].pickup).is_buffer())
            .collect();
        batch.sort_by_key(|id| pickup_depth(wh, *id));
        batch
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
        self.driver.step(wh, handler, vehicle, now, &box_on_board)
    }
}
