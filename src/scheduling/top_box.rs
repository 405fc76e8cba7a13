use super::distribution::GroupBy;
use super::handling::RequestHandler;
use super::phase::{pickup_depth, OutboundDriver, SchedulingStrategy};
use super::warehouse::Warehouse;
use crate::error::SchedulingError;
use crate::model::request::RequestId;
use crate::model::storage::BoxStorage;
use crate::model::time::Time;

/// First phase: boxes that can leave their stack without any relocation.
///
/// Takes every stack-to-buffer request whose box is on top of its stack,
/// together with the unbroken run of requested boxes right below it.
pub struct TopBoxStrategy {
    driver: OutboundDriver,
}

impl TopBoxStrategy {
    pub fn new() -> Self {
        TopBoxStrategy {
            driver: OutboundDriver::new(),
        }
    }
}

fn is_outbound(wh: &Warehouse, id: RequestId) -> bool {
    let request = &wh.requests[id];
    !wh.graph.node(request.pickup).is_buffer() && wh.graph.node(request.place).is_buffer()
}

/// Load more while there is room and more queued
fn keep_loading(wh: &Warehouse, vehicle: usize, _now: Time) -> bool {
    let v = &wh.vehicles[vehicle];
    !v.is_full() && !v.assigned.is_empty()
}

impl SchedulingStrategy for TopBoxStrategy {
    fn name(&self) -> &'static str {
        "top box"
    }

    fn select(&self, wh: &Warehouse) -> Vec<RequestId> {
        let mut batch: Vec<RequestId> = Vec::new();
        for id in &wh.pending {
            if batch.contains(id) || !is_outbound(wh, *id) {
                continue;
            }
            let request = &wh.requests[*id];
            let stack = match wh.graph.node(request.pickup).as_stack() {
                Some(stack) => stack,
                None => continue,
            };
            if stack.peek() != Some(&request.box_id) {
                continue;
            }
            batch.push(*id);

            // follow the run of requested boxes below the top
            for depth in 1..stack.len() {
                let below = match stack.box_at_depth(depth) {
                    Some(below) => below,
                    None => break,
                };
                let next = wh.pending.iter().copied().find(|other| {
                    !batch.contains(other)
                        && is_outbound(wh, *other)
                        && wh.requests[*other].box_id == *below
                        && wh.requests[*other].pickup == request.pickup
                });
                match next {
                    Some(other) => batch.push(other),
                    None => break,
                }
            }
        }
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
        self.driver.step(wh, handler, vehicle, now, &keep_loading)
    }
}
