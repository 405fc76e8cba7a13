use std::collections::BTreeSet;

use super::warehouse::Warehouse;
use crate::model::graph::NodeId;
use crate::model::request::RequestStatus;
use crate::model::storage::{BoxStorage, StackId};
use crate::model::time::Time;

/// Which end of the request a temporary stack should be close to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Pickup,
    Place,
    /// Capacity planning only: nothing moves yet, so stack locks are ignored.
    Lookahead,
}

impl Anchor {
    pub fn for_status(status: RequestStatus) -> Self {
        match status {
            RequestStatus::Src => Anchor::Pickup,
            _ => Anchor::Place,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TempStackQuery {
    pub count: usize,
    pub src: NodeId,
    pub dest: NodeId,
    pub anchor: Anchor,
}

/// Finds up to `query.count` stacks that can take a relocated box for the
/// vehicle at `vehicle`.
///
/// Candidates never include the request's own pickup or place node or a full
/// stack. Tiers are tried in order and the first one with a hit wins:
/// 1. stacks the vehicle itself claimed this phase and that are unlocked,
///    other than the one it stands on
/// 2. the unlocked stack nearest to the anchor that no vehicle claimed; the
///    stack the vehicle stands on counts as unclaimed
/// 3. the unlocked stack nearest to the anchor claimed by another vehicle,
///    other than the one it stands on
pub fn find_temp_stacks(
    wh: &Warehouse,
    query: &TempStackQuery,
    vehicle: usize,
    now: Time,
) -> Vec<NodeId> {
    if query.count == 0 {
        return Vec::new();
    }
    let me = &wh.vehicles[vehicle];
    let here = me.current_node;

    let usable = |node: NodeId| -> bool {
        if node == query.src || node == query.dest {
            return false;
        }
        match wh.graph.node(node).as_stack() {
            Some(stack) => !stack.is_full(),
            None => false,
        }
    };
    let unlocked = |node: NodeId| -> bool {
        match wh.graph.node(node).stack_id() {
            Some(id) => wh.ledger.is_stack_available(id, now),
            None => false,
        }
    };

    // Own stacks
    let own: Vec<NodeId> = me
        .my_stacks()
        .iter()
        .filter_map(|id| wh.graph.stack_node(*id))
        .filter(|node| Some(*node) != here && usable(*node) && unlocked(*node))
        .take(query.count)
        .collect();
    if !own.is_empty() {
        return own;
    }

    let reference = match query.anchor {
        Anchor::Pickup => query.src,
        Anchor::Place | Anchor::Lookahead => query.dest,
    };
    let by_distance = |mut nodes: Vec<NodeId>| -> Vec<NodeId> {
        nodes.sort_by(|a, b| {
            let ta = wh.graph.travel_time(reference, *a);
            let tb = wh.graph.travel_time(reference, *b);
            ta.partial_cmp(&tb)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(b))
        });
        nodes
    };

    // Unclaimed stacks
    let here_stack = here.and_then(|node| wh.graph.node(node).stack_id());
    let claimed: BTreeSet<StackId> = wh
        .vehicles
        .iter()
        .flat_map(|v| v.my_stacks().iter().copied())
        .filter(|id| Some(*id) != here_stack)
        .collect();
    let unclaimed: Vec<NodeId> = wh
        .graph
        .stack_nodes()
        .filter(|node| {
            wh.graph
                .node(*node)
                .stack_id()
                .map_or(false, |id| !claimed.contains(&id))
        })
        .filter(|node| usable(*node))
        .collect();
    let unclaimed: Vec<NodeId> = by_distance(unclaimed)
        .into_iter()
        .filter(|node| query.anchor == Anchor::Lookahead || unlocked(*node))
        .take(query.count)
        .collect();
    if !unclaimed.is_empty() {
        return unclaimed;
    }

    // Stacks borrowed from other vehicles
    let borrowed: BTreeSet<StackId> = wh
        .vehicles
        .iter()
        .enumerate()
        .filter(|(index, _)| *index != vehicle)
        .flat_map(|(_, v)| v.my_stacks().iter().copied())
        .collect();
    let borrowed: Vec<NodeId> = borrowed
        .iter()
        .filter_map(|id| wh.graph.stack_node(*id))
        .filter(|node| Some(*node) != here && usable(*node) && unlocked(*node))
        .collect();
    by_distance(borrowed)
        .into_iter()
        .take(query.count)
        .collect()
}
