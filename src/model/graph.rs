/// The spatial layout of the warehouse.
///
/// Every storage place is a node at a fixed location. Travel between two
/// nodes costs the Euclidean distance divided by the vehicle speed, and the
/// dense travel-time matrix always holds the shortest time over any chain of
/// nodes.

use std::collections::HashMap;
use std::fmt;

use super::storage::{BoxStorage, StackId, Stack, Storage};
use super::time::Time;
use super::vehicle::Vehicle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Location {
    pub x: i64,
    pub y: i64,
}

impl Location {
    pub fn new(x: i64, y: i64) -> Self {
        Location { x, y }
    }

    pub fn distance_to(&self, other: &Location) -> f64 {
        let dx = (other.x - self.x) as f64;
        let dy = (other.y - self.y) as f64;
        (dx * dx + dy * dy).sqrt()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Index of a node in its graph.
pub type NodeId = usize;

/// A storage place pinned to a location. Two nodes are the same node when
/// they share a location.
#[derive(Debug, Clone)]
pub struct Node {
    pub location: Location,
    pub storage: Storage,
}

impl Node {
    pub fn new(location: Location, storage: Storage) -> Self {
        Node { location, storage }
    }

    pub fn name(&self) -> &str {
        self.storage.name()
    }

    pub fn is_buffer(&self) -> bool {
        self.storage.is_buffer()
    }

    pub fn as_stack(&self) -> Option<&Stack> {
        self.storage.as_stack()
    }

    pub fn as_stack_mut(&mut self) -> Option<&mut Stack> {
        self.storage.as_stack_mut()
    }

    pub fn stack_id(&self) -> Option<StackId> {
        self.storage.stack_id()
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.location == other.location
    }
}

#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<Node>,
    travel: Vec<Vec<Time>>,
    names: HashMap<String, NodeId>,
    vehicle_speed: f64,
}

impl Graph {
    pub fn new(vehicle_speed: f64) -> Self {
        Graph {
            nodes: Vec::new(),
            travel: Vec::new(),
            names: HashMap::new(),
            vehicle_speed,
        }
    }

    /// Travel time along the straight line between two locations.
    pub fn straight_line_time(&self, from: &Location, to: &Location) -> Time {
        from.distance_to(to) / self.vehicle_speed
    }

    /// Adds a node and returns its id. A node at an already known location
    /// is not added twice; the id of the existing node is returned instead.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        if let Some(existing) = self.node_at(&node.location) {
            return existing;
        }

        let id = self.nodes.len();
        let speed = self.vehicle_speed;
        let mut row = Vec::with_capacity(id + 1);
        for (other, existing_row) in self.nodes.iter().zip(self.travel.iter_mut()) {
            let time = node.location.distance_to(&other.location) / speed;
            existing_row.push(time);
            row.push(time);
        }
        row.push(0.0);
        self.travel.push(row);

        self.names.insert(node.name().to_string(), id);
        self.nodes.push(node);
        self.relax_through(id);
        id
    }

    /// Shortens the new node's row over existing paths, then lets every pair
    /// use the new node `k` as an intermediate stop.
    fn relax_through(&mut self, k: NodeId) {
        let n = self.nodes.len();
        for i in 0..n {
            for m in 0..n {
                let via = self.travel[k][m] + self.travel[m][i];
                if via < self.travel[k][i] {
                    self.travel[k][i] = via;
                    self.travel[i][k] = via;
                }
            }
        }
        for i in 0..n {
            for j in 0..n {
                let via = self.travel[i][k] + self.travel[k][j];
                if via < self.travel[i][j] {
                    self.travel[i][j] = via;
                }
            }
        }
    }

    pub fn node_at(&self, location: &Location) -> Option<NodeId> {
        self.nodes.iter().position(|node| node.location == *location)
    }

    pub fn travel_time(&self, from: NodeId, to: NodeId) -> Time {
        self.travel[from][to]
    }

    /// Travel time for a vehicle, which may still stand off the graph.
    pub fn travel_time_from(&self, vehicle: &Vehicle, to: NodeId) -> Time {
        match vehicle.current_node {
            Some(from) => self.travel_time(from, to),
            None => self.straight_line_time(&vehicle.location, &self.nodes[to].location),
        }
    }

    /// Nearest node to a location with its straight-line travel time. Ties
    /// go to the node added first.
    pub fn closest_node(&self, location: &Location) -> Option<(NodeId, Time)> {
        let mut best: Option<(NodeId, Time)> = None;
        for (id, node) in self.nodes.iter().enumerate() {
            let time = self.straight_line_time(&node.location, location);
            match best {
                Some((_, best_time)) if time >= best_time => {}
                _ => best = Some((id, time)),
            }
        }
        best
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    pub fn stack_node(&self, stack: StackId) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|node| node.stack_id() == Some(stack))
    }

    /// Ids of all stack nodes in insertion order.
    pub fn stack_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| !node.is_buffer())
            .map(|(id, _)| id)
    }

    /// Free slots summed over every stack.
    pub fn total_free_stack_space(&self) -> usize {
        self.nodes
            .iter()
            .filter_map(Node::as_stack)
            .map(Stack::free_slots)
            .sum()
    }
}
