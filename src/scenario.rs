/// Scenario input - reading a warehouse description from JSON
///
/// This module holds:
/// - The serde configuration structs mirroring the scenario file
/// - Validation of the scenario and assembly of the graph, fleet and requests

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::ScenarioError;
use crate::logger::Logger;
use crate::model::graph::{Graph, Location, Node, NodeId};
use crate::model::request::{Request, RequestId};
use crate::model::storage::{BoxStorage, BufferPoint, Stack, Storage};
use crate::model::vehicle::Vehicle;
use crate::scheduling::warehouse::Warehouse;

#[derive(Debug, Deserialize)]
pub struct ScenarioConfig {
    #[serde(rename = "loadingduration")]
    pub loading_duration: f64,
    #[serde(rename = "vehiclespeed")]
    pub vehicle_speed: f64,
    #[serde(rename = "stackcapacity")]
    pub stack_capacity: usize,
    #[serde(default)]
    pub stacks: Vec<StackConfig>,
    #[serde(default, rename = "bufferpoints")]
    pub buffer_points: Vec<BufferPointConfig>,
    #[serde(default)]
    pub vehicles: Vec<VehicleConfig>,
    #[serde(default)]
    pub requests: Vec<RequestConfig>,
}

#[derive(Debug, Deserialize)]
pub struct StackConfig {
    #[serde(rename = "ID")]
    pub id: u32,
    pub name: String,
    pub x: i64,
    pub y: i64,
    /// Bottom to top
    #[serde(default)]
    pub boxes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct BufferPointConfig {
    #[serde(rename = "ID")]
    pub id: u32,
    pub name: String,
    pub x: i64,
    pub y: i64,
}

#[derive(Debug, Deserialize)]
pub struct VehicleConfig {
    #[serde(rename = "ID")]
    pub id: u32,
    pub name: String,
    pub capacity: usize,
    #[serde(alias = "xCoordinate")]
    pub x: i64,
    #[serde(alias = "yCoordinate")]
    pub y: i64,
}

#[derive(Debug, Deserialize)]
pub struct RequestConfig {
    #[serde(rename = "ID")]
    pub id: RequestId,
    #[serde(rename = "pickupLocation")]
    pub pickup: NodeRef,
    #[serde(rename = "placeLocation")]
    pub place: NodeRef,
    #[serde(rename = "boxID")]
    pub box_id: String,
}

/// A storage name, written either bare or as a one-element list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NodeRef {
    Name(String),
    Names(Vec<String>),
}

impl NodeRef {
    pub fn name(&self) -> &str {
        match self {
            NodeRef::Name(name) => name,
            NodeRef::Names(names) => names.first().map(String::as_str).unwrap_or(""),
        }
    }
}

/// Read and validate a scenario file.
pub fn load_scenario(path: &Path, logger: &Logger) -> Result<Warehouse, ScenarioError> {
    logger.info("scenario", &format!("Loading scenario from {}", path.display()));
    let contents = fs::read_to_string(path)?;
    let config: ScenarioConfig = serde_json::from_str(&contents)?;
    let warehouse = build_warehouse(&config)?;
    logger.info(
        "scenario",
        &format!(
            "Loaded {} stacks, {} buffer points, {} vehicles and {} requests",
            config.stacks.len(),
            config.buffer_points.len(),
            warehouse.vehicles.len(),
            warehouse.requests.len()
        ),
    );
    Ok(warehouse)
}

/// Assemble the warehouse. Stacks are added to the graph before buffer points.
pub fn build_warehouse(config: &ScenarioConfig) -> Result<Warehouse, ScenarioError> {
    if !(config.vehicle_speed > 0.0) || !config.vehicle_speed.is_finite() {
        return Err(ScenarioError::InvalidSpeed(config.vehicle_speed));
    }

    let mut graph = Graph::new(config.vehicle_speed);
    let mut boxes = HashSet::new();
    let mut stack_ids = HashSet::new();
    for stack in &config.stacks {
        if !stack_ids.insert(stack.id) {
            return Err(ScenarioError::DuplicateStackId(stack.id));
        }
        if stack.boxes.len() > config.stack_capacity {
            return Err(ScenarioError::StackOverCapacity {
                stack: stack.name.clone(),
                boxes: stack.boxes.len(),
                capacity: config.stack_capacity,
            });
        }
        for box_id in &stack.boxes {
            if !boxes.insert(box_id.as_str()) {
                return Err(ScenarioError::DuplicateBox(box_id.clone()));
            }
        }
        let storage = Storage::Stack(Stack::new(
            stack.id,
            &stack.name,
            config.stack_capacity,
            stack.boxes.clone(),
        ));
        add_storage(&mut graph, Location::new(stack.x, stack.y), storage)?;
    }
    for buffer in &config.buffer_points {
        let storage = Storage::Buffer(BufferPoint::new(buffer.id, &buffer.name));
        add_storage(&mut graph, Location::new(buffer.x, buffer.y), storage)?;
    }

    let mut fleet: Vec<Vehicle> = Vec::with_capacity(config.vehicles.len());
    for vehicle in &config.vehicles {
        if vehicle.capacity == 0 {
            return Err(ScenarioError::InvalidVehicle {
                name: vehicle.name.clone(),
                reason: "capacity must be at least 1".to_string(),
            });
        }
        if fleet.iter().any(|v| v.id == vehicle.id || v.name == vehicle.name) {
            return Err(ScenarioError::InvalidVehicle {
                name: vehicle.name.clone(),
                reason: "ID or name is used twice".to_string(),
            });
        }
        fleet.push(Vehicle::new(
            vehicle.id,
            &vehicle.name,
            vehicle.capacity,
            Location::new(vehicle.x, vehicle.y),
        ));
    }

    let mut requests = Vec::with_capacity(config.requests.len());
    for request in &config.requests {
        let pickup = resolve(&graph, request.id, &request.pickup)?;
        let place = resolve(&graph, request.id, &request.place)?;
        if graph.node(pickup).is_buffer() && graph.node(place).is_buffer() {
            return Err(ScenarioError::BufferToBuffer(request.id));
        }
        match graph.node(pickup).as_stack() {
            Some(stack) => {
                if !stack.contains(&request.box_id) {
                    return Err(ScenarioError::MissingBox {
                        request: request.id,
                        box_id: request.box_id.clone(),
                        stack: stack.name.clone(),
                    });
                }
            }
            // boxes arriving at a buffer point must be new to the warehouse
            None => {
                if !boxes.insert(request.box_id.as_str()) {
                    return Err(ScenarioError::DuplicateBox(request.box_id.clone()));
                }
            }
        }
        requests.push(Request::new(request.id, pickup, place, &request.box_id));
    }

    let mut warehouse = Warehouse::new(graph, fleet, config.loading_duration);
    for request in requests {
        warehouse
            .add_request(request)
            .map_err(|duplicate| ScenarioError::DuplicateRequest(duplicate.id))?;
    }
    Ok(warehouse)
}

fn add_storage(graph: &mut Graph, location: Location, storage: Storage) -> Result<NodeId, ScenarioError> {
    let name = storage.name().to_string();
    if graph.node_by_name(&name).is_some() {
        return Err(ScenarioError::DuplicateNode(name));
    }
    if let Some(existing) = graph.node_at(&location) {
        return Err(ScenarioError::SharedLocation {
            first: graph.node(existing).name().to_string(),
            second: name,
        });
    }
    Ok(graph.add_node(Node::new(location, storage)))
}

fn resolve(graph: &Graph, request: RequestId, node: &NodeRef) -> Result<NodeId, ScenarioError> {
    graph
        .node_by_name(node.name())
        .ok_or_else(|| ScenarioError::UnknownNode {
            request,
            name: node.name().to_string(),
        })
}
