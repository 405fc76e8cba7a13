use std::fmt;

use crate::model::request::RequestId;
use crate::model::storage::StackId;
use crate::model::time::Time;

/// Defects in the scenario input. Fatal: scheduling never starts.
#[derive(Debug)]
pub enum ScenarioError {
    Io(std::io::Error),
    Json(serde_json::Error),
    InvalidSpeed(f64),
    DuplicateNode(String),
    DuplicateStackId(StackId),
    SharedLocation { first: String, second: String },
    DuplicateBox(String),
    StackOverCapacity {
        stack: String,
        boxes: usize,
        capacity: usize,
    },
    InvalidVehicle { name: String, reason: String },
    DuplicateRequest(RequestId),
    UnknownNode { request: RequestId, name: String },
    MissingBox {
        request: RequestId,
        box_id: String,
        stack: String,
    },
    BufferToBuffer(RequestId),
}

impl fmt::Display for ScenarioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioError::Io(err) => write!(f, "could not read scenario: {}", err),
            ScenarioError::Json(err) => write!(f, "malformed scenario: {}", err),
            ScenarioError::InvalidSpeed(speed) => {
                write!(f, "vehicle speed must be positive, got {}", speed)
            }
            ScenarioError::DuplicateNode(name) => write!(f, "storage name {} is used twice", name),
            ScenarioError::DuplicateStackId(id) => write!(f, "stack ID {} is used twice", id),
            ScenarioError::SharedLocation { first, second } => {
                write!(f, "{} and {} share the same location", first, second)
            }
            ScenarioError::DuplicateBox(box_id) => {
                write!(f, "box {} is stored in more than one place", box_id)
            }
            ScenarioError::StackOverCapacity {
                stack,
                boxes,
                capacity,
            } => write!(
                f,
                "stack {} starts with {} boxes but holds at most {}",
                stack, boxes, capacity
            ),
            ScenarioError::InvalidVehicle { name, reason } => {
                write!(f, "vehicle {} is invalid: {}", name, reason)
            }
            ScenarioError::DuplicateRequest(id) => write!(f, "request {} is defined twice", id),
            ScenarioError::UnknownNode { request, name } => {
                write!(f, "request {} refers to unknown location {}", request, name)
            }
            ScenarioError::MissingBox {
                request,
                box_id,
                stack,
            } => write!(
                f,
                "request {} picks box {} from {}, but the box is not there",
                request, box_id, stack
            ),
            ScenarioError::BufferToBuffer(id) => {
                write!(f, "request {} moves a box between two buffer points", id)
            }
        }
    }
}

impl std::error::Error for ScenarioError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScenarioError::Io(err) => Some(err),
            ScenarioError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ScenarioError {
    fn from(err: std::io::Error) -> Self {
        ScenarioError::Io(err)
    }
}

impl From<serde_json::Error> for ScenarioError {
    fn from(err: serde_json::Error) -> Self {
        ScenarioError::Json(err)
    }
}

/// Consistency defects raised while scheduling.
///
/// Contention (locked stacks, missing temp stacks, waiting vehicles) is never
/// an error; it only delays a vehicle to a later tick.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulingError {
    CapacityExceeded { vehicle: String, capacity: usize },
    BoxNotCarried { vehicle: String, box_id: String },
    NothingCarried { vehicle: String },
    EmptyStack { stack: String },
    StackOverflow { stack: String, box_id: String },
    NoVehicles { requests: usize },
    Stalled { time: Time, vehicles: Vec<String> },
}

impl fmt::Display for SchedulingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulingError::CapacityExceeded { vehicle, capacity } => write!(
                f,
                "vehicle {} would carry more than {} boxes",
                vehicle, capacity
            ),
            SchedulingError::BoxNotCarried { vehicle, box_id } => {
                write!(f, "vehicle {} does not carry box {}", vehicle, box_id)
            }
            SchedulingError::NothingCarried { vehicle } => {
                write!(f, "vehicle {} has no box to relocate", vehicle)
            }
            SchedulingError::EmptyStack { stack } => {
                write!(f, "tried to take a box from empty stack {}", stack)
            }
            SchedulingError::StackOverflow { stack, box_id } => {
                write!(f, "stack {} is full, cannot place box {}", stack, box_id)
            }
            SchedulingError::NoVehicles { requests } => {
                write!(f, "{} requests to schedule but no vehicles", requests)
            }
            SchedulingError::Stalled { time, vehicles } => write!(
                f,
                "no progress possible at time {} (stuck vehicles: {})",
                time,
                vehicles.join(", ")
            ),
        }
    }
}

impl std::error::Error for SchedulingError {}
