use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Index, IndexMut};

use super::graph::NodeId;
use super::storage::BoxId;
use super::vehicle::VehicleId;

pub type RequestId = u32;

/// Lifecycle of a box-movement request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    /// The box is not on board yet.
    Initial,
    /// The box is on board, heading for the place node.
    Src,
    /// A blocking box was taken off the place stack to make room.
    DestPickup,
    /// Delivered.
    Dest,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Dest)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestStatus::Initial => "initial",
            RequestStatus::Src => "src",
            RequestStatus::DestPickup => "dest-pickup",
            RequestStatus::Dest => "dest",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Read from the scenario.
    Regular,
    /// Phantom relocation made up while freeing room on a place stack.
    Simulated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub pickup: NodeId,
    pub place: NodeId,
    pub box_id: BoxId,
    pub assigned_vehicle: Option<VehicleId>,
    pub status: RequestStatus,
    pub kind: RequestKind,
}

impl Request {
    pub fn new(id: RequestId, pickup: NodeId, place: NodeId, box_id: &str) -> Self {
        Request {
            id,
            pickup,
            place,
            box_id: box_id.to_string(),
            assigned_vehicle: None,
            status: RequestStatus::Initial,
            kind: RequestKind::Regular,
        }
    }

    pub fn simulated(id: RequestId, pickup: NodeId, place: NodeId, box_id: &str) -> Self {
        Request {
            kind: RequestKind::Simulated,
            ..Request::new(id, pickup, place, box_id)
        }
    }

    pub fn is_done(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_simulated(&self) -> bool {
        self.kind == RequestKind::Simulated
    }
}

/// Every request of the run, regular and simulated, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct RequestBook {
    requests: BTreeMap<RequestId, Request>,
    next_simulated: Option<RequestId>,
}

impl RequestBook {
    pub fn new() -> Self {
        RequestBook::default()
    }

    /// Adds a request. A request with a known id is handed back.
    pub fn insert(&mut self, request: Request) -> Result<(), Request> {
        if self.requests.contains_key(&request.id) {
            return Err(request);
        }
        self.requests.insert(request.id, request);
        Ok(())
    }

    pub fn get(&self, id: RequestId) -> Option<&Request> {
        self.requests.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Request> {
        self.requests.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Request> {
        self.requests.values_mut()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Ids for simulated requests count down from the top of the id range
    /// so they never collide with scenario ids.
    pub fn next_simulated_id(&mut self) -> RequestId {
        let mut candidate = self.next_simulated.unwrap_or(RequestId::MAX);
        while self.requests.contains_key(&candidate) {
            candidate -= 1;
        }
        self.next_simulated = Some(candidate.saturating_sub(1));
        candidate
    }
}

impl Index<RequestId> for RequestBook {
    type Output = Request;

    fn index(&self, id: RequestId) -> &Request {
        &self.requests[&id]
    }
}

impl IndexMut<RequestId> for RequestBook {
    fn index_mut(&mut self, id: RequestId) -> &mut Request {
        self.requests
            .get_mut(&id)
            .unwrap_or_else(|| panic!("unknown request {}", id))
    }
}
