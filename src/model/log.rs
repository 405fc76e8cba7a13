use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use super::graph::Location;
use super::storage::BoxId;
use super::time::{truncate, Time};

pub const LOG_HEADER: &str = "%vehicle;startx;starty;starttime;endx;endy;endtime;box;operation";

/// Tag of a physical move in the operation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Pickup,
    Place,
    /// Placement on a temporary stack.
    PlaceRelocation,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Pickup => "PU",
            OperationKind::Place => "PL",
            OperationKind::PlaceRelocation => "PL_RELOC",
        }
    }

    pub fn is_pickup(&self) -> bool {
        matches!(self, OperationKind::Pickup)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One physical move: drive from `start` to `end`, then load or unload.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub vehicle: String,
    pub start: Location,
    pub start_time: Time,
    pub end: Location,
    pub end_time: Time,
    pub box_id: BoxId,
    pub kind: OperationKind,
}

impl Operation {
    pub fn to_record(&self) -> String {
        format!(
            "{};{};{};{};{};{};{};{};{}",
            self.vehicle,
            self.start.x,
            self.start.y,
            truncate(self.start_time),
            self.end.x,
            self.end.y,
            truncate(self.end_time),
            self.box_id,
            self.kind
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct OperationLog {
    entries: Vec<Operation>,
}

impl OperationLog {
    pub fn new() -> Self {
        OperationLog::default()
    }

    pub fn push(&mut self, operation: Operation) {
        self.entries.push(operation);
    }

    pub fn entries(&self) -> &[Operation] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Latest end time of any operation, 0 for an empty log.
    pub fn makespan(&self) -> Time {
        self.entries
            .iter()
            .map(|op| op.end_time)
            .fold(0.0, f64::max)
    }

    pub fn write_to<W: Write>(&self, mut out: W) -> io::Result<()> {
        writeln!(out, "{}", LOG_HEADER)?;
        for operation in &self.entries {
            writeln!(out, "{}", operation.to_record())?;
        }
        out.flush()
    }

    pub fn write_file(&self, path: &Path) -> io::Result<()> {
        let file = File::create(path)?;
        self.write_to(BufWriter::new(file))
    }
}
