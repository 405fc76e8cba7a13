/// Virtual time for the scheduler.
///
/// Key concepts:
/// - Time: a point on the virtual clock, in the same unit as travel times
/// - Clock: the shared tick counter every phase advances by one unit
/// - Busy-until timestamps: vehicles and stacks are free again once the clock reaches them

/// A point in virtual time.
///
/// Travel times are Euclidean distances divided by the vehicle speed, so
/// operation boundaries are fractional even though the clock ticks in whole
/// units.
pub type Time = f64;

/// Busy-until value of a vehicle parked on the wait-queue.
/// It only becomes available again when another vehicle releases it.
pub const PARKED: Time = f64::INFINITY;

/// Truncates a timestamp the way the operation log reports it.
pub fn truncate(time: Time) -> i64 {
    time.trunc() as i64
}

/// The single virtual clock shared by all scheduling phases.
///
/// Each tick is one unit of scheduling time. Every available vehicle is
/// offered one action per tick, then the clock moves on.
#[derive(Debug, Clone, Default)]
pub struct Clock {
    current_time: Time,
}

impl Clock {
    /// Create a clock starting at time 0
    pub fn new() -> Self {
        Clock { current_time: 0.0 }
    }

    pub fn now(&self) -> Time {
        self.current_time
    }

    /// Move the clock forward by one tick
    pub fn advance(&mut self) {
        self.current_time += 1.0;
    }
}
