/// The model module contains the warehouse data structures the scheduler works on
pub mod graph;
pub mod ledger;
pub mod log;
pub mod request;
pub mod storage;
pub mod time;
pub mod vehicle;
