//! Input data structures: the measurement table and the experiment schema

mod schema;
mod table;

pub use schema::{assignment_name, Assignment, Factor, Schema};
pub use table::MeasurementTable;
