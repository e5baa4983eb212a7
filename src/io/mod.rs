//! Input/Output for measurement tables, schemas and results

mod csv;
mod results;

pub use self::csv::{
    read_measurement_table, read_sample_indexes, read_schema, write_results, write_results_json,
};
pub use results::{ClassCounts, PadeResults, ResultsSummary, SummaryRow};
