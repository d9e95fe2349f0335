pub mod ids;
pub mod memory;
pub mod persistence;
pub mod records;
pub mod schema;
