pub mod records;
pub mod statistics;
pub mod writer;
