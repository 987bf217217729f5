pub mod prelude;

pub mod file_records;
