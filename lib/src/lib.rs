pub mod cluster;
pub mod job;
pub mod output_log;
pub mod processor;
pub mod reader;
pub mod topology;
pub mod waiting_area;
