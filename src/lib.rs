pub mod config;
pub mod error;
pub mod export;
pub mod fetch;
pub mod headers;
pub mod interpolate;
pub mod jobs;
pub mod measurement;
pub mod ona;
pub mod pipeline;
pub mod report;
pub mod sync;
pub mod table;
pub mod timestamp;
pub mod weather;
