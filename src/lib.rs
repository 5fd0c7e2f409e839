//! Crawls a city's bus routes from the AMap web API into stop, route info and
//! route path tables.

pub mod aggregate;
pub mod amap;
pub mod config;
pub mod coordinates;
pub mod directory;
pub mod error;
pub mod export;
pub mod orchestrator;
pub mod records;
pub mod utils;
pub mod writer;
