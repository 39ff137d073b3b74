pub mod config;
pub mod errors;
pub mod logging;
pub mod pipeline;
pub mod response;
pub mod routes;
pub mod state;
pub mod storage;
pub mod upload;
