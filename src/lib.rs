pub mod config;
pub mod dashboard;
pub mod errors;
pub mod logging;
pub mod reconcile;
pub mod store;
pub mod ui;
