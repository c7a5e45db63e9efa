pub mod alerts;
pub mod cache;
pub mod database;
pub mod transport;
pub mod session;
