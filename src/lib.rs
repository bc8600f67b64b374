pub mod actors;
pub mod alerts;
pub mod config;
pub mod discord;
pub mod monitors;
pub mod scheduler;
pub mod storage;
pub mod util;
