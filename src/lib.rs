pub mod auth;
pub mod bridge;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod filters;
pub mod gesture;
pub mod models;
pub mod output;
pub mod queue;
pub mod reconcile;
pub mod service;
pub mod session;
pub mod thread;

#[cfg(test)]
mod testing;

pub use self::filters::{Filter, RawFilter};
pub use self::models::{Classification, Label, Message};
pub use self::session::TriageSession;
