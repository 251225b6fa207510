//! Domain model module declarations.

pub mod action;
pub mod activity;
pub mod context;
pub mod session;
pub mod snapshot;
