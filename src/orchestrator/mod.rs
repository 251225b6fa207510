//! Session orchestration modules.
//!
//! Covers the session state machine, per-session workers, the process
//! manager seam, the supervisor that maps sessions to workers, and the
//! action gateway in front of it all.

pub mod broadcaster;
pub mod gateway;
pub mod machine;
pub mod observer;
pub mod process_manager;
pub mod supervisor;
pub mod worker;
