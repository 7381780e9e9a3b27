//! Best-effort persistence of visits and call outcomes.
//!
//! Recorders never return an error. Store failures are logged and reported
//! as `None` so the business path is never affected.

mod access;
mod response;

pub use access::AccessEventRecorder;
pub use response::ResponseEventRecorder;
