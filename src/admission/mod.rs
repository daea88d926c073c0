//! Admission front end: what an HTTP layer calls once per inbound request.

mod server;
mod service;

pub use server::{spawn_blocking_reader, LineServer};
pub use service::{
    AdmissionResponse, AdmissionService, HEADER_LIMIT, HEADER_REMAINING, HEADER_RETRY_AFTER,
    STATUS_BAD_REQUEST, STATUS_OK, STATUS_TOO_MANY_REQUESTS,
};
