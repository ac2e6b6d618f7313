//! # Data Model
//!
//! Persisted records of the correlation engine. Invocations and their logs belong
//! to the outbound side; clearances and links hold what the providers told us;
//! subjects and programs are the internal entities a payload is composed from.

pub mod clearance;
pub mod clearance_link;
pub mod endpoint;
pub mod invocation;
pub mod invocation_log;
pub mod subject;

pub use clearance::{append_remark, Clearance, ClearanceAdvance};
pub use clearance_link::{ClearanceLink, LinkCompletion, NewClearanceLink};
pub use endpoint::{EndpointDefinition, RetryDecision, RetryPolicy};
pub use invocation::{Invocation, NewInvocation};
pub use invocation_log::{InvocationLog, NewInvocationLog};
pub use subject::{Program, Subject};
