//! # Provider Protocols
//!
//! Every provider follows one of a fixed set of clearance protocols. The protocol
//! decides how many cycles a case goes through, which status code a completed
//! status cycle lands on, where provider identifiers live in response bodies, and
//! which synthetic fields the outbound payload needs.
//!
//! Provider codes are mapped to protocols once, from configuration, by the
//! [`ProviderRegistry`].

pub mod acknowledged;
pub mod batched;
pub mod registry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::Result;
use crate::models::{ClearanceLink, Program, Subject};
use crate::resolver::ReferenceNumber;
use crate::state_machine::ClearanceStatus;

pub use acknowledged::AcknowledgedProtocol;
pub use batched::BatchedProtocol;
pub use registry::ProviderRegistry;

/// The fixed protocol shapes a provider can follow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolKind {
    /// Create, single-result status, acknowledge
    #[default]
    Acknowledged,
    /// Create, then batch status results covering many cases at once
    Batched,
}

impl ProtocolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Acknowledged => "acknowledged",
            Self::Batched => "batched",
        }
    }

    pub fn cycle_count(&self) -> u8 {
        match self {
            Self::Acknowledged => 3,
            Self::Batched => 2,
        }
    }

    pub fn has_acknowledge_cycle(&self) -> bool {
        self.cycle_count() == 3
    }

    /// Where a completed status cycle leaves the clearance
    pub fn completion_status(&self) -> ClearanceStatus {
        if self.has_acknowledge_cycle() {
            ClearanceStatus::Cleared
        } else {
            ClearanceStatus::Delivered
        }
    }

    pub fn protocol(&self) -> Arc<dyn ProviderProtocol> {
        match self {
            Self::Acknowledged => Arc::new(AcknowledgedProtocol),
            Self::Batched => Arc::new(BatchedProtocol),
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProtocolKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "acknowledged" => Ok(Self::Acknowledged),
            "batched" => Ok(Self::Batched),
            _ => Err(format!("Invalid protocol kind: {s}")),
        }
    }
}

/// One case reported by a status response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusResultItem {
    pub response_id: Option<String>,
    pub reference: Option<ReferenceNumber>,
    /// Subject index number the provider echoed back
    pub index_number: Option<i64>,
    pub status: Option<String>,
    pub status_date: Option<DateTime<Utc>>,
}

/// Raw records a provider's synthetic request fields are built from
#[derive(Debug, Clone, Copy)]
pub struct EnrichmentInput<'a> {
    pub provider_code: &'a str,
    pub subject_id: i64,
    pub program_id: i64,
    pub subject: Option<&'a Subject>,
    pub program: Option<&'a Program>,
    pub link: Option<&'a ClearanceLink>,
    pub now: DateTime<Utc>,
}

impl EnrichmentInput<'_> {
    pub fn reference_number(&self) -> ReferenceNumber {
        ReferenceNumber::new(self.program_id, self.subject_id)
    }
}

pub trait ProviderProtocol: Send + Sync + fmt::Debug {
    fn kind(&self) -> ProtocolKind;

    fn has_acknowledge_cycle(&self) -> bool {
        self.kind().has_acknowledge_cycle()
    }

    fn completion_status(&self) -> ClearanceStatus {
        self.kind().completion_status()
    }

    /// Paths tried after the common request id paths
    fn request_id_paths(&self) -> &'static [&'static str];

    /// Paths tried after the common response id paths
    fn response_id_paths(&self) -> &'static [&'static str];

    /// Field that carries the composite `{program}_{subject}` reference in
    /// request bodies and status results
    fn reference_field(&self) -> &'static str;

    /// Reject create responses the provider itself flags as unsuccessful
    fn check_create_response(&self, _body: &Value) -> Result<()> {
        Ok(())
    }

    /// Whether status responses list many cases at once
    fn is_batch_status(&self) -> bool;

    /// Per-case results of a batch status response
    fn status_results(&self, body: &Value) -> Vec<StatusResultItem>;

    /// Synthetic `ProviderRequest` sub-model. Never fails; missing inputs
    /// degrade to empty strings.
    fn enrich(&self, input: &EnrichmentInput<'_>) -> Map<String, Value>;

    /// Fields of the `ProviderRequest` sub-model that should never be blank
    fn mandatory_fields(&self) -> &'static [&'static str];
}

/// Text value for a synthetic field, empty when the source is missing
pub(crate) fn text(value: Option<&str>) -> Value {
    Value::String(value.map(str::trim).unwrap_or_default().to_string())
}

pub(crate) fn date_text(value: Option<chrono::NaiveDate>, format: &str) -> Value {
    Value::String(
        value
            .map(|date| date.format(format).to_string())
            .unwrap_or_default(),
    )
}
