//! # Protocol Constants
//!
//! Operation codes, outcome labels and remark texts shared by the runner,
//! interpreter and polling sweeps.

use serde::{Deserialize, Serialize};
use std::fmt;

pub use crate::state_machine::{ClearanceStatus, InvocationStatus};

/// Operations a provider endpoint can be configured for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationCode {
    CreateClearanceRequest,
    GetClearanceStatus,
    AcknowledgeResponse,
    SetStatusDelivered,
}

impl OperationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateClearanceRequest => "CREATE_CLEARANCE_REQUEST",
            Self::GetClearanceStatus => "GET_CLEARANCE_STATUS",
            Self::AcknowledgeResponse => "ACKNOWLEDGE_RESPONSE",
            Self::SetStatusDelivered => "SET_STATUS_DELIVERED",
        }
    }

    /// Operations whose path `{id}` is the provider response id rather than the request id
    pub fn addresses_response_id(&self) -> bool {
        matches!(self, Self::AcknowledgeResponse | Self::SetStatusDelivered)
    }
}

impl Default for OperationCode {
    fn default() -> Self {
        Self::CreateClearanceRequest
    }
}

impl fmt::Display for OperationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OperationCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CREATE_CLEARANCE_REQUEST" => Ok(Self::CreateClearanceRequest),
            "GET_CLEARANCE_STATUS" => Ok(Self::GetClearanceStatus),
            "ACKNOWLEDGE_RESPONSE" => Ok(Self::AcknowledgeResponse),
            "SET_STATUS_DELIVERED" => Ok(Self::SetStatusDelivered),
            _ => Err(format!("Invalid operation code: {s}")),
        }
    }
}

impl TryFrom<String> for OperationCode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Outcome written once a clearance has fully completed
pub const OUTCOME_COMPLETE: &str = "Complete";

/// Separator used when appending to clearance remarks
pub const REMARK_SEPARATOR: &str = ";";

pub const REMARK_ACKNOWLEDGED: &str = "Acknowledgement posted";

/// Model names the composer understands
pub mod models {
    pub const SUBJECT: &str = "Subject";
    pub const PROGRAM: &str = "Program";
    pub const CLEARANCE_LINK: &str = "ClearanceLink";
    pub const CLEARANCE: &str = "Clearance";
    pub const PROVIDER_REQUEST: &str = "ProviderRequest";
    pub const INTEGRATION: &str = "Integration";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_code_parsing_is_case_insensitive() {
        assert_eq!(
            "get_clearance_status".parse::<OperationCode>(),
            Ok(OperationCode::GetClearanceStatus)
        );
        assert!("DELETE_EVERYTHING".parse::<OperationCode>().is_err());
    }

    #[test]
    fn test_response_id_operations() {
        assert!(OperationCode::AcknowledgeResponse.addresses_response_id());
        assert!(OperationCode::SetStatusDelivered.addresses_response_id());
        assert!(!OperationCode::GetClearanceStatus.addresses_response_id());
    }

    #[test]
    fn test_default_operation_is_create() {
        assert_eq!(OperationCode::default(), OperationCode::CreateClearanceRequest);
    }
}
