use async_trait::async_trait;
use parking_lot::RwLock;

use super::EndpointCatalog;
use crate::constants::OperationCode;
use crate::error::Result;
use crate::models::EndpointDefinition;

/// Endpoint catalog backed by the `endpoints` config section
#[derive(Debug, Default)]
pub struct StaticEndpointCatalog {
    endpoints: RwLock<Vec<EndpointDefinition>>,
}

impl StaticEndpointCatalog {
    pub fn new(endpoints: Vec<EndpointDefinition>) -> Self {
        Self {
            endpoints: RwLock::new(endpoints),
        }
    }

    /// Add or replace the definition for the endpoint's (provider, operation)
    pub fn upsert(&self, endpoint: EndpointDefinition) {
        let mut endpoints = self.endpoints.write();
        endpoints.retain(|existing| {
            !(existing.provider_code.eq_ignore_ascii_case(&endpoint.provider_code)
                && existing.operation_code == endpoint.operation_code)
        });
        endpoints.push(endpoint);
    }

    pub fn len(&self) -> usize {
        self.endpoints.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.read().is_empty()
    }
}

#[async_trait]
impl EndpointCatalog for StaticEndpointCatalog {
    async fn active_endpoint(
        &self,
        provider_code: &str,
        operation_code: OperationCode,
    ) -> Result<Option<EndpointDefinition>> {
        Ok(self
            .endpoints
            .read()
            .iter()
            .find(|endpoint| {
                endpoint.is_active
                    && endpoint.operation_code == operation_code
                    && endpoint.provider_code.eq_ignore_ascii_case(provider_code)
            })
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(provider: &str, operation: OperationCode, active: bool) -> EndpointDefinition {
        EndpointDefinition {
            endpoint_id: 0,
            provider_code: provider.to_string(),
            operation_code: operation,
            base_url: "https://provider.test".to_string(),
            path_template: String::new(),
            http_method: "POST".to_string(),
            timeout_seconds: 30,
            payload_template: String::new(),
            required_models: String::new(),
            retrigger: true,
            retrigger_count: 3,
            retrigger_interval_minutes: 1,
            is_active: active,
        }
    }

    #[tokio::test]
    async fn test_inactive_endpoints_are_invisible() {
        let catalog = StaticEndpointCatalog::new(vec![endpoint(
            "MEDX",
            OperationCode::GetClearanceStatus,
            false,
        )]);
        let found = catalog
            .active_endpoint("MEDX", OperationCode::GetClearanceStatus)
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_lookup_ignores_provider_case_and_upsert_replaces() {
        let catalog = StaticEndpointCatalog::default();
        catalog.upsert(endpoint("medx", OperationCode::CreateClearanceRequest, true));
        let mut replacement = endpoint("MEDX", OperationCode::CreateClearanceRequest, true);
        replacement.retrigger_count = 9;
        catalog.upsert(replacement);

        assert_eq!(catalog.len(), 1);
        let found = catalog
            .active_endpoint("MedX", OperationCode::CreateClearanceRequest)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.retrigger_count, 9);
    }
}
