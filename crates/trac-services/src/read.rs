// SPDX-License-Identifier: Apache-2.0
//! The metadata read and search service.
//!
//! A thin layer: requests are validated by the interceptor before they get
//! here, so these methods forward to the store and materialise responses.
//! Batch reads preserve input order and fail whole. Resource introspection
//! exposes public properties only; secrets and backend properties never
//! leave the configuration.

use std::collections::BTreeMap;

use trac_config::{PlatformConfig, ResourceConfig};
use trac_error::{ErrorKind, TracError};
use trac_metadata::api::{
    ListResourcesResponse, ListTenantsResponse, MetadataBatchRequest, MetadataBatchResponse,
    MetadataReadRequest, MetadataSearchRequest, MetadataSearchResponse, PlatformInfoResponse,
    ResourceInfoResponse,
};
use trac_metadata::search::SearchExpression;
use trac_metadata::tag::Tag;
use trac_store::MetadataStore;
use trac_validation::requests::warn_float_equality;

/// The read service.
#[derive(Debug, Clone)]
pub struct MetadataReadService {
    store: MetadataStore,
    platform_info: PlatformInfoResponse,
    resources: BTreeMap<String, ResourceConfig>,
}

impl MetadataReadService {
    /// Create a read service over a store and the platform configuration.
    pub fn new(store: MetadataStore, config: &PlatformConfig) -> Self {
        Self {
            store,
            platform_info: PlatformInfoResponse {
                environment: config.platform_info.environment.clone(),
                production: config.platform_info.production,
                api_version: trac_metadata::API_VERSION.to_string(),
                deployment_info: config.platform_info.deployment_info.clone(),
            },
            resources: config.resources.clone(),
        }
    }

    /// Resolve one selector.
    pub async fn read_object(&self, request: MetadataReadRequest) -> Result<Tag, TracError> {
        self.store.load_object(request.tenant, request.selector).await
    }

    /// Resolve a list of selectors, positionally; any miss fails the call.
    pub async fn read_batch(
        &self,
        request: MetadataBatchRequest,
    ) -> Result<MetadataBatchResponse, TracError> {
        let tags = self
            .store
            .load_objects(request.tenant, request.selectors)
            .await?;
        Ok(MetadataBatchResponse { tags })
    }

    /// Search tag attributes.
    pub async fn search(
        &self,
        request: MetadataSearchRequest,
    ) -> Result<MetadataSearchResponse, TracError> {
        warn_unreliable_terms(&request.search_params.search);
        let search_results = self
            .store
            .search(request.tenant, request.search_params)
            .await?;
        Ok(MetadataSearchResponse { search_results })
    }

    /// Platform identity and deployment information.
    pub fn platform_info(&self) -> PlatformInfoResponse {
        self.platform_info.clone()
    }

    /// All registered tenants.
    pub async fn list_tenants(&self) -> Result<ListTenantsResponse, TracError> {
        let tenants = self.store.list_tenants().await?;
        Ok(ListTenantsResponse { tenants })
    }

    /// Public views of every configured resource.
    pub fn list_resources(&self) -> ListResourcesResponse {
        let resources = self
            .resources
            .iter()
            .map(|(name, resource)| public_view(name, resource))
            .collect();
        ListResourcesResponse { resources }
    }

    /// Public view of one resource.
    ///
    /// # Errors
    ///
    /// `NotFound` when no resource has the given name.
    pub fn resource_info(&self, resource_name: &str) -> Result<ResourceInfoResponse, TracError> {
        self.resources
            .get(resource_name)
            .map(|resource| public_view(resource_name, resource))
            .ok_or_else(|| {
                TracError::new(
                    ErrorKind::NotFound,
                    format!("resource [{resource_name}] is not configured"),
                )
            })
    }
}

/// Only the public properties leave the configuration; backend properties
/// and secret aliases stay behind.
fn public_view(name: &str, resource: &ResourceConfig) -> ResourceInfoResponse {
    ResourceInfoResponse {
        resource_name: name.to_string(),
        resource_type: resource.resource_type.clone(),
        protocol: resource.protocol.clone(),
        public_properties: resource.public_properties.clone(),
    }
}

fn warn_unreliable_terms(expression: &SearchExpression) {
    match expression {
        SearchExpression::Term(term) => warn_float_equality(term),
        SearchExpression::Logical(logical) => {
            for sub in &logical.expr {
                warn_unreliable_terms(sub);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_resource() -> PlatformConfig {
        let mut config = PlatformConfig::default();
        config.platform_info.environment = "TEST".to_string();
        let mut secrets = BTreeMap::new();
        secrets.insert("token".to_string(), "repo_token".to_string());
        let mut properties = BTreeMap::new();
        properties.insert("internal_endpoint".to_string(), "10.0.0.5".to_string());
        let mut public_properties = BTreeMap::new();
        public_properties.insert("url".to_string(), "https://git.example.com".to_string());
        config.resources.insert(
            "model_repo".to_string(),
            ResourceConfig {
                resource_type: "MODEL_REPOSITORY".to_string(),
                protocol: "git".to_string(),
                properties,
                public_properties,
                secrets,
            },
        );
        config
    }

    fn service() -> MetadataReadService {
        let store = MetadataStore::open(":memory:", 1).unwrap();
        MetadataReadService::new(store, &config_with_resource())
    }

    #[test]
    fn platform_info_reports_the_api_version() {
        let info = service().platform_info();
        assert_eq!(info.environment, "TEST");
        assert_eq!(info.api_version, trac_metadata::API_VERSION);
        assert!(!info.production);
    }

    #[test]
    fn resource_info_exposes_public_properties_only() {
        let info = service().resource_info("model_repo").unwrap();
        assert_eq!(info.protocol, "git");
        assert_eq!(info.public_properties["url"], "https://git.example.com");

        let rendered = rendered(&info);
        assert!(!rendered.contains("repo_token"));
        assert!(!rendered.contains("10.0.0.5"));
    }

    #[test]
    fn unknown_resource_is_not_found() {
        let err = service().resource_info("nope").unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[test]
    fn list_resources_covers_the_catalog() {
        let list = service().list_resources();
        assert_eq!(list.resources.len(), 1);
        assert_eq!(list.resources[0].resource_name, "model_repo");
    }

    fn rendered(info: &ResourceInfoResponse) -> String {
        // ResourceInfoResponse has no secret-bearing fields at all; this
        // asserts the type keeps it that way.
        format!("{info:?}")
    }
}
