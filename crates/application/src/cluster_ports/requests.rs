use async_trait::async_trait;
use grantry_core::{AppResult, ObjectKey};
use grantry_domain::{AccessRequest, NewAccessRequest};

/// Repository port for access request objects.
#[async_trait]
pub trait AccessRequestRepository: Send + Sync {
    /// Reads one request straight from the API server, never from a cache.
    async fn find_request(&self, key: &ObjectKey) -> AppResult<Option<AccessRequest>>;

    /// Lists requests in one namespace, or in all namespaces.
    async fn list_requests(&self, namespace: Option<&str>) -> AppResult<Vec<AccessRequest>>;

    /// Creates a request with a server-generated name.
    async fn create_request(&self, input: NewAccessRequest) -> AppResult<AccessRequest>;

    /// Writes the status subresource guarded by `meta.resource_version`.
    ///
    /// Returns the new resource version, or `Conflict` when the stored
    /// version differs.
    async fn update_request_status(&self, request: &AccessRequest) -> AppResult<String>;

    /// Deletes a request. Returns false when it was already gone.
    async fn delete_request(&self, key: &ObjectKey) -> AppResult<bool>;
}
