use async_trait::async_trait;
use grantry_core::{AppResult, ObjectKey};
use grantry_domain::AccessTemplate;

/// Repository port for administrator-owned templates.
#[async_trait]
pub trait AccessTemplateRepository: Send + Sync {
    /// Returns one template by namespace and name.
    async fn find_template(&self, key: &ObjectKey) -> AppResult<Option<AccessTemplate>>;
}
