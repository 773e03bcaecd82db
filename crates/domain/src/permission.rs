use grantry_core::ObjectKey;
use serde::{Deserialize, Serialize};

/// One RBAC policy rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// API groups; the empty string is the core group.
    pub api_groups: Vec<String>,
    /// Resource types, including subresources such as `pods/exec`.
    pub resources: Vec<String>,
    /// Allow-list of object names the rule applies to.
    pub resource_names: Vec<String>,
    /// Allowed verbs.
    pub verbs: Vec<String>,
}

/// Ownership link from a generated object to the request that caused it.
///
/// Deleting the owner garbage-collects the owned object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerReference {
    /// Owner API version.
    pub api_version: String,
    /// Owner kind.
    pub kind: String,
    /// Owner name.
    pub name: String,
    /// Owner uid.
    pub uid: String,
}

/// Namespaced role generated for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRole {
    /// Role address.
    pub key: ObjectKey,
    /// Granted rules.
    pub rules: Vec<PolicyRule>,
    /// Owning request.
    pub owner: OwnerReference,
}

/// Subject kinds a binding may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubjectKind {
    /// An identity-provider group.
    Group,
    /// A single user.
    User,
}

impl SubjectKind {
    /// Returns the stable RBAC kind value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Group => "Group",
            Self::User => "User",
        }
    }
}

/// Principal named in a role binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingSubject {
    /// Subject kind.
    pub kind: SubjectKind,
    /// Subject name.
    pub name: String,
}

/// Binding of an [`AccessRole`] to template subjects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRoleBinding {
    /// Binding address.
    pub key: ObjectKey,
    /// Bound role name in the same namespace.
    pub role_name: String,
    /// Bound principals.
    pub subjects: Vec<BindingSubject>,
    /// Owning request.
    pub owner: OwnerReference,
}
