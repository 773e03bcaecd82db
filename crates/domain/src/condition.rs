use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use grantry_core::AppError;
use serde::{Deserialize, Serialize};

/// Condition types recorded on an access request.
///
/// Declaration order is the serialized order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConditionType {
    /// Requested and template durations parsed and resolved.
    DurationsValid,
    /// The grant window has not elapsed.
    AccessStillValid,
    /// Permission objects exist for the request.
    ResourcesCreated,
    /// The granted target is usable.
    ResourcesReady,
}

impl ConditionType {
    /// Returns the stable wire value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DurationsValid => "DurationsValid",
            Self::AccessStillValid => "AccessStillValid",
            Self::ResourcesCreated => "ResourcesCreated",
            Self::ResourcesReady => "ResourcesReady",
        }
    }

    /// Returns all condition types in serialized order.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[ConditionType] = &[
            ConditionType::DurationsValid,
            ConditionType::AccessStillValid,
            ConditionType::ResourcesCreated,
            ConditionType::ResourcesReady,
        ];

        ALL
    }
}

impl FromStr for ConditionType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "DurationsValid" => Ok(Self::DurationsValid),
            "AccessStillValid" => Ok(Self::AccessStillValid),
            "ResourcesCreated" => Ok(Self::ResourcesCreated),
            "ResourcesReady" => Ok(Self::ResourcesReady),
            _ => Err(AppError::Validation(format!(
                "unknown condition type '{value}'"
            ))),
        }
    }
}

/// Tri-state condition status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    /// The condition holds.
    True,
    /// The condition does not hold.
    False,
    /// Not yet evaluated.
    Unknown,
}

impl ConditionStatus {
    /// Returns the stable wire value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::True => "True",
            Self::False => "False",
            Self::Unknown => "Unknown",
        }
    }
}

impl FromStr for ConditionStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "True" => Ok(Self::True),
            "False" => Ok(Self::False),
            "Unknown" => Ok(Self::Unknown),
            _ => Err(AppError::Validation(format!(
                "unknown condition status '{value}'"
            ))),
        }
    }
}

/// Machine-readable reasons attached to conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionReason {
    /// Template default duration applied.
    Defaulted,
    /// Requested duration accepted as-is.
    CustomDurationAccepted,
    /// Requested duration clamped to the template maximum.
    ClampedToMaximum,
    /// A duration string failed to parse.
    InvalidDuration,
    /// The referenced template does not exist.
    TemplateNotFound,
    /// The grant window is still open.
    StillValid,
    /// The grant window elapsed.
    Expired,
    /// Permission objects were created or found.
    ResourcesCreated,
    /// The target was assigned by an earlier pass.
    AlreadyAssigned,
    /// No target matched the selection rule or override.
    TargetNotFound,
    /// Provisioning failed for another reason.
    ProvisioningFailed,
    /// Target is usable.
    ResourcesReady,
    /// Target is not usable yet.
    NotReady,
}

impl ConditionReason {
    /// Returns the stable wire value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Defaulted => "defaulted",
            Self::CustomDurationAccepted => "custom-duration-accepted",
            Self::ClampedToMaximum => "clamped-to-maximum",
            Self::InvalidDuration => "invalid-duration",
            Self::TemplateNotFound => "template-not-found",
            Self::StillValid => "still-valid",
            Self::Expired => "expired",
            Self::ResourcesCreated => "resources-created",
            Self::AlreadyAssigned => "already-assigned",
            Self::TargetNotFound => "target-not-found",
            Self::ProvisioningFailed => "provisioning-failed",
            Self::ResourcesReady => "resources-ready",
            Self::NotReady => "not-ready",
        }
    }
}

/// One typed, timestamped condition record.
///
/// Reasons are kept as strings so conditions written by other tooling still
/// round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Condition type.
    pub condition_type: ConditionType,
    /// Current status.
    pub status: ConditionStatus,
    /// Machine-readable reason.
    pub reason: String,
    /// Human readable detail.
    pub message: String,
    /// Last time status or reason changed.
    pub last_transition_time: DateTime<Utc>,
}

/// Conditions keyed by type, serialized as an ordered list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Condition>", into = "Vec<Condition>")]
pub struct Conditions(BTreeMap<ConditionType, Condition>);

impl Conditions {
    /// Creates an empty condition set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the condition of the given type.
    #[must_use]
    pub fn get(&self, condition_type: ConditionType) -> Option<&Condition> {
        self.0.get(&condition_type)
    }

    /// Returns the status of the given type, `Unknown` when absent.
    #[must_use]
    pub fn status_of(&self, condition_type: ConditionType) -> ConditionStatus {
        self.get(condition_type)
            .map_or(ConditionStatus::Unknown, |condition| condition.status)
    }

    /// Returns true when the condition is present with status `True`.
    #[must_use]
    pub fn is_true(&self, condition_type: ConditionType) -> bool {
        self.status_of(condition_type) == ConditionStatus::True
    }

    /// Returns true when the condition is present with status `False`.
    #[must_use]
    pub fn is_false(&self, condition_type: ConditionType) -> bool {
        self.status_of(condition_type) == ConditionStatus::False
    }

    /// Sets one condition.
    ///
    /// The transition time moves to `now` only when status or reason changed.
    /// Returns true when anything observable changed.
    pub fn set(
        &mut self,
        condition_type: ConditionType,
        status: ConditionStatus,
        reason: ConditionReason,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> bool {
        let message = message.into();
        let reason = reason.as_str();

        match self.0.get_mut(&condition_type) {
            Some(existing) if existing.status == status && existing.reason == reason => {
                if existing.message == message {
                    return false;
                }
                existing.message = message;
                true
            }
            _ => {
                self.0.insert(
                    condition_type,
                    Condition {
                        condition_type,
                        status,
                        reason: reason.to_owned(),
                        message,
                        last_transition_time: now,
                    },
                );
                true
            }
        }
    }

    /// Iterates conditions in type order.
    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.values()
    }

    /// Returns true when no condition is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Condition>> for Conditions {
    fn from(value: Vec<Condition>) -> Self {
        Self(
            value
                .into_iter()
                .map(|condition| (condition.condition_type, condition))
                .collect(),
        )
    }
}

impl From<Conditions> for Vec<Condition> {
    fn from(value: Conditions) -> Self {
        value.0.into_values().collect()
    }
}
