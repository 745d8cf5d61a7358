//! Status conditions and readiness projection
//!
//! Flux reports health through a list of named conditions. Kubestead only
//! needs a coarse tri-state, derived the same way for every kind.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type carrying overall readiness.
pub const READY_CONDITION: &str = "Ready";

/// A named status entry as written by Flux controllers.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceCondition {
    /// Condition type (e.g., "Ready", "Reconciling", "Stalled")
    #[serde(rename = "type")]
    pub condition_type: String,

    /// "True", "False" or "Unknown"
    pub status: String,

    /// Machine-readable reason for the last transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// RFC 3339 timestamp of the last transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

impl ResourceCondition {
    /// Convenience constructor, mostly for tests and fixtures
    pub fn new(condition_type: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            condition_type: condition_type.into(),
            status: status.into(),
            ..Default::default()
        }
    }
}

/// Coarse health of a GitOps resource.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum Readiness {
    /// `Ready=True`
    Ready,
    /// `Ready=False`
    Failed,
    /// No `Ready` condition, or `Ready=Unknown`
    Unknown,
}

/// Projects a condition list onto [`Readiness`].
///
/// Only the `Ready` condition is consulted; its absence maps to `Unknown`.
pub fn project_readiness(conditions: &[ResourceCondition]) -> Readiness {
    match conditions
        .iter()
        .find(|c| c.condition_type == READY_CONDITION)
        .map(|c| c.status.as_str())
    {
        Some("True") => Readiness::Ready,
        Some("False") => Readiness::Failed,
        _ => Readiness::Unknown,
    }
}

/// Resources exposing Flux-style status conditions.
pub trait ConditionBearing {
    /// Conditions from the observed status (empty if no status yet)
    fn conditions(&self) -> &[ResourceCondition];

    /// Readiness derived from [`ConditionBearing::conditions`]
    fn readiness(&self) -> Readiness {
        project_readiness(self.conditions())
    }

    /// Message of the `Ready` condition, if any
    fn ready_message(&self) -> Option<&str> {
        self.conditions()
            .iter()
            .find(|c| c.condition_type == READY_CONDITION)
            .and_then(|c| c.message.as_deref())
    }
}
