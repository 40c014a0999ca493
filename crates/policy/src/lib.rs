//! Flow decisions at the egress boundaries.
//!
//! A denial is a normal outcome, not an error: decisions are plain values
//! and carry a user-facing reason. The orchestrator decides what a denial
//! means for the run in progress.

use serde::{Deserialize, Serialize};
use tracing::debug;

use flowgent_labels::{Label, Lattice};

/// Outcome of one egress check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowDecision {
    pub allowed: bool,
    pub reason: String,
}

impl FlowDecision {
    fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

/// Immutable egress policy: a whitelist of upper bounds for the external
/// LLM, and a single clearance cap for user output.
#[derive(Debug, Clone)]
pub struct Policy {
    lattice: Lattice,
    external_llm_allowed: Vec<Label>,
    user_output_max: Label,
}

impl Policy {
    pub fn new(
        lattice: Lattice,
        external_llm_allowed: impl IntoIterator<Item = Label>,
        user_output_max: Label,
    ) -> Self {
        Self {
            lattice,
            external_llm_allowed: external_llm_allowed.into_iter().collect(),
            user_output_max,
        }
    }

    /// Allowed iff the payload flows to at least one whitelisted bound.
    pub fn can_send_to_external_llm(&self, payload_label: &Label) -> FlowDecision {
        let allowed = self
            .external_llm_allowed
            .iter()
            .any(|bound| self.lattice.can_flow(payload_label, bound));
        let decision = if allowed {
            FlowDecision::allow("Allowed by external LLM policy.")
        } else {
            FlowDecision::deny(format!(
                "Label {payload_label} exceeds external LLM policy."
            ))
        };
        debug!(label = %payload_label, allowed = decision.allowed, "external LLM gate");
        decision
    }

    /// Allowed iff the payload flows to the user's output clearance.
    pub fn can_send_to_user(&self, payload_label: &Label) -> FlowDecision {
        let decision = if self.lattice.can_flow(payload_label, &self.user_output_max) {
            FlowDecision::allow("Allowed by user output policy.")
        } else {
            FlowDecision::deny(format!("Label {payload_label} exceeds user clearance."))
        };
        debug!(label = %payload_label, allowed = decision.allowed, "user egress gate");
        decision
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
