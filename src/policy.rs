//! Transition policy seam
//!
//! Covenant does not decide whether a business transition is legal; a
//! world's contract does. [`ContractTable`] is the built-in contract for
//! marketplace orders, payments and reservations.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /v1/contract/can-transition`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TransitionQuery {
    /// Opaque subject; only `type` and `status` are read
    pub subject_ref: Value,
    pub to: String,
    pub ctx: Value,
}

impl TransitionQuery {
    pub fn world(&self) -> &str {
        self.ctx.get("world").and_then(Value::as_str).unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionDecision {
    pub allowed: bool,
    pub reason: &'static str,
}

impl TransitionDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: "allowed",
        }
    }

    fn deny(reason: &'static str) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }
}

pub trait TransitionPolicy: Send + Sync {
    fn can_transition(&self, subject_ref: &Value, to: &str) -> TransitionDecision;
}

/// Per-type state machines
#[derive(Debug, Clone, Copy, Default)]
pub struct ContractTable;

impl ContractTable {
    fn terminal(kind: &str, from: &str) -> bool {
        match kind {
            "order" => from == "cancelled",
            "payment" => matches!(from, "paid" | "failed" | "cancelled"),
            "reservation" => matches!(from, "cancelled" | "completed"),
            _ => false,
        }
    }

    fn edges(kind: &str, from: &str) -> Option<&'static [&'static str]> {
        let next: &'static [&'static str] = match (kind, from) {
            ("order", "pending") => &["paid", "cancelled"],
            ("order", "paid") => &["cancelled"],
            ("order", _) => &[],
            ("payment", "pending") => &["paid", "failed", "cancelled"],
            ("payment", _) => &[],
            ("reservation", "pending") => &["confirmed", "cancelled"],
            ("reservation", "confirmed") => &["checked_in", "cancelled"],
            ("reservation", "checked_in") => &["completed", "cancelled"],
            ("reservation", _) => &[],
            _ => return None,
        };
        Some(next)
    }
}

impl TransitionPolicy for ContractTable {
    fn can_transition(&self, subject_ref: &Value, to: &str) -> TransitionDecision {
        let field = |name: &str| {
            subject_ref
                .get(name)
                .map(|v| match v {
                    Value::String(s) => s.to_lowercase(),
                    Value::Null => String::new(),
                    other => other.to_string().to_lowercase(),
                })
                .unwrap_or_default()
        };
        let kind = field("type");
        let from = field("status");
        let target = to.to_lowercase();

        if kind.is_empty() {
            return TransitionDecision::deny("missing_subject_type");
        }
        if from.is_empty() {
            return TransitionDecision::deny("missing_from_status");
        }
        if target.is_empty() {
            return TransitionDecision::deny("missing_to_status");
        }
        if Self::terminal(&kind, &from) {
            return TransitionDecision::deny("terminal_state");
        }

        match Self::edges(&kind, &from) {
            None => TransitionDecision::deny("unknown_subject_type"),
            Some(next) if next.contains(&target.as_str()) => TransitionDecision::allow(),
            Some(_) => TransitionDecision::deny("invalid_transition"),
        }
    }
}
