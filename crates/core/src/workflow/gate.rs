use std::collections::BTreeMap;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::workflow::stages::WorkflowFamily;

pub const DEFAULT_CHECKLIST_THRESHOLD_PCT: Decimal = Decimal::from_parts(70, 0, 0, false, 0);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    Blocked { reason: String },
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    pub fn blocked(reason: impl Into<String>) -> Self {
        Self::Blocked { reason: reason.into() }
    }
}

/// Per-stage readiness check consulted before a stage may be marked complete.
pub trait CompletionGate: Send + Sync {
    fn check(&self, family: WorkflowFamily, stage_id: &str, stage_data: &Value) -> Readiness;

    fn is_stage_ready(&self, family: WorkflowFamily, stage_id: &str, stage_data: &Value) -> bool {
        self.check(family, stage_id, stage_data).is_ready()
    }
}

impl<F> CompletionGate for F
where
    F: Fn(WorkflowFamily, &str, &Value) -> bool + Send + Sync,
{
    fn check(&self, family: WorkflowFamily, stage_id: &str, stage_data: &Value) -> Readiness {
        if self(family, stage_id, stage_data) {
            Readiness::Ready
        } else {
            Readiness::blocked(format!("stage `{stage_id}` is not ready to complete"))
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct OpenGate;

impl CompletionGate for OpenGate {
    fn check(&self, _family: WorkflowFamily, _stage_id: &str, _stage_data: &Value) -> Readiness {
        Readiness::Ready
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum GateRule {
    /// At least `min_pct` percent of the checklist entries are ticked. The
    /// checklist is either an object of booleans or an array of booleans /
    /// `{ "checked": bool }` items.
    ChecklistThreshold { field: String, min_pct: Decimal },
    RequiredFields { fields: Vec<String> },
    /// Field is present and not `"pending"`.
    DecisionMade { field: String },
    NonEmptyText { field: String },
}

impl GateRule {
    pub fn checklist(field: impl Into<String>, min_pct: Decimal) -> Self {
        Self::ChecklistThreshold { field: field.into(), min_pct }
    }

    pub fn required<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::RequiredFields { fields: fields.into_iter().map(Into::into).collect() }
    }

    pub fn decision(field: impl Into<String>) -> Self {
        Self::DecisionMade { field: field.into() }
    }

    pub fn non_empty_text(field: impl Into<String>) -> Self {
        Self::NonEmptyText { field: field.into() }
    }

    pub fn evaluate(&self, data: &Value) -> Readiness {
        match self {
            Self::ChecklistThreshold { field, min_pct } => {
                evaluate_checklist(field, *min_pct, data.get(field))
            }
            Self::RequiredFields { fields } => {
                let missing: Vec<&str> = fields
                    .iter()
                    .filter(|field| !is_present(data.get(field.as_str())))
                    .map(String::as_str)
                    .collect();
                if missing.is_empty() {
                    Readiness::Ready
                } else {
                    Readiness::blocked(format!("fill in required fields: {}", missing.join(", ")))
                }
            }
            Self::DecisionMade { field } => match data.get(field).and_then(Value::as_str) {
                Some(value)
                    if !value.trim().is_empty() && !value.eq_ignore_ascii_case("pending") =>
                {
                    Readiness::Ready
                }
                _ => Readiness::blocked(format!("choose a {} other than pending", humanize(field))),
            },
            Self::NonEmptyText { field } => match data.get(field).and_then(Value::as_str) {
                Some(value) if !value.trim().is_empty() => Readiness::Ready,
                _ => Readiness::blocked(format!("{} must not be empty", humanize(field))),
            },
        }
    }
}

fn evaluate_checklist(field: &str, min_pct: Decimal, checklist: Option<&Value>) -> Readiness {
    let Some((checked, total)) = checklist.and_then(count_checklist) else {
        return Readiness::blocked(format!("{} has not been started", humanize(field)));
    };
    if total == 0 {
        return Readiness::blocked(format!("{} has no items", humanize(field)));
    }

    let required = (Decimal::from(total) * min_pct / Decimal::ONE_HUNDRED).ceil();
    let required = required.to_u32().unwrap_or(total).min(total);
    if checked >= required {
        return Readiness::Ready;
    }

    let remaining = required - checked;
    let noun = if remaining == 1 { "item" } else { "items" };
    Readiness::blocked(format!("complete {remaining} more checklist {noun} before continuing"))
}

fn count_checklist(value: &Value) -> Option<(u32, u32)> {
    let flags: Vec<bool> = match value {
        Value::Object(items) => items.values().map(is_checked).collect(),
        Value::Array(items) => items.iter().map(is_checked).collect(),
        _ => return None,
    };
    let total = u32::try_from(flags.len()).ok()?;
    let checked = u32::try_from(flags.iter().filter(|flag| **flag).count()).ok()?;
    Some((checked, total))
}

fn is_checked(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Object(item) => item.get("checked").and_then(Value::as_bool).unwrap_or(false),
        _ => false,
    }
}

fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(text)) => !text.trim().is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(fields)) => !fields.is_empty(),
        Some(_) => true,
    }
}

fn humanize(field: &str) -> String {
    field.replace('_', " ")
}

/// Rule table keyed by stage id. Stages without rules are always ready.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageGates {
    rules: BTreeMap<String, Vec<GateRule>>,
}

impl StageGates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, stage_id: impl Into<String>, rule: GateRule) -> Self {
        self.rules.entry(stage_id.into()).or_default().push(rule);
        self
    }

    pub fn rules_for(&self, stage_id: &str) -> &[GateRule] {
        self.rules.get(stage_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn for_family(family: WorkflowFamily, checklist_threshold_pct: Decimal) -> Self {
        match family {
            WorkflowFamily::Quote => Self::quote_defaults(),
            WorkflowFamily::Claims => Self::claims_defaults(checklist_threshold_pct),
        }
    }

    pub fn claims_defaults(checklist_threshold_pct: Decimal) -> Self {
        Self::new()
            .with_rule("registration", GateRule::required(["policy_id", "incident_date"]))
            .with_rule("review", GateRule::checklist("checklist", checklist_threshold_pct))
            .with_rule("validation", GateRule::decision("decision"))
            .with_rule("settlement", GateRule::required(["settlement_amount"]))
            .with_rule("closure", GateRule::non_empty_text("closure_notes"))
    }

    pub fn quote_defaults() -> Self {
        Self::new()
            .with_rule("client_selection", GateRule::required(["client_id"]))
            .with_rule("requirements", GateRule::required(["coverage_types"]))
            .with_rule("insurer_selection", GateRule::required(["insurer_ids"]))
            .with_rule("evaluation", GateRule::required(["selected_quote_id"]))
            .with_rule("acceptance", GateRule::decision("decision"))
            .with_rule("policy_issuance", GateRule::required(["policy_number"]))
    }
}

impl CompletionGate for StageGates {
    fn check(&self, _family: WorkflowFamily, stage_id: &str, stage_data: &Value) -> Readiness {
        self.rules_for(stage_id)
            .iter()
            .map(|rule| rule.evaluate(stage_data))
            .find(|readiness| !readiness.is_ready())
            .unwrap_or(Readiness::Ready)
    }
}
