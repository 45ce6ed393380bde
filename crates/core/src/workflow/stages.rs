use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowFamily {
    Quote,
    Claims,
}

impl WorkflowFamily {
    pub const ALL: [WorkflowFamily; 2] = [WorkflowFamily::Quote, WorkflowFamily::Claims];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::Claims => "claims",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "quote" | "quotes" => Some(Self::Quote),
            "claims" | "claim" => Some(Self::Claims),
            _ => None,
        }
    }

    /// Claims records that are already past the first stage let the user pick
    /// between resuming the chain and editing record metadata only.
    pub fn supports_edit_mode(&self) -> bool {
        matches!(self, Self::Claims)
    }
}

impl std::fmt::Display for WorkflowFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StageDescriptor {
    pub id: &'static str,
    pub order: u32,
    pub name: &'static str,
    pub description: &'static str,
    pub required_external_statuses: &'static [&'static str],
}

const QUOTE_STAGES: &[StageDescriptor] = &[
    StageDescriptor {
        id: "client_selection",
        order: 1,
        name: "Client Selection",
        description: "Pick or onboard the client the quote is prepared for",
        required_external_statuses: &["draft"],
    },
    StageDescriptor {
        id: "requirements",
        order: 2,
        name: "Risk Requirements",
        description: "Capture the risk profile and requested coverages",
        required_external_statuses: &["client_selected"],
    },
    StageDescriptor {
        id: "insurer_selection",
        order: 3,
        name: "Insurer Selection",
        description: "Choose the insurers the risk is presented to",
        required_external_statuses: &["requirements_gathered"],
    },
    StageDescriptor {
        id: "submission",
        order: 4,
        name: "Submission",
        description: "Send the submission pack to the selected insurers",
        required_external_statuses: &["insurers_selected"],
    },
    StageDescriptor {
        id: "quote_collection",
        order: 5,
        name: "Quote Collection",
        description: "Record the terms returned by each insurer",
        required_external_statuses: &["submitted"],
    },
    StageDescriptor {
        id: "evaluation",
        order: 6,
        name: "Quote Evaluation",
        description: "Compare the returned quotes and pick a preferred option",
        required_external_statuses: &["quoted"],
    },
    StageDescriptor {
        id: "recommendation",
        order: 7,
        name: "Client Recommendation",
        description: "Present the recommendation to the client",
        required_external_statuses: &["evaluated"],
    },
    StageDescriptor {
        id: "acceptance",
        order: 8,
        name: "Client Acceptance",
        description: "Record the client's decision on the recommended quote",
        required_external_statuses: &["recommended"],
    },
    StageDescriptor {
        id: "policy_issuance",
        order: 9,
        name: "Policy Issuance",
        description: "Bind cover and register the issued policy",
        required_external_statuses: &["accepted", "bound"],
    },
];

const CLAIM_STAGES: &[StageDescriptor] = &[
    StageDescriptor {
        id: "notification",
        order: 1,
        name: "First Notification",
        description: "Log the first notification of loss",
        required_external_statuses: &["reported"],
    },
    StageDescriptor {
        id: "registration",
        order: 2,
        name: "Claim Registration",
        description: "Register the claim against the client's policy",
        required_external_statuses: &["notified"],
    },
    StageDescriptor {
        id: "documents",
        order: 3,
        name: "Documents Upload",
        description: "Collect supporting documents from the claimant",
        required_external_statuses: &["registered"],
    },
    StageDescriptor {
        id: "assignment",
        order: 4,
        name: "Adjuster Assignment",
        description: "Assign a loss adjuster or handler",
        required_external_statuses: &["documents_received"],
    },
    StageDescriptor {
        id: "review",
        order: 5,
        name: "Investigation",
        description: "Work through the investigation checklist",
        required_external_statuses: &["assigned", "investigating"],
    },
    StageDescriptor {
        id: "validation",
        order: 6,
        name: "Validation",
        description: "Decide whether the claim is covered",
        required_external_statuses: &["under_review"],
    },
    StageDescriptor {
        id: "settlement",
        order: 7,
        name: "Settlement",
        description: "Agree and record the settlement amount",
        required_external_statuses: &["approved"],
    },
    StageDescriptor {
        id: "feedback",
        order: 8,
        name: "Client Feedback",
        description: "Collect the client's feedback on the handling",
        required_external_statuses: &["settled"],
    },
    StageDescriptor {
        id: "closure",
        order: 9,
        name: "Closure",
        description: "Close the claim file with closing notes",
        required_external_statuses: &["feedback_received", "closed", "rejected"],
    },
];

pub fn stages_for(family: WorkflowFamily) -> &'static [StageDescriptor] {
    match family {
        WorkflowFamily::Quote => QUOTE_STAGES,
        WorkflowFamily::Claims => CLAIM_STAGES,
    }
}

pub fn descriptor(family: WorkflowFamily, stage_id: &str) -> Option<&'static StageDescriptor> {
    stages_for(family).iter().find(|stage| stage.id == stage_id)
}

pub fn position(family: WorkflowFamily, stage_id: &str) -> Option<usize> {
    stages_for(family).iter().position(|stage| stage.id == stage_id)
}

pub fn first_stage(family: WorkflowFamily) -> &'static StageDescriptor {
    // Both tables are non-empty constants.
    &stages_for(family)[0]
}

pub fn last_stage(family: WorkflowFamily) -> &'static StageDescriptor {
    let stages = stages_for(family);
    &stages[stages.len() - 1]
}

pub fn next_stage(family: WorkflowFamily, stage_id: &str) -> Option<&'static StageDescriptor> {
    let index = position(family, stage_id)?;
    stages_for(family).get(index + 1)
}

pub fn external_status_mapping(family: WorkflowFamily) -> Vec<(&'static str, &'static str)> {
    stages_for(family)
        .iter()
        .flat_map(|stage| {
            stage.required_external_statuses.iter().map(move |status| (*status, stage.id))
        })
        .collect()
}

pub fn stage_for_status(
    family: WorkflowFamily,
    external_status: &str,
) -> Option<&'static StageDescriptor> {
    let status = external_status.trim().to_ascii_lowercase();
    stages_for(family)
        .iter()
        .find(|stage| stage.required_external_statuses.iter().any(|known| *known == status))
}
