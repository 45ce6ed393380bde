use brokerflow_core::workflow::{external_status_mapping, stages_for, WorkflowFamily};
use serde_json::{json, Value};

use crate::commands::session::parse_family;
use crate::commands::CommandResult;

const COMMAND: &str = "stages";

pub fn run(family: Option<&str>) -> CommandResult {
    let families = match family {
        Some(raw) => match parse_family(raw) {
            Ok(family) => vec![family],
            Err((error_class, message, exit_code)) => {
                return CommandResult::failure(COMMAND, error_class, message, exit_code);
            }
        },
        None => WorkflowFamily::ALL.to_vec(),
    };

    let data = families.iter().map(|family| (family.as_str().to_string(), registry(*family)));
    CommandResult::success_with_data(
        COMMAND,
        format!("{} workflow families registered", families.len()),
        Some(Value::Object(data.collect())),
    )
}

fn registry(family: WorkflowFamily) -> Value {
    let statuses = external_status_mapping(family)
        .into_iter()
        .map(|(status, stage_id)| (status.to_string(), Value::from(stage_id)))
        .collect::<serde_json::Map<_, _>>();

    json!({
        "supports_edit_mode": family.supports_edit_mode(),
        "stages": stages_for(family),
        "external_statuses": statuses,
    })
}
