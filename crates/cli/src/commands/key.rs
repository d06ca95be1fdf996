use serde_json::json;

use caseflow_core::keys::{canonicalize, canonicalize_field_key};

use crate::commands::CommandResult;

/// Shows the state key and the field key a free-form label turns into.
pub fn run(label: &str) -> CommandResult {
    let state_key = canonicalize(label);
    if state_key.is_empty() {
        return CommandResult::failure(
            "key",
            "empty_key",
            format!("`{label}` has no usable characters once canonicalized"),
            2,
        );
    }

    CommandResult::success_with_detail(
        "key",
        state_key.clone(),
        json!({
            "label": label,
            "state_key": state_key,
            "field_key": canonicalize_field_key(label),
        }),
    )
}
