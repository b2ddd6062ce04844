use crate::errors::PostbackError;
use crate::goal::Goal;
use crate::schema::{Mapping, Slot};
use std::collections::HashMap;

/// Request parameters as received, keyed by the source's own names.
pub type Params = HashMap<String, String>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranslatedFields {
    pub subject_id: String,
    pub code: String,
    pub goal: Goal,
}

/// Checks that `params` carries every field `mapping` names and converts the
/// goal value to its vocabulary entry.
pub fn translate(mapping: &Mapping, params: &Params) -> Result<TranslatedFields, PostbackError> {
    let missing: Vec<&str> = mapping
        .fields()
        .filter(|name| !params.contains_key(*name))
        .collect();
    if !missing.is_empty() {
        return Err(PostbackError::Validation(format!(
            "Not enough parameters: {}",
            missing.join(", ")
        )));
    }

    let value = |slot: Slot| {
        params
            .get(mapping.field(slot))
            .map(String::as_str)
            .unwrap_or_default()
    };

    let goal_field = mapping.field(Slot::Goal);
    let goal = Goal::from_value(value(Slot::Goal)).ok_or_else(|| {
        PostbackError::Validation(format!("Unknown value for parameter <{goal_field}>"))
    })?;

    Ok(TranslatedFields {
        subject_id: value(Slot::SubjectId).to_string(),
        code: value(Slot::Code).to_string(),
        goal,
    })
}
