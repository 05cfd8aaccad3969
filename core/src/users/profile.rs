use serde::{Deserialize, Serialize};

/// Qualification record persisted as `PROFILE.json`. Unknown evidence stays
/// `None` or empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Profile {
    pub company: Option<String>,
    pub role: Option<String>,
    pub pains: Vec<String>,
    pub budget_signal: Option<String>,
    pub timeline: Option<String>,
    pub objections: Vec<String>,
    pub next_step: Option<String>,
}

impl Profile {
    pub fn from_json(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(content)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        let mut out = serde_json::to_string_pretty(self)?;
        out.push('\n');
        Ok(out)
    }

    /// Field-by-field merge. Scalars are replaced only when the patch carries
    /// a value, sequences are replaced wholesale when present.
    pub fn merge(&mut self, patch: &ProfilePatch) {
        merge_scalar(&mut self.company, &patch.company);
        merge_scalar(&mut self.role, &patch.role);
        merge_scalar(&mut self.budget_signal, &patch.budget_signal);
        merge_scalar(&mut self.timeline, &patch.timeline);
        merge_scalar(&mut self.next_step, &patch.next_step);
        merge_list(&mut self.pains, &patch.pains);
        merge_list(&mut self.objections, &patch.objections);
    }
}

fn merge_scalar(stored: &mut Option<String>, incoming: &Option<String>) {
    if let Some(value) = incoming {
        let value = value.trim();
        // An explicit empty string clears the field.
        *stored = (!value.is_empty()).then(|| value.to_string());
    }
}

fn merge_list(stored: &mut Vec<String>, incoming: &Option<Vec<String>>) {
    if let Some(items) = incoming {
        *stored = items
            .iter()
            .map(|item| item.trim())
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect();
    }
}

/// Partial update. The schema is closed: unknown keys and wrongly shaped
/// values fail to deserialize.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfilePatch {
    pub company: Option<String>,
    pub role: Option<String>,
    pub pains: Option<Vec<String>>,
    pub budget_signal: Option<String>,
    pub timeline: Option<String>,
    pub objections: Option<Vec<String>>,
    pub next_step: Option<String>,
}

impl ProfilePatch {
    pub fn from_json(content: &str) -> serde_json::Result<Self> {
        let value: serde_json::Value = serde_json::from_str(content)?;
        Self::from_value(value)
    }

    pub fn from_value(value: serde_json::Value) -> serde_json::Result<Self> {
        if !value.is_object() {
            return Err(serde::de::Error::custom("patch must be a JSON object"));
        }
        serde_json::from_value(value)
    }

    pub fn next_step(next_step: impl Into<String>) -> Self {
        Self {
            next_step: Some(next_step.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
