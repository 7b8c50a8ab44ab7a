use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadSchemaType {
    IosData,
    IosSurvey,
}

impl UploadSchemaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadSchemaType::IosData => "ios_data",
            UploadSchemaType::IosSurvey => "ios_survey",
        }
    }
}

impl fmt::Display for UploadSchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadSchemaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ios_data" => Ok(UploadSchemaType::IosData),
            "ios_survey" => Ok(UploadSchemaType::IosSurvey),
            other => Err(format!("unknown schema type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadFieldType {
    AttachmentBlob,
    AttachmentCsv,
    AttachmentJsonBlob,
    AttachmentJsonTable,
    AttachmentV2,
    Boolean,
    CalendarDate,
    DurationV2,
    Float,
    InlineJsonBlob,
    Int,
    LargeTextAttachment,
    MultiChoice,
    SingleChoice,
    String,
    TimeV2,
    Timestamp,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadFieldDefinition {
    pub name: String,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(rename = "type")]
    pub field_type: UploadFieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_choice_answer_list: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_other_choices: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unbounded_text: Option<bool>,
}

/// One revision of an upload schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub study_id: Option<String>,
    #[serde(default)]
    pub schema_id: String,
    #[serde(default)]
    pub revision: i32,
    #[serde(default)]
    pub name: String,
    pub schema_type: Option<UploadSchemaType>,
    #[serde(default)]
    pub field_definitions: Vec<UploadFieldDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub survey_guid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub survey_created_on: Option<i64>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub version: i64,
}

impl UploadSchema {
    /// Same schema with the owning study removed, for per-study responses
    pub fn without_study_id(mut self) -> Self {
        self.study_id = None;
        self
    }

    /// Structural validation. Returns a field → message map of every problem.
    pub fn validate(&self) -> BTreeMap<String, String> {
        let mut errors = BTreeMap::new();

        if self.schema_id.trim().is_empty() {
            errors.insert("schemaId".to_string(), "is required".to_string());
        }
        if self.name.trim().is_empty() {
            errors.insert("name".to_string(), "is required".to_string());
        }
        if self.schema_type.is_none() {
            errors.insert("schemaType".to_string(), "is required".to_string());
        }
        if self.revision < 0 {
            errors.insert("revision".to_string(), "can't be negative".to_string());
        }
        if self.field_definitions.is_empty() && self.schema_type != Some(UploadSchemaType::IosSurvey) {
            errors.insert("fieldDefinitions".to_string(), "requires at least one definition".to_string());
        }

        let mut seen = HashSet::new();
        for (i, field) in self.field_definitions.iter().enumerate() {
            let key = format!("fieldDefinitions[{}]", i);
            if field.name.trim().is_empty() {
                errors.insert(format!("{}.name", key), "is required".to_string());
            } else if !seen.insert(field.name.as_str()) {
                errors.insert(format!("{}.name", key), format!("duplicate field name '{}'", field.name));
            }
            if field.field_type == UploadFieldType::MultiChoice
                && field.multi_choice_answer_list.as_ref().map_or(true, |l| l.is_empty())
            {
                errors.insert(
                    format!("{}.multiChoiceAnswerList", key),
                    "must be specified for MULTI_CHOICE fields".to_string(),
                );
            }
            if let Some(max) = field.max_length {
                if max <= 0 {
                    errors.insert(format!("{}.maxLength", key), "must be positive".to_string());
                }
                if field.unbounded_text == Some(true) {
                    errors.insert(
                        format!("{}.unboundedText", key),
                        "cannot specify both maxLength and unboundedText".to_string(),
                    );
                }
            }
        }

        errors
    }

    /// Checks that `updated` only makes backwards-compatible changes to
    /// the field definitions of `self`: fields may be added but not removed,
    /// field types may not change and multiple-choice answers may not be removed.
    pub fn incompatible_changes(&self, updated: &UploadSchema) -> BTreeMap<String, String> {
        let mut errors = BTreeMap::new();
        let updated_fields: BTreeMap<&str, &UploadFieldDefinition> = updated
            .field_definitions
            .iter()
            .map(|f| (f.name.as_str(), f))
            .collect();

        for old in &self.field_definitions {
            let key = format!("fieldDefinitions.{}", old.name);
            let Some(new) = updated_fields.get(old.name.as_str()) else {
                errors.insert(key, "can't be removed".to_string());
                continue;
            };
            if new.field_type != old.field_type {
                errors.insert(key, "can't change type".to_string());
                continue;
            }
            if let (Some(old_answers), Some(new_answers)) =
                (&old.multi_choice_answer_list, &new.multi_choice_answer_list)
            {
                let removed: Vec<&str> = old_answers
                    .iter()
                    .filter(|a| !new_answers.contains(a))
                    .map(String::as_str)
                    .collect();
                if !removed.is_empty() {
                    errors.insert(key, format!("can't remove answers {}", removed.join(", ")));
                }
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> UploadSchema {
        serde_json::from_value(json!({
            "name": "Controller Test Schema",
            "revision": 3,
            "schemaId": "controller-test-schema",
            "schemaType": "ios_data",
            "fieldDefinitions": [
                { "name": "field-name", "required": true, "type": "STRING" }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn parses_client_json() {
        let s = schema();
        assert_eq!(s.revision, 3);
        assert_eq!(s.schema_type, Some(UploadSchemaType::IosData));
        assert_eq!(s.field_definitions[0].field_type, UploadFieldType::String);
        assert!(s.validate().is_empty());
    }

    #[test]
    fn study_id_is_omitted_when_stripped() {
        let mut s = schema();
        s.study_id = Some("api".to_string());
        assert_eq!(serde_json::to_value(&s).unwrap()["studyId"], "api");
        let json = serde_json::to_value(s.without_study_id()).unwrap();
        assert!(json.get("studyId").is_none());
    }

    #[test]
    fn rejects_duplicate_and_unanswered_fields() {
        let mut s = schema();
        s.field_definitions.push(s.field_definitions[0].clone());
        s.field_definitions.push(UploadFieldDefinition {
            name: "choice".to_string(),
            required: true,
            field_type: UploadFieldType::MultiChoice,
            max_length: None,
            multi_choice_answer_list: None,
            allow_other_choices: None,
            unbounded_text: None,
        });
        let errors = s.validate();
        assert!(errors.contains_key("fieldDefinitions[1].name"));
        assert!(errors.contains_key("fieldDefinitions[2].multiChoiceAnswerList"));
    }

    #[test]
    fn compatible_update_may_add_fields_only() {
        let old = schema();
        let mut added = old.clone();
        added.field_definitions.push(UploadFieldDefinition {
            name: "extra".to_string(),
            required: false,
            field_type: UploadFieldType::Int,
            max_length: None,
            multi_choice_answer_list: None,
            allow_other_choices: None,
            unbounded_text: None,
        });
        assert!(old.incompatible_changes(&added).is_empty());

        let mut retyped = old.clone();
        retyped.field_definitions[0].field_type = UploadFieldType::Int;
        assert!(!old.incompatible_changes(&retyped).is_empty());

        let mut removed = old.clone();
        removed.field_definitions.clear();
        assert_eq!(
            old.incompatible_changes(&removed).get("fieldDefinitions.field-name").map(String::as_str),
            Some("can't be removed")
        );
    }
}
