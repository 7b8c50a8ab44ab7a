//! Fixtures shared by unit tests

use chrono::Utc;

use crate::database::models::{
    Account, Template, TemplateType, UploadFieldDefinition, UploadFieldType, UploadSchema, UploadSchemaType,
};

/// Valid single-field schema with no revision chosen
pub fn sample_schema(schema_id: &str) -> UploadSchema {
    UploadSchema {
        study_id: None,
        schema_id: schema_id.to_string(),
        revision: 0,
        name: "Sample Schema".to_string(),
        schema_type: Some(UploadSchemaType::IosData),
        field_definitions: vec![UploadFieldDefinition {
            name: "field-name".to_string(),
            required: true,
            field_type: UploadFieldType::String,
            max_length: None,
            multi_choice_answer_list: None,
            allow_other_choices: None,
            unbounded_text: None,
        }],
        survey_guid: None,
        survey_created_on: None,
        deleted: false,
        version: 0,
    }
}

pub fn sample_template(template_type: TemplateType) -> Template {
    let now = Utc::now();
    Template {
        guid: String::new(),
        study_id: String::new(),
        template_type: Some(template_type),
        name: format!("{} template", template_type),
        description: None,
        created_on: now,
        modified_on: now,
        deleted: false,
        version: 0,
    }
}

/// New participant identified only by email
pub fn sample_account(email: &str) -> Account {
    Account {
        email: Some(email.to_string()),
        first_name: Some("Test".to_string()),
        last_name: Some("Participant".to_string()),
        ..Default::default()
    }
}
