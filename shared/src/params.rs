//! Parameter schemas for the registered job types
//!
//! Each job type has a fixed parameter schema. Validation happens at the HTTP
//! edge, before a task is admitted, and produces field-level diagnostics that
//! the error envelope carries back to the client. Unknown fields are rejected
//! for every schema.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::utils::validate_email;

/// Names of all registered job types
pub const TASK_TYPES: [&str; 4] = [
    "compute_sum",
    "generate_report",
    "batch_email",
    "lucky_job",
];

/// Sections used when a report request does not name its own
pub const DEFAULT_REPORT_SECTIONS: [&str; 3] = ["overview", "details", "summary"];

/// Maximum number of recipients accepted by a single batch_email task
pub const MAX_BATCH_EMAILS: usize = 100;

/// Returns true if `task_type` names a registered job.
pub fn is_registered(task_type: &str) -> bool {
    TASK_TYPES.contains(&task_type)
}

/// A single field-level validation failure
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validates `parameters` against the schema for `task_type`.
///
/// Returns the normalized parameter map (schema defaults filled in) on
/// success, or the full list of field-level issues on failure. The caller is
/// expected to have checked `is_registered` first; an unregistered type is
/// reported as a single `task_type` issue.
pub fn validate_parameters(
    task_type: &str,
    parameters: &Map<String, Value>,
) -> Result<Map<String, Value>, Vec<ValidationIssue>> {
    match task_type {
        "compute_sum" => validate_compute_sum(parameters),
        "generate_report" => validate_generate_report(parameters),
        "batch_email" => validate_batch_email(parameters),
        "lucky_job" => validate_lucky_job(parameters),
        other => Err(vec![ValidationIssue::new(
            "task_type",
            format!("Unknown task type '{other}'"),
        )]),
    }
}

fn reject_unknown_fields(
    parameters: &Map<String, Value>,
    allowed: &[&str],
    issues: &mut Vec<ValidationIssue>,
) {
    for key in parameters.keys() {
        if !allowed.contains(&key.as_str()) {
            issues.push(ValidationIssue::new(
                format!("parameters.{key}"),
                "Unknown field".to_string(),
            ));
        }
    }
}

fn validate_compute_sum(
    parameters: &Map<String, Value>,
) -> Result<Map<String, Value>, Vec<ValidationIssue>> {
    let mut issues = Vec::new();
    reject_unknown_fields(parameters, &["numbers"], &mut issues);

    match parameters.get("numbers") {
        None => issues.push(ValidationIssue::new("parameters.numbers", "Field required")),
        Some(Value::Array(numbers)) => {
            if numbers.is_empty() {
                issues.push(ValidationIssue::new(
                    "parameters.numbers",
                    "Expected at least 1 item",
                ));
            }
            for (index, number) in numbers.iter().enumerate() {
                if !number.is_number() {
                    issues.push(ValidationIssue::new(
                        format!("parameters.numbers.{index}"),
                        "Expected a number",
                    ));
                }
            }
        }
        Some(_) => issues.push(ValidationIssue::new(
            "parameters.numbers",
            "Expected a list of numbers",
        )),
    }

    if issues.is_empty() {
        Ok(parameters.clone())
    } else {
        Err(issues)
    }
}

fn validate_generate_report(
    parameters: &Map<String, Value>,
) -> Result<Map<String, Value>, Vec<ValidationIssue>> {
    let mut issues = Vec::new();
    reject_unknown_fields(parameters, &["title", "sections"], &mut issues);

    match parameters.get("title") {
        None => issues.push(ValidationIssue::new("parameters.title", "Field required")),
        Some(Value::String(title)) => {
            if title.is_empty() {
                issues.push(ValidationIssue::new(
                    "parameters.title",
                    "Expected a non-empty string",
                ));
            }
        }
        Some(_) => issues.push(ValidationIssue::new(
            "parameters.title",
            "Expected a string",
        )),
    }

    match parameters.get("sections") {
        None => {}
        Some(Value::Array(sections)) => {
            for (index, section) in sections.iter().enumerate() {
                if !section.is_string() {
                    issues.push(ValidationIssue::new(
                        format!("parameters.sections.{index}"),
                        "Expected a string",
                    ));
                }
            }
        }
        Some(_) => issues.push(ValidationIssue::new(
            "parameters.sections",
            "Expected a list of strings",
        )),
    }

    if !issues.is_empty() {
        return Err(issues);
    }

    let mut normalized = parameters.clone();
    normalized.entry("sections").or_insert_with(|| {
        Value::Array(
            DEFAULT_REPORT_SECTIONS
                .iter()
                .map(|section| Value::String(section.to_string()))
                .collect(),
        )
    });
    Ok(normalized)
}

fn validate_batch_email(
    parameters: &Map<String, Value>,
) -> Result<Map<String, Value>, Vec<ValidationIssue>> {
    let mut issues = Vec::new();
    reject_unknown_fields(parameters, &["emails"], &mut issues);

    match parameters.get("emails") {
        None => issues.push(ValidationIssue::new("parameters.emails", "Field required")),
        Some(Value::Array(emails)) => {
            if emails.is_empty() {
                issues.push(ValidationIssue::new(
                    "parameters.emails",
                    "Expected at least 1 item",
                ));
            }
            if emails.len() > MAX_BATCH_EMAILS {
                issues.push(ValidationIssue::new(
                    "parameters.emails",
                    format!("Expected at most {MAX_BATCH_EMAILS} items"),
                ));
            }
            for (index, email) in emails.iter().enumerate() {
                match email.as_str() {
                    Some(candidate) if validate_email(candidate) => {}
                    _ => issues.push(ValidationIssue::new(
                        format!("parameters.emails.{index}"),
                        "Expected a valid email address",
                    )),
                }
            }
        }
        Some(_) => issues.push(ValidationIssue::new(
            "parameters.emails",
            "Expected a list of email addresses",
        )),
    }

    if issues.is_empty() {
        Ok(parameters.clone())
    } else {
        Err(issues)
    }
}

fn validate_lucky_job(
    parameters: &Map<String, Value>,
) -> Result<Map<String, Value>, Vec<ValidationIssue>> {
    let mut issues = Vec::new();
    reject_unknown_fields(parameters, &[], &mut issues);

    if issues.is_empty() {
        Ok(parameters.clone())
    } else {
        Err(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected an object, got {other}"),
        }
    }

    #[test]
    fn test_registered_types() {
        assert!(is_registered("compute_sum"));
        assert!(is_registered("batch_email"));
        assert!(!is_registered("mine_bitcoin"));
    }

    #[test]
    fn test_compute_sum_valid() {
        let normalized =
            validate_parameters("compute_sum", &map(json!({ "numbers": [1, 2.5, -3] }))).unwrap();
        assert_eq!(normalized["numbers"], json!([1, 2.5, -3]));
    }

    #[test]
    fn test_compute_sum_rejects_empty_and_non_numbers() {
        let issues =
            validate_parameters("compute_sum", &map(json!({ "numbers": [] }))).unwrap_err();
        assert_eq!(issues[0].field, "parameters.numbers");

        let issues =
            validate_parameters("compute_sum", &map(json!({ "numbers": [1, "two"] })))
                .unwrap_err();
        assert_eq!(issues[0].field, "parameters.numbers.1");
    }

    #[test]
    fn test_compute_sum_requires_numbers_field() {
        let issues = validate_parameters("compute_sum", &Map::new()).unwrap_err();
        assert_eq!(issues, vec![ValidationIssue::new("parameters.numbers", "Field required")]);
    }

    #[test]
    fn test_unknown_fields_rejected_for_every_schema() {
        let issues = validate_parameters(
            "compute_sum",
            &map(json!({ "numbers": [1], "bogus": true })),
        )
        .unwrap_err();
        assert_eq!(issues[0].field, "parameters.bogus");

        let issues = validate_parameters("lucky_job", &map(json!({ "luck": 7 }))).unwrap_err();
        assert_eq!(issues[0].field, "parameters.luck");
    }

    #[test]
    fn test_generate_report_applies_default_sections() {
        let normalized =
            validate_parameters("generate_report", &map(json!({ "title": "Monthly Report" })))
                .unwrap();
        assert_eq!(
            normalized["sections"],
            json!(["overview", "details", "summary"])
        );
    }

    #[test]
    fn test_generate_report_rejects_empty_title() {
        let issues =
            validate_parameters("generate_report", &map(json!({ "title": "" }))).unwrap_err();
        assert_eq!(issues[0].field, "parameters.title");
    }

    #[test]
    fn test_batch_email_bounds_and_addresses() {
        let normalized = validate_parameters(
            "batch_email",
            &map(json!({ "emails": ["a@test.com", "b@test.com"] })),
        )
        .unwrap();
        assert_eq!(normalized["emails"].as_array().unwrap().len(), 2);

        let issues = validate_parameters(
            "batch_email",
            &map(json!({ "emails": ["not-an-email"] })),
        )
        .unwrap_err();
        assert_eq!(issues[0].field, "parameters.emails.0");

        let too_many: Vec<String> = (0..101).map(|i| format!("user{i}@test.com")).collect();
        let issues =
            validate_parameters("batch_email", &map(json!({ "emails": too_many }))).unwrap_err();
        assert_eq!(issues[0].field, "parameters.emails");
    }

    #[test]
    fn test_lucky_job_takes_no_parameters() {
        assert!(validate_parameters("lucky_job", &Map::new()).is_ok());
    }

    #[test]
    fn test_unregistered_type_is_one_issue() {
        let issues = validate_parameters("mine_bitcoin", &Map::new()).unwrap_err();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "task_type");
    }
}
