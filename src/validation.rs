//! Validation System - Fail-Fast Rules
//!
//! Rules run in declared order; the first violation wins.

use serde::{Deserialize, Serialize};

use crate::constraints::ConstraintTable;
use crate::submission::{CandidateFile, FormValues};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IssueScope {
    File,
    Form,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IssueField {
    File,
    NumColors,
    MaxWidth,
    MinRegionSize,
}

impl IssueField {
    pub fn scope(&self) -> IssueScope {
        match self {
            IssueField::File => IssueScope::File,
            _ => IssueScope::Form,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationIssue {
    pub rule: String,
    pub field: IssueField,
    pub scope: IssueScope,
    pub message: String,
}

impl ValidationIssue {
    fn new(rule: &str, field: IssueField, message: String) -> Self {
        Self {
            rule: rule.to_string(),
            field,
            scope: field.scope(),
            message,
        }
    }

    pub fn missing_file() -> Self {
        Self::new(
            FilePresentRule.name(),
            IssueField::File,
            "Choose a PNG or JPEG image to continue.".to_string(),
        )
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Validation rule trait - yields at most one issue
pub trait ValidationRule<I: ?Sized> {
    fn name(&self) -> &'static str;
    fn check(&self, input: &I, table: &ConstraintTable) -> Option<ValidationIssue>;
}

// --- File Rules ---

pub struct FilePresentRule;

impl ValidationRule<Option<&CandidateFile>> for FilePresentRule {
    fn name(&self) -> &'static str { "file_present" }

    fn check(&self, input: &Option<&CandidateFile>, _table: &ConstraintTable) -> Option<ValidationIssue> {
        match input {
            Some(_) => None,
            None => Some(ValidationIssue::missing_file()),
        }
    }
}

pub struct MediaTypeRule;

impl ValidationRule<Option<&CandidateFile>> for MediaTypeRule {
    fn name(&self) -> &'static str { "media_type" }

    fn check(&self, input: &Option<&CandidateFile>, table: &ConstraintTable) -> Option<ValidationIssue> {
        let file = (*input)?;
        if table.accepts_media_type(&file.media_type) {
            return None;
        }
        Some(ValidationIssue::new(
            self.name(),
            IssueField::File,
            "Only PNG or JPEG files are supported.".to_string(),
        ))
    }
}

pub struct NonEmptyRule;

impl ValidationRule<Option<&CandidateFile>> for NonEmptyRule {
    fn name(&self) -> &'static str { "non_empty" }

    fn check(&self, input: &Option<&CandidateFile>, _table: &ConstraintTable) -> Option<ValidationIssue> {
        let file = (*input)?;
        (file.size() == 0).then(|| {
            ValidationIssue::new(
                self.name(),
                IssueField::File,
                "File is empty. Pick another image.".to_string(),
            )
        })
    }
}

pub struct UploadSizeRule;

impl ValidationRule<Option<&CandidateFile>> for UploadSizeRule {
    fn name(&self) -> &'static str { "upload_size" }

    fn check(&self, input: &Option<&CandidateFile>, table: &ConstraintTable) -> Option<ValidationIssue> {
        let file = (*input)?;
        (file.size() > table.max_upload_bytes).then(|| {
            ValidationIssue::new(
                self.name(),
                IssueField::File,
                format!("File is too large. Maximum size is {} MB.", table.max_upload_mb()),
            )
        })
    }
}

// --- Form Rules ---

pub struct ColorCountRule;

impl ValidationRule<FormValues> for ColorCountRule {
    fn name(&self) -> &'static str { "num_colors" }

    fn check(&self, input: &FormValues, table: &ConstraintTable) -> Option<ValidationIssue> {
        let bound = table.num_colors;
        (!bound.admits(input.num_colors)).then(|| {
            ValidationIssue::new(
                self.name(),
                IssueField::NumColors,
                format!("Number of colors must be between {} and {}.", bound.min, bound.max),
            )
        })
    }
}

pub struct MaxWidthRule;

impl ValidationRule<FormValues> for MaxWidthRule {
    fn name(&self) -> &'static str { "max_width" }

    fn check(&self, input: &FormValues, table: &ConstraintTable) -> Option<ValidationIssue> {
        let bound = table.max_width;
        (!bound.admits(input.max_width)).then(|| {
            ValidationIssue::new(
                self.name(),
                IssueField::MaxWidth,
                format!("Max width must be between {} and {}px.", bound.min, bound.max),
            )
        })
    }
}

pub struct RegionSizeRule;

impl ValidationRule<FormValues> for RegionSizeRule {
    fn name(&self) -> &'static str { "min_region_size" }

    fn check(&self, input: &FormValues, table: &ConstraintTable) -> Option<ValidationIssue> {
        let bound = table.min_region_size;
        (!bound.admits(input.min_region_size)).then(|| {
            ValidationIssue::new(
                self.name(),
                IssueField::MinRegionSize,
                format!(
                    "Minimum region size must be between {} and {} pixels.",
                    bound.min, bound.max
                ),
            )
        })
    }
}

fn first_issue<I: ?Sized>(
    rules: &[&dyn ValidationRule<I>],
    input: &I,
    table: &ConstraintTable,
) -> Option<ValidationIssue> {
    rules.iter().find_map(|rule| rule.check(input, table))
}

/// Check a candidate file: presence, type, emptiness, size.
pub fn validate_file(candidate: Option<&CandidateFile>, table: &ConstraintTable) -> Option<ValidationIssue> {
    let rules: [&dyn ValidationRule<Option<&CandidateFile>>; 4] =
        [&FilePresentRule, &MediaTypeRule, &NonEmptyRule, &UploadSizeRule];
    first_issue(&rules, &candidate, table)
}

/// Check numeric form values: colors, width, region size.
pub fn validate_form(values: &FormValues, table: &ConstraintTable) -> Option<ValidationIssue> {
    let rules: [&dyn ValidationRule<FormValues>; 3] = [&ColorCountRule, &MaxWidthRule, &RegionSizeRule];
    first_issue(&rules, values, table)
}
