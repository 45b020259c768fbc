//! Project records and request-body validation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::error::ApiError;

pub const NAME_MAX_CHARS: usize = 100;
pub const DESCRIPTION_MAX_CHARS: usize = 500;

/// Project lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    #[default]
    Active,
    Archived,
}

impl ProjectStatus {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(Self::Active),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

/// A project owned by one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub user_id: String,
    pub org_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Build a new active project for `user_id`
    pub fn create(
        new: NewProject,
        user_id: impl Into<String>,
        org_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            org_id,
            name: new.name,
            description: new.description,
            status: ProjectStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply validated changes and bump `updated_at`
    pub fn apply(&mut self, changes: &ProjectChanges, now: DateTime<Utc>) {
        if let Some(name) = &changes.name {
            self.name = name.clone();
        }
        if let Some(description) = &changes.description {
            self.description = Some(description.clone());
        }
        if let Some(status) = changes.status {
            self.status = status;
        }
        self.updated_at = now;
    }
}

/// Validated fields for a new project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
}

/// Validated partial update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
}

/// `POST /api/projects` body as received
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateProjectBody {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// `PUT /api/projects/{id}` body as received
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProjectBody {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Field and form level validation messages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    form_errors: Vec<String>,
    field_errors: BTreeMap<&'static str, Vec<String>>,
}

impl ValidationErrors {
    pub fn form(message: impl Into<String>) -> Self {
        Self {
            form_errors: vec![message.into()],
            ..Default::default()
        }
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.field_errors.entry(field).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.form_errors.is_empty() && self.field_errors.is_empty()
    }

    pub fn field(&self, field: &str) -> Option<&[String]> {
        self.field_errors.get(field).map(Vec::as_slice)
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "formErrors": self.form_errors,
            "fieldErrors": self.field_errors,
        })
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::Validation(errors.to_json())
    }
}

fn check_name(errors: &mut ValidationErrors, name: &str) {
    let len = name.chars().count();
    if len < 1 {
        errors.add("name", "String must contain at least 1 character(s)");
    } else if len > NAME_MAX_CHARS {
        errors.add(
            "name",
            format!("String must contain at most {NAME_MAX_CHARS} character(s)"),
        );
    }
}

fn check_description(errors: &mut ValidationErrors, description: &str) {
    if description.chars().count() > DESCRIPTION_MAX_CHARS {
        errors.add(
            "description",
            format!("String must contain at most {DESCRIPTION_MAX_CHARS} character(s)"),
        );
    }
}

impl CreateProjectBody {
    pub fn validate(self) -> Result<NewProject, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        match &self.name {
            Some(name) => check_name(&mut errors, name),
            None => errors.add("name", "Required"),
        }
        if let Some(description) = &self.description {
            check_description(&mut errors, description);
        }

        match (errors.is_empty(), self.name) {
            (true, Some(name)) => Ok(NewProject {
                name,
                description: self.description,
            }),
            _ => Err(errors),
        }
    }
}

impl UpdateProjectBody {
    pub fn validate(self) -> Result<ProjectChanges, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        if let Some(name) = &self.name {
            check_name(&mut errors, name);
        }
        if let Some(description) = &self.description {
            check_description(&mut errors, description);
        }
        let status = match self.status.as_deref() {
            Some(raw) => {
                let parsed = ProjectStatus::parse(raw);
                if parsed.is_none() {
                    errors.add(
                        "status",
                        format!("Invalid enum value. Expected 'active' | 'archived', received '{raw}'"),
                    );
                }
                parsed
            }
            None => None,
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(ProjectChanges {
            name: self.name,
            description: self.description,
            status,
        })
    }
}
