//! Project record: the persisted unit pairing a name with one stored data file.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{QuarryError, Result};

/// A project as stored in the record document.
///
/// Field names are part of the wire and on-disk format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Opaque identifier, assigned at creation and never reused.
    pub id: String,
    pub name: String,
    /// Stored location inside the file vault, e.g. `./files/1718000000000-demo.csv`.
    pub file_location: String,
}

impl Project {
    /// Create a record with a fresh UUID v4 identifier.
    #[must_use]
    pub fn new(name: impl Into<String>, file_location: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            file_location: file_location.into(),
        }
    }
}

/// Validate a project name, returning it trimmed.
///
/// # Errors
///
/// Returns [`QuarryError::InvalidArgument`] if the name is empty or whitespace-only.
pub fn validate_name(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(QuarryError::InvalidArgument(
            "Project name is required.".to_string(),
        ));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_projects_get_distinct_ids() {
        let a = Project::new("Sales Q1", "./files/1-a.csv");
        let b = Project::new("Sales Q1", "./files/1-a.csv");
        assert_ne!(a.id, b.id);
        assert!(Uuid::parse_str(&a.id).is_ok());
    }

    #[test]
    fn record_json_shape_is_stable() {
        let project = Project {
            id: "p-1".to_string(),
            name: "Sales Q1".to_string(),
            file_location: "./files/1-demo.csv".to_string(),
        };
        let json = serde_json::to_value(&project).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "id": "p-1",
                "name": "Sales Q1",
                "file_location": "./files/1-demo.csv",
            })
        );
    }

    #[test]
    fn validate_name_rejects_blank_and_trims() {
        assert!(validate_name("").is_err());
        assert!(validate_name(" \t\n").is_err());
        assert_eq!(validate_name("  Sales Q1 ").expect("valid"), "Sales Q1");
    }
}
