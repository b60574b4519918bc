//! Record types for Person Sync
//!
//! `Person` is the persisted shape held by both stores. `PersonDto` is the
//! externally exposed shape, and `PersonPatch` carries a partial update where
//! every mutable field is explicitly present or absent.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Field names as they appear on the wire
pub mod fields {
    pub const ID: &str = "id";
    pub const FIRST_NAME: &str = "firstName";
    pub const LAST_NAME: &str = "lastName";
    pub const TELEPHONE: &str = "telephone";
}

/// Field constraints
pub mod limits {
    pub const FIRST_NAME_MIN: usize = 4;
    pub const FIRST_NAME_MAX: usize = 30;
    pub const LAST_NAME_MIN: usize = 4;
    pub const LAST_NAME_MAX: usize = 35;
    pub const TELEPHONE_MAX: i32 = 12;
}

/// Persisted person record
///
/// `id` is `None` until the primary store commits the record and never
/// changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub first_name: String,
    pub last_name: String,
    pub telephone: i32,
}

impl Person {
    /// Create an uncommitted record
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>, telephone: i32) -> Self {
        Self {
            id: None,
            first_name: first_name.into(),
            last_name: last_name.into(),
            telephone,
        }
    }

    /// Builder pattern: set id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Id of a committed record
    pub fn require_id(&self) -> Result<&str> {
        self.id
            .as_deref()
            .ok_or_else(|| SyncError::Internal("record has no id".to_string()))
    }
}

impl fmt::Display for Person {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Person{{id={}, first_name='{}', last_name='{}', telephone={}}}",
            self.id.as_deref().unwrap_or("null"),
            self.first_name,
            self.last_name,
            self.telephone
        )
    }
}

/// Externally exposed person shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub telephone: i32,
}

impl PersonDto {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>, telephone: i32) -> Self {
        Self {
            id: None,
            first_name: first_name.into(),
            last_name: last_name.into(),
            telephone,
        }
    }

    /// Builder pattern: set id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Check every field predicate, reporting the first violation
    pub fn validate(&self) -> Result<()> {
        validate_first_name(&self.first_name)?;
        validate_last_name(&self.last_name)?;
        validate_telephone(self.telephone)
    }
}

/// Partial update: `None` leaves the stored value unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telephone: Option<i32>,
}

impl PersonPatch {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn first_name(mut self, value: impl Into<String>) -> Self {
        self.first_name = Some(value.into());
        self
    }

    pub fn last_name(mut self, value: impl Into<String>) -> Self {
        self.last_name = Some(value.into());
        self
    }

    pub fn telephone(mut self, value: i32) -> Self {
        self.telephone = Some(value);
        self
    }

    /// Check predicates of the fields that are present
    pub fn validate(&self) -> Result<()> {
        if let Some(ref v) = self.first_name {
            validate_first_name(v)?;
        }
        if let Some(ref v) = self.last_name {
            validate_last_name(v)?;
        }
        if let Some(v) = self.telephone {
            validate_telephone(v)?;
        }
        Ok(())
    }
}

fn validate_length(field: &str, value: &str, min: usize, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(SyncError::validation(
            field,
            format!("length must be between {} and {}, got {}", min, max, len),
        ));
    }
    Ok(())
}

pub fn validate_first_name(value: &str) -> Result<()> {
    validate_length(
        fields::FIRST_NAME,
        value,
        limits::FIRST_NAME_MIN,
        limits::FIRST_NAME_MAX,
    )?;
    if !value.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(SyncError::validation(
            fields::FIRST_NAME,
            "must match ^[a-zA-Z0-9]*$",
        ));
    }
    Ok(())
}

pub fn validate_last_name(value: &str) -> Result<()> {
    validate_length(
        fields::LAST_NAME,
        value,
        limits::LAST_NAME_MIN,
        limits::LAST_NAME_MAX,
    )
}

pub fn validate_telephone(value: i32) -> Result<()> {
    if value > limits::TELEPHONE_MAX {
        return Err(SyncError::validation(
            fields::TELEPHONE,
            format!("must be less than or equal to {}", limits::TELEPHONE_MAX),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_dto_wire_shape() {
        let dto = PersonDto::new("abcd", "wxyzwxyzwxyz", 5);
        let json = serde_json::to_value(&dto).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"firstName": "abcd", "lastName": "wxyzwxyzwxyz", "telephone": 5})
        );
    }

    #[test]
    fn test_patch_omitted_fields_are_none() {
        let patch: PersonPatch =
            serde_json::from_value(serde_json::json!({"id": "p1", "firstName": "efgh"})).unwrap();
        assert_eq!(patch.first_name.as_deref(), Some("efgh"));
        assert!(patch.last_name.is_none());
        assert!(patch.telephone.is_none());
    }

    #[test]
    fn test_validation() {
        assert!(PersonDto::new("abcd", "wxyzwxyzwxyz", 5).validate().is_ok());
        assert!(PersonDto::new("AAAAAAAAAA", "AAAAAAAAAA", 12).validate().is_ok());

        let short = PersonDto::new("abc", "wxyzwxyzwxyz", 5).validate().unwrap_err();
        assert_eq!(short.kind(), ErrorKind::ValidationFailed);

        assert!(PersonDto::new("ab-cd", "wxyzwxyzwxyz", 5).validate().is_err());
        assert!(PersonDto::new("abcd", "wxy", 5).validate().is_err());
        assert!(PersonDto::new("abcd", "wxyzwxyzwxyz", 13).validate().is_err());
    }

    #[test]
    fn test_patch_validates_present_fields_only() {
        assert!(PersonPatch::new("p1").validate().is_ok());
        assert!(PersonPatch::new("p1").telephone(11).validate().is_ok());
        assert!(PersonPatch::new("p1").first_name("x").validate().is_err());
    }

    #[test]
    fn test_person_display() {
        let p = Person::new("abcd", "wxyz", 3).with_id("42");
        assert_eq!(
            p.to_string(),
            "Person{id=42, first_name='abcd', last_name='wxyz', telephone=3}"
        );
        assert!(Person::new("abcd", "wxyz", 3).require_id().is_err());
    }
}
