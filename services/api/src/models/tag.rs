//! Tag models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::validation::{Validate, ValidationError, required, validate_slug};

/// Free-form key/value attached to a tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extend {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub extends: Vec<Extend>,
    pub create_at: DateTime<Utc>,
    pub update_at: DateTime<Utc>,
}

/// Create or replace payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub extends: Vec<Extend>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTag {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub extends: Vec<Extend>,
}

impl Validate for TagRequest {
    type Valid = NewTag;

    fn validate(self) -> Result<NewTag, ValidationError> {
        let name = required("name", self.name)?.trim().to_string();
        let slug = required("slug", self.slug)?.trim().to_string();
        validate_slug(&slug)?;
        if self.extends.iter().any(|extend| extend.name.trim().is_empty()) {
            return Err(ValidationError::new("extends", "entries need a name"));
        }
        let description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        Ok(NewTag {
            name,
            slug,
            description,
            extends: self.extends,
        })
    }
}

/// Body of the batch delete route
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteTagsRequest {
    #[serde(default)]
    pub ids: Vec<i64>,
}

impl Validate for DeleteTagsRequest {
    type Valid = Vec<i64>;

    fn validate(self) -> Result<Vec<i64>, ValidationError> {
        let mut ids = self.ids;
        if ids.is_empty() {
            return Err(ValidationError::new("ids", "should not be empty"));
        }
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_request_requires_name_and_valid_slug() {
        let request = TagRequest {
            name: Some("Rust".into()),
            slug: Some("rust lang".into()),
            ..Default::default()
        };
        assert_eq!(request.validate().unwrap_err().field, "slug");

        let request = TagRequest {
            slug: Some("rust".into()),
            ..Default::default()
        };
        assert_eq!(request.validate().unwrap_err().field, "name");
    }

    #[test]
    fn blank_description_is_dropped() {
        let tag = TagRequest {
            name: Some(" Rust ".into()),
            slug: Some("rust".into()),
            description: Some("  ".into()),
            extends: vec![Extend {
                name: "icon".into(),
                value: "crab".into(),
            }],
        }
        .validate()
        .unwrap();
        assert_eq!(tag.name, "Rust");
        assert_eq!(tag.description, None);
        assert_eq!(tag.extends.len(), 1);
    }

    #[test]
    fn delete_ids_are_deduplicated() {
        let ids = DeleteTagsRequest { ids: vec![3, 1, 3] }.validate().unwrap();
        assert_eq!(ids, vec![1, 3]);
        assert!(DeleteTagsRequest::default().validate().is_err());
    }
}
