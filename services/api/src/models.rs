//! API models for request and response payloads

use serde::{Deserialize, Serialize};

use crate::validation::{Validate, ValidationError};

pub mod tag;
pub mod user;

pub const DEFAULT_PER_PAGE: i64 = 16;
pub const MAX_PER_PAGE: i64 = 100;

/// One page of a listing, reshaped by the dispatch layer on paginated routes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub documents: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_page: i64,
}

impl<T> Page<T> {
    pub fn new(documents: Vec<T>, total: i64, request: &PageRequest) -> Self {
        let total_page = if total == 0 {
            0
        } else {
            (total + request.per_page - 1) / request.per_page
        };
        Self {
            documents,
            total,
            page: request.page,
            per_page: request.per_page,
            total_page,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            documents: self.documents.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
            total_page: self.total_page,
        }
    }
}

/// Query string of listing routes
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    #[serde(alias = "perPage")]
    pub per_page: Option<i64>,
    pub keyword: Option<String>,
}

/// Validated paging window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub per_page: i64,
    pub keyword: Option<String>,
}

impl PageRequest {
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.per_page)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
            keyword: None,
        }
    }
}

impl Validate for PageQuery {
    type Valid = PageRequest;

    fn validate(self) -> Result<PageRequest, ValidationError> {
        let page = self.page.unwrap_or(1);
        if page < 1 {
            return Err(ValidationError::new("page", "must be at least 1"));
        }
        let per_page = self.per_page.unwrap_or(DEFAULT_PER_PAGE);
        if !(1..=MAX_PER_PAGE).contains(&per_page) {
            return Err(ValidationError::new(
                "per_page",
                format!("must be between 1 and {}", MAX_PER_PAGE),
            ));
        }
        if (page - 1).checked_mul(per_page).is_none() {
            return Err(ValidationError::new("page", "is too large"));
        }
        let keyword = self
            .keyword
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        Ok(PageRequest {
            page,
            per_page,
            keyword,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn page_counts_partial_pages() {
        let request = PageRequest {
            page: 2,
            per_page: 10,
            keyword: None,
        };
        let page = Page::new(vec![1, 2, 3], 23, &request);
        assert_eq!(page.total_page, 3);
        assert_eq!(request.offset(), 10);
        assert_eq!(Page::<i32>::new(vec![], 0, &request).total_page, 0);
    }

    #[test]
    fn page_query_defaults_and_bounds() {
        let request = assert_ok!(PageQuery::default().validate());
        assert_eq!(request, PageRequest::default());

        let too_big = PageQuery {
            per_page: Some(500),
            ..Default::default()
        };
        assert_err!(too_big.validate());

        let overflowing = PageQuery {
            page: Some(i64::MAX),
            ..Default::default()
        };
        let error = assert_err!(overflowing.validate());
        assert_eq!(error.field, "page");

        let last_page = PageRequest {
            page: i64::MAX,
            per_page: MAX_PER_PAGE,
            keyword: None,
        };
        assert_eq!(last_page.offset(), i64::MAX);

        let blank_keyword = PageQuery {
            keyword: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(blank_keyword.validate().unwrap().keyword, None);
    }
}
