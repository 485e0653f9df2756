//! Query parameters shared by the domain routes.
//!
//! `page` defaults to 1 and `limit` to 20; zero values and limits above
//! [`Paging::MAX_LIMIT`] are rejected. Blank strings count as absent.

use serde::Deserialize;

use mediahub_core::Paging;

use super::error::ApiError;

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Validate `page`/`limit` into a [`Paging`].
pub fn paging(page: Option<u32>, limit: Option<u32>) -> Result<Paging, ApiError> {
    let defaults = Paging::default();
    let page = page.unwrap_or(defaults.page);
    let limit = limit.unwrap_or(defaults.limit);
    if page == 0 {
        return Err(ApiError::bad_request("page must be at least 1"));
    }
    if limit == 0 || limit > Paging::MAX_LIMIT {
        return Err(ApiError::bad_request(format!(
            "limit must be between 1 and {}",
            Paging::MAX_LIMIT
        )));
    }
    Ok(Paging::new(page, limit))
}

#[derive(Debug, Default, Deserialize)]
pub struct SourceQuery {
    #[serde(default)]
    pub source: Option<String>,
}

impl SourceQuery {
    pub fn source(&self) -> Option<&str> {
        non_blank(&self.source)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl PageQuery {
    pub fn source(&self) -> Option<&str> {
        non_blank(&self.source)
    }

    pub fn paging(&self) -> Result<Paging, ApiError> {
        paging(self.page, self.limit)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CategoryQuery {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl CategoryQuery {
    pub fn source(&self) -> Option<&str> {
        non_blank(&self.source)
    }

    pub fn category(&self) -> Result<&str, ApiError> {
        non_blank(&self.category).ok_or_else(|| ApiError::bad_request("category is required"))
    }

    pub fn paging(&self) -> Result<Paging, ApiError> {
        paging(self.page, self.limit)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl SearchQuery {
    pub fn source(&self) -> Option<&str> {
        non_blank(&self.source)
    }

    /// The trimmed keyword; `None` means "answer with an empty listing".
    pub fn keyword(&self) -> Option<&str> {
        non_blank(&self.keyword)
    }

    pub fn paging(&self) -> Result<Paging, ApiError> {
        paging(self.page, self.limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_paging_defaults() {
        assert_eq!(paging(None, None).unwrap(), Paging::new(1, 20));
        assert_eq!(paging(Some(3), Some(100)).unwrap(), Paging::new(3, 100));
    }

    #[test]
    fn test_paging_rejects_out_of_range() {
        for (page, limit) in [(Some(0), None), (None, Some(0)), (None, Some(101))] {
            let err = paging(page, limit).unwrap_err();
            assert_eq!(err.status, StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn test_blank_values_are_absent() {
        let query = CategoryQuery {
            source: Some("  ".into()),
            category: Some("".into()),
            ..Default::default()
        };
        assert_eq!(query.source(), None);
        assert!(query.category().is_err());

        let search = SearchQuery {
            keyword: Some(" one piece ".into()),
            ..Default::default()
        };
        assert_eq!(search.keyword(), Some("one piece"));
    }
}
