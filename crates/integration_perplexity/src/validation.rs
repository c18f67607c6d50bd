//! Request validation
//!
//! Runs before any network I/O. Unknown enum values are rejected with the
//! list of allowed values, never replaced by a default.

use std::str::FromStr;

use crate::error::PerplexityError;
use crate::models::{Recency, SearchFocus, SearchModel, SearchParams, SearchRequest};

/// Validate untyped parameters into a [`SearchRequest`]
///
/// Optional fields that are empty strings count as absent.
///
/// # Errors
///
/// Returns [`PerplexityError::Validation`] naming the first offending field.
pub fn validate(
    params: &SearchParams,
    max_query_length: usize,
) -> Result<SearchRequest, PerplexityError> {
    validate_query(&params.query, max_query_length)?;

    Ok(SearchRequest {
        query: params.query.clone(),
        model: parse_optional::<SearchModel>("model", params.model.as_deref())?,
        search_focus: parse_optional::<SearchFocus>("search_focus", params.search_focus.as_deref())?,
        recency: parse_optional::<Recency>("recency", params.recency.as_deref())?,
    })
}

/// Check that a query is non-blank and within the length limit
///
/// # Errors
///
/// Returns [`PerplexityError::Validation`] for field `query`.
pub fn validate_query(query: &str, max_query_length: usize) -> Result<(), PerplexityError> {
    if query.trim().is_empty() {
        return Err(PerplexityError::validation("query", "must not be empty"));
    }

    let length = query.chars().count();
    if length > max_query_length {
        return Err(PerplexityError::validation(
            "query",
            format!("too long (max {max_query_length} characters, got {length})"),
        ));
    }

    Ok(())
}

fn parse_optional<T>(field: &'static str, raw: Option<&str>) -> Result<Option<T>, PerplexityError>
where
    T: FromStr<Err = String>,
{
    match raw {
        None => Ok(None),
        Some(value) if value.is_empty() => Ok(None),
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|message| PerplexityError::validation(field, message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_QUERY_LENGTH;

    #[allow(clippy::panic)]
    fn field_of(err: &PerplexityError) -> &'static str {
        match err {
            PerplexityError::Validation { field, .. } => *field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn valid_params_produce_typed_request() {
        let params = SearchParams {
            query: "latest rust release".to_string(),
            model: Some("sonar".to_string()),
            search_focus: Some("academic".to_string()),
            recency: Some("week".to_string()),
        };

        let request = validate(&params, MAX_QUERY_LENGTH).unwrap();
        assert_eq!(request.query, "latest rust release");
        assert_eq!(request.model, Some(SearchModel::Sonar));
        assert_eq!(request.search_focus, Some(SearchFocus::Academic));
        assert_eq!(request.recency, Some(Recency::Week));
    }

    #[test]
    fn optional_fields_default_to_none() {
        let request = validate(&SearchParams::new("hello"), MAX_QUERY_LENGTH).unwrap();
        assert_eq!(request, SearchRequest::new("hello"));
    }

    #[test]
    fn empty_optional_strings_count_as_absent() {
        let params = SearchParams {
            query: "hello".to_string(),
            model: Some(String::new()),
            search_focus: Some(String::new()),
            recency: None,
        };
        let request = validate(&params, MAX_QUERY_LENGTH).unwrap();
        assert_eq!(request.model, None);
        assert_eq!(request.search_focus, None);
    }

    #[test]
    fn blank_query_rejected() {
        for query in ["", "   ", "\n\t"] {
            let err = validate(&SearchParams::new(query), MAX_QUERY_LENGTH).unwrap_err();
            assert_eq!(field_of(&err), "query");
        }
    }

    #[test]
    fn query_at_limit_accepted() {
        let query = "a".repeat(MAX_QUERY_LENGTH);
        assert!(validate(&SearchParams::new(query), MAX_QUERY_LENGTH).is_ok());
    }

    #[test]
    fn query_over_limit_rejected() {
        let query = "a".repeat(MAX_QUERY_LENGTH + 1);
        let err = validate(&SearchParams::new(query), MAX_QUERY_LENGTH).unwrap_err();
        assert_eq!(field_of(&err), "query");
        assert!(err.to_string().contains("10000"));
    }

    #[test]
    fn query_length_counts_characters_not_bytes() {
        let query = "é".repeat(10);
        assert!(validate_query(&query, 10).is_ok());
        assert!(validate_query(&query, 9).is_err());
    }

    #[test]
    fn unknown_model_rejected_with_allowed_values() {
        let params = SearchParams {
            model: Some("gpt-4".to_string()),
            ..SearchParams::new("hello")
        };
        let err = validate(&params, MAX_QUERY_LENGTH).unwrap_err();
        assert_eq!(field_of(&err), "model");
        assert!(err.to_string().contains("sonar, sonar-pro"));
    }

    #[test]
    fn unknown_focus_rejected() {
        let params = SearchParams {
            search_focus: Some("news".to_string()),
            ..SearchParams::new("hello")
        };
        let err = validate(&params, MAX_QUERY_LENGTH).unwrap_err();
        assert_eq!(field_of(&err), "search_focus");
        assert!(err.to_string().contains("web, academic, sec"));
    }

    #[test]
    fn unknown_recency_rejected() {
        let params = SearchParams {
            recency: Some("decade".to_string()),
            ..SearchParams::new("hello")
        };
        let err = validate(&params, MAX_QUERY_LENGTH).unwrap_err();
        assert_eq!(field_of(&err), "recency");
    }

    #[test]
    fn query_checked_before_enums() {
        let params = SearchParams {
            query: String::new(),
            model: Some("bogus".to_string()),
            ..Default::default()
        };
        let err = validate(&params, MAX_QUERY_LENGTH).unwrap_err();
        assert_eq!(field_of(&err), "query");
    }
}
