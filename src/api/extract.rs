//! Request extractors that reject with the API's own error body instead
//! of axum's plain-text rejections

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::request::Parts,
};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::collections::HashMap;

use crate::error::ApiError;

/// JSON request body. Content type is not checked; malformed or
/// mistyped JSON is a 400 `BadRequestException`.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::invalid_json(format!("Could not read request body: {}", e)))?;
        if bytes.is_empty() {
            return Err(ApiError::invalid_json("Expected JSON in the request body"));
        }
        serde_json::from_slice(&bytes)
            .map(JsonBody)
            .map_err(|e| ApiError::invalid_json(format!("Error parsing JSON in request body: {}", e)))
    }
}

/// Raw query string parameters with typed accessors
#[derive(Debug, Default)]
pub struct QueryParams(HashMap<String, String>);

#[async_trait]
impl<S> FromRequestParts<S> for QueryParams
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Query(params) = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
            .map_err(|e| ApiError::bad_request(format!("Invalid query string: {}", e)))?;
        Ok(QueryParams(params))
    }
}

impl QueryParams {
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        QueryParams(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    /// Non-blank value of `name`
    pub fn string(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    /// Only `true` (any case) counts as set
    pub fn flag(&self, name: &str) -> bool {
        self.string(name).is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    pub fn int(&self, name: &str, default: i64) -> Result<i64, ApiError> {
        match self.string(name) {
            None => Ok(default),
            Some(v) => v
                .parse()
                .map_err(|_| ApiError::bad_request(format!("{} '{}' is not a valid integer", name, v))),
        }
    }

    pub fn timestamp(&self, name: &str) -> Result<Option<DateTime<Utc>>, ApiError> {
        match self.string(name) {
            None => Ok(None),
            Some(v) => DateTime::parse_from_rfc3339(v)
                .map(|t| Some(t.with_timezone(&Utc)))
                .map_err(|_| ApiError::bad_request(format!("{} '{}' is not a valid timestamp", name, v))),
        }
    }

    /// Parse `name` with `FromStr`, reporting failures as a bad request
    pub fn parsed<T: std::str::FromStr<Err = String>>(&self, name: &str) -> Result<Option<T>, ApiError> {
        self.string(name)
            .map(|v| v.parse::<T>().map_err(ApiError::bad_request))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::TemplateType;

    #[test]
    fn flags_and_numbers() {
        let params = QueryParams::from_pairs(&[("includeDeleted", "TRUE"), ("physical", "yes"), ("pageSize", "20")]);
        assert!(params.flag("includeDeleted"));
        assert!(!params.flag("physical"));
        assert!(!params.flag("missing"));
        assert_eq!(params.int("pageSize", 50).unwrap(), 20);
        assert_eq!(params.int("offsetBy", 0).unwrap(), 0);
    }

    #[test]
    fn bad_values_are_bad_requests() {
        let params = QueryParams::from_pairs(&[("pageSize", "lots"), ("type", "fax"), ("startTime", "today")]);
        assert_eq!(params.int("pageSize", 50).unwrap_err().status_code(), 400);
        assert!(params.parsed::<TemplateType>("type").is_err());
        assert!(params.timestamp("startTime").is_err());
    }
}
