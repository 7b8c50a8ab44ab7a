use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;

use crate::api::format::{ApiObject, Typed};

/// Responses are the bare model JSON; existing clients do not expect an envelope
pub type ApiResult<T> = Result<T, crate::error::ApiError>;

/// 200 with a single typed model
pub fn ok<T: ApiObject>(value: T) -> Json<Typed<T>> {
    Json(Typed::from(value))
}

/// 201 with any JSON body
#[derive(Debug)]
pub struct Created<T: Serialize>(pub T);

impl<T: Serialize> IntoResponse for Created<T> {
    fn into_response(self) -> Response {
        (StatusCode::CREATED, Json(self.0)).into_response()
    }
}

/// 201 with a single typed model
pub fn created<T: ApiObject>(value: T) -> Created<Typed<T>> {
    Created(Typed::from(value))
}
