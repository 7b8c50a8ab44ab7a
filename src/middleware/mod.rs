pub mod auth;
pub mod response;
pub mod validate_study;

pub use auth::{session_middleware, SESSION_HEADER};
pub use response::{created, ok, ApiResult, Created};
pub use validate_study::{validate_study_middleware, SessionStudy};
