use crate::errors::{ApiError, ServiceError};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const SESSION_ID_HEADER: &str = "x-session-id";

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(data)).into_response()
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(data)).into_response()
}

/// Standard no content response
pub fn no_content_response() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

/// Validate request input
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ApiError> {
    input
        .validate()
        .map_err(|e| ApiError::ValidationError(format!("Validation failed: {}", e)))
}

/// Map service errors to API errors
pub fn map_service_error(err: ServiceError) -> ApiError {
    ApiError::ServiceError(err)
}

/// Caller identity as resolved by the fronting auth layer: an authenticated
/// user id and/or an anonymous session id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: Option<Uuid>,
    pub session_id: Option<String>,
}

impl CallerIdentity {
    pub fn require_user(&self) -> Result<Uuid, ApiError> {
        self.user_id
            .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))
    }
}

fn header_value<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header_value(parts, USER_ID_HEADER)
            .map(|raw| {
                Uuid::parse_str(raw).map_err(|_| {
                    ApiError::ValidationError(format!("{} must be a UUID", USER_ID_HEADER))
                })
            })
            .transpose()?;

        Ok(Self {
            user_id,
            session_id: header_value(parts, SESSION_ID_HEADER).map(String::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> Result<CallerIdentity, ApiError> {
        let (mut parts, _) = request.into_parts();
        CallerIdentity::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn reads_both_identity_headers() {
        let user = Uuid::new_v4();
        let request = Request::builder()
            .header(USER_ID_HEADER, user.to_string())
            .header(SESSION_ID_HEADER, "sess-1")
            .body(())
            .unwrap();

        let identity = extract(request).await.unwrap();
        assert_eq!(identity.user_id, Some(user));
        assert_eq!(identity.session_id.as_deref(), Some("sess-1"));
        assert_eq!(identity.require_user().unwrap(), user);
    }

    #[tokio::test]
    async fn malformed_user_id_is_rejected() {
        let request = Request::builder()
            .header(USER_ID_HEADER, "not-a-uuid")
            .body(())
            .unwrap();
        assert!(matches!(
            extract(request).await,
            Err(ApiError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn anonymous_caller_has_no_user() {
        let identity = extract(Request::builder().body(()).unwrap()).await.unwrap();
        assert_eq!(identity, CallerIdentity::default());
        assert!(matches!(
            identity.require_user(),
            Err(ApiError::Unauthorized(_))
        ));
    }
}
