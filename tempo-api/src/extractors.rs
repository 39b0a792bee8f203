//! Request extractors.
//!
//! Authentication itself is an external collaborator (a gateway terminates
//! it); the caller's identity reaches this service as trusted headers.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tempo_core::EntityId;
use uuid::Uuid;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const TENANT_ID_HEADER: &str = "x-tenant-id";

/// Caller identity extracted from `X-User-Id` / `X-Tenant-Id` headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: EntityId,
    pub tenant_id: EntityId,
}

#[async_trait]
impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header_uuid(parts, USER_ID_HEADER)?
            .ok_or_else(|| ApiError::unauthorized("Missing X-User-Id header"))?;
        // Single-tenant deployments may omit the tenant header; the user id
        // then doubles as the tenant key.
        let tenant_id = header_uuid(parts, TENANT_ID_HEADER)?.unwrap_or(user_id);

        Ok(CallerIdentity { user_id, tenant_id })
    }
}

fn header_uuid(parts: &Parts, name: &str) -> Result<Option<Uuid>, ApiError> {
    match parts.headers.get(name) {
        None => Ok(None),
        Some(value) => {
            let text = value
                .to_str()
                .map_err(|_| ApiError::invalid_input(format!("{} is not valid UTF-8", name)))?;
            let id = text
                .parse::<Uuid>()
                .map_err(|_| ApiError::invalid_input(format!("{} is not a valid UUID", name)))?;
            Ok(Some(id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with_headers(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn test_caller_identity_requires_user_header() {
        let mut parts = parts_with_headers(&[]);
        let result = CallerIdentity::from_request_parts(&mut parts, &()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_caller_identity_defaults_tenant_to_user() {
        let user = Uuid::now_v7();
        let mut parts = parts_with_headers(&[(USER_ID_HEADER, &user.to_string())]);
        let identity = CallerIdentity::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(identity.user_id, user);
        assert_eq!(identity.tenant_id, user);
    }

    #[tokio::test]
    async fn test_caller_identity_rejects_bad_uuid() {
        let mut parts = parts_with_headers(&[(USER_ID_HEADER, "not-a-uuid")]);
        let result = CallerIdentity::from_request_parts(&mut parts, &()).await;
        assert!(result.is_err());
    }
}
