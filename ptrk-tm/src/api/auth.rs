//! Caller identity from upstream headers
//!
//! The permission service in front of ptrk-tm authenticates the caller and
//! forwards who they are and their role on the project:
//!
//! - `x-actor-id`: stable user identifier, recorded in the audit trail
//! - `x-actor-role`: one of owner, admin, project_manager, foreman,
//!   qc_inspector, viewer
//!
//! Authorization against that role happens in the engine.

use axum::{extract::FromRequestParts, http::request::Parts};
use ptrk_common::{Actor, Error, Role};

use super::ApiError;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Extractor for the calling actor
#[derive(Debug, Clone)]
pub struct RequestActor(pub Actor);

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, ApiError> {
    let value = parts
        .headers
        .get(name)
        .ok_or_else(|| Error::InvalidInput(format!("missing {} header", name)))?;

    let value = value
        .to_str()
        .map_err(|_| Error::InvalidInput(format!("{} header is not valid text", name)))?
        .trim();

    if value.is_empty() {
        return Err(Error::InvalidInput(format!("{} header is empty", name)).into());
    }
    Ok(value)
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequestActor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header(parts, ACTOR_ID_HEADER)?;
        let role: Role = header(parts, ACTOR_ROLE_HEADER)?.parse()?;
        Ok(RequestActor(Actor::new(id, role)))
    }
}
