use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::Response,
};

use shared_models::auth::{Role, User};
use shared_models::error::AppError;

use crate::jwt::validate_token;
use crate::state::AppState;

/// Validates the bearer token and stores the `User` in request extensions.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let auth_value = request
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?
        .to_str()
        .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?;

    let token = auth_value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Auth("Invalid authorization header format".to_string()))?;

    let user = validate_token(token, &state.config.supabase_jwt_secret)
        .map_err(|e| AppError::Auth(e.to_string()))?;

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

pub fn extract_user<B>(request: &Request<B>) -> Result<User, AppError> {
    request
        .extensions()
        .get::<User>()
        .cloned()
        .ok_or_else(|| AppError::Auth("User not found in request extensions".to_string()))
}

/// Returns the user's role if it is one of `allowed`.
pub fn require_role(user: &User, allowed: &[Role]) -> Result<Role, AppError> {
    match user.role() {
        Some(role) if allowed.contains(&role) => Ok(role),
        _ => Err(AppError::Forbidden(format!(
            "requires one of the roles: {}",
            allowed
                .iter()
                .map(|r| r.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestUser;
    use assert_matches::assert_matches;

    #[test]
    fn role_gate_rejects_other_roles() {
        let patient = TestUser::patient("p@example.com").to_user();
        assert_matches!(
            require_role(&patient, &[Role::Admin, Role::Doctor]),
            Err(AppError::Forbidden(_))
        );

        let admin = TestUser::admin("a@example.com").to_user();
        assert_eq!(require_role(&admin, &[Role::Admin, Role::Doctor]).unwrap(), Role::Admin);
    }

    #[test]
    fn missing_extension_is_auth_error() {
        let request = Request::builder().body(()).unwrap();
        assert_matches!(extract_user(&request), Err(AppError::Auth(_)));
    }
}
