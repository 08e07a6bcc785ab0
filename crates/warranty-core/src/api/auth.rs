//! Identity service calls: sign in and register.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ApiError, FieldError, Gateway};
use crate::token::Claims;

const LOGIN_PATH: &str = "/auth/login";
const REGISTER_PATH: &str = "/auth/register";

/// The only token type the service issues
const BEARER: &str = "Bearer";

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct AuthResponse {
    pub token: String,
    #[serde(rename = "type", default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    BEARER.to_string()
}

impl LoginRequest {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Same constraints the service enforces, checked before sending.
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors = Vec::new();
        check_email(&self.email, &mut errors);
        check_required("password", "Password", &self.password, &mut errors);
        into_result(errors)
    }
}

impl RegisterRequest {
    pub fn new(
        email: impl Into<String>,
        name: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
            password: password.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors = Vec::new();
        check_required("name", "Name", &self.name, &mut errors);
        check_email(&self.email, &mut errors);
        check_required("password", "Password", &self.password, &mut errors);
        into_result(errors)
    }
}

fn check_required(field: &str, label: &str, value: &str, errors: &mut Vec<FieldError>) -> bool {
    if value.trim().is_empty() {
        errors.push(FieldError::new(field, format!("{} is required", label)));
        false
    } else {
        true
    }
}

fn check_email(email: &str, errors: &mut Vec<FieldError>) {
    if check_required("email", "Email", email, errors) && !is_valid_email(email) {
        errors.push(FieldError::new("email", "Email is invalid"));
    }
}

/// Loose shape check: one `@` with something on both sides and no whitespace.
fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

fn into_result(errors: Vec<FieldError>) -> Result<(), ApiError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}

/// Sign-in and registration against the identity service.
#[derive(Clone)]
pub struct AuthApi {
    gateway: Gateway,
}

impl AuthApi {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    /// Exchange credentials for a token and open a session with it.
    pub async fn sign_in(&self, request: &LoginRequest) -> Result<Claims, ApiError> {
        request.validate()?;

        let response: AuthResponse = self.gateway.post_json(LOGIN_PATH, request).await?;
        if !response.token_type.eq_ignore_ascii_case(BEARER) {
            return Err(ApiError::InvalidResponse(format!(
                "Unsupported token type: {}",
                response.token_type
            )));
        }

        let claims = self.gateway.session().login(&response.token)?;
        info!(email = %request.email, "Signed in to identity service");
        Ok(claims)
    }

    /// Create an account. Does not sign in.
    pub async fn register(&self, request: &RegisterRequest) -> Result<(), ApiError> {
        request.validate()?;
        self.gateway
            .post_no_content(REGISTER_PATH, request)
            .await?;
        info!(email = %request.email, "Registered account");
        Ok(())
    }
}
