//! User registration, sign-in, and the JWT bearer-token extractor.
//!
//! The expense routes only consume the authenticated identity (the email in
//! the token claims); everything else about credentials lives here.

use axum::{
    async_trait,
    body::Body,
    extract::{FromRef, FromRequestParts, Json, State},
    http::request::Parts,
    http::{Response, StatusCode},
    response::IntoResponse,
    RequestPartsExt,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use chrono::{Duration, Utc};
use email_address::EmailAddress;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;

use crate::{
    config::AppConfig,
    db::{refresh_user_updated_at, DbError, Insert, SelectBy},
    models::{NewUser, PasswordHash, RawPassword, User},
};

/// The contents of a JSON Web Token.
#[derive(Serialize, Deserialize)]
pub struct Claims {
    /// The expiry time of the token.
    pub exp: usize,
    /// The time the token was issued.
    pub iat: usize,
    /// Email associated with the token.
    pub email: EmailAddress,
}

#[async_trait]
impl<S> FromRequestParts<S> for Claims
where
    AppConfig: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AuthError::InvalidToken)?;

        let app_config = parts
            .extract_with_state::<AppConfig, _>(state)
            .await
            .map_err(|_| AuthError::InvalidToken)?;

        let token_data = decode_jwt(bearer.token(), app_config.decoding_key())?;

        Ok(token_data.claims)
    }
}

/// The request body for sign-in.
#[derive(Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// The request body for creating an account.
#[derive(Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug)]
pub enum AuthError {
    WrongCredentials,
    MissingCredentials,
    InvalidEmail,
    UserAlreadyExists,
    TokenCreation,
    InvalidToken,
    InternalError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response<Body> {
        let (status, error_message) = match self {
            AuthError::WrongCredentials => (StatusCode::UNAUTHORIZED, "Wrong credentials"),
            AuthError::MissingCredentials => (StatusCode::BAD_REQUEST, "Missing credentials"),
            AuthError::InvalidEmail => (StatusCode::BAD_REQUEST, "Invalid email address"),
            AuthError::UserAlreadyExists => {
                (StatusCode::CONFLICT, "A user with this email already exists")
            }
            AuthError::TokenCreation => (StatusCode::INTERNAL_SERVER_ERROR, "Token creation error"),
            AuthError::InvalidToken => (StatusCode::BAD_REQUEST, "Invalid token"),
            AuthError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Handler for account creation.
///
/// # Errors
///
/// This function will return an error if the username, email, or password is
/// empty, the email is malformed or already registered, or the password could
/// not be hashed.
pub async fn register(
    State(state): State<AppConfig>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), AuthError> {
    if request.username.is_empty() || request.email.is_empty() || request.password.is_empty() {
        return Err(AuthError::MissingCredentials);
    }

    let email = EmailAddress::from_str(&request.email).map_err(|_| AuthError::InvalidEmail)?;
    let raw_password =
        RawPassword::new(request.password).map_err(|_| AuthError::MissingCredentials)?;
    let password_hash = PasswordHash::new(raw_password).map_err(|e| {
        tracing::error!("Error hashing password: {e:?}");
        AuthError::InternalError
    })?;

    let user = NewUser {
        username: request.username,
        email,
        password_hash,
        created_at: Utc::now(),
    }
    .insert(&state.db_connection().lock().unwrap())
    .map_err(|e| match e {
        DbError::DuplicateEmail => AuthError::UserAlreadyExists,
        e => {
            tracing::error!("Error creating user: {e:?}");
            AuthError::InternalError
        }
    })?;

    Ok((StatusCode::CREATED, Json(user)))
}

/// Handler for sign-in requests.
///
/// A successful sign-in refreshes the user's `updated_at` and returns a fresh
/// bearer token.
///
/// # Errors
///
/// This function will return an error in a few situations.
/// - The email or password is empty.
/// - The email does not belong to a registered user.
/// - The password is not correct.
/// - An internal error occurred when verifying the password.
pub async fn sign_in(
    State(state): State<AppConfig>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<String>, AuthError> {
    if credentials.email.is_empty() || credentials.password.is_empty() {
        return Err(AuthError::MissingCredentials);
    }

    // An unregistered email and a malformed one get the same answer, so a
    // client cannot probe which addresses exist.
    let email =
        EmailAddress::from_str(&credentials.email).map_err(|_| AuthError::WrongCredentials)?;

    let connection = state.db_connection().lock().unwrap();

    let user = User::select(&email, &connection).map_err(|e| match e {
        DbError::NotFound => AuthError::WrongCredentials,
        _ => {
            tracing::error!("Error matching user: {e:?}");
            AuthError::InternalError
        }
    })?;

    let raw_password =
        RawPassword::new(credentials.password).map_err(|_| AuthError::MissingCredentials)?;

    let password_is_correct = user.password_hash().verify(&raw_password).map_err(|e| {
        tracing::error!("Error verifying password: {}", e);
        AuthError::InternalError
    })?;

    if !password_is_correct {
        return Err(AuthError::WrongCredentials);
    }

    refresh_user_updated_at(user.id(), Utc::now(), &connection).map_err(|e| {
        tracing::error!("Error refreshing user timestamp: {e:?}");
        AuthError::InternalError
    })?;

    let token = encode_jwt(user.email(), state.encoding_key())?;

    Ok(Json(token))
}

fn encode_jwt(email: &EmailAddress, encoding_key: &EncodingKey) -> Result<String, AuthError> {
    let now = Utc::now();
    let exp = (now + Duration::minutes(15)).timestamp() as usize;
    let iat = now.timestamp() as usize;
    let claims = Claims {
        exp,
        iat,
        email: email.to_owned(),
    };

    encode(&Header::default(), &claims, encoding_key).map_err(|e| {
        tracing::error!("Error encoding JWT: {e:?}");
        AuthError::TokenCreation
    })
}

fn decode_jwt(jwt_token: &str, decoding_key: &DecodingKey) -> Result<TokenData<Claims>, AuthError> {
    decode(jwt_token, decoding_key, &Validation::default()).map_err(|_| AuthError::InvalidToken)
}
