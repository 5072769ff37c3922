use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Authenticated principal extracted from a verified access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthUser {
    pub id: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing access token")]
    MissingToken,
    #[error("Invalid or expired access token")]
    InvalidToken,
    #[error("Access token carries no user id")]
    MissingSubject,
}

/// Claims issued by the application's login flow. Older tokens carry the
/// user id as `id`, newer ones as the standard `sub`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    pub exp: i64,
}

/// HS256 access-token verification.
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    leeway_secs: u64,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            leeway_secs: 30,
        }
    }

    pub fn verify(&self, token: &str) -> Result<AuthUser, AuthError> {
        let header = decode_header(token).map_err(|_| AuthError::InvalidToken)?;
        if header.alg != Algorithm::HS256 {
            return Err(AuthError::InvalidToken);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = self.leeway_secs;

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            tracing::debug!("JWT validation failed: {}", e);
            AuthError::InvalidToken
        })?;

        data.claims
            .id
            .or(data.claims.sub)
            .filter(|id| !id.is_empty())
            .map(|id| AuthUser { id })
            .ok_or(AuthError::MissingSubject)
    }

    /// Token from `Authorization: Bearer ...`, falling back to a `token` query
    /// parameter for requests a browser issues on its own (iframes, links).
    pub fn extract_token(headers: &http::HeaderMap, query: Option<&str>) -> Option<String> {
        let from_header = headers
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        from_header.or_else(|| {
            query.and_then(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .find(|(k, _)| k == "token")
                    .map(|(_, v)| v.into_owned())
                    .filter(|t| !t.is_empty())
            })
        })
    }

    pub fn authenticate(
        &self,
        headers: &http::HeaderMap,
        query: Option<&str>,
    ) -> Result<AuthUser, AuthError> {
        let token = Self::extract_token(headers, query).ok_or(AuthError::MissingToken)?;
        self.verify(&token)
    }
}

#[cfg(test)]
pub(crate) fn sign_for_tests(secret: &str, user_id: &str, ttl_secs: i64) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};
    let claims = Claims {
        id: Some(user_id.to_string()),
        sub: None,
        exp: chrono::Utc::now().timestamp() + ttl_secs,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("sign test token")
}
