use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("No authorization token provided")]
    MissingToken,
    #[error("Invalid access token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    #[error("Token subject is not a user id: {0}")]
    InvalidSubject(String),
    #[error("Token carries no email address")]
    MissingEmail,
}

/// The caller behind a verified access token.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: Option<String>,
}

impl Identity {
    pub fn require_email(&self) -> Result<&str, AuthError> {
        self.email
            .as_deref()
            .filter(|e| !e.is_empty())
            .ok_or(AuthError::MissingEmail)
    }
}

/// Claims of an identity-provider access token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AccessTokenClaims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    pub exp: usize,
}

/// Verifies HS256 access tokens signed with the identity provider's secret.
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    /// An empty `audience` skips the audience check.
    pub fn new(secret: &str, audience: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        if audience.is_empty() {
            validation.validate_aud = false;
        } else {
            validation.set_audience(&[audience]);
        }

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let data = decode::<AccessTokenClaims>(token, &self.key, &self.validation)?;
        let user_id = Uuid::parse_str(&data.claims.sub)
            .map_err(|_| AuthError::InvalidSubject(data.claims.sub.clone()))?;

        Ok(Identity {
            user_id,
            email: data.claims.email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";

    fn token(sub: &str, aud: Option<&str>, exp_offset: i64, secret: &str) -> String {
        let claims = AccessTokenClaims {
            sub: sub.to_string(),
            email: Some("user@example.com".to_string()),
            aud: aud.map(str::to_string),
            exp: (chrono::Utc::now().timestamp() + exp_offset) as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn valid_token_yields_identity() {
        let user_id = Uuid::new_v4();
        let verifier = TokenVerifier::new(SECRET, "authenticated");
        let identity = verifier
            .verify(&token(&user_id.to_string(), Some("authenticated"), 3600, SECRET))
            .unwrap();

        assert_eq!(identity.user_id, user_id);
        assert_eq!(identity.require_email().unwrap(), "user@example.com");
    }

    #[test]
    fn rejects_wrong_secret() {
        let verifier = TokenVerifier::new(SECRET, "authenticated");
        let t = token(&Uuid::new_v4().to_string(), Some("authenticated"), 3600, "other");
        assert!(matches!(verifier.verify(&t), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn rejects_expired_token() {
        let verifier = TokenVerifier::new(SECRET, "authenticated");
        let t = token(&Uuid::new_v4().to_string(), Some("authenticated"), -3600, SECRET);
        assert!(matches!(verifier.verify(&t), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn rejects_wrong_audience() {
        let verifier = TokenVerifier::new(SECRET, "authenticated");
        let t = token(&Uuid::new_v4().to_string(), Some("anon"), 3600, SECRET);
        assert!(matches!(verifier.verify(&t), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn empty_audience_skips_audience_check() {
        let verifier = TokenVerifier::new(SECRET, "");
        let t = token(&Uuid::new_v4().to_string(), Some("anon"), 3600, SECRET);
        assert!(verifier.verify(&t).is_ok());
    }

    #[test]
    fn rejects_non_uuid_subject() {
        let verifier = TokenVerifier::new(SECRET, "authenticated");
        let t = token("service-role", Some("authenticated"), 3600, SECRET);
        assert!(matches!(
            verifier.verify(&t),
            Err(AuthError::InvalidSubject(_))
        ));
    }
}
