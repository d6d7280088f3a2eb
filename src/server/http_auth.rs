use crate::infrastructure::{AuthError, Identity, TokenVerifier};
use axum::http::{header, header::HeaderMap};

pub(super) fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolve the calling user from the `Authorization` header.
pub(super) fn authenticate(
    headers: &HeaderMap,
    verifier: &TokenVerifier,
) -> Result<Identity, AuthError> {
    let token = extract_bearer_token(headers).ok_or(AuthError::MissingToken)?;
    verifier.verify(token)
}

pub(super) fn is_admin_authorized(headers: &HeaderMap, expected_token: &str) -> bool {
    !expected_token.is_empty() && extract_bearer_token(headers) == Some(expected_token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::AccessTokenClaims;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use uuid::Uuid;

    fn headers_with(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn extract_bearer_token_happy_path() {
        assert_eq!(extract_bearer_token(&headers_with("Bearer abc123")), Some("abc123"));
    }

    #[test]
    fn extract_bearer_token_rejects_missing_or_empty() {
        assert_eq!(extract_bearer_token(&HeaderMap::new()), None);
        assert_eq!(extract_bearer_token(&headers_with("Bearer ")), None);
    }

    #[test]
    fn extract_bearer_token_rejects_wrong_scheme() {
        assert_eq!(extract_bearer_token(&headers_with("Basic abc123")), None);
    }

    #[test]
    fn admin_requires_configured_token() {
        let headers = headers_with("Bearer admin-secret");
        assert!(is_admin_authorized(&headers, "admin-secret"));
        assert!(!is_admin_authorized(&headers, "other"));
        assert!(!is_admin_authorized(&headers, ""));
    }

    #[test]
    fn authenticate_missing_header_is_missing_token() {
        let verifier = TokenVerifier::new("secret", "");
        assert!(matches!(
            authenticate(&HeaderMap::new(), &verifier),
            Err(AuthError::MissingToken)
        ));
    }

    #[test]
    fn authenticate_resolves_user() {
        let user_id = Uuid::new_v4();
        let claims = AccessTokenClaims {
            sub: user_id.to_string(),
            email: None,
            aud: None,
            exp: (chrono::Utc::now().timestamp() + 600) as usize,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"secret")).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );

        let verifier = TokenVerifier::new("secret", "");
        let identity = authenticate(&headers, &verifier).unwrap();
        assert_eq!(identity.user_id, user_id);
        assert!(matches!(identity.require_email(), Err(AuthError::MissingEmail)));
    }
}
