//! HS256 JSON Web Tokens carrying identity, organisation and role claims.

use crate::auth::Principal;
use crate::error::AppError;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// A token expiring within this many seconds is reissued by [`JwtService::refresh`].
pub const REFRESH_WINDOW_SECS: i64 = 30 * 60;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: Option<i64>,
    pub username: String,
    #[serde(rename = "orgId")]
    pub org_id: Option<i64>,
    #[serde(default)]
    pub roles: Vec<String>,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn principal(&self) -> Principal {
        Principal {
            user_id: self.user_id,
            username: self.username.clone(),
            org_id: self.org_id,
            roles: self.roles.clone(),
        }
    }
}

#[derive(Clone)]
pub struct JwtService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl_secs: i64,
}

impl JwtService {
    pub fn new(secret: &str, ttl_secs: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        JwtService {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl_secs,
        }
    }

    pub fn issue(&self, principal: &Principal) -> Result<String, AppError> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            user_id: principal.user_id,
            username: principal.username.clone(),
            org_id: principal.org_id,
            roles: principal.roles.clone(),
            iat: now,
            exp: now + self.ttl_secs,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("token signing: {}", e)))
    }

    /// Verifies signature and expiry. Accepts an optional `Bearer ` prefix.
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let token = strip_bearer(token);
        if token.is_empty() {
            return Err(AppError::Unauthenticated("missing token".into()));
        }
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "token rejected");
                AppError::Unauthenticated("invalid or expired token".into())
            })
    }

    /// New token for the same identity when the current one expires within
    /// [`REFRESH_WINDOW_SECS`]; otherwise the current token unchanged.
    pub fn refresh(&self, token: &str) -> Result<String, AppError> {
        let claims = self.verify(token)?;
        let remaining = claims.exp - chrono::Utc::now().timestamp();
        if remaining < REFRESH_WINDOW_SECS {
            self.issue(&claims.principal())
        } else {
            Ok(strip_bearer(token).to_string())
        }
    }
}

fn strip_bearer(token: &str) -> &str {
    let token = token.trim();
    token
        .strip_prefix("Bearer ")
        .or_else(|| token.strip_prefix("bearer "))
        .unwrap_or(token)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal() -> Principal {
        Principal {
            user_id: Some(7),
            username: "alice".into(),
            org_id: Some(3),
            roles: vec!["admin".into()],
        }
    }

    #[test]
    fn issued_token_round_trips_claims() {
        let svc = JwtService::new("test-secret", 3600);
        let token = svc.issue(&principal()).unwrap();
        let claims = svc.verify(&format!("Bearer {}", token)).unwrap();
        assert_eq!(claims.principal(), principal());
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn wrong_secret_and_expired_are_unauthenticated() {
        let token = JwtService::new("a", 3600).issue(&principal()).unwrap();
        assert!(matches!(
            JwtService::new("b", 3600).verify(&token),
            Err(AppError::Unauthenticated(_))
        ));
        let expired = JwtService::new("a", -10).issue(&principal()).unwrap();
        assert!(matches!(
            JwtService::new("a", 3600).verify(&expired),
            Err(AppError::Unauthenticated(_))
        ));
    }

    #[test]
    fn refresh_only_near_expiry() {
        let long = JwtService::new("s", 7200);
        let token = long.issue(&principal()).unwrap();
        assert_eq!(long.refresh(&token).unwrap(), token);

        let short = JwtService::new("s", 60);
        let token = short.issue(&principal()).unwrap();
        let renewed = long.refresh(&token).unwrap();
        let claims = long.verify(&renewed).unwrap();
        assert!(claims.exp - claims.iat == 7200);
    }
}
