use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{db::UserId, error::ChatError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
    token_type: TokenType,
}

#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Issues and verifies the bearer tokens every entry point authenticates with.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_ttl: time::Duration,
    refresh_ttl: time::Duration,
}

impl TokenKeys {
    pub fn new(secret: &str, access_ttl: time::Duration, refresh_ttl: time::Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn issue(&self, user_id: UserId, token_type: TokenType) -> Result<String, ChatError> {
        let ttl = match token_type {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        };
        self.issue_with_ttl(user_id, token_type, ttl)
    }

    fn issue_with_ttl(
        &self,
        user_id: UserId,
        token_type: TokenType,
        ttl: time::Duration,
    ) -> Result<String, ChatError> {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.unix_timestamp(),
            exp: (now + ttl).unix_timestamp(),
            token_type,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| {
            tracing::error!(error = %e, "failed to sign token");
            ChatError::Authentication
        })
    }

    pub fn issue_pair(&self, user_id: UserId) -> Result<TokenPair, ChatError> {
        Ok(TokenPair {
            access_token: self.issue(user_id, TokenType::Access)?,
            refresh_token: self.issue(user_id, TokenType::Refresh)?,
        })
    }

    /// Resolves a token to the user it was issued for. Missing, malformed,
    /// expired and wrong-type tokens are all `ChatError::Authentication`.
    pub fn verify(&self, token: Option<&str>, expected: TokenType) -> Result<UserId, ChatError> {
        let token = token.map(str::trim).filter(|t| !t.is_empty()).ok_or(ChatError::Authentication)?;

        let claims = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "rejected token");
                ChatError::Authentication
            })?
            .claims;

        if claims.token_type != expected {
            return Err(ChatError::Authentication);
        }
        claims.sub.parse().map_err(|_| ChatError::Authentication)
    }

    pub fn verify_access(&self, token: Option<&str>) -> Result<UserId, ChatError> {
        self.verify(token, TokenType::Access)
    }
}
