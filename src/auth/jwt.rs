use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

use crate::auth::claims::Claims;
use crate::auth::guard::CurrentUser;
use crate::config::JwtConfig;
use crate::error::{AppError, AppResult};
use crate::users::repo_types::User;

/// Identity a token is issued for.
#[derive(Debug, Clone, Copy)]
pub struct TokenSubject<'a> {
    pub id: i64,
    pub username: &'a str,
    pub email: &'a str,
}

impl<'a> From<&'a User> for TokenSubject<'a> {
    fn from(user: &'a User) -> Self {
        Self {
            id: user.id,
            username: &user.username,
            email: &user.email,
        }
    }
}

impl<'a> From<&'a CurrentUser> for TokenSubject<'a> {
    fn from(user: &'a CurrentUser) -> Self {
        Self {
            id: user.id,
            username: &user.username,
            email: &user.email,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

/// HS256 signing and verification keys plus the claims every token must carry.
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl JwtKeys {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            ttl: Duration::seconds(config.ttl_minutes.saturating_mul(60)),
        }
    }

    pub fn issue(&self, subject: TokenSubject<'_>) -> AppResult<IssuedToken> {
        self.issue_at(subject, OffsetDateTime::now_utc())
    }

    pub fn issue_at(&self, subject: TokenSubject<'_>, now: OffsetDateTime) -> AppResult<IssuedToken> {
        let expires_at = now
            .checked_add(self.ttl)
            .ok_or_else(|| anyhow::anyhow!("token expiry out of range for ttl {}", self.ttl))?;
        let claims = Claims {
            sub: subject.id.to_string(),
            username: subject.username.to_string(),
            email: subject.email.to_string(),
            iat: now.unix_timestamp().max(0) as usize,
            exp: expires_at.unix_timestamp().max(0) as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| anyhow::Error::new(e).context("signing jwt"))?;
        debug!(user_id = subject.id, "jwt signed");
        Ok(IssuedToken { token, expires_at })
    }

    pub fn verify(&self, token: &str) -> AppResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));

        match decode::<Claims>(token, &self.decoding, &validation) {
            Ok(data) => {
                debug!(user_id = %data.claims.sub, "jwt verified");
                Ok(data.claims)
            }
            Err(e) if matches!(e.kind(), ErrorKind::ExpiredSignature) => {
                debug!("jwt expired");
                Err(AppError::unauthorized("Token has expired"))
            }
            Err(e) => {
                warn!(error = %e, "jwt rejected");
                Err(AppError::unauthorized("Invalid token"))
            }
        }
    }
}
