use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::Clock;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const TYP_ACCESS: &str = "access";
const TYP_REFRESH: &str = "refresh";

/// Claim names owned by the issuer; custom claims cannot override them.
const RESERVED_CLAIMS: [&str; 10] = [
    "sub", "sid", "exp", "iat", "iat_ms", "nbf", "iss", "aud", "jti", "typ",
];

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub issuer: String,
    pub audience: String,
    pub algorithm: Algorithm,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub signing_key: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AccessClaims {
    sub: String,
    exp: i64,
    iat: i64,
    iss: String,
    aud: String,
    jti: String,
    typ: String,
    #[serde(flatten)]
    extra: CustomClaims,
}

#[derive(Debug, Serialize, Deserialize)]
struct RefreshClaims {
    sub: String,
    sid: String,
    exp: i64,
    iat: i64,
    iat_ms: i64, // strictly increasing across rotations of a session
    iss: String,
    aud: String,
    jti: String,
    typ: String,
}

pub struct JwtTokenIssuer {
    cfg: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    clock: Arc<dyn Clock>,
}

impl JwtTokenIssuer {
    pub fn try_new(cfg: JwtConfig, clock: Arc<dyn Clock>) -> Result<Self, AuthError> {
        if cfg.signing_key.is_empty() {
            return Err(AuthError::Signing("signing key is empty".to_string()));
        }
        if !matches!(
            cfg.algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(AuthError::Signing(format!(
                "unsupported algorithm {:?}, expected an HMAC algorithm",
                cfg.algorithm
            )));
        }

        let mut validation = Validation::new(cfg.algorithm);
        // expiry is checked against the injected clock
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
        validation.set_audience(&[cfg.audience.clone()]);
        validation.set_issuer(&[cfg.issuer.clone()]);

        Ok(JwtTokenIssuer {
            encoding_key: EncodingKey::from_secret(&cfg.signing_key),
            decoding_key: DecodingKey::from_secret(&cfg.signing_key),
            validation,
            cfg,
            clock,
        })
    }

    #[inline]
    fn gen_jti() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    fn now_ms(&self) -> DateTime<Utc> {
        truncate_ms(self.clock.now())
    }

    fn encode<T: Serialize>(&self, claims: &T) -> Result<String, AuthError> {
        encode(&Header::new(self.cfg.algorithm), claims, &self.encoding_key)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }

    fn decode<T: for<'de> Deserialize<'de>>(&self, token: &str) -> Result<T, AuthError> {
        let data = decode::<T>(token, &self.decoding_key, &self.validation).map_err(|e| {
            debug!("token rejected: {}", e);
            AuthError::InvalidToken
        })?;
        Ok(data.claims)
    }

    fn check_live(&self, typ: &str, expected: &str, exp: i64) -> Result<(), AuthError> {
        if typ != expected {
            debug!("token rejected: typ {} where {} expected", typ, expected);
            return Err(AuthError::InvalidToken);
        }
        if exp <= self.clock.now().timestamp() {
            debug!("token rejected: expired");
            return Err(AuthError::InvalidToken);
        }
        Ok(())
    }

    fn access_claims(
        &self,
        subject_id: SubjectId,
        claims: &CustomClaims,
        now: DateTime<Utc>,
    ) -> (AccessClaims, DateTime<Utc>) {
        let exp_dt = now + self.cfg.access_ttl;
        let extra = claims
            .iter()
            .filter(|(k, _)| !RESERVED_CLAIMS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let claims = AccessClaims {
            sub: subject_id.to_string(),
            exp: exp_dt.timestamp(),
            iat: now.timestamp(),
            iss: self.cfg.issuer.clone(),
            aud: self.cfg.audience.clone(),
            jti: Self::gen_jti(),
            typ: TYP_ACCESS.to_string(),
            extra,
        };
        (claims, exp_dt)
    }
}

fn truncate_ms(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}

impl TokenIssuer for JwtTokenIssuer {
    fn issue(&self, request: IssueRequest<'_>) -> Result<IssuedPair, AuthError> {
        let now = self.now_ms();
        let refresh_iat = match request.not_before {
            Some(prev) if truncate_ms(prev) >= now => {
                truncate_ms(prev) + chrono::Duration::milliseconds(1)
            }
            _ => now,
        };

        let (access_claims, access_exp) = self.access_claims(request.subject_id, request.claims, now);
        let access_token = self.encode(&access_claims)?;

        let refresh_exp = refresh_iat + self.cfg.refresh_ttl;
        let refresh_claims = RefreshClaims {
            sub: request.subject_id.to_string(),
            sid: request.session_id.to_string(),
            exp: refresh_exp.timestamp(),
            iat: refresh_iat.timestamp(),
            iat_ms: refresh_iat.timestamp_millis(),
            iss: self.cfg.issuer.clone(),
            aud: self.cfg.audience.clone(),
            jti: Self::gen_jti(),
            typ: TYP_REFRESH.to_string(),
        };
        let refresh_token = self.encode(&refresh_claims)?;

        Ok(IssuedPair {
            pair: TokenPair {
                session_id: request.session_id,
                access_token: AccessToken(access_token),
                refresh_token: RefreshToken(refresh_token),
                access_token_expires_at: access_exp,
                refresh_token_expires_at: refresh_exp,
            },
            refresh_issued_at: refresh_iat,
        })
    }

    fn issue_access(
        &self,
        subject_id: SubjectId,
        claims: &CustomClaims,
    ) -> Result<AccessGrant, AuthError> {
        let (access_claims, access_exp) = self.access_claims(subject_id, claims, self.now_ms());
        Ok(AccessGrant {
            access_token: AccessToken(self.encode(&access_claims)?),
            access_token_expires_at: access_exp,
        })
    }

    fn verify_refresh(&self, token: &str) -> Result<VerifiedRefresh, AuthError> {
        let claims: RefreshClaims = self.decode(token)?;
        self.check_live(&claims.typ, TYP_REFRESH, claims.exp)?;

        let subject_id = claims
            .sub
            .parse::<SubjectId>()
            .map_err(|_| AuthError::InvalidToken)?;
        let session_id = claims
            .sid
            .parse::<SessionId>()
            .map_err(|_| AuthError::InvalidToken)?;
        let issued_at =
            DateTime::from_timestamp_millis(claims.iat_ms).ok_or(AuthError::InvalidToken)?;
        let expires_at = DateTime::from_timestamp(claims.exp, 0).ok_or(AuthError::InvalidToken)?;

        Ok(VerifiedRefresh {
            subject_id,
            session_id,
            issued_at,
            expires_at,
            jti: claims.jti,
        })
    }

    fn verify_access(&self, token: &str) -> Result<SubjectId, AuthError> {
        let claims: AccessClaims = self.decode(token)?;
        self.check_live(&claims.typ, TYP_ACCESS, claims.exp)?;
        claims
            .sub
            .parse::<SubjectId>()
            .map_err(|_| AuthError::InvalidToken)
    }
}
