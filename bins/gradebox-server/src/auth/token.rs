//! RS256 bearer tokens carrying the identity subject.
//!
//! Tokens are issued to browser-authenticated users so that headless clients
//! (notebooks) can authenticate without a cookie jar. Verification is
//! stateless: only the server's public key is needed.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::AuthError;

/// Claims embedded in every bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Identity subject (the user's email).
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    /// Build from a PEM-encoded RSA key pair.
    pub fn from_rsa_pem(private_pem: &[u8], public_pem: &[u8], ttl: Duration) -> Result<Self, AuthError> {
        let encoding = EncodingKey::from_rsa_pem(private_pem)
            .map_err(|e| AuthError::Signing(format!("invalid private key: {}", e)))?;
        let decoding = DecodingKey::from_rsa_pem(public_pem)
            .map_err(|e| AuthError::Signing(format!("invalid public key: {}", e)))?;
        Ok(Self {
            encoding,
            decoding,
            ttl,
        })
    }

    pub fn issue(&self, subject: &str) -> Result<String, AuthError> {
        let now = chrono::Utc::now().timestamp();
        let exp = i64::try_from(self.ttl.as_secs())
            .ok()
            .and_then(|ttl| now.checked_add(ttl))
            .ok_or_else(|| AuthError::Signing(format!("token lifetime {:?} is out of range", self.ttl)))?;
        let claims = TokenClaims {
            sub: subject.to_string(),
            iat: now,
            exp,
        };
        encode(&Header::new(Algorithm::RS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Verify the signature and expiry, returning the subject.
    pub fn verify(&self, token: &str) -> Result<String, AuthError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_required_spec_claims(&["sub", "exp"]);

        let data = decode::<TokenClaims>(token, &self.decoding, &validation).map_err(|e| {
            tracing::debug!(error = %e, "Bearer token rejected");
            AuthError::InvalidToken(e.to_string())
        })?;

        if data.claims.sub.is_empty() {
            return Err(AuthError::InvalidToken("token has an empty subject".into()));
        }
        Ok(data.claims.sub)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const PRIVATE_PEM: &[u8] = include_bytes!("../../tests/fixtures/jwt_private.pem");
    pub(crate) const PUBLIC_PEM: &[u8] = include_bytes!("../../tests/fixtures/jwt_public.pem");
    const OTHER_PRIVATE_PEM: &[u8] = include_bytes!("../../tests/fixtures/other_private.pem");

    pub(crate) fn issuer() -> TokenIssuer {
        TokenIssuer::from_rsa_pem(PRIVATE_PEM, PUBLIC_PEM, Duration::from_secs(3600)).unwrap()
    }

    #[test]
    fn test_issue_and_verify_round_trip() {
        let issuer = issuer();
        let token = issuer.issue("a@x.com").unwrap();

        // header.payload.signature
        assert_eq!(token.split('.').count(), 3);
        assert_eq!(issuer.verify(&token).unwrap(), "a@x.com");
    }

    #[test]
    fn test_unrepresentable_lifetime_is_an_error() {
        let issuer =
            TokenIssuer::from_rsa_pem(PRIVATE_PEM, PUBLIC_PEM, Duration::from_secs(u64::MAX))
                .unwrap();
        assert!(matches!(issuer.issue("a@x.com"), Err(AuthError::Signing(_))));
    }

    #[test]
    fn test_token_from_other_key_is_rejected() {
        let forger =
            TokenIssuer::from_rsa_pem(OTHER_PRIVATE_PEM, PUBLIC_PEM, Duration::from_secs(3600))
                .unwrap();
        let forged = forger.issue("a@x.com").unwrap();
        assert!(matches!(
            issuer().verify(&forged),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let now = chrono::Utc::now().timestamp();
        let claims = TokenClaims {
            sub: "a@x.com".into(),
            iat: now - 600,
            // well past the default 60 second leeway
            exp: now - 300,
        };
        let token = encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &EncodingKey::from_rsa_pem(PRIVATE_PEM).unwrap(),
        )
        .unwrap();
        assert!(issuer().verify(&token).is_err());
    }

    #[test]
    fn test_missing_subject_is_rejected() {
        #[derive(Serialize)]
        struct NoSubject {
            exp: i64,
        }
        let token = encode(
            &Header::new(Algorithm::RS256),
            &NoSubject {
                exp: chrono::Utc::now().timestamp() + 600,
            },
            &EncodingKey::from_rsa_pem(PRIVATE_PEM).unwrap(),
        )
        .unwrap();
        assert!(matches!(
            issuer().verify(&token),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(issuer().verify("not-a-token").is_err());
        assert!(issuer().verify("").is_err());
    }
}
