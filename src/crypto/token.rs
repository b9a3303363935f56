use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};

use crate::{
    access::{CredentialError, CredentialVerifier, Principal},
    error::{AppError, Result},
};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: i32,
    pub exp: usize, // expiry
    pub iat: usize, // issued at
}

/// Issues and verifies HS256 bearer tokens.
#[derive(Clone)]
pub struct JwtVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    expiry_hours: u64,
}

impl JwtVerifier {
    pub fn new(secret: &str, expiry_hours: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
            expiry_hours,
        }
    }

    pub fn expires_in_secs(&self) -> i64 {
        (self.expiry_hours * 3600) as i64
    }

    pub fn issue(&self, user_id: i32) -> Result<String> {
        let now = Utc::now();
        let expiration = now
            .checked_add_signed(Duration::hours(self.expiry_hours as i64))
            .ok_or_else(|| AppError::Internal("Token expiry overflow".to_string()))?;

        let claims = Claims {
            user_id,
            exp: expiration.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("Failed to generate token: {}", e)))
    }
}

impl CredentialVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> std::result::Result<Principal, CredentialError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            let reason = match e.kind() {
                ErrorKind::ExpiredSignature => "token expired".to_string(),
                ErrorKind::InvalidSignature => "signature mismatch".to_string(),
                other => format!("{:?}", other),
            };
            CredentialError::Invalid(reason)
        })?;

        Ok(Principal {
            user_id: data.claims.user_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies_to_same_user() {
        let verifier = JwtVerifier::new("test_secret_with_enough_length", 24);
        let token = verifier.issue(42).unwrap();
        let principal = verifier.verify(&token).unwrap();
        assert_eq!(principal.user_id, 42);
        assert_eq!(verifier.expires_in_secs(), 86_400);
    }

    #[test]
    fn token_signed_with_other_secret_is_invalid() {
        let issuer = JwtVerifier::new("first_secret_value_0001", 24);
        let verifier = JwtVerifier::new("second_secret_value_002", 24);
        let token = issuer.issue(1).unwrap();
        assert!(matches!(
            verifier.verify(&token),
            Err(CredentialError::Invalid(_))
        ));
    }

    #[test]
    fn expired_token_is_invalid() {
        let verifier = JwtVerifier::new("test_secret_with_enough_length", 24);
        let past = (Utc::now() - Duration::hours(2)).timestamp() as usize;
        let claims = Claims {
            user_id: 5,
            exp: past,
            iat: past - 60,
        };
        let token = encode(&Header::default(), &claims, &verifier.encoding).unwrap();
        match verifier.verify(&token) {
            Err(CredentialError::Invalid(reason)) => assert_eq!(reason, "token expired"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn garbage_is_invalid() {
        let verifier = JwtVerifier::new("test_secret_with_enough_length", 24);
        assert!(matches!(
            verifier.verify("not-a-jwt"),
            Err(CredentialError::Invalid(_))
        ));
    }
}
