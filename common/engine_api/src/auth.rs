use jsonwebtoken::{
    decode, encode, get_current_timestamp, Algorithm, DecodingKey, EncodingKey, Header,
    Validation,
};
use serde::{Deserialize, Serialize};

const DEFAULT_ALGORITHM: Algorithm = Algorithm::HS256;

/// Tokens whose `iat` is further than this from the local clock are rejected.
pub const IAT_TOLERANCE_SECS: u64 = 60;

/// Shared secret every hive client container is started with.
pub const HIVE_JWT_SECRET: &[u8; 32] = b"secretsecretsecretsecretsecretse";

#[derive(Debug)]
pub enum Error {
    FromHexError(hex::FromHexError),
    JWTError(jsonwebtoken::errors::Error),
    InvalidToken,
    StaleToken { iat: u64, now: u64 },
}

impl From<hex::FromHexError> for Error {
    fn from(e: hex::FromHexError) -> Self {
        Error::FromHexError(e)
    }
}

impl From<jsonwebtoken::errors::Error> for Error {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        Error::JWTError(e)
    }
}

#[derive(Clone)]
pub struct Auth {
    secret: Vec<u8>,
    id: Option<String>,
    clv: Option<String>,
}

impl Auth {
    pub fn new(secret: &[u8], id: Option<String>, clv: Option<String>) -> Self {
        Self {
            secret: secret.to_vec(),
            id,
            clv,
        }
    }

    pub fn from_hex(secret: &str, id: Option<String>, clv: Option<String>) -> Result<Self, Error> {
        let secret = hex::decode(secret.trim_start_matches("0x"))?;
        Ok(Self::new(&secret, id, clv))
    }

    pub fn secret(&self) -> &[u8] {
        &self.secret
    }

    /// Generate a JWT token with iat set to current time.
    pub fn generate_token(&self) -> Result<String, Error> {
        self.generate_token_with_iat(get_current_timestamp())
    }

    pub fn generate_token_with_iat(&self, iat: u64) -> Result<String, Error> {
        let header = Header::new(DEFAULT_ALGORITHM);
        let claims = Claims {
            iat,
            id: self.id.clone(),
            clv: self.clv.clone(),
        };
        Ok(encode(&header, &claims, &EncodingKey::from_secret(&self.secret))?)
    }

    /// Checks the signature and freshness of a bearer token.
    pub fn validate_token(&self, token: &str) -> Result<(), Error> {
        let mut validation = Validation::new(DEFAULT_ALGORITHM);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let claims = decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &validation)?
            .claims;
        let now = get_current_timestamp();
        if claims.iat.abs_diff(now) > IAT_TOLERANCE_SECS {
            return Err(Error::StaleToken {
                iat: claims.iat,
                now,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auth").field("id", &self.id).finish()
    }
}

/// Claims struct as defined in https://github.com/ethereum/execution-apis/blob/main/src/engine/authentication.md#jwt-claims
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// issued-at claim. Represented as seconds passed since UNIX_EPOCH.
    iat: u64,
    /// Optional unique identifier for the CL node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    /// Optional client version for the CL node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    clv: Option<String>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn token_round_trip() {
        let auth = Auth::new(HIVE_JWT_SECRET, None, None);
        let token = auth.generate_token().unwrap();
        auth.validate_token(&token).unwrap();
    }

    #[test]
    fn wrong_secret_rejected() {
        let token = Auth::new(HIVE_JWT_SECRET, None, None)
            .generate_token()
            .unwrap();
        let other = Auth::from_hex(&"ab".repeat(32), None, None).unwrap();
        assert!(other.validate_token(&token).is_err());
    }

    #[test]
    fn stale_token_rejected() {
        let auth = Auth::new(HIVE_JWT_SECRET, Some("clmock".into()), None);
        let token = auth
            .generate_token_with_iat(get_current_timestamp() - 2 * IAT_TOLERANCE_SECS)
            .unwrap();
        assert!(matches!(
            auth.validate_token(&token),
            Err(Error::StaleToken { .. })
        ));
    }
}
