use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};
use crate::models::Identity;

/// Claims handed to the minter for one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub id: u64,
    pub email: String,
    pub nickname: String,
}

impl IdentityClaims {
    pub fn for_index(id: u64) -> Self {
        IdentityClaims {
            id,
            email: format!("test{}@test.com", id),
            nickname: format!("PerfUser{}", id),
        }
    }
}

/// `mint(identity) -> token`.
pub trait TokenMinter: Send + Sync {
    fn mint(&self, claims: &IdentityClaims) -> Result<String>;
}

#[derive(Debug, Serialize, Deserialize)]
struct JwtBody {
    id: u64,
    email: String,
    nickname: String,
    iat: i64,
    exp: i64,
}

/// HS256 signer keyed by the base64-decoded secret, which is how the
/// ticketing backend derives its verification key.
pub struct JwtMinter {
    key: EncodingKey,
    ttl_secs: i64,
}

impl JwtMinter {
    pub const DEFAULT_TTL_SECS: i64 = 3600;

    pub fn new(secret: &str, ttl_secs: i64) -> Result<Self> {
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(HarnessError::config("JWT secret is required"));
        }
        let raw = BASE64
            .decode(secret)
            .map_err(|e| HarnessError::config(format!("JWT secret is not valid base64: {}", e)))?;
        Ok(JwtMinter {
            key: EncodingKey::from_secret(&raw),
            ttl_secs,
        })
    }
}

impl TokenMinter for JwtMinter {
    fn mint(&self, claims: &IdentityClaims) -> Result<String> {
        let now = Utc::now().timestamp();
        let body = JwtBody {
            id: claims.id,
            email: claims.email.clone(),
            nickname: claims.nickname.clone(),
            iat: now,
            exp: now + self.ttl_secs,
        };
        encode(&Header::new(Algorithm::HS256), &body, &self.key)
            .map_err(|e| HarnessError::Credential(format!("identity {}: {}", claims.id, e)))
    }
}

/// Read-only after `build`; shared by every VU of the run.
#[derive(Debug)]
pub struct IdentityPool {
    identities: Vec<Identity>,
}

impl IdentityPool {
    pub fn build(pool_size: usize, secret: Option<&str>) -> Result<Self> {
        let secret = secret
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| HarnessError::config("JWT_SECRET is required"))?;
        let minter = JwtMinter::new(secret, JwtMinter::DEFAULT_TTL_SECS)?;
        Self::build_with(pool_size, &minter)
    }

    pub fn build_with(pool_size: usize, minter: &dyn TokenMinter) -> Result<Self> {
        if pool_size == 0 {
            return Err(HarnessError::config("identity pool size must be at least 1"));
        }

        let identities = (1..=pool_size as u64)
            .map(|id| {
                let claims = IdentityClaims::for_index(id);
                let credential = minter.mint(&claims)?;
                Ok(Identity {
                    id,
                    email: claims.email,
                    display_name: claims.nickname,
                    credential,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(IdentityPool { identities })
    }

    /// Identity for a 1-based VU index; VUs past the pool size cycle back.
    pub fn for_vu(&self, vu_index: u64) -> &Identity {
        let slot = (vu_index.saturating_sub(1) % self.identities.len() as u64) as usize;
        &self.identities[slot]
    }
}
