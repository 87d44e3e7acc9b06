//! Authenticated caller claims

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::result::{Error, Result};
use super::user::UserId;
use super::wallet::WalletId;

/// Typed claims produced once at authentication and passed by value into
/// wallet operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: UserId,
    pub wallet_id: WalletId,
    pub email: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Claims {
    pub fn new(
        user_id: UserId,
        wallet_id: WalletId,
        email: impl Into<String>,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            user_id,
            wallet_id,
            email: email.into(),
            issued_at,
            expires_at: issued_at + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Wallet the caller acts on, if the claims are still valid
    pub fn acting_wallet(&self, now: DateTime<Utc>) -> Result<WalletId> {
        if self.is_expired(now) {
            return Err(Error::Unauthorized(format!(
                "claims expired at {}",
                self.expires_at.to_rfc3339()
            )));
        }
        Ok(self.wallet_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_expiry() {
        let issued = Utc::now();
        let claims = Claims::new(
            UserId::new(1),
            WalletId::new(5),
            "alice@example.com",
            issued,
            Duration::minutes(10),
        );

        assert_eq!(claims.acting_wallet(issued).unwrap(), WalletId::new(5));
        assert_eq!(
            claims.acting_wallet(issued + Duration::minutes(9)).unwrap(),
            WalletId::new(5)
        );
        assert!(matches!(
            claims.acting_wallet(issued + Duration::minutes(10)),
            Err(Error::Unauthorized(_))
        ));
    }
}
