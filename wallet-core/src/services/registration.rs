//! Registration service - users, their wallets and typed claims
//!
//! A user and its wallet are inserted in one store scope. Passwords are
//! stored as Argon2id PHC strings.

use std::sync::Arc;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Duration;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info};

use crate::domain::result::{Error, Result};
use crate::domain::{Claims, NewUser, User, Wallet, MIN_PASSWORD_LEN};
use crate::ports::LedgerStore;

/// A freshly registered user and the wallet created with it
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub user: User,
    pub wallet: Wallet,
}

/// Wallet details as seen by its authenticated owner
#[derive(Debug, Clone, Serialize)]
pub struct WalletDetails {
    pub wallet: Wallet,
    pub owner: User,
}

fn argon2() -> Argon2<'static> {
    Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2::Params::default(),
    )
}

fn hash_password(password: &str) -> Result<String> {
    let salt: [u8; 16] = rand::thread_rng().gen();
    let salt = SaltString::encode_b64(&salt)
        .map_err(|e| Error::PasswordHashing(format!("failed to encode salt: {}", e)))?;
    let hash = argon2()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| Error::PasswordHashing(e.to_string()))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => argon2().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(_) => false,
    }
}

/// Registration and authentication
pub struct RegistrationService {
    store: Arc<dyn LedgerStore>,
    claims_ttl: Duration,
}

impl RegistrationService {
    pub fn new(store: Arc<dyn LedgerStore>, claims_ttl: Duration) -> Self {
        Self { store, claims_ttl }
    }

    /// Create a user and its zero-balance wallet; both rows or neither
    pub fn register(&self, name: &str, email: &str, password: &str) -> Result<Registration> {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(Error::validation(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let mut new_user = NewUser {
            name: name.trim().to_string(),
            email: NewUser::normalize_email(email),
            password_hash: String::new(),
        };
        new_user.validate_profile().map_err(Error::validation)?;

        if self.store.find_user_by_email(&new_user.email)?.is_some() {
            return Err(Error::DuplicateEmail(new_user.email));
        }

        new_user.password_hash = hash_password(password)?;

        let registration = match self.insert(&new_user) {
            // a concurrent registration won the race past the check above
            Err(Error::Persistence(msg)) if self.store.find_user_by_email(&new_user.email)?.is_some() => {
                debug!(error = %msg, "registration lost a race for its email");
                return Err(Error::DuplicateEmail(new_user.email));
            }
            other => other?,
        };

        info!(
            user_id = %registration.user.id,
            wallet_id = %registration.wallet.id,
            "user registered"
        );
        Ok(registration)
    }

    fn insert(&self, new_user: &NewUser) -> Result<Registration> {
        let mut scope = self.store.begin()?;
        let user = scope.insert_user(new_user)?;
        let wallet = scope.insert_wallet(user.id)?;
        scope.commit()?;
        Ok(Registration { user, wallet })
    }

    /// Verify credentials and issue claims for the user's wallet
    ///
    /// Unknown email and wrong password fail the same way.
    pub fn authenticate(&self, email: &str, password: &str) -> Result<Claims> {
        let email = NewUser::normalize_email(email);
        let user = self
            .store
            .find_user_by_email(&email)?
            .ok_or(Error::AuthenticationFailed)?;

        if !verify_password(password, &user.password_hash) {
            return Err(Error::AuthenticationFailed);
        }

        let wallet = self
            .store
            .find_wallet_by_owner(user.id)?
            .ok_or_else(|| Error::persistence(format!("user {} has no wallet", user.id)))?;

        Ok(Claims::new(
            user.id,
            wallet.id,
            user.email,
            crate::now(),
            self.claims_ttl,
        ))
    }

    /// The acting wallet and its owner
    pub fn wallet_details(&self, claims: &Claims) -> Result<WalletDetails> {
        let wallet_id = claims.acting_wallet(crate::now())?;
        let wallet = self
            .store
            .find_wallet(wallet_id)?
            .ok_or(Error::WalletNotFound(wallet_id))?;
        let owner = self
            .store
            .find_user(claims.user_id)?
            .ok_or(Error::UserNotFound(claims.user_id))?;

        if wallet.owner_id != owner.id {
            return Err(Error::Unauthorized(format!(
                "wallet {} does not belong to user {}",
                wallet.id, owner.id
            )));
        }
        Ok(WalletDetails { wallet, owner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::duckdb::DuckDbStore;
    use crate::domain::{Amount, UserId};

    fn setup() -> (Arc<DuckDbStore>, RegistrationService) {
        let store = Arc::new(DuckDbStore::open_in_memory().unwrap());
        let service = RegistrationService::new(store.clone(), Duration::minutes(10));
        (store, service)
    }

    #[test]
    fn test_register_creates_user_and_wallet() {
        let (store, service) = setup();

        let reg = service
            .register(" Alice ", "Alice@Example.com", "correct horse")
            .unwrap();
        assert_eq!(reg.user.name, "Alice");
        assert_eq!(reg.user.email, "alice@example.com");
        assert_eq!(reg.wallet.owner_id, reg.user.id);
        assert_eq!(reg.wallet.balance, Amount::ZERO);
        assert!(reg.user.password_hash.starts_with("$argon2id$"));

        let stored = store.find_wallet_by_owner(reg.user.id).unwrap().unwrap();
        assert_eq!(stored.id, reg.wallet.id);
    }

    #[test]
    fn test_duplicate_email_leaves_no_rows() {
        let (store, service) = setup();
        service.register("Alice", "alice@example.com", "password1").unwrap();

        let err = service
            .register("Other", "ALICE@example.com", "password2")
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateEmail(_)));
        assert!(store.find_user(UserId::new(2)).unwrap().is_none());
        assert_eq!(store.totals().unwrap().wallets, 1);
    }

    #[test]
    fn test_registration_input_validation() {
        let (_store, service) = setup();
        assert!(matches!(
            service.register("Bob", "bob@example.com", "short"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            service.register("", "bob@example.com", "long enough"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            service.register("Bob", "not-an-email", "long enough"),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_invalid_profile_rejected_before_email_lookup() {
        let (_store, service) = setup();
        service.register("Alice", "alice@example.com", "password1").unwrap();

        let err = service
            .register("   ", "alice@example.com", "password2")
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_hashing_failure_is_not_retryable() {
        let err = Error::PasswordHashing("salt".to_string());
        assert_eq!(err.kind(), "password_hash_failed");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_authenticate() {
        let (_store, service) = setup();
        let reg = service.register("Alice", "alice@example.com", "password1").unwrap();

        let claims = service.authenticate("ALICE@example.com", "password1").unwrap();
        assert_eq!(claims.user_id, reg.user.id);
        assert_eq!(claims.wallet_id, reg.wallet.id);
        assert_eq!(claims.expires_at - claims.issued_at, Duration::minutes(10));

        assert!(matches!(
            service.authenticate("alice@example.com", "wrong-password"),
            Err(Error::AuthenticationFailed)
        ));
        assert!(matches!(
            service.authenticate("nobody@example.com", "password1"),
            Err(Error::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_wallet_details_requires_live_claims() {
        let (store, service) = setup();
        let reg = service.register("Alice", "alice@example.com", "password1").unwrap();
        let claims = service.authenticate("alice@example.com", "password1").unwrap();

        let details = service.wallet_details(&claims).unwrap();
        assert_eq!(details.wallet.id, reg.wallet.id);
        assert_eq!(details.owner.email, "alice@example.com");

        let expired = RegistrationService::new(store, Duration::zero())
            .authenticate("alice@example.com", "password1")
            .unwrap();
        assert!(matches!(
            service.wallet_details(&expired),
            Err(Error::Unauthorized(_))
        ));
    }
}
