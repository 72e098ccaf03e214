use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use {
    argon2::{
        Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
        password_hash::{SaltString, rand_core::OsRng},
    },
    tracing::{debug, info},
};

use crate::Identity;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("User already exists")]
    AlreadyExists,
    #[error("User not found")]
    NotFound,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Invalid password: {0}")]
    Hash(String),
    /// The stored hash could not be parsed.
    #[error("Authentication system error")]
    Corrupt,
}

struct StoredUser {
    password_hash: String,
    identity: Identity,
}

/// In-memory account table: login → (argon2 hash, identity).
///
/// Cloning is cheap and shares the table.
#[derive(Clone)]
pub struct UserStore {
    users: Arc<Mutex<HashMap<String, StoredUser>>>,
    params: Params,
}

impl Default for UserStore {
    fn default() -> Self {
        Self::new()
    }
}

impl UserStore {
    pub fn new() -> Self {
        Self::with_params(Params::default())
    }

    /// Use custom argon2 cost parameters (tests use the cheapest valid ones).
    pub fn with_params(params: Params) -> Self {
        Self {
            users: Arc::new(Mutex::new(HashMap::new())),
            params,
        }
    }

    fn hasher(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    fn users(&self) -> MutexGuard<'_, HashMap<String, StoredUser>> {
        self.users.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.users().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users().is_empty()
    }

    /// Create an account. The display name is the login.
    pub fn create_user(&self, login: &str, password: &str) -> Result<Identity, StoreError> {
        if self.users().contains_key(login) {
            debug!(login, "user already exists");
            return Err(StoreError::AlreadyExists);
        }

        // Hash outside the lock; argon2 is deliberately slow.
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = self
            .hasher()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| StoreError::Hash(e.to_string()))?
            .to_string();

        let identity = Identity::new(uuid::Uuid::new_v4().to_string(), login);
        let mut users = self.users();
        if users.contains_key(login) {
            return Err(StoreError::AlreadyExists);
        }
        users.insert(login.to_string(), StoredUser {
            password_hash,
            identity: identity.clone(),
        });
        info!(login, user_id = %identity.id, total = users.len(), "user created");
        Ok(identity)
    }

    pub fn authenticate_user(&self, login: &str, password: &str) -> Result<Identity, StoreError> {
        let (password_hash, identity) = {
            let users = self.users();
            let user = users.get(login).ok_or_else(|| {
                debug!(login, "user not found");
                StoreError::NotFound
            })?;
            (user.password_hash.clone(), user.identity.clone())
        };

        let parsed = PasswordHash::new(&password_hash).map_err(|_| StoreError::Corrupt)?;
        match self.hasher().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => {
                debug!(login, "authentication successful");
                Ok(identity)
            },
            Err(password_hash::Error::Password) => {
                debug!(login, "invalid password");
                Err(StoreError::InvalidCredentials)
            },
            Err(_) => Err(StoreError::Corrupt),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) fn cheap_params() -> Params {
    Params::new(Params::MIN_M_COST, Params::MIN_T_COST, Params::MIN_P_COST, None).unwrap()
}
