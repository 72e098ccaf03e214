use {async_trait::async_trait, tracing::warn};

use crate::{AuthError, AuthGateway, AuthOutcome, Identity, StoreError, UserStore};

/// [`AuthGateway`] backed by an in-process [`UserStore`].
///
/// Hashing runs on the blocking pool so it never stalls a connection task.
#[derive(Clone, Default)]
pub struct LocalAuthGateway {
    store: UserStore,
}

impl LocalAuthGateway {
    pub fn new(store: UserStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &UserStore {
        &self.store
    }

    async fn run<F>(&self, op: F) -> Result<AuthOutcome, AuthError>
    where
        F: FnOnce(&UserStore) -> Result<Identity, StoreError> + Send + 'static,
    {
        let store = self.store.clone();
        let result = tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| {
                warn!(error = %e, "identity store task failed");
                AuthError::Unavailable(e.to_string())
            })?;
        Ok(match result {
            Ok(identity) => AuthOutcome::Granted(identity),
            Err(e) => AuthOutcome::Rejected(e.to_string()),
        })
    }
}

#[async_trait]
impl AuthGateway for LocalAuthGateway {
    async fn login(&self, login: &str, password: &str) -> Result<AuthOutcome, AuthError> {
        let (login, password) = (login.to_string(), password.to_string());
        self.run(move |store| store.authenticate_user(&login, &password))
            .await
    }

    async fn create(&self, login: &str, password: &str) -> Result<AuthOutcome, AuthError> {
        let (login, password) = (login.to_string(), password.to_string());
        self.run(move |store| store.create_user(&login, &password))
            .await
    }
}
