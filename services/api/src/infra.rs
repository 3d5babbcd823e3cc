use metrics_exporter_prometheus::PrometheusHandle;
use sejour::workflows::demande::{
    Demande, DemandeId, DemandeRepository, RepositoryError, User, UserRepository,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

fn lock<'a, T>(mutex: &'a Mutex<T>, store: &str) -> Result<MutexGuard<'a, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable(format!("{store} store lock poisoned")))
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryDemandeRepository {
    records: Arc<Mutex<BTreeMap<DemandeId, Demande>>>,
}

impl DemandeRepository for InMemoryDemandeRepository {
    fn get(&self, id: &DemandeId) -> Result<Option<Demande>, RepositoryError> {
        let guard = lock(&self.records, "demande")?;
        Ok(guard.get(id).cloned())
    }

    fn save(&self, demande: Demande) -> Result<Demande, RepositoryError> {
        let mut guard = lock(&self.records, "demande")?;
        guard.insert(demande.id.clone(), demande.clone());
        Ok(demande)
    }

    fn find(&self, predicate: &dyn Fn(&Demande) -> bool) -> Result<Vec<Demande>, RepositoryError> {
        let guard = lock(&self.records, "demande")?;
        Ok(guard
            .values()
            .filter(|demande| predicate(demande))
            .cloned()
            .collect())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryUserRepository {
    records: Arc<Mutex<HashMap<String, User>>>,
}

impl InMemoryUserRepository {
    /// Store pre-populated with one empty account per email.
    pub(crate) fn with_users<I, S>(emails: I) -> Result<Self, RepositoryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let repository = Self::default();
        for email in emails {
            repository.save(User::new(email))?;
        }
        Ok(repository)
    }
}

impl UserRepository for InMemoryUserRepository {
    fn get(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let guard = lock(&self.records, "user")?;
        Ok(guard.get(&email.to_ascii_lowercase()).cloned())
    }

    fn save(&self, user: User) -> Result<User, RepositoryError> {
        let mut guard = lock(&self.records, "user")?;
        guard.insert(user.email.to_ascii_lowercase(), user.clone());
        Ok(user)
    }
}
