use super::domain::{Demande, DemandeId, User};

/// Record store for demandes. Writes to the same id are expected to be serialized by the store.
pub trait DemandeRepository: Send + Sync {
    fn get(&self, id: &DemandeId) -> Result<Option<Demande>, RepositoryError>;
    /// Insert or replace the record keyed by `demande.id`.
    fn save(&self, demande: Demande) -> Result<Demande, RepositoryError>;
    fn find(&self, predicate: &dyn Fn(&Demande) -> bool) -> Result<Vec<Demande>, RepositoryError>;
}

/// Record store for owner accounts, keyed by email.
pub trait UserRepository: Send + Sync {
    fn get(&self, email: &str) -> Result<Option<User>, RepositoryError>;
    fn save(&self, user: User) -> Result<User, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
