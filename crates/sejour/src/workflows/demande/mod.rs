//! Demande intake and lifecycle: the status state machine, the workflow service that
//! orchestrates record-store lookups around it, and the HTTP surface.

pub mod domain;
pub mod identity;
pub mod lifecycle;
pub mod mapping;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    Address, Caller, Demande, DemandeCount, DemandeId, Identity, Project, StatutDemande, User,
};
pub use identity::{HeaderIdentityProvider, IdentityError, IdentityProvider};
pub use lifecycle::{
    Clock, DemandeLifecycle, Guard, LifecycleError, Milestone, SystemClock, Transition,
    TransitionRule, TRANSITIONS,
};
pub use mapping::{DemandeDto, MappingError};
pub use repository::{DemandeRepository, RepositoryError, UserRepository};
pub use router::demande_router;
pub use service::{DemandeServiceError, DemandeWorkflowService};
