use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::domain::{Caller, Demande, DemandeCount, DemandeId, StatutDemande};
use super::lifecycle::{Clock, DemandeLifecycle, LifecycleError, SystemClock, Transition};
use super::mapping::{DemandeDto, MappingError};
use super::repository::{DemandeRepository, RepositoryError, UserRepository};

/// Service composing the record stores and the lifecycle state machine.
pub struct DemandeWorkflowService<D, U> {
    demandes: Arc<D>,
    users: Arc<U>,
    lifecycle: DemandeLifecycle,
    clock: Arc<dyn Clock>,
}

static DEMANDE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_demande_id() -> DemandeId {
    let id = DEMANDE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    DemandeId(format!("dem-{id:06}"))
}

impl<D, U> DemandeWorkflowService<D, U>
where
    D: DemandeRepository + 'static,
    U: UserRepository + 'static,
{
    pub fn new(demandes: Arc<D>, users: Arc<U>) -> Self {
        Self::with_clock(demandes, users, Arc::new(SystemClock))
    }

    pub fn with_clock(demandes: Arc<D>, users: Arc<U>, clock: Arc<dyn Clock>) -> Self {
        Self {
            demandes,
            users,
            lifecycle: DemandeLifecycle,
            clock,
        }
    }

    /// Open a new `draft` demande for the caller, pre-filled from their profile.
    pub fn init_with_campus(&self, caller: &Caller) -> Result<Demande, DemandeServiceError> {
        let active = self
            .demandes
            .find(&|demande: &Demande| demande.is_owned_by(&caller.login) && demande.is_active())?;
        if let Some(existing) = active.into_iter().next() {
            warn!(caller = %caller.login, demande_id = %existing.id, "active demande already open");
            return Err(DemandeServiceError::DuplicateActiveRequest {
                email: caller.login.clone(),
                existing: existing.id,
            });
        }

        let profile = self.users.get(&caller.login)?;
        let demande = self.lifecycle.initiate(
            self.allocate_id()?,
            &caller.login,
            profile.as_ref(),
            self.clock.now(),
        );
        let stored = self.demandes.save(demande)?;
        info!(caller = %caller.login, demande_id = %stored.id, "demande initiated");
        Ok(stored)
    }

    /// All demandes owned by the caller, oldest first.
    pub fn user_demandes(&self, caller: &Caller) -> Result<Vec<Demande>, DemandeServiceError> {
        debug!(caller = %caller.login, "listing caller demandes");
        let mut demandes = self
            .demandes
            .find(&|demande: &Demande| demande.is_owned_by(&caller.login))?;
        demandes.sort_by(|a, b| {
            a.creation_date
                .cmp(&b.creation_date)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(demandes)
    }

    /// The caller's demande currently waiting in `statut`.
    pub fn current_demande(
        &self,
        caller: &Caller,
        statut: StatutDemande,
    ) -> Result<Demande, DemandeServiceError> {
        self.find_by_email_and_status(&caller.login, statut)?
            .ok_or_else(|| {
                DemandeServiceError::NotFound(format!("{} demande for {}", statut, caller.login))
            })
    }

    pub fn find_by_email_and_status(
        &self,
        email: &str,
        statut: StatutDemande,
    ) -> Result<Option<Demande>, DemandeServiceError> {
        debug!(email, %statut, "looking up demande by owner and status");
        let matches = self
            .demandes
            .find(&|demande: &Demande| demande.is_owned_by(email) && demande.statut == statut)?;
        Ok(newest_first(matches).into_iter().next())
    }

    /// Demandes in `statut`, newest creation date first.
    pub fn find_by_status(&self, statut: StatutDemande) -> Result<Vec<Demande>, DemandeServiceError> {
        debug!(%statut, "listing demandes by status");
        let matches = self.demandes.find(&|demande: &Demande| demande.statut == statut)?;
        Ok(newest_first(matches))
    }

    pub fn get(&self, id: &DemandeId) -> Result<Demande, DemandeServiceError> {
        self.demandes
            .get(id)?
            .ok_or_else(|| DemandeServiceError::NotFound(id.0.clone()))
    }

    pub fn counts(&self) -> Result<DemandeCount, DemandeServiceError> {
        let mut count = DemandeCount::default();
        for demande in self.demandes.find(&|_: &Demande| true)? {
            count.record(demande.statut);
        }
        Ok(count)
    }

    /// Save the caller's edits to a draft demande.
    pub fn update(
        &self,
        caller: &Caller,
        submitted: DemandeDto,
    ) -> Result<Demande, DemandeServiceError> {
        let submitted = Demande::try_from(submitted)?;
        let stored = self.load_for(Transition::Update, &submitted.id)?;
        self.lifecycle.authorize(Transition::Update, caller, &stored)?;

        let edited = with_applicant_content(stored, submitted);
        let updated = self
            .lifecycle
            .apply(edited, Transition::Update, self.clock.now())?;
        self.commit(Transition::Update, caller, updated)
    }

    /// Submit a draft for payment and copy the applicant's details onto their account.
    pub fn validate(
        &self,
        caller: &Caller,
        submitted: DemandeDto,
    ) -> Result<Demande, DemandeServiceError> {
        let submitted = Demande::try_from(submitted)?;
        let stored = self.load_for(Transition::Validate, &submitted.id)?;
        self.lifecycle
            .authorize(Transition::Validate, caller, &stored)?;

        let mismatch = || {
            warn!(caller = %caller.login, demande_id = %stored.id, "validation refused: owner account mismatch");
            LifecycleError::IdentityMismatch {
                caller: caller.login.clone(),
                demande: stored.id.clone(),
            }
        };
        let mut owner = self
            .users
            .get(&stored.email)?
            .filter(|user| user.email.eq_ignore_ascii_case(&caller.login))
            .ok_or_else(mismatch)?;

        let previous = stored.clone();
        let edited = with_applicant_content(stored, submitted);
        let validated = self
            .lifecycle
            .apply(edited, Transition::Validate, self.clock.now())?;
        self.lifecycle.synchronize_owner(&mut owner, &validated);

        let saved = self.demandes.save(validated)?;
        if let Err(err) = self.users.save(owner) {
            warn!(demande_id = %saved.id, error = %err, "owner sync failed, restoring demande");
            if let Err(restore) = self.demandes.save(previous) {
                error!(demande_id = %saved.id, error = %restore, "demande restore failed");
            }
            return Err(err.into());
        }

        info!(caller = %caller.login, demande_id = %saved.id, statut = %saved.statut, "demande validated");
        Ok(saved)
    }

    /// Record payment of the caller's demande awaiting it.
    pub fn prepaid(&self, caller: &Caller) -> Result<Demande, DemandeServiceError> {
        let current = self
            .find_by_email_and_status(&caller.login, StatutDemande::Payment)?
            .ok_or(LifecycleError::InvalidTransition {
                transition: Transition::Prepaid,
                demande: None,
                current: None,
            })?;
        self.advance(Transition::Prepaid, caller, current)
    }

    /// Recevability check passed; an appointment must now be booked.
    pub fn verify(&self, caller: &Caller, submitted: DemandeDto) -> Result<Demande, DemandeServiceError> {
        self.advance_addressed(Transition::Verify, caller, &submitted)
    }

    /// Appointment booked; identification is next.
    pub fn rdv(&self, caller: &Caller, submitted: DemandeDto) -> Result<Demande, DemandeServiceError> {
        self.advance_addressed(Transition::Rdv, caller, &submitted)
    }

    /// Identity documents checked; the file awaits its decision.
    pub fn identification(
        &self,
        caller: &Caller,
        submitted: DemandeDto,
    ) -> Result<Demande, DemandeServiceError> {
        self.advance_addressed(Transition::Identification, caller, &submitted)
    }

    /// Decision taken; the demande is archived.
    pub fn final_decision(
        &self,
        caller: &Caller,
        submitted: DemandeDto,
    ) -> Result<Demande, DemandeServiceError> {
        self.advance_addressed(Transition::FinalDecision, caller, &submitted)
    }

    fn advance_addressed(
        &self,
        transition: Transition,
        caller: &Caller,
        submitted: &DemandeDto,
    ) -> Result<Demande, DemandeServiceError> {
        let id = submitted.demande_id()?;
        let stored = self.load_for(transition, &id)?;
        self.advance(transition, caller, stored)
    }

    fn advance(
        &self,
        transition: Transition,
        caller: &Caller,
        stored: Demande,
    ) -> Result<Demande, DemandeServiceError> {
        self.lifecycle.authorize(transition, caller, &stored)?;
        let advanced = self.lifecycle.apply(stored, transition, self.clock.now())?;
        self.commit(transition, caller, advanced)
    }

    /// Next sequence id not already held by a stored demande. The sequence restarts with the
    /// process, so a surviving store may already hold the low ids.
    fn allocate_id(&self) -> Result<DemandeId, DemandeServiceError> {
        loop {
            let id = next_demande_id();
            if self.demandes.get(&id)?.is_none() {
                return Ok(id);
            }
            debug!(demande_id = %id, "demande id already taken");
        }
    }

    fn load_for(&self, transition: Transition, id: &DemandeId) -> Result<Demande, DemandeServiceError> {
        self.demandes.get(id)?.ok_or_else(|| {
            warn!(demande_id = %id, %transition, "transition requested for unknown demande");
            DemandeServiceError::Lifecycle(LifecycleError::InvalidTransition {
                transition,
                demande: Some(id.clone()),
                current: None,
            })
        })
    }

    fn commit(
        &self,
        transition: Transition,
        caller: &Caller,
        demande: Demande,
    ) -> Result<Demande, DemandeServiceError> {
        let saved = self.demandes.save(demande)?;
        info!(caller = %caller.login, demande_id = %saved.id, %transition, statut = %saved.statut, "demande transitioned");
        Ok(saved)
    }
}

/// Applicant-editable content comes from the submission; identity, ownership, status and
/// timestamps always come from the stored record.
fn with_applicant_content(stored: Demande, submitted: Demande) -> Demande {
    Demande {
        identity: submitted.identity,
        address: submitted.address,
        project: submitted.project,
        ..stored
    }
}

fn newest_first(mut demandes: Vec<Demande>) -> Vec<Demande> {
    demandes.sort_by(|a, b| {
        b.creation_date
            .cmp(&a.creation_date)
            .then_with(|| b.id.cmp(&a.id))
    });
    demandes
}

/// Error raised by the workflow service.
#[derive(Debug, thiserror::Error)]
pub enum DemandeServiceError {
    #[error("demande not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Validation(#[from] MappingError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error("{email} already has an active demande ({existing})")]
    DuplicateActiveRequest { email: String, existing: DemandeId },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
