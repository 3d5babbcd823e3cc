use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::demande::domain::{Address, Caller, Demande, DemandeId, User};
use crate::workflows::demande::lifecycle::Clock;
use crate::workflows::demande::mapping::DemandeDto;
use crate::workflows::demande::repository::{DemandeRepository, RepositoryError, UserRepository};
use crate::workflows::demande::service::DemandeWorkflowService;

pub(super) const OWNER: &str = "a@x.com";

pub(super) fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2015, 6, 1, 8, 0, 0).unwrap()
}

/// Advances one minute on every read so successive stamps are strictly ordered.
#[derive(Default)]
pub(super) struct SteppingClock {
    ticks: Mutex<i64>,
}

impl Clock for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        let mut ticks = self.ticks.lock().expect("clock mutex poisoned");
        *ticks += 1;
        epoch() + Duration::minutes(*ticks)
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryDemandes {
    pub(super) records: Arc<Mutex<BTreeMap<DemandeId, Demande>>>,
}

impl DemandeRepository for MemoryDemandes {
    fn get(&self, id: &DemandeId) -> Result<Option<Demande>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn save(&self, demande: Demande) -> Result<Demande, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        guard.insert(demande.id.clone(), demande.clone());
        Ok(demande)
    }

    fn find(&self, predicate: &dyn Fn(&Demande) -> bool) -> Result<Vec<Demande>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.values().filter(|demande| predicate(demande)).cloned().collect())
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryUsers {
    pub(super) records: Arc<Mutex<HashMap<String, User>>>,
}

impl MemoryUsers {
    pub(super) fn with(users: &[&str]) -> Self {
        let store = Self::default();
        for email in users {
            store.save(User::new(*email)).expect("seed user");
        }
        store
    }

    pub(super) fn user(&self, email: &str) -> Option<User> {
        self.records
            .lock()
            .expect("user mutex poisoned")
            .get(email)
            .cloned()
    }
}

impl UserRepository for MemoryUsers {
    fn get(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self.user(email))
    }

    fn save(&self, user: User) -> Result<User, RepositoryError> {
        self.records
            .lock()
            .expect("user mutex poisoned")
            .insert(user.email.clone(), user.clone());
        Ok(user)
    }
}

/// Resolves users but refuses every write.
pub(super) struct ReadOnlyUsers(pub(super) MemoryUsers);

impl UserRepository for ReadOnlyUsers {
    fn get(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        self.0.get(email)
    }

    fn save(&self, _user: User) -> Result<User, RepositoryError> {
        Err(RepositoryError::Unavailable("user directory read only".to_string()))
    }
}

pub(super) struct UnavailableDemandes;

impl DemandeRepository for UnavailableDemandes {
    fn get(&self, _id: &DemandeId) -> Result<Option<Demande>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn save(&self, _demande: Demande) -> Result<Demande, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn find(&self, _predicate: &dyn Fn(&Demande) -> bool) -> Result<Vec<Demande>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

/// Accepts a fixed number of saves, then refuses every further write.
pub(super) struct SaveBudgetDemandes {
    pub(super) inner: MemoryDemandes,
    pub(super) saves_left: Mutex<usize>,
}

impl SaveBudgetDemandes {
    pub(super) fn new(saves: usize) -> Self {
        Self {
            inner: MemoryDemandes::default(),
            saves_left: Mutex::new(saves),
        }
    }
}

impl DemandeRepository for SaveBudgetDemandes {
    fn get(&self, id: &DemandeId) -> Result<Option<Demande>, RepositoryError> {
        self.inner.get(id)
    }

    fn save(&self, demande: Demande) -> Result<Demande, RepositoryError> {
        let mut left = self.saves_left.lock().expect("budget mutex poisoned");
        if *left == 0 {
            return Err(RepositoryError::Unavailable("demande store write refused".to_string()));
        }
        *left -= 1;
        self.inner.save(demande)
    }

    fn find(&self, predicate: &dyn Fn(&Demande) -> bool) -> Result<Vec<Demande>, RepositoryError> {
        self.inner.find(predicate)
    }
}

pub(super) type TestService = DemandeWorkflowService<MemoryDemandes, MemoryUsers>;

pub(super) fn build_service() -> (TestService, Arc<MemoryDemandes>, Arc<MemoryUsers>) {
    let demandes = Arc::new(MemoryDemandes::default());
    let users = Arc::new(MemoryUsers::with(&[OWNER, "b@y.com"]));
    let service = DemandeWorkflowService::with_clock(
        demandes.clone(),
        users.clone(),
        Arc::new(SteppingClock::default()),
    );
    (service, demandes, users)
}

pub(super) fn owner() -> Caller {
    Caller::applicant(OWNER)
}

pub(super) fn agent() -> Caller {
    Caller::with_authorities(
        "agent@prefecture.fr",
        vec!["ROLE_AGENT".to_string()],
        "ROLE_AGENT",
    )
}

/// The representation an applicant submits after filling in the draft form.
pub(super) fn filled_in(demande: &Demande) -> DemandeDto {
    let mut dto = DemandeDto::from(demande.clone());
    if let Some(identity) = dto.identity.as_mut() {
        identity.first_name = Some("Kim".to_string());
        identity.last_name = Some("Zayat".to_string());
    }
    dto.address = Some(Address {
        contact_type: Some("campus".to_string()),
        ..Address::default()
    });
    if let Some(project) = dto.project.as_mut() {
        project.coming_date = NaiveDate::from_ymd_opt(2015, 9, 1);
    }
    dto
}

pub(super) fn reference(demande: &Demande) -> DemandeDto {
    DemandeDto::from(demande.clone())
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
