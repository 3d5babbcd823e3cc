use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier wrapper for demandes, assigned once at creation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DemandeId(pub String);

impl fmt::Display for DemandeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a demande. The status names the step that remains to be done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatutDemande {
    Draft,
    Payment,
    Recevability,
    Rdv,
    Identification,
    Decision,
    Archive,
}

impl StatutDemande {
    pub const ALL: [StatutDemande; 7] = [
        StatutDemande::Draft,
        StatutDemande::Payment,
        StatutDemande::Recevability,
        StatutDemande::Rdv,
        StatutDemande::Identification,
        StatutDemande::Decision,
        StatutDemande::Archive,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            StatutDemande::Draft => "draft",
            StatutDemande::Payment => "payment",
            StatutDemande::Recevability => "recevability",
            StatutDemande::Rdv => "rdv",
            StatutDemande::Identification => "identification",
            StatutDemande::Decision => "decision",
            StatutDemande::Archive => "archive",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, StatutDemande::Archive)
    }
}

impl fmt::Display for StatutDemande {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown demande status '{0}'")]
pub struct UnknownStatut(pub String);

impl FromStr for StatutDemande {
    type Err = UnknownStatut;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        StatutDemande::ALL
            .into_iter()
            .find(|statut| statut.label() == normalized)
            .ok_or_else(|| UnknownStatut(value.to_string()))
    }
}

/// Personal identity data. Only the names are read by the workflow; everything else
/// travels untouched in `details`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(flatten)]
    pub details: BTreeMap<String, Value>,
}

/// Postal address. `contact_type` is copied onto the owner's profile at validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_type: Option<String>,
    #[serde(flatten)]
    pub details: BTreeMap<String, Value>,
}

/// Travel or visit project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coming_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub details: BTreeMap<String, Value>,
}

/// One application record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Demande {
    pub id: DemandeId,
    pub statut: StatutDemande,
    pub email: String,
    pub identity: Identity,
    pub address: Address,
    pub project: Project,
    pub creation_date: DateTime<Utc>,
    pub modification_date: Option<DateTime<Utc>>,
    pub recevability_date: Option<DateTime<Utc>>,
    pub identification_date: Option<DateTime<Utc>>,
}

impl Demande {
    pub fn is_owned_by(&self, login: &str) -> bool {
        self.email.eq_ignore_ascii_case(login)
    }

    /// Active demandes block a new `init` for the same owner.
    pub fn is_active(&self) -> bool {
        !self.statut.is_terminal()
    }
}

/// Account of a demande owner, correlated with demandes by email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub coming_date: Option<NaiveDate>,
    #[serde(default)]
    pub french_address: Option<Address>,
}

impl User {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            first_name: None,
            last_name: None,
            coming_date: None,
            french_address: None,
        }
    }
}

/// Authenticated identity of the current request, passed explicitly into the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub login: String,
    pub authorities: Vec<String>,
    back_office: bool,
}

impl Caller {
    pub fn applicant(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            authorities: Vec::new(),
            back_office: false,
        }
    }

    pub fn with_authorities(
        login: impl Into<String>,
        authorities: Vec<String>,
        back_office_authority: &str,
    ) -> Self {
        let back_office = authorities
            .iter()
            .any(|authority| authority == back_office_authority);
        Self {
            login: login.into(),
            authorities,
            back_office,
        }
    }

    pub fn is_back_office(&self) -> bool {
        self.back_office
    }
}

/// Back-office dashboard counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemandeCount {
    /// Paid and awaiting the recevability check.
    pub nb_paid: u64,
    /// Appointment booked, identification pending.
    pub nb_scheduled: u64,
    /// Identity verified, awaiting the final decision.
    pub nb_identity_verified: u64,
}

impl DemandeCount {
    pub fn record(&mut self, statut: StatutDemande) {
        match statut {
            StatutDemande::Recevability => self.nb_paid += 1,
            StatutDemande::Identification => self.nb_scheduled += 1,
            StatutDemande::Decision => self.nb_identity_verified += 1,
            _ => {}
        }
    }
}
