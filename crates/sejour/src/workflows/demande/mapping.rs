use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{Address, Demande, DemandeId, Identity, Project, StatutDemande};

/// External JSON representation of a demande. Every field of [`Demande`] appears here
/// under its camelCase name; nothing is added or dropped in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemandeDto {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub statut: Option<StatutDemande>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub identity: Option<Identity>,
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default)]
    pub project: Option<Project>,
    #[serde(default)]
    pub creation_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modification_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub recevability_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub identification_date: Option<DateTime<Utc>>,
}

/// Raised when an inbound representation is incomplete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    #[error("demande representation is missing required field '{0}'")]
    MissingField(&'static str),
    #[error("demande id must not be blank")]
    BlankId,
}

impl From<Demande> for DemandeDto {
    fn from(demande: Demande) -> Self {
        Self {
            id: Some(demande.id.0),
            statut: Some(demande.statut),
            email: Some(demande.email),
            identity: Some(demande.identity),
            address: Some(demande.address),
            project: Some(demande.project),
            creation_date: Some(demande.creation_date),
            modification_date: demande.modification_date,
            recevability_date: demande.recevability_date,
            identification_date: demande.identification_date,
        }
    }
}

impl TryFrom<DemandeDto> for Demande {
    type Error = MappingError;

    fn try_from(dto: DemandeDto) -> Result<Self, Self::Error> {
        let id = dto.id.ok_or(MappingError::MissingField("id"))?;
        if id.trim().is_empty() {
            return Err(MappingError::BlankId);
        }

        Ok(Demande {
            id: DemandeId(id),
            statut: required(dto.statut, "statut")?,
            email: required(dto.email, "email")?,
            identity: required(dto.identity, "identity")?,
            address: required(dto.address, "address")?,
            project: required(dto.project, "project")?,
            creation_date: required(dto.creation_date, "creationDate")?,
            modification_date: dto.modification_date,
            recevability_date: dto.recevability_date,
            identification_date: dto.identification_date,
        })
    }
}

fn required<T>(value: Option<T>, field: &'static str) -> Result<T, MappingError> {
    value.ok_or(MappingError::MissingField(field))
}

impl DemandeDto {
    /// Id of the referenced demande, for operations that only need to address a record.
    pub fn demande_id(&self) -> Result<DemandeId, MappingError> {
        match self.id.as_deref() {
            None => Err(MappingError::MissingField("id")),
            Some(id) if id.trim().is_empty() => Err(MappingError::BlankId),
            Some(id) => Ok(DemandeId(id.to_string())),
        }
    }
}
