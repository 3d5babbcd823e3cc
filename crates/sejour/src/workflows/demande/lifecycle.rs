//! Demande status state machine.
//!
//! Every mutating operation is named after the step it completes and moves the demande to
//! the next step, so a status always reads as "what remains to be done". The whole legal
//! graph lives in [`TRANSITIONS`]; nothing else in the crate decides whether a status
//! change is allowed.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{Address, Caller, Demande, DemandeId, Identity, Project, StatutDemande, User};

/// Source of the current time for every timestamp the lifecycle writes.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// The mutating operations applicable to an existing demande.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Transition {
    Update,
    Validate,
    Prepaid,
    Verify,
    Rdv,
    Identification,
    FinalDecision,
}

impl Transition {
    pub const ALL: [Transition; 7] = [
        Transition::Update,
        Transition::Validate,
        Transition::Prepaid,
        Transition::Verify,
        Transition::Rdv,
        Transition::Identification,
        Transition::FinalDecision,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Transition::Update => "update",
            Transition::Validate => "validate",
            Transition::Prepaid => "prepaid",
            Transition::Verify => "verify",
            Transition::Rdv => "rdv",
            Transition::Identification => "identification",
            Transition::FinalDecision => "finalDecision",
        }
    }

    pub fn rule(self) -> &'static TransitionRule {
        match self {
            Transition::Update => &TRANSITIONS[0],
            Transition::Validate => &TRANSITIONS[1],
            Transition::Prepaid => &TRANSITIONS[2],
            Transition::Verify => &TRANSITIONS[3],
            Transition::Rdv => &TRANSITIONS[4],
            Transition::Identification => &TRANSITIONS[5],
            Transition::FinalDecision => &TRANSITIONS[6],
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

/// Timestamp stamped when a transition produces the matching state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Milestone {
    Recevability,
    Identification,
}

/// Who may request a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// The caller must own the demande.
    Owner,
    /// The caller must own the demande and resolve to the owning user record.
    OwnerWithProfile,
    /// The owner, or any caller holding the back-office authority.
    OwnerOrBackOffice,
}

/// One row of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    pub transition: Transition,
    pub from: StatutDemande,
    pub to: StatutDemande,
    pub milestone: Option<Milestone>,
    pub guard: Guard,
}

pub const TRANSITIONS: [TransitionRule; 7] = [
    TransitionRule {
        transition: Transition::Update,
        from: StatutDemande::Draft,
        to: StatutDemande::Draft,
        milestone: None,
        guard: Guard::Owner,
    },
    TransitionRule {
        transition: Transition::Validate,
        from: StatutDemande::Draft,
        to: StatutDemande::Payment,
        milestone: None,
        guard: Guard::OwnerWithProfile,
    },
    TransitionRule {
        transition: Transition::Prepaid,
        from: StatutDemande::Payment,
        to: StatutDemande::Recevability,
        milestone: None,
        guard: Guard::Owner,
    },
    TransitionRule {
        transition: Transition::Verify,
        from: StatutDemande::Recevability,
        to: StatutDemande::Rdv,
        milestone: Some(Milestone::Recevability),
        guard: Guard::OwnerOrBackOffice,
    },
    TransitionRule {
        transition: Transition::Rdv,
        from: StatutDemande::Rdv,
        to: StatutDemande::Identification,
        milestone: None,
        guard: Guard::OwnerOrBackOffice,
    },
    TransitionRule {
        transition: Transition::Identification,
        from: StatutDemande::Identification,
        to: StatutDemande::Decision,
        milestone: Some(Milestone::Identification),
        guard: Guard::OwnerOrBackOffice,
    },
    TransitionRule {
        transition: Transition::FinalDecision,
        from: StatutDemande::Decision,
        to: StatutDemande::Archive,
        milestone: None,
        guard: Guard::OwnerOrBackOffice,
    },
];

/// Refusals raised by the state machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("cannot {transition} demande {}: current status is {}", id_label(.demande), statut_label(.current))]
    InvalidTransition {
        transition: Transition,
        demande: Option<DemandeId>,
        current: Option<StatutDemande>,
    },
    #[error("caller {caller} does not own demande {demande}")]
    IdentityMismatch { caller: String, demande: DemandeId },
}

fn id_label(id: &Option<DemandeId>) -> &str {
    id.as_ref().map_or("<none>", |id| id.0.as_str())
}

fn statut_label(statut: &Option<StatutDemande>) -> &'static str {
    statut.map_or("<absent>", StatutDemande::label)
}

/// Stateless engine applying transitions and their side effects.
#[derive(Debug, Clone, Copy, Default)]
pub struct DemandeLifecycle;

impl DemandeLifecycle {
    /// Builds a fresh `draft` demande owned by `owner`, pre-filled from the owner's profile.
    pub fn initiate(
        &self,
        id: DemandeId,
        owner: &str,
        profile: Option<&User>,
        now: DateTime<Utc>,
    ) -> Demande {
        let mut identity = Identity::default();
        let mut project = Project::default();
        let mut address = Address::default();

        if let Some(user) = profile {
            identity.first_name = user.first_name.clone();
            identity.last_name = user.last_name.clone();
            project.coming_date = user.coming_date;
            address.contact_type = user
                .french_address
                .as_ref()
                .and_then(|french| french.contact_type.clone());
        }

        Demande {
            id,
            statut: StatutDemande::Draft,
            email: owner.to_string(),
            identity,
            address,
            project,
            creation_date: now,
            modification_date: None,
            recevability_date: None,
            identification_date: None,
        }
    }

    /// The single transition leaving `statut`, if any. `update` is a self-loop on `draft`
    /// and is not reported as progress.
    pub fn next_transition(&self, statut: StatutDemande) -> Option<Transition> {
        TRANSITIONS
            .iter()
            .find(|rule| rule.from == statut && rule.to != rule.from)
            .map(|rule| rule.transition)
    }

    pub fn authorize(
        &self,
        transition: Transition,
        caller: &Caller,
        demande: &Demande,
    ) -> Result<(), LifecycleError> {
        let owner = demande.is_owned_by(&caller.login);
        let allowed = match transition.rule().guard {
            Guard::Owner | Guard::OwnerWithProfile => owner,
            Guard::OwnerOrBackOffice => owner || caller.is_back_office(),
        };

        if allowed {
            Ok(())
        } else {
            Err(LifecycleError::IdentityMismatch {
                caller: caller.login.clone(),
                demande: demande.id.clone(),
            })
        }
    }

    /// Checks the precondition and applies the status change plus its timestamps.
    pub fn apply(
        &self,
        mut demande: Demande,
        transition: Transition,
        now: DateTime<Utc>,
    ) -> Result<Demande, LifecycleError> {
        let rule = transition.rule();
        if demande.statut != rule.from {
            return Err(LifecycleError::InvalidTransition {
                transition,
                demande: Some(demande.id),
                current: Some(demande.statut),
            });
        }

        demande.statut = rule.to;
        demande.modification_date = Some(now);
        match rule.milestone {
            Some(Milestone::Recevability) => demande.recevability_date = Some(now),
            Some(Milestone::Identification) => demande.identification_date = Some(now),
            None => {}
        }

        Ok(demande)
    }

    /// Copies the validated demande's identity, project and contact data onto its owner.
    pub fn synchronize_owner(&self, user: &mut User, demande: &Demande) {
        user.first_name = demande.identity.first_name.clone();
        user.last_name = demande.identity.last_name.clone();
        user.coming_date = demande.project.coming_date;
        user.french_address = Some(Address {
            contact_type: demande.address.contact_type.clone(),
            ..Address::default()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_rows_match_their_transition() {
        for transition in Transition::ALL {
            assert_eq!(transition.rule().transition, transition);
        }
    }

    #[test]
    fn statuses_form_a_single_forward_chain() {
        let lifecycle = DemandeLifecycle;
        let mut statut = StatutDemande::Draft;
        let mut visited = vec![statut];
        while let Some(transition) = lifecycle.next_transition(statut) {
            statut = transition.rule().to;
            visited.push(statut);
        }
        assert_eq!(visited, StatutDemande::ALL.to_vec());
        assert!(statut.is_terminal());
    }
}
