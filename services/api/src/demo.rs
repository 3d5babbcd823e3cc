use crate::infra::{InMemoryDemandeRepository, InMemoryUserRepository};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser};
use serde::Serialize;
use sejour::error::AppError;
use sejour::workflows::demande::{
    Caller, Demande, DemandeDto, DemandeLifecycle, DemandeWorkflowService, Guard, Milestone,
    StatutDemande, UserRepository, TRANSITIONS,
};
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Applicant login used for the demo demande
    #[arg(long, default_value = "applicant@example.org")]
    pub(crate) applicant: String,
    /// Back-office login that drives the post-payment steps
    #[arg(long, default_value = "agent@prefecture.example")]
    pub(crate) agent: String,
    /// Authority granting back-office rights to the agent
    #[arg(long, default_value = "ROLE_AGENT")]
    pub(crate) back_office_authority: String,
    /// Planned arrival date (YYYY-MM-DD) recorded in the project section
    #[arg(long, value_parser = parse_date)]
    pub(crate) coming_date: Option<NaiveDate>,
}

#[derive(Parser, Debug, Default)]
pub(crate) struct LifecycleArgs {
    /// Emit the table as JSON instead of text
    #[arg(long)]
    pub(crate) json: bool,
    /// Status the printed path starts from (draft, payment, ...)
    #[arg(long)]
    pub(crate) from: Option<StatutDemande>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TransitionView {
    transition: &'static str,
    from: StatutDemande,
    to: StatutDemande,
    milestone: Option<&'static str>,
    allowed: &'static str,
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|err| format!("invalid date '{value}': {err}"))
}

fn guard_label(guard: Guard) -> &'static str {
    match guard {
        Guard::Owner => "owner",
        Guard::OwnerWithProfile => "owner with matching account",
        Guard::OwnerOrBackOffice => "owner or back office",
    }
}

fn milestone_label(milestone: Milestone) -> &'static str {
    match milestone {
        Milestone::Recevability => "recevabilityDate",
        Milestone::Identification => "identificationDate",
    }
}

fn transition_views() -> Vec<TransitionView> {
    TRANSITIONS
        .iter()
        .map(|rule| TransitionView {
            transition: rule.transition.label(),
            from: rule.from,
            to: rule.to,
            milestone: rule.milestone.map(milestone_label),
            allowed: guard_label(rule.guard),
        })
        .collect()
}

pub(crate) fn run_lifecycle_table(args: LifecycleArgs) -> Result<(), AppError> {
    let views = transition_views();
    if args.json {
        match serde_json::to_string_pretty(&views) {
            Ok(json) => println!("{json}"),
            Err(err) => println!("Transition table unavailable: {err}"),
        }
        return Ok(());
    }

    println!("Demande lifecycle");
    for view in &views {
        println!(
            "- {:<15} {:>14} -> {:<14} [{}]{}",
            view.transition,
            view.from,
            view.to,
            view.allowed,
            view.milestone
                .map(|stamp| format!(" stamps {stamp}"))
                .unwrap_or_default()
        );
    }

    let start = args.from.unwrap_or(StatutDemande::Draft);
    println!("\nRemaining path: {}", remaining_path(start).join(" -> "));
    Ok(())
}

fn remaining_path(start: StatutDemande) -> Vec<&'static str> {
    let lifecycle = DemandeLifecycle;
    let mut statut = start;
    let mut path = vec![statut.label()];
    while let Some(transition) = lifecycle.next_transition(statut) {
        statut = transition.rule().to;
        path.push(statut.label());
    }
    path
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        applicant,
        agent,
        back_office_authority,
        coming_date,
    } = args;

    let users = Arc::new(
        InMemoryUserRepository::with_users([applicant.clone()])
            .map_err(|err| AppError::Workflow(err.into()))?,
    );
    let service = DemandeWorkflowService::new(
        Arc::new(InMemoryDemandeRepository::default()),
        users.clone(),
    );
    let owner = Caller::applicant(applicant.clone());
    let back_office = Caller::with_authorities(
        agent,
        vec![back_office_authority.clone()],
        &back_office_authority,
    );

    println!("Demande workflow demo");
    let draft = service.init_with_campus(&owner)?;
    render_step("init", &draft);

    let mut submission = DemandeDto::from(draft);
    if let Some(identity) = submission.identity.as_mut() {
        identity.first_name = Some("Demo".to_string());
        identity.last_name = Some("Applicant".to_string());
    }
    if let Some(address) = submission.address.as_mut() {
        address.contact_type = Some("campus".to_string());
    }
    if let Some(project) = submission.project.as_mut() {
        project.coming_date = coming_date;
    }

    let updated = service.update(&owner, submission.clone())?;
    render_step("update", &updated);
    let validated = service.validate(&owner, submission)?;
    render_step("validate", &validated);

    match users.get(&applicant) {
        Ok(Some(account)) => println!(
            "  Account synchronized: {} {} (contact type {})",
            account.first_name.unwrap_or_default(),
            account.last_name.unwrap_or_default(),
            account
                .french_address
                .and_then(|address| address.contact_type)
                .unwrap_or_else(|| "n/a".to_string())
        ),
        Ok(None) => println!("  Account lookup returned no record"),
        Err(err) => println!("  Account store unavailable: {err}"),
    }

    let paid = service.prepaid(&owner)?;
    render_step("prepaid", &paid);
    let counts = service.counts()?;
    println!(
        "  Back-office queues: {} paid, {} scheduled, {} identity verified",
        counts.nb_paid, counts.nb_scheduled, counts.nb_identity_verified
    );

    let verified = service.verify(&back_office, DemandeDto::from(paid))?;
    render_step("verify", &verified);
    let scheduled = service.rdv(&back_office, DemandeDto::from(verified))?;
    render_step("rdv", &scheduled);
    let identified = service.identification(&back_office, DemandeDto::from(scheduled))?;
    render_step("identification", &identified);
    let archived = service.final_decision(&back_office, DemandeDto::from(identified))?;
    render_step("finalDecision", &archived);

    println!(
        "\nMilestones: recevability {}, identification {}",
        stamp(archived.recevability_date),
        stamp(archived.identification_date)
    );
    Ok(())
}

fn render_step(step: &str, demande: &Demande) {
    println!(
        "- {:<15} {} now {:<14} (modified {})",
        step,
        demande.id,
        demande.statut,
        stamp(demande.modification_date)
    );
}

fn stamp(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string())
}
