use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    models::{AgreementStatus, RentalAgreement, TenantLedger},
    routes::org_ledger,
    schemas::{
        parse_uuid, validate_input, AgreementPath, AgreementsQuery, CreateAgreementInput,
        OrgPath, RenewAgreementInput, UpdateAgreementInput,
    },
    services::{
        agreement_view::AgreementView,
        changes::Mutation,
        expiry::{local_today, sweep_expired},
        lifecycle::{DocumentsOutcome, LifecycleController, TransitionOutcome},
    },
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/organizations/{org_id}/agreements",
            axum::routing::get(list_agreements).post(create_agreement),
        )
        .route(
            "/organizations/{org_id}/agreements/{agreement_id}",
            axum::routing::get(get_agreement)
                .patch(update_agreement)
                .delete(delete_agreement),
        )
        .route(
            "/organizations/{org_id}/agreements/{agreement_id}/renew",
            axum::routing::post(renew_agreement),
        )
        .route(
            "/organizations/{org_id}/agreements/{agreement_id}/terminate",
            axum::routing::post(terminate_agreement),
        )
        .route(
            "/organizations/{org_id}/agreements/{agreement_id}/invoices",
            axum::routing::post(generate_agreement_invoices),
        )
        .route(
            "/organizations/{org_id}/expiry-sweep",
            axum::routing::post(run_expiry_sweep),
        )
}

#[derive(Serialize)]
struct AgreementSummary<'a> {
    #[serde(flatten)]
    agreement: &'a RentalAgreement,
    display_status: AgreementStatus,
}

async fn list_agreements(
    State(state): State<AppState>,
    Path(path): Path<OrgPath>,
    Query(query): Query<AgreementsQuery>,
) -> AppResult<Json<Value>> {
    let property_id = query.property_uuid()?;
    let (_, shared) = org_ledger(&state, &path.org_id).await?;
    let ledger = shared.lock().await;
    let today = org_today(&state, &ledger);

    let data = ledger
        .agreements
        .iter()
        .filter(|agreement| query.status.map_or(true, |status| agreement.status == status))
        .filter(|agreement| property_id.map_or(true, |id| agreement.property_id == id))
        .map(|agreement| AgreementSummary {
            agreement,
            display_status: agreement.display_status(today),
        })
        .collect::<Vec<_>>();
    Ok(Json(json!({ "data": data })))
}

async fn get_agreement(
    State(state): State<AppState>,
    Path(path): Path<AgreementPath>,
) -> AppResult<Json<Value>> {
    let (_, shared) = org_ledger(&state, &path.org_id).await?;
    let ledger = shared.lock().await;
    let agreement = find_agreement(&ledger, &path.agreement_id)?;
    let view = AgreementView::new(&ledger);
    let today = org_today(&state, &ledger);

    let invoices = view.invoices_for(agreement.id).collect::<Vec<_>>();
    let templates = ledger
        .templates
        .iter()
        .filter(|template| template.agreement_id == agreement.id)
        .collect::<Vec<_>>();

    Ok(Json(json!({
        "agreement": AgreementSummary {
            agreement,
            display_status: agreement.display_status(today),
        },
        "invoices": invoices,
        "recurring_templates": templates,
        "open_invoice_count": view.open_invoices_for(agreement.id).len(),
        "previous_agreement": view.predecessor_of(agreement),
    })))
}

async fn create_agreement(
    State(state): State<AppState>,
    Path(path): Path<OrgPath>,
    Json(payload): Json<CreateAgreementInput>,
) -> AppResult<(StatusCode, Json<Value>)> {
    validate_input(&payload)?;
    let generate_invoices = payload.generate_invoices;
    let terms = payload.into_terms()?;

    let (_, shared) = org_ledger(&state, &path.org_id).await?;
    let mut ledger = shared.lock().await;
    let outcome = LifecycleController::new(&ledger, state.config.deposit_duplicate_tolerance)
        .create(terms, &generate_invoices)?;
    let outcome = commit_transition(&mut ledger, outcome)?;
    Ok((StatusCode::CREATED, Json(json!(outcome))))
}

async fn update_agreement(
    State(state): State<AppState>,
    Path(path): Path<AgreementPath>,
    Json(payload): Json<UpdateAgreementInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    let patch = payload.into_patch()?;

    let (_, shared) = org_ledger(&state, &path.org_id).await?;
    let mut ledger = shared.lock().await;
    let agreement = find_agreement(&ledger, &path.agreement_id)?.clone();
    let outcome = LifecycleController::new(&ledger, state.config.deposit_duplicate_tolerance)
        .update(&agreement, patch)?;
    let outcome = commit_transition(&mut ledger, outcome)?;
    Ok(Json(json!(outcome)))
}

async fn delete_agreement(
    State(state): State<AppState>,
    Path(path): Path<AgreementPath>,
) -> AppResult<StatusCode> {
    let (org_id, shared) = org_ledger(&state, &path.org_id).await?;
    let mut ledger = shared.lock().await;
    let agreement = find_agreement(&ledger, &path.agreement_id)?.clone();
    let changes = LifecycleController::new(&ledger, state.config.deposit_duplicate_tolerance)
        .delete(&agreement)?;
    ledger.apply(&changes)?;
    tracing::info!(org_id = %org_id, agreement_id = %agreement.id, "Agreement deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn renew_agreement(
    State(state): State<AppState>,
    Path(path): Path<AgreementPath>,
    Json(payload): Json<RenewAgreementInput>,
) -> AppResult<(StatusCode, Json<Value>)> {
    validate_input(&payload)?;
    let generate_invoices = payload.generate_invoices;
    let terms = payload.into_terms()?;

    let (_, shared) = org_ledger(&state, &path.org_id).await?;
    let mut ledger = shared.lock().await;
    let existing = find_agreement(&ledger, &path.agreement_id)?.clone();
    let outcome = LifecycleController::new(&ledger, state.config.deposit_duplicate_tolerance)
        .renew(&existing, terms, &generate_invoices)?;
    let outcome = commit_transition(&mut ledger, outcome)?;
    Ok((StatusCode::CREATED, Json(json!(outcome))))
}

async fn terminate_agreement(
    State(state): State<AppState>,
    Path(path): Path<AgreementPath>,
) -> AppResult<Json<Value>> {
    let (_, shared) = org_ledger(&state, &path.org_id).await?;
    let mut ledger = shared.lock().await;
    let agreement = find_agreement(&ledger, &path.agreement_id)?.clone();
    let outcome = LifecycleController::new(&ledger, state.config.deposit_duplicate_tolerance)
        .terminate(&agreement)?;
    let outcome = commit_transition(&mut ledger, outcome)?;
    Ok(Json(json!(outcome)))
}

async fn generate_agreement_invoices(
    State(state): State<AppState>,
    Path(path): Path<AgreementPath>,
) -> AppResult<Json<Value>> {
    let (_, shared) = org_ledger(&state, &path.org_id).await?;
    let mut ledger = shared.lock().await;
    let agreement = find_agreement(&ledger, &path.agreement_id)?.clone();
    let documents = LifecycleController::new(&ledger, state.config.deposit_duplicate_tolerance)
        .generate_documents(&agreement)?;
    ledger.apply(&documents.changes)?;
    Ok(Json(json!({ "documents": DocumentsOutcome::Generated(documents) })))
}

async fn run_expiry_sweep(
    State(state): State<AppState>,
    Path(path): Path<OrgPath>,
) -> AppResult<Json<Value>> {
    let (org_id, shared) = org_ledger(&state, &path.org_id).await?;
    let mut ledger = shared.lock().await;
    let today = org_today(&state, &ledger);
    let changes = sweep_expired(&ledger, today, Utc::now());
    ledger.apply(&changes)?;

    let expired = changes
        .iter()
        .filter_map(|mutation| match mutation {
            Mutation::UpdateAgreement(agreement) => Some(agreement.id),
            _ => None,
        })
        .collect::<Vec<_>>();
    tracing::info!(
        org_id = %org_id,
        expired = expired.len(),
        mutations = changes.len(),
        "Expiry sweep run on demand"
    );
    Ok(Json(json!({
        "today": today,
        "expired": expired,
        "changes": changes,
    })))
}

/// Commits the lifecycle change set, then the document change set. A document
/// commit failure is reported in the outcome; the transition stays committed.
fn commit_transition(
    ledger: &mut TenantLedger,
    mut outcome: TransitionOutcome,
) -> AppResult<TransitionOutcome> {
    ledger.apply(&outcome.changes)?;
    if let DocumentsOutcome::Generated(documents) = &outcome.documents {
        if let Err(error) = ledger.apply(&documents.changes) {
            tracing::warn!(
                agreement_id = %outcome.agreement.id,
                error = %error,
                "Generated documents could not be committed"
            );
            outcome.documents = DocumentsOutcome::Failed {
                kind: "conflict".to_string(),
                reason: error.to_string(),
            };
        }
    }
    Ok(outcome)
}

fn find_agreement<'a>(ledger: &'a TenantLedger, agreement_id: &str) -> AppResult<&'a RentalAgreement> {
    let agreement_id = parse_uuid(agreement_id, "agreement_id")?;
    ledger
        .agreement(agreement_id)
        .ok_or_else(|| AppError::NotFound(format!("Agreement {agreement_id} was not found.")))
}

fn org_today(state: &AppState, ledger: &TenantLedger) -> chrono::NaiveDate {
    local_today(
        &ledger.organization.timezone,
        &state.config.default_timezone,
        Utc::now(),
    )
}
