use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{EngineError, EngineResult},
    models::{
        AgreementStatus, CategoryRole, Invoice, RecurringChargeTemplate, RentalAgreement,
        SeriesKind, TenantLedger,
    },
    services::{
        agreement_view::AgreementView,
        calendar::add_months,
        changes::{ChangeSet, Mutation},
        invoicing::{resolve_category, round2, InvoiceGenerator, SkippedDocument},
        numbering, recurring,
    },
};

/// Commercial terms of an agreement, as submitted or after merging a renewal
/// or edit onto an existing record.
#[derive(Debug, Clone, PartialEq)]
pub struct AgreementTerms {
    pub tenant_id: Uuid,
    pub property_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub monthly_rent: f64,
    pub rent_due_day: u32,
    pub security_deposit: f64,
    pub broker_id: Option<Uuid>,
    pub broker_fee: Option<f64>,
    pub notes: Option<String>,
}

impl AgreementTerms {
    fn from_agreement(agreement: &RentalAgreement) -> Self {
        Self {
            tenant_id: agreement.tenant_id,
            property_id: agreement.property_id,
            start_date: agreement.start_date,
            end_date: agreement.end_date,
            monthly_rent: agreement.monthly_rent,
            rent_due_day: agreement.rent_due_day,
            security_deposit: agreement.security_deposit,
            broker_id: agreement.broker_id,
            broker_fee: agreement.broker_fee,
            notes: agreement.notes.clone(),
        }
    }
}

/// New-term data for a renewal. Omitted fields carry over from the agreement
/// being renewed; the term starts the day after the old one ends and runs
/// twelve months unless dates are given. The broker and fee carry over too
/// unless `clear_broker` is set; a broker given explicitly always wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenewalTerms {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub monthly_rent: Option<f64>,
    pub rent_due_day: Option<u32>,
    pub security_deposit: Option<f64>,
    pub broker_id: Option<Uuid>,
    pub broker_fee: Option<f64>,
    pub clear_broker: bool,
    pub notes: Option<String>,
}

impl RenewalTerms {
    fn merge_onto(self, existing: &RentalAgreement) -> AgreementTerms {
        let start_date = self
            .start_date
            .unwrap_or_else(|| existing.end_date.succ_opt().unwrap_or(existing.end_date));
        let end_date = self.end_date.unwrap_or_else(|| {
            let anniversary = add_months(start_date, 12);
            anniversary.pred_opt().unwrap_or(anniversary)
        });
        AgreementTerms {
            tenant_id: existing.tenant_id,
            property_id: existing.property_id,
            start_date,
            end_date,
            monthly_rent: self.monthly_rent.unwrap_or(existing.monthly_rent),
            rent_due_day: self.rent_due_day.unwrap_or(existing.rent_due_day),
            security_deposit: self.security_deposit.unwrap_or(existing.security_deposit),
            broker_id: self
                .broker_id
                .or_else(|| existing.broker_id.filter(|_| !self.clear_broker)),
            broker_fee: self
                .broker_fee
                .or_else(|| existing.broker_fee.filter(|_| !self.clear_broker)),
            notes: self.notes.or_else(|| existing.notes.clone()),
        }
    }
}

/// Direct edit of an agreement outside the renewal path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgreementPatch {
    pub tenant_id: Option<Uuid>,
    pub property_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub monthly_rent: Option<f64>,
    pub rent_due_day: Option<u32>,
    pub security_deposit: Option<f64>,
    pub broker_id: Option<Uuid>,
    pub broker_fee: Option<f64>,
    pub notes: Option<String>,
    pub status: Option<AgreementStatus>,
}

impl AgreementPatch {
    fn is_empty(&self) -> bool {
        !self.touches_commercial_terms() && self.notes.is_none() && self.status.is_none()
    }

    fn touches_commercial_terms(&self) -> bool {
        self.tenant_id.is_some()
            || self.property_id.is_some()
            || self.start_date.is_some()
            || self.end_date.is_some()
            || self.monthly_rent.is_some()
            || self.rent_due_day.is_some()
            || self.security_deposit.is_some()
            || self.broker_id.is_some()
            || self.broker_fee.is_some()
    }

    fn merge_onto(&self, existing: &RentalAgreement) -> AgreementTerms {
        let mut terms = AgreementTerms::from_agreement(existing);
        if let Some(value) = self.tenant_id {
            terms.tenant_id = value;
        }
        if let Some(value) = self.property_id {
            terms.property_id = value;
        }
        if let Some(value) = self.start_date {
            terms.start_date = value;
        }
        if let Some(value) = self.end_date {
            terms.end_date = value;
        }
        if let Some(value) = self.monthly_rent {
            terms.monthly_rent = value;
        }
        if let Some(value) = self.rent_due_day {
            terms.rent_due_day = value;
        }
        if let Some(value) = self.security_deposit {
            terms.security_deposit = value;
        }
        if self.broker_id.is_some() {
            terms.broker_id = self.broker_id;
        }
        if self.broker_fee.is_some() {
            terms.broker_fee = self.broker_fee;
        }
        if self.notes.is_some() {
            terms.notes = self.notes.clone();
        }
        terms
    }
}

/// What the caller is asked before documents are generated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationPrompt {
    pub agreement_id: Uuid,
    pub agreement_number: String,
    pub renewal: bool,
    pub deposit_to_bill: f64,
    pub monthly_rent: f64,
}

/// Yes/no capability the calling surface hands to the controller.
pub trait ConfirmGeneration {
    fn confirm(&self, prompt: &GenerationPrompt) -> bool;
}

impl ConfirmGeneration for bool {
    fn confirm(&self, _prompt: &GenerationPrompt) -> bool {
        *self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedDocuments {
    pub invoices: Vec<Invoice>,
    pub template: Option<RecurringChargeTemplate>,
    pub skipped: Vec<SkippedDocument>,
    pub changes: ChangeSet,
}

/// Result of the optional document step that follows a committed transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DocumentsOutcome {
    NotApplicable,
    Declined,
    Generated(GeneratedDocuments),
    Failed { kind: String, reason: String },
}

impl DocumentsOutcome {
    pub fn failed(error: &EngineError) -> Self {
        Self::Failed {
            kind: error.kind().to_string(),
            reason: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionOutcome {
    pub agreement: RentalAgreement,
    pub previous: Option<RentalAgreement>,
    /// Lifecycle mutations; commit these before `documents`.
    pub changes: ChangeSet,
    pub documents: DocumentsOutcome,
}

/// Creates, renews, edits, and terminates agreements against one tenant's
/// ledger snapshot. Nothing here writes: every operation returns the change
/// set the caller must commit, and a failed precondition returns before any
/// change is built.
pub struct LifecycleController<'a> {
    ledger: &'a TenantLedger,
    view: AgreementView<'a>,
    deposit_tolerance: f64,
    now: DateTime<Utc>,
}

impl<'a> LifecycleController<'a> {
    pub fn new(ledger: &'a TenantLedger, deposit_tolerance: f64) -> Self {
        Self {
            ledger,
            view: AgreementView::new(ledger),
            deposit_tolerance,
            now: Utc::now(),
        }
    }

    pub fn create(
        &self,
        terms: AgreementTerms,
        confirm: &dyn ConfirmGeneration,
    ) -> EngineResult<TransitionOutcome> {
        self.validate_terms(&terms)?;
        self.ensure_property_free(terms.property_id, None)?;

        let (agreement_number, series) = numbering::allocate(
            SeriesKind::Agreement,
            self.ledger.series(SeriesKind::Agreement),
            self.ledger.agreement_numbers(),
        )?;

        let agreement = self.build_agreement(agreement_number, terms, None);
        let changes = ChangeSet::from(vec![
            Mutation::AddAgreement(agreement.clone()),
            Mutation::UpdateNumberingSeries(series),
        ]);

        info!(
            org_id = %self.ledger.organization.id,
            agreement_id = %agreement.id,
            agreement_number = %agreement.agreement_number,
            property_id = %agreement.property_id,
            "Agreement created"
        );

        let documents = self.offer_documents(&agreement, None, confirm);
        Ok(TransitionOutcome {
            agreement,
            previous: None,
            changes,
            documents,
        })
    }

    pub fn renew(
        &self,
        existing: &RentalAgreement,
        terms: RenewalTerms,
        confirm: &dyn ConfirmGeneration,
    ) -> EngineResult<TransitionOutcome> {
        if !matches!(
            existing.status,
            AgreementStatus::Active | AgreementStatus::Expired
        ) {
            return Err(EngineError::Precondition(format!(
                "Agreement {} is {} and cannot be renewed.",
                existing.agreement_number,
                existing.status.as_str()
            )));
        }

        let open_invoices = self.view.open_invoices_for(existing.id);
        if !open_invoices.is_empty() {
            warn!(
                agreement_id = %existing.id,
                open_invoices = open_invoices.len(),
                "Renewal blocked by open invoices"
            );
            return Err(EngineError::Precondition(format!(
                "Cannot renew agreement {}: {} open invoice(s). Please ensure all invoices are fully paid before renewing.",
                existing.agreement_number,
                open_invoices.len()
            )));
        }

        let terms = terms.merge_onto(existing);
        self.validate_terms(&terms)?;
        self.ensure_property_free(terms.property_id, Some(existing.id))?;

        let (agreement_number, series) = numbering::allocate(
            SeriesKind::Agreement,
            self.ledger.series(SeriesKind::Agreement),
            self.ledger.agreement_numbers(),
        )?;

        let previous = RentalAgreement {
            status: AgreementStatus::Renewed,
            updated_at: self.now,
            ..existing.clone()
        };
        let renewed = self.build_agreement(agreement_number, terms, Some(existing.id));

        let mut changes = ChangeSet::new();
        changes.push(Mutation::UpdateAgreement(previous.clone()));
        for template in recurring::deactivate(&self.ledger.templates, existing.id) {
            changes.push(Mutation::UpdateRecurringTemplate(template));
        }
        changes.push(Mutation::AddAgreement(renewed.clone()));
        changes.push(Mutation::UpdateNumberingSeries(series));

        info!(
            org_id = %self.ledger.organization.id,
            previous_agreement_id = %existing.id,
            agreement_id = %renewed.id,
            agreement_number = %renewed.agreement_number,
            "Agreement renewed"
        );

        let documents = self.offer_documents(&renewed, Some(existing), confirm);
        Ok(TransitionOutcome {
            agreement: renewed,
            previous: Some(previous),
            changes,
            documents,
        })
    }

    pub fn terminate(&self, agreement: &RentalAgreement) -> EngineResult<TransitionOutcome> {
        if !agreement.is_active() {
            return Err(EngineError::Precondition(format!(
                "Only active agreements can be terminated; {} is {}.",
                agreement.agreement_number,
                agreement.status.as_str()
            )));
        }

        let terminated = RentalAgreement {
            status: AgreementStatus::Terminated,
            updated_at: self.now,
            ..agreement.clone()
        };
        let mut changes = ChangeSet::new();
        changes.push(Mutation::UpdateAgreement(terminated.clone()));
        for template in recurring::deactivate(&self.ledger.templates, agreement.id) {
            changes.push(Mutation::UpdateRecurringTemplate(template));
        }

        info!(
            org_id = %self.ledger.organization.id,
            agreement_id = %agreement.id,
            "Agreement terminated"
        );

        Ok(TransitionOutcome {
            agreement: terminated,
            previous: None,
            changes,
            documents: DocumentsOutcome::NotApplicable,
        })
    }

    /// Direct edit. Notes are always editable; commercial terms only until the
    /// first invoice exists. The one status change allowed here is the manual
    /// correction of an active agreement to RENEWED.
    pub fn update(
        &self,
        agreement: &RentalAgreement,
        patch: AgreementPatch,
    ) -> EngineResult<TransitionOutcome> {
        if patch.is_empty() {
            return Err(EngineError::Validation(
                "No changes were submitted.".to_string(),
            ));
        }

        let next_status = match patch.status {
            None => agreement.status,
            Some(status) if status == agreement.status => status,
            Some(AgreementStatus::Renewed) if agreement.is_active() => AgreementStatus::Renewed,
            Some(status) => {
                return Err(EngineError::Precondition(format!(
                    "Status cannot be changed from {} to {} directly; use the renew or terminate operations.",
                    agreement.status.as_str(),
                    status.as_str()
                )))
            }
        };

        if patch.touches_commercial_terms() {
            if !agreement.is_active() {
                return Err(EngineError::Precondition(format!(
                    "Agreement {} is {}; only active agreements can be edited.",
                    agreement.agreement_number,
                    agreement.status.as_str()
                )));
            }
            if self.view.has_any_invoices(agreement.id) {
                return Err(EngineError::Precondition(format!(
                    "Agreement {} already has invoices; its terms can only change through renewal.",
                    agreement.agreement_number
                )));
            }
        }

        let terms = patch.merge_onto(agreement);
        self.validate_terms(&terms)?;
        if terms.property_id != agreement.property_id && next_status == AgreementStatus::Active {
            self.ensure_property_free(terms.property_id, Some(agreement.id))?;
        }

        let owner_id = if terms.property_id == agreement.property_id {
            agreement.owner_id
        } else {
            self.ledger
                .property(terms.property_id)
                .and_then(|property| property.owner_id)
        };
        let updated = RentalAgreement {
            tenant_id: terms.tenant_id,
            property_id: terms.property_id,
            owner_id,
            start_date: terms.start_date,
            end_date: terms.end_date,
            monthly_rent: round2(terms.monthly_rent),
            rent_due_day: terms.rent_due_day,
            security_deposit: round2(terms.security_deposit),
            broker_id: terms.broker_id,
            broker_fee: terms.broker_fee.map(round2),
            notes: terms.notes,
            status: next_status,
            updated_at: self.now,
            ..agreement.clone()
        };

        let mut changes = ChangeSet::new();
        changes.push(Mutation::UpdateAgreement(updated.clone()));
        if next_status != AgreementStatus::Active {
            for template in recurring::deactivate(&self.ledger.templates, agreement.id) {
                changes.push(Mutation::UpdateRecurringTemplate(template));
            }
        }

        Ok(TransitionOutcome {
            agreement: updated,
            previous: None,
            changes,
            documents: DocumentsOutcome::NotApplicable,
        })
    }

    /// Administrative delete, refused once any invoice references the agreement.
    pub fn delete(&self, agreement: &RentalAgreement) -> EngineResult<ChangeSet> {
        if self.view.has_any_invoices(agreement.id) {
            return Err(EngineError::Precondition(format!(
                "Agreement {} has invoices and cannot be deleted.",
                agreement.agreement_number
            )));
        }
        let mut changes = ChangeSet::new();
        for template in recurring::deactivate(&self.ledger.templates, agreement.id) {
            changes.push(Mutation::UpdateRecurringTemplate(template));
        }
        changes.push(Mutation::DeleteAgreement { id: agreement.id });
        Ok(changes)
    }

    /// Documents for an agreement whose transition committed without them.
    /// Safe to repeat: already-billed deposits and rent months are skipped.
    pub fn generate_documents(
        &self,
        agreement: &RentalAgreement,
    ) -> EngineResult<GeneratedDocuments> {
        if !agreement.is_active() {
            return Err(EngineError::Precondition(format!(
                "Agreement {} is {}; documents are only generated for active agreements.",
                agreement.agreement_number,
                agreement.status.as_str()
            )));
        }
        let previous = self.view.predecessor_of(agreement);
        self.build_documents(agreement, previous)
    }

    fn offer_documents(
        &self,
        agreement: &RentalAgreement,
        previous: Option<&RentalAgreement>,
        confirm: &dyn ConfirmGeneration,
    ) -> DocumentsOutcome {
        let deposit_to_bill = match previous {
            Some(previous) => (agreement.security_deposit - previous.security_deposit).max(0.0),
            None => agreement.security_deposit,
        };
        let prompt = GenerationPrompt {
            agreement_id: agreement.id,
            agreement_number: agreement.agreement_number.clone(),
            renewal: previous.is_some(),
            deposit_to_bill: round2(deposit_to_bill),
            monthly_rent: agreement.monthly_rent,
        };
        if !confirm.confirm(&prompt) {
            return DocumentsOutcome::Declined;
        }

        match self.build_documents(agreement, previous) {
            Ok(documents) => DocumentsOutcome::Generated(documents),
            Err(error) => {
                warn!(
                    agreement_id = %agreement.id,
                    error = %error,
                    "Document generation failed after a committed transition"
                );
                DocumentsOutcome::failed(&error)
            }
        }
    }

    fn build_documents(
        &self,
        agreement: &RentalAgreement,
        previous: Option<&RentalAgreement>,
    ) -> EngineResult<GeneratedDocuments> {
        let generator = InvoiceGenerator::new(self.ledger, self.deposit_tolerance);
        let generated = match previous {
            Some(previous) => generator.generate_renewal_invoices(previous, agreement)?,
            None => generator.generate_initial_invoices(agreement)?,
        };

        let template = if agreement.monthly_rent > 0.0
            && self.view.active_templates_for(agreement.id).is_empty()
        {
            let building_id = self
                .ledger
                .property(agreement.property_id)
                .and_then(|property| property.building_id);
            let category_id = resolve_category(&self.ledger.categories, CategoryRole::RentalIncome)
                .ok()
                .map(|category| category.id);
            Some(recurring::create_template(
                agreement,
                agreement.start_date,
                building_id,
                category_id,
            ))
        } else {
            None
        };

        let invoices = generated.invoices.clone();
        let skipped = generated.skipped.clone();
        let mut changes = generated.into_changes();
        if let Some(template) = &template {
            changes.push(Mutation::AddRecurringTemplate(template.clone()));
        }

        info!(
            agreement_id = %agreement.id,
            invoices = invoices.len(),
            skipped = skipped.len(),
            template = template.is_some(),
            "Agreement documents generated"
        );

        Ok(GeneratedDocuments {
            invoices,
            template,
            skipped,
            changes,
        })
    }

    fn build_agreement(
        &self,
        agreement_number: String,
        terms: AgreementTerms,
        previous_agreement_id: Option<Uuid>,
    ) -> RentalAgreement {
        let owner_id = self
            .ledger
            .property(terms.property_id)
            .and_then(|property| property.owner_id);
        RentalAgreement {
            id: Uuid::new_v4(),
            agreement_number,
            tenant_id: terms.tenant_id,
            property_id: terms.property_id,
            owner_id,
            start_date: terms.start_date,
            end_date: terms.end_date,
            monthly_rent: round2(terms.monthly_rent),
            rent_due_day: terms.rent_due_day,
            security_deposit: round2(terms.security_deposit),
            broker_id: terms.broker_id,
            broker_fee: terms.broker_fee.map(round2),
            notes: terms.notes,
            status: AgreementStatus::Active,
            previous_agreement_id,
            created_at: self.now,
            updated_at: self.now,
        }
    }

    fn ensure_property_free(&self, property_id: Uuid, excluding: Option<Uuid>) -> EngineResult<()> {
        if let Some(occupant) = self.view.occupying_agreement(property_id, excluding) {
            let property_name = self
                .ledger
                .property(property_id)
                .map(|property| property.name.as_str())
                .unwrap_or("the property");
            warn!(
                property_id = %property_id,
                occupant = %occupant.id,
                "Property already occupied"
            );
            return Err(EngineError::Precondition(format!(
                "{property_name} is already occupied by active agreement {}.",
                occupant.agreement_number
            )));
        }
        Ok(())
    }

    fn validate_terms(&self, terms: &AgreementTerms) -> EngineResult<()> {
        if self.ledger.contact(terms.tenant_id).is_none() {
            return Err(EngineError::Validation(format!(
                "Tenant {} is not a known contact.",
                terms.tenant_id
            )));
        }
        if self.ledger.property(terms.property_id).is_none() {
            return Err(EngineError::Validation(format!(
                "Property {} does not exist.",
                terms.property_id
            )));
        }
        if terms.end_date < terms.start_date {
            return Err(EngineError::Validation(
                "End date must be on or after the start date.".to_string(),
            ));
        }
        if !terms.monthly_rent.is_finite() || terms.monthly_rent <= 0.0 {
            return Err(EngineError::Validation(
                "Monthly rent must be greater than zero.".to_string(),
            ));
        }
        if !terms.security_deposit.is_finite() || terms.security_deposit < 0.0 {
            return Err(EngineError::Validation(
                "Security deposit cannot be negative.".to_string(),
            ));
        }
        if !(1..=31).contains(&terms.rent_due_day) {
            return Err(EngineError::Validation(
                "Rent due day must be between 1 and 31.".to_string(),
            ));
        }
        match (terms.broker_id, terms.broker_fee) {
            (None, Some(fee)) if fee > 0.0 => {
                return Err(EngineError::Validation(
                    "A broker fee requires a broker.".to_string(),
                ))
            }
            (_, Some(fee)) if !fee.is_finite() || fee < 0.0 => {
                return Err(EngineError::Validation(
                    "Broker fee cannot be negative.".to_string(),
                ))
            }
            (Some(broker_id), _) if self.ledger.contact(broker_id).is_none() => {
                return Err(EngineError::Validation(format!(
                    "Broker {broker_id} is not a known contact."
                )))
            }
            _ => {}
        }
        Ok(())
    }
}
