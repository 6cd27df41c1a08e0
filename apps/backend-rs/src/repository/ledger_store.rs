use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::{AppError, AppResult},
    models::{AgreementStatus, NumberingSeries, Organization, SeriesKind, TenantLedger},
    services::changes::{ChangeSet, Mutation},
};

pub type SharedLedger = Arc<Mutex<TenantLedger>>;

/// Per-organization ledgers. Holding an organization's mutex across
/// read, compute, and apply serializes every lifecycle operation and number
/// allocation inside that organization.
#[derive(Default)]
pub struct LedgerStore {
    ledgers: RwLock<HashMap<Uuid, SharedLedger>>,
}

impl LedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_organization(
        &self,
        name: &str,
        timezone: &str,
        config: &AppConfig,
    ) -> Organization {
        let organization = Organization {
            id: Uuid::new_v4(),
            name: name.trim().to_string(),
            timezone: timezone.to_string(),
            created_at: Utc::now(),
        };
        let mut ledger = TenantLedger::new(organization.clone());
        if config.seed_default_numbering {
            ledger.series.push(NumberingSeries {
                kind: SeriesKind::Invoice,
                prefix: config.invoice_number_prefix.clone(),
                padding: config.invoice_number_padding,
                next_number: 1,
            });
            ledger.series.push(NumberingSeries {
                kind: SeriesKind::Agreement,
                prefix: config.agreement_number_prefix.clone(),
                padding: config.agreement_number_padding,
                next_number: 1,
            });
        }

        self.ledgers
            .write()
            .await
            .insert(organization.id, Arc::new(Mutex::new(ledger)));
        tracing::info!(org_id = %organization.id, "Organization created");
        organization
    }

    pub async fn ledger(&self, org_id: Uuid) -> AppResult<SharedLedger> {
        self.ledgers
            .read()
            .await
            .get(&org_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Organization {org_id} was not found.")))
    }

    pub async fn organization_ids(&self) -> Vec<Uuid> {
        self.ledgers.read().await.keys().copied().collect()
    }
}

impl TenantLedger {
    /// Commits `changes` as a unit. The batch is staged on a copy and only
    /// swapped in once every mutation applied and the ledger's uniqueness
    /// rules still hold.
    pub fn apply(&mut self, changes: &ChangeSet) -> AppResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut staged = self.clone();
        for mutation in changes {
            staged.apply_one(mutation)?;
        }
        staged.check_constraints()?;
        *self = staged;
        Ok(())
    }

    fn apply_one(&mut self, mutation: &Mutation) -> AppResult<()> {
        match mutation {
            Mutation::AddAgreement(agreement) => {
                if self.agreement(agreement.id).is_some() {
                    return Err(AppError::Conflict(format!(
                        "Agreement {} already exists.",
                        agreement.id
                    )));
                }
                self.agreements.push(agreement.clone());
            }
            Mutation::UpdateAgreement(agreement) => {
                let slot = self
                    .agreements
                    .iter_mut()
                    .find(|item| item.id == agreement.id)
                    .ok_or_else(|| missing("Agreement", agreement.id))?;
                *slot = agreement.clone();
            }
            Mutation::DeleteAgreement { id } => {
                let before = self.agreements.len();
                self.agreements.retain(|item| item.id != *id);
                if self.agreements.len() == before {
                    return Err(missing("Agreement", *id));
                }
            }
            Mutation::AddInvoice(invoice) => {
                if self.invoice(invoice.id).is_some() {
                    return Err(AppError::Conflict(format!(
                        "Invoice {} already exists.",
                        invoice.id
                    )));
                }
                self.invoices.push(invoice.clone());
            }
            Mutation::UpdateInvoice(invoice) => {
                let slot = self
                    .invoices
                    .iter_mut()
                    .find(|item| item.id == invoice.id)
                    .ok_or_else(|| missing("Invoice", invoice.id))?;
                *slot = invoice.clone();
            }
            Mutation::AddRecurringTemplate(template) => {
                if self.template(template.id).is_some() {
                    return Err(AppError::Conflict(format!(
                        "Recurring template {} already exists.",
                        template.id
                    )));
                }
                self.templates.push(template.clone());
            }
            Mutation::UpdateRecurringTemplate(template) => {
                let slot = self
                    .templates
                    .iter_mut()
                    .find(|item| item.id == template.id)
                    .ok_or_else(|| missing("Recurring template", template.id))?;
                *slot = template.clone();
            }
            Mutation::UpdateNumberingSeries(series) => {
                match self.series.iter_mut().find(|item| item.kind == series.kind) {
                    Some(slot) => *slot = series.clone(),
                    None => self.series.push(series.clone()),
                }
            }
        }
        Ok(())
    }

    fn check_constraints(&self) -> AppResult<()> {
        let mut agreement_numbers = std::collections::HashSet::new();
        let mut occupied = HashMap::new();
        for agreement in &self.agreements {
            if !agreement_numbers.insert(agreement.agreement_number.as_str()) {
                return Err(AppError::Conflict(format!(
                    "Agreement number {} is already in use.",
                    agreement.agreement_number
                )));
            }
            if agreement.status == AgreementStatus::Active
                && occupied.insert(agreement.property_id, agreement.id).is_some()
            {
                return Err(AppError::Conflict(format!(
                    "Property {} already has an active agreement.",
                    agreement.property_id
                )));
            }
        }

        let mut invoice_numbers = std::collections::HashSet::new();
        for invoice in &self.invoices {
            if !invoice_numbers.insert(invoice.invoice_number.as_str()) {
                return Err(AppError::Conflict(format!(
                    "Invoice number {} is already in use.",
                    invoice.invoice_number
                )));
            }
        }

        let mut templated = std::collections::HashSet::new();
        for template in self.templates.iter().filter(|template| template.active) {
            if !templated.insert(template.agreement_id) {
                return Err(AppError::Conflict(format!(
                    "Agreement {} already has an active recurring template.",
                    template.agreement_id
                )));
            }
        }
        Ok(())
    }
}

fn missing(entity: &str, id: Uuid) -> AppError {
    AppError::NotFound(format!("{entity} {id} was not found."))
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::LedgerStore;
    use crate::{
        config::AppConfig,
        error::AppError,
        models::{InvoiceStatus, SeriesKind},
        services::{
            changes::{ChangeSet, Mutation},
            recurring::create_template,
            testing::LedgerFixture,
        },
    };

    #[tokio::test]
    async fn seeds_numbering_for_new_organizations() {
        let store = LedgerStore::new();
        let organization = store
            .create_organization("  Acme Rentals ", "America/Asuncion", &AppConfig::default())
            .await;
        assert_eq!(organization.name, "Acme Rentals");

        let ledger = store.ledger(organization.id).await.expect("ledger");
        let ledger = ledger.lock().await;
        let invoice_series = ledger.series(SeriesKind::Invoice).expect("invoice series");
        assert_eq!(invoice_series.prefix, "INV-");
        assert_eq!(invoice_series.padding, 5);
        assert_eq!(store.organization_ids().await, vec![organization.id]);
    }

    #[tokio::test]
    async fn unknown_organization_is_not_found() {
        let store = LedgerStore::new();
        assert!(matches!(
            store.ledger(Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn rejects_batch_that_reuses_an_invoice_number() {
        let mut fixture = LedgerFixture::with_defaults();
        let property = fixture.property("Unit 1");
        let agreement_id = fixture.active_agreement(property);
        fixture.rent_invoice(agreement_id, "2026-01", InvoiceStatus::Paid);
        let mut ledger = fixture.ledger();

        let mut duplicate = ledger.invoices[0].clone();
        duplicate.id = Uuid::new_v4();
        let changes = ChangeSet::from(vec![Mutation::AddInvoice(duplicate)]);
        assert!(matches!(ledger.apply(&changes), Err(AppError::Conflict(_))));
        assert_eq!(ledger.invoices.len(), 1);
    }

    #[test]
    fn failed_batch_leaves_ledger_untouched() {
        let mut fixture = LedgerFixture::with_defaults();
        let property = fixture.property("Unit 1");
        let agreement_id = fixture.active_agreement(property);
        let mut ledger = fixture.ledger();
        let agreement = ledger.agreement(agreement_id).expect("agreement").clone();

        let first = create_template(&agreement, agreement.start_date, None, None);
        let second = create_template(&agreement, agreement.start_date, None, None);
        let changes = ChangeSet::from(vec![
            Mutation::AddRecurringTemplate(first),
            Mutation::AddRecurringTemplate(second),
        ]);
        assert!(matches!(ledger.apply(&changes), Err(AppError::Conflict(_))));
        assert!(ledger.templates.is_empty());
    }

    #[test]
    fn refuses_second_active_agreement_on_property() {
        let mut fixture = LedgerFixture::with_defaults();
        let property = fixture.property("Unit 1");
        let agreement_id = fixture.active_agreement(property);
        let mut ledger = fixture.ledger();

        let mut twin = ledger.agreement(agreement_id).expect("agreement").clone();
        twin.id = Uuid::new_v4();
        twin.agreement_number = "AGR-0099".to_string();
        let changes = ChangeSet::from(vec![Mutation::AddAgreement(twin)]);
        assert!(matches!(ledger.apply(&changes), Err(AppError::Conflict(_))));
    }

    #[test]
    fn updating_missing_record_is_not_found() {
        let mut ledger = LedgerFixture::with_defaults().ledger();
        let changes = ChangeSet::from(vec![Mutation::DeleteAgreement { id: Uuid::new_v4() }]);
        assert!(matches!(ledger.apply(&changes), Err(AppError::NotFound(_))));
    }
}
