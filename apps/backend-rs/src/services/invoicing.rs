use chrono::{Datelike, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::{EngineError, EngineResult},
    models::{
        Category, CategoryRole, Invoice, InvoiceStatus, InvoiceType, NumberingSeries,
        RentalAgreement, SeriesKind, TenantLedger,
    },
    services::{
        agreement_view::AgreementView,
        calendar::{clamp_day, month_key, month_label},
        changes::{ChangeSet, Mutation},
        numbering::SeriesAllocator,
    },
};

/// A document the generator deliberately did not issue because an equivalent
/// one already exists.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkippedDocument {
    DepositAlreadyBilled {
        agreement_id: Uuid,
        requested: f64,
        already_billed: f64,
    },
    RentAlreadyBilled {
        agreement_id: Uuid,
        rental_month: String,
        invoice_number: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GeneratedInvoices {
    pub invoices: Vec<Invoice>,
    pub skipped: Vec<SkippedDocument>,
    /// Invoice series advanced past the numbers used, when any were used.
    pub series: Option<NumberingSeries>,
}

impl GeneratedInvoices {
    pub fn into_changes(self) -> ChangeSet {
        let mut changes = ChangeSet::new();
        for invoice in self.invoices {
            changes.push(Mutation::AddInvoice(invoice));
        }
        if let Some(series) = self.series {
            changes.push(Mutation::UpdateNumberingSeries(series));
        }
        changes
    }
}

struct DepositRequest {
    amount: f64,
    description: String,
}

/// Produces security-deposit and first-rent invoices for one agreement.
///
/// A single call is all-or-nothing: required categories and the invoice series
/// are resolved before any number is handed out, and numbers are drawn in the
/// fixed order deposit, then rent.
pub struct InvoiceGenerator<'a> {
    ledger: &'a TenantLedger,
    view: AgreementView<'a>,
    deposit_tolerance: f64,
}

impl<'a> InvoiceGenerator<'a> {
    pub fn new(ledger: &'a TenantLedger, deposit_tolerance: f64) -> Self {
        Self {
            ledger,
            view: AgreementView::new(ledger),
            deposit_tolerance,
        }
    }

    pub fn generate_initial_invoices(
        &self,
        agreement: &RentalAgreement,
    ) -> EngineResult<GeneratedInvoices> {
        let deposit = (agreement.security_deposit > 0.0).then(|| DepositRequest {
            amount: round2(agreement.security_deposit),
            description: format!(
                "Security deposit for agreement {}",
                agreement.agreement_number
            ),
        });
        self.generate(agreement, deposit)
    }

    /// Bills only the deposit increase over `previous`; a lower or equal
    /// deposit produces no deposit invoice.
    pub fn generate_renewal_invoices(
        &self,
        previous: &RentalAgreement,
        renewed: &RentalAgreement,
    ) -> EngineResult<GeneratedInvoices> {
        let increment = round2((renewed.security_deposit - previous.security_deposit).max(0.0));
        let deposit = (increment > 0.0).then(|| DepositRequest {
            amount: increment,
            description: format!(
                "Incremental security deposit for agreement {} (renewal of {})",
                renewed.agreement_number, previous.agreement_number
            ),
        });
        self.generate(renewed, deposit)
    }

    fn generate(
        &self,
        agreement: &RentalAgreement,
        deposit: Option<DepositRequest>,
    ) -> EngineResult<GeneratedInvoices> {
        let mut skipped = Vec::new();

        let deposit = deposit.and_then(|request| {
            let already_billed = self.view.billed_deposit(agreement.id);
            if deposit_already_billed(already_billed, request.amount, self.deposit_tolerance) {
                skipped.push(SkippedDocument::DepositAlreadyBilled {
                    agreement_id: agreement.id,
                    requested: request.amount,
                    already_billed,
                });
                None
            } else {
                Some(request)
            }
        });

        let rental_month = month_key(agreement.start_date);
        let bill_rent = if agreement.monthly_rent > 0.0 {
            match self.view.rent_invoice_for_month(agreement.id, &rental_month) {
                Some(existing) => {
                    skipped.push(SkippedDocument::RentAlreadyBilled {
                        agreement_id: agreement.id,
                        rental_month: rental_month.clone(),
                        invoice_number: existing.invoice_number.clone(),
                    });
                    false
                }
                None => true,
            }
        } else {
            false
        };

        let deposit_category = match deposit {
            Some(_) => Some(resolve_category(
                &self.ledger.categories,
                CategoryRole::SecurityDeposit,
            )?),
            None => None,
        };
        let rent_category = if bill_rent {
            Some(resolve_category(
                &self.ledger.categories,
                CategoryRole::RentalIncome,
            )?)
        } else {
            None
        };

        if deposit.is_none() && !bill_rent {
            return Ok(GeneratedInvoices {
                invoices: Vec::new(),
                skipped,
                series: None,
            });
        }

        let mut allocator = SeriesAllocator::new(
            SeriesKind::Invoice,
            self.ledger.series(SeriesKind::Invoice),
            self.ledger.invoice_numbers(),
        )?;
        let building_id = self
            .ledger
            .property(agreement.property_id)
            .and_then(|property| property.building_id);
        let mut invoices = Vec::with_capacity(2);

        if let (Some(request), Some(category)) = (deposit, deposit_category) {
            invoices.push(Invoice {
                id: Uuid::new_v4(),
                invoice_number: allocator.next_number()?,
                contact_id: agreement.tenant_id,
                amount: request.amount,
                paid_amount: 0.0,
                status: InvoiceStatus::Unpaid,
                issue_date: agreement.start_date,
                due_date: agreement.start_date,
                invoice_type: InvoiceType::SecurityDeposit,
                category_id: category.id,
                property_id: agreement.property_id,
                building_id,
                agreement_id: Some(agreement.id),
                rental_month: None,
                description: request.description,
                created_at: Utc::now(),
            });
        }

        if let Some(category) = rent_category {
            invoices.push(Invoice {
                id: Uuid::new_v4(),
                invoice_number: allocator.next_number()?,
                contact_id: agreement.tenant_id,
                amount: round2(agreement.monthly_rent),
                paid_amount: 0.0,
                status: InvoiceStatus::Unpaid,
                issue_date: agreement.start_date,
                due_date: rent_due_date(agreement),
                invoice_type: InvoiceType::Rental,
                category_id: category.id,
                property_id: agreement.property_id,
                building_id,
                agreement_id: Some(agreement.id),
                rental_month: Some(rental_month),
                description: format!("Rent for {}", month_label(agreement.start_date)),
                created_at: Utc::now(),
            });
        }

        Ok(GeneratedInvoices {
            invoices,
            skipped,
            series: Some(allocator.series().clone()),
        })
    }
}

/// Resolves the category playing `role`, falling back to the legacy display
/// name for categories registered without one.
pub fn resolve_category(categories: &[Category], role: CategoryRole) -> EngineResult<&Category> {
    categories
        .iter()
        .find(|category| category.role == Some(role))
        .or_else(|| {
            categories.iter().find(|category| {
                category.role.is_none() && category.name.trim() == role.legacy_name()
            })
        })
        .ok_or_else(|| {
            EngineError::Configuration(format!(
                "Required category \"{}\" is not configured. Create it before generating invoices.",
                role.legacy_name()
            ))
        })
}

fn deposit_already_billed(already_billed: f64, requested: f64, tolerance: f64) -> bool {
    already_billed > 0.0 && already_billed >= requested * (1.0 - tolerance)
}

/// Rent-due day within the start month, never before the lease begins.
fn rent_due_date(agreement: &RentalAgreement) -> NaiveDate {
    let start = agreement.start_date;
    clamp_day(start.year(), start.month(), agreement.rent_due_day).max(start)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
