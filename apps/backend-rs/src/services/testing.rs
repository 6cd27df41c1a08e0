//! Builders shared by the engine's unit tests.

use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::models::{
    AgreementStatus, Category, CategoryRole, Contact, ContactKind, Invoice, InvoiceStatus,
    InvoiceType, NumberingSeries, Organization, Property, RecurringChargeTemplate,
    RentalAgreement, SeriesKind, TenantLedger,
};

pub fn date(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid test date")
}

pub fn agreement(start_date: NaiveDate, end_date: NaiveDate) -> RentalAgreement {
    RentalAgreement {
        id: Uuid::new_v4(),
        agreement_number: "AGR-0001".to_string(),
        tenant_id: Uuid::new_v4(),
        property_id: Uuid::new_v4(),
        owner_id: None,
        start_date,
        end_date,
        monthly_rent: 30_000.0,
        rent_due_day: 1,
        security_deposit: 60_000.0,
        broker_id: None,
        broker_fee: None,
        notes: None,
        status: AgreementStatus::Active,
        previous_agreement_id: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub struct LedgerFixture {
    ledger: TenantLedger,
    tenant_id: Uuid,
}

impl LedgerFixture {
    pub fn new() -> Self {
        let mut ledger = TenantLedger::new(Organization {
            id: Uuid::new_v4(),
            name: "Test Org".to_string(),
            timezone: "America/Asuncion".to_string(),
            created_at: Utc::now(),
        });
        let tenant_id = Uuid::new_v4();
        ledger.contacts.push(Contact {
            id: tenant_id,
            name: "Ana Tenant".to_string(),
            kind: ContactKind::Tenant,
            email: None,
            phone_e164: None,
        });
        Self { ledger, tenant_id }
    }

    /// Ledger with both numbering series and both billing categories.
    pub fn with_defaults() -> Self {
        let mut fixture = Self::new();
        fixture.default_series();
        fixture.category("Security Deposit", Some(CategoryRole::SecurityDeposit));
        fixture.category("Rental Income", Some(CategoryRole::RentalIncome));
        fixture
    }

    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    pub fn default_series(&mut self) {
        self.series(SeriesKind::Invoice, "INV-", 5, 1);
        self.series(SeriesKind::Agreement, "AGR-", 4, 1);
    }

    pub fn series(&mut self, kind: SeriesKind, prefix: &str, padding: usize, next_number: u64) {
        self.ledger.series.retain(|item| item.kind != kind);
        self.ledger.series.push(NumberingSeries {
            kind,
            prefix: prefix.to_string(),
            padding,
            next_number,
        });
    }

    pub fn category(&mut self, name: &str, role: Option<CategoryRole>) -> Uuid {
        let id = Uuid::new_v4();
        self.ledger.categories.push(Category {
            id,
            name: name.to_string(),
            role,
        });
        id
    }

    pub fn property(&mut self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.ledger.properties.push(Property {
            id,
            name: name.to_string(),
            owner_id: Some(Uuid::new_v4()),
            building_id: None,
        });
        id
    }

    pub fn active_agreement(&mut self, property_id: Uuid) -> Uuid {
        let mut record = agreement(date("2026-01-01"), date("2026-12-31"));
        record.tenant_id = self.tenant_id;
        record.property_id = property_id;
        record.agreement_number = format!("AGR-{:04}", self.ledger.agreements.len() + 1);
        let id = record.id;
        self.ledger.agreements.push(record);
        id
    }

    pub fn set_status(&mut self, agreement_id: Uuid, status: AgreementStatus) {
        self.update_agreement(agreement_id, |lease| lease.status = status);
    }

    pub fn update_agreement<F>(&mut self, agreement_id: Uuid, update: F)
    where
        F: FnOnce(&mut RentalAgreement),
    {
        if let Some(lease) = self
            .ledger
            .agreements
            .iter_mut()
            .find(|lease| lease.id == agreement_id)
        {
            update(lease);
        }
    }

    pub fn rent_invoice(
        &mut self,
        agreement_id: Uuid,
        rental_month: &str,
        status: InvoiceStatus,
    ) -> Uuid {
        let lease = self
            .ledger
            .agreement(agreement_id)
            .cloned()
            .expect("agreement exists");
        let id = Uuid::new_v4();
        let paid_amount = match status {
            InvoiceStatus::Paid => lease.monthly_rent,
            InvoiceStatus::PartiallyPaid => lease.monthly_rent / 2.0,
            InvoiceStatus::Unpaid => 0.0,
        };
        self.ledger.invoices.push(Invoice {
            id,
            invoice_number: format!("INV-{:05}", self.ledger.invoices.len() + 1),
            contact_id: lease.tenant_id,
            amount: lease.monthly_rent,
            paid_amount,
            status,
            issue_date: lease.start_date,
            due_date: lease.start_date,
            invoice_type: InvoiceType::Rental,
            category_id: Uuid::new_v4(),
            property_id: lease.property_id,
            building_id: None,
            agreement_id: Some(agreement_id),
            rental_month: Some(rental_month.to_string()),
            description: format!("Rent for {rental_month}"),
            created_at: Utc::now(),
        });
        id
    }

    pub fn push_invoice(&mut self, invoice: Invoice) {
        self.ledger.invoices.push(invoice);
    }

    pub fn push_template(&mut self, template: RecurringChargeTemplate) {
        self.ledger.templates.push(template);
    }

    pub fn ledger(&self) -> TenantLedger {
        self.ledger.clone()
    }
}
