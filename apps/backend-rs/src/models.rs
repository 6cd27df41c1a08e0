use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgreementStatus {
    Active,
    Renewed,
    Terminated,
    Expired,
}

impl AgreementStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Renewed => "renewed",
            Self::Terminated => "terminated",
            Self::Expired => "expired",
        }
    }
}

/// Lease contract between a tenant contact and a property for a fixed term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentalAgreement {
    pub id: Uuid,
    pub agreement_number: String,
    pub tenant_id: Uuid,
    pub property_id: Uuid,
    /// Denormalized from the property at creation time.
    pub owner_id: Option<Uuid>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub monthly_rent: f64,
    /// Day of month rent falls due, 1..=31. Short months clamp to their last day.
    pub rent_due_day: u32,
    pub security_deposit: f64,
    pub broker_id: Option<Uuid>,
    pub broker_fee: Option<f64>,
    pub notes: Option<String>,
    pub status: AgreementStatus,
    pub previous_agreement_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RentalAgreement {
    pub fn is_active(&self) -> bool {
        self.status == AgreementStatus::Active
    }

    /// Status as consumers should see it on `today`, including agreements
    /// the expiry sweep has not reached yet.
    pub fn display_status(&self, today: NaiveDate) -> AgreementStatus {
        if self.status == AgreementStatus::Active && self.end_date < today {
            AgreementStatus::Expired
        } else {
            self.status
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Unpaid,
    PartiallyPaid,
    Paid,
}

impl InvoiceStatus {
    pub fn from_amounts(amount: f64, paid_amount: f64) -> Self {
        if paid_amount <= 0.0 {
            Self::Unpaid
        } else if paid_amount + 0.005 >= amount {
            Self::Paid
        } else {
            Self::PartiallyPaid
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceType {
    Rental,
    SecurityDeposit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub invoice_number: String,
    /// Paying tenant contact.
    pub contact_id: Uuid,
    pub amount: f64,
    pub paid_amount: f64,
    pub status: InvoiceStatus,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub invoice_type: InvoiceType,
    pub category_id: Uuid,
    pub property_id: Uuid,
    pub building_id: Option<Uuid>,
    pub agreement_id: Option<Uuid>,
    /// Billed calendar month (`YYYY-MM`), rental invoices only.
    pub rental_month: Option<String>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    pub fn is_open(&self) -> bool {
        self.status != InvoiceStatus::Paid
    }

    pub fn balance(&self) -> f64 {
        (self.amount - self.paid_amount).max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringChargeTemplate {
    pub id: Uuid,
    pub agreement_id: Uuid,
    pub contact_id: Uuid,
    pub property_id: Uuid,
    pub building_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub amount: f64,
    /// Contains a `{Month}` placeholder.
    pub description_template: String,
    pub day_of_month: u32,
    pub next_due_date: NaiveDate,
    pub active: bool,
    pub invoice_type: InvoiceType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesKind {
    Invoice,
    Agreement,
}

impl SeriesKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Invoice => "invoice",
            Self::Agreement => "agreement",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberingSeries {
    pub kind: SeriesKind,
    pub prefix: String,
    pub padding: usize,
    /// Stored next-candidate counter. May lag behind imported documents.
    pub next_number: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryRole {
    SecurityDeposit,
    RentalIncome,
}

impl CategoryRole {
    /// Display name matched for categories registered without a role.
    pub fn legacy_name(self) -> &'static str {
        match self {
            Self::SecurityDeposit => "Security Deposit",
            Self::RentalIncome => "Rental Income",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub role: Option<CategoryRole>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Option<Uuid>,
    pub building_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactKind {
    Tenant,
    Owner,
    Broker,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: Uuid,
    pub name: String,
    pub kind: ContactKind,
    pub email: Option<String>,
    pub phone_e164: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub timezone: String,
    pub created_at: DateTime<Utc>,
}

/// Everything the engine reads for one organization.
#[derive(Debug, Clone, Serialize)]
pub struct TenantLedger {
    pub organization: Organization,
    pub agreements: Vec<RentalAgreement>,
    pub invoices: Vec<Invoice>,
    pub templates: Vec<RecurringChargeTemplate>,
    pub series: Vec<NumberingSeries>,
    pub categories: Vec<Category>,
    pub properties: Vec<Property>,
    pub contacts: Vec<Contact>,
}

impl TenantLedger {
    pub fn new(organization: Organization) -> Self {
        Self {
            organization,
            agreements: Vec::new(),
            invoices: Vec::new(),
            templates: Vec::new(),
            series: Vec::new(),
            categories: Vec::new(),
            properties: Vec::new(),
            contacts: Vec::new(),
        }
    }

    pub fn agreement(&self, agreement_id: Uuid) -> Option<&RentalAgreement> {
        self.agreements.iter().find(|item| item.id == agreement_id)
    }

    pub fn invoice(&self, invoice_id: Uuid) -> Option<&Invoice> {
        self.invoices.iter().find(|item| item.id == invoice_id)
    }

    pub fn template(&self, template_id: Uuid) -> Option<&RecurringChargeTemplate> {
        self.templates.iter().find(|item| item.id == template_id)
    }

    pub fn property(&self, property_id: Uuid) -> Option<&Property> {
        self.properties.iter().find(|item| item.id == property_id)
    }

    pub fn contact(&self, contact_id: Uuid) -> Option<&Contact> {
        self.contacts.iter().find(|item| item.id == contact_id)
    }

    pub fn series(&self, kind: SeriesKind) -> Option<&NumberingSeries> {
        self.series.iter().find(|item| item.kind == kind)
    }

    pub fn invoice_numbers(&self) -> impl Iterator<Item = &str> {
        self.invoices.iter().map(|item| item.invoice_number.as_str())
    }

    pub fn agreement_numbers(&self) -> impl Iterator<Item = &str> {
        self.agreements
            .iter()
            .map(|item| item.agreement_number.as_str())
    }
}
