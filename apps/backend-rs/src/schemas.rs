use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{AgreementStatus, CategoryRole, ContactKind, InvoiceStatus, SeriesKind},
    services::lifecycle::{AgreementPatch, AgreementTerms, RenewalTerms},
};

pub fn validate_input<T: Validate>(input: &T) -> AppResult<()> {
    input
        .validate()
        .map_err(|errors| AppError::UnprocessableEntity(format!("Validation failed: {errors}")))
}

pub fn parse_uuid(value: &str, field: &str) -> AppResult<Uuid> {
    Uuid::parse_str(value.trim())
        .map_err(|_| AppError::BadRequest(format!("{field} must be a valid UUID.")))
}

fn parse_optional_uuid(value: Option<&str>, field: &str) -> AppResult<Option<Uuid>> {
    match value.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => parse_uuid(value, field).map(Some),
        None => Ok(None),
    }
}

fn default_rent_due_day() -> u32 {
    1
}

fn default_next_number() -> u64 {
    1
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateOrganizationInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 64))]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct NumberingSeriesInput {
    #[validate(length(max = 20))]
    pub prefix: String,
    #[validate(range(min = 1, max = 12))]
    pub padding: usize,
    #[serde(default = "default_next_number")]
    #[validate(range(min = 1, max = 999_999_999_999u64))]
    pub next_number: u64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateCategoryInput {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub role: Option<CategoryRole>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreatePropertyInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub owner_id: Option<String>,
    pub building_id: Option<String>,
}

impl CreatePropertyInput {
    pub fn owner_uuid(&self) -> AppResult<Option<Uuid>> {
        parse_optional_uuid(self.owner_id.as_deref(), "owner_id")
    }

    pub fn building_uuid(&self) -> AppResult<Option<Uuid>> {
        parse_optional_uuid(self.building_id.as_deref(), "building_id")
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateContactInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub kind: ContactKind,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 4, max = 20))]
    pub phone_e164: Option<String>,
}

/// Numeric rules (positive rent, due day range, date order) are enforced by the
/// lifecycle controller so they surface as validation errors, not 422s.
#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateAgreementInput {
    pub tenant_id: String,
    pub property_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub monthly_rent: f64,
    #[serde(default = "default_rent_due_day")]
    pub rent_due_day: u32,
    #[serde(default)]
    pub security_deposit: f64,
    pub broker_id: Option<String>,
    pub broker_fee: Option<f64>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    /// Answer to "generate the deposit and first rent invoices now?".
    #[serde(default)]
    pub generate_invoices: bool,
}

impl CreateAgreementInput {
    pub fn into_terms(self) -> AppResult<AgreementTerms> {
        Ok(AgreementTerms {
            tenant_id: parse_uuid(&self.tenant_id, "tenant_id")?,
            property_id: parse_uuid(&self.property_id, "property_id")?,
            start_date: self.start_date,
            end_date: self.end_date,
            monthly_rent: self.monthly_rent,
            rent_due_day: self.rent_due_day,
            security_deposit: self.security_deposit,
            broker_id: parse_optional_uuid(self.broker_id.as_deref(), "broker_id")?,
            broker_fee: self.broker_fee,
            notes: non_empty(self.notes),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, serde::Serialize, Validate)]
pub struct RenewAgreementInput {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub monthly_rent: Option<f64>,
    pub rent_due_day: Option<u32>,
    pub security_deposit: Option<f64>,
    pub broker_id: Option<String>,
    pub broker_fee: Option<f64>,
    #[serde(default)]
    pub clear_broker: bool,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    #[serde(default)]
    pub generate_invoices: bool,
}

impl RenewAgreementInput {
    pub fn into_terms(self) -> AppResult<RenewalTerms> {
        Ok(RenewalTerms {
            start_date: self.start_date,
            end_date: self.end_date,
            monthly_rent: self.monthly_rent,
            rent_due_day: self.rent_due_day,
            security_deposit: self.security_deposit,
            broker_id: parse_optional_uuid(self.broker_id.as_deref(), "broker_id")?,
            broker_fee: self.broker_fee,
            clear_broker: self.clear_broker,
            notes: non_empty(self.notes),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, serde::Serialize, Validate)]
pub struct UpdateAgreementInput {
    pub tenant_id: Option<String>,
    pub property_id: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub monthly_rent: Option<f64>,
    pub rent_due_day: Option<u32>,
    pub security_deposit: Option<f64>,
    pub broker_id: Option<String>,
    pub broker_fee: Option<f64>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    pub status: Option<AgreementStatus>,
}

impl UpdateAgreementInput {
    pub fn into_patch(self) -> AppResult<AgreementPatch> {
        Ok(AgreementPatch {
            tenant_id: parse_optional_uuid(self.tenant_id.as_deref(), "tenant_id")?,
            property_id: parse_optional_uuid(self.property_id.as_deref(), "property_id")?,
            start_date: self.start_date,
            end_date: self.end_date,
            monthly_rent: self.monthly_rent,
            rent_due_day: self.rent_due_day,
            security_deposit: self.security_deposit,
            broker_id: parse_optional_uuid(self.broker_id.as_deref(), "broker_id")?,
            broker_fee: self.broker_fee,
            notes: non_empty(self.notes),
            status: self.status,
        })
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct RecordPaymentInput {
    #[validate(range(exclusive_min = 0.0))]
    pub amount: f64,
}

#[derive(Debug, Clone, Default, Deserialize, serde::Serialize)]
pub struct PropertiesQuery {
    pub available: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, serde::Serialize)]
pub struct AgreementsQuery {
    pub status: Option<AgreementStatus>,
    pub property_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, serde::Serialize)]
pub struct InvoicesQuery {
    pub agreement_id: Option<String>,
    pub status: Option<InvoiceStatus>,
}

impl InvoicesQuery {
    pub fn agreement_uuid(&self) -> AppResult<Option<Uuid>> {
        parse_optional_uuid(self.agreement_id.as_deref(), "agreement_id")
    }
}

impl AgreementsQuery {
    pub fn property_uuid(&self) -> AppResult<Option<Uuid>> {
        parse_optional_uuid(self.property_id.as_deref(), "property_id")
    }
}

#[derive(Debug, Clone, Default, Deserialize, serde::Serialize)]
pub struct TemplatesQuery {
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct OrgPath {
    pub org_id: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct SeriesPath {
    pub org_id: String,
    pub kind: SeriesKind,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct AgreementPath {
    pub org_id: String,
    pub agreement_id: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct InvoicePath {
    pub org_id: String,
    pub invoice_id: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct TemplatePath {
    pub org_id: String,
    pub template_id: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::{
        validate_input, CreateAgreementInput, CreateContactInput, NumberingSeriesInput,
        RenewAgreementInput, UpdateAgreementInput,
    };
    use crate::error::AppError;

    #[test]
    fn agreement_input_defaults_and_parses_ids() {
        let input: CreateAgreementInput = serde_json::from_value(serde_json::json!({
            "tenant_id": "7f1b0b36-5d7c-4c59-8d0e-0c8f5a3b2a10",
            "property_id": "0b5f6c1e-6f7e-4f0f-9a4b-2d1c3e4f5a6b",
            "start_date": "2026-01-01",
            "end_date": "2026-12-31",
            "monthly_rent": 30000.0,
            "notes": "   "
        }))
        .expect("deserializes");
        assert_eq!(input.rent_due_day, 1);
        assert!(!input.generate_invoices);

        let terms = input.into_terms().expect("valid ids");
        assert_eq!(terms.security_deposit, 0.0);
        assert!(terms.notes.is_none());
    }

    #[test]
    fn malformed_ids_are_bad_requests() {
        let input = RenewAgreementInput {
            broker_id: Some("not-a-uuid".to_string()),
            ..RenewAgreementInput::default()
        };
        assert!(matches!(input.into_terms(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn rejects_invalid_contact_email() {
        let input: CreateContactInput = serde_json::from_value(serde_json::json!({
            "name": "Ana",
            "kind": "tenant",
            "email": "not-an-email"
        }))
        .expect("deserializes");
        assert!(matches!(
            validate_input(&input),
            Err(AppError::UnprocessableEntity(_))
        ));
    }

    #[test]
    fn blank_notes_in_an_edit_are_dropped() {
        let input: UpdateAgreementInput = serde_json::from_value(serde_json::json!({
            "notes": "  ",
            "monthly_rent": 31000.0
        }))
        .expect("deserializes");
        let patch = input.into_patch().expect("valid patch");
        assert!(patch.notes.is_none());
        assert_eq!(patch.monthly_rent, Some(31000.0));
    }

    #[test]
    fn renewal_can_clear_the_broker() {
        let input: RenewAgreementInput =
            serde_json::from_value(serde_json::json!({ "clear_broker": true }))
                .expect("deserializes");
        assert!(input.into_terms().expect("valid terms").clear_broker);
        assert!(!RenewAgreementInput::default().clear_broker);
    }

    #[test]
    fn numbering_counter_is_capped() {
        let at_limit: NumberingSeriesInput = serde_json::from_value(serde_json::json!({
            "prefix": "INV-",
            "padding": 5,
            "next_number": 999_999_999_999u64
        }))
        .expect("deserializes");
        assert!(validate_input(&at_limit).is_ok());

        let overflowing: NumberingSeriesInput = serde_json::from_value(serde_json::json!({
            "prefix": "INV-",
            "padding": 5,
            "next_number": u64::MAX
        }))
        .expect("deserializes");
        assert!(matches!(
            validate_input(&overflowing),
            Err(AppError::UnprocessableEntity(_))
        ));
    }
}
