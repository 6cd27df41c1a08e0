use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::{
    error::{EngineError, EngineResult},
    models::{InvoiceType, RecurringChargeTemplate, RentalAgreement},
    services::calendar::{add_months, month_label, next_month_on_day},
};

pub const RENT_DESCRIPTION_TEMPLATE: &str = "Rent for {Month}";
const MONTH_PLACEHOLDER: &str = "{Month}";

/// Monthly rent template for `agreement`, first due one calendar month after
/// `start_date`.
pub fn create_template(
    agreement: &RentalAgreement,
    start_date: NaiveDate,
    building_id: Option<Uuid>,
    category_id: Option<Uuid>,
) -> RecurringChargeTemplate {
    RecurringChargeTemplate {
        id: Uuid::new_v4(),
        agreement_id: agreement.id,
        contact_id: agreement.tenant_id,
        property_id: agreement.property_id,
        building_id,
        category_id,
        amount: agreement.monthly_rent,
        description_template: RENT_DESCRIPTION_TEMPLATE.to_string(),
        day_of_month: agreement.rent_due_day,
        next_due_date: add_months(start_date, 1),
        active: true,
        invoice_type: InvoiceType::Rental,
        created_at: Utc::now(),
    }
}

/// Deactivated copies of every active template tied to `agreement_id`.
/// Rows are never removed so the billing history stays auditable.
pub fn deactivate(
    templates: &[RecurringChargeTemplate],
    agreement_id: Uuid,
) -> Vec<RecurringChargeTemplate> {
    templates
        .iter()
        .filter(|template| template.active && template.agreement_id == agreement_id)
        .map(|template| RecurringChargeTemplate {
            active: false,
            ..template.clone()
        })
        .collect()
}

/// Moves the template to its next due date, landing on `day_of_month`.
pub fn advance(template: &RecurringChargeTemplate) -> EngineResult<RecurringChargeTemplate> {
    if !template.active {
        return Err(EngineError::Precondition(
            "Recurring template is inactive and cannot be advanced.".to_string(),
        ));
    }
    Ok(RecurringChargeTemplate {
        next_due_date: next_month_on_day(template.next_due_date, template.day_of_month),
        ..template.clone()
    })
}

pub fn render_description(template: &RecurringChargeTemplate, billed_on: NaiveDate) -> String {
    template
        .description_template
        .replace(MONTH_PLACEHOLDER, &month_label(billed_on))
}
