use uuid::Uuid;

use crate::models::{
    Invoice, InvoiceType, Property, RecurringChargeTemplate, RentalAgreement, TenantLedger,
};

/// Read-only questions the lifecycle rules ask of a tenant's collections.
#[derive(Debug, Clone, Copy)]
pub struct AgreementView<'a> {
    agreements: &'a [RentalAgreement],
    invoices: &'a [Invoice],
    templates: &'a [RecurringChargeTemplate],
}

impl<'a> AgreementView<'a> {
    pub fn new(ledger: &'a TenantLedger) -> Self {
        Self {
            agreements: &ledger.agreements,
            invoices: &ledger.invoices,
            templates: &ledger.templates,
        }
    }

    /// The ACTIVE agreement holding `property_id`, other than `excluding`.
    pub fn occupying_agreement(
        &self,
        property_id: Uuid,
        excluding: Option<Uuid>,
    ) -> Option<&'a RentalAgreement> {
        self.agreements.iter().find(|agreement| {
            agreement.property_id == property_id
                && agreement.is_active()
                && Some(agreement.id) != excluding
        })
    }

    pub fn is_property_occupied(&self, property_id: Uuid, excluding: Option<Uuid>) -> bool {
        self.occupying_agreement(property_id, excluding).is_some()
    }

    pub fn available_properties<'p>(&self, properties: &'p [Property]) -> Vec<&'p Property> {
        properties
            .iter()
            .filter(|property| !self.is_property_occupied(property.id, None))
            .collect()
    }

    pub fn invoices_for(&self, agreement_id: Uuid) -> impl Iterator<Item = &'a Invoice> {
        let invoices = self.invoices;
        invoices
            .iter()
            .filter(move |invoice| invoice.agreement_id == Some(agreement_id))
    }

    pub fn open_invoices_for(&self, agreement_id: Uuid) -> Vec<&'a Invoice> {
        self.invoices_for(agreement_id)
            .filter(|invoice| invoice.is_open())
            .collect()
    }

    pub fn has_any_invoices(&self, agreement_id: Uuid) -> bool {
        self.invoices_for(agreement_id).next().is_some()
    }

    pub fn billed_deposit(&self, agreement_id: Uuid) -> f64 {
        self.invoices_for(agreement_id)
            .filter(|invoice| invoice.invoice_type == InvoiceType::SecurityDeposit)
            .map(|invoice| invoice.amount)
            .sum()
    }

    pub fn rent_invoice_for_month(
        &self,
        agreement_id: Uuid,
        rental_month: &str,
    ) -> Option<&'a Invoice> {
        self.invoices_for(agreement_id).find(|invoice| {
            invoice.invoice_type == InvoiceType::Rental
                && invoice.rental_month.as_deref() == Some(rental_month)
        })
    }

    pub fn active_templates_for(&self, agreement_id: Uuid) -> Vec<&'a RecurringChargeTemplate> {
        self.templates
            .iter()
            .filter(|template| template.active && template.agreement_id == agreement_id)
            .collect()
    }

    pub fn predecessor_of(&self, agreement: &RentalAgreement) -> Option<&'a RentalAgreement> {
        let previous_id = agreement.previous_agreement_id?;
        self.agreements.iter().find(|item| item.id == previous_id)
    }
}

#[cfg(test)]
mod tests {
    use super::AgreementView;
    use crate::{
        models::{AgreementStatus, InvoiceStatus},
        services::testing::LedgerFixture,
    };

    #[test]
    fn occupancy_ignores_non_active_agreements() {
        let mut fixture = LedgerFixture::new();
        let property = fixture.property("Unit 1");
        let active = fixture.active_agreement(property);
        let ended = fixture.active_agreement(property);
        fixture.set_status(ended, AgreementStatus::Terminated);

        let ledger = fixture.ledger();
        let view = AgreementView::new(&ledger);
        assert!(view.is_property_occupied(property, None));
        assert!(view.is_property_occupied(property, Some(ended)));
        assert!(!view.is_property_occupied(property, Some(active)));
        assert_eq!(view.occupying_agreement(property, None).map(|a| a.id), Some(active));
    }

    #[test]
    fn lists_available_properties() {
        let mut fixture = LedgerFixture::new();
        let taken = fixture.property("Taken");
        let free = fixture.property("Free");
        fixture.active_agreement(taken);

        let ledger = fixture.ledger();
        let view = AgreementView::new(&ledger);
        let available: Vec<_> = view
            .available_properties(&ledger.properties)
            .into_iter()
            .map(|property| property.id)
            .collect();
        assert_eq!(available, vec![free]);
    }

    #[test]
    fn open_invoices_exclude_paid() {
        let mut fixture = LedgerFixture::new();
        let property = fixture.property("Unit 1");
        let agreement = fixture.active_agreement(property);
        fixture.rent_invoice(agreement, "2026-01", InvoiceStatus::Paid);
        fixture.rent_invoice(agreement, "2026-02", InvoiceStatus::PartiallyPaid);
        fixture.rent_invoice(agreement, "2026-03", InvoiceStatus::Unpaid);

        let ledger = fixture.ledger();
        let view = AgreementView::new(&ledger);
        assert_eq!(view.open_invoices_for(agreement).len(), 2);
        assert!(view.has_any_invoices(agreement));
        assert!(view.rent_invoice_for_month(agreement, "2026-02").is_some());
        assert!(view.rent_invoice_for_month(agreement, "2026-04").is_none());
    }

    #[test]
    fn fresh_agreement_has_no_invoices() {
        let mut fixture = LedgerFixture::new();
        let property = fixture.property("Unit 1");
        let agreement = fixture.active_agreement(property);
        let ledger = fixture.ledger();
        let view = AgreementView::new(&ledger);
        assert!(!view.has_any_invoices(agreement));
        assert!(view.open_invoices_for(agreement).is_empty());
        assert_eq!(view.billed_deposit(agreement), 0.0);
    }
}
