use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    models::{Invoice, InvoiceStatus},
    routes::org_ledger,
    schemas::{parse_uuid, validate_input, InvoicePath, InvoicesQuery, OrgPath, RecordPaymentInput},
    services::{
        changes::{ChangeSet, Mutation},
        invoicing::round2,
    },
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/organizations/{org_id}/invoices",
            axum::routing::get(list_invoices),
        )
        .route(
            "/organizations/{org_id}/invoices/{invoice_id}/payments",
            axum::routing::post(record_payment),
        )
}

async fn list_invoices(
    State(state): State<AppState>,
    Path(path): Path<OrgPath>,
    Query(query): Query<InvoicesQuery>,
) -> AppResult<Json<Value>> {
    let agreement_id = query.agreement_uuid()?;
    let (_, shared) = org_ledger(&state, &path.org_id).await?;
    let ledger = shared.lock().await;
    let data = ledger
        .invoices
        .iter()
        .filter(|invoice| agreement_id.map_or(true, |id| invoice.agreement_id == Some(id)))
        .filter(|invoice| query.status.map_or(true, |status| invoice.status == status))
        .collect::<Vec<_>>();
    Ok(Json(json!({ "data": data })))
}

/// Entry point for the payments subsystem. Payment status is only ever
/// recomputed here, from the recorded amounts.
async fn record_payment(
    State(state): State<AppState>,
    Path(path): Path<InvoicePath>,
    Json(payload): Json<RecordPaymentInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    let invoice_id = parse_uuid(&path.invoice_id, "invoice_id")?;
    let (org_id, shared) = org_ledger(&state, &path.org_id).await?;
    let mut ledger = shared.lock().await;
    let invoice = ledger
        .invoice(invoice_id)
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("Invoice {invoice_id} was not found.")))?;

    let updated = apply_payment(&invoice, payload.amount)?;
    ledger.apply(&ChangeSet::from(vec![Mutation::UpdateInvoice(
        updated.clone(),
    )]))?;

    tracing::info!(
        org_id = %org_id,
        invoice_number = %updated.invoice_number,
        status = ?updated.status,
        "Payment recorded"
    );
    Ok(Json(json!(updated)))
}

fn apply_payment(invoice: &Invoice, amount: f64) -> AppResult<Invoice> {
    if invoice.status == InvoiceStatus::Paid {
        return Err(AppError::Conflict(format!(
            "Invoice {} is already paid.",
            invoice.invoice_number
        )));
    }
    let paid_amount = round2(invoice.paid_amount + amount);
    if paid_amount > invoice.amount + 0.005 {
        return Err(AppError::BadRequest(format!(
            "Payment exceeds the outstanding balance of {:.2}.",
            invoice.balance()
        )));
    }
    Ok(Invoice {
        paid_amount,
        status: InvoiceStatus::from_amounts(invoice.amount, paid_amount),
        ..invoice.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::apply_payment;
    use crate::{
        error::AppError,
        models::InvoiceStatus,
        services::testing::{date, LedgerFixture},
    };

    fn unpaid_invoice() -> crate::models::Invoice {
        let mut fixture = LedgerFixture::with_defaults();
        let property = fixture.property("Unit 1");
        let agreement_id = fixture.active_agreement(property);
        fixture.rent_invoice(agreement_id, "2026-01", InvoiceStatus::Unpaid);
        fixture.ledger().invoices[0].clone()
    }

    #[test]
    fn partial_then_full_payment() {
        let invoice = unpaid_invoice();
        assert_eq!(invoice.issue_date, date("2026-01-01"));

        let partial = apply_payment(&invoice, 10_000.0).expect("partial");
        assert_eq!(partial.status, InvoiceStatus::PartiallyPaid);
        let settled = apply_payment(&partial, 20_000.0).expect("settled");
        assert_eq!(settled.status, InvoiceStatus::Paid);
        assert!(matches!(
            apply_payment(&settled, 1.0),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn refuses_overpayment() {
        let invoice = unpaid_invoice();
        assert!(matches!(
            apply_payment(&invoice, 30_000.5),
            Err(AppError::BadRequest(_))
        ));
    }
}
