use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::{
    models::{AgreementStatus, RentalAgreement, TenantLedger},
    repository::ledger_store::LedgerStore,
    services::{
        changes::{ChangeSet, Mutation},
        recurring,
    },
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExpirySweepResult {
    pub organizations: u32,
    pub expired: u32,
    pub failed: u32,
}

/// Marks active agreements whose term ended before `today` as EXPIRED and
/// retires their recurring templates. Expired agreements stop occupying
/// their property but remain renewable.
pub fn sweep_expired(ledger: &TenantLedger, today: NaiveDate, now: DateTime<Utc>) -> ChangeSet {
    let mut changes = ChangeSet::new();
    for agreement in ledger
        .agreements
        .iter()
        .filter(|agreement| agreement.display_status(today) == AgreementStatus::Expired)
        .filter(|agreement| agreement.is_active())
    {
        changes.push(Mutation::UpdateAgreement(RentalAgreement {
            status: AgreementStatus::Expired,
            updated_at: now,
            ..agreement.clone()
        }));
        for template in recurring::deactivate(&ledger.templates, agreement.id) {
            changes.push(Mutation::UpdateRecurringTemplate(template));
        }
    }
    changes
}

/// Calendar date in the organization's timezone, falling back to `fallback`
/// and then UTC when the name does not parse.
pub fn local_today(timezone: &str, fallback: &str, now: DateTime<Utc>) -> NaiveDate {
    timezone
        .parse::<Tz>()
        .or_else(|_| fallback.parse::<Tz>())
        .map(|tz| now.with_timezone(&tz).date_naive())
        .unwrap_or_else(|_| now.date_naive())
}

pub async fn run_expiry_sweep(store: &LedgerStore, default_timezone: &str) -> ExpirySweepResult {
    let now = Utc::now();
    let mut result = ExpirySweepResult::default();

    for org_id in store.organization_ids().await {
        let Ok(shared) = store.ledger(org_id).await else {
            continue;
        };
        let mut ledger = shared.lock().await;
        let today = local_today(&ledger.organization.timezone, default_timezone, now);
        let changes = sweep_expired(&ledger, today, now);
        result.organizations += 1;
        if changes.is_empty() {
            continue;
        }

        let expired = changes
            .iter()
            .filter(|mutation| matches!(mutation, Mutation::UpdateAgreement(_)))
            .count() as u32;
        match ledger.apply(&changes) {
            Ok(()) => result.expired += expired,
            Err(error) => {
                result.failed += 1;
                tracing::error!(org_id = %org_id, error = %error, "Expiry sweep failed");
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{local_today, sweep_expired};
    use crate::{
        models::AgreementStatus,
        services::{
            agreement_view::AgreementView,
            recurring::create_template,
            testing::{date, LedgerFixture},
        },
    };

    #[test]
    fn expires_lapsed_agreements_and_frees_property() {
        let mut fixture = LedgerFixture::with_defaults();
        let property = fixture.property("Unit 1");
        let agreement_id = fixture.active_agreement(property);
        let lease = fixture.ledger().agreement(agreement_id).cloned().expect("agreement");
        fixture.push_template(create_template(&lease, lease.start_date, None, None));
        let mut ledger = fixture.ledger();

        assert!(sweep_expired(&ledger, date("2026-12-31"), Utc::now()).is_empty());

        let changes = sweep_expired(&ledger, date("2027-01-01"), Utc::now());
        assert_eq!(changes.len(), 2);
        ledger.apply(&changes).expect("apply");

        assert_eq!(
            ledger.agreement(agreement_id).map(|item| item.status),
            Some(AgreementStatus::Expired)
        );
        let view = AgreementView::new(&ledger);
        assert!(!view.is_property_occupied(property, None));
        assert!(view.active_templates_for(agreement_id).is_empty());
        assert!(sweep_expired(&ledger, date("2027-01-02"), Utc::now()).is_empty());
    }

    #[test]
    fn leaves_terminated_agreements_alone() {
        let mut fixture = LedgerFixture::with_defaults();
        let property = fixture.property("Unit 1");
        let agreement_id = fixture.active_agreement(property);
        fixture.set_status(agreement_id, AgreementStatus::Terminated);
        assert!(sweep_expired(&fixture.ledger(), date("2027-06-01"), Utc::now()).is_empty());
    }

    #[test]
    fn resolves_today_in_organization_timezone() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 2, 0, 0).unwrap();
        assert_eq!(local_today("America/Asuncion", "UTC", now), date("2026-02-28"));
        assert_eq!(local_today("Not/AZone", "UTC", now), date("2026-03-01"));
        assert_eq!(local_today("", "Nope", now), date("2026-03-01"));
    }
}
