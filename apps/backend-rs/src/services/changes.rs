use serde::Serialize;
use uuid::Uuid;

use crate::models::{Invoice, NumberingSeries, RecurringChargeTemplate, RentalAgreement};

/// One create/update instruction emitted by the engine for the caller to commit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", content = "record", rename_all = "snake_case")]
pub enum Mutation {
    AddAgreement(RentalAgreement),
    UpdateAgreement(RentalAgreement),
    DeleteAgreement { id: Uuid },
    AddInvoice(Invoice),
    UpdateInvoice(Invoice),
    AddRecurringTemplate(RecurringChargeTemplate),
    UpdateRecurringTemplate(RecurringChargeTemplate),
    UpdateNumberingSeries(NumberingSeries),
}

/// Ordered mutations that must be committed together.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ChangeSet {
    mutations: Vec<Mutation>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mutation: Mutation) {
        self.mutations.push(mutation);
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Mutation> {
        self.mutations.iter()
    }
}

impl From<Vec<Mutation>> for ChangeSet {
    fn from(mutations: Vec<Mutation>) -> Self {
        Self { mutations }
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a Mutation;
    type IntoIter = std::slice::Iter<'a, Mutation>;

    fn into_iter(self) -> Self::IntoIter {
        self.mutations.iter()
    }
}
