pub mod agreement_view;
pub mod calendar;
pub mod changes;
pub mod expiry;
pub mod invoicing;
pub mod lifecycle;
pub mod numbering;
pub mod recurring;
pub mod scheduler;

#[cfg(test)]
pub mod testing;
