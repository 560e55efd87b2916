pub mod db;
pub mod error;
pub mod ledger;
#[cfg(test)]
pub mod memory;
pub mod notificationdb;
pub mod paymentdb;
pub mod taskdb;

pub use db::DBClient;
pub use error::StoreError;
pub use ledger::{LedgerExt, LedgerTx};
pub use notificationdb::NotificationExt;
pub use paymentdb::PaymentExt;
pub use taskdb::TaskExt;

/// Everything the services need from storage, as one object-safe bundle.
pub trait Ledger: TaskExt + PaymentExt + NotificationExt + LedgerExt + Send + Sync {}

impl<T> Ledger for T where T: TaskExt + PaymentExt + NotificationExt + LedgerExt + Send + Sync {}

// Postgres enums are compared through their text form so a status set can be
// bound as a plain `text[]`.
pub(crate) fn status_names<T>(statuses: &[T], name: fn(&T) -> &str) -> Vec<String> {
    statuses.iter().map(|s| name(s).to_string()).collect()
}
