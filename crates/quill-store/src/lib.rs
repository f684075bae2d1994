pub mod database;
pub mod error;
pub mod ledger;
pub mod redemptions;
pub mod row_helpers;
pub mod schema;

pub use database::Database;
pub use error::StoreError;
