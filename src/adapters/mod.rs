pub mod postgres_directory;
pub mod postgres_ledger_store;

#[cfg(test)]
pub mod memory;

pub use postgres_directory::{PostgresAccountDirectory, PostgresNotificationStore, PostgresProductCatalog};
pub use postgres_ledger_store::PostgresLedgerStore;

use std::str::FromStr;

use crate::domain::ParseEnumError;
use crate::ports::{RepositoryError, RepositoryResult};

/// Parses an enum column, surfacing unknown values as a decode error.
fn parse_stored<T>(value: &str) -> RepositoryResult<T>
where
    T: FromStr<Err = ParseEnumError>,
{
    value
        .parse()
        .map_err(|err: ParseEnumError| RepositoryError::Database(sqlx::Error::Decode(Box::new(err))))
}
