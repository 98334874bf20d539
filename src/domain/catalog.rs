use bigdecimal::BigDecimal;
use serde::Serialize;
use uuid::Uuid;

/// The slice of a workflow the ledger needs: identity, title and price.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogItem {
    pub id: Uuid,
    pub title: String,
    pub price: BigDecimal,
}
