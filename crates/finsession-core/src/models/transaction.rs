//! Transaction models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    #[serde(rename = "ingreso")]
    Income,
    #[serde(rename = "egreso")]
    Expense,
    #[serde(rename = "prestamo")]
    Loan,
    #[serde(rename = "alquiler")]
    Rent,
    #[serde(rename = "otro")]
    Other,
}

impl TransactionKind {
    /// Sign used when displaying an amount (+ for income, - otherwise)
    pub fn sign(&self) -> char {
        match self {
            TransactionKind::Income => '+',
            _ => '-',
        }
    }
}

/// Account a transaction was booked against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "nombre", default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    #[serde(rename = "usuarioId", default)]
    pub user_id: String,
    #[serde(rename = "tipo")]
    pub kind: TransactionKind,
    #[serde(rename = "categoriaId")]
    pub category_id: String,
    #[serde(rename = "monto")]
    pub amount: f64,
    #[serde(rename = "moneda", default = "default_currency")]
    pub currency: String,
    #[serde(rename = "fecha")]
    pub date: DateTime<Utc>,
    #[serde(rename = "descripcion", default)]
    pub description: String,
    #[serde(rename = "cuenta", default)]
    pub account: Option<Account>,
    #[serde(rename = "metodoPago", default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(rename = "referencia", default)]
    pub reference: Option<String>,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl Transaction {
    pub fn description_or_default(&self) -> &str {
        if self.description.is_empty() {
            "Sin descripción"
        } else {
            &self.description
        }
    }
}

/// Body for creating or updating a transaction.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionInput {
    #[serde(rename = "tipo")]
    pub kind: TransactionKind,
    #[serde(rename = "categoriaId")]
    pub category_id: String,
    #[serde(rename = "monto")]
    pub amount: f64,
    #[serde(rename = "moneda")]
    pub currency: String,
    #[serde(rename = "fecha")]
    pub date: DateTime<Utc>,
    #[serde(rename = "descripcion")]
    pub description: String,
    #[serde(rename = "metodoPago", skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(rename = "referencia", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}
