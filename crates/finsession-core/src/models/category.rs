//! Income/expense categories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which kind of transaction a category applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CategoryKind {
    #[serde(rename = "ingreso")]
    Income,
    #[serde(rename = "egreso")]
    Expense,
    #[serde(rename = "ambos")]
    Both,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "tipo")]
    pub kind: CategoryKind,
    #[serde(default)]
    pub color: String,
    /// `None` for global categories shared by every user
    #[serde(rename = "usuarioId", default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Category {
    pub fn is_global(&self) -> bool {
        self.owner_id.is_none()
    }
}

/// Body for creating or updating a category.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryInput {
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "tipo")]
    pub kind: CategoryKind,
    pub color: String,
}
