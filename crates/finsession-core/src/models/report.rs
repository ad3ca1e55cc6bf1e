use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{Category, Transaction};

/// Monthly aggregates from `/reportes/estadisticas`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Statistics {
    #[serde(rename = "totalIngresos", default)]
    pub total_income: f64,
    #[serde(rename = "totalEgresos", default)]
    pub total_expenses: f64,
    #[serde(default)]
    pub balance: f64,
    #[serde(rename = "porCategoria", default)]
    pub by_category: HashMap<String, f64>,
}

impl Statistics {
    /// Balance recomputed from the totals; the server field may be absent.
    pub fn net(&self) -> f64 {
        self.total_income - self.total_expenses
    }
}

/// Everything the dashboard view shows after sign-in.
#[derive(Debug, Clone)]
pub struct DashboardData {
    pub recent_transactions: Vec<Transaction>,
    pub categories: Vec<Category>,
    pub statistics: Statistics,
    pub year: i32,
    pub month: u32,
}
