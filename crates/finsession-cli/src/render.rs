//! Plain-text rendering of session events and API data.

use std::io::{self, Write};

use finsession_core::models::{
    Category, DashboardData, Statistics, Transaction, UserProfile,
};
use finsession_core::utils::{format_countdown, format_currency, format_date, truncate};
use finsession_core::{EventStream, LifecycleState, NotificationLevel, SessionEvent};

/// Description column width in transaction lists
const DESCRIPTION_WIDTH: usize = 32;

pub fn notification(level: NotificationLevel, message: &str) {
    let tag = match level {
        NotificationLevel::Info => "info",
        NotificationLevel::Success => "ok",
        NotificationLevel::Error => "error",
    };
    eprintln!("[{}] {}", tag, message);
}

/// Print pending notifications; countdown ticks are dropped.
pub fn flush_notifications(rx: &mut EventStream) {
    while let Some(event) = rx.try_recv() {
        if let SessionEvent::Notification { level, message } = event {
            notification(level, &message);
        }
    }
}

pub fn countdown(remaining_secs: u64) {
    eprint!("\rSesión expira en {}   ", format_countdown(remaining_secs));
    let _ = io::stderr().flush();
}

pub fn renewal_countdown(remaining_secs: u64) {
    eprint!(
        "\r¿Renovar sesión? [s/N] cierre automático en {}s   ",
        remaining_secs
    );
    let _ = io::stderr().flush();
}

pub fn state(state: LifecycleState) {
    let label = match state {
        LifecycleState::Unauthenticated => "sin sesión",
        LifecycleState::Active => "activa",
        LifecycleState::RenewalWarning => "por expirar",
        LifecycleState::Expired => "expirada",
    };
    eprintln!("\nEstado de sesión: {}", label);
}

pub fn user(user: &UserProfile) {
    println!("{} <{}>", user.greeting_name(), user.email);
    println!("  id:     {}", user.id);
    println!("  rol:    {}", user.role.as_str());
    println!("  estado: {:?}", user.status);
}

pub fn users(users: &[UserProfile]) {
    if users.is_empty() {
        println!("No hay usuarios");
        return;
    }
    for u in users {
        println!(
            "{:<26} {:<24} {:<6} {:?}",
            u.id,
            truncate(&u.email, 24),
            u.role.as_str(),
            u.status
        );
    }
}

pub fn categories(categories: &[Category]) {
    if categories.is_empty() {
        println!("No hay categorías");
        return;
    }
    for c in categories {
        let scope = if c.is_global() { "global" } else { "propia" };
        println!("{:<26} {:<20} {:?} ({})", c.id, c.name, c.kind, scope);
    }
}

pub fn transactions(transactions: &[Transaction]) {
    if transactions.is_empty() {
        println!("No hay transacciones");
        return;
    }
    for t in transactions {
        println!(
            "{}  {:<width$}  {}{}",
            format_date(&t.date),
            truncate(t.description_or_default(), DESCRIPTION_WIDTH),
            t.kind.sign(),
            format_currency(t.amount, &t.currency),
            width = DESCRIPTION_WIDTH
        );
    }
}

pub fn statistics(stats: &Statistics) {
    println!("Ingresos: {}", format_currency(stats.total_income, "USD"));
    println!("Egresos:  {}", format_currency(stats.total_expenses, "USD"));
    println!("Balance:  {}", format_currency(stats.net(), "USD"));

    let mut by_category: Vec<_> = stats.by_category.iter().collect();
    by_category.sort_by(|a, b| b.1.total_cmp(a.1));
    for (name, amount) in by_category {
        println!("  {:<20} {}", name, format_currency(*amount, "USD"));
    }
}

pub fn dashboard(data: &DashboardData) {
    println!("== {:02}/{} ==", data.month, data.year);
    statistics(&data.statistics);
    println!();
    println!("Últimas transacciones:");
    transactions(&data.recent_transactions);
    println!();
    println!("{} categorías", data.categories.len());
}
