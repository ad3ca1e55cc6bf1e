use std::io::{self, BufRead, Write};

use anyhow::{bail, Context, Result};
use chrono::Datelike;
use clap::{Subcommand, ValueEnum};
use finsession_core::models::{ProfileUpdate, Role};
use finsession_core::{Config, EventStream, RegistrationForm, SessionController, SessionEvent};
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::render;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum RoleArg {
    Admin,
    User,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Admin => Role::Admin,
            RoleArg::User => Role::Standard,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in with email and password
    Login {
        #[arg(short, long)]
        email: Option<String>,
    },
    /// Create an account (an administrator must approve it)
    Register {
        #[arg(long)]
        name: String,
        #[arg(short, long)]
        email: String,
    },
    /// End the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Edit the signed-in user's name, email or photo
    Profile {
        #[arg(long)]
        name: Option<String>,
        #[arg(short, long)]
        email: Option<String>,
        #[arg(long)]
        photo: Option<String>,
    },
    /// Monthly totals and the latest transactions
    Dashboard {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        month: Option<u32>,
    },
    /// List categories
    Categories,
    /// List transactions, newest first
    Transactions {
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// Monthly statistics
    Stats {
        #[arg(long)]
        year: i32,
        #[arg(long)]
        month: u32,
    },
    /// Renew the access token now
    Renew,
    /// Keep the session open, showing the countdown and the renewal prompt
    Watch,
    /// Change the account password
    ChangePassword,
    /// Print the identity-provider sign-in URL
    GoogleUrl,
    /// Finish identity-provider sign-in from the redirect URL
    Redirect { url: String },
    /// List all users (admin)
    Users,
    /// Approve a pending account (admin)
    Approve { id: String },
    /// Reactivate a suspended account (admin)
    Activate { id: String },
    /// Suspend an account (admin)
    Deactivate { id: String },
    /// Change a user's role (admin)
    SetRole {
        id: String,
        #[arg(value_enum)]
        role: RoleArg,
    },
    /// Delete a user (admin)
    DeleteUser { id: String },
}

impl Commands {
    /// Commands that work without a stored session.
    fn needs_session(&self) -> bool {
        !matches!(
            self,
            Commands::Login { .. }
                | Commands::Register { .. }
                | Commands::GoogleUrl
                | Commands::Redirect { .. }
        )
    }

    pub async fn execute(
        self,
        controller: &SessionController,
        config: &mut Config,
        mut events: EventStream,
    ) -> Result<()> {
        if self.needs_session() {
            let restored = controller.restore()?;
            render::flush_notifications(&mut events);
            if !restored && !matches!(self, Commands::Logout) {
                bail!("No hay sesión activa. Ejecuta `finsession login`");
            }
        }

        let result = self.run(controller, config, &mut events).await;
        render::flush_notifications(&mut events);
        result
    }

    async fn run(
        self,
        controller: &SessionController,
        config: &mut Config,
        events: &mut EventStream,
    ) -> Result<()> {
        let api = controller.api();
        match self {
            Commands::Login { email } => {
                let email = match email.or_else(|| config.last_email.clone()) {
                    Some(email) => email,
                    None => prompt_line("Email: ")?,
                };
                let password = rpassword::prompt_password("Contraseña: ")?;
                let user = controller.login(&email, &password).await?;
                config.last_email = Some(email);
                if let Err(e) = config.save() {
                    debug!(error = %e, "Could not save config");
                }
                render::user(&user);
            }
            Commands::Register { name, email } => {
                let password = rpassword::prompt_password("Contraseña: ")?;
                let confirm_password = rpassword::prompt_password("Confirmar contraseña: ")?;
                let form = RegistrationForm {
                    name,
                    email,
                    password,
                    confirm_password,
                };
                let message = controller.register(&form).await?;
                println!("{}", message);
            }
            Commands::Logout => {
                controller.logout();
                println!("Sesión cerrada");
            }
            Commands::Whoami => {
                let user = controller.request(api.profile()).await?;
                render::user(&user);
            }
            Commands::Profile { name, email, photo } => {
                let update = ProfileUpdate {
                    display_name: name,
                    email,
                    photo_url: photo,
                };
                let user = controller.update_profile(&update).await?;
                render::user(&user);
            }
            Commands::Dashboard { year, month } => {
                let today = chrono::Local::now().date_naive();
                let year = year.unwrap_or_else(|| today.year());
                let month = month.unwrap_or_else(|| today.month());
                let data = controller.load_dashboard(year, month).await?;
                render::dashboard(&data);
            }
            Commands::Categories => {
                let categories = controller.request(api.categories()).await?;
                render::categories(&categories);
            }
            Commands::Transactions { limit } => {
                let mut transactions = controller.request(api.transactions()).await?;
                transactions.sort_by(|a, b| b.date.cmp(&a.date));
                transactions.truncate(limit);
                render::transactions(&transactions);
            }
            Commands::Stats { year, month } => {
                let stats = controller.request(api.statistics(year, month)).await?;
                render::statistics(&stats);
            }
            Commands::Renew => {
                if !controller.accept_renewal().await {
                    bail!("No se pudo renovar la sesión");
                }
                if let Some(expires_at) = controller.lifecycle().expires_at() {
                    println!("Sesión válida hasta {}", expires_at.with_timezone(&chrono::Local).format("%H:%M:%S"));
                }
            }
            Commands::Watch => watch(controller, events).await?,
            Commands::ChangePassword => {
                let current = rpassword::prompt_password("Contraseña actual: ")?;
                let new_password = rpassword::prompt_password("Nueva contraseña: ")?;
                let confirm = rpassword::prompt_password("Confirmar contraseña: ")?;
                controller
                    .change_password(&current, &new_password, &confirm)
                    .await?;
            }
            Commands::GoogleUrl => {
                println!("{}", controller.google_login_url());
            }
            Commands::Redirect { url } => {
                let completed = controller.complete_redirect(&url).await?;
                match completed.user {
                    Some(user) => render::user(&user),
                    None => bail!("La redirección no inició sesión"),
                }
                println!("{}", completed.url);
            }
            Commands::Users => {
                let users = controller.request(api.users()).await?;
                render::users(&users);
            }
            Commands::Approve { id } => {
                let ack = controller.request(api.approve_user(&id)).await?;
                println!("{}", ack.message);
            }
            Commands::Activate { id } => {
                let ack = controller.request(api.activate_user(&id)).await?;
                println!("{}", ack.message);
            }
            Commands::Deactivate { id } => {
                let ack = controller.request(api.deactivate_user(&id)).await?;
                println!("{}", ack.message);
            }
            Commands::SetRole { id, role } => {
                let ack = controller
                    .request(api.change_user_role(&id, role.into()))
                    .await?;
                println!("{}", ack.message);
            }
            Commands::DeleteUser { id } => {
                let ack = controller.request(api.delete_user(&id)).await?;
                println!("{}", ack.message);
            }
        }
        Ok(())
    }
}

fn prompt_line(prompt: &str) -> Result<String> {
    eprint!("{}", prompt);
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim().to_string())
}

/// Read the renewal answer on a plain thread; a blocked stdin read must not
/// hold up runtime shutdown when the session expires first.
fn ask_renewal() -> oneshot::Receiver<bool> {
    let (tx, rx) = oneshot::channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        let accepted = io::stdin().lock().read_line(&mut line).is_ok()
            && matches!(line.trim().to_lowercase().as_str(), "s" | "si" | "sí" | "y" | "yes");
        let _ = tx.send(accepted);
    });
    rx
}

async fn next_answer(pending: &mut Option<oneshot::Receiver<bool>>) -> Option<bool> {
    match pending {
        Some(rx) => {
            let answer = rx.await.ok();
            *pending = None;
            answer
        }
        None => std::future::pending().await,
    }
}

/// Render the session until it ends, answering the renewal prompt from stdin.
async fn watch(
    controller: &SessionController,
    events: &mut EventStream,
) -> Result<()> {
    info!("Watching session");
    let mut answer: Option<oneshot::Receiver<bool>> = None;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    SessionEvent::Countdown { remaining_secs } => render::countdown(remaining_secs),
                    SessionEvent::RenewalPrompt { seconds } => {
                        render::renewal_countdown(seconds);
                        if answer.is_none() {
                            answer = Some(ask_renewal());
                        }
                    }
                    SessionEvent::RenewalCountdown { remaining_secs } => {
                        render::renewal_countdown(remaining_secs)
                    }
                    SessionEvent::StateChanged(state) => render::state(state),
                    SessionEvent::Authenticated { user } => {
                        eprintln!("\nSesión de {}", user.greeting_name())
                    }
                    SessionEvent::Notification { level, message } => {
                        eprintln!();
                        render::notification(level, &message);
                    }
                    SessionEvent::LoggedOut { reason } => {
                        eprintln!("\nSesión terminada ({:?})", reason);
                        break;
                    }
                }
            }
            Some(accepted) = next_answer(&mut answer) => {
                if accepted {
                    if !controller.accept_renewal().await {
                        eprintln!("\nNo se pudo renovar la sesión");
                    }
                } else {
                    controller.decline_renewal();
                }
            }
        }
    }
    Ok(())
}
