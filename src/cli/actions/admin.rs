//! Operator commands against the admin table. These go straight to the
//! lockout manager, so no token secret is needed to run them.

use crate::{
    cli::globals::GlobalArgs,
    security::{
        clock::SystemClock,
        lockout::LockoutManager,
        password::{ensure_strong, generate_password, PasswordHasher},
    },
    store::{AdminAccount, AdminId, PgCredentialStore},
};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

const GENERATED_PASSWORD_LENGTH: usize = 24;

#[derive(Debug)]
pub enum Command {
    Create {
        login: String,
        password: Option<SecretString>,
    },
    Unlock {
        id: AdminId,
    },
    SetActive {
        id: AdminId,
        active: bool,
    },
}

#[derive(Debug)]
pub struct Args {
    pub globals: GlobalArgs,
    pub command: Command,
}

/// Execute an admin maintenance command.
/// # Errors
/// Returns an error if the database is unreachable or the account operation fails.
pub async fn execute(args: Args) -> Result<()> {
    let pool = args.globals.connect().await?;
    let store = Arc::new(PgCredentialStore::new(pool));
    let hasher = PasswordHasher::new(args.globals.hasher).context("Invalid argon2 parameters")?;
    let manager = LockoutManager::new(store, hasher, args.globals.lockout, Arc::new(SystemClock))?;

    run(&manager, args.command).await
}

async fn run(manager: &LockoutManager, command: Command) -> Result<()> {
    match command {
        Command::Create { login, password } => {
            let (password, generated) = match password {
                Some(password) => (password, false),
                None => (
                    SecretString::from(generate_password(GENERATED_PASSWORD_LENGTH)),
                    true,
                ),
            };
            ensure_strong(password.expose_secret())?;

            let account = manager
                .create(&login, password.expose_secret())
                .await
                .with_context(|| format!("Could not create admin {login}"))?;
            report("created", &account);
            if generated {
                println!("password: {}", password.expose_secret());
            }
        }
        Command::Unlock { id } => {
            let account = manager
                .unlock(id)
                .await
                .with_context(|| format!("Could not unlock admin {id}"))?;
            report("unlocked", &account);
        }
        Command::SetActive { id, active } => {
            let account = manager
                .set_active(id, active)
                .await
                .with_context(|| format!("Could not update admin {id}"))?;
            report(if active { "activated" } else { "deactivated" }, &account);
        }
    }

    Ok(())
}

fn report(verb: &str, account: &AdminAccount) {
    println!("{verb} admin {} (id {})", account.login, account.id);
}
