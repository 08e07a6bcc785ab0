//! Subcommand handlers.

use std::io::{self, BufRead, Write};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing::debug;

use warranty_core::api::{AuthApi, Gateway, LoginRequest, RegisterRequest};
use warranty_core::auth::SessionState;
use warranty_core::config::Config;
use warranty_core::Claims;

use crate::cli::Command;

pub async fn run(command: Command, config: &mut Config, gateway: Gateway) -> Result<()> {
    match command {
        Command::Login { email } => login(config, gateway, email).await,
        Command::Register { name, email } => register(gateway, name, email).await,
        Command::Logout => logout(&gateway),
        Command::Status { json } => status(&gateway, json),
        Command::Get { path } => get(&gateway, &path).await,
        Command::Watch => watch(&gateway).await,
    }
}

async fn login(config: &mut Config, gateway: Gateway, email: Option<String>) -> Result<()> {
    let email = match email {
        Some(email) => email,
        None => prompt("Email", config.last_email.as_deref())?,
    };
    let password = rpassword::prompt_password("Password: ").context("Failed to read password")?;

    let claims = AuthApi::new(gateway)
        .sign_in(&LoginRequest::new(email.trim(), password))
        .await?;

    config.last_email = Some(email.trim().to_string());
    if let Err(e) = config.save() {
        debug!(error = %e, "Could not remember last email");
    }

    println!("Signed in as {}.", display_subject(&claims));
    println!("{}", expiry_line(&claims));
    Ok(())
}

async fn register(gateway: Gateway, name: Option<String>, email: Option<String>) -> Result<()> {
    let name = match name {
        Some(name) => name,
        None => prompt("Full name", None)?,
    };
    let email = match email {
        Some(email) => email,
        None => prompt("Email", None)?,
    };
    let password = rpassword::prompt_password("Password: ").context("Failed to read password")?;
    let confirm =
        rpassword::prompt_password("Confirm password: ").context("Failed to read password")?;
    if password != confirm {
        bail!("Passwords do not match");
    }

    AuthApi::new(gateway)
        .register(&RegisterRequest::new(email.trim(), name.trim(), password))
        .await?;

    println!("Account created. Run `warranty login` to sign in.");
    Ok(())
}

fn logout(gateway: &Gateway) -> Result<()> {
    let was_signed_in = gateway.session().is_authenticated();
    gateway
        .session()
        .logout()
        .context("Failed to clear stored session")?;
    if was_signed_in {
        println!("Signed out.");
    } else {
        println!("Not signed in.");
    }
    Ok(())
}

fn status(gateway: &Gateway, json: bool) -> Result<()> {
    let state = gateway.session().state();
    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }

    match state {
        SessionState::Anonymous => println!("Not signed in."),
        SessionState::Authenticated(claims) => {
            println!("Signed in as {}.", display_subject(&claims));
            println!("{}", expiry_line(&claims));
        }
    }
    Ok(())
}

async fn get(gateway: &Gateway, path: &str) -> Result<()> {
    let body: serde_json::Value = gateway
        .get_json(path)
        .await
        .with_context(|| format!("GET {} failed", path))?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

async fn watch(gateway: &Gateway) -> Result<()> {
    let session = gateway.session();
    let Some(claims) = session.current_user() else {
        println!("Not signed in.");
        return Ok(());
    };

    println!("Watching session for {}.", display_subject(&claims));
    println!("{}", expiry_line(&claims));

    let mut states = session.subscribe();
    loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() || !states.borrow_and_update().is_authenticated() {
                    println!("Session ended.");
                    return Ok(());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                return Ok(());
            }
        }
    }
}

fn display_subject(claims: &Claims) -> &str {
    claims.subject().unwrap_or("unknown user")
}

fn expiry_line(claims: &Claims) -> String {
    match claims.expires_at() {
        Some(at) => format!(
            "Session expires at {} ({} minutes left).",
            at.format("%Y-%m-%d %H:%M:%S UTC"),
            claims.minutes_until_expiry(Utc::now())
        ),
        None => "Session has no stated expiry.".to_string(),
    }
}

/// Read one line from stdin, falling back to `default` on empty input.
fn prompt(label: &str, default: Option<&str>) -> Result<String> {
    match default {
        Some(default) => eprint!("{} [{}]: ", label, default),
        None => eprint!("{}: ", label),
    }
    io::stderr().flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read input")?;
    let value = line.trim();

    match (value.is_empty(), default) {
        (true, Some(default)) => Ok(default.to_string()),
        _ => Ok(value.to_string()),
    }
}
