use anyhow::{Context, Result};
use taskboard::board::Session;
use taskboard::config::ClientConfig;

use super::board::require_token;

pub async fn cmd_register(
    client: &ClientConfig,
    username: &str,
    email: &str,
    password: &str,
) -> Result<()> {
    let session = Session::register(&client.base_url, username, email, password)
        .await
        .context("Registration failed")?;
    print_session(&session);
    Ok(())
}

pub async fn cmd_login(client: &ClientConfig, email: &str, password: &str) -> Result<()> {
    let session = Session::login(&client.base_url, email, password)
        .await
        .context("Login failed")?;
    print_session(&session);
    Ok(())
}

pub async fn cmd_logout(client: &ClientConfig, token: Option<String>) -> Result<()> {
    let session = require_token(token)?;
    session
        .logout(&client.base_url)
        .await
        .context("Logout failed")?;
    println!("Logged out.");
    Ok(())
}

pub async fn cmd_whoami(client: &ClientConfig, token: Option<String>) -> Result<()> {
    let session = require_token(token)?;
    let user = session
        .me(&client.base_url)
        .await
        .context("Failed to fetch current user")?;
    println!("{} <{}>", user.username, user.email);
    Ok(())
}

fn print_session(session: &Session) {
    if let Some(user) = session.user() {
        println!("Signed in as {} <{}>", user.username, user.email);
    }
    println!("export TASKBOARD_TOKEN={}", session.token());
}
