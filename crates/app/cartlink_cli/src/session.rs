//! Line-oriented session mode: one process, one token cache, many commands.

use std::time::Duration;

use cartlink_core::models::profile::Session;
use cartlink_core::models::token::AccessGrant;
use cartlink_core::token::{TokenError, TokenManager};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::Result;

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Token { user_id: String, email: String },
    SignIn { user_id: String, email: String },
    SignOut { user_id: String },
    Quit,
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> std::result::Result<Option<SessionCommand>, String> {
    let mut parts = line.split_whitespace();
    let Some(verb) = parts.next() else {
        return Ok(None);
    };
    let mut arg = |name: &str| {
        parts
            .next()
            .map(str::to_string)
            .ok_or_else(|| format!("{verb}: missing {name}"))
    };

    let command = match verb {
        "token" => SessionCommand::Token {
            user_id: arg("user id")?,
            email: arg("email")?,
        },
        "sign-in" => SessionCommand::SignIn {
            user_id: arg("user id")?,
            email: arg("email")?,
        },
        "sign-out" => SessionCommand::SignOut {
            user_id: arg("user id")?,
        },
        "quit" | "exit" => SessionCommand::Quit,
        other => return Err(format!("unknown command '{other}'")),
    };
    Ok(Some(command))
}

pub fn grant_json(grant: &AccessGrant) -> Value {
    json!({
        "accessToken": grant.access_token,
        "source": grant.source.as_str(),
    })
}

fn grant_reply(result: std::result::Result<AccessGrant, TokenError>) -> Value {
    match result {
        Ok(grant) => grant_json(&grant),
        Err(e) => json!({ "error": e.to_string() }),
    }
}

async fn execute(manager: &TokenManager, command: SessionCommand) -> Option<Value> {
    let reply = match command {
        SessionCommand::Token { user_id, email } => {
            grant_reply(manager.acquire(&user_id, &email).await)
        }
        SessionCommand::SignIn { user_id, email } => {
            grant_reply(manager.sign_in(&Session { user_id, email }).await)
        }
        SessionCommand::SignOut { user_id } => {
            json!({ "signedOut": manager.sign_out(&user_id) })
        }
        SessionCommand::Quit => return None,
    };
    Some(reply)
}

pub async fn run(manager: &TokenManager) -> Result<()> {
    let purge = manager.cache().spawn_purge_task(PURGE_INTERVAL);
    info!("session started, reading commands from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let reply = match parse_line(&line) {
            Ok(None) => continue,
            Ok(Some(command)) => match execute(manager, command).await {
                Some(reply) => reply,
                None => break,
            },
            Err(e) => json!({ "error": e }),
        };
        println!("{reply}");
    }

    purge.abort();
    info!("session ended");
    Ok(())
}
