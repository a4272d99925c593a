//! Argument parsing
//!
//! `clubctl [--config PATH] <command> [args]`

use anyhow::{Context, Result, bail};

pub const USAGE: &str = "usage: clubctl [--config PATH] <login EMAIL [PASSWORD] | logout | whoami | get PATH | post PATH JSON>";

#[derive(Debug, PartialEq)]
pub enum Command {
    /// Password falls back to `CLUB_PASSWORD` when not given on the command line.
    Login {
        email: String,
        password: Option<String>,
    },
    Logout,
    Whoami,
    Get {
        path: String,
    },
    Post {
        path: String,
        body: serde_json::Value,
    },
}

#[derive(Debug, PartialEq)]
pub struct Cli {
    pub config: Option<String>,
    pub command: Command,
}

/// Parse arguments, excluding the program name.
pub fn parse(args: &[String]) -> Result<Cli> {
    let mut config = None;
    let mut rest = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            let path = iter.next().context("--config needs a path")?;
            config = Some(path.clone());
        } else {
            rest.push(arg.as_str());
        }
    }

    let command = match rest.as_slice() {
        ["login", email] => Command::Login {
            email: email.to_string(),
            password: None,
        },
        ["login", email, password] => Command::Login {
            email: email.to_string(),
            password: Some(password.to_string()),
        },
        ["logout"] => Command::Logout,
        ["whoami"] => Command::Whoami,
        ["get", path] => Command::Get {
            path: path.to_string(),
        },
        ["post", path, body] => Command::Post {
            path: path.to_string(),
            body: serde_json::from_str(body).context("request body must be valid JSON")?,
        },
        _ => bail!(USAGE),
    };

    Ok(Cli { config, command })
}
