use std::io;
use std::path::Path;

use tokio::io::{AsyncBufRead, Lines};

use crate::error::LoginError;
use crate::rest::{CurrentUser, RestClient, Token};

pub const TOKEN_VAR: &str = "DISCORD_TOKEN";
pub const DEFAULT_ENV_FILE: &str = ".env";

/// Produce a validated account before the gateway is touched.
///
/// `stored` is checked first. When there is none, or the API rejects it, a
/// token is read from `input` until one validates; that token is written to
/// `env_path`. Rejected tokens are never saved.
pub async fn login<R>(
    api_url: &str,
    stored: Option<String>,
    env_path: &Path,
    input: &mut Lines<R>,
) -> Result<(RestClient, CurrentUser), LoginError>
where
    R: AsyncBufRead + Unpin,
{
    match stored {
        Some(token) => {
            let rest = RestClient::new(api_url, Token::new(token));
            match rest.current_user().await {
                Ok(user) => return Ok((rest, user)),
                Err(e) => eprintln!("  \x1b[31mstored token rejected: {e}\x1b[0m"),
            }
        }
        None => eprintln!("  \x1b[33mno stored token\x1b[0m"),
    }

    loop {
        eprint!("  token (never share it, it logs into your account): ");
        let Some(line) = input.next_line().await? else {
            eprintln!();
            return Err(LoginError::Aborted);
        };

        let token = Token::new(line);
        if token.is_empty() {
            continue;
        }

        let rest = RestClient::new(api_url, token);
        match rest.current_user().await {
            Ok(user) => {
                save_token(env_path, rest.token())?;
                tracing::info!("token saved to {}", env_path.display());
                return Ok((rest, user));
            }
            Err(e) => eprintln!("  \x1b[31mtoken rejected: {e}\x1b[0m"),
        }
    }
}

/// Write `DISCORD_TOKEN=<token>` into the env file, replacing any previous
/// entry and keeping every other line.
pub fn save_token(path: &Path, token: &Token) -> io::Result<()> {
    let existing = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e),
    };

    let entry = format!("{TOKEN_VAR}={}", token.expose());
    let mut out = String::with_capacity(existing.len() + entry.len() + 1);
    let mut written = false;
    for line in existing.lines() {
        if is_token_line(line) {
            if !written {
                out.push_str(&entry);
                out.push('\n');
                written = true;
            }
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    if !written {
        out.push_str(&entry);
        out.push('\n');
    }

    std::fs::write(path, out)
}

fn is_token_line(line: &str) -> bool {
    let line = line.trim_start();
    let line = line.strip_prefix("export ").unwrap_or(line);
    line.split_once('=')
        .is_some_and(|(key, _)| key.trim() == TOKEN_VAR)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_env(path: &Path) -> Vec<(String, String)> {
        dotenvy::from_path_iter(path)
            .unwrap()
            .map(|item| item.unwrap())
            .collect()
    }

    #[test]
    fn test_save_creates_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");

        save_token(&path, &Token::new(" abc.def ")).unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "DISCORD_TOKEN=abc.def\n"
        );
        assert_eq!(
            read_env(&path),
            vec![("DISCORD_TOKEN".to_string(), "abc.def".to_string())]
        );
    }

    #[test]
    fn test_save_replaces_token_and_keeps_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(
            &path,
            "RUST_LOG=debug\nDISCORD_TOKEN=old\nPRESENCED_BACKOFF_UNIT_MS=500\nexport DISCORD_TOKEN=older\n",
        )
        .unwrap();

        save_token(&path, &Token::new("new")).unwrap();

        assert_eq!(
            read_env(&path),
            vec![
                ("RUST_LOG".to_string(), "debug".to_string()),
                ("DISCORD_TOKEN".to_string(), "new".to_string()),
                ("PRESENCED_BACKOFF_UNIT_MS".to_string(), "500".to_string()),
            ]
        );
    }

    #[test]
    fn test_token_line_detection() {
        assert!(is_token_line("DISCORD_TOKEN=x"));
        assert!(is_token_line("  export DISCORD_TOKEN = x"));
        assert!(!is_token_line("DISCORD_TOKEN_OLD=x"));
        assert!(!is_token_line("# DISCORD_TOKEN=x"));
    }
}
