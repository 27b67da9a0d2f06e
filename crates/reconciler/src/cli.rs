use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use creditledger_core::{LedgerResult, UserId};
use creditledger_observability::LogFormat;

#[derive(Parser, Debug)]
#[command(
    name = "creditledger-reconciler",
    about = "Verify cached credit balances against the transaction log",
    version
)]
pub struct Cli {
    /// Redis connection URL (overrides CREDIT_LEDGER_REDIS_URL / REDIS_URL)
    #[arg(long)]
    pub redis_url: Option<String>,

    /// Overwrite mismatched balances with the log total
    #[arg(long)]
    pub rebuild: bool,

    /// File with one user id per line (`#` starts a comment)
    #[arg(long)]
    pub users_file: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "json")]
    pub log_format: LogFormatArg,

    /// User ids to check
    pub users: Vec<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LogFormatArg {
    Json,
    Text,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Json => LogFormat::Json,
            LogFormatArg::Text => LogFormat::Text,
        }
    }
}

/// Merge ids from argv and an optional users file, validated and deduplicated
/// in first-seen order.
pub fn collect_user_ids(args: &[String], file_contents: Option<&str>) -> LedgerResult<Vec<UserId>> {
    let from_file = file_contents
        .into_iter()
        .flat_map(str::lines)
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'));

    let mut seen = std::collections::HashSet::new();
    let mut users = Vec::new();
    for raw in args.iter().map(String::as_str).chain(from_file) {
        let user = UserId::parse(raw)?;
        if seen.insert(user.clone()) {
            users.push(user);
        }
    }
    Ok(users)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_and_file_merge_without_duplicates() {
        let args = vec!["alice".to_string(), "bob".to_string()];
        let file = "# nightly batch\nbob\n\n  carol  \n";
        let users = collect_user_ids(&args, Some(file)).unwrap();
        let ids: Vec<&str> = users.iter().map(UserId::as_str).collect();
        assert_eq!(ids, vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn invalid_ids_are_rejected() {
        let args = vec!["a".repeat(300)];
        assert!(collect_user_ids(&args, None).unwrap_err().is_validation());
    }

    #[test]
    fn parses_flags() {
        let cli = Cli::try_parse_from([
            "creditledger-reconciler",
            "--rebuild",
            "--log-format",
            "text",
            "alice",
        ])
        .unwrap();
        assert!(cli.rebuild);
        assert!(matches!(cli.log_format, LogFormatArg::Text));
        assert_eq!(cli.users, vec!["alice".to_string()]);
    }
}
