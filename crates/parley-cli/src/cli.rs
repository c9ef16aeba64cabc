use std::path::PathBuf;

use clap::Parser;

/// Parley: ask the assistant from your terminal.
#[derive(Parser, Debug)]
#[command(name = "parley", version, about)]
pub struct Args {
    /// Config file path override.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Assistant endpoint override (ws://, wss://, http:// or https://).
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Log filter directive, e.g. `parley=debug`.
    #[arg(long)]
    pub log_level: Option<String>,

    /// History window budget in bytes.
    #[arg(long)]
    pub budget: Option<usize>,
}

pub fn parse() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_overrides() {
        let args = Args::try_parse_from([
            "parley",
            "--endpoint",
            "ws://localhost:3000",
            "--budget",
            "4096",
            "--log-level",
            "parley=debug",
        ])
        .unwrap();
        assert_eq!(args.endpoint.as_deref(), Some("ws://localhost:3000"));
        assert_eq!(args.budget, Some(4096));
        assert_eq!(args.log_level.as_deref(), Some("parley=debug"));
        assert!(args.config.is_none());
    }

    #[test]
    fn rejects_non_numeric_budget() {
        assert!(Args::try_parse_from(["parley", "--budget", "lots"]).is_err());
    }
}
