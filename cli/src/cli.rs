use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Replay recorded ACP event streams into a persisted session feed, and
/// inspect what was stored.
#[derive(Parser, Debug)]
#[command(name = "weft", version)]
pub struct Cli {
    /// Config file to use instead of `$WEFT_CONFIG` or `~/.weft/config.toml`.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Feed a JSONL script of events and commands through a session.
    Replay(ReplayArgs),
    /// Hydrate a stored session and print its feed.
    Show(ShowArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    /// Session key the feed is stored under.
    #[arg(long = "task", default_value = "default")]
    pub task: String,

    /// Database path. Overrides `[persistence] database`.
    #[arg(long, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Print the feed as JSON instead of text.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ReplayArgs {
    /// One JSON object per line: an ACP event, or `{"command": ...}`.
    #[arg(value_name = "SCRIPT")]
    pub script: PathBuf,

    /// Stop at the first command the session rejects.
    #[arg(long, default_value_t = false)]
    pub strict: bool,

    #[command(flatten)]
    pub session: SessionArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    #[command(flatten)]
    pub session: SessionArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_replay_with_session_flags() {
        let cli = Cli::try_parse_from([
            "weft", "replay", "run.jsonl", "--task", "t-1", "--db", "/tmp/f.db", "--strict",
        ])
        .unwrap();
        let Command::Replay(args) = cli.command else {
            panic!("expected replay");
        };
        assert_eq!(args.script, PathBuf::from("run.jsonl"));
        assert!(args.strict);
        assert_eq!(args.session.task, "t-1");
        assert_eq!(args.session.db, Some(PathBuf::from("/tmp/f.db")));
    }

    #[test]
    fn show_defaults_the_task() {
        let cli = Cli::try_parse_from(["weft", "--config", "c.toml", "show", "--json"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("c.toml")));
        let Command::Show(args) = cli.command else {
            panic!("expected show");
        };
        assert_eq!(args.session.task, "default");
        assert!(args.session.json);
    }
}
