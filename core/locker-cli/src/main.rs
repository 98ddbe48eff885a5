//! strooplock: command-line client for the Stroop Locker daemon.
//!
//! ## Subcommands
//!
//! - `lock` / `unlock` / `list`: Manage the locked-app set
//! - `foreground`: Report a foreground app switch (used by platform watchers)
//! - `challenge` / `answer` / `play`: Drive the active Stroop challenge
//! - `status`, `directives`, `stats`, `reset`: Inspect and reset daemon state
//! - `settings`: Show or edit the settings file read at daemon start

mod commands;
mod daemon_client;
mod logging;

use clap::{Parser, Subcommand};
use locker_core::{StorageConfig, Theme};

#[derive(Parser)]
#[command(name = "strooplock")]
#[command(about = "Lock apps behind a Stroop colour challenge")]
#[command(version)]
struct Cli {
    /// Print raw JSON responses
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lock an app package
    Lock {
        #[arg(value_name = "PACKAGE")]
        package: String,
    },

    /// Unlock an app package and end its session
    Unlock {
        #[arg(value_name = "PACKAGE")]
        package: String,
    },

    /// List locked packages
    List,

    /// Report that a package came to the foreground
    Foreground {
        #[arg(value_name = "PACKAGE")]
        package: String,
    },

    /// Show the challenge for a package, starting one if the slot is free
    Challenge {
        #[arg(value_name = "PACKAGE")]
        package: String,
    },

    /// Answer the active challenge with a colour name
    Answer {
        #[arg(value_name = "COLOR")]
        color: String,

        /// Only answer if this challenge is still the active one
        #[arg(long)]
        challenge_id: Option<u64>,
    },

    /// Run a challenge interactively in the terminal
    Play {
        #[arg(value_name = "PACKAGE")]
        package: String,
    },

    /// Daemon health and challenge activity
    Status,

    /// Drain queued UI directives
    Directives,

    /// Attempt counters and packages completed this session
    Stats,

    /// End every session and drop the active challenge
    Reset,

    /// Show or change settings
    Settings {
        #[command(subcommand)]
        action: Option<SettingsAction>,
    },
}

#[derive(Subcommand)]
pub enum SettingsAction {
    /// Print current settings
    Show,

    /// Update settings; takes effect when the daemon restarts
    Set {
        #[arg(long)]
        timeout: Option<u64>,

        #[arg(long)]
        session_duration: Option<u64>,

        #[arg(long)]
        rounds: Option<u32>,

        #[arg(long)]
        master_disable: Option<bool>,

        #[arg(long)]
        sound: Option<bool>,

        #[arg(long)]
        vibration: Option<bool>,

        #[arg(long, value_parser = parse_theme)]
        theme: Option<Theme>,
    },
}

fn parse_theme(raw: &str) -> Result<Theme, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "system" => Ok(Theme::System),
        "light" => Ok(Theme::Light),
        "dark" => Ok(Theme::Dark),
        other => Err(format!("unknown theme '{}' (expected system, light or dark)", other)),
    }
}

fn main() {
    let storage = StorageConfig::default();
    let _logging_guard = logging::init(&storage);
    let cli = Cli::parse();
    let output = commands::Output { json: cli.json };

    let result = match cli.command {
        Commands::Lock { package } => commands::lock(&output, &package),
        Commands::Unlock { package } => commands::unlock(&output, &package),
        Commands::List => commands::list(&output),
        Commands::Foreground { package } => commands::foreground(&output, &package),
        Commands::Challenge { package } => commands::challenge(&output, &package),
        Commands::Answer {
            color,
            challenge_id,
        } => commands::answer(&output, &color, challenge_id),
        Commands::Play { package } => commands::play(&package),
        Commands::Status => commands::status(&output),
        Commands::Directives => commands::directives(&output),
        Commands::Stats => commands::stats(&output),
        Commands::Reset => commands::reset(&output),
        Commands::Settings { action } => {
            commands::settings(&output, &storage, action.unwrap_or(SettingsAction::Show))
        }
    };

    if let Err(err) = result {
        tracing::error!(error = %err, "strooplock command failed");
        eprintln!("strooplock: {}", err);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_answer_with_challenge_id() {
        let cli = Cli::try_parse_from(["strooplock", "answer", "Blue", "--challenge-id", "7"]).unwrap();
        match cli.command {
            Commands::Answer {
                color,
                challenge_id,
            } => {
                assert_eq!(color, "Blue");
                assert_eq!(challenge_id, Some(7));
            }
            _ => panic!("expected answer command"),
        }
    }

    #[test]
    fn parses_settings_theme() {
        let cli = Cli::try_parse_from(["strooplock", "settings", "set", "--theme", "Dark"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Settings {
                action: Some(SettingsAction::Set {
                    theme: Some(Theme::Dark),
                    ..
                })
            }
        ));
    }

    #[test]
    fn rejects_unknown_theme() {
        assert!(parse_theme("sepia").is_err());
    }
}
