//! Subcommand implementations. Each returns a printable error string.

use std::io::{self, BufRead, Write};

use chrono::Utc;
use locker_core::{
    color_by_name, load_settings, save_settings, AnswerOption, LockerSettings, StorageConfig,
    StroopPuzzle,
};
use serde::Deserialize;
use serde_json::{json, Value};
use stroop_locker_protocol::Method;

use crate::daemon_client::{self, ClientError};
use crate::SettingsAction;

pub struct Output {
    pub json: bool,
}

/// Client-side view of the daemon's challenge payload.
#[derive(Debug, Deserialize)]
struct ChallengeView {
    challenge: ChallengeHeader,
    puzzle: StroopPuzzle,
    rounds_remaining: u32,
}

#[derive(Debug, Deserialize)]
struct ChallengeHeader {
    id: u64,
    locked_package: String,
}

impl Output {
    fn emit(&self, data: &Value, human: impl FnOnce(&Value) -> String) {
        if self.json {
            println!("{}", data);
        } else {
            println!("{}", human(data));
        }
    }
}

fn call(method: Method, params: Option<Value>) -> Result<Value, String> {
    daemon_client::call(method, params).map_err(|err| match err {
        ClientError::Connect { .. } => format!("{} (is stroop-lockerd running?)", err),
        other => other.to_string(),
    })
}

pub fn lock(output: &Output, package: &str) -> Result<(), String> {
    let data = call(Method::LockApp, Some(json!({ "package": package })))?;
    output.emit(&data, |d| format!("Locked {}", str_field(d, "package")));
    Ok(())
}

pub fn unlock(output: &Output, package: &str) -> Result<(), String> {
    let data = call(Method::UnlockApp, Some(json!({ "package": package })))?;
    output.emit(&data, |d| format!("Unlocked {}", str_field(d, "package")));
    Ok(())
}

pub fn list(output: &Output) -> Result<(), String> {
    let data = call(Method::ListLocked, None)?;
    output.emit(&data, |d| {
        let packages: Vec<&str> = d["packages"]
            .as_array()
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        if packages.is_empty() {
            "No locked apps".to_string()
        } else {
            packages.join("\n")
        }
    });
    Ok(())
}

pub fn foreground(output: &Output, package: &str) -> Result<(), String> {
    let data = call(
        Method::ForegroundChanged,
        Some(json!({ "package": package, "observed_at": Utc::now().to_rfc3339() })),
    )?;
    output.emit(&data, |_| format!("Reported {} in foreground", package));
    Ok(())
}

pub fn challenge(output: &Output, package: &str) -> Result<(), String> {
    let data = call(Method::StartOrGetChallenge, Some(json!({ "package": package })))?;
    if output.json {
        println!("{}", data);
        return Ok(());
    }
    let active = decode_challenge(&data)?;
    print!("{}", render_challenge(&active, false));
    Ok(())
}

pub fn answer(output: &Output, color: &str, challenge_id: Option<u64>) -> Result<(), String> {
    let mut params = json!({ "selected_color": color });
    if let Some(id) = challenge_id {
        params["challenge_id"] = json!(id);
    }
    let data = call(Method::SubmitAnswer, Some(params))?;
    output.emit(&data, describe_outcome);
    Ok(())
}

/// Interactive loop: show each round, read an answer from stdin, submit it.
pub fn play(package: &str) -> Result<(), String> {
    let data = call(Method::StartOrGetChallenge, Some(json!({ "package": package })))?;
    let mut active = decode_challenge(&data)?;
    let stdin = io::stdin();

    loop {
        print!("{}", render_challenge(&active, true));
        print!("Your answer: ");
        io::stdout().flush().map_err(|err| err.to_string())?;

        let mut line = String::new();
        let read = stdin
            .lock()
            .read_line(&mut line)
            .map_err(|err| format!("Failed to read answer: {}", err))?;
        if read == 0 {
            return Err("No answer given".to_string());
        }

        let selected = resolve_choice(line.trim(), &active.puzzle.options);
        let outcome = call(
            Method::SubmitAnswer,
            Some(json!({ "selected_color": selected, "challenge_id": active.challenge.id })),
        )?;
        println!("{}", describe_outcome(&outcome));

        match outcome["outcome"].as_str() {
            Some("next_round") => {
                active = decode_challenge(&outcome["challenge"])?;
            }
            Some("granted") => return Ok(()),
            _ => return Err("Challenge failed".to_string()),
        }
    }
}

pub fn status(output: &Output) -> Result<(), String> {
    let health = call(Method::GetHealth, None)?;
    let activity = call(Method::IsChallengeActive, None)?;
    let data = json!({ "health": health, "challenge": activity });
    output.emit(&data, |d| {
        let mut lines = vec![format!(
            "Daemon {} (pid {}, v{}, protocol {} / client {})",
            str_field(&d["health"], "status"),
            d["health"]["pid"],
            str_field(&d["health"], "version"),
            d["health"]["protocol_version"],
            daemon_client::protocol_version(),
        )];
        match d["challenge"]["package"].as_str() {
            Some(package) => lines.push(format!("Challenge active for {}", package)),
            None => lines.push("No challenge active".to_string()),
        }
        lines.join("\n")
    });
    Ok(())
}

pub fn directives(output: &Output) -> Result<(), String> {
    let data = call(Method::PollDirectives, None)?;
    output.emit(&data, |d| {
        let items = d.as_array().cloned().unwrap_or_default();
        if items.is_empty() {
            return "No pending directives".to_string();
        }
        items
            .iter()
            .map(|item| {
                let package = item["package"]
                    .as_str()
                    .or_else(|| item["challenge"]["challenge"]["locked_package"].as_str())
                    .unwrap_or("?");
                format!("{:<8} {}", str_field(item, "action"), package)
            })
            .collect::<Vec<_>>()
            .join("\n")
    });
    Ok(())
}

pub fn stats(output: &Output) -> Result<(), String> {
    let data = call(Method::GetStats, None)?;
    output.emit(&data, |d| {
        format!(
            "Successful:   {}\nUnsuccessful: {}\nTimed out:    {}\nCompleted:    {}",
            d["successful"],
            d["unsuccessful"],
            d["timed_out"],
            d["completed_packages"]
                .as_array()
                .map(|items| items
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(", "))
                .unwrap_or_default()
        )
    });
    Ok(())
}

pub fn reset(output: &Output) -> Result<(), String> {
    let data = call(Method::EndAllSessions, None)?;
    output.emit(&data, |_| "All sessions ended".to_string());
    Ok(())
}

pub fn settings(output: &Output, storage: &StorageConfig, action: SettingsAction) -> Result<(), String> {
    let mut settings = load_settings(storage).map_err(String::from)?;

    if let SettingsAction::Set {
        timeout,
        session_duration,
        rounds,
        master_disable,
        sound,
        vibration,
        theme,
    } = action
    {
        apply_updates(
            &mut settings,
            SettingsUpdate {
                timeout,
                session_duration,
                rounds,
                master_disable,
                sound,
                vibration,
                theme,
            },
        );
        save_settings(storage, &settings).map_err(String::from)?;
        tracing::info!(path = %storage.settings_file().display(), "Settings saved");
    }

    let data = serde_json::to_value(&settings).map_err(|err| err.to_string())?;
    output.emit(&data, |_| {
        format!(
            "Challenge timeout:   {}s\nSession duration:    {}\nRounds required:     {}\nMaster disable:      {}\nSound / vibration:   {} / {}\nTheme:               {:?}",
            settings.challenge_timeout_secs,
            match settings.session_duration_secs {
                0 => "until app is left".to_string(),
                secs => format!("{}s", secs),
            },
            settings.challenges_required,
            settings.master_disable,
            settings.sound_enabled,
            settings.vibration_enabled,
            settings.theme,
        )
    });
    Ok(())
}

#[derive(Default)]
struct SettingsUpdate {
    timeout: Option<u64>,
    session_duration: Option<u64>,
    rounds: Option<u32>,
    master_disable: Option<bool>,
    sound: Option<bool>,
    vibration: Option<bool>,
    theme: Option<locker_core::Theme>,
}

fn apply_updates(settings: &mut LockerSettings, update: SettingsUpdate) {
    if let Some(timeout) = update.timeout {
        settings.challenge_timeout_secs = timeout;
    }
    if let Some(duration) = update.session_duration {
        settings.session_duration_secs = duration;
    }
    if let Some(rounds) = update.rounds {
        settings.challenges_required = rounds;
    }
    if let Some(disable) = update.master_disable {
        settings.master_disable = disable;
    }
    if let Some(sound) = update.sound {
        settings.sound_enabled = sound;
    }
    if let Some(vibration) = update.vibration {
        settings.vibration_enabled = vibration;
    }
    if let Some(theme) = update.theme {
        settings.theme = theme;
    }
}

fn decode_challenge(data: &Value) -> Result<ChallengeView, String> {
    serde_json::from_value(data.clone()).map_err(|err| format!("Invalid challenge payload: {}", err))
}

/// Accepts either a colour name or the 1-based number of an option.
fn resolve_choice(input: &str, options: &[AnswerOption]) -> String {
    input
        .parse::<usize>()
        .ok()
        .and_then(|index| index.checked_sub(1))
        .and_then(|index| options.get(index))
        .map(|option| option.label.clone())
        .unwrap_or_else(|| input.to_string())
}

fn describe_outcome(data: &Value) -> String {
    match data["outcome"].as_str() {
        Some("granted") => format!("Correct. {} unlocked", str_field(data, "package")),
        Some("next_round") => format!(
            "Correct. {} more round(s)",
            data["challenge"]["rounds_remaining"]
        ),
        Some("denied") => format!("Wrong. {} stays locked", str_field(data, "package")),
        Some("ignored") => "Answer ignored".to_string(),
        Some("no_challenge") => "No challenge is active".to_string(),
        _ => data.to_string(),
    }
}

fn render_challenge(active: &ChallengeView, color: bool) -> String {
    let puzzle = &active.puzzle;
    let mut out = format!(
        "Challenge #{} for {} ({} round(s) left)\n",
        active.challenge.id, active.challenge.locked_package, active.rounds_remaining
    );
    out.push_str(&format!(
        "Name the INK colour of: {}\n",
        paint(&puzzle.word.to_uppercase(), &puzzle.ink, color)
    ));
    for (index, option) in puzzle.options.iter().enumerate() {
        out.push_str(&format!(
            "  {}. {}\n",
            index + 1,
            paint(&option.label, &option.text_color, color)
        ));
    }
    out
}

fn paint(text: &str, color_name: &str, enabled: bool) -> String {
    match color_by_name(color_name).and_then(|c| hex_to_rgb(c.hex)) {
        Some((r, g, b)) if enabled => format!("\x1b[1;38;2;{};{};{}m{}\x1b[0m", r, g, b, text),
        _ => text.to_string(),
    }
}

fn hex_to_rgb(hex: &str) -> Option<(u8, u8, u8)> {
    let digits = hex.strip_prefix('#')?;
    if digits.len() != 6 {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&digits[range], 16).ok();
    Some((channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

fn str_field<'a>(data: &'a Value, key: &str) -> &'a str {
    data[key].as_str().unwrap_or("?")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn options() -> Vec<AnswerOption> {
        vec![
            AnswerOption {
                label: "Red".to_string(),
                text_color: "Blue".to_string(),
            },
            AnswerOption {
                label: "Blue".to_string(),
                text_color: "Red".to_string(),
            },
        ]
    }

    #[test]
    fn numeric_choice_maps_to_label() {
        assert_eq!(resolve_choice("2", &options()), "Blue");
        assert_eq!(resolve_choice("green", &options()), "green");
        assert_eq!(resolve_choice("0", &options()), "0");
        assert_eq!(resolve_choice("9", &options()), "9");
    }

    #[test]
    fn hex_parses_palette_colours() {
        assert_eq!(hex_to_rgb("#3366FF"), Some((0x33, 0x66, 0xFF)));
        assert_eq!(hex_to_rgb("3366FF"), None);
        assert_eq!(hex_to_rgb("#36F"), None);
    }

    #[test]
    fn paint_is_plain_when_disabled() {
        assert_eq!(paint("RED", "Blue", false), "RED");
        assert!(paint("RED", "Blue", true).contains("38;2;51;102;255"));
    }

    #[test]
    fn decodes_daemon_challenge_payload() {
        let payload = json!({
            "challenge": { "id": 4, "locked_package": "com.a", "started_at": "2026-01-30T12:00:00Z" },
            "puzzle": {
                "word": "Red",
                "ink": "Blue",
                "ink_hex": "#3366FF",
                "options": [{ "label": "Blue", "text_color": "Red" }],
                "expected_answer": "Blue"
            },
            "rounds_remaining": 1
        });
        let view = decode_challenge(&payload).unwrap();
        assert_eq!(view.challenge.id, 4);
        let rendered = render_challenge(&view, false);
        assert!(rendered.contains("Challenge #4 for com.a"));
        assert!(rendered.contains("1. Blue"));
    }

    #[test]
    fn outcome_descriptions() {
        assert_eq!(
            describe_outcome(&json!({ "outcome": "granted", "package": "com.a" })),
            "Correct. com.a unlocked"
        );
        assert_eq!(
            describe_outcome(&json!({ "outcome": "no_challenge" })),
            "No challenge is active"
        );
    }

    #[test]
    fn settings_updates_are_saved() {
        let dir = tempdir().unwrap();
        let storage = StorageConfig::with_root(dir.path().to_path_buf());
        let output = Output { json: true };

        settings(
            &output,
            &storage,
            SettingsAction::Set {
                timeout: Some(45),
                session_duration: None,
                rounds: Some(2),
                master_disable: None,
                sound: Some(true),
                vibration: None,
                theme: None,
            },
        )
        .unwrap();

        let saved = load_settings(&storage).unwrap();
        assert_eq!(saved.challenge_timeout_secs, 45);
        assert_eq!(saved.challenges_required, 2);
        assert!(saved.sound_enabled);
    }

    #[test]
    fn invalid_settings_are_not_saved() {
        let dir = tempdir().unwrap();
        let storage = StorageConfig::with_root(dir.path().to_path_buf());
        let mut settings_value = LockerSettings::default();
        apply_updates(
            &mut settings_value,
            SettingsUpdate {
                rounds: Some(0),
                ..Default::default()
            },
        );
        assert!(save_settings(&storage, &settings_value).is_err());
        assert!(!storage.settings_file().exists());
    }
}
