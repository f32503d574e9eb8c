use std::fs;
use std::path::Path;

use dreampool_core::config::AppConfig;
use dreampool_core::domain::payload::Payload;
use dreampool_core::errors::{ApplicationError, DomainError};
use serde::Serialize;

use crate::commands::{build_runtime, CommandResult};
use crate::driver::TurnDriver;

#[derive(Debug, Serialize)]
struct ReplayReport {
    session_id: String,
    complete: bool,
    exchanges: Vec<Exchange>,
    payload: Option<Payload>,
}

#[derive(Debug, Serialize)]
struct Exchange {
    user: String,
    reply: String,
}

/// Feeds every utterance of a script file through one session.
pub fn run(config: &AppConfig, script: &Path) -> CommandResult {
    let raw = match fs::read_to_string(script) {
        Ok(raw) => raw,
        Err(error) => {
            return CommandResult::failure(
                "replay",
                "script_read",
                format!("could not read script `{}`: {error}", script.display()),
                3,
            );
        }
    };

    let utterances = parse_script(&raw);
    if utterances.is_empty() {
        return CommandResult::failure(
            "replay",
            "empty_script",
            format!("script `{}` contains no utterances", script.display()),
            3,
        );
    }

    let driver = match TurnDriver::from_config(config) {
        Ok(driver) => driver,
        Err(error) => {
            return CommandResult::failure("replay", "llm_client", format!("{error:#}"), 3);
        }
    };
    let runtime = match build_runtime("replay") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    match runtime.block_on(replay(&driver, &utterances)) {
        Ok(report) => {
            let message = if report.complete {
                format!("replayed {} utterance(s); pool payload ready", report.exchanges.len())
            } else {
                format!("replayed {} utterance(s); still collecting", report.exchanges.len())
            };
            CommandResult::success_with("replay", message, Some(&report))
        }
        Err(error) => {
            let error = ApplicationError::from(error);
            let message = format!("{} ({error})", error.user_message());
            CommandResult::failure("replay", error.error_class(), message, 4)
        }
    }
}

/// One utterance per line. Blank lines and `#` comments are skipped.
pub fn parse_script(raw: &str) -> Vec<&str> {
    raw.lines().map(str::trim).filter(|line| !line.is_empty() && !line.starts_with('#')).collect()
}

async fn replay(driver: &TurnDriver, utterances: &[&str]) -> Result<ReplayReport, DomainError> {
    let mut state = driver.start()?.state;
    let mut exchanges = Vec::with_capacity(utterances.len());

    for utterance in utterances {
        let outcome = driver.respond(&state, utterance).await?;
        exchanges.push(Exchange {
            user: (*utterance).to_string(),
            reply: outcome.reply.text().to_string(),
        });
        state = outcome.state;
    }

    Ok(ReplayReport {
        session_id: state.session_id().to_string(),
        complete: state.is_complete(),
        exchanges,
        payload: state.payload().cloned(),
    })
}
