use anyhow::Result;
use dreampool_agent::Reply;
use dreampool_core::config::AppConfig;
use dreampool_core::domain::payload::Payload;
use dreampool_core::errors::{ApplicationError, DomainError};
use tokio::io::{self, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::commands::{build_runtime, CommandResult};
use crate::driver::TurnDriver;

const QUIT_COMMANDS: [&str; 2] = ["/quit", "/exit"];

/// Interactive session over stdin/stdout. Ends on completion, end of input
/// or `/quit`.
pub fn run(config: &AppConfig) -> CommandResult {
    let driver = match TurnDriver::from_config(config) {
        Ok(driver) => driver,
        Err(error) => {
            return CommandResult::failure("chat", "llm_client", format!("{error:#}"), 3);
        }
    };
    let runtime = match build_runtime("chat") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    match runtime.block_on(converse(&driver)) {
        Ok(Some(payload)) => {
            CommandResult::success_with("chat", "pool payload ready", Some(&payload))
        }
        Ok(None) => CommandResult::success("chat", "conversation ended before completion"),
        Err(error) => match error.downcast::<DomainError>() {
            Ok(domain) => {
                let error = ApplicationError::from(domain);
                let message = format!("{} ({error})", error.user_message());
                CommandResult::failure("chat", error.error_class(), message, 4)
            }
            Err(other) => CommandResult::failure("chat", "io", format!("{other:#}"), 4),
        },
    }
}

async fn converse(driver: &TurnDriver) -> Result<Option<Payload>> {
    let mut stdout = io::stdout();
    let mut lines = BufReader::new(io::stdin()).lines();

    let opening = driver.start()?;
    write_reply(&mut stdout, opening.reply.text()).await?;
    let mut state = opening.state;

    while let Some(line) = lines.next_line().await? {
        let utterance = line.trim();
        if utterance.is_empty() {
            continue;
        }
        if QUIT_COMMANDS.contains(&utterance) {
            break;
        }

        let outcome = driver.respond(&state, utterance).await?;
        write_reply(&mut stdout, outcome.reply.text()).await?;
        state = outcome.state;

        if let Reply::Completed { payload, .. } = outcome.reply {
            return Ok(Some(payload));
        }
    }

    Ok(None)
}

async fn write_reply<W>(out: &mut W, text: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    out.write_all(format!("{text}\n\n> ").as_bytes()).await?;
    out.flush().await?;
    Ok(())
}
