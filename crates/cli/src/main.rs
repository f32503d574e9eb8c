use std::process::ExitCode;

fn main() -> ExitCode {
    dreampool_cli::run()
}
