use std::process::ExitCode;

fn main() -> ExitCode {
    rise_cli::run()
}
