use std::process::ExitCode;

fn main() -> ExitCode {
    scoutpoints_cli::run()
}
