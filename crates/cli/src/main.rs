use std::process::ExitCode;

fn main() -> ExitCode {
    dialroute_cli::run()
}
