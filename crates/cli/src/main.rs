use std::process::ExitCode;

fn main() -> ExitCode {
    platter_cli::run()
}
