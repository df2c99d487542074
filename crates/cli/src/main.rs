use std::process::ExitCode;

fn main() -> ExitCode {
    bushidage_cli::run()
}
