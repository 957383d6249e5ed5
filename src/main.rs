#![forbid(unsafe_code)]

use std::process::ExitCode;

fn main() -> ExitCode {
    dtask::cli::main()
}
