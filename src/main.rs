//! tinker-prep CLI
//!
//! Entry point for the `tinker-prep` command-line tool.

use std::env;
use std::process;

use tinker_prep::summary::ExitCode;

fn main() {
    let cwd = match env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("error: cannot determine the current directory: {e}");
            process::exit(ExitCode::Usage.as_i32());
        }
    };

    let code = tinker_prep::app::run(env::args_os(), &cwd);
    process::exit(code.as_i32());
}
