// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Facilities used by command-line tools

use std::env::current_exe;
use std::process::exit;

/// Describes why a command exited early
#[derive(Debug)]
pub enum CmdError {
    /// incorrect command-line arguments
    Usage(String),
    /// operational failure after arguments were parsed
    Failure(String),
}

/// Prints an appropriate error message and exits the process
pub fn fatal(cmd_error: CmdError) -> ! {
    let arg0 = current_exe()
        .ok()
        .and_then(|path| {
            path.file_name().map(|f| f.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| String::from("command"));
    let (exit_code, message) = match cmd_error {
        CmdError::Usage(message) => (2, message),
        CmdError::Failure(message) => (1, message),
    };
    eprintln!("{}: {}", arg0, message);
    exit(exit_code);
}
