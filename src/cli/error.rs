// Error handling utilities for consistent error messages and exit codes

use std::io::Write;
use std::process;

use crate::error::{BridgeError, EXIT_FATAL, EXIT_USER};

/// Environment variable consulted for the login password
pub const PASSWORD_ENV: &str = "CUBETRACK_PASSWORD";

/// Exit with a user error (exit code 1)
/// User errors are for invalid input, missing configuration, etc.
pub fn user_error(message: &str) -> ! {
    eprintln!("Error: {}", message);
    process::exit(EXIT_USER);
}

/// Pick the process exit code for an error that reached `main`
pub fn exit_code(error: &anyhow::Error) -> i32 {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<BridgeError>())
        .map(BridgeError::exit_code)
        .unwrap_or(EXIT_FATAL)
}

/// Print an error and its cause chain to stderr
pub fn report(error: &anyhow::Error) {
    eprintln!("Error: {}", error);
    let mut causes = error.chain().skip(1).peekable();
    if causes.peek().is_some() {
        eprintln!("\nCaused by:");
        for (indent, cause) in causes.enumerate() {
            eprintln!("{:indent$}  {}", "", cause, indent = indent + 1);
        }
    }
}

/// Obtain the login password: from the environment, or prompted on the terminal
///
/// Prompting is disabled when stdin carries cube readings.
pub fn read_password(email: &str, allow_prompt: bool) -> crate::error::Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        if !password.is_empty() {
            return Ok(password);
        }
    }

    if !allow_prompt {
        return Err(BridgeError::auth(format!(
            "No usable stored credential; set {} to log in",
            PASSWORD_ENV
        )));
    }

    eprint!("Hackaru password for {}: ", email);
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;

    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        Err(BridgeError::auth("No password given"))
    } else {
        Ok(password)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use crate::error::ConnectionError;

    #[test]
    fn test_exit_code_from_bridge_error() {
        let err = anyhow::Error::new(BridgeError::config("bad"));
        assert_eq!(exit_code(&err), EXIT_USER);
    }

    #[test]
    fn test_exit_code_looks_through_context() {
        let result: Result<(), BridgeError> = Err(ConnectionError::new("out of range").into());
        let err = result.context("Failed to connect to cube").unwrap_err();
        assert_eq!(exit_code(&err), EXIT_FATAL);
    }

    #[test]
    fn test_unknown_errors_are_fatal() {
        assert_eq!(exit_code(&anyhow::anyhow!("boom")), EXIT_FATAL);
    }
}
