//! Binary entrypoint for the conversation service.

use std::process::ExitCode;

use conversation_service::start_server;

/// Serve the conversation API until interrupted.
fn main() -> ExitCode {
    start_server::run()
}
