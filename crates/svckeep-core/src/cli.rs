//! Command-line mode selection.
//!
//! ```text
//! app -register [-quiet] [-description=<text>] [args...]
//! app -unregister [-quiet]
//! app -service
//! app [anything else]            (console mode)
//! ```
//!
//! Flags are matched case-insensitively.

/// Prefix of the description token accepted by `-register`.
pub const DESCRIPTION_PREFIX: &str = "-description=";

/// What the process was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceAction {
    /// Register the service.
    Register {
        /// Description, if given.
        description: Option<String>,
        /// Startup arguments to persist.
        startup_args: Vec<String>,
    },
    /// Unregister the service.
    Unregister,
    /// Run under the host service manager.
    Service,
    /// Run in the foreground.
    Console,
}

/// Parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// Selected action.
    pub action: ServiceAction,
    /// Diagnostics go to standard error instead of pop-ups.
    pub quiet: bool,
}

/// Parses `argv` (including argv[0]).
#[must_use]
pub fn parse_command_line(argv: &[String]) -> CommandLine {
    let flag = argv.get(1).map(|s| s.to_ascii_lowercase());
    let (action_kind, mut rest) = match flag.as_deref() {
        Some("-register") => (Some(true), &argv[2..]),
        Some("-unregister") => (Some(false), &argv[2..]),
        Some("-service") => {
            return CommandLine {
                action: ServiceAction::Service,
                quiet: false,
            };
        }
        _ => {
            return CommandLine {
                action: ServiceAction::Console,
                quiet: false,
            };
        }
    };

    let quiet = rest.first().is_some_and(|s| s.eq_ignore_ascii_case("-quiet"));
    if quiet {
        rest = &rest[1..];
    }

    let action = match action_kind {
        Some(true) => {
            let description = rest.first().and_then(|s| description_token(s));
            if description.is_some() {
                rest = &rest[1..];
            }
            ServiceAction::Register {
                description,
                startup_args: rest.to_vec(),
            }
        }
        _ => ServiceAction::Unregister,
    };
    CommandLine { action, quiet }
}

fn description_token(token: &str) -> Option<String> {
    let prefix = token.get(..DESCRIPTION_PREFIX.len())?;
    if prefix.eq_ignore_ascii_case(DESCRIPTION_PREFIX) {
        Some(token[DESCRIPTION_PREFIX.len()..].to_string())
    } else {
        None
    }
}
