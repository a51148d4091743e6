use std::str::FromStr;

use snafu::{OptionExt, Snafu, ensure};

/// Tenant filled in by the `test-id` shortcut.
pub const TEST_TENANT_ID: &str = "test-demo-id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Tenant(String),
    Profile(Option<String>),
    Debug(bool),
    UseTestTenant,
    Init,
    Open,
    Close,
    ShowLauncher,
    HideLauncher,
    Reset,
    ClearLog,
    PrintLog,
    Status,
    Notify(String),
    Save,
    Help,
    Quit,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CommandError {
    #[snafu(display("empty command"))]
    Empty { stage: &'static str },
    #[snafu(display("unknown command '{name}', try `help`"))]
    Unknown { stage: &'static str, name: String },
    #[snafu(display("`{name}` needs an argument"))]
    MissingArgument {
        stage: &'static str,
        name: &'static str,
    },
    #[snafu(display("expected `on` or `off`, got '{value}'"))]
    InvalidToggle { stage: &'static str, value: String },
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        ensure!(!line.is_empty(), EmptySnafu { stage: "parse-command" });

        let (name, argument) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (line, ""),
        };
        let argument = (!argument.is_empty()).then_some(argument);

        let command = match name.to_ascii_lowercase().as_str() {
            "tenant" => Self::Tenant(required(argument, "tenant")?.to_string()),
            // A bare `profile` clears the optional profile.
            "profile" => Self::Profile(argument.map(str::to_string)),
            "debug" => Self::Debug(parse_toggle(required(argument, "debug")?)?),
            "test-id" => Self::UseTestTenant,
            "init" | "initialize" => Self::Init,
            "open" => Self::Open,
            "close" => Self::Close,
            "show" => Self::ShowLauncher,
            "hide" => Self::HideLauncher,
            "reset" => Self::Reset,
            "clear" => Self::ClearLog,
            "log" => Self::PrintLog,
            "status" => Self::Status,
            "notify" => Self::Notify(required(argument, "notify")?.to_string()),
            "save" => Self::Save,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            _ => {
                return UnknownSnafu {
                    stage: "parse-command",
                    name,
                }
                .fail();
            }
        };
        Ok(command)
    }
}

pub const HELP: &str = "\
commands:
  tenant <id>        set the tenant identifier
  profile [id]       set or clear the profile identifier
  debug on|off       toggle debug mode
  test-id            use the demo tenant identifier
  init               initialize the chat widget
  open | close       open or close the chat
  show | hide        show or hide the launcher
  notify <id>        simulate an inbound notification
  reset              tear the widget down
  clear              clear the event log
  log                print the event log
  status             print the session status
  save               persist tenant/profile/debug settings
  quit               exit";

fn required<'a>(argument: Option<&'a str>, name: &'static str) -> Result<&'a str, CommandError> {
    argument.context(MissingArgumentSnafu {
        stage: "parse-command-argument",
        name,
    })
}

fn parse_toggle(value: &str) -> Result<bool, CommandError> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" => Ok(true),
        "off" | "false" | "no" => Ok(false),
        _ => InvalidToggleSnafu {
            stage: "parse-command-toggle",
            value,
        }
        .fail(),
    }
}
