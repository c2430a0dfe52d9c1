//! Command-line argument parsing.

use appointment_core::NewAppointment;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const USAGE: &str = "\
Usage: appointment <command> [options]

Commands:
  create --name <name> --phone <phone> --date <YYYY-MM-DD> --time <HH:MM> --reason <reason>
  list
  get <id>
  cancel <id>
  run        deliver stored reminders, picking up new ones, until Ctrl-C
  version
  help";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create(NewAppointment),
    List,
    Get(String),
    Cancel(String),
    Run,
    Version,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgsError {
    MissingCommand,
    UnknownCommand(String),
    MissingValue(&'static str),
    MissingArgument(&'static str),
    UnexpectedArgument(String),
}

impl Display for ArgsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingCommand => write!(f, "no command given"),
            Self::UnknownCommand(command) => write!(f, "unknown command `{command}`"),
            Self::MissingValue(flag) => write!(f, "flag `{flag}` requires a value"),
            Self::MissingArgument(name) => write!(f, "missing required argument <{name}>"),
            Self::UnexpectedArgument(arg) => write!(f, "unexpected argument `{arg}`"),
        }
    }
}

impl Error for ArgsError {}

/// Parses `args` without the program name.
pub fn parse_args(args: &[String]) -> Result<Command, ArgsError> {
    let Some(command) = args.first() else {
        return Err(ArgsError::MissingCommand);
    };
    let rest = &args[1..];

    match command.as_str() {
        "create" => parse_create(rest).map(Command::Create),
        "list" => no_more(rest).map(|_| Command::List),
        "get" => single_id(rest).map(Command::Get),
        "cancel" => single_id(rest).map(Command::Cancel),
        "run" => no_more(rest).map(|_| Command::Run),
        "version" | "--version" | "-V" => Ok(Command::Version),
        "help" | "--help" | "-h" => Ok(Command::Help),
        other => Err(ArgsError::UnknownCommand(other.to_string())),
    }
}

fn parse_create(args: &[String]) -> Result<NewAppointment, ArgsError> {
    let mut name = None;
    let mut phone = None;
    let mut date = None;
    let mut time = None;
    let mut reason = None;

    let mut i = 0;
    while i < args.len() {
        let slot = match args[i].as_str() {
            "--name" | "-n" => (&mut name, "--name"),
            "--phone" | "-p" => (&mut phone, "--phone"),
            "--date" | "-d" => (&mut date, "--date"),
            "--time" | "-t" => (&mut time, "--time"),
            "--reason" | "-r" => (&mut reason, "--reason"),
            other => return Err(ArgsError::UnexpectedArgument(other.to_string())),
        };
        let (target, flag) = slot;
        let value = args.get(i + 1).ok_or(ArgsError::MissingValue(flag))?;
        *target = Some(value.clone());
        i += 2;
    }

    Ok(NewAppointment {
        name: name.ok_or(ArgsError::MissingArgument("name"))?,
        phone: phone.ok_or(ArgsError::MissingArgument("phone"))?,
        date: date.ok_or(ArgsError::MissingArgument("date"))?,
        time: time.ok_or(ArgsError::MissingArgument("time"))?,
        reason: reason.ok_or(ArgsError::MissingArgument("reason"))?,
    })
}

fn single_id(args: &[String]) -> Result<String, ArgsError> {
    match args {
        [] => Err(ArgsError::MissingArgument("id")),
        [id] => Ok(id.clone()),
        [_, extra, ..] => Err(ArgsError::UnexpectedArgument(extra.clone())),
    }
}

fn no_more(args: &[String]) -> Result<(), ArgsError> {
    match args.first() {
        Some(extra) => Err(ArgsError::UnexpectedArgument(extra.clone())),
        None => Ok(()),
    }
}
