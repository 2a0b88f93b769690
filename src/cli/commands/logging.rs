use clap::{builder::ValueParser, Arg, ArgAction, Command};

pub const ARG_VERBOSITY: &str = "verbosity";

const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Accepts a count (`0`..=`5`) or a level name, as `SESSIOND_LOG_LEVEL` may
/// carry either.
#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(|level: &str| -> Result<u8, String> {
        if let Some(count) = level.parse::<u8>().ok().filter(|count| *count <= 5) {
            return Ok(count);
        }
        let name = level.to_ascii_lowercase();
        LEVELS
            .iter()
            .position(|candidate| *candidate == name)
            .and_then(|index| u8::try_from(index).ok())
            .ok_or_else(|| format!("invalid log level: {level} (expected one of {LEVELS:?})"))
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help(
                "Log verbosity, repeat for more: -v warn, -vv info (session lifecycle), \
                 -vvv debug (rotations, rejected credentials), -vvvv trace",
            )
            .env("SESSIOND_LOG_LEVEL")
            .global(true)
            .action(ArgAction::Count)
            .value_parser(validator_log_level()),
    )
}
