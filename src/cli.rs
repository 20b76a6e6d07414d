//! Minimal CLI parsing for one-shot modes.

use std::env;

use crate::jobs::JobKind;

pub const DEFAULT_LIST_LIMIT: i64 = 50;

/// What the process should do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Command {
    /// Run the scheduler until Ctrl-C
    #[default]
    Schedule,
    /// Run one job kind and exit
    Run(JobKind),
    /// Print a page of torrent views
    List { limit: i64, offset: i64 },
    ResetDb,
}

#[derive(Debug, Default)]
pub struct CliOptions {
    pub command: Command,
    /// Arguments that were not understood
    pub ignored: Vec<String>,
}

fn parse_count(value: Option<&str>, fallback: i64) -> i64 {
    value
        .and_then(|v| v.parse::<i64>().ok())
        .filter(|v| *v >= 0)
        .unwrap_or(fallback)
}

impl CliOptions {
    pub fn from_args() -> Self {
        Self::parse(env::args().skip(1))
    }

    pub fn parse<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut options = CliOptions::default();
        let mut list = false;
        let mut limit = DEFAULT_LIST_LIMIT;
        let mut offset = 0;

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let (flag, inline) = match arg.split_once('=') {
                Some((flag, value)) if flag.starts_with("--") => (flag.to_string(), Some(value.to_string())),
                _ => (arg.clone(), None),
            };

            match flag.as_str() {
                "--run" => {
                    let value = inline.or_else(|| args.next());
                    match value.as_deref().and_then(JobKind::from_arg) {
                        Some(kind) => options.command = Command::Run(kind),
                        None => options.ignored.push(arg),
                    }
                }
                "--list" => list = true,
                "--limit" => {
                    let value = inline.or_else(|| args.next());
                    limit = parse_count(value.as_deref(), DEFAULT_LIST_LIMIT);
                }
                "--offset" => {
                    let value = inline.or_else(|| args.next());
                    offset = parse_count(value.as_deref(), 0);
                }
                "--reset-db" => options.command = Command::ResetDb,
                _ => options.ignored.push(arg),
            }
        }

        if list && options.command == Command::Schedule {
            options.command = Command::List { limit, offset };
        }
        options
    }
}
