//! Command-line parsing for the agent binary.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::DEFAULT_CONFIG_FILE;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

pub const USAGE: &str =
    "Usage: dockwatch_agent [--config PATH|-c PATH] [--interval SECS|-i SECS] [--help|-h]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentArgs {
    pub config_path: PathBuf,
    pub interval: Duration,
    pub help: bool,
}

/// Watch interval when no flag is given: DOCKWATCH_AGENT_INTERVAL_SECS or 10s.
pub fn default_interval() -> Duration {
    std::env::var("DOCKWATCH_AGENT_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|&s| s > 0)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_INTERVAL)
}

fn parse_interval(v: Option<String>) -> Result<Duration, String> {
    let v = v.ok_or_else(|| format!("--interval needs a value\n{USAGE}"))?;
    match v.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(format!("invalid interval {v:?}: expected whole seconds >= 1\n{USAGE}")),
    }
}

pub fn parse_args<I: IntoIterator<Item = String>>(
    args: I,
    default_interval: Duration,
) -> Result<AgentArgs, String> {
    let mut it = args.into_iter();
    let _ = it.next(); // program name
    let mut config_path = PathBuf::from(DEFAULT_CONFIG_FILE);
    let mut interval = default_interval;
    let mut help = false;

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-h" | "--help" => help = true,
            "-c" | "--config" => {
                config_path = it
                    .next()
                    .map(PathBuf::from)
                    .ok_or_else(|| format!("--config needs a value\n{USAGE}"))?;
            }
            "-i" | "--interval" => interval = parse_interval(it.next())?,
            _ if arg.starts_with("--config=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    config_path = PathBuf::from(v);
                }
            }
            _ if arg.starts_with("--interval=") => {
                interval = parse_interval(arg.split_once('=').map(|(_, v)| v.to_string()))?;
            }
            _ => return Err(format!("unexpected argument {arg:?}\n{USAGE}")),
        }
    }
    Ok(AgentArgs {
        config_path,
        interval,
        help,
    })
}
