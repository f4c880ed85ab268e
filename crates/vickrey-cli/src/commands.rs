//! Argument definitions.

use std::path::PathBuf;

use clap::{value_parser, Arg, ArgAction, ColorChoice, Command};

pub const ARG_CONFIG: &str = "config";
pub const ARG_LOG_FILE: &str = "log-file";
pub const ARG_LEAGUE: &str = "league";
pub const ARG_EXPORT_DIR: &str = "export-dir";
pub const ARG_PORT: &str = "port";
pub const ARG_DRAFT_ID: &str = "draft-id";
pub const ARG_NAMES: &str = "names";
pub const ARG_NAME: &str = "name";

#[must_use]
pub fn new() -> Command {
    Command::new("vickrey")
        .about("Fantasy football auction draft backend")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new(ARG_CONFIG)
                .short('c')
                .long("config")
                .help("Path to vickrey.toml")
                .env("VICKREY_CONFIG")
                .global(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new(ARG_LOG_FILE)
                .long("log-file")
                .help("Write logs to this file instead of stderr")
                .env("VICKREY_LOG_FILE")
                .global(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .subcommand(seed())
        .subcommand(serve())
        .subcommand(sync())
        .subcommand(teams())
}

fn seed() -> Command {
    Command::new("seed")
        .about("Create a new draft from the league roster and player catalog")
        .arg(
            Arg::new(ARG_LEAGUE)
                .short('l')
                .long("league")
                .help("Sleeper league id")
                .env("VICKREY_LEAGUE_ID")
                .required(true),
        )
        .arg(
            Arg::new(ARG_EXPORT_DIR)
                .long("export-dir")
                .help("Also write draft_players.json and game_state.json here")
                .value_parser(value_parser!(PathBuf)),
        )
}

fn serve() -> Command {
    Command::new("serve")
        .about("Run the access broker and the page sync worker")
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long("port")
                .help("Port to listen on (overrides config)")
                .value_parser(value_parser!(u16).range(1..)),
        )
}

fn sync() -> Command {
    Command::new("sync")
        .about("Re-render all pages of one draft")
        .arg(Arg::new(ARG_DRAFT_ID).required(true).help("Draft id"))
}

fn teams() -> Command {
    Command::new("teams")
        .about("Manage team credential records")
        .subcommand_required(true)
        .subcommand(
            Command::new("add").about("Provision teams").arg(
                Arg::new(ARG_NAMES)
                    .required(true)
                    .num_args(1..)
                    .action(ArgAction::Append)
                    .help("Team usernames"),
            ),
        )
        .subcommand(
            Command::new("reset")
                .about("Clear a team's password so the next login sets a new one")
                .arg(Arg::new(ARG_NAME).required(true).help("Team username")),
        )
        .subcommand(Command::new("list").about("List teams"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        new().debug_assert();
    }

    #[test]
    fn seed_requires_a_league() {
        let result = new().try_get_matches_from(["vickrey", "seed"]);
        if std::env::var_os("VICKREY_LEAGUE_ID").is_none() {
            assert!(result.is_err());
        }
    }

    #[test]
    fn global_args_work_after_subcommand() {
        let matches = new()
            .try_get_matches_from(["vickrey", "sync", "d1", "--config", "x.toml"])
            .unwrap();
        assert_eq!(
            matches.get_one::<PathBuf>(ARG_CONFIG),
            Some(&PathBuf::from("x.toml"))
        );
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "sync");
        assert_eq!(sub.get_one::<String>(ARG_DRAFT_ID).unwrap(), "d1");
    }

    #[test]
    fn port_zero_rejected() {
        assert!(new()
            .try_get_matches_from(["vickrey", "serve", "--port", "0"])
            .is_err());
    }

    #[test]
    fn teams_add_takes_many_names() {
        let matches = new()
            .try_get_matches_from(["vickrey", "teams", "add", "alice", "bob"])
            .unwrap();
        let (_, teams) = matches.subcommand().unwrap();
        let (_, add) = teams.subcommand().unwrap();
        let names: Vec<&str> = add
            .get_many::<String>(ARG_NAMES)
            .unwrap()
            .map(String::as_str)
            .collect();
        assert_eq!(names, vec!["alice", "bob"]);
    }
}
