//! Map parsed arguments to an [`Action`].

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

use vickrey_core::config::{load_config, Config};

use crate::actions::{seed, serve, sync, teams, Action};
use crate::commands::{
    ARG_CONFIG, ARG_DRAFT_ID, ARG_EXPORT_DIR, ARG_LEAGUE, ARG_NAME, ARG_NAMES, ARG_PORT,
};

/// Load configuration and build the action for the chosen subcommand.
///
/// # Errors
/// Returns an error if the configuration cannot be loaded or a required
/// argument is missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let config_path = matches.get_one::<PathBuf>(ARG_CONFIG);
    let config = load_config(config_path.map(PathBuf::as_path))
        .context("failed to load configuration")?;
    action_for(matches, config)
}

fn action_for(matches: &clap::ArgMatches, mut config: Config) -> Result<Action> {
    match matches.subcommand() {
        Some(("seed", sub)) => {
            let league_id = sub
                .get_one::<String>(ARG_LEAGUE)
                .cloned()
                .context("missing required argument: --league")?;
            Ok(Action::Seed(seed::Args {
                config,
                league_id,
                export_dir: sub.get_one::<PathBuf>(ARG_EXPORT_DIR).cloned(),
            }))
        }
        Some(("serve", sub)) => {
            if let Some(port) = sub.get_one::<u16>(ARG_PORT) {
                config.broker.port = *port;
            }
            Ok(Action::Serve(serve::Args { config }))
        }
        Some(("sync", sub)) => {
            let draft_id = sub
                .get_one::<String>(ARG_DRAFT_ID)
                .cloned()
                .context("missing required argument: draft id")?;
            Ok(Action::Sync(sync::Args { config, draft_id }))
        }
        Some(("teams", sub)) => {
            let command = match sub.subcommand() {
                Some(("add", add)) => teams::Command::Add(
                    add.get_many::<String>(ARG_NAMES)
                        .map(|names| names.cloned().collect())
                        .unwrap_or_default(),
                ),
                Some(("reset", reset)) => teams::Command::Reset(
                    reset
                        .get_one::<String>(ARG_NAME)
                        .cloned()
                        .context("missing required argument: team name")?,
                ),
                Some(("list", _)) => teams::Command::List,
                _ => return Err(anyhow!("unknown teams subcommand")),
            };
            Ok(Action::Teams(teams::Args { config, command }))
        }
        _ => Err(anyhow!("unknown subcommand")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands;
    use vickrey_core::config::load_config_from_str;

    fn config() -> Config {
        load_config_from_str("", |_| None).unwrap()
    }

    fn action(args: &[&str]) -> Action {
        let matches = commands::new().try_get_matches_from(args).unwrap();
        action_for(&matches, config()).unwrap()
    }

    #[test]
    fn seed_action_carries_league_and_export_dir() {
        match action(&["vickrey", "seed", "--league", "L1", "--export-dir", "out"]) {
            Action::Seed(args) => {
                assert_eq!(args.league_id, "L1");
                assert_eq!(args.export_dir, Some(PathBuf::from("out")));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn serve_port_flag_overrides_config() {
        match action(&["vickrey", "serve", "--port", "9999"]) {
            Action::Serve(args) => assert_eq!(args.config.broker.port, 9999),
            other => panic!("unexpected action {other:?}"),
        }
        match action(&["vickrey", "serve"]) {
            Action::Serve(args) => assert_eq!(args.config.broker.port, 8080),
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn teams_subcommands() {
        match action(&["vickrey", "teams", "add", "a", "b"]) {
            Action::Teams(args) => assert_eq!(
                args.command,
                teams::Command::Add(vec!["a".into(), "b".into()])
            ),
            other => panic!("unexpected action {other:?}"),
        }
        match action(&["vickrey", "teams", "reset", "a"]) {
            Action::Teams(args) => assert_eq!(args.command, teams::Command::Reset("a".into())),
            other => panic!("unexpected action {other:?}"),
        }
        match action(&["vickrey", "teams", "list"]) {
            Action::Teams(args) => assert_eq!(args.command, teams::Command::List),
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let matches = commands::new()
            .try_get_matches_from(["vickrey", "--config", "/nonexistent/vickrey.toml", "teams", "list"])
            .unwrap();
        assert!(handler(&matches).is_err());
    }
}
