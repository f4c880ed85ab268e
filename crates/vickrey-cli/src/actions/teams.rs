use anyhow::{Context, Result};

use vickrey_broker::teams::{add_team, list_teams, reset_team};
use vickrey_core::config::Config;

use super::open_store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add(Vec<String>),
    Reset(String),
    List,
}

#[derive(Debug)]
pub struct Args {
    pub config: Config,
    pub command: Command,
}

pub fn execute(args: Args) -> Result<()> {
    let store = open_store(&args.config)?;
    match args.command {
        Command::Add(names) => {
            for name in names {
                let created = add_team(&store, &name)
                    .with_context(|| format!("failed to add team {name}"))?;
                if created {
                    println!("added {name}");
                } else {
                    println!("{name} already exists");
                }
            }
        }
        Command::Reset(name) => {
            reset_team(&store, &name).with_context(|| format!("failed to reset team {name}"))?;
            println!("reset {name}");
        }
        Command::List => {
            for team in list_teams(&store).context("failed to list teams")? {
                let state = if team.enrolled { "enrolled" } else { "pending" };
                let updated = team
                    .updated_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string());
                println!("{}\t{state}\t{updated}", team.username);
            }
        }
    }
    Ok(())
}
