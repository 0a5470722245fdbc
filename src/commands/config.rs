use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use crate::cli::ConfigCmd;
use crate::types::{OutputFmt, emit};
use repline::config::Config;

pub async fn handle(cmd: ConfigCmd, config_path: &Path, fmt: OutputFmt) -> Result<()> {
    let mut cfg = Config::load(config_path)?;

    match cmd {
        ConfigCmd::List => {
            let entries = cfg.entries()?;
            let map: BTreeMap<_, _> = entries.iter().cloned().collect();
            emit(fmt, &map, || {
                println!("{}", "Config:".cyan().bold());
                for (k, v) in &entries {
                    println!("  {} = {}", k.green(), v);
                }
            });
        }

        ConfigCmd::Get { key } => match cfg.get(&key)? {
            Some(val) => println!("{}", val),
            None => println!("{} key `{}` not found", "warning:".yellow().bold(), key),
        },

        ConfigCmd::Set { key, val } => {
            cfg.set(&key, &val)?;
            cfg.save(config_path)?;
            println!("{} set `{}` = `{}`", "info:".blue().bold(), key.green(), val);
        }

        ConfigCmd::Unset { key } => {
            if cfg.unset(&key)? {
                cfg.save(config_path)?;
                println!("{} reset `{}` to its default", "info:".blue().bold(), key.green());
            } else {
                println!("{} key `{}` not found", "warning:".yellow().bold(), key);
            }
        }
    }

    Ok(())
}
