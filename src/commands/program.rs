use std::fs::read_to_string;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;

use crate::{
    cli::ProgramCmd,
    types::{OutputFmt, ProgramToml, emit},
};
use repline::error::StoreError;
use repline::models::{WorkoutDefinition, WorkoutState};
use repline::storage::WorkoutStore;
use repline::utils::format_weight;

#[derive(Serialize)]
struct ProgJson {
    idx: usize,
    name: String,
    exercises: usize,
    state: WorkoutState,
}

fn plain_len(s: &str) -> usize {
    let mut n = 0;
    let mut esc = false;
    for b in s.bytes() {
        match (esc, b) {
            (true, b'm') => esc = false,
            (true, _) => {}
            (false, 0x1B) => esc = true,
            (false, _) => n += 1,
        }
    }
    n
}

/// Looks a program up by its 1-based list index or its exact name.
pub async fn resolve(store: &dyn WorkoutStore, program: &str) -> Result<Option<WorkoutDefinition>> {
    if let Ok(idx) = program.parse::<usize>() {
        let defs = store.definitions().await?;
        return Ok(idx
            .checked_sub(1)
            .and_then(|i| defs.into_iter().nth(i))
            .map(|(d, _)| d));
    }
    Ok(store.find_definition(program).await?)
}

fn pretty_print(progs: &[ProgJson], defs: &[(WorkoutDefinition, WorkoutState)]) {
    if progs.is_empty() {
        println!("{}", "  (no programs found)".dimmed());
        return;
    }

    println!("{}", "Programs:".cyan().bold());

    let idx_w = progs.len().to_string().len();
    let mut left = Vec::<String>::new();
    let mut right = Vec::<String>::new();

    for (p, (def, _)) in progs.iter().zip(defs) {
        let idx = format!("{:>width$}", p.idx, width = idx_w).yellow();
        left.push(format!(" {} • {}", idx, p.name.bold()));
        right.push(match p.state {
            WorkoutState::Active => "in progress".green().to_string(),
            WorkoutState::Completed => "done".dimmed().to_string(),
            WorkoutState::Inactive => String::new(),
        });

        for (i, slot) in def.slots.iter().enumerate() {
            let connector = if i + 1 == def.slots.len() {
                "└─"
            } else {
                "├─"
            };
            left.push(format!(
                " {}   {} {}",
                " ".repeat(idx_w),
                connector,
                slot.exercise_name
            ));
            right.push(String::new());
        }
    }

    let pad_plain = left.iter().map(|s| plain_len(s)).max().unwrap_or(0);
    for (l, r) in left.into_iter().zip(right) {
        let pad = pad_plain + (l.len() - plain_len(&l));
        if r.is_empty() {
            println!("{}", l);
        } else {
            println!("{:<pad$} {} {}", l, "|".blue(), r, pad = pad);
        }
    }
}

fn print_definition(def: &WorkoutDefinition) {
    println!("{}", def.name.cyan().bold());
    for (i, slot) in def.slots.iter().enumerate() {
        let weight = slot
            .target_weight
            .map(format_weight)
            .unwrap_or_else(|| "-".into());
        println!(
            " {} • {} {}x{} @ {} {}",
            (i + 1).to_string().yellow(),
            slot.exercise_name.bold(),
            slot.target_sets,
            slot.target_reps,
            weight,
            format!("(rest {}s)", slot.rest_seconds).dimmed()
        );
    }
}

pub async fn handle(cmd: ProgramCmd, store: &dyn WorkoutStore, fmt: OutputFmt) -> Result<()> {
    match cmd {
        ProgramCmd::Import { files } => {
            if files.is_empty() {
                println!("{} no program file provided", "warning:".yellow().bold());
            }
            for f in files {
                match import_single_program(store, &f).await {
                    Ok(()) => {}
                    Err(e) => {
                        if let Some(io_err) = e.downcast_ref::<std::io::Error>() {
                            if io_err.kind() == std::io::ErrorKind::NotFound {
                                println!(
                                    "{} cannot open file `{}` – file not found",
                                    "error:".red().bold(),
                                    f
                                );
                                continue;
                            }
                        }
                        return Err(e);
                    }
                }
            }
        }

        ProgramCmd::List => {
            let defs = store.definitions().await?;
            let progs: Vec<ProgJson> = defs
                .iter()
                .enumerate()
                .map(|(i, (d, state))| ProgJson {
                    idx: i + 1,
                    name: d.name.clone(),
                    exercises: d.slots.len(),
                    state: *state,
                })
                .collect();

            emit(fmt, &progs, || pretty_print(&progs, &defs));
        }

        ProgramCmd::Show { program } => match resolve(store, &program).await? {
            Some(def) => emit(fmt, &def, || print_definition(&def)),
            None => println!("{} no program `{}`", "error:".red().bold(), program),
        },

        ProgramCmd::Delete { program } => {
            let Some(def) = resolve(store, &program).await? else {
                println!("{} no program `{}`", "error:".red().bold(), program);
                return Ok(());
            };
            if store.delete_definition(&def.name).await? {
                println!("{} deleted `{}`", "ok:".green().bold(), def.name);
            }
        }
    }
    Ok(())
}

async fn import_single_program(store: &dyn WorkoutStore, file: &str) -> Result<()> {
    let toml_str = read_to_string(file).with_context(|| format!("reading `{file}`"))?;
    let prog: ProgramToml =
        toml::from_str(&toml_str).with_context(|| format!("parsing `{file}`"))?;

    let def = match prog.into_definition() {
        Ok(def) => def,
        Err(e) => {
            println!("{} {} – skipped", "warning:".yellow().bold(), e);
            return Ok(());
        }
    };

    match store.save_definition(&def).await {
        Err(StoreError::Sqlx(sqlx::Error::Database(db_err)))
            if db_err.code() == Some("2067".into()) =>
        {
            println!(
                "{} program `{}` already exists – skipping",
                "warning:".yellow().bold(),
                def.name
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
        Ok(()) => {
            println!("{} `{}`", "ok:".green().bold(), def.name);
            Ok(())
        }
    }
}
