use std::collections::HashSet;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use repline::models::{ExerciseSlot, WorkoutDefinition};

const DEFAULT_REST_SECONDS: u32 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFmt {
    Pretty,
    Json,
}

impl OutputFmt {
    pub fn from_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Pretty }
    }
}

/// Prints `value` as JSON, or runs `pretty` for the human-readable form.
pub fn emit<T: Serialize>(fmt: OutputFmt, value: &T, pretty: impl FnOnce()) {
    match fmt {
        OutputFmt::Json => match serde_json::to_string_pretty(value) {
            Ok(s) => println!("{s}"),
            Err(e) => eprintln!("error: could not encode output: {e}"),
        },
        OutputFmt::Pretty => pretty(),
    }
}

/// A program file as written by the user.
#[derive(Debug, Deserialize)]
pub struct ProgramToml {
    pub name: String,
    pub exercises: Vec<SlotToml>,
}

#[derive(Debug, Deserialize)]
pub struct SlotToml {
    pub name: String,
    pub sets: u32,
    pub reps: u32,
    pub weight: Option<f64>,
    /// Seconds of rest after each set. Zero skips rest entirely.
    pub rest: Option<u32>,
}

impl ProgramToml {
    pub fn into_definition(self) -> Result<WorkoutDefinition> {
        if self.name.trim().is_empty() {
            bail!("program name must not be empty");
        }
        if self.exercises.is_empty() {
            bail!("program `{}` has no exercises", self.name);
        }

        let mut seen = HashSet::new();
        let dup: Vec<&str> = self
            .exercises
            .iter()
            .filter(|e| !seen.insert(e.name.as_str()))
            .map(|e| e.name.as_str())
            .collect();
        if !dup.is_empty() {
            bail!("program `{}` has duplicates: {}", self.name, dup.join(", "));
        }

        let mut slots = Vec::with_capacity(self.exercises.len());
        for (order, ex) in self.exercises.into_iter().enumerate() {
            if ex.sets == 0 || ex.reps == 0 {
                bail!("`{}` needs at least one set of one rep", ex.name);
            }
            if let Some(w) = ex.weight {
                if !w.is_finite() || w < 0.0 {
                    bail!("`{}` has an invalid weight {}", ex.name, w);
                }
            }
            slots.push(ExerciseSlot::new(
                order as u32,
                ex.name,
                ex.sets,
                ex.reps,
                ex.weight,
                ex.rest.unwrap_or(DEFAULT_REST_SECONDS),
            ));
        }

        Ok(WorkoutDefinition::new(self.name, slots))
    }
}
