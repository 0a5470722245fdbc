use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

use crate::types::{OutputFmt, emit};
use repline::models::{Session, SessionStatus};
use repline::session::ResumePoint;
use repline::storage::WorkoutStore;
use repline::utils::{format_duration, format_weight};

#[derive(Serialize)]
struct SessionJson {
    #[serde(flatten)]
    session: Session,
    sets: usize,
    resume: Option<ResumePoint>,
}

fn status_label(status: SessionStatus) -> String {
    match status {
        SessionStatus::Completed => status.to_string().green().to_string(),
        SessionStatus::SavedMidSession => "saved".yellow().to_string(),
        SessionStatus::Cancelled => status.to_string().red().to_string(),
        _ => status.to_string().dimmed().to_string(),
    }
}

pub async fn sessions(store: &dyn WorkoutStore, limit: u32, fmt: OutputFmt) -> Result<()> {
    let mut rows = Vec::new();
    for session in store.recent_sessions(limit).await? {
        let sets = store.sets_for_session(session.id).await?.len();
        let resume = session.notes.as_deref().and_then(ResumePoint::from_note);
        rows.push(SessionJson {
            session,
            sets,
            resume,
        });
    }

    emit(fmt, &rows, || {
        if rows.is_empty() {
            println!("{}", "  (no sessions yet)".dimmed());
            return;
        }
        println!("{}", "Sessions:".cyan().bold());
        for r in &rows {
            let s = &r.session;
            println!(
                " {} • {} {} {} sets, {}",
                s.started_at.format("%d-%m-%Y %H:%M").to_string().yellow(),
                s.workout_name.bold(),
                status_label(s.status),
                r.sets,
                format_duration(s.elapsed_seconds)
            );
            if let Some(point) = &r.resume {
                println!(
                    "   {} {} {}",
                    "└─".dimmed(),
                    point.summary,
                    format!("(repline resume {})", s.id).dimmed()
                );
            }
        }
    });
    Ok(())
}

pub async fn records(store: &dyn WorkoutStore, fmt: OutputFmt) -> Result<()> {
    let prs = store.personal_records().await?;

    emit(fmt, &prs, || {
        if prs.is_empty() {
            println!("{}", "  (no records yet)".dimmed());
            return;
        }
        println!("{}", "Personal records:".cyan().bold());
        let name_w = prs.iter().map(|p| p.exercise_name.len()).max().unwrap_or(0);
        for p in &prs {
            println!(
                " {}  {} x {}  {}",
                format!("{:<name_w$}", p.exercise_name).bold(),
                format_weight(p.weight),
                p.reps,
                p.achieved_at.format("%d-%m-%Y").to_string().dimmed()
            );
        }
    });
    Ok(())
}
