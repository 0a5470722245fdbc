use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use sqlx::{
    Row, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    CompletedSet, ExerciseSlot, PersonalRecordEntry, Session, SessionStatus, WorkoutDefinition,
    WorkoutState,
};
use crate::storage::WorkoutStore;

pub type DB = SqlitePool;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS workouts (
    id           TEXT PRIMARY KEY,
    name         TEXT NOT NULL UNIQUE,
    state        TEXT NOT NULL DEFAULT 'inactive',
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS workout_slots (
    id             TEXT PRIMARY KEY,
    workout_id     TEXT NOT NULL REFERENCES workouts(id) ON DELETE CASCADE,
    order_index    INTEGER NOT NULL,
    exercise_name  TEXT NOT NULL,
    target_sets    INTEGER NOT NULL,
    target_reps    INTEGER NOT NULL,
    target_weight  REAL,
    rest_seconds   INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    id               TEXT PRIMARY KEY,
    workout_id       TEXT NOT NULL,
    workout_name     TEXT NOT NULL,
    started_at       TEXT NOT NULL,
    completed_at     TEXT,
    status           TEXT NOT NULL,
    elapsed_seconds  INTEGER NOT NULL DEFAULT 0,
    notes            TEXT
);

CREATE TABLE IF NOT EXISTS completed_sets (
    id             TEXT PRIMARY KEY,
    session_id     TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    slot_id        TEXT NOT NULL,
    exercise_name  TEXT NOT NULL,
    set_number     INTEGER NOT NULL,
    reps           INTEGER NOT NULL,
    weight         REAL NOT NULL,
    effort         INTEGER,
    completed_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_completed_sets_exercise
    ON completed_sets(exercise_name, completed_at);

CREATE TABLE IF NOT EXISTS personal_records (
    exercise_name  TEXT PRIMARY KEY,
    weight         REAL NOT NULL,
    reps           INTEGER NOT NULL,
    achieved_at    TEXT NOT NULL
);
"#;

pub async fn open(path: &str) -> Result<DB, StoreError> {
    let opts = SqliteConnectOptions::from_str(path)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(opts)
        .await?;

    migrate(&pool).await?;
    Ok(pool)
}

/// Private in-memory database. A single connection, since every SQLite
/// memory connection is its own database.
pub async fn open_in_memory() -> Result<DB, StoreError> {
    let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts)
        .await?;

    migrate(&pool).await?;
    Ok(pool)
}

pub async fn migrate(pool: &DB) -> Result<(), StoreError> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}

/// [`WorkoutStore`] over a SQLite pool. Timestamps are stored as RFC 3339 text.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: DB,
}

impl SqliteStore {
    pub fn new(pool: DB) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DB {
        &self.pool
    }

    async fn slots_for(&self, workout_id: &str) -> Result<Vec<ExerciseSlot>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_index, exercise_name, target_sets, target_reps,
                   target_weight, rest_seconds
            FROM   workout_slots
            WHERE  workout_id = ?
            ORDER  BY order_index
            "#,
        )
        .bind(workout_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| -> Result<ExerciseSlot, StoreError> {
                Ok(ExerciseSlot {
                    id: uuid_col(r, "id")?,
                    order_index: r.try_get::<i64, _>("order_index")? as u32,
                    exercise_name: r.try_get("exercise_name")?,
                    target_sets: r.try_get::<i64, _>("target_sets")? as u32,
                    target_reps: r.try_get::<i64, _>("target_reps")? as u32,
                    target_weight: r.try_get("target_weight")?,
                    rest_seconds: r.try_get::<i64, _>("rest_seconds")? as u32,
                })
            })
            .collect()
    }

    async fn definition_from_row(&self, r: &SqliteRow) -> Result<WorkoutDefinition, StoreError> {
        let id: String = r.try_get("id")?;
        Ok(WorkoutDefinition {
            id: parse_uuid(&id)?,
            name: r.try_get("name")?,
            slots: self.slots_for(&id).await?,
        })
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(raw).map_err(|e| StoreError::Corrupt(format!("uuid `{raw}`: {e}")))
}

fn uuid_col(r: &SqliteRow, col: &str) -> Result<Uuid, StoreError> {
    parse_uuid(&r.try_get::<String, _>(col)?)
}

fn parse_time(raw: &str) -> Result<DateTime<Local>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Local))
        .map_err(|e| StoreError::Corrupt(format!("timestamp `{raw}`: {e}")))
}

fn time_col(r: &SqliteRow, col: &str) -> Result<DateTime<Local>, StoreError> {
    parse_time(&r.try_get::<String, _>(col)?)
}

fn session_from_row(r: &SqliteRow) -> Result<Session, StoreError> {
    let completed_at: Option<String> = r.try_get("completed_at")?;
    Ok(Session {
        id: uuid_col(r, "id")?,
        workout_id: uuid_col(r, "workout_id")?,
        workout_name: r.try_get("workout_name")?,
        started_at: time_col(r, "started_at")?,
        completed_at: completed_at.as_deref().map(parse_time).transpose()?,
        status: r.try_get::<SessionStatus, _>("status")?,
        elapsed_seconds: r.try_get::<i64, _>("elapsed_seconds")? as u64,
        notes: r.try_get("notes")?,
    })
}

fn set_from_row(r: &SqliteRow) -> Result<CompletedSet, StoreError> {
    Ok(CompletedSet {
        id: uuid_col(r, "id")?,
        session_id: uuid_col(r, "session_id")?,
        slot_id: uuid_col(r, "slot_id")?,
        exercise_name: r.try_get("exercise_name")?,
        set_number: r.try_get::<i64, _>("set_number")? as u32,
        reps: r.try_get::<i64, _>("reps")? as u32,
        weight: r.try_get("weight")?,
        effort: r.try_get::<Option<i64>, _>("effort")?.map(|e| e as u8),
        completed_at: time_col(r, "completed_at")?,
    })
}

const SESSION_COLUMNS: &str =
    "id, workout_id, workout_name, started_at, completed_at, status, elapsed_seconds, notes";

#[async_trait]
impl WorkoutStore for SqliteStore {
    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sessions
              (id, workout_id, workout_name, started_at, completed_at, status, elapsed_seconds, notes)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(session.id.to_string())
        .bind(session.workout_id.to_string())
        .bind(&session.workout_name)
        .bind(session.started_at.to_rfc3339())
        .bind(session.completed_at.map(|t| t.to_rfc3339()))
        .bind(session.status)
        .bind(session.elapsed_seconds as i64)
        .bind(session.notes.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_session(&self, session: &Session) -> Result<(), StoreError> {
        let res = sqlx::query(
            r#"
            UPDATE sessions
            SET    completed_at = ?2, status = ?3, elapsed_seconds = ?4, notes = ?5
            WHERE  id = ?1
            "#,
        )
        .bind(session.id.to_string())
        .bind(session.completed_at.map(|t| t.to_rfc3339()))
        .bind(session.status)
        .bind(session.elapsed_seconds as i64)
        .bind(session.notes.as_deref())
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("session {}", session.id)));
        }
        Ok(())
    }

    async fn find_session(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        let q = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?");
        sqlx::query(&q)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(session_from_row)
            .transpose()
    }

    async fn recent_sessions(&self, limit: u32) -> Result<Vec<Session>, StoreError> {
        let q = format!("SELECT {SESSION_COLUMNS} FROM sessions ORDER BY started_at DESC LIMIT ?");
        sqlx::query(&q)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(session_from_row)
            .collect()
    }

    async fn completed_sessions(&self) -> Result<Vec<Session>, StoreError> {
        let q = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE status = ? ORDER BY started_at");
        sqlx::query(&q)
            .bind(SessionStatus::Completed)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(session_from_row)
            .collect()
    }

    async fn save_set(
        &self,
        set: &CompletedSet,
        record: Option<&PersonalRecordEntry>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO completed_sets
              (id, session_id, slot_id, exercise_name, set_number, reps, weight, effort, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(set.id.to_string())
        .bind(set.session_id.to_string())
        .bind(set.slot_id.to_string())
        .bind(&set.exercise_name)
        .bind(set.set_number as i64)
        .bind(set.reps as i64)
        .bind(set.weight)
        .bind(set.effort.map(i64::from))
        .bind(set.completed_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        if let Some(pr) = record {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO personal_records (exercise_name, weight, reps, achieved_at)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )
            .bind(&pr.exercise_name)
            .bind(pr.weight)
            .bind(pr.reps as i64)
            .bind(pr.achieved_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn sets_for_session(&self, session_id: Uuid) -> Result<Vec<CompletedSet>, StoreError> {
        sqlx::query(
            r#"
            SELECT id, session_id, slot_id, exercise_name, set_number, reps, weight, effort, completed_at
            FROM   completed_sets
            WHERE  session_id = ?
            ORDER  BY completed_at
            "#,
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(set_from_row)
        .collect()
    }

    async fn max_weight(&self, exercise_name: &str) -> Result<Option<f64>, StoreError> {
        Ok(
            sqlx::query_scalar::<_, Option<f64>>("SELECT MAX(weight) FROM completed_sets WHERE exercise_name = ?")
                .bind(exercise_name)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    async fn last_weight(&self, exercise_name: &str) -> Result<Option<f64>, StoreError> {
        Ok(sqlx::query_scalar::<_, f64>(
            r#"
            SELECT weight
            FROM   completed_sets
            WHERE  exercise_name = ?
            ORDER  BY completed_at DESC
            LIMIT  1
            "#,
        )
        .bind(exercise_name)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn personal_records(&self) -> Result<Vec<PersonalRecordEntry>, StoreError> {
        sqlx::query(
            "SELECT exercise_name, weight, reps, achieved_at FROM personal_records ORDER BY exercise_name",
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|r| -> Result<PersonalRecordEntry, StoreError> {
            Ok(PersonalRecordEntry {
                exercise_name: r.try_get("exercise_name")?,
                weight: r.try_get("weight")?,
                reps: r.try_get::<i64, _>("reps")? as u32,
                achieved_at: time_col(r, "achieved_at")?,
            })
        })
        .collect()
    }

    async fn set_workout_state(&self, workout_id: Uuid, state: WorkoutState) -> Result<(), StoreError> {
        sqlx::query("UPDATE workouts SET state = ? WHERE id = ?")
            .bind(state)
            .bind(workout_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_definition(&self, definition: &WorkoutDefinition) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO workouts (id, name, state, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(definition.id.to_string())
        .bind(&definition.name)
        .bind(WorkoutState::Inactive)
        .bind(Local::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for slot in &definition.slots {
            sqlx::query(
                r#"
                INSERT INTO workout_slots
                  (id, workout_id, order_index, exercise_name, target_sets, target_reps,
                   target_weight, rest_seconds)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(slot.id.to_string())
            .bind(definition.id.to_string())
            .bind(slot.order_index as i64)
            .bind(&slot.exercise_name)
            .bind(slot.target_sets as i64)
            .bind(slot.target_reps as i64)
            .bind(slot.target_weight)
            .bind(slot.rest_seconds as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_definition(&self, name: &str) -> Result<Option<WorkoutDefinition>, StoreError> {
        let row = sqlx::query("SELECT id, name FROM workouts WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => Ok(Some(self.definition_from_row(&r).await?)),
            None => Ok(None),
        }
    }

    async fn definition(&self, id: Uuid) -> Result<Option<WorkoutDefinition>, StoreError> {
        let row = sqlx::query("SELECT id, name FROM workouts WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => Ok(Some(self.definition_from_row(&r).await?)),
            None => Ok(None),
        }
    }

    async fn definitions(&self) -> Result<Vec<(WorkoutDefinition, WorkoutState)>, StoreError> {
        let rows = sqlx::query("SELECT id, name, state FROM workouts ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in &rows {
            let state: WorkoutState = r.try_get("state")?;
            out.push((self.definition_from_row(r).await?, state));
        }
        Ok(out)
    }

    async fn delete_definition(&self, name: &str) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM workouts WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
