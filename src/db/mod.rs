use async_trait::async_trait;
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

use crate::error::StoreError;
use crate::microbet::BetStore;

pub mod models;
use models::*;

/// Length of the random part of a store-assigned micro-bet id.
const ID_LEN: usize = 20;

/// Thread-safe SQLite connection pool (single connection with mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    // ── Micro-bets ───────────────────────────────────────────────────────────

    /// Insert a new micro-bet and return its generated id.
    pub fn insert_micro_bet(&self, bet: &MicroBet) -> Result<String, StoreError> {
        let id = new_bet_id();
        let options = serde_json::to_string(&bet.options)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO micro_bets (
                id, question, options, sponsor, max_donation, status,
                answer, donation_amount, action_description, created_at, closed_at
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
            params![
                id,
                bet.question,
                options,
                bet.sponsor,
                bet.max_donation,
                bet.status.as_str(),
                bet.answer.map(|a| a.as_str()),
                bet.donation_amount,
                bet.action_description,
                bet.created_at,
                bet.closed_at,
            ],
        )?;
        Ok(id)
    }

    /// Write the resolution onto a bet and mark it closed.
    pub fn close_micro_bet(&self, id: &str, resolution: &Resolution) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE micro_bets
             SET status='closed', answer=?1, donation_amount=?2, action_description=?3, closed_at=?4
             WHERE id=?5",
            params![
                resolution.answer.as_str(),
                resolution.donation_amount,
                resolution.action_description,
                Utc::now(),
                id,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn get_micro_bet(&self, id: &str) -> Result<Option<StoredMicroBet>, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM micro_bets WHERE id=?1", BET_COLUMNS),
                params![id],
                map_micro_bet_row,
            )
            .optional()?;
        row.map(decode_micro_bet).transpose()
    }

    /// List the most recent micro-bets, newest first.
    pub fn list_recent_micro_bets(&self, limit: i64) -> Result<Vec<StoredMicroBet>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM micro_bets ORDER BY created_at DESC, rowid DESC LIMIT ?1",
            BET_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![limit], map_micro_bet_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(decode_micro_bet).collect()
    }

    pub fn count_micro_bets(&self, status: BetStatus) -> Result<i64, StoreError> {
        let conn = self.lock()?;
        let n = conn.query_row(
            "SELECT COUNT(*) FROM micro_bets WHERE status=?1",
            params![status.as_str()],
            |r| r.get(0),
        )?;
        Ok(n)
    }
}

#[async_trait]
impl BetStore for Database {
    async fn create(&self, bet: &MicroBet) -> Result<String, StoreError> {
        let db = self.clone();
        let bet = bet.clone();
        tokio::task::spawn_blocking(move || db.insert_micro_bet(&bet))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))?
    }

    async fn update(&self, id: &str, resolution: &Resolution) -> Result<(), StoreError> {
        let db = self.clone();
        let id = id.to_string();
        let resolution = resolution.clone();
        tokio::task::spawn_blocking(move || db.close_micro_bet(&id, &resolution))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))?
    }
}

fn new_bet_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LEN)
        .map(char::from)
        .collect();
    format!("mb_{}", suffix)
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

const BET_COLUMNS: &str = "id, question, options, sponsor, max_donation, status,
    answer, donation_amount, action_description, created_at, closed_at";

struct MicroBetRow {
    id: String,
    question: String,
    options: String,
    sponsor: String,
    max_donation: u32,
    status: String,
    answer: Option<String>,
    donation_amount: Option<u32>,
    action_description: Option<String>,
    created_at: chrono::DateTime<Utc>,
    closed_at: Option<chrono::DateTime<Utc>>,
}

fn map_micro_bet_row(row: &rusqlite::Row) -> rusqlite::Result<MicroBetRow> {
    Ok(MicroBetRow {
        id: row.get(0)?,
        question: row.get(1)?,
        options: row.get(2)?,
        sponsor: row.get(3)?,
        max_donation: row.get(4)?,
        status: row.get(5)?,
        answer: row.get(6)?,
        donation_amount: row.get(7)?,
        action_description: row.get(8)?,
        created_at: row.get(9)?,
        closed_at: row.get(10)?,
    })
}

fn decode_micro_bet(row: MicroBetRow) -> Result<StoredMicroBet, StoreError> {
    let corrupt = |msg: String| {
        StoreError::Sqlite(rusqlite::Error::InvalidColumnType(
            0,
            msg,
            rusqlite::types::Type::Text,
        ))
    };
    let status = row.status.parse::<BetStatus>().map_err(corrupt)?;
    let answer = row
        .answer
        .map(|a| a.parse::<BetAnswer>())
        .transpose()
        .map_err(corrupt)?;
    let stored = StoredMicroBet {
        id: row.id,
        bet: MicroBet {
            question: row.question,
            options: serde_json::from_str(&row.options)?,
            sponsor: row.sponsor,
            max_donation: row.max_donation,
            status,
            answer,
            donation_amount: row.donation_amount,
            action_description: row.action_description,
            created_at: row.created_at,
            closed_at: row.closed_at,
        },
    };
    if !stored.bet.is_consistent() {
        warn!(
            "Micro-bet {} is {} but its resolution fields disagree",
            stored.id,
            stored.bet.status.as_str()
        );
    }
    Ok(stored)
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS micro_bets (
    id                 TEXT    PRIMARY KEY,
    question           TEXT    NOT NULL,
    options            TEXT    NOT NULL,
    sponsor            TEXT    NOT NULL,
    max_donation       INTEGER NOT NULL,
    status             TEXT    NOT NULL DEFAULT 'active',
    answer             TEXT,
    donation_amount    INTEGER,
    action_description TEXT,
    created_at         TEXT    NOT NULL,
    closed_at          TEXT
);

CREATE INDEX IF NOT EXISTS idx_micro_bets_status ON micro_bets(status);
CREATE INDEX IF NOT EXISTS idx_micro_bets_created ON micro_bets(created_at);
"#;
