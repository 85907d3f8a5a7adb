//! SQLite persistence for borrowers, loans, repayments and gamification

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::core::gamification::{self, RepaymentOutcome};
use crate::core::underwriting;
use crate::models::{
    AppError, AppResult, Badge, Decision, ErrorCode, FeatureVector, GamificationState, LoanRecord,
    RepaymentRecord, RepaymentStatus, DATE_FORMAT,
};

/// Loan application ready to persist
#[derive(Debug, Clone)]
pub struct NewApplication {
    pub user_id: String,
    pub features: FeatureVector,
    pub amount: f64,
    pub decision: Decision,
    pub score: f64,
    pub application_date: NaiveDate,
    pub due_date: NaiveDate,
    /// Seconds used to derive the loan id
    pub submitted_at_unix: i64,
}

#[derive(Debug, Clone)]
pub struct ApplicationRecorded {
    pub loan_id: String,
    pub first_application: bool,
    pub gamification: GamificationState,
    pub new_badges: Vec<Badge>,
}

#[derive(Debug, Clone)]
pub struct NewRepayment {
    pub user_id: String,
    pub loan_id: String,
    pub payment_date: NaiveDate,
    pub amount: f64,
    pub status: RepaymentStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DatabaseCounts {
    pub users: u64,
    pub loans: u64,
    pub repayments: u64,
}

/// Database connection and operations
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let db = Self::from_connection(conn)?;
        info!(path = %path.display(), "Database ready");
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> AppResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> AppResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::new(ErrorCode::DatabaseError, "Database mutex poisoned"))
    }

    // ==================== Applications ====================

    /// Store an application atomically: borrower profile, loan and points
    pub fn record_application(&self, app: &NewApplication) -> AppResult<ApplicationRecorded> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let prior_loans: i64 = tx.query_row(
            "SELECT COUNT(*) FROM loans WHERE user_id = ?1",
            params![app.user_id],
            |row| row.get(0),
        )?;
        let first_application = prior_loans == 0;

        let f = &app.features;
        tx.execute(
            "INSERT INTO users (user_id, transaction_frequency, avg_transaction_amount, \
                 utility_payment_consistency, airtime_topup_frequency) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(user_id) DO UPDATE SET \
                 transaction_frequency = excluded.transaction_frequency, \
                 avg_transaction_amount = excluded.avg_transaction_amount, \
                 utility_payment_consistency = excluded.utility_payment_consistency, \
                 airtime_topup_frequency = excluded.airtime_topup_frequency",
            params![
                app.user_id,
                f.transaction_frequency,
                f.avg_transaction_amount,
                f.utility_payment_consistency,
                f.airtime_topup_frequency
            ],
        )?;

        let base_id = underwriting::loan_id(&app.user_id, app.submitted_at_unix);
        let mut loan_id = base_id.clone();
        for candidate in underwriting::loan_id_candidates(&base_id) {
            if !loan_exists(&tx, &candidate)? {
                loan_id = candidate;
                break;
            }
        }

        tx.execute(
            "INSERT INTO loans (loan_id, user_id, amount, decision, score, application_date, due_date) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                loan_id,
                app.user_id,
                app.amount,
                app.decision.as_str(),
                app.score,
                format_date(app.application_date),
                format_date(app.due_date)
            ],
        )?;

        let state = read_gamification(&tx, &app.user_id)?;
        let (state, new_badges) = gamification::apply_application(state, first_application);
        write_gamification(&tx, &app.user_id, &state)?;

        tx.commit()?;
        debug!(user_id = %app.user_id, loan_id = %loan_id, "Application stored");

        Ok(ApplicationRecorded {
            loan_id,
            first_application,
            gamification: state,
            new_badges,
        })
    }

    // ==================== Lookups ====================

    pub fn find_user(&self, user_id: &str) -> AppResult<Option<FeatureVector>> {
        let conn = self.lock()?;
        let user = conn
            .query_row(
                "SELECT transaction_frequency, avg_transaction_amount, \
                     utility_payment_consistency, airtime_topup_frequency \
                 FROM users WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(FeatureVector::new(
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                    ))
                },
            )
            .optional()?;
        Ok(user)
    }

    pub fn find_loan(&self, loan_id: &str) -> AppResult<Option<LoanRecord>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT loan_id, user_id, amount, decision, score, application_date, due_date \
                 FROM loans WHERE loan_id = ?1",
                params![loan_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, f64>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((loan_id, user_id, amount, decision, score, applied, due)) = raw else {
            return Ok(None);
        };

        let decision = Decision::parse(&decision).ok_or_else(|| {
            AppError::new(
                ErrorCode::DatabaseCorrupt,
                format!("Unknown decision {:?} for loan {}", decision, loan_id),
            )
        })?;

        Ok(Some(LoanRecord {
            loan_id,
            user_id,
            amount,
            decision,
            score,
            application_date: parse_date(&applied)?,
            due_date: parse_date(&due)?,
        }))
    }

    /// Zeroed state when the borrower has none yet
    pub fn gamification(&self, user_id: &str) -> AppResult<GamificationState> {
        let conn = self.lock()?;
        read_gamification(&conn, user_id)
    }

    /// Repayment history in insertion order
    pub fn repayments_for(&self, user_id: &str) -> AppResult<Vec<RepaymentRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT payment_date, status, amount FROM repayments \
             WHERE user_id = ?1 ORDER BY repayment_id",
        )?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(date, status, amount)| {
                let status = RepaymentStatus::parse(&status).ok_or_else(|| {
                    AppError::new(
                        ErrorCode::DatabaseCorrupt,
                        format!("Unknown repayment status {:?}", status),
                    )
                })?;
                Ok(RepaymentRecord {
                    payment_date: parse_date(&date)?,
                    status,
                    amount,
                })
            })
            .collect()
    }

    pub fn has_repayment(&self, loan_id: &str) -> AppResult<bool> {
        let conn = self.lock()?;
        repayment_exists(&conn, loan_id)
    }

    // ==================== Repayments ====================

    /// Store a repayment and its gamification update in one transaction.
    /// A second repayment for the same loan is a conflict.
    pub fn record_repayment<F>(&self, repayment: &NewRepayment, update: F) -> AppResult<RepaymentOutcome>
    where
        F: FnOnce(GamificationState) -> RepaymentOutcome,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        if repayment_exists(&tx, &repayment.loan_id)? {
            return Err(AppError::conflict("Loan already repaid"));
        }

        let state = read_gamification(&tx, &repayment.user_id)?;
        let outcome = update(state);

        tx.execute(
            "INSERT INTO repayments (user_id, loan_id, payment_date, amount, status) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                repayment.user_id,
                repayment.loan_id,
                format_date(repayment.payment_date),
                repayment.amount,
                repayment.status.as_str()
            ],
        )?;
        write_gamification(&tx, &repayment.user_id, &outcome.state)?;

        tx.commit()?;
        debug!(
            user_id = %repayment.user_id,
            loan_id = %repayment.loan_id,
            status = %repayment.status,
            "Repayment stored"
        );
        Ok(outcome)
    }

    // ==================== Statistics ====================

    pub fn counts(&self) -> AppResult<DatabaseCounts> {
        let conn = self.lock()?;
        let count = |table: &str| -> AppResult<u64> {
            let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })?;
            Ok(n.max(0) as u64)
        };
        Ok(DatabaseCounts {
            users: count("users")?,
            loans: count("loans")?,
            repayments: count("repayments")?,
        })
    }
}

/// Initialize database schema
fn init_schema(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            user_id TEXT PRIMARY KEY,
            transaction_frequency REAL NOT NULL,
            avg_transaction_amount REAL NOT NULL,
            utility_payment_consistency REAL NOT NULL,
            airtime_topup_frequency REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS loans (
            loan_id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(user_id),
            amount REAL NOT NULL,
            decision TEXT NOT NULL,
            score REAL NOT NULL,
            application_date TEXT NOT NULL,
            due_date TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS repayments (
            repayment_id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL REFERENCES users(user_id),
            loan_id TEXT NOT NULL REFERENCES loans(loan_id),
            payment_date TEXT NOT NULL,
            amount REAL NOT NULL,
            status TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS user_gamification (
            user_id TEXT PRIMARY KEY REFERENCES users(user_id),
            repayment_streak INTEGER NOT NULL DEFAULT 0,
            points_earned INTEGER NOT NULL DEFAULT 0,
            badges_earned TEXT NOT NULL DEFAULT ''
        );

        CREATE INDEX IF NOT EXISTS idx_loans_user ON loans(user_id);
        CREATE INDEX IF NOT EXISTS idx_repayments_user ON repayments(user_id);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_repayments_loan ON repayments(loan_id);
        "#,
    )?;
    Ok(())
}

fn loan_exists(conn: &Connection, loan_id: &str) -> AppResult<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM loans WHERE loan_id = ?1",
            params![loan_id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn repayment_exists(conn: &Connection, loan_id: &str) -> AppResult<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM repayments WHERE loan_id = ?1 LIMIT 1",
            params![loan_id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn read_gamification(conn: &Connection, user_id: &str) -> AppResult<GamificationState> {
    let row = conn
        .query_row(
            "SELECT repayment_streak, points_earned, badges_earned \
             FROM user_gamification WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            },
        )
        .optional()?;

    Ok(match row {
        Some((streak, points, badges)) => GamificationState {
            repayment_streak: streak.clamp(0, u32::MAX as i64) as u32,
            points_earned: points.clamp(0, u32::MAX as i64) as u32,
            badges: GamificationState::parse_badges(badges.as_deref().unwrap_or("")),
        },
        None => GamificationState::default(),
    })
}

fn write_gamification(conn: &Connection, user_id: &str, state: &GamificationState) -> AppResult<()> {
    conn.execute(
        "INSERT INTO user_gamification (user_id, repayment_streak, points_earned, badges_earned) \
         VALUES (?1, ?2, ?3, ?4) \
         ON CONFLICT(user_id) DO UPDATE SET \
             repayment_streak = excluded.repayment_streak, \
             points_earned = excluded.points_earned, \
             badges_earned = excluded.badges_earned",
        params![
            user_id,
            state.repayment_streak,
            state.points_earned,
            state.badges_column()
        ],
    )?;
    Ok(())
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_date(raw: &str) -> AppResult<NaiveDate> {
    Ok(NaiveDate::parse_from_str(raw, DATE_FORMAT)?)
}
