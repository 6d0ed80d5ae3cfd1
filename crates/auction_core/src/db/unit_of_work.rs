//! Explicit transactional scope for repository calls.
//!
//! # Responsibility
//! - Group repository writes into one atomic SQLite transaction.
//! - Release the transaction on every exit path.
//!
//! # Invariants
//! - A unit of work that is dropped without `commit` is rolled back.
//! - Writes issued through `connection()` are visible to later reads in the
//!   same unit of work; there is no session cache to flush.

use super::{DbError, DbResult};
use log::{debug, error};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::time::Instant;

/// One transaction, scoped to a logical operation.
pub struct UnitOfWork<'conn> {
    tx: Transaction<'conn>,
    started_at: Instant,
}

impl<'conn> UnitOfWork<'conn> {
    /// Begins a deferred transaction on `conn`.
    pub fn begin(conn: &'conn mut Connection) -> DbResult<Self> {
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Deferred)
            .map_err(|source| DbError::UnitOfWork {
                action: "begin",
                source,
            })?;
        debug!("event=uow_begin module=db status=ok");
        Ok(Self {
            tx,
            started_at: Instant::now(),
        })
    }

    /// Connection handle repositories should be built from.
    pub fn connection(&self) -> &Connection {
        &self.tx
    }

    /// Makes every write of this unit of work durable.
    pub fn commit(self) -> DbResult<()> {
        let started_at = self.started_at;
        match self.tx.commit() {
            Ok(()) => {
                debug!(
                    "event=uow_commit module=db status=ok duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=uow_commit module=db status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(DbError::UnitOfWork {
                    action: "commit",
                    source: err,
                })
            }
        }
    }

    /// Discards every write of this unit of work.
    pub fn rollback(self) -> DbResult<()> {
        let started_at = self.started_at;
        self.tx.rollback().map_err(|source| DbError::UnitOfWork {
            action: "rollback",
            source,
        })?;
        debug!(
            "event=uow_rollback module=db status=ok duration_ms={}",
            started_at.elapsed().as_millis()
        );
        Ok(())
    }
}

/// Runs `work` inside a fresh unit of work.
///
/// Commits when `work` returns `Ok`, rolls back when it returns `Err`. The
/// closure's error is returned unchanged; a failing rollback is logged and
/// does not replace it.
pub fn run_in_unit_of_work<T, E, F>(conn: &mut Connection, work: F) -> Result<T, E>
where
    F: FnOnce(&Connection) -> Result<T, E>,
    E: From<DbError>,
{
    let uow = UnitOfWork::begin(conn)?;
    match work(uow.connection()) {
        Ok(value) => {
            uow.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = uow.rollback() {
                error!("event=uow_rollback module=db status=error error={rollback_err}");
            }
            Err(err)
        }
    }
}
