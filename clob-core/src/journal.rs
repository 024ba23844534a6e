//! Append-only restart journal: the log of admitted pairs, the `admit_seq`
//! high-water mark, and open-order mutations, written synchronously on the
//! admission-queue task and replayed linearly at boot. The authoritative
//! source of lock state remains ALA; this journal only lets a pair actor
//! rebuild its in-memory `BookStateStore` without re-querying the ledger for
//! every resting order. Grounded on the teacher's single-process bootstrap in
//! `matching_engine_service::main` (`tokio_main`'s env-driven startup), which
//! has no durable-state equivalent — this module is net new, since the spec's
//! restart requirement has no teacher counterpart to imitate directly.

use crate::types::{AdmitSeq, Order};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum JournalRecord {
    PairAdmitted { pair: String },
    OrderOpened { order: Box<Order> },
    OrderMutated { order: Box<Order> },
    OrderRemoved { order_id: crate::types::OrderId },
    AdmitSeqHighWaterMark { seq: AdmitSeq },
}

/// One append-only JSON-lines file per process. Every write is a single
/// `writeln!` guarded by a mutex and followed by `flush`; this is the
/// "synchronous on the admission-queue task" durability the spec calls for,
/// not a write-ahead log with fsync/group-commit semantics.
pub struct Journal {
    path: PathBuf,
    file: Mutex<File>,
}

impl Journal {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn append(&self, record: &JournalRecord) -> io::Result<()> {
        let line = serde_json::to_string(record).map_err(io::Error::other)?;
        let mut file = self.file.lock().expect("journal mutex poisoned");
        writeln!(file, "{line}")?;
        file.flush()
    }

    /// Replays every record in file order. Pair admission and order
    /// mutations are idempotent to replay (later records for the same order
    /// id supersede earlier ones), so the caller just folds them in order.
    pub fn replay(&self) -> io::Result<Vec<JournalRecord>> {
        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(%e, "skipping unparsable journal line");
                }
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LockHandle, OrderMode, OrderStatus, Side, Tif};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn sample_order() -> Order {
        Order {
            id: Uuid::new_v4(),
            owner: "alice".to_string(),
            pair: "BTC/USDT".to_string(),
            side: Side::Buy,
            mode: OrderMode::Limit,
            price: Some(Decimal::new(50000, 0)),
            quantity: Decimal::new(1, 0),
            filled: Decimal::ZERO,
            tif: Tif::Gtc,
            lock_handle: Some(LockHandle("lock-1".into())),
            admit_seq: 7,
            status: OrderStatus::Open,
            stop_loss: None,
            take_profit: None,
        }
    }

    #[test]
    fn appended_records_replay_in_order() {
        let dir = std::env::temp_dir().join(format!("clob-journal-test-{}", Uuid::new_v4()));
        let journal = Journal::open(&dir).unwrap();
        journal.append(&JournalRecord::PairAdmitted { pair: "BTC/USDT".into() }).unwrap();
        journal
            .append(&JournalRecord::OrderOpened { order: Box::new(sample_order()) })
            .unwrap();
        journal.append(&JournalRecord::AdmitSeqHighWaterMark { seq: 7 }).unwrap();

        let replayed = journal.replay().unwrap();
        assert_eq!(replayed.len(), 3);
        assert!(matches!(replayed[0], JournalRecord::PairAdmitted { .. }));
        assert!(matches!(replayed[2], JournalRecord::AdmitSeqHighWaterMark { seq: 7 }));
        std::fs::remove_file(&dir).ok();
    }
}
