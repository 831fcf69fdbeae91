//! KvStore — redb-backed transactional key-value store.
//!
//! A [`Transaction`] reads from the redb read snapshot taken at begin time
//! and buffers all writes in memory. At commit the redb write lock is taken,
//! the transaction's read-conflict ranges are checked against the per-key
//! last-write versions, and the buffered mutations are applied in one redb
//! write transaction. Either everything becomes visible or nothing does.
//!
//! Version rows at or below the oldest read version still in use can never
//! cause a conflict, so every [`VERSION_PRUNE_INTERVAL`] commits they are
//! dropped from `KV_VERSIONS`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use metagrid_core::printable;
use redb::{Database, ReadTransaction, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::subspace::key_after;
use crate::tables::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// First byte of the reserved system keyspace.
pub const SYSTEM_KEY_PREFIX: u8 = 0xff;

/// Commits between two prunes of the per-key version table.
pub const VERSION_PRUNE_INTERVAL: u64 = 256;

/// Read versions of open transactions, with a count per version.
type LiveReads = Arc<Mutex<BTreeMap<u64, usize>>>;

/// Per-transaction options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOption {
    /// Allow reads and writes of keys in the reserved `0xff` keyspace.
    AccessSystemKeys,
}

/// Thread-safe transactional store backed by redb.
#[derive(Clone)]
pub struct KvStore {
    db: Arc<Database>,
    live_reads: LiveReads,
}

impl KvStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            live_reads: LiveReads::default(),
        };
        store.ensure_tables()?;
        debug!(?path, "kv store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            live_reads: LiveReads::default(),
        };
        store.ensure_tables()?;
        debug!("in-memory kv store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(KV).map_err(map_err!(Table))?;
        txn.open_table(KV_VERSIONS).map_err(map_err!(Table))?;
        txn.open_table(KV_META).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Begin a transaction reading from the current committed snapshot.
    pub fn begin(&self) -> StateResult<Transaction> {
        // Held until the read version is registered, so a concurrent prune
        // cannot pass over it.
        let mut live = self.live_reads.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = self.db.begin_read().map_err(map_err!(Transaction))?;
        let read_version = {
            let meta = snapshot.open_table(KV_META).map_err(map_err!(Table))?;
            meta.get(COMMIT_VERSION)
                .map_err(map_err!(Read))?
                .map(|guard| guard.value())
                .unwrap_or(0)
        };
        *live.entry(read_version).or_default() += 1;
        Ok(Transaction {
            db: self.db.clone(),
            live_reads: self.live_reads.clone(),
            snapshot,
            read_version,
            access_system_keys: false,
            writes: BTreeMap::new(),
            cleared: Vec::new(),
            read_conflicts: Vec::new(),
        })
    }
}

/// A unit of atomic work against a [`KvStore`].
///
/// Dropping a transaction without committing discards its writes.
pub struct Transaction {
    db: Arc<Database>,
    live_reads: LiveReads,
    snapshot: ReadTransaction,
    read_version: u64,
    access_system_keys: bool,
    /// Buffered point mutations; `None` is a clear.
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    /// Buffered range clears, applied before `writes` at commit.
    cleared: Vec<(Vec<u8>, Vec<u8>)>,
    read_conflicts: Vec<(Vec<u8>, Vec<u8>)>,
}

impl Drop for Transaction {
    fn drop(&mut self) {
        let mut live = self.live_reads.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = live.get_mut(&self.read_version) {
            *count -= 1;
            if *count == 0 {
                live.remove(&self.read_version);
            }
        }
    }
}

impl Transaction {
    pub fn set_option(&mut self, option: TransactionOption) {
        match option {
            TransactionOption::AccessSystemKeys => self.access_system_keys = true,
        }
    }

    /// Commit version of the snapshot this transaction reads from.
    pub fn read_version(&self) -> u64 {
        self.read_version
    }

    /// True if nothing has been written or cleared yet.
    pub fn is_read_only(&self) -> bool {
        self.writes.is_empty() && self.cleared.is_empty()
    }

    fn check_key(&self, key: &[u8]) -> StateResult<()> {
        if !self.access_system_keys && key.first() == Some(&SYSTEM_KEY_PREFIX) {
            return Err(StateError::KeyOutsideLegalRange(printable(key)));
        }
        Ok(())
    }

    fn check_range(&self, begin: &[u8], end: &[u8]) -> StateResult<()> {
        self.check_key(begin)?;
        if !self.access_system_keys && end > [SYSTEM_KEY_PREFIX].as_slice() {
            return Err(StateError::KeyOutsideLegalRange(printable(end)));
        }
        Ok(())
    }

    fn locally_cleared(&self, key: &[u8]) -> bool {
        self.cleared
            .iter()
            .any(|(begin, end)| key >= begin.as_slice() && key < end.as_slice())
    }

    /// Read a single key.
    pub fn get(&mut self, key: &[u8]) -> StateResult<Option<Vec<u8>>> {
        self.check_key(key)?;
        if let Some(local) = self.writes.get(key) {
            return Ok(local.clone());
        }
        if self.locally_cleared(key) {
            return Ok(None);
        }
        let value = {
            let table = self.snapshot.open_table(KV).map_err(map_err!(Table))?;
            table
                .get(key)
                .map_err(map_err!(Read))?
                .map(|guard| guard.value().to_vec())
        };
        self.read_conflicts.push((key.to_vec(), key_after(key)));
        Ok(value)
    }

    /// Read up to `limit` key-value pairs in `[begin, end)`, in key order.
    pub fn get_range(
        &mut self,
        begin: &[u8],
        end: &[u8],
        limit: usize,
    ) -> StateResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.check_range(begin, end)?;
        if limit == 0 || begin >= end {
            return Ok(Vec::new());
        }

        let mut results: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
        {
            let table = self.snapshot.open_table(KV).map_err(map_err!(Table))?;
            let mut stored = table.range::<&[u8]>(begin..end).map_err(map_err!(Read))?;
            let mut local = self
                .writes
                .range(begin.to_vec()..end.to_vec())
                .filter_map(|(k, v)| v.as_ref().map(|v| (k.clone(), v.clone())))
                .peekable();

            let mut next_stored = || -> StateResult<Option<(Vec<u8>, Vec<u8>)>> {
                for entry in stored.by_ref() {
                    let (k, v) = entry.map_err(map_err!(Read))?;
                    let key = k.value();
                    // Keys touched locally are served from the write buffer.
                    if self.writes.contains_key(key) || self.locally_cleared(key) {
                        continue;
                    }
                    return Ok(Some((key.to_vec(), v.value().to_vec())));
                }
                Ok(None)
            };

            let mut pending = next_stored()?;
            while results.len() < limit {
                let take_local = match (&pending, local.peek()) {
                    (None, None) => break,
                    (Some(_), None) => false,
                    (None, Some(_)) => true,
                    (Some((sk, _)), Some((lk, _))) => lk < sk,
                };
                if take_local {
                    if let Some(entry) = local.next() {
                        results.push(entry);
                    }
                } else if let Some(entry) = pending.take() {
                    results.push(entry);
                    pending = next_stored()?;
                }
            }
        }

        // A full page only depends on the keys up to the last one returned.
        let conflict_end = match results.last() {
            Some((last, _)) if results.len() == limit => key_after(last),
            _ => end.to_vec(),
        };
        self.read_conflicts.push((begin.to_vec(), conflict_end));
        Ok(results)
    }

    pub fn set(&mut self, key: &[u8], value: &[u8]) -> StateResult<()> {
        self.check_key(key)?;
        self.writes.insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    pub fn clear(&mut self, key: &[u8]) -> StateResult<()> {
        self.check_key(key)?;
        self.writes.insert(key.to_vec(), None);
        Ok(())
    }

    /// Clear every key in `[begin, end)`.
    pub fn clear_range(&mut self, begin: &[u8], end: &[u8]) -> StateResult<()> {
        self.check_range(begin, end)?;
        if begin >= end {
            return Ok(());
        }
        self.writes
            .retain(|k, _| k.as_slice() < begin || k.as_slice() >= end);
        self.cleared.push((begin.to_vec(), end.to_vec()));
        Ok(())
    }

    /// Discard all buffered writes.
    pub fn cancel(self) {
        debug!(read_version = self.read_version, "transaction cancelled");
    }

    /// Atomically apply buffered writes. Returns the commit version, or the
    /// read version for read-only transactions.
    pub fn commit(self) -> StateResult<u64> {
        if self.is_read_only() {
            return Ok(self.read_version);
        }

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let commit_version;
        {
            let mut meta = txn.open_table(KV_META).map_err(map_err!(Table))?;
            let mut versions = txn.open_table(KV_VERSIONS).map_err(map_err!(Table))?;
            let mut data = txn.open_table(KV).map_err(map_err!(Table))?;

            for (begin, end) in &self.read_conflicts {
                for entry in versions
                    .range::<&[u8]>(begin.as_slice()..end.as_slice())
                    .map_err(map_err!(Read))?
                {
                    let (key, version) = entry.map_err(map_err!(Read))?;
                    if version.value() > self.read_version {
                        debug!(
                            key = %printable(key.value()),
                            read_version = self.read_version,
                            "commit conflict"
                        );
                        return Err(StateError::Conflict);
                    }
                }
            }

            commit_version = meta
                .get(COMMIT_VERSION)
                .map_err(map_err!(Read))?
                .map(|guard| guard.value())
                .unwrap_or(0)
                + 1;

            for (begin, end) in &self.cleared {
                let doomed: Vec<Vec<u8>> = data
                    .range::<&[u8]>(begin.as_slice()..end.as_slice())
                    .map_err(map_err!(Read))?
                    .map(|entry| entry.map(|(k, _)| k.value().to_vec()))
                    .collect::<Result<_, _>>()
                    .map_err(map_err!(Read))?;
                for key in &doomed {
                    data.remove(key.as_slice()).map_err(map_err!(Write))?;
                    versions
                        .insert(key.as_slice(), commit_version)
                        .map_err(map_err!(Write))?;
                }
            }

            for (key, value) in &self.writes {
                match value {
                    Some(value) => {
                        data.insert(key.as_slice(), value.as_slice())
                            .map_err(map_err!(Write))?;
                    }
                    None => {
                        data.remove(key.as_slice()).map_err(map_err!(Write))?;
                    }
                }
                versions
                    .insert(key.as_slice(), commit_version)
                    .map_err(map_err!(Write))?;
            }

            meta.insert(COMMIT_VERSION, commit_version)
                .map_err(map_err!(Write))?;

            if commit_version % VERSION_PRUNE_INTERVAL == 0 {
                let live = self.live_reads.lock().unwrap_or_else(PoisonError::into_inner);
                // This transaction is still registered, so the bound is at
                // most its own read version.
                let horizon = live
                    .keys()
                    .next()
                    .copied()
                    .unwrap_or(self.read_version);
                versions
                    .retain(|_, version| version > horizon)
                    .map_err(map_err!(Write))?;
                debug!(commit_version, horizon, "version table pruned");
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(
            commit_version,
            writes = self.writes.len(),
            range_clears = self.cleared.len(),
            "transaction committed"
        );
        Ok(commit_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> KvStore {
        KvStore::open_in_memory().unwrap()
    }

    fn put(store: &KvStore, key: &[u8], value: &[u8]) {
        let mut tx = store.begin().unwrap();
        tx.set_option(TransactionOption::AccessSystemKeys);
        tx.set(key, value).unwrap();
        tx.commit().unwrap();
    }

    #[test]
    fn set_commit_and_get() {
        let store = store();
        put(&store, b"a", b"1");

        let mut tx = store.begin().unwrap();
        assert_eq!(tx.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(tx.get(b"b").unwrap(), None);
    }

    #[test]
    fn uncommitted_writes_are_invisible() {
        let store = store();
        let mut tx = store.begin().unwrap();
        tx.set(b"a", b"1").unwrap();
        assert_eq!(tx.get(b"a").unwrap(), Some(b"1".to_vec()));
        tx.cancel();

        let mut tx = store.begin().unwrap();
        assert_eq!(tx.get(b"a").unwrap(), None);
    }

    #[test]
    fn read_only_commit_keeps_version() {
        let store = store();
        put(&store, b"a", b"1");
        let mut tx = store.begin().unwrap();
        let rv = tx.read_version();
        tx.get(b"a").unwrap();
        assert_eq!(tx.commit().unwrap(), rv);
    }

    #[test]
    fn system_keys_require_option() {
        let store = store();
        let mut tx = store.begin().unwrap();
        assert!(matches!(
            tx.set(b"\xff/x", b"1"),
            Err(StateError::KeyOutsideLegalRange(_))
        ));
        assert!(tx.get(b"\xff/x").is_err());
        assert!(tx.get_range(b"a", b"\xff\xff", 10).is_err());
        // Ranges ending exactly at the system boundary are legal.
        assert!(tx.get_range(b"a", b"\xff", 10).is_ok());

        tx.set_option(TransactionOption::AccessSystemKeys);
        tx.set(b"\xff/x", b"1").unwrap();
        tx.commit().unwrap();
    }

    #[test]
    fn range_merges_local_writes_in_order() {
        let store = store();
        put(&store, b"b", b"stored-b");
        put(&store, b"d", b"stored-d");
        put(&store, b"f", b"stored-f");

        let mut tx = store.begin().unwrap();
        tx.set(b"a", b"local-a").unwrap();
        tx.set(b"d", b"local-d").unwrap();
        tx.clear(b"f").unwrap();
        tx.set(b"e", b"local-e").unwrap();

        let keys: Vec<(Vec<u8>, Vec<u8>)> = tx.get_range(b"a", b"z", 100).unwrap();
        assert_eq!(
            keys,
            vec![
                (b"a".to_vec(), b"local-a".to_vec()),
                (b"b".to_vec(), b"stored-b".to_vec()),
                (b"d".to_vec(), b"local-d".to_vec()),
                (b"e".to_vec(), b"local-e".to_vec()),
            ]
        );

        let limited = tx.get_range(b"a", b"z", 2).unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[1].0, b"b".to_vec());
    }

    #[test]
    fn clear_range_then_set() {
        let store = store();
        for key in [b"k1", b"k2", b"k3"] {
            put(&store, key, b"v");
        }

        let mut tx = store.begin().unwrap();
        tx.set(b"k2", b"early").unwrap();
        tx.clear_range(b"k1", b"k3").unwrap();
        tx.set(b"k2", b"late").unwrap();
        assert_eq!(tx.get(b"k1").unwrap(), None);
        tx.commit().unwrap();

        let mut tx = store.begin().unwrap();
        let all = tx.get_range(b"k", b"l", 10).unwrap();
        assert_eq!(
            all,
            vec![
                (b"k2".to_vec(), b"late".to_vec()),
                (b"k3".to_vec(), b"v".to_vec()),
            ]
        );
    }

    #[test]
    fn concurrent_read_modify_write_conflicts() {
        let store = store();
        put(&store, b"counter", b"0");

        let mut first = store.begin().unwrap();
        let mut second = store.begin().unwrap();
        first.get(b"counter").unwrap();
        second.get(b"counter").unwrap();
        first.set(b"counter", b"1").unwrap();
        second.set(b"counter", b"1").unwrap();

        first.commit().unwrap();
        assert!(matches!(second.commit(), Err(StateError::Conflict)));
    }

    #[test]
    fn range_read_conflicts_with_insert() {
        let store = store();
        let mut reader = store.begin().unwrap();
        assert!(reader.get_range(b"m/", b"m0", 10).unwrap().is_empty());
        reader.set(b"summary", b"empty").unwrap();

        put(&store, b"m/new", b"x");
        assert!(matches!(reader.commit(), Err(StateError::Conflict)));
    }

    #[test]
    fn blind_writes_never_conflict() {
        let store = store();
        let mut first = store.begin().unwrap();
        let mut second = store.begin().unwrap();
        first.set(b"k", b"1").unwrap();
        second.set(b"k", b"2").unwrap();
        first.commit().unwrap();
        second.commit().unwrap();

        let mut tx = store.begin().unwrap();
        assert_eq!(tx.get(b"k").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn disjoint_keys_do_not_conflict() {
        let store = store();
        let mut first = store.begin().unwrap();
        let mut second = store.begin().unwrap();
        first.get(b"a").unwrap();
        second.get(b"b").unwrap();
        first.set(b"a", b"1").unwrap();
        second.set(b"b", b"1").unwrap();
        first.commit().unwrap();
        second.commit().unwrap();
    }

    fn version_rows(store: &KvStore) -> usize {
        let txn = store.db.begin_read().unwrap();
        let versions = txn.open_table(KV_VERSIONS).unwrap();
        versions.iter().unwrap().count()
    }

    #[test]
    fn version_table_is_pruned() {
        let store = store();
        for i in 0..VERSION_PRUNE_INTERVAL {
            put(&store, format!("key/{i:04}").as_bytes(), b"v");
        }
        // The pruning commit only keeps its own row.
        assert_eq!(version_rows(&store), 1);
        assert!(store.live_reads.lock().unwrap().is_empty());
    }

    #[test]
    fn pruning_keeps_rows_newer_than_open_reads() {
        let store = store();
        put(&store, b"watched", b"0");

        let mut reader = store.begin().unwrap();
        assert_eq!(reader.get(b"watched").unwrap(), Some(b"0".to_vec()));

        put(&store, b"watched", b"1");
        for i in 2..VERSION_PRUNE_INTERVAL {
            put(&store, format!("key/{i:04}").as_bytes(), b"v");
        }
        assert!(version_rows(&store) > 1);

        reader.set(b"watched", b"2").unwrap();
        assert!(matches!(reader.commit(), Err(StateError::Conflict)));
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("meta.redb");

        {
            let store = KvStore::open(&db_path).unwrap();
            put(&store, b"\xff/tenant/lastId", &7i64.to_be_bytes());
        }

        let store = KvStore::open(&db_path).unwrap();
        let mut tx = store.begin().unwrap();
        tx.set_option(TransactionOption::AccessSystemKeys);
        assert_eq!(
            tx.get(b"\xff/tenant/lastId").unwrap(),
            Some(7i64.to_be_bytes().to_vec())
        );
        assert!(tx.read_version() >= 1);
    }
}
