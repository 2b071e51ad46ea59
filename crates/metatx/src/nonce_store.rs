use alloy::primitives::{Address, U256};
use dashmap::DashMap;

/// Per-sender nonce counters held by a forwarder.
///
/// A sender's counter starts at zero and moves forward by exactly one for each
/// executed request. There is no way to lower or reset it.
///
/// Implementations must be thread-safe (`Send + Sync`).
pub trait NonceStore: Send + Sync {
    /// Current nonce of `sender` (zero if never seen).
    fn current(&self, sender: &Address) -> U256;

    /// Atomically advance `sender`'s counter if it still equals `expected`.
    /// Returns `true` if the nonce was consumed by this call.
    /// Returns `false` if the counter had moved on (replay or lost race).
    fn try_consume(&self, sender: Address, expected: U256) -> bool;

    /// Number of senders with a non-zero counter.
    fn tracked_senders(&self) -> usize;
}

/// In-memory nonce store backed by DashMap. Fast but lost on restart.
#[derive(Default)]
pub struct InMemoryNonceStore {
    nonces: DashMap<Address, U256>,
}

impl InMemoryNonceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NonceStore for InMemoryNonceStore {
    fn current(&self, sender: &Address) -> U256 {
        self.nonces.get(sender).map(|n| *n).unwrap_or(U256::ZERO)
    }

    fn try_consume(&self, sender: Address, expected: U256) -> bool {
        // The entry guard holds the shard lock for the whole compare-and-increment
        let mut entry = self.nonces.entry(sender).or_insert(U256::ZERO);
        if *entry != expected {
            return false;
        }
        match entry.checked_add(U256::from(1u64)) {
            Some(next) => {
                *entry = next;
                true
            }
            None => false,
        }
    }

    fn tracked_senders(&self) -> usize {
        self.nonces.iter().filter(|n| !n.value().is_zero()).count()
    }
}

/// Persistent nonce store backed by SQLite. Survives restarts.
#[cfg(feature = "full")]
pub struct SqliteNonceStore {
    conn: std::sync::Mutex<rusqlite::Connection>,
}

#[cfg(feature = "full")]
impl SqliteNonceStore {
    /// Open (or create) a SQLite nonce database at the given path.
    ///
    /// On Unix systems, the database file permissions are restricted to 0600.
    pub fn open(path: &str) -> Result<Self, rusqlite::Error> {
        let conn = rusqlite::Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sender_nonces (
                sender BLOB PRIMARY KEY,
                nonce BLOB NOT NULL
            );
            PRAGMA journal_mode=WAL;",
        )?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) =
                std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            {
                tracing::warn!(
                    path = %path,
                    error = %e,
                    "failed to set nonce database file permissions to 0600"
                );
            }
        }

        Ok(Self {
            conn: std::sync::Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, rusqlite::Connection> {
        match self.conn.lock() {
            Ok(c) => c,
            Err(poisoned) => {
                tracing::error!("nonce store mutex poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn read(conn: &rusqlite::Connection, sender: &Address) -> rusqlite::Result<U256> {
        use rusqlite::OptionalExtension;
        let stored: Option<Vec<u8>> = conn
            .query_row(
                "SELECT nonce FROM sender_nonces WHERE sender = ?1",
                [sender.as_slice()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(stored
            .map(|bytes| U256::from_be_slice(&bytes))
            .unwrap_or(U256::ZERO))
    }

    fn consume(
        conn: &mut rusqlite::Connection,
        sender: Address,
        expected: U256,
    ) -> rusqlite::Result<bool> {
        let tx = conn.transaction()?;
        let current = Self::read(&tx, &sender)?;
        if current != expected {
            return Ok(false);
        }
        let Some(next) = current.checked_add(U256::from(1u64)) else {
            return Ok(false);
        };
        tx.execute(
            "INSERT INTO sender_nonces (sender, nonce) VALUES (?1, ?2)
             ON CONFLICT(sender) DO UPDATE SET nonce = excluded.nonce",
            rusqlite::params![sender.as_slice(), next.to_be_bytes::<32>().as_slice()],
        )?;
        tx.commit()?;
        Ok(true)
    }
}

#[cfg(feature = "full")]
impl NonceStore for SqliteNonceStore {
    fn current(&self, sender: &Address) -> U256 {
        let conn = self.lock();
        Self::read(&conn, sender).unwrap_or_else(|e| {
            // Reads only feed verification; a stale zero fails the nonce check
            // for any sender who has already used the forwarder.
            tracing::error!(sender = %sender, error = %e, "failed to read nonce");
            U256::ZERO
        })
    }

    fn try_consume(&self, sender: Address, expected: U256) -> bool {
        let mut conn = self.lock();
        // Fail-secure: a database error never counts as a consumed nonce
        Self::consume(&mut conn, sender, expected).unwrap_or_else(|e| {
            tracing::error!(sender = %sender, error = %e, "failed to consume nonce");
            false
        })
    }

    fn tracked_senders(&self) -> usize {
        let conn = self.lock();
        conn.query_row("SELECT COUNT(*) FROM sender_nonces", [], |row| {
            row.get::<_, i64>(0)
        })
        .map(|n| usize::try_from(n).unwrap_or(0))
        .unwrap_or(0)
    }
}
