//! SQLite store with foreign-key lookup tables.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::{ReplaySink, SinkError, SinkKind, WriteReport};
use crate::db::Database;
use crate::lookup::{self, ALL_TABLES, BATTLE_TYPES, CHARACTERS, STAGES};
use crate::replay::{COLUMNS, ReplayRecord};

/// Fact table name.
pub const REPLAY_TABLE: &str = "ReplayData";

/// `(index name, column)` pairs built by [`ReplaySink::finalize`].
pub const INDEXES: [(&str, &str); 3] = [
    ("idx_replaydata_p1_chara_id", "p1_chara_id"),
    ("idx_replaydata_p2_chara_id", "p2_chara_id"),
    ("idx_replaydata_winner", "winner"),
];

/// Rows per INSERT statement; 30 binds each stays well below SQLite's
/// variable limit.
const INSERT_CHUNK_ROWS: usize = 500;

const CREATE_REPLAY_TABLE: &str = "
CREATE TABLE IF NOT EXISTS ReplayData (
    battle_at INTEGER NOT NULL,
    battle_id TEXT PRIMARY KEY,
    battle_type INTEGER NOT NULL,
    game_version INTEGER NOT NULL,

    p1_area_id INTEGER,
    p1_chara_id INTEGER NOT NULL,
    p1_lang TEXT,
    p1_name TEXT NOT NULL,
    p1_polaris_id TEXT NOT NULL,
    p1_power INTEGER NOT NULL,
    p1_rank INTEGER NOT NULL,
    p1_rating_before INTEGER,
    p1_rating_change INTEGER,
    p1_region_id INTEGER,
    p1_rounds INTEGER NOT NULL,
    p1_user_id INTEGER NOT NULL,

    p2_area_id INTEGER,
    p2_chara_id INTEGER NOT NULL,
    p2_lang TEXT,
    p2_name TEXT NOT NULL,
    p2_polaris_id TEXT NOT NULL,
    p2_power INTEGER NOT NULL,
    p2_rank INTEGER NOT NULL,
    p2_rating_before INTEGER,
    p2_rating_change INTEGER,
    p2_region_id INTEGER,
    p2_rounds INTEGER NOT NULL,
    p2_user_id INTEGER NOT NULL,

    stage_id INTEGER NOT NULL,
    winner INTEGER NOT NULL,

    FOREIGN KEY (battle_type) REFERENCES BattleTypes(Id),
    FOREIGN KEY (p1_chara_id) REFERENCES Characters(Id),
    FOREIGN KEY (p2_chara_id) REFERENCES Characters(Id),
    FOREIGN KEY (p1_region_id) REFERENCES Regions(Id),
    FOREIGN KEY (p2_region_id) REFERENCES Regions(Id),
    FOREIGN KEY (p1_rank) REFERENCES Ranks(Id),
    FOREIGN KEY (p2_rank) REFERENCES Ranks(Id),
    FOREIGN KEY (stage_id) REFERENCES Stages(Id)
)";

/// Name stored for a lookup code missing from the static tables.
fn placeholder_name(code: i64) -> String {
    format!("Unknown_{code}")
}

/// Unknown ranks become the overflow sentinel and unknown regions NULL.
fn normalize(record: &ReplayRecord) -> ReplayRecord {
    let mut normalized = record.clone();
    normalized.p1_rank = lookup::normalize_rank(record.p1_rank);
    normalized.p2_rank = lookup::normalize_rank(record.p2_rank);
    normalized.p1_region_id = lookup::normalize_region(record.p1_region_id);
    normalized.p2_region_id = lookup::normalize_region(record.p2_region_id);
    normalized
}

/// `(table, code)` pairs the batch references but the static tables lack.
fn unseeded_codes(records: &[ReplayRecord]) -> BTreeSet<(&'static str, i64)> {
    let mut missing = BTreeSet::new();
    for record in records {
        let references = [
            (&BATTLE_TYPES, record.battle_type),
            (&CHARACTERS, record.p1_chara_id),
            (&CHARACTERS, record.p2_chara_id),
            (&STAGES, record.stage_id),
        ];
        for (table, code) in references {
            if !table.contains(code) {
                missing.insert((table.name, code));
            }
        }
    }
    missing
}

/// Relational [`ReplaySink`].
#[derive(Debug)]
pub struct SqliteSink {
    path: PathBuf,
    db: Option<Database>,
}

impl SqliteSink {
    /// Creates a sink for the store at `path`. Nothing is opened until
    /// [`ReplaySink::bootstrap`].
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            db: None,
        }
    }

    /// The open database, if bootstrapped.
    #[must_use]
    pub fn database(&self) -> Option<&Database> {
        self.db.as_ref()
    }

    fn db(&self) -> Result<&Database, SinkError> {
        self.db.as_ref().ok_or_else(|| SinkError::NotBootstrapped {
            path: self.path.clone(),
        })
    }

    async fn create_schema(db: &Database) -> Result<(), SinkError> {
        let mut tx = db.pool().begin().await?;

        for table in ALL_TABLES {
            sqlx::query(&format!(
                "CREATE TABLE IF NOT EXISTS {} (Id INTEGER PRIMARY KEY, Name TEXT NOT NULL)",
                table.name
            ))
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query(CREATE_REPLAY_TABLE).execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn populate_lookups(db: &Database) -> Result<(), SinkError> {
        let mut tx = db.pool().begin().await?;

        for table in ALL_TABLES {
            let mut builder: QueryBuilder<'_, Sqlite> =
                QueryBuilder::new(format!("INSERT OR IGNORE INTO {} (Id, Name) ", table.name));
            builder.push_values(table.rows, |mut row, (id, name)| {
                row.push_bind(*id).push_bind(*name);
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl ReplaySink for SqliteSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Sqlite
    }

    fn store_path(&self) -> &Path {
        &self.path
    }

    #[instrument(skip(self), fields(store = %self.path.display()))]
    async fn bootstrap(&mut self) -> Result<(), SinkError> {
        if self.db.is_none() {
            self.db = Some(Database::open(&self.path).await?);
        }
        let db = self.db()?;

        Self::create_schema(db).await?;
        Self::populate_lookups(db).await?;

        info!("relational store ready");
        Ok(())
    }

    #[instrument(skip(self, records), fields(store = %self.path.display(), batch_size = records.len()))]
    async fn write_batch(&mut self, records: &[ReplayRecord]) -> Result<WriteReport, SinkError> {
        let db = self.db()?;

        let accepted: Vec<ReplayRecord> = records.iter().map(normalize).collect();

        let mut tx = db.pool().begin().await?;

        let mut placeholders: u64 = 0;
        for (table, code) in unseeded_codes(records) {
            let added = sqlx::query(&format!(
                "INSERT OR IGNORE INTO {table} (Id, Name) VALUES (?, ?)"
            ))
            .bind(code)
            .bind(placeholder_name(code))
            .execute(&mut *tx)
            .await?
            .rows_affected();
            if added > 0 {
                warn!(table, code, "storing unlisted code with a placeholder name");
            }
            placeholders += added;
        }

        let mut written: u64 = 0;
        for chunk in accepted.chunks(INSERT_CHUNK_ROWS) {
            let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
                "INSERT OR IGNORE INTO {REPLAY_TABLE} ({}) ",
                COLUMNS.join(", ")
            ));
            builder.push_values(chunk, |mut row, r| {
                row.push_bind(r.battle_at)
                    .push_bind(r.battle_id.as_str())
                    .push_bind(r.battle_type)
                    .push_bind(r.game_version)
                    .push_bind(r.p1_area_id)
                    .push_bind(r.p1_chara_id)
                    .push_bind(r.p1_lang.as_deref())
                    .push_bind(r.p1_name.as_str())
                    .push_bind(r.p1_polaris_id.as_str())
                    .push_bind(r.p1_power)
                    .push_bind(r.p1_rank)
                    .push_bind(r.p1_rating_before)
                    .push_bind(r.p1_rating_change)
                    .push_bind(r.p1_region_id)
                    .push_bind(r.p1_rounds)
                    .push_bind(r.p1_user_id)
                    .push_bind(r.p2_area_id)
                    .push_bind(r.p2_chara_id)
                    .push_bind(r.p2_lang.as_deref())
                    .push_bind(r.p2_name.as_str())
                    .push_bind(r.p2_polaris_id.as_str())
                    .push_bind(r.p2_power)
                    .push_bind(r.p2_rank)
                    .push_bind(r.p2_rating_before)
                    .push_bind(r.p2_rating_change)
                    .push_bind(r.p2_region_id)
                    .push_bind(r.p2_rounds)
                    .push_bind(r.p2_user_id)
                    .push_bind(r.stage_id)
                    .push_bind(r.winner);
            });
            written += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;

        let written = usize::try_from(written).unwrap_or(usize::MAX);
        let placeholders = usize::try_from(placeholders).unwrap_or(usize::MAX);
        debug!(written, placeholders, "batch committed");
        Ok(WriteReport {
            written,
            placeholders,
        })
    }

    #[instrument(skip(self), fields(store = %self.path.display()))]
    async fn finalize(&mut self) -> Result<(), SinkError> {
        let db = self.db()?;
        for (name, column) in INDEXES {
            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS {name} ON {REPLAY_TABLE}({column})"
            ))
            .execute(db.pool())
            .await?;
        }
        info!("secondary indexes created");
        Ok(())
    }
}
