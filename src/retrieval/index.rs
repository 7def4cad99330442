use super::chunk::TextSplitter;
use crate::providers::{DocumentIndex, DocumentIndexer, IndexHandle, Passage};
use crate::store::extract::extract_pdf_text;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// In-memory SQLite chunk index with FTS5 full-text search.
pub struct ChunkIndex {
    conn: Mutex<Connection>,
    source: PathBuf,
    chunks: usize,
}

impl std::fmt::Debug for ChunkIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkIndex")
            .field("source", &self.source)
            .field("chunks", &self.chunks)
            .finish()
    }
}

impl ChunkIndex {
    /// Index `chunks` in document order.
    pub fn from_chunks(source: &Path, chunks: &[String]) -> Result<Self> {
        let mut conn = Connection::open_in_memory().context("Failed to open chunk index")?;
        conn.execute_batch("PRAGMA temp_store = MEMORY;")?;
        Self::init_schema(&conn)?;

        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("INSERT INTO doc_chunks (position, body) VALUES (?1, ?2)")?;
            for (position, text) in chunks.iter().enumerate() {
                stmt.execute(params![position as i64, text])
                    .context("Failed to insert chunk")?;
            }
        }
        tx.commit()?;

        Ok(Self {
            conn: Mutex::new(conn),
            source: source.to_path_buf(),
            chunks: chunks.len(),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE doc_chunks (
                id        INTEGER PRIMARY KEY,
                position  INTEGER NOT NULL,
                body      TEXT NOT NULL
            );

            CREATE VIRTUAL TABLE doc_chunks_fts USING fts5(
                body,
                content='doc_chunks', content_rowid='id'
            );

            CREATE TRIGGER doc_chunks_ai AFTER INSERT ON doc_chunks BEGIN
                INSERT INTO doc_chunks_fts(rowid, body) VALUES (new.id, new.body);
            END;",
        )
        .context("Failed to init chunk index schema")?;
        Ok(())
    }

    /// BM25-ranked search; falls back to the leading chunks when nothing matches.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<Passage>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock();

        if let Some(fts) = fts_query(query) {
            let mut stmt = conn.prepare(
                "SELECT c.position, c.body, doc_chunks_fts.rank
                 FROM doc_chunks_fts
                 JOIN doc_chunks c ON c.id = doc_chunks_fts.rowid
                 WHERE doc_chunks_fts MATCH ?1
                 ORDER BY rank
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![fts, limit as i64], |row| {
                Ok(Passage {
                    position: row.get::<_, i64>(0)? as usize,
                    text: row.get(1)?,
                    score: row.get(2)?,
                })
            })?;
            let hits = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            if !hits.is_empty() {
                debug!(query = %fts, hits = hits.len(), "Chunk search");
                return Ok(hits);
            }
        }

        let mut stmt = conn.prepare("SELECT position, body FROM doc_chunks ORDER BY position LIMIT ?1")?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(Passage {
                position: row.get::<_, i64>(0)? as usize,
                text: row.get(1)?,
                score: 0.0,
            })
        })?;
        let leading = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(leading)
    }
}

impl DocumentIndex for ChunkIndex {
    fn search(&self, query: &str, limit: usize) -> Result<Vec<Passage>> {
        ChunkIndex::search(self, query, limit)
    }

    fn chunk_count(&self) -> usize {
        self.chunks
    }

    fn source(&self) -> &Path {
        &self.source
    }
}

/// Turn free text into an FTS5 query: distinct word terms, quoted, OR-ed.
fn fts_query(text: &str) -> Option<String> {
    let mut terms: Vec<String> = Vec::new();
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        if word.chars().count() < 2 {
            continue;
        }
        let term = word.to_lowercase();
        if !terms.contains(&term) {
            terms.push(term);
        }
    }
    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(|t| format!("\"{t}\""))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}

/// Builds a [`ChunkIndex`] from a PDF on disk.
#[derive(Debug, Clone)]
pub struct SqliteIndexer {
    splitter: TextSplitter,
}

impl SqliteIndexer {
    pub fn new(splitter: TextSplitter) -> Self {
        Self { splitter }
    }

    /// Split already extracted text and index it.
    pub fn index_text(&self, source: &Path, text: &str) -> Result<ChunkIndex> {
        let chunks = self.splitter.split(text);
        if chunks.is_empty() {
            bail!("document contains no text");
        }
        ChunkIndex::from_chunks(source, &chunks)
    }
}

#[async_trait]
impl DocumentIndexer for SqliteIndexer {
    async fn build(&self, path: &Path) -> Result<IndexHandle> {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let indexer = self.clone();
        let source = path.to_path_buf();
        let index = tokio::task::spawn_blocking(move || -> Result<ChunkIndex> {
            let text = extract_pdf_text(&data)?
                .ok_or_else(|| anyhow!("no extractable text (scanned or empty PDF?)"))?;
            indexer.index_text(&source, &text)
        })
        .await
        .map_err(|e| anyhow!("PDF parser crashed: {e}"))??;

        info!(path = %path.display(), chunks = index.chunk_count(), "Indexed document");
        Ok(Arc::new(index))
    }
}
