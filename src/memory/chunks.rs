//! Chunk rows: replacement on write, embedding fill-in, repair queries.

use rusqlite::{params, Connection, Transaction};

use super::rank::Candidate;
use super::types::{Chunk, PendingChunk};
use super::{bytes_to_embedding, embedding_to_bytes};
use crate::error::StoreError;

/// Delete every chunk of an item and insert `texts` as chunks `0..n` with no
/// embedding. Runs inside the caller's transaction.
pub(crate) fn replace_chunks(
    tx: &Transaction<'_>,
    namespace: &str,
    item_key: &str,
    texts: &[String],
    now: &str,
) -> Result<Vec<PendingChunk>, StoreError> {
    tx.execute(
        "DELETE FROM chunks WHERE namespace = ?1 AND item_key = ?2",
        params![namespace, item_key],
    )?;

    let mut stmt = tx.prepare_cached(
        "INSERT INTO chunks (id, namespace, item_key, chunk_index, text, embedding, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6)",
    )?;
    let mut pending = Vec::with_capacity(texts.len());
    for (index, text) in texts.iter().enumerate() {
        let id = uuid::Uuid::now_v7().to_string();
        stmt.execute(params![id, namespace, item_key, index as i64, text, now])?;
        pending.push(PendingChunk {
            id,
            namespace: namespace.to_string(),
            item_key: item_key.to_string(),
            text: text.clone(),
        });
    }
    Ok(pending)
}

/// Chunks of one item in index order.
pub fn chunks_for_item(
    conn: &Connection,
    namespace: &str,
    item_key: &str,
) -> Result<Vec<Chunk>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, namespace, item_key, chunk_index, text, embedding, created_at FROM chunks \
         WHERE namespace = ?1 AND item_key = ?2 ORDER BY chunk_index",
    )?;
    let rows = stmt
        .query_map(params![namespace, item_key], |row| {
            Ok((
                Chunk {
                    id: row.get(0)?,
                    namespace: row.get(1)?,
                    item_key: row.get(2)?,
                    chunk_index: row.get(3)?,
                    text: row.get(4)?,
                    embedding: None,
                    created_at: row.get(6)?,
                },
                row.get::<_, Option<Vec<u8>>>(5)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(mut chunk, blob)| -> Result<Chunk, StoreError> {
            chunk.embedding = blob.as_deref().map(bytes_to_embedding).transpose()?;
            Ok(chunk)
        })
        .collect()
}

/// Store embeddings by chunk id in one transaction. Ids that no longer exist
/// (the item was updated or deleted meanwhile) are skipped. Returns the number
/// of chunks updated.
pub fn set_embeddings(
    conn: &mut Connection,
    updates: &[(String, Vec<f32>)],
) -> Result<usize, StoreError> {
    let tx = conn.transaction()?;
    let mut updated = 0;
    {
        let mut stmt = tx.prepare_cached("UPDATE chunks SET embedding = ?1 WHERE id = ?2")?;
        for (id, embedding) in updates {
            updated += stmt.execute(params![embedding_to_bytes(embedding), id])?;
        }
    }
    tx.commit()?;
    Ok(updated)
}

/// Chunks without an embedding, oldest first.
pub fn pending_chunks(
    conn: &Connection,
    namespace: Option<&str>,
    limit: usize,
) -> Result<Vec<PendingChunk>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, namespace, item_key, text FROM chunks \
         WHERE embedding IS NULL AND (?1 IS NULL OR namespace = ?1) \
         ORDER BY id LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![namespace, limit as i64], |row| {
            Ok(PendingChunk {
                id: row.get(0)?,
                namespace: row.get(1)?,
                item_key: row.get(2)?,
                text: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Null out embeddings so the repair pass recomputes them. Returns rows touched.
pub fn clear_embeddings(conn: &Connection, namespace: Option<&str>) -> Result<usize, StoreError> {
    let rows = conn.execute(
        "UPDATE chunks SET embedding = NULL \
         WHERE embedding IS NOT NULL AND (?1 IS NULL OR namespace = ?1)",
        params![namespace],
    )?;
    Ok(rows)
}

/// Every embedded chunk of a namespace, as ranking candidates.
pub fn embedded_chunks(conn: &Connection, namespace: &str) -> Result<Vec<Candidate>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT item_key, text, embedding FROM chunks \
         WHERE namespace = ?1 AND embedding IS NOT NULL \
         ORDER BY item_key, chunk_index",
    )?;
    let rows = stmt
        .query_map(params![namespace], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(item_key, text, blob)| -> Result<Candidate, StoreError> {
            Ok(Candidate {
                item_key,
                text,
                embedding: bytes_to_embedding(&blob)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::memory::store::write_item;
    use crate::memory::types::WriteMode;
    use serde_json::json;

    #[test]
    fn embeddings_fill_in_and_become_candidates() {
        let mut conn = db::open_memory_database().unwrap();
        let outcome = write_item(
            &mut conn, "ns", "doc", &json!("a b"), WriteMode::Create, &["a".into(), "b".into()],
        )
        .unwrap();
        assert_eq!(pending_chunks(&conn, None, 100).unwrap().len(), 2);
        assert!(embedded_chunks(&conn, "ns").unwrap().is_empty());

        let first = &outcome.pending[0];
        let updated = set_embeddings(&mut conn, &[(first.id.clone(), vec![1.0, 0.0])]).unwrap();
        assert_eq!(updated, 1);

        let candidates = embedded_chunks(&conn, "ns").unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].text, "a");
        assert_eq!(candidates[0].embedding, vec![1.0, 0.0]);

        let pending = pending_chunks(&conn, Some("ns"), 100).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].text, "b");
        assert!(pending_chunks(&conn, Some("other"), 100).unwrap().is_empty());
    }

    #[test]
    fn embeddings_for_replaced_chunks_are_ignored() {
        let mut conn = db::open_memory_database().unwrap();
        let old = write_item(&mut conn, "ns", "k", &json!("v1"), WriteMode::Create, &["v1".into()]).unwrap();
        write_item(&mut conn, "ns", "k", &json!("v2"), WriteMode::Update, &["v2".into()]).unwrap();

        let updated = set_embeddings(&mut conn, &[(old.pending[0].id.clone(), vec![1.0])]).unwrap();
        assert_eq!(updated, 0);
        let chunks = chunks_for_item(&conn, "ns", "k").unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].embedding.is_none());
    }

    #[test]
    fn clearing_requeues_chunks() {
        let mut conn = db::open_memory_database().unwrap();
        let out = write_item(&mut conn, "ns", "k", &json!("v"), WriteMode::Create, &["v".into()]).unwrap();
        set_embeddings(&mut conn, &[(out.pending[0].id.clone(), vec![0.5])]).unwrap();
        assert!(pending_chunks(&conn, None, 10).unwrap().is_empty());

        assert_eq!(clear_embeddings(&conn, Some("ns")).unwrap(), 1);
        assert_eq!(pending_chunks(&conn, None, 10).unwrap().len(), 1);
    }

    #[test]
    fn pending_respects_limit() {
        let mut conn = db::open_memory_database().unwrap();
        let texts: Vec<String> = (0..5).map(|i| format!("chunk {i}")).collect();
        write_item(&mut conn, "ns", "k", &json!("x"), WriteMode::Create, &texts).unwrap();
        assert_eq!(pending_chunks(&conn, None, 3).unwrap().len(), 3);
    }
}
