use rusqlite::Connection;
use serde::Serialize;

use crate::error::StoreError;

/// Item and chunk counts for one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamespaceStats {
    pub namespace: String,
    pub items: u64,
    pub chunks: u64,
    pub embedded_chunks: u64,
    /// Chunks still waiting for an embedding.
    pub pending_chunks: u64,
}

/// Per-namespace counts, ordered by namespace name. Empty namespaces are included.
pub fn namespace_stats(conn: &Connection) -> Result<Vec<NamespaceStats>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT n.name, \
                (SELECT COUNT(*) FROM items i WHERE i.namespace = n.name), \
                (SELECT COUNT(*) FROM chunks c WHERE c.namespace = n.name), \
                (SELECT COUNT(*) FROM chunks c WHERE c.namespace = n.name AND c.embedding IS NULL) \
         FROM namespaces n ORDER BY n.name",
    )?;
    let stats = stmt
        .query_map([], |row| {
            let chunks: i64 = row.get(2)?;
            let pending: i64 = row.get(3)?;
            Ok(NamespaceStats {
                namespace: row.get(0)?,
                items: row.get::<_, i64>(1)? as u64,
                chunks: chunks as u64,
                embedded_chunks: (chunks - pending) as u64,
                pending_chunks: pending as u64,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::memory::chunks::set_embeddings;
    use crate::memory::namespaces::create_namespace;
    use crate::memory::store::write_item;
    use crate::memory::types::WriteMode;
    use serde_json::json;

    #[test]
    fn empty_database_has_no_stats() {
        let conn = db::open_memory_database().unwrap();
        assert!(namespace_stats(&conn).unwrap().is_empty());
    }

    #[test]
    fn counts_split_embedded_and_pending() {
        let mut conn = db::open_memory_database().unwrap();
        create_namespace(&conn, "empty").unwrap();
        let out = write_item(
            &mut conn, "docs", "a", &json!("x y"), WriteMode::Create, &["x".into(), "y".into()],
        )
        .unwrap();
        write_item(&mut conn, "docs", "b", &json!(1), WriteMode::Create, &[]).unwrap();
        set_embeddings(&mut conn, &[(out.pending[0].id.clone(), vec![1.0])]).unwrap();

        let stats = namespace_stats(&conn).unwrap();
        assert_eq!(
            stats,
            vec![
                NamespaceStats {
                    namespace: "docs".into(),
                    items: 2,
                    chunks: 2,
                    embedded_chunks: 1,
                    pending_chunks: 1,
                },
                NamespaceStats {
                    namespace: "empty".into(),
                    items: 0,
                    chunks: 0,
                    embedded_chunks: 0,
                    pending_chunks: 0,
                },
            ]
        );
    }
}
