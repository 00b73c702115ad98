//! Semantic search over one namespace.

use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;

use super::chunks::embedded_chunks;
use super::rank::rank;
use super::store::fetch_items;
use super::types::validate_name;
use crate::error::StoreError;

/// One item matched by a semantic query.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub key: String,
    /// The item's current value.
    pub value: Value,
    /// Text of the chunk that matched best.
    pub matched_text: String,
    pub similarity: f64,
    pub created_at: String,
    pub updated_at: String,
}

/// Rank the namespace's embedded chunks against `query` and hydrate the
/// winning items.
///
/// Items deleted between the chunk scan and the hydration step are dropped.
pub fn search_namespace(
    conn: &Connection,
    namespace: &str,
    query: &[f32],
    threshold: f64,
    limit: usize,
) -> Result<Vec<SearchHit>, StoreError> {
    validate_name("namespace", namespace)?;

    let candidates = embedded_chunks(conn, namespace)?;
    if candidates.is_empty() {
        return Ok(Vec::new());
    }
    let ranked = rank(query, candidates, threshold, limit)?;

    let keys: Vec<&str> = ranked.iter().map(|r| r.item_key.as_str()).collect();
    let mut items = fetch_items(conn, namespace, &keys)?;

    let hits = ranked
        .into_iter()
        .filter_map(|chunk| {
            let item = items.remove(&chunk.item_key)?;
            Some(SearchHit {
                key: item.key,
                value: item.value,
                matched_text: chunk.text,
                similarity: chunk.score,
                created_at: item.created_at,
                updated_at: item.updated_at,
            })
        })
        .collect();
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::memory::chunks::set_embeddings;
    use crate::memory::store::write_item;
    use crate::memory::types::WriteMode;
    use serde_json::json;

    fn seed(conn: &mut Connection, key: &str, value: Value, embedding: Vec<f32>) {
        let text = crate::memory::types::value_text(&value);
        let outcome = write_item(conn, "ns", key, &value, WriteMode::Create, &[text]).unwrap();
        set_embeddings(conn, &[(outcome.pending[0].id.clone(), embedding)]).unwrap();
    }

    #[test]
    fn hits_carry_current_values_in_rank_order() {
        let mut conn = db::open_memory_database().unwrap();
        seed(&mut conn, "close", json!("near the query"), vec![1.0, 0.1]);
        seed(&mut conn, "exact", json!({"note": "same"}), vec![1.0, 0.0]);
        seed(&mut conn, "far", json!(7), vec![0.0, 1.0]);

        let hits = search_namespace(&conn, "ns", &[1.0, 0.0], 0.5, 10).unwrap();
        let keys: Vec<&str> = hits.iter().map(|h| h.key.as_str()).collect();
        assert_eq!(keys, vec!["exact", "close"]);
        assert_eq!(hits[0].value, json!({"note": "same"}));
        assert_eq!(hits[0].matched_text, r#"{"note":"same"}"#);
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn unembedded_items_are_invisible() {
        let mut conn = db::open_memory_database().unwrap();
        write_item(&mut conn, "ns", "k", &json!("text"), WriteMode::Create, &["text".into()]).unwrap();
        assert!(search_namespace(&conn, "ns", &[1.0], 0.0, 10).unwrap().is_empty());
    }

    #[test]
    fn other_namespaces_are_not_searched() {
        let mut conn = db::open_memory_database().unwrap();
        seed(&mut conn, "k", json!("x"), vec![1.0]);
        assert!(search_namespace(&conn, "elsewhere", &[1.0], 0.0, 10).unwrap().is_empty());
    }
}
