//! Insert/update statement text derived from a table's live column list.

use crate::error::{Result, SyncError};
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertStatements {
    pub table: String,
    pub insert: String,
    pub update: String,
    /// Non-key columns assigned by `update`, in schema order.
    pub update_columns: Vec<String>,
}

/// Pure synthesis step: same inputs always yield the same text.
///
/// Every key column is stripped from the SET clause, not only the first one.
pub fn synthesize(table: &str, columns: &[String], keys: &[&str]) -> Result<UpsertStatements> {
    if columns.is_empty() {
        return Err(SyncError::schema(table, "table has no columns"));
    }
    if keys.is_empty() {
        return Err(SyncError::schema(table, "no primary key columns given"));
    }
    for key in keys {
        if !columns.iter().any(|c| c == key) {
            return Err(SyncError::schema(
                table,
                format!("key column `{key}` not present in table"),
            ));
        }
    }

    let update_columns = columns
        .iter()
        .filter(|c| !keys.contains(&c.as_str()))
        .cloned()
        .collect::<Vec<_>>();
    if update_columns.is_empty() {
        return Err(SyncError::schema(table, "no updatable columns"));
    }

    let insert = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", "),
        columns
            .iter()
            .map(|c| format!(":{c}"))
            .collect::<Vec<_>>()
            .join(", ")
    );

    let update = format!(
        "UPDATE {} SET {} WHERE {}",
        quote_ident(table),
        update_columns
            .iter()
            .map(|c| format!("{} = :{c}", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", "),
        keys.iter()
            .map(|k| format!("{} = :{k}", quote_ident(k)))
            .collect::<Vec<_>>()
            .join(" AND ")
    );

    Ok(UpsertStatements {
        table: table.to_string(),
        insert,
        update,
        update_columns,
    })
}

/// Introspect `table` in the store, then synthesize.
pub fn build_upsert_statements(
    store: &Store,
    table: &str,
    keys: &[&str],
) -> Result<UpsertStatements> {
    let columns = store.columns_of(table)?;
    synthesize(table, &columns, keys)
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn single_key_statements() {
        let stmts = synthesize("teams_static", &cols(&["id", "name", "short_name"]), &["id"])
            .expect("valid table");
        assert_eq!(
            stmts.insert,
            r#"INSERT INTO "teams_static" ("id", "name", "short_name") VALUES (:id, :name, :short_name)"#
        );
        assert_eq!(
            stmts.update,
            r#"UPDATE "teams_static" SET "name" = :name, "short_name" = :short_name WHERE "id" = :id"#
        );
    }

    #[test]
    fn composite_keys_all_stripped_from_set() {
        let columns = cols(&["element", "fixture", "round", "minutes", "total_points"]);
        let stmts = synthesize("player_gw_detailed", &columns, &["element", "round", "fixture"])
            .expect("valid table");
        assert_eq!(stmts.update_columns, cols(&["minutes", "total_points"]));
        let set_clause = stmts
            .update
            .split(" WHERE ")
            .next()
            .expect("has set clause");
        for key in ["element", "round", "fixture"] {
            assert!(!set_clause.contains(&format!("\"{key}\" =")));
        }
        assert!(stmts.update.ends_with(
            r#"WHERE "element" = :element AND "round" = :round AND "fixture" = :fixture"#
        ));
    }

    #[test]
    fn unknown_key_is_schema_error() {
        let err = synthesize("fixtures", &cols(&["id", "event"]), &["fixture_id"]).unwrap_err();
        assert!(matches!(err, SyncError::Schema { .. }));
    }

    #[test]
    fn all_key_table_is_schema_error() {
        let err = synthesize("t", &cols(&["a", "b"]), &["a", "b"]).unwrap_err();
        assert!(matches!(err, SyncError::Schema { .. }));
    }

    #[test]
    fn output_is_stable() {
        let columns = cols(&["name", "label"]);
        let a = synthesize("metric_names_static", &columns, &["name"]).unwrap();
        let b = synthesize("metric_names_static", &columns, &["name"]).unwrap();
        assert_eq!(a, b);
    }
}
