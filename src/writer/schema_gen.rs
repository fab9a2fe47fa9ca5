use crate::schema::{ColumnType, TableSchema};

fn sql_type(col_type: ColumnType) -> &'static str {
    match col_type {
        ColumnType::Integer => "INTEGER",
        ColumnType::Real => "REAL",
        ColumnType::Text => "TEXT",
        // RFC-3339 UTC text
        ColumnType::Timestamp => "TEXT",
    }
}

fn quoted(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| format!("\"{}\"", c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Generate CREATE TABLE SQL for a table schema
pub fn generate_create_table(schema: &TableSchema) -> String {
    let mut sql = format!("CREATE TABLE \"{}\" (\n", schema.name);
    let mut columns = Vec::new();

    for col in schema.columns {
        let null_constraint = if !col.nullable { " NOT NULL" } else { "" };
        columns.push(format!(
            "    \"{}\" {}{}",
            col.name,
            sql_type(col.col_type),
            null_constraint
        ));
    }

    if !schema.primary_key.is_empty() {
        columns.push(format!("    PRIMARY KEY ({})", quoted(schema.primary_key)));
    }

    sql.push_str(&columns.join(",\n"));
    sql.push_str("\n)");

    sql
}

/// Generate CREATE INDEX statements for partition keys and foreign key columns
pub fn generate_indexes(schema: &TableSchema) -> Vec<String> {
    let mut keys: Vec<&[&str]> = Vec::new();
    if !schema.partition_by.is_empty() {
        keys.push(schema.partition_by);
    }
    for fk in schema.foreign_keys {
        if fk.columns != schema.primary_key && !keys.contains(&fk.columns) {
            keys.push(fk.columns);
        }
    }

    keys.into_iter()
        .map(|columns| {
            format!(
                "CREATE INDEX \"idx_{}_{}\" ON \"{}\" ({})",
                schema.name,
                columns.join("_"),
                schema.name,
                quoted(columns)
            )
        })
        .collect()
}
