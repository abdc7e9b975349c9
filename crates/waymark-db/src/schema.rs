//! Renders table descriptions as the DDL that creates them from nothing.
//!
//! There is no diffing here: the baseline is always an empty database, and
//! every statement uses `IF NOT EXISTS`.

use std::collections::HashSet;

use waymark_common::{ColumnSchema, Error, IndexSchema, Result, TableSchema};

use crate::ident::{is_valid_identifier, is_valid_sql_type, quote};

/// `CREATE TABLE` and `CREATE INDEX` statements for `tables`, in the order
/// given. Indexes follow their table.
pub fn baseline_statements(tables: &[TableSchema]) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut statements = Vec::new();

    for table in tables {
        if !seen.insert(table.name.to_ascii_lowercase()) {
            return Err(Error::Validation(format!(
                "table {} is described more than once",
                table.name
            )));
        }
        statements.push(create_table(table)?);
        for index in &table.indexes {
            statements.push(create_index(table, index)?);
        }
    }

    Ok(statements)
}

fn create_table(table: &TableSchema) -> Result<String> {
    check_identifier("table", &table.name)?;
    if table.columns.is_empty() {
        return Err(Error::Validation(format!(
            "table {} has no columns",
            table.name
        )));
    }

    let mut names = HashSet::new();
    for column in &table.columns {
        check_identifier("column", &column.name)?;
        if !names.insert(column.name.to_ascii_lowercase()) {
            return Err(Error::Validation(format!(
                "column {}.{} is declared twice",
                table.name, column.name
            )));
        }
    }

    let primary: Vec<&ColumnSchema> = table.columns.iter().filter(|c| c.primary_key).collect();
    let inline_pk = primary.len() == 1;

    let mut parts = Vec::with_capacity(table.columns.len() + 1);
    for column in &table.columns {
        parts.push(column_definition(table, column, inline_pk)?);
    }
    if primary.len() > 1 {
        let cols: Vec<String> = primary.iter().map(|c| quote(&c.name)).collect();
        parts.push(format!("PRIMARY KEY ({})", cols.join(", ")));
    }

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote(&table.name),
        parts.join(", ")
    ))
}

fn column_definition(
    table: &TableSchema,
    column: &ColumnSchema,
    inline_pk: bool,
) -> Result<String> {
    if !is_valid_sql_type(&column.sql_type) {
        return Err(Error::Validation(format!(
            "column {}.{} has unsupported type {:?}",
            table.name, column.name, column.sql_type
        )));
    }

    let mut def = format!("{} {}", quote(&column.name), column.sql_type.trim());
    if column.primary_key && inline_pk {
        def.push_str(" PRIMARY KEY");
    }
    if !column.nullable && !(column.primary_key && inline_pk) {
        def.push_str(" NOT NULL");
    }
    if column.unique && !column.primary_key {
        def.push_str(" UNIQUE");
    }
    if let Some(expr) = &column.default {
        if expr.contains(';') || expr.trim().is_empty() {
            return Err(Error::Validation(format!(
                "column {}.{} has an invalid default expression",
                table.name, column.name
            )));
        }
        def.push_str(&format!(" DEFAULT {}", expr.trim()));
    }
    Ok(def)
}

fn create_index(table: &TableSchema, index: &IndexSchema) -> Result<String> {
    check_identifier("index", &index.name)?;
    if index.columns.is_empty() {
        return Err(Error::Validation(format!(
            "index {} has no columns",
            index.name
        )));
    }

    let mut cols = Vec::with_capacity(index.columns.len());
    for name in &index.columns {
        if !table.columns.iter().any(|c| c.name.eq_ignore_ascii_case(name)) {
            return Err(Error::Validation(format!(
                "index {} refers to unknown column {}.{name}",
                index.name, table.name
            )));
        }
        cols.push(quote(name));
    }

    Ok(format!(
        "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
        if index.unique { "UNIQUE " } else { "" },
        quote(&index.name),
        quote(&table.name),
        cols.join(", ")
    ))
}

fn check_identifier(kind: &str, name: &str) -> Result<()> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(Error::Validation(format!("invalid {kind} name {name:?}")))
    }
}
