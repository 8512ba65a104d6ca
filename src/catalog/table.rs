use super::{escape_identifier, qualified_name};

/// One column of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub sql_type: String,
    pub nullable: bool,
    pub primary_key: bool,
}

impl ColumnSpec {
    fn to_sql(&self) -> String {
        let mut sql = format!("{} {}", escape_identifier(&self.name), self.sql_type);
        if self.primary_key {
            sql += " PRIMARY KEY";
        } else if !self.nullable {
            sql += " NOT NULL";
        }

        sql
    }
}

/// A table in the application database. Exactly one column is the
/// auto-incrementing primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    pub database: String,
    pub columns: Vec<ColumnSpec>,
}

impl TableSpec {
    pub fn primary_key(&self) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.primary_key)
    }

    /// Name Postgres gives the sequence behind a serial primary key.
    pub fn sequence_name(&self) -> Option<String> {
        self.primary_key()
            .map(|pk| format!("{}_{}_seq", self.name, pk.name))
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Expected columns that are absent from `actual`.
    pub fn missing_columns(&self, actual: &[String]) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| !actual.contains(&c.name))
            .map(|c| c.name.clone())
            .collect()
    }

    /// ```sql
    /// CREATE TABLE table_name ( column_name data_type [ column_constraint ] [, ... ] )
    /// ```
    pub fn to_sql(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| c.to_sql())
            .collect::<Vec<_>>()
            .join(", ");

        format!("CREATE TABLE {} ({});", qualified_name(&self.name), columns)
    }

    /// Read-only probe: can the current role select zero rows of every
    /// declared column?
    pub fn to_probe_sql(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| escape_identifier(&c.name))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "SELECT {} FROM {} LIMIT 0",
            columns,
            qualified_name(&self.name)
        )
    }
}
