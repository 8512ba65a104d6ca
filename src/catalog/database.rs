use super::escape_identifier;

/// The application database, owned by the application role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSpec {
    pub name: String,
    pub owner: String,
}

impl DatabaseSpec {
    /// ```sql
    /// CREATE DATABASE name OWNER role_name
    /// ```
    pub fn to_sql(&self) -> String {
        format!(
            "CREATE DATABASE {} OWNER {};",
            escape_identifier(&self.name),
            escape_identifier(&self.owner)
        )
    }
}
