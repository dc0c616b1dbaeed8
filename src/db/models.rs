//! Database row types. These correspond 1:1 to the SQLite schema defined
//! in migrations.rs; position rows are mapped straight into
//! `registry::PositionSample` by the store adapter.

/// Principal record in the users table. Rows are created by the operator
/// token-mint path; registration itself lives outside this server.
#[derive(Debug, Clone)]
pub struct UserRow {
    pub identity: String,
    pub is_admin: bool,
    pub created_at: String,
}
