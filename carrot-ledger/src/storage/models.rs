use crate::storage::schema::snapshots;
use chrono::NaiveDateTime;
use diesel::prelude::*;

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = snapshots)]
pub struct SnapshotRow {
    pub id: i32,
    pub version: i32,
    pub body: String,
    pub saved_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = snapshots)]
pub struct NewSnapshotRow<'a> {
    pub version: i32,
    pub body: &'a str,
    pub saved_at: NaiveDateTime,
}

/// Row metadata without the body, for listings.
#[derive(Debug, Clone, Queryable)]
pub struct SnapshotInfo {
    pub id: i32,
    pub version: i32,
    pub saved_at: NaiveDateTime,
}
