//! Database models for the collection-keyed local store.

use diesel::prelude::*;

#[derive(Queryable, Insertable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::local_collections)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct LocalCollectionDB {
    pub name: String,
    pub created_at: String,
}

#[derive(Queryable, Insertable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::local_records)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct LocalRecordDB {
    pub collection: String,
    pub id: String,
    /// JSON-encoded record body.
    pub payload: String,
    pub updated_at: String,
}
