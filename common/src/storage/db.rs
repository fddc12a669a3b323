use crate::error::AppError;

use super::types::StoredObject;
use std::ops::Deref;
use surrealdb::{
    engine::any::{connect, Any},
    opt::auth::Root,
    Error, Surreal,
};
use tracing::info;

/// Unique index over `document.content_hash`.
pub const DOCUMENT_HASH_INDEX: &str = "idx_document_hash";

/// True when a write was rejected because it would duplicate a value in the
/// given unique index.
pub fn is_index_violation(err: &Error, index: &str) -> bool {
    let message = err.to_string();
    message.contains(index) && message.contains("already contains")
}

#[derive(Clone)]
pub struct SurrealDbClient {
    pub client: Surreal<Any>,
}

impl SurrealDbClient {
    /// # Initialize a new database client
    ///
    /// Connects, signs in as root and selects the namespace and database.
    pub async fn new(
        address: &str,
        username: &str,
        password: &str,
        namespace: &str,
        database: &str,
    ) -> Result<Self, Error> {
        let db = connect(address).await?;

        db.signin(Root { username, password }).await?;

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }

    pub async fn ensure_initialized(&self) -> Result<(), AppError> {
        self.build_indexes().await?;
        info!("Database indexes ensured");
        Ok(())
    }

    pub async fn build_indexes(&self) -> Result<(), Error> {
        self.client
            .query(
                "DEFINE INDEX IF NOT EXISTS idx_test_case_session ON test_case FIELDS session_id;
                DEFINE INDEX IF NOT EXISTS idx_metric_session ON scoring_metric FIELDS session_id;
                DEFINE INDEX IF NOT EXISTS idx_conversation_session ON conversation FIELDS session_id;
                DEFINE INDEX IF NOT EXISTS idx_turn_conversation ON conversation_turn FIELDS conversation_id;
                DEFINE INDEX IF NOT EXISTS idx_evaluation_conversation ON evaluation FIELDS conversation_id;
                DEFINE INDEX IF NOT EXISTS idx_score_conversation ON score FIELDS conversation_id;
                DEFINE INDEX IF NOT EXISTS idx_score_session ON score FIELDS session_id;
                DEFINE INDEX IF NOT EXISTS idx_chunk_document ON document_chunk FIELDS document_id;
                DEFINE INDEX IF NOT EXISTS idx_document_hash ON document FIELDS content_hash UNIQUE;",
            )
            .await?
            .check()?;
        Ok(())
    }

    /// Operation to store a object in SurrealDB, requires the struct to implement StoredObject
    ///
    /// # Arguments
    /// * `item` - The item to be stored
    ///
    /// # Returns
    /// * `Result` - Item or Error
    pub async fn store_item<T>(&self, item: T) -> Result<Option<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client
            .create((T::table_name(), item.get_id()))
            .content(item)
            .await
    }

    /// Replaces the stored content of an existing record.
    pub async fn update_item<T>(&self, item: T) -> Result<Option<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client
            .update((T::table_name(), item.get_id()))
            .content(item)
            .await
    }

    /// Operation to retrieve all objects from a certain table, requires the struct to implement StoredObject
    ///
    /// # Returns
    /// * `Result` - Vec<T> or Error
    pub async fn get_all_stored_items<T>(&self) -> Result<Vec<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select(T::table_name()).await
    }

    /// Operation to retrieve a single object by its ID, requires the struct to implement StoredObject
    ///
    /// # Arguments
    /// * `id` - The ID of the item to retrieve
    ///
    /// # Returns
    /// * `Result<Option<T>, Error>` - The found item or Error
    pub async fn get_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select((T::table_name(), id)).await
    }

    /// Operation to delete a single object by its ID, requires the struct to implement StoredObject
    ///
    /// # Returns
    /// * `Result<Option<T>, Error>` - The deleted item or Error
    pub async fn delete_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.delete((T::table_name(), id)).await
    }

    /// Selects every record of `T` whose `field` equals `value`, oldest first.
    pub async fn find_by_field<T>(&self, field: &'static str, value: &str) -> Result<Vec<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        let query = format!(
            "SELECT * FROM type::table($table) WHERE {field} = $value ORDER BY created_at ASC"
        );
        self.client
            .query(query)
            .bind(("table", T::table_name()))
            .bind(("value", value.to_string()))
            .await?
            .take(0)
    }

    /// Deletes every record of `T` whose `field` equals `value`.
    pub async fn delete_by_field<T>(&self, field: &'static str, value: &str) -> Result<(), Error>
    where
        T: for<'de> StoredObject,
    {
        let query = format!("DELETE {} WHERE {field} = $value", T::table_name());
        self.client
            .query(query)
            .bind(("value", value.to_string()))
            .await?
            .check()?;
        Ok(())
    }
}

impl Deref for SurrealDbClient {
    type Target = Surreal<Any>;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl SurrealDbClient {
    /// Create an in-memory SurrealDB client for testing.
    pub async fn memory(namespace: &str, database: &str) -> Result<Self, Error> {
        let db = connect("mem://").await?;

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }
}
