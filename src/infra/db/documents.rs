//! JSONB-backed collections in the `documents` table.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, query, query_as};
use tracing::debug;

use crate::application::store::{
    CollectionStore, DocumentQuery, DocumentStore, OrderDirection, StoreError,
};
use crate::domain::record::{Document, Fields};

use super::{PostgresDocumentStore, map_sqlx_error};

#[derive(Debug, FromRow)]
struct DocumentRow {
    id: String,
    data: Json<Fields>,
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        Document::new(row.id, row.data.0)
    }
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn open_collection(&self, name: &str) -> Result<Arc<dyn CollectionStore>, StoreError> {
        debug!(collection = name, "opening postgres collection");
        Ok(Arc::new(PostgresCollection {
            pool: self.shared_pool(),
            name: name.to_string(),
        }))
    }
}

pub struct PostgresCollection {
    pool: Arc<PgPool>,
    name: String,
}

impl PostgresCollection {
    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CollectionStore for PostgresCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, request: &DocumentQuery) -> Result<Vec<Document>, StoreError> {
        let mut qb = build_query(&self.name, request);
        let rows = qb
            .build_query_as::<DocumentRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(Document::from).collect())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let row = query_as::<_, DocumentRow>(
            "SELECT id, data FROM documents WHERE collection = $1 AND id = $2",
        )
        .bind(&self.name)
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(Document::from))
    }

    async fn add_document(
        &self,
        id: Option<String>,
        payload: Fields,
    ) -> Result<String, StoreError> {
        let id = id.unwrap_or_else(|| self.new_document_id());
        let result = query("INSERT INTO documents (collection, id, data) VALUES ($1, $2, $3)")
            .bind(&self.name)
            .bind(&id)
            .bind(Json(&payload))
            .execute(self.pool())
            .await;

        match result {
            Ok(_) => Ok(id),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::Conflict { id })
            }
            Err(err) => Err(map_sqlx_error(err)),
        }
    }

    async fn set_document(
        &self,
        id: &str,
        payload: Fields,
        merge: bool,
    ) -> Result<(), StoreError> {
        let sql = if merge {
            "INSERT INTO documents (collection, id, data) VALUES ($1, $2, $3) \
             ON CONFLICT (collection, id) DO UPDATE SET data = documents.data || EXCLUDED.data"
        } else {
            "INSERT INTO documents (collection, id, data) VALUES ($1, $2, $3) \
             ON CONFLICT (collection, id) DO UPDATE SET data = EXCLUDED.data"
        };

        query(sql)
            .bind(&self.name)
            .bind(id)
            .bind(Json(&payload))
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn delete_document(&self, id: &str) -> Result<(), StoreError> {
        query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(&self.name)
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn batch_write(&self, writes: Vec<(String, Fields)>) -> Result<(), StoreError> {
        if writes.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;
        let mut qb: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("INSERT INTO documents (collection, id, data) ");
        qb.push_values(writes, |mut row, (id, data)| {
            row.push_bind(self.name.as_str())
                .push_bind(id)
                .push_bind(Json(data));
        });
        qb.push(" ON CONFLICT (collection, id) DO UPDATE SET data = EXCLUDED.data");

        qb.build()
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn scan_all(&self) -> Result<Vec<Document>, StoreError> {
        let rows = query_as::<_, DocumentRow>(
            "SELECT id, data FROM documents WHERE collection = $1 ORDER BY created_seq",
        )
        .bind(&self.name)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(Document::from).collect())
    }

    async fn probe(&self) -> Result<(), StoreError> {
        query("SELECT id FROM documents WHERE collection = $1 LIMIT 1")
            .bind(&self.name)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

fn build_query<'a>(collection: &'a str, request: &'a DocumentQuery) -> QueryBuilder<'a, Postgres> {
    let direction = match request.direction {
        OrderDirection::Asc => "ASC",
        OrderDirection::Desc => "DESC",
    };

    let mut qb = QueryBuilder::new("SELECT id, data FROM documents WHERE collection = ");
    qb.push_bind(collection);
    qb.push(" AND jsonb_exists(data, ");
    qb.push_bind(request.order_by.as_str());
    qb.push(")");

    for (field, value) in &request.filters {
        qb.push(" AND data -> ");
        qb.push_bind(field.as_str());
        qb.push(" = ");
        qb.push_bind(Json(value));
    }

    if let Some(after) = &request.start_after {
        let comparison = match request.direction {
            OrderDirection::Asc => " > ",
            OrderDirection::Desc => " < ",
        };
        qb.push(" AND (data -> ");
        qb.push_bind(request.order_by.as_str());
        qb.push(", id)");
        qb.push(comparison);
        qb.push("(");
        qb.push_bind(Json(&after.value));
        qb.push(", ");
        qb.push_bind(after.id.as_str());
        qb.push(")");
    }

    qb.push(" ORDER BY data -> ");
    qb.push_bind(request.order_by.as_str());
    qb.push(format!(" {direction}, id {direction} LIMIT "));
    qb.push_bind(i64::from(request.limit));
    qb
}
