use crate::schema::{
    MAPPING_TABLE, Mapping, POSTBACK_TABLE, PostbackRecord, SLOTS, SOURCE_COLUMN, Slot,
};
use crate::store::{BulkLoadSupport, Payload, Store, StoreError};
use async_trait::async_trait;
use http_body_util::BodyExt;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const READY_CHECK_INTERVAL: Duration = Duration::from_secs(5);

const SCHEMA: [&str; 2] = [
    r#"
    CREATE TABLE IF NOT EXISTS mapping (
        source TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        code TEXT NOT NULL,
        aim TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS postback (
        user_id TEXT NOT NULL,
        code TEXT NOT NULL,
        aim INTEGER NOT NULL,
        source TEXT NOT NULL
    )
    "#,
];

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    ready: Arc<AtomicBool>,
    select_mapping: String,
    insert_postback: String,
}

impl PostgresStore {
    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout_secs: u64,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(acquire_timeout_secs))
            .connect(url)
            .await?;

        let store = Self::from_pool(pool);
        tokio::spawn(store.clone().monitor_readiness());
        Ok(store)
    }

    /// Starts out ready; `refresh_ready` updates the flag.
    pub fn from_pool(pool: PgPool) -> Self {
        PostgresStore {
            pool,
            ready: Arc::new(AtomicBool::new(true)),
            select_mapping: select_mapping_statement(),
            insert_postback: insert_postback_statement(),
        }
    }

    pub async fn create_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Runs `SELECT 1` on a pooled connection and records whether it succeeded.
    pub async fn refresh_ready(&self) -> bool {
        let ready = match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "database readiness check failed");
                false
            }
        };
        self.ready.store(ready, Ordering::Relaxed);
        ready
    }

    async fn monitor_readiness(self) {
        let mut interval = tokio::time::interval(READY_CHECK_INTERVAL);
        while !self.pool.is_closed() {
            interval.tick().await;
            self.refresh_ready().await;
        }
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn find_mappings(&self, source: &str) -> Result<Vec<Mapping>, StoreError> {
        let rows = sqlx::query(&self.select_mapping)
            .bind(source)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<Mapping, StoreError> {
                let field = |slot: Slot| row.try_get::<String, _>(slot.column());
                Ok(Mapping::new(
                    source,
                    field(Slot::SubjectId)?,
                    field(Slot::Code)?,
                    field(Slot::Goal)?,
                ))
            })
            .collect()
    }

    async fn insert_postback(&self, record: &PostbackRecord) -> Result<(), StoreError> {
        sqlx::query(&self.insert_postback)
            .bind(&record.subject_id)
            .bind(&record.code)
            .bind(record.goal)
            .bind(&record.source)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    fn bulk_load_support(&self, _table: &str) -> BulkLoadSupport {
        BulkLoadSupport::Streaming
    }

    async fn bulk_load(
        &self,
        table: &str,
        columns: &[String],
        mut payload: Payload,
    ) -> Result<u64, StoreError> {
        // Held until the end of this function, returned to the pool on every path.
        let mut conn = self.pool.acquire().await?;
        let mut copy = conn.copy_in_raw(&copy_statement(table, columns)).await?;

        while let Some(frame) = payload.frame().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    copy.abort(e.to_string()).await?;
                    return Err(StoreError::Payload(e));
                }
            };
            if let Ok(data) = frame.into_data() {
                copy.send(data).await?;
            }
        }

        Ok(copy.finish().await?)
    }

    fn is_ready(&self) -> bool {
        !self.pool.is_closed() && self.ready.load(Ordering::Relaxed)
    }
}

fn select_mapping_statement() -> String {
    let columns: Vec<&str> = SLOTS.iter().map(|descriptor| descriptor.column).collect();
    // Two rows are enough to tell a unique mapping from a duplicated one.
    format!(
        "SELECT {} FROM {MAPPING_TABLE} WHERE {SOURCE_COLUMN} = $1 LIMIT 2",
        columns.join(", ")
    )
}

fn insert_postback_statement() -> String {
    let columns: Vec<&str> = SLOTS
        .iter()
        .map(|descriptor| descriptor.column)
        .chain([SOURCE_COLUMN])
        .collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();
    format!(
        "INSERT INTO {POSTBACK_TABLE} ({}) VALUES ({})",
        columns.join(", "),
        placeholders.join(", ")
    )
}

// Column names are validated as plain identifiers by the loader before they get here.
fn copy_statement(table: &str, columns: &[String]) -> String {
    format!(
        "COPY {table} ({}) FROM STDIN (FORMAT csv, HEADER, DELIMITER ',')",
        columns.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statements() {
        assert_eq!(
            select_mapping_statement(),
            "SELECT user_id, code, aim FROM mapping WHERE source = $1 LIMIT 2"
        );
        assert_eq!(
            insert_postback_statement(),
            "INSERT INTO postback (user_id, code, aim, source) VALUES ($1, $2, $3, $4)"
        );
        assert_eq!(
            copy_statement(
                MAPPING_TABLE,
                &["source".into(), "user_id".into(), "code".into(), "aim".into()]
            ),
            "COPY mapping (source, user_id, code, aim) FROM STDIN (FORMAT csv, HEADER, DELIMITER ',')"
        );
    }

    #[tokio::test]
    async fn test_unreachable_database_is_not_ready() {
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_secs(1))
            .connect_lazy("postgres://postback@127.0.0.1:1/postback")
            .unwrap();
        let store = PostgresStore::from_pool(pool);
        assert!(store.is_ready());

        assert!(!store.refresh_ready().await);
        assert!(!store.is_ready());
    }
}
