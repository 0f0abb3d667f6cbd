use std::{error::Error, path::Path, sync::Arc};

use async_trait::async_trait;
use keysync_domain::event::ExchangeEvent;
use sqlx::{Pool, Sqlite, sqlite::SqlitePoolOptions};

use super::EventSink;

/// Appends exchange events to an `exchange_events` table.
pub struct SQLLiteEventSink {
    pool: Arc<Pool<Sqlite>>,
}

impl SQLLiteEventSink {
    pub async fn create_from_file<P>(path_arg: P) -> Result<Box<dyn EventSink>, Box<dyn Error>>
    where
        P: AsRef<Path>,
    {
        let url = format!("sqlite://{}?mode=rwc", path_arg.as_ref().display());
        let pool = Arc::new(SqlitePoolOptions::new().connect(&url).await?);
        let sink = SQLLiteEventSink::create_from_pool(pool).await?;
        Ok(Box::new(sink))
    }

    pub async fn create_from_pool(
        pool: Arc<Pool<Sqlite>>,
    ) -> Result<SQLLiteEventSink, Box<dyn Error>> {
        sqlx::migrate!("../migrations").run(&*pool).await?;
        Ok(SQLLiteEventSink { pool })
    }
}

#[async_trait]
impl EventSink for SQLLiteEventSink {
    async fn save(&mut self, events: &[ExchangeEvent]) -> Result<(), Box<dyn Error>> {
        let mut tx = self.pool.begin().await?;

        for e in events {
            let key_index = e.kind.key_index().map(|i| i as i64);
            sqlx::query(
                "
            INSERT INTO exchange_events (date_time, peripheral, kind, key_index, fingerprint, reason)
            VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(e.date_time)
            .bind(e.peripheral.as_str())
            .bind(e.kind.label())
            .bind(key_index)
            .bind(e.kind.fingerprint())
            .bind(e.kind.reason())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
    async fn close(mut self: Box<Self>) -> Result<(), Box<dyn Error>> {
        self.pool.close().await;
        Ok(())
    }
}
