//! Durable record store: port plus the embedded sqlite adapter.
//!
//! The store mirrors the active cache: sessions are upserted by id with an
//! expiry column standing in for a TTL index, the audit log is looked up by
//! (session_id, round), and promotions by (product_id, active, validity).

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::models::{NegotiationSession, Product};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub session_id: String,
    pub round: u32,
    pub buyer_message: String,
    pub buyer_price: f64,
    pub counter_price: f64,
    pub tactic: String,
    pub bot_score: f64,
    pub state: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    Flat,
    Percentage,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Flat => "flat",
            DiscountType::Percentage => "percentage",
        }
    }

    fn parse(raw: &str) -> Self {
        match raw {
            "percentage" => DiscountType::Percentage,
            _ => DiscountType::Flat,
        }
    }
}

/// Backend promotion. `product_id` may be the store-wide marker `__all__`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Promotion {
    pub id: String,
    pub product_id: String,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    pub min_price: f64,
    pub active: bool,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub description: String,
}

pub const ALL_PRODUCTS: &str = "__all__";

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn upsert_session(&self, session: &NegotiationSession) -> Result<()>;
    async fn load_session(&self, session_id: &str) -> Result<Option<NegotiationSession>>;

    /// Returns false when a product with the same id already exists.
    async fn create_product(&self, product: &Product) -> Result<bool>;
    async fn get_product(&self, product_id: &str) -> Result<Option<Product>>;
    async fn list_products(&self, skip: u32, limit: u32) -> Result<Vec<Product>>;

    async fn append_audit(&self, record: &AuditRecord) -> Result<()>;
    async fn list_audit(
        &self,
        session_id: &str,
        skip: u32,
        limit: u32,
    ) -> Result<Vec<AuditRecord>>;

    /// Promotions valid at `now` for this product or store-wide.
    async fn active_promotions(
        &self,
        product_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Promotion>>;
    async fn upsert_promotion(&self, promotion: &Promotion) -> Result<()>;

    /// Liveness probe for the health endpoint.
    async fn ping(&self) -> Result<()>;
}

#[derive(Clone)]
pub struct SqliteRecords {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecords {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).context("open record store")?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS products (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                category TEXT NOT NULL DEFAULT '',
                anchor_price REAL NOT NULL,
                cost_price REAL NOT NULL,
                min_margin REAL NOT NULL,
                target_margin REAL NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_products_category ON products(category)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                expires_at INTEGER NOT NULL,
                payload TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS negotiation_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                round INTEGER NOT NULL,
                buyer_message TEXT NOT NULL,
                buyer_price REAL NOT NULL,
                counter_price REAL NOT NULL,
                tactic TEXT NOT NULL,
                bot_score REAL NOT NULL,
                state TEXT NOT NULL,
                ts TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_logs_session_round
             ON negotiation_logs(session_id, round)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS promotions (
                id TEXT PRIMARY KEY,
                product_id TEXT NOT NULL,
                discount_type TEXT NOT NULL,
                discount_value REAL NOT NULL,
                min_price REAL NOT NULL DEFAULT 0,
                active INTEGER NOT NULL DEFAULT 1,
                valid_from INTEGER NOT NULL,
                valid_until INTEGER NOT NULL,
                description TEXT NOT NULL DEFAULT ''
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_promotions_lookup
             ON promotions(product_id, active, valid_from, valid_until)",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl RecordStore for SqliteRecords {
    async fn upsert_session(&self, session: &NegotiationSession) -> Result<()> {
        let payload = serde_json::to_string(session).context("serialize session")?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO sessions (session_id, state, expires_at, payload)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(session_id) DO UPDATE SET
                state = excluded.state,
                expires_at = excluded.expires_at,
                payload = excluded.payload",
            params![
                &session.session_id,
                session.state.as_str(),
                session.expires_at.timestamp(),
                payload,
            ],
        )?;
        // Expiry sweep standing in for a TTL index
        conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![Utc::now().timestamp()],
        )?;
        Ok(())
    }

    async fn load_session(&self, session_id: &str) -> Result<Option<NegotiationSession>> {
        let conn = self.conn.lock().await;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM sessions WHERE session_id = ?1 AND expires_at > ?2",
                params![session_id, Utc::now().timestamp()],
                |row| row.get(0),
            )
            .optional()?;
        match payload {
            Some(raw) => Ok(Some(
                serde_json::from_str(&raw).context("deserialize session")?,
            )),
            None => Ok(None),
        }
    }

    async fn create_product(&self, product: &Product) -> Result<bool> {
        let conn = self.conn.lock().await;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO products
             (id, name, category, anchor_price, cost_price, min_margin, target_margin)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &product.id,
                &product.name,
                &product.category,
                product.anchor_price,
                product.cost_price,
                product.min_margin,
                product.target_margin,
            ],
        )?;
        Ok(inserted > 0)
    }

    async fn get_product(&self, product_id: &str) -> Result<Option<Product>> {
        let conn = self.conn.lock().await;
        let product = conn
            .query_row(
                "SELECT id, name, category, anchor_price, cost_price, min_margin, target_margin
                 FROM products WHERE id = ?1",
                params![product_id],
                row_to_product,
            )
            .optional()?;
        Ok(product)
    }

    async fn list_products(&self, skip: u32, limit: u32) -> Result<Vec<Product>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, name, category, anchor_price, cost_price, min_margin, target_margin
             FROM products ORDER BY id ASC LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map(params![limit, skip], row_to_product)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    async fn append_audit(&self, record: &AuditRecord) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO negotiation_logs
             (session_id, round, buyer_message, buyer_price, counter_price, tactic, bot_score, state, ts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                &record.session_id,
                record.round,
                &record.buyer_message,
                record.buyer_price,
                record.counter_price,
                &record.tactic,
                record.bot_score,
                &record.state,
                record.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn list_audit(
        &self,
        session_id: &str,
        skip: u32,
        limit: u32,
    ) -> Result<Vec<AuditRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT session_id, round, buyer_message, buyer_price, counter_price, tactic, bot_score, state, ts
             FROM negotiation_logs WHERE session_id = ?1
             ORDER BY round ASC LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(params![session_id, limit, skip], |row| {
            let ts: String = row.get(8)?;
            Ok(AuditRecord {
                session_id: row.get(0)?,
                round: row.get(1)?,
                buyer_message: row.get(2)?,
                buyer_price: row.get(3)?,
                counter_price: row.get(4)?,
                tactic: row.get(5)?,
                bot_score: row.get(6)?,
                state: row.get(7)?,
                timestamp: DateTime::parse_from_rfc3339(&ts)
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    async fn active_promotions(
        &self,
        product_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Promotion>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, product_id, discount_type, discount_value, min_price, active, valid_from, valid_until, description
             FROM promotions
             WHERE (product_id = ?1 OR product_id = ?2)
               AND active = 1
               AND valid_from <= ?3 AND valid_until >= ?3",
        )?;
        let rows = stmt.query_map(
            params![product_id, ALL_PRODUCTS, now.timestamp()],
            |row| {
                let discount_type: String = row.get(2)?;
                let valid_from: i64 = row.get(6)?;
                let valid_until: i64 = row.get(7)?;
                Ok(Promotion {
                    id: row.get(0)?,
                    product_id: row.get(1)?,
                    discount_type: DiscountType::parse(&discount_type),
                    discount_value: row.get(3)?,
                    min_price: row.get(4)?,
                    active: row.get::<_, i64>(5)? != 0,
                    valid_from: DateTime::from_timestamp(valid_from, 0).unwrap_or_else(Utc::now),
                    valid_until: DateTime::from_timestamp(valid_until, 0).unwrap_or_else(Utc::now),
                    description: row.get(8)?,
                })
            },
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    async fn upsert_promotion(&self, promotion: &Promotion) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO promotions
             (id, product_id, discount_type, discount_value, min_price, active, valid_from, valid_until, description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                &promotion.id,
                &promotion.product_id,
                promotion.discount_type.as_str(),
                promotion.discount_value,
                promotion.min_price,
                promotion.active as i64,
                promotion.valid_from.timestamp(),
                promotion.valid_until.timestamp(),
                &promotion.description,
            ],
        )?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }
}

fn row_to_product(row: &rusqlite::Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        name: row.get(1)?,
        category: row.get(2)?,
        anchor_price: row.get(3)?,
        cost_price: row.get(4)?,
        min_margin: row.get(5)?,
        target_margin: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionParams;
    use chrono::Duration as ChronoDuration;

    fn store() -> SqliteRecords {
        let file = tempfile::NamedTempFile::new().unwrap();
        let (_, path) = file.keep().unwrap();
        SqliteRecords::new(path.to_str().unwrap()).unwrap()
    }

    fn widget() -> Product {
        Product {
            id: "widget-1".into(),
            name: "Widget".into(),
            category: "gadgets".into(),
            anchor_price: 1000.0,
            cost_price: 625.0,
            min_margin: 0.12,
            target_margin: 0.30,
        }
    }

    #[tokio::test]
    async fn product_crud() {
        let store = store();
        assert!(store.create_product(&widget()).await.unwrap());
        // duplicate id is reported, not overwritten
        assert!(!store.create_product(&widget()).await.unwrap());

        let found = store.get_product("widget-1").await.unwrap().unwrap();
        assert_eq!(found.name, "Widget");
        assert_eq!(found.reservation_price(), 700.0);

        assert!(store.get_product("missing").await.unwrap().is_none());
        assert_eq!(store.list_products(0, 50).await.unwrap().len(), 1);
        assert!(store.list_products(1, 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn session_upsert_and_expiry() {
        let store = store();
        let mut session = NegotiationSession::new(
            &widget(),
            SessionParams {
                beta: 5.0,
                alpha: 0.6,
                max_rounds: 10,
                ttl_seconds: 300,
            },
            "1.2.3.4",
        );

        store.upsert_session(&session).await.unwrap();
        let loaded = store
            .load_session(&session.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.product_id, "widget-1");
        assert_eq!(loaded.session_token, session.session_token);

        // second upsert replaces, not duplicates
        session.current_round = 3;
        store.upsert_session(&session).await.unwrap();
        let loaded = store
            .load_session(&session.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.current_round, 3);

        // expired sessions are invisible
        session.expires_at = Utc::now() - ChronoDuration::seconds(5);
        store.upsert_session(&session).await.unwrap();
        assert!(store
            .load_session(&session.session_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn audit_log_ordered_by_round() {
        let store = store();
        for round in [2u32, 1, 3] {
            store
                .append_audit(&AuditRecord {
                    session_id: "s1".into(),
                    round,
                    buyer_message: format!("round {round}"),
                    buyer_price: 500.0 + round as f64,
                    counter_price: 900.0,
                    tactic: "concession".into(),
                    bot_score: 0.0,
                    state: "responding".into(),
                    timestamp: Utc::now(),
                })
                .await
                .unwrap();
        }

        let logs = store.list_audit("s1", 0, 50).await.unwrap();
        assert_eq!(
            logs.iter().map(|l| l.round).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        let page = store.list_audit("s1", 1, 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].round, 2);

        assert!(store.list_audit("other", 0, 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn promotion_lookup_filters() {
        let store = store();
        let now = Utc::now();
        let promo = |id: &str, product_id: &str, active: bool, from: i64, until: i64| Promotion {
            id: id.into(),
            product_id: product_id.into(),
            discount_type: DiscountType::Flat,
            discount_value: 50.0,
            min_price: 0.0,
            active,
            valid_from: now + ChronoDuration::seconds(from),
            valid_until: now + ChronoDuration::seconds(until),
            description: String::new(),
        };

        store
            .upsert_promotion(&promo("current", "widget-1", true, -60, 60))
            .await
            .unwrap();
        store
            .upsert_promotion(&promo("storewide", ALL_PRODUCTS, true, -60, 60))
            .await
            .unwrap();
        store
            .upsert_promotion(&promo("inactive", "widget-1", false, -60, 60))
            .await
            .unwrap();
        store
            .upsert_promotion(&promo("expired", "widget-1", true, -120, -60))
            .await
            .unwrap();
        store
            .upsert_promotion(&promo("other-product", "other", true, -60, 60))
            .await
            .unwrap();

        let mut ids: Vec<String> = store
            .active_promotions("widget-1", now)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["current", "storewide"]);
    }
}
