//! tdk-db
//!
//! PostgreSQL realization of the trade store and trader directory.
//!
//! Every lifecycle mutation runs in one transaction covering the trade
//! mutation and its audit entry; `update_trade` guards the write with a
//! compare-and-set on the previous status so conflicting lifecycle
//! operations on the same trade serialize at the row. Queries are
//! runtime-bound (`sqlx::query` + `.bind`), never the compile-time checked
//! macros, so the workspace builds without a live database.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::warn;
use uuid::Uuid;

use tdk_audit::{AuditEntry, AuditMeta, TraderDirectory};
use tdk_engine::{StoreError, TradeStore};
use tdk_schemas::{Trade, TradeAllocation, TradeFilter, TradeStatus};

pub const ENV_DB_URL: &str = "TDK_DATABASE_URL";

/// Connect to Postgres using TDK_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url =
        std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded sqlx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

const TRADE_COLUMNS: &str = r#"
    trade_id, order_id, instrument_id, side, qty, price, trader_id,
    broker_id, account_id, status, cancellation_reason, expiry_date,
    notional_value, commission, pnl, unrealized_pnl, created_at, updated_at
"#;

fn row_to_trade(row: &PgRow) -> Result<Trade> {
    Ok(Trade {
        trade_id: row.try_get("trade_id")?,
        order_id: row.try_get("order_id")?,
        instrument_id: row.try_get("instrument_id")?,
        side: row.try_get::<String, _>("side")?.parse()?,
        qty: row.try_get("qty")?,
        price: row.try_get("price")?,
        trader_id: row.try_get("trader_id")?,
        broker_id: row.try_get("broker_id")?,
        account_id: row.try_get("account_id")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        cancellation_reason: row.try_get("cancellation_reason")?,
        expiry_date: row.try_get("expiry_date")?,
        notional_value: row.try_get("notional_value")?,
        commission: row.try_get("commission")?,
        pnl: row.try_get("pnl")?,
        unrealized_pnl: row.try_get("unrealized_pnl")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_allocation(row: &PgRow) -> Result<TradeAllocation> {
    Ok(TradeAllocation {
        allocation_id: row.try_get("allocation_id")?,
        trade_id: row.try_get("trade_id")?,
        account_id: row.try_get("account_id")?,
        qty: row.try_get("qty")?,
        price: row.try_get("price")?,
        status: row.try_get("status")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_audit(row: &PgRow) -> Result<AuditEntry> {
    let meta: Option<AuditMeta> = row
        .try_get::<Option<Value>, _>("metadata")?
        .map(serde_json::from_value)
        .transpose()
        .context("decode audit metadata")?;

    let old_status: Option<TradeStatus> = row
        .try_get::<Option<String>, _>("old_status")?
        .map(|s| s.parse())
        .transpose()?;
    let new_status: Option<TradeStatus> = row
        .try_get::<Option<String>, _>("new_status")?
        .map(|s| s.parse())
        .transpose()?;

    Ok(AuditEntry {
        audit_id: row.try_get::<Uuid, _>("audit_id")?,
        trade_id: row.try_get("trade_id")?,
        event_type: row.try_get::<String, _>("event_type")?.parse()?,
        description: row.try_get("event_description")?,
        old_status,
        new_status,
        changed_by: row.try_get("changed_by")?,
        meta,
        created_at: row.try_get("created_at")?,
    })
}

/// Insert one audit row inside the caller's transaction.
async fn insert_audit_tx(tx: &mut Transaction<'_, Postgres>, audit: &AuditEntry) -> Result<()> {
    let metadata: Option<Value> = audit
        .meta
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .context("serialize audit metadata")?;

    sqlx::query(
        r#"
        insert into trade_audit_trail (
          audit_id, trade_id, event_type, event_description, old_status,
          new_status, changed_by, metadata, created_at
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9
        )
        "#,
    )
    .bind(audit.audit_id)
    .bind(&audit.trade_id)
    .bind(audit.event_type.as_str())
    .bind(&audit.description)
    .bind(audit.old_status.map(|s| s.as_str()))
    .bind(audit.new_status.map(|s| s.as_str()))
    .bind(&audit.changed_by)
    .bind(metadata)
    .bind(audit.created_at)
    .execute(&mut **tx)
    .await
    .context("insert audit entry failed")?;

    Ok(())
}

// ---------------------------------------------------------------------------
// PgTradeStore
// ---------------------------------------------------------------------------

/// PostgreSQL-backed [`TradeStore`].
#[derive(Clone)]
pub struct PgTradeStore {
    pool: PgPool,
}

impl PgTradeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TradeStore for PgTradeStore {
    async fn insert_trade(&self, trade: &Trade, audit: &AuditEntry) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.context("begin insert_trade tx")?;

        sqlx::query(
            r#"
            insert into trade (
              trade_id, order_id, instrument_id, side, qty, price, trader_id,
              broker_id, account_id, status, cancellation_reason, expiry_date,
              notional_value, commission, pnl, unrealized_pnl, created_at,
              updated_at
            ) values (
              $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
              $15, $16, $17, $18
            )
            "#,
        )
        .bind(&trade.trade_id)
        .bind(&trade.order_id)
        .bind(&trade.instrument_id)
        .bind(trade.side.as_str())
        .bind(trade.qty)
        .bind(trade.price)
        .bind(&trade.trader_id)
        .bind(&trade.broker_id)
        .bind(&trade.account_id)
        .bind(trade.status.as_str())
        .bind(&trade.cancellation_reason)
        .bind(trade.expiry_date)
        .bind(trade.notional_value)
        .bind(trade.commission)
        .bind(trade.pnl)
        .bind(trade.unrealized_pnl)
        .bind(trade.created_at)
        .bind(trade.updated_at)
        .execute(&mut *tx)
        .await
        .context("insert trade failed")?;

        insert_audit_tx(&mut tx, audit).await?;

        tx.commit().await.context("commit insert_trade tx")?;
        Ok(())
    }

    async fn get_trade(&self, trade_id: &str) -> Result<Option<Trade>, StoreError> {
        let row = sqlx::query(&format!("select {TRADE_COLUMNS} from trade where trade_id = $1"))
            .bind(trade_id)
            .fetch_optional(&self.pool)
            .await
            .context("get_trade failed")?;

        Ok(row.as_ref().map(row_to_trade).transpose()?)
    }

    async fn update_trade(
        &self,
        trade: &Trade,
        expected: TradeStatus,
        audit: &AuditEntry,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.context("begin update_trade tx")?;

        // Compare-and-set on the previous status: zero rows affected means
        // another operation committed between our read and this write.
        let res = sqlx::query(
            r#"
            update trade
               set status = $1,
                   cancellation_reason = $2,
                   commission = $3,
                   pnl = $4,
                   unrealized_pnl = $5,
                   updated_at = $6
             where trade_id = $7
               and status = $8
            "#,
        )
        .bind(trade.status.as_str())
        .bind(&trade.cancellation_reason)
        .bind(trade.commission)
        .bind(trade.pnl)
        .bind(trade.unrealized_pnl)
        .bind(trade.updated_at)
        .bind(&trade.trade_id)
        .bind(expected.as_str())
        .execute(&mut *tx)
        .await
        .context("update trade failed")?;

        if res.rows_affected() == 0 {
            let found: Option<(String,)> =
                sqlx::query_as("select status from trade where trade_id = $1")
                    .bind(&trade.trade_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .context("re-read trade status failed")?;

            return match found {
                None => Err(StoreError::NotFound {
                    trade_id: trade.trade_id.clone(),
                }),
                Some((status,)) => Err(StoreError::Conflict {
                    trade_id: trade.trade_id.clone(),
                    expected,
                    found: status.parse().map_err(anyhow::Error::from)?,
                }),
            };
        }

        insert_audit_tx(&mut tx, audit).await?;

        tx.commit().await.context("commit update_trade tx")?;
        Ok(())
    }

    async fn list_trades(&self, filter: &TradeFilter) -> Result<Vec<Trade>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            select {TRADE_COLUMNS} from trade
             where ($1::text is null or status = $1)
               and ($2::text is null or account_id = $2)
               and ($3::text is null or trader_id = $3)
               and ($4::text is null or instrument_id = $4)
            "#
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.account_id.as_deref())
        .bind(filter.trader_id.as_deref())
        .bind(filter.instrument_id.as_deref())
        .fetch_all(&self.pool)
        .await
        .context("list_trades failed")?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(row_to_trade(row)?);
        }
        Ok(out)
    }

    async fn insert_allocations(
        &self,
        allocations: &[TradeAllocation],
        audit: &AuditEntry,
    ) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin insert_allocations tx")?;

        for alloc in allocations {
            sqlx::query(
                r#"
                insert into trade_allocation (
                  allocation_id, trade_id, account_id, qty, price, status,
                  created_at
                ) values (
                  $1, $2, $3, $4, $5, $6, $7
                )
                "#,
            )
            .bind(&alloc.allocation_id)
            .bind(&alloc.trade_id)
            .bind(&alloc.account_id)
            .bind(alloc.qty)
            .bind(alloc.price)
            .bind(&alloc.status)
            .bind(alloc.created_at)
            .execute(&mut *tx)
            .await
            .context("insert allocation row failed")?;
        }

        insert_audit_tx(&mut tx, audit).await?;

        tx.commit().await.context("commit insert_allocations tx")?;
        Ok(())
    }

    async fn list_allocations(&self, trade_id: &str) -> Result<Vec<TradeAllocation>, StoreError> {
        let rows = sqlx::query(
            r#"
            select allocation_id, trade_id, account_id, qty, price, status,
                   created_at
              from trade_allocation
             where trade_id = $1
             order by created_at asc
            "#,
        )
        .bind(trade_id)
        .fetch_all(&self.pool)
        .await
        .context("list_allocations failed")?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(row_to_allocation(row)?);
        }
        Ok(out)
    }

    async fn list_audit(&self, trade_id: &str) -> Result<Vec<AuditEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            select audit_id, trade_id, event_type, event_description,
                   old_status, new_status, changed_by, metadata, created_at
              from trade_audit_trail
             where trade_id = $1
             order by created_at asc
            "#,
        )
        .bind(trade_id)
        .fetch_all(&self.pool)
        .await
        .context("list_audit failed")?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(row_to_audit(row)?);
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// PgTraderDirectory
// ---------------------------------------------------------------------------

/// Trader directory backed by the `trader` table. Lookup failures degrade
/// to "not resolvable" — audit enrichment then falls back to the raw id.
#[derive(Clone)]
pub struct PgTraderDirectory {
    pool: PgPool,
}

impl PgTraderDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TraderDirectory for PgTraderDirectory {
    async fn resolve_display_name(&self, trader_id: &str) -> Option<String> {
        let res: Result<Option<(String,)>, sqlx::Error> =
            sqlx::query_as("select name from trader where trader_id = $1")
                .bind(trader_id)
                .fetch_optional(&self.pool)
                .await;

        match res {
            Ok(row) => row.map(|(name,)| name),
            Err(err) => {
                warn!(trader_id, error = %err, "trader directory lookup failed");
                None
            }
        }
    }
}
