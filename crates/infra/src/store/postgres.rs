//! Postgres-backed Inventory Store + History Ledger.
//!
//! Schema: `crates/infra/migrations/0001_inventory.sql`.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation on `inventory_items_serial_key`) | `23505` | `DuplicateSerial` |
//! | Database (other unique violation) | `23505` | `Concurrency` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / RowNotFound / Other | N/A | `Backend` |
//!
//! ## Compare-and-swap
//!
//! A commit runs in one transaction: the item row is inserted with
//! `ON CONFLICT DO NOTHING` (new items) or updated with
//! `WHERE version = $expected` (existing items). Zero affected rows means a
//! concurrent writer won and the transaction is rolled back. The history row is
//! inserted in the same transaction.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{Span, debug, instrument};
use uuid::Uuid;

use fieldcrm_core::{AggregateId, AggregateRoot, LocationId, OrderId, TenantId, UserId};
use fieldcrm_inventory::{
    HistoryAction, HistoryEntry, HistoryFilter, InventoryItem, ItemId, NewHistoryEntry,
};

use super::{HistoryLedger, InventoryRepository, InventoryStore, ItemChange, StoreError};

const SERIAL_CONSTRAINT: &str = "inventory_items_serial_key";

const ITEM_COLUMNS: &str = "state";

const HISTORY_COLUMNS: &str = r#"
    id, sequence, tenant_id, item_id, action, action_date, performed_by_id,
    assigned_to_id, assigned_order_id, from_location_id, to_location_id,
    from_technician_id, quantity, notes
"#;

/// Postgres repository. `Send + Sync`; connections come from the shared pool.
#[derive(Debug, Clone)]
pub struct PostgresInventoryRepository {
    pool: Arc<PgPool>,
}

impl PostgresInventoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Apply the bundled schema (idempotent).
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(include_str!("../../migrations/0001_inventory.sql"))
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid(), item_id = %item_id), err)]
    pub async fn load_item(&self, tenant_id: TenantId, item_id: ItemId) -> Result<Option<InventoryItem>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items WHERE tenant_id = $1 AND item_id = $2"
        ))
        .bind(tenant_id.as_uuid())
        .bind(item_id.0.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_item", e))?;

        row.as_ref().map(item_from_row).transpose()
    }

    async fn load_items_where(
        &self,
        operation: &str,
        predicate: &str,
        tenant_id: TenantId,
        arg: Option<ItemArg<'_>>,
    ) -> Result<Vec<InventoryItem>, StoreError> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items WHERE tenant_id = $1 AND {predicate} \
             ORDER BY created_at ASC, item_id ASC"
        );
        let mut query = sqlx::query(&sql).bind(tenant_id.as_uuid());
        query = match arg {
            Some(ItemArg::Id(id)) => query.bind(id),
            Some(ItemArg::Text(text)) => query.bind(text),
            None => query,
        };

        let rows = query
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;

        debug!(operation, rows = rows.len(), "loaded inventory items");
        rows.iter().map(item_from_row).collect()
    }

    #[instrument(skip(self, entry), fields(tenant_id = %tenant_id.as_uuid(), item_id = %item_id), err)]
    pub async fn append_history(
        &self,
        tenant_id: TenantId,
        item_id: ItemId,
        entry: NewHistoryEntry,
    ) -> Result<HistoryEntry, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        let recorded = insert_history(&mut tx, tenant_id, item_id, entry).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(recorded)
    }

    #[instrument(
        skip(self, filter),
        fields(tenant_id = %tenant_id.as_uuid(), item_id = %item_id, entries = tracing::field::Empty),
        err
    )]
    pub async fn load_history(
        &self,
        tenant_id: TenantId,
        item_id: ItemId,
        filter: &HistoryFilter,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {HISTORY_COLUMNS} FROM inventory_history \
             WHERE tenant_id = $1 AND item_id = $2 \
               AND ($3::timestamptz IS NULL OR action_date >= $3) \
               AND ($4::timestamptz IS NULL OR action_date <= $4) \
               AND ($5::uuid IS NULL OR performed_by_id = $5) \
             ORDER BY action_date ASC, sequence ASC"
        ))
        .bind(tenant_id.as_uuid())
        .bind(item_id.0.as_uuid())
        .bind(filter.from)
        .bind(filter.to)
        .bind(filter.performed_by.map(|u| *u.as_uuid()))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_history", e))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            let entry = history_from_row(row)?;
            // Action filter is applied here, the rest in SQL.
            if filter.matches(&entry) {
                entries.push(entry);
            }
        }
        Span::current().record("entries", entries.len());
        Ok(entries)
    }

    #[instrument(
        skip(self, change),
        fields(
            tenant_id = %tenant_id.as_uuid(),
            item_id = %change.item().id_typed(),
            expected_version = ?change.expected_version()
        ),
        err
    )]
    pub async fn commit_change(&self, tenant_id: TenantId, change: ItemChange) -> Result<Option<HistoryEntry>, StoreError> {
        let (item, expected, history) = change.into_checked(tenant_id)?;

        let state = serde_json::to_value(&item)
            .map_err(|e| StoreError::Backend(format!("item serialization failed: {e}")))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let affected = match expected {
            0 => insert_item(&mut tx, tenant_id, &item, &state).await?,
            expected => update_item(&mut tx, tenant_id, &item, &state, expected).await?,
        };

        if affected == 0 {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::Concurrency(format!(
                "item {} changed concurrently (expected version {expected})",
                item.id_typed()
            )));
        }

        let recorded = match history {
            Some(row) => Some(insert_history(&mut tx, tenant_id, item.id_typed(), row).await?),
            None => None,
        };

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(recorded)
    }

    fn runtime() -> Result<tokio::runtime::Handle, StoreError> {
        tokio::runtime::Handle::try_current().map_err(|_| {
            StoreError::Backend(
                "PostgresInventoryRepository requires a tokio runtime; call it from within a runtime context"
                    .to_string(),
            )
        })
    }
}

enum ItemArg<'a> {
    Id(Uuid),
    Text(&'a str),
}

async fn insert_item(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: TenantId,
    item: &InventoryItem,
    state: &serde_json::Value,
) -> Result<u64, StoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO inventory_items (
            tenant_id, item_id, item_type, name, serial_number, status,
            location_id, assigned_to_id, order_id, transfer_pending,
            version, state, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ON CONFLICT (tenant_id, item_id) DO NOTHING
        "#,
    )
    .bind(tenant_id.as_uuid())
    .bind(item.id_typed().0.as_uuid())
    .bind(item.item_type().as_str())
    .bind(item.name())
    .bind(item.serial_number())
    .bind(item.status().as_str())
    .bind(item.location_id().map(|l| *l.as_uuid()))
    .bind(item.assigned_to_id().map(|u| *u.as_uuid()))
    .bind(item.state().order_id().map(|o| *o.as_uuid()))
    .bind(item.transfer_pending())
    .bind(item.version() as i64)
    .bind(state)
    .bind(item.created_at().unwrap_or_else(Utc::now))
    .bind(item.updated_at().unwrap_or_else(Utc::now))
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_item", e))?;

    Ok(result.rows_affected())
}

async fn update_item(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: TenantId,
    item: &InventoryItem,
    state: &serde_json::Value,
    expected: u64,
) -> Result<u64, StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE inventory_items SET
            status = $3,
            location_id = $4,
            assigned_to_id = $5,
            order_id = $6,
            transfer_pending = $7,
            version = $8,
            state = $9,
            updated_at = $10
        WHERE tenant_id = $1 AND item_id = $2
          AND version = $11
        "#,
    )
    .bind(tenant_id.as_uuid())
    .bind(item.id_typed().0.as_uuid())
    .bind(item.status().as_str())
    .bind(item.location_id().map(|l| *l.as_uuid()))
    .bind(item.assigned_to_id().map(|u| *u.as_uuid()))
    .bind(item.state().order_id().map(|o| *o.as_uuid()))
    .bind(item.transfer_pending())
    .bind(item.version() as i64)
    .bind(state)
    .bind(item.updated_at().unwrap_or_else(Utc::now))
    .bind(expected as i64)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("update_item", e))?;

    Ok(result.rows_affected())
}

async fn insert_history(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: TenantId,
    item_id: ItemId,
    entry: NewHistoryEntry,
) -> Result<HistoryEntry, StoreError> {
    let id = Uuid::now_v7();
    // Sequence is assigned by the database; validate the row with a placeholder first.
    let draft = entry
        .into_entry(id, 0, tenant_id, item_id)
        .map_err(|e| StoreError::Backend(e.to_string()))?;

    let sequence: i64 = sqlx::query(
        r#"
        INSERT INTO inventory_history (
            id, tenant_id, item_id, action, action_date, performed_by_id,
            assigned_to_id, assigned_order_id, from_location_id, to_location_id,
            from_technician_id, quantity, notes
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        RETURNING sequence
        "#,
    )
    .bind(id)
    .bind(tenant_id.as_uuid())
    .bind(item_id.0.as_uuid())
    .bind(draft.action.as_str())
    .bind(draft.action_date)
    .bind(draft.performed_by_id.as_uuid())
    .bind(draft.assigned_to_id.map(|u| *u.as_uuid()))
    .bind(draft.assigned_order_id.map(|o| *o.as_uuid()))
    .bind(draft.from_location_id.map(|l| *l.as_uuid()))
    .bind(draft.to_location_id.map(|l| *l.as_uuid()))
    .bind(draft.from_technician_id.map(|u| *u.as_uuid()))
    .bind(draft.quantity)
    .bind(draft.notes.as_deref())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_history", e))?
    .try_get("sequence")
    .map_err(|e| map_sqlx_error("insert_history", e))?;

    Ok(HistoryEntry {
        sequence: sequence as u64,
        ..draft
    })
}

fn item_from_row(row: &PgRow) -> Result<InventoryItem, StoreError> {
    let state: serde_json::Value = row
        .try_get("state")
        .map_err(|e| map_sqlx_error("decode_item", e))?;
    serde_json::from_value(state).map_err(|e| StoreError::Backend(format!("failed to deserialize item row: {e}")))
}

fn history_from_row(row: &PgRow) -> Result<HistoryEntry, StoreError> {
    let get_uuid = |col: &str| -> Result<Option<Uuid>, StoreError> {
        row.try_get::<Option<Uuid>, _>(col)
            .map_err(|e| map_sqlx_error("decode_history", e))
    };
    let decode = |e: sqlx::Error| map_sqlx_error("decode_history", e);

    let action: String = row.try_get("action").map_err(decode)?;
    let action = HistoryAction::from_str(&action).map_err(|e| StoreError::Backend(e.to_string()))?;
    let sequence: i64 = row.try_get("sequence").map_err(decode)?;
    let tenant_id: Uuid = row.try_get("tenant_id").map_err(decode)?;
    let item_id: Uuid = row.try_get("item_id").map_err(decode)?;
    let action_date: DateTime<Utc> = row.try_get("action_date").map_err(decode)?;
    let performed_by: Uuid = row.try_get("performed_by_id").map_err(decode)?;

    Ok(HistoryEntry {
        id: row.try_get("id").map_err(decode)?,
        sequence: sequence as u64,
        tenant_id: TenantId::from_uuid(tenant_id),
        item_id: ItemId::new(AggregateId::from_uuid(item_id)),
        action,
        action_date,
        performed_by_id: UserId::from_uuid(performed_by),
        assigned_to_id: get_uuid("assigned_to_id")?.map(UserId::from_uuid),
        assigned_order_id: get_uuid("assigned_order_id")?.map(OrderId::from_uuid),
        from_location_id: get_uuid("from_location_id")?.map(LocationId::from_uuid),
        to_location_id: get_uuid("to_location_id")?.map(LocationId::from_uuid),
        from_technician_id: get_uuid("from_technician_id")?.map(UserId::from_uuid),
        quantity: row.try_get("quantity").map_err(decode)?,
        notes: row.try_get("notes").map_err(decode)?,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") if db_err.constraint() == Some(SERIAL_CONSTRAINT) => StoreError::DuplicateSerial(msg),
                Some("23505") => StoreError::Concurrency(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        sqlx::Error::RowNotFound => StoreError::Backend(format!("unexpected row not found in {operation}")),
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

impl InventoryStore for PostgresInventoryRepository {
    fn get(&self, tenant_id: TenantId, item_id: ItemId) -> Result<Option<InventoryItem>, StoreError> {
        Self::runtime()?.block_on(self.load_item(tenant_id, item_id))
    }

    fn get_by_serial(&self, tenant_id: TenantId, serial: &str) -> Result<Option<InventoryItem>, StoreError> {
        let items = Self::runtime()?.block_on(self.load_items_where(
            "get_by_serial",
            "serial_number = $2",
            tenant_id,
            Some(ItemArg::Text(serial)),
        ))?;
        Ok(items.into_iter().next())
    }

    fn list_by_location(&self, tenant_id: TenantId, location_id: LocationId) -> Result<Vec<InventoryItem>, StoreError> {
        Self::runtime()?.block_on(self.load_items_where(
            "list_by_location",
            "location_id = $2",
            tenant_id,
            Some(ItemArg::Id(*location_id.as_uuid())),
        ))
    }

    fn list_by_technician(&self, tenant_id: TenantId, technician_id: UserId) -> Result<Vec<InventoryItem>, StoreError> {
        Self::runtime()?.block_on(self.load_items_where(
            "list_by_technician",
            "assigned_to_id = $2",
            tenant_id,
            Some(ItemArg::Id(*technician_id.as_uuid())),
        ))
    }

    fn list_by_order(&self, tenant_id: TenantId, order_id: OrderId) -> Result<Vec<InventoryItem>, StoreError> {
        Self::runtime()?.block_on(self.load_items_where(
            "list_by_order",
            "order_id = $2",
            tenant_id,
            Some(ItemArg::Id(*order_id.as_uuid())),
        ))
    }

    fn list_by_name(&self, tenant_id: TenantId, name: &str) -> Result<Vec<InventoryItem>, StoreError> {
        Self::runtime()?.block_on(self.load_items_where("list_by_name", "name = $2", tenant_id, Some(ItemArg::Text(name))))
    }

    fn list_pending_transfers(&self, tenant_id: TenantId) -> Result<Vec<InventoryItem>, StoreError> {
        Self::runtime()?.block_on(self.load_items_where("list_pending_transfers", "transfer_pending", tenant_id, None))
    }
}

impl HistoryLedger for PostgresInventoryRepository {
    fn append(&self, tenant_id: TenantId, item_id: ItemId, entry: NewHistoryEntry) -> Result<HistoryEntry, StoreError> {
        Self::runtime()?.block_on(self.append_history(tenant_id, item_id, entry))
    }

    fn query_by_item(
        &self,
        tenant_id: TenantId,
        item_id: ItemId,
        filter: &HistoryFilter,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        Self::runtime()?.block_on(self.load_history(tenant_id, item_id, filter))
    }
}

impl InventoryRepository for PostgresInventoryRepository {
    fn commit(&self, tenant_id: TenantId, change: ItemChange) -> Result<Option<HistoryEntry>, StoreError> {
        Self::runtime()?.block_on(self.commit_change(tenant_id, change))
    }
}
