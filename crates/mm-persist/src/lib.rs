#![deny(warnings)]

//! Persistence layer: flat SQLite tables for the MM table set, one row per
//! entity, plus bincode snapshot saves. Load/save happens only at explicit
//! save points outside the per-month pipeline; the person table is owned
//! and persisted by the Realm, not here.

use anyhow::{Context, Result};
use mm_core::{
    BooksRow, EmployeeRow, LocationCoord, LocationRow, MmTables, OrderRow, OrderStatus, Pid,
    ProductId, ProductRow,
};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::info;

/// Default SQLite URL used for local saves.
pub fn default_sqlite_url() -> &'static str {
    "sqlite://./saves/realm.db"
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS mm_location_master (
        locv INTEGER NOT NULL,
        loch INTEGER NOT NULL,
        balance TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS mm_product_master (
        product_id INTEGER NOT NULL,
        locv INTEGER NOT NULL,
        loch INTEGER NOT NULL,
        unit_cost TEXT NOT NULL,
        unit_price TEXT NOT NULL,
        lead_time_months INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS mm_order_master (
        product_id INTEGER NOT NULL,
        order_date INTEGER NOT NULL,
        order_status INTEGER NOT NULL,
        sale_price TEXT NOT NULL,
        sales_tax TEXT NOT NULL,
        profit TEXT
    )",
    "CREATE TABLE IF NOT EXISTS mm_employee_master (
        locv INTEGER NOT NULL,
        loch INTEGER NOT NULL,
        pid INTEGER NOT NULL,
        wage TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS mm_books (
        period_s INTEGER NOT NULL,
        locv INTEGER NOT NULL,
        loch INTEGER NOT NULL,
        period_income TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS clock (
        month INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS saves (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        note TEXT,
        snapshot BLOB NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    )",
];

/// Connect to (creating if missing) and migrate the MM save database.
pub async fn init_db(url: &str) -> Result<SqlitePool> {
    let opts = SqliteConnectOptions::from_str(url)
        .with_context(|| format!("bad sqlite url: {url}"))?
        .create_if_missing(true);
    // a single connection keeps in-memory databases coherent
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts)
        .await
        .context("connecting sqlite")?;
    for stmt in SCHEMA {
        sqlx::query(stmt).execute(&pool).await?;
    }
    Ok(pool)
}

fn dec(text: &str) -> Result<Decimal> {
    Decimal::from_str(text).with_context(|| format!("bad decimal column: {text}"))
}

/// Replace the persisted MM tables and clock with the given state.
pub async fn save_tables(pool: &SqlitePool, tables: &MmTables, month: u32) -> Result<()> {
    let mut tx = pool.begin().await?;
    for table in [
        "mm_location_master",
        "mm_product_master",
        "mm_order_master",
        "mm_employee_master",
        "mm_books",
        "clock",
    ] {
        sqlx::query(&format!("DELETE FROM {table}"))
            .execute(&mut *tx)
            .await?;
    }
    for l in &tables.locations {
        sqlx::query("INSERT INTO mm_location_master (locv, loch, balance) VALUES (?, ?, ?)")
            .bind(i64::from(l.coord.v))
            .bind(i64::from(l.coord.h))
            .bind(l.balance.to_string())
            .execute(&mut *tx)
            .await?;
    }
    for p in &tables.products {
        sqlx::query(
            "INSERT INTO mm_product_master
             (product_id, locv, loch, unit_cost, unit_price, lead_time_months)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(p.product_id.0 as i64)
        .bind(i64::from(p.coord.v))
        .bind(i64::from(p.coord.h))
        .bind(p.unit_cost.to_string())
        .bind(p.unit_price.to_string())
        .bind(i64::from(p.lead_time_months))
        .execute(&mut *tx)
        .await?;
    }
    for o in &tables.orders {
        sqlx::query(
            "INSERT INTO mm_order_master
             (product_id, order_date, order_status, sale_price, sales_tax, profit)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(o.product_id.0 as i64)
        .bind(i64::from(o.order_date))
        .bind(i64::from(o.status.code()))
        .bind(o.sale_price.to_string())
        .bind(o.sales_tax.to_string())
        .bind(o.profit.map(|p| p.to_string()))
        .execute(&mut *tx)
        .await?;
    }
    for e in &tables.employees {
        sqlx::query("INSERT INTO mm_employee_master (locv, loch, pid, wage) VALUES (?, ?, ?, ?)")
            .bind(i64::from(e.coord.v))
            .bind(i64::from(e.coord.h))
            .bind(e.pid.0)
            .bind(e.wage.to_string())
            .execute(&mut *tx)
            .await?;
    }
    for b in &tables.books {
        sqlx::query(
            "INSERT INTO mm_books (period_s, locv, loch, period_income) VALUES (?, ?, ?, ?)",
        )
        .bind(i64::from(b.period_s))
        .bind(i64::from(b.coord.v))
        .bind(i64::from(b.coord.h))
        .bind(b.period_income.to_string())
        .execute(&mut *tx)
        .await?;
    }
    sqlx::query("INSERT INTO clock (month) VALUES (?)")
        .bind(i64::from(month))
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    info!(month, "saved MM tables");
    Ok(())
}

/// Load the persisted MM tables and clock month.
pub async fn load_tables(pool: &SqlitePool) -> Result<(MmTables, u32)> {
    let mut tables = MmTables::default();
    for row in sqlx::query("SELECT locv, loch, balance FROM mm_location_master")
        .fetch_all(pool)
        .await?
    {
        tables.locations.push(LocationRow {
            coord: LocationCoord::new(row.try_get::<i64, _>("locv")? as i32, row.try_get::<i64, _>("loch")? as i32),
            balance: dec(row.try_get("balance")?)?,
        });
    }
    for row in sqlx::query(
        "SELECT product_id, locv, loch, unit_cost, unit_price, lead_time_months
         FROM mm_product_master",
    )
    .fetch_all(pool)
    .await?
    {
        tables.products.push(ProductRow {
            product_id: ProductId(row.try_get::<i64, _>("product_id")? as u64),
            coord: LocationCoord::new(row.try_get::<i64, _>("locv")? as i32, row.try_get::<i64, _>("loch")? as i32),
            unit_cost: dec(row.try_get("unit_cost")?)?,
            unit_price: dec(row.try_get("unit_price")?)?,
            lead_time_months: row.try_get::<i64, _>("lead_time_months")? as u8,
        });
    }
    for row in sqlx::query(
        "SELECT product_id, order_date, order_status, sale_price, sales_tax, profit
         FROM mm_order_master",
    )
    .fetch_all(pool)
    .await?
    {
        let profit: Option<String> = row.try_get("profit")?;
        tables.orders.push(OrderRow {
            product_id: ProductId(row.try_get::<i64, _>("product_id")? as u64),
            order_date: row.try_get::<i64, _>("order_date")? as u32,
            status: OrderStatus::from_code(row.try_get::<i64, _>("order_status")? as i8)?,
            sale_price: dec(row.try_get("sale_price")?)?,
            sales_tax: dec(row.try_get("sales_tax")?)?,
            profit: profit.as_deref().map(dec).transpose()?,
        });
    }
    for row in sqlx::query("SELECT locv, loch, pid, wage FROM mm_employee_master")
        .fetch_all(pool)
        .await?
    {
        tables.employees.push(EmployeeRow {
            coord: LocationCoord::new(row.try_get::<i64, _>("locv")? as i32, row.try_get::<i64, _>("loch")? as i32),
            pid: Pid(row.try_get("pid")?),
            wage: dec(row.try_get("wage")?)?,
        });
    }
    for row in sqlx::query("SELECT period_s, locv, loch, period_income FROM mm_books")
        .fetch_all(pool)
        .await?
    {
        tables.books.push(BooksRow {
            period_s: row.try_get::<i64, _>("period_s")? as u32,
            coord: LocationCoord::new(row.try_get::<i64, _>("locv")? as i32, row.try_get::<i64, _>("loch")? as i32),
            period_income: dec(row.try_get("period_income")?)?,
        });
    }
    let month = sqlx::query("SELECT month FROM clock")
        .fetch_optional(pool)
        .await?
        .map(|row| row.try_get::<i64, _>("month"))
        .transpose()?
        .unwrap_or(0) as u32;
    Ok((tables, month))
}

/// Store a named bincode snapshot of the table set and clock. Returns the
/// save id.
pub async fn create_save(
    pool: &SqlitePool,
    name: &str,
    note: Option<&str>,
    tables: &MmTables,
    month: u32,
) -> Result<i64> {
    let blob = bincode::serialize(&(tables, month)).context("encoding snapshot")?;
    let result = sqlx::query("INSERT INTO saves (name, note, snapshot) VALUES (?, ?, ?)")
        .bind(name)
        .bind(note)
        .bind(blob)
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

/// Restore a snapshot created by [`create_save`].
pub async fn load_save(pool: &SqlitePool, id: i64) -> Result<(MmTables, u32)> {
    let row = sqlx::query("SELECT snapshot FROM saves WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .with_context(|| format!("no save with id {id}"))?;
    let blob: Vec<u8> = row.try_get("snapshot")?;
    bincode::deserialize(&blob).context("decoding snapshot")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tables() -> MmTables {
        let coord = LocationCoord::new(10, 20);
        MmTables {
            locations: vec![LocationRow {
                coord,
                balance: Decimal::new(-123_456, 2),
            }],
            products: vec![ProductRow {
                product_id: ProductId(1),
                coord,
                unit_cost: Decimal::new(600, 0),
                unit_price: Decimal::new(1000, 0),
                lead_time_months: 2,
            }],
            orders: vec![
                OrderRow {
                    product_id: ProductId(1),
                    order_date: 1001,
                    status: OrderStatus::InProduction(2),
                    sale_price: Decimal::new(1000, 0),
                    sales_tax: Decimal::new(60, 0),
                    profit: None,
                },
                OrderRow {
                    product_id: ProductId(1),
                    order_date: 1000,
                    status: OrderStatus::Complete,
                    sale_price: Decimal::new(1000, 0),
                    sales_tax: Decimal::new(60, 0),
                    profit: Some(Decimal::new(340, 0)),
                },
            ],
            employees: vec![EmployeeRow {
                coord,
                pid: Pid(7),
                wage: Decimal::new(40_000, 0),
            }],
            books: vec![BooksRow {
                period_s: 1000,
                coord,
                period_income: Decimal::new(-5012, 2),
            }],
        }
    }

    #[tokio::test]
    async fn tables_roundtrip() {
        let pool = init_db("sqlite::memory:").await.unwrap();
        let tables = sample_tables();
        save_tables(&pool, &tables, 1002).await.unwrap();
        let (back, month) = load_tables(&pool).await.unwrap();
        assert_eq!(back, tables);
        assert_eq!(month, 1002);
    }

    #[tokio::test]
    async fn save_replaces_previous_state() {
        let pool = init_db("sqlite::memory:").await.unwrap();
        let mut tables = sample_tables();
        save_tables(&pool, &tables, 1002).await.unwrap();
        tables.orders.clear();
        tables.locations[0].balance = Decimal::new(777, 0);
        save_tables(&pool, &tables, 1003).await.unwrap();
        let (back, month) = load_tables(&pool).await.unwrap();
        assert_eq!(back, tables);
        assert_eq!(month, 1003);
    }

    #[tokio::test]
    async fn empty_database_loads_empty_tables() {
        let pool = init_db("sqlite::memory:").await.unwrap();
        let (back, month) = load_tables(&pool).await.unwrap();
        assert_eq!(back, MmTables::default());
        assert_eq!(month, 0);
    }

    #[tokio::test]
    async fn snapshot_roundtrip() {
        let pool = init_db("sqlite::memory:").await.unwrap();
        let tables = sample_tables();
        let id = create_save(&pool, "autosave", Some("before tax"), &tables, 1002)
            .await
            .unwrap();
        let (back, month) = load_save(&pool, id).await.unwrap();
        assert_eq!(back, tables);
        assert_eq!(month, 1002);
    }
}
