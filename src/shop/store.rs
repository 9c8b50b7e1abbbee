//! Catalog and Order Storage
//! Mission: Persist products and orders with SQLite

use crate::auth::user_store::{open_db, parse_uuid};
use crate::shop::models::{NewProduct, Order, OrderItem, OrderStatus, Product};
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("product {0} does not exist")]
    UnknownProduct(Uuid),
    #[error("order not found")]
    NotFound,
    #[error("order cannot be canceled. Current status: {0}")]
    NotCancelable(OrderStatus),
    #[error(transparent)]
    Storage(#[from] rusqlite::Error),
}

/// Product and order storage with SQLite backend
pub struct ShopStore {
    db_path: String,
}

impl ShopStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
        };
        store.init_db()?;
        Ok(store)
    }

    fn open(&self) -> rusqlite::Result<Connection> {
        open_db(&self.db_path)
    }

    fn init_db(&self) -> Result<()> {
        let conn = self
            .open()
            .with_context(|| format!("Failed to open shop database at {}", self.db_path))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS products (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                price REAL NOT NULL,
                stock INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'Pending',
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS order_items (
                id TEXT PRIMARY KEY,
                order_id TEXT NOT NULL REFERENCES orders(id),
                product_id TEXT NOT NULL,
                quantity INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_orders_user ON orders(user_id);
            CREATE INDEX IF NOT EXISTS idx_order_items_order ON order_items(order_id);",
        )
        .context("Failed to create shop tables")?;

        Ok(())
    }

    // ---- products ----

    pub fn create_product(&self, input: NewProduct) -> Result<Product> {
        let product = Product {
            id: Uuid::new_v4(),
            name: input.name,
            description: input.description,
            price: input.price,
            stock: input.stock,
        };

        let conn = self.open()?;
        conn.execute(
            "INSERT INTO products (id, name, description, price, stock)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                product.id.to_string(),
                product.name,
                product.description,
                product.price,
                product.stock,
            ],
        )
        .context("Failed to insert product")?;

        info!("📦 Created product: {} ({})", product.name, product.id);
        Ok(product)
    }

    pub fn list_products(&self) -> Result<Vec<Product>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, description, price, stock FROM products ORDER BY name, id",
        )?;

        let products = stmt
            .query_map([], |row| product_from_row(row, 0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(products)
    }

    pub fn get_product(&self, id: &Uuid) -> Result<Option<Product>> {
        let conn = self.open()?;
        let product = conn
            .query_row(
                "SELECT id, name, description, price, stock FROM products WHERE id = ?1",
                params![id.to_string()],
                |row| product_from_row(row, 0),
            )
            .optional()?;

        Ok(product)
    }

    /// Replace a product's fields. `None` if it does not exist.
    pub fn update_product(&self, id: &Uuid, input: NewProduct) -> Result<Option<Product>> {
        let conn = self.open()?;
        let updated = conn
            .execute(
                "UPDATE products SET name = ?2, description = ?3, price = ?4, stock = ?5
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    input.name,
                    input.description,
                    input.price,
                    input.stock,
                ],
            )
            .context("Failed to update product")?;

        if updated == 0 {
            return Ok(None);
        }

        Ok(Some(Product {
            id: *id,
            name: input.name,
            description: input.description,
            price: input.price,
            stock: input.stock,
        }))
    }

    /// Returns whether a product was deleted.
    pub fn delete_product(&self, id: &Uuid) -> Result<bool> {
        let conn = self.open()?;
        let deleted = conn
            .execute("DELETE FROM products WHERE id = ?1", params![id.to_string()])
            .context("Failed to delete product")?;

        if deleted > 0 {
            info!("🗑️  Deleted product: {}", id);
        }
        Ok(deleted > 0)
    }

    // ---- orders ----

    /// Create a `Pending` order for `user_id`. All products must exist; the
    /// order and its items are written in one transaction.
    pub fn place_order(&self, user_id: &Uuid, lines: &[(Uuid, i64)]) -> Result<Order, OrderError> {
        let mut conn = self.open()?;
        // Take the write lock up front so a concurrent writer waits on the
        // busy timeout instead of failing the read-to-write upgrade.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        for (product_id, _) in lines {
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM products WHERE id = ?1)",
                params![product_id.to_string()],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(OrderError::UnknownProduct(*product_id));
            }
        }

        let order_id = Uuid::new_v4();
        tx.execute(
            "INSERT INTO orders (id, user_id, status, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                order_id.to_string(),
                user_id.to_string(),
                OrderStatus::Pending.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )?;

        for (product_id, quantity) in lines {
            tx.execute(
                "INSERT INTO order_items (id, order_id, product_id, quantity)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    Uuid::new_v4().to_string(),
                    order_id.to_string(),
                    product_id.to_string(),
                    quantity,
                ],
            )?;
        }

        tx.commit()?;
        info!("🧾 Order {} placed by {} ({} items)", order_id, user_id, lines.len());

        load_order(&conn, &order_id)?.ok_or(OrderError::NotFound)
    }

    pub fn list_orders_for_user(&self, user_id: &Uuid) -> Result<Vec<Order>, OrderError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, status, created_at FROM orders
             WHERE user_id = ?1 ORDER BY created_at, rowid",
        )?;

        let headers = stmt
            .query_map(params![user_id.to_string()], order_header_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut orders = Vec::with_capacity(headers.len());
        for mut order in headers {
            order.items = load_items(&conn, &order.id)?;
            orders.push(order);
        }

        Ok(orders)
    }

    pub fn get_order(&self, order_id: &Uuid) -> Result<Option<Order>, OrderError> {
        let conn = self.open()?;
        Ok(load_order(&conn, order_id)?)
    }

    /// Cancel an order owned by `user_id`. Only `Pending` orders can be canceled.
    pub fn cancel_order(&self, order_id: &Uuid, user_id: &Uuid) -> Result<(), OrderError> {
        let conn = self.open()?;

        let updated = conn.execute(
            "UPDATE orders SET status = ?3 WHERE id = ?1 AND user_id = ?2 AND status = ?4",
            params![
                order_id.to_string(),
                user_id.to_string(),
                OrderStatus::Canceled.as_str(),
                OrderStatus::Pending.as_str(),
            ],
        )?;
        if updated == 1 {
            info!("🚫 Order {} canceled by {}", order_id, user_id);
            return Ok(());
        }

        let status: Option<String> = conn
            .query_row(
                "SELECT status FROM orders WHERE id = ?1 AND user_id = ?2",
                params![order_id.to_string(), user_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        match status {
            None => Err(OrderError::NotFound),
            Some(raw) => Err(OrderError::NotCancelable(
                raw.parse().unwrap_or(OrderStatus::Canceled),
            )),
        }
    }

    pub fn update_order_status(
        &self,
        order_id: &Uuid,
        status: OrderStatus,
    ) -> Result<Order, OrderError> {
        let conn = self.open()?;
        let updated = conn.execute(
            "UPDATE orders SET status = ?2 WHERE id = ?1",
            params![order_id.to_string(), status.as_str()],
        )?;
        if updated == 0 {
            return Err(OrderError::NotFound);
        }

        info!("📋 Order {} status set to {}", order_id, status);
        load_order(&conn, order_id)?.ok_or(OrderError::NotFound)
    }
}

fn product_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Product> {
    let id: String = row.get(offset)?;
    Ok(Product {
        id: parse_uuid(offset, &id)?,
        name: row.get(offset + 1)?,
        description: row.get(offset + 2)?,
        price: row.get(offset + 3)?,
        stock: row.get(offset + 4)?,
    })
}

fn order_header_from_row(row: &Row<'_>) -> rusqlite::Result<Order> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let status: String = row.get(2)?;

    Ok(Order {
        id: parse_uuid(0, &id)?,
        user_id: parse_uuid(1, &user_id)?,
        status: status.parse::<OrderStatus>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
        })?,
        created_at: row.get(3)?,
        items: Vec::new(),
    })
}

fn load_order(conn: &Connection, order_id: &Uuid) -> rusqlite::Result<Option<Order>> {
    let order = conn
        .query_row(
            "SELECT id, user_id, status, created_at FROM orders WHERE id = ?1",
            params![order_id.to_string()],
            order_header_from_row,
        )
        .optional()?;

    match order {
        Some(mut order) => {
            order.items = load_items(conn, order_id)?;
            Ok(Some(order))
        }
        None => Ok(None),
    }
}

fn load_items(conn: &Connection, order_id: &Uuid) -> rusqlite::Result<Vec<OrderItem>> {
    let mut stmt = conn.prepare(
        "SELECT oi.id, oi.order_id, oi.product_id, oi.quantity,
                p.id, p.name, p.description, p.price, p.stock
         FROM order_items oi
         LEFT JOIN products p ON p.id = oi.product_id
         WHERE oi.order_id = ?1
         ORDER BY oi.rowid",
    )?;

    let items = stmt
        .query_map(params![order_id.to_string()], |row| {
            let id: String = row.get(0)?;
            let order_id: String = row.get(1)?;
            let product_id: String = row.get(2)?;
            let joined: Option<String> = row.get(4)?;

            Ok(OrderItem {
                id: parse_uuid(0, &id)?,
                order_id: parse_uuid(1, &order_id)?,
                product_id: parse_uuid(2, &product_id)?,
                quantity: row.get(3)?,
                product: match joined {
                    Some(_) => Some(product_from_row(row, 4)?),
                    None => None,
                },
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(items)
}
