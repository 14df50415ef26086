//! Order repository for database operations.
//!
//! An order spans four tables. Writes go through one transaction; reads join
//! the one-to-one tables and load items with a second query.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orderflow_core::{Delivery, Item, Order, Payment};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::instrument;

use super::{OrderStore, RepositoryError};

const SELECT_ORDER: &str = r"
    SELECT
        o.order_uid, o.track_number, o.entry, o.locale, o.internal_signature,
        o.customer_id, o.delivery_service, o.shardkey, o.sm_id, o.date_created, o.oof_shard,
        d.name AS delivery_name, d.phone AS delivery_phone, d.zip AS delivery_zip,
        d.city AS delivery_city, d.address AS delivery_address,
        d.region AS delivery_region, d.email AS delivery_email,
        p.transaction AS payment_transaction, p.request_id AS payment_request_id,
        p.currency AS payment_currency, p.provider AS payment_provider,
        p.amount AS payment_amount, p.payment_dt AS payment_dt, p.bank AS payment_bank,
        p.delivery_cost AS payment_delivery_cost, p.goods_total AS payment_goods_total,
        p.custom_fee AS payment_custom_fee
    FROM orders o
    JOIN deliveries d ON d.order_uid = o.order_uid
    JOIN payments p ON p.order_uid = o.order_uid
";

const SELECT_ITEMS: &str = r"
    SELECT
        order_uid, chrt_id, track_number, price, rid, name,
        sale, size, total_price, nm_id, brand, status
    FROM items
    WHERE order_uid = ANY($1)
    ORDER BY order_uid, position
";

/// Joined `orders` + `deliveries` + `payments` row.
#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    order_uid: String,
    track_number: String,
    entry: String,
    locale: String,
    internal_signature: String,
    customer_id: String,
    delivery_service: String,
    shardkey: String,
    sm_id: i32,
    date_created: DateTime<Utc>,
    oof_shard: String,
    delivery_name: String,
    delivery_phone: String,
    delivery_zip: String,
    delivery_city: String,
    delivery_address: String,
    delivery_region: String,
    delivery_email: String,
    payment_transaction: String,
    payment_request_id: String,
    payment_currency: String,
    payment_provider: String,
    payment_amount: i64,
    payment_dt: i64,
    payment_bank: String,
    payment_delivery_cost: i64,
    payment_goods_total: i64,
    payment_custom_fee: i64,
}

impl OrderRow {
    fn into_order(self, items: Vec<Item>) -> Order {
        Order {
            order_uid: self.order_uid,
            track_number: self.track_number,
            entry: self.entry,
            delivery: Delivery {
                name: self.delivery_name,
                phone: self.delivery_phone,
                zip: self.delivery_zip,
                city: self.delivery_city,
                address: self.delivery_address,
                region: self.delivery_region,
                email: self.delivery_email,
            },
            payment: Payment {
                transaction: self.payment_transaction,
                request_id: self.payment_request_id,
                currency: self.payment_currency,
                provider: self.payment_provider,
                amount: self.payment_amount,
                payment_dt: self.payment_dt,
                bank: self.payment_bank,
                delivery_cost: self.payment_delivery_cost,
                goods_total: self.payment_goods_total,
                custom_fee: self.payment_custom_fee,
            },
            items,
            locale: self.locale,
            internal_signature: self.internal_signature,
            customer_id: self.customer_id,
            delivery_service: self.delivery_service,
            shardkey: self.shardkey,
            sm_id: self.sm_id,
            date_created: self.date_created,
            oof_shard: self.oof_shard,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    order_uid: String,
    chrt_id: i64,
    track_number: String,
    price: i64,
    rid: String,
    name: String,
    sale: i64,
    size: String,
    total_price: i64,
    nm_id: i64,
    brand: String,
    status: i32,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Self {
            chrt_id: row.chrt_id,
            track_number: row.track_number,
            price: row.price,
            rid: row.rid,
            name: row.name,
            sale: row.sale,
            size: row.size,
            total_price: row.total_price,
            nm_id: row.nm_id,
            brand: row.brand,
            status: row.status,
        }
    }
}

/// Attach item rows to their orders, keeping the order rows' sequence.
fn assemble(rows: Vec<OrderRow>, item_rows: Vec<ItemRow>) -> Vec<Order> {
    let mut items_by_order: HashMap<String, Vec<Item>> = HashMap::new();
    for row in item_rows {
        items_by_order
            .entry(row.order_uid.clone())
            .or_default()
            .push(row.into());
    }

    rows.into_iter()
        .map(|row| {
            let items = items_by_order.remove(&row.order_uid).unwrap_or_default();
            row.into_order(items)
        })
        .collect()
}

/// `PostgreSQL`-backed [`OrderStore`].
#[derive(Clone)]
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_items(&self, order_uids: &[String]) -> Result<Vec<ItemRow>, RepositoryError> {
        if order_uids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, ItemRow>(SELECT_ITEMS)
            .bind(order_uids)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }
}

#[async_trait]
impl OrderStore for OrderRepository {
    /// Upsert the whole aggregate in one transaction.
    ///
    /// Payment and delivery rows are overwritten and items are replaced
    /// wholesale, so reprocessing the same `order_uid` converges on the latest
    /// message instead of failing on a key conflict.
    #[instrument(skip(self, order), fields(order_uid = %order.order_uid))]
    async fn save_order(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        upsert_order(&mut tx, order).await?;
        upsert_delivery(&mut tx, &order.order_uid, &order.delivery).await?;
        upsert_payment(&mut tx, &order.order_uid, &order.payment).await?;
        replace_items(&mut tx, &order.order_uid, &order.items).await?;

        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_order_by_uid(&self, order_uid: &str) -> Result<Order, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("{SELECT_ORDER} WHERE o.order_uid = $1"))
            .bind(order_uid)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        let item_rows = self.load_items(&[row.order_uid.clone()]).await?;

        assemble(vec![row], item_rows)
            .pop()
            .ok_or_else(|| RepositoryError::DataCorruption("order row vanished".to_owned()))
    }

    #[instrument(skip(self))]
    async fn get_last_n_orders(&self, limit: usize) -> Result<Vec<Order>, RepositoryError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "{SELECT_ORDER} ORDER BY o.date_created DESC, o.order_uid LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let uids: Vec<String> = rows.iter().map(|row| row.order_uid.clone()).collect();
        let item_rows = self.load_items(&uids).await?;

        Ok(assemble(rows, item_rows))
    }
}

async fn upsert_order(
    tx: &mut Transaction<'_, Postgres>,
    order: &Order,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO orders (
            order_uid, track_number, entry, locale, internal_signature, customer_id,
            delivery_service, shardkey, sm_id, date_created, oof_shard
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (order_uid) DO UPDATE SET
            track_number = EXCLUDED.track_number,
            entry = EXCLUDED.entry,
            locale = EXCLUDED.locale,
            internal_signature = EXCLUDED.internal_signature,
            customer_id = EXCLUDED.customer_id,
            delivery_service = EXCLUDED.delivery_service,
            shardkey = EXCLUDED.shardkey,
            sm_id = EXCLUDED.sm_id,
            date_created = EXCLUDED.date_created,
            oof_shard = EXCLUDED.oof_shard
        ",
    )
    .bind(&order.order_uid)
    .bind(&order.track_number)
    .bind(&order.entry)
    .bind(&order.locale)
    .bind(&order.internal_signature)
    .bind(&order.customer_id)
    .bind(&order.delivery_service)
    .bind(&order.shardkey)
    .bind(order.sm_id)
    .bind(order.date_created)
    .bind(&order.oof_shard)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn upsert_delivery(
    tx: &mut Transaction<'_, Postgres>,
    order_uid: &str,
    delivery: &Delivery,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO deliveries (order_uid, name, phone, zip, city, address, region, email)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (order_uid) DO UPDATE SET
            name = EXCLUDED.name,
            phone = EXCLUDED.phone,
            zip = EXCLUDED.zip,
            city = EXCLUDED.city,
            address = EXCLUDED.address,
            region = EXCLUDED.region,
            email = EXCLUDED.email
        ",
    )
    .bind(order_uid)
    .bind(&delivery.name)
    .bind(&delivery.phone)
    .bind(&delivery.zip)
    .bind(&delivery.city)
    .bind(&delivery.address)
    .bind(&delivery.region)
    .bind(&delivery.email)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn upsert_payment(
    tx: &mut Transaction<'_, Postgres>,
    order_uid: &str,
    payment: &Payment,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO payments (
            order_uid, transaction, request_id, currency, provider, amount,
            payment_dt, bank, delivery_cost, goods_total, custom_fee
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (order_uid) DO UPDATE SET
            transaction = EXCLUDED.transaction,
            request_id = EXCLUDED.request_id,
            currency = EXCLUDED.currency,
            provider = EXCLUDED.provider,
            amount = EXCLUDED.amount,
            payment_dt = EXCLUDED.payment_dt,
            bank = EXCLUDED.bank,
            delivery_cost = EXCLUDED.delivery_cost,
            goods_total = EXCLUDED.goods_total,
            custom_fee = EXCLUDED.custom_fee
        ",
    )
    .bind(order_uid)
    .bind(&payment.transaction)
    .bind(&payment.request_id)
    .bind(&payment.currency)
    .bind(&payment.provider)
    .bind(payment.amount)
    .bind(payment.payment_dt)
    .bind(&payment.bank)
    .bind(payment.delivery_cost)
    .bind(payment.goods_total)
    .bind(payment.custom_fee)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn replace_items(
    tx: &mut Transaction<'_, Postgres>,
    order_uid: &str,
    items: &[Item],
) -> Result<(), RepositoryError> {
    sqlx::query("DELETE FROM items WHERE order_uid = $1")
        .bind(order_uid)
        .execute(&mut **tx)
        .await?;

    for (index, item) in items.iter().enumerate() {
        let position = i32::try_from(index).map_err(|_| {
            RepositoryError::DataCorruption(format!("order {order_uid} has too many items"))
        })?;

        sqlx::query(
            r"
            INSERT INTO items (
                order_uid, position, chrt_id, track_number, price, rid, name,
                sale, size, total_price, nm_id, brand, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ",
        )
        .bind(order_uid)
        .bind(position)
        .bind(item.chrt_id)
        .bind(&item.track_number)
        .bind(item.price)
        .bind(&item.rid)
        .bind(&item.name)
        .bind(item.sale)
        .bind(&item.size)
        .bind(item.total_price)
        .bind(item.nm_id)
        .bind(&item.brand)
        .bind(item.status)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}
