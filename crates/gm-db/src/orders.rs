use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use gm_schemas::{Order, OrderNumber, OrderStatus};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};

use crate::SubmitOutcome;

/// Record an upload. The first uploader owns the number.
pub async fn submit_order(
    pool: &PgPool,
    login: &str,
    number: &OrderNumber,
    uploaded_at: DateTime<Utc>,
) -> Result<SubmitOutcome> {
    let inserted = sqlx::query(
        r#"
        insert into orders (number, login, status, accrual, uploaded_at)
        values ($1, $2, 'NEW', 0, $3)
        on conflict (number) do nothing
        "#,
    )
    .bind(number.as_str())
    .bind(login)
    .bind(uploaded_at)
    .execute(pool)
    .await
    .context("submit_order insert failed")?
    .rows_affected();

    if inserted == 1 {
        return Ok(SubmitOutcome::Accepted);
    }

    let (owner,): (String,) = sqlx::query_as::<_, (String,)>("select login from orders where number = $1")
        .bind(number.as_str())
        .fetch_one(pool)
        .await
        .context("submit_order owner lookup failed")?;

    if owner == login {
        Ok(SubmitOutcome::AlreadyOwned)
    } else {
        Ok(SubmitOutcome::OwnedByAnother)
    }
}

pub async fn orders_for_user(pool: &PgPool, login: &str) -> Result<Vec<Order>> {
    let rows = sqlx::query(
        r#"
        select number, status, accrual, uploaded_at
        from orders
        where login = $1
        order by uploaded_at asc, number asc
        "#,
    )
    .bind(login)
    .fetch_all(pool)
    .await
    .context("orders_for_user query failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for r in rows {
        let number: String = r.try_get("number")?;
        let status: String = r.try_get("status")?;
        let status = OrderStatus::parse(&status)?;
        let accrual: Decimal = r.try_get("accrual")?;
        out.push(Order {
            number: parse_stored(&number)?,
            status,
            accrual: (status == OrderStatus::Processed).then_some(accrual),
            uploaded_at: r.try_get("uploaded_at")?,
        });
    }
    Ok(out)
}

pub async fn list_non_terminal_orders(pool: &PgPool) -> Result<BTreeMap<OrderNumber, OrderStatus>> {
    let rows = sqlx::query(
        r#"
        select number, status
        from orders
        where status in ('NEW','PROCESSING')
        "#,
    )
    .fetch_all(pool)
    .await
    .context("list_non_terminal_orders query failed")?;

    let mut out = BTreeMap::new();
    for r in rows {
        let number: String = r.try_get("number")?;
        let status: String = r.try_get("status")?;
        out.insert(parse_stored(&number)?, OrderStatus::parse(&status)?);
    }
    Ok(out)
}

/// Move an order forward and, for PROCESSED, credit its owner in the same
/// transaction.
///
/// The update only matches rows in a status that may legally precede
/// `status`, so a second writer (or a replayed reply) finds no row and
/// `false` comes back with nothing written.
pub async fn update_order_status(
    pool: &PgPool,
    number: &OrderNumber,
    status: OrderStatus,
    accrual: Decimal,
) -> Result<bool> {
    let predecessors = predecessors(status);
    if predecessors.is_empty() {
        return Err(anyhow!("update_order_status: nothing may move to {status}"));
    }
    if accrual < Decimal::ZERO {
        return Err(anyhow!("update_order_status: negative accrual {accrual} for {number}"));
    }

    let mut tx = pool.begin().await.context("update_order_status begin failed")?;

    let row = sqlx::query(
        r#"
        update orders
        set status = $2,
            accrual = $3
        where number = $1
          and status = any($4)
        returning login
        "#,
    )
    .bind(number.as_str())
    .bind(status.as_str())
    .bind(accrual)
    .bind(predecessors)
    .fetch_optional(&mut *tx)
    .await
    .context("update_order_status update failed")?;

    let Some(row) = row else {
        tx.rollback().await.context("update_order_status rollback failed")?;
        return Ok(false);
    };
    let login: String = row.try_get("login")?;

    if status == OrderStatus::Processed && accrual > Decimal::ZERO {
        let credited = sqlx::query("update balances set current = current + $2 where login = $1")
            .bind(&login)
            .bind(accrual)
            .execute(&mut *tx)
            .await
            .context("update_order_status credit failed")?
            .rows_affected();
        if credited != 1 {
            // Dropping the transaction rolls the status change back too.
            return Err(anyhow!("update_order_status: no balance row for {login}"));
        }
    }

    tx.commit().await.context("update_order_status commit failed")?;
    Ok(true)
}

fn predecessors(status: OrderStatus) -> Vec<String> {
    let from: &[&str] = match status {
        OrderStatus::New => &[],
        OrderStatus::Processing => &["NEW"],
        OrderStatus::Invalid | OrderStatus::Processed => &["NEW", "PROCESSING"],
    };
    from.iter().map(|s| s.to_string()).collect()
}

fn parse_stored(number: &str) -> Result<OrderNumber> {
    OrderNumber::parse(number).with_context(|| format!("stored order number {number:?} is invalid"))
}
