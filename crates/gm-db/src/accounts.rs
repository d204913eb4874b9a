use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use gm_schemas::{Balance, OrderNumber, Withdrawal};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};

use crate::{RegisterOutcome, WithdrawOutcome};

/// Insert the user and its zero balance in one transaction.
pub async fn register_user(pool: &PgPool, login: &str, password_hash: &str) -> Result<RegisterOutcome> {
    let mut tx = pool.begin().await.context("register_user begin failed")?;

    let inserted = sqlx::query(
        r#"
        insert into users (login, password_hash)
        values ($1, $2)
        on conflict (login) do nothing
        "#,
    )
    .bind(login)
    .bind(password_hash)
    .execute(&mut *tx)
    .await
    .context("register_user insert user failed")?
    .rows_affected();

    if inserted == 0 {
        tx.rollback().await.context("register_user rollback failed")?;
        return Ok(RegisterOutcome::LoginTaken);
    }

    sqlx::query("insert into balances (login, current) values ($1, 0)")
        .bind(login)
        .execute(&mut *tx)
        .await
        .context("register_user insert balance failed")?;

    tx.commit().await.context("register_user commit failed")?;
    Ok(RegisterOutcome::Created)
}

pub async fn password_hash(pool: &PgPool, login: &str) -> Result<Option<String>> {
    let row = sqlx::query("select password_hash from users where login = $1")
        .bind(login)
        .fetch_optional(pool)
        .await
        .context("password_hash query failed")?;

    match row {
        Some(r) => Ok(Some(r.try_get("password_hash")?)),
        None => Ok(None),
    }
}

/// `current` from the balance row; `withdrawn` summed from the withdrawals.
///
/// A login with no balance row reads as zero.
pub async fn balance(pool: &PgPool, login: &str) -> Result<Balance> {
    let row = sqlx::query(
        r#"
        select
          b.current as current,
          coalesce(
            (select sum(w.amount) from withdrawals w where w.login = b.login),
            0
          )::numeric as withdrawn
        from balances b
        where b.login = $1
        "#,
    )
    .bind(login)
    .fetch_optional(pool)
    .await
    .context("balance query failed")?;

    match row {
        Some(r) => Ok(Balance {
            current: r.try_get("current")?,
            withdrawn: r.try_get("withdrawn")?,
        }),
        None => Ok(Balance::zero()),
    }
}

/// Lock the balance row, check funds, debit and record the withdrawal.
///
/// Nothing is written unless every step succeeds.
pub async fn withdraw(
    pool: &PgPool,
    login: &str,
    order: &OrderNumber,
    sum: Decimal,
    processed_at: DateTime<Utc>,
) -> Result<WithdrawOutcome> {
    if sum <= Decimal::ZERO {
        bail!("withdraw sum must be positive, got {sum}");
    }

    let mut tx = pool.begin().await.context("withdraw begin failed")?;

    let row = sqlx::query("select current from balances where login = $1 for update")
        .bind(login)
        .fetch_optional(&mut *tx)
        .await
        .context("withdraw lock balance failed")?;

    let current: Decimal = match row {
        Some(r) => r.try_get("current")?,
        None => Decimal::ZERO,
    };

    if current < sum {
        tx.rollback().await.context("withdraw rollback failed")?;
        return Ok(WithdrawOutcome::InsufficientFunds);
    }

    let inserted = sqlx::query(
        r#"
        insert into withdrawals (order_number, login, amount, processed_at)
        values ($1, $2, $3, $4)
        on conflict (order_number) do nothing
        "#,
    )
    .bind(order.as_str())
    .bind(login)
    .bind(sum)
    .bind(processed_at)
    .execute(&mut *tx)
    .await
    .context("withdraw insert failed")?
    .rows_affected();

    if inserted == 0 {
        tx.rollback().await.context("withdraw rollback failed")?;
        return Ok(WithdrawOutcome::DuplicateOrder);
    }

    sqlx::query("update balances set current = current - $2 where login = $1")
        .bind(login)
        .bind(sum)
        .execute(&mut *tx)
        .await
        .context("withdraw debit failed")?;

    tx.commit().await.context("withdraw commit failed")?;
    Ok(WithdrawOutcome::Completed)
}

pub async fn withdrawals_for_user(pool: &PgPool, login: &str) -> Result<Vec<Withdrawal>> {
    let rows = sqlx::query(
        r#"
        select order_number, amount, processed_at
        from withdrawals
        where login = $1
        order by processed_at asc, order_number asc
        "#,
    )
    .bind(login)
    .fetch_all(pool)
    .await
    .context("withdrawals_for_user query failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for r in rows {
        let number: String = r.try_get("order_number")?;
        out.push(Withdrawal {
            order: OrderNumber::parse(&number)
                .with_context(|| format!("stored withdrawal order number {number:?} is invalid"))?,
            sum: r.try_get("amount")?,
            processed_at: r.try_get("processed_at")?,
        });
    }
    Ok(out)
}
