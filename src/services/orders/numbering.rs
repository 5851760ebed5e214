//! Order numbers of the form `ORD-<yyyy>-<nnnnn>`, drawn from a per-year
//! counter row in `order_sequences`.

use crate::{
    entities::{order, order_sequence, Order, OrderSequence},
    errors::ServiceError,
};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QuerySelect, Set,
};
use tracing::{debug, info};

const PREFIX: &str = "ORD";

pub fn format_order_number(year: i32, sequence: i64) -> String {
    format!("{}-{}-{:05}", PREFIX, year, sequence)
}

/// Sequence part of an order number issued in `year`.
pub fn parse_sequence(order_number: &str, year: i32) -> Option<i64> {
    let prefix = format!("{}-{}-", PREFIX, year);
    let digits = order_number.strip_prefix(&prefix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Hands out the next order number for `year`.
///
/// Must run on the caller's transaction: the increment holds the counter
/// row until commit, so concurrent checkouts serialize on it. When the
/// year has no counter yet it is seeded from the highest number already
/// stored for that year. Two requests seeding the same year at once
/// collide on the primary key and the loser gets `Conflict`.
pub async fn next_order_number<C: ConnectionTrait>(
    conn: &C,
    year: i32,
) -> Result<String, ServiceError> {
    let bumped = OrderSequence::update_many()
        .col_expr(
            order_sequence::Column::LastValue,
            Expr::col(order_sequence::Column::LastValue).add(1),
        )
        .filter(order_sequence::Column::Year.eq(year))
        .exec(conn)
        .await?;

    let sequence = if bumped.rows_affected > 0 {
        OrderSequence::find_by_id(year)
            .one(conn)
            .await?
            .map(|row| row.last_value)
            .ok_or_else(|| {
                ServiceError::InternalError(format!("order sequence for {} vanished", year))
            })?
    } else {
        let start = highest_existing(conn, year).await? + 1;
        order_sequence::ActiveModel {
            year: Set(year),
            last_value: Set(start),
        }
        .insert(conn)
        .await
        .map_err(|e| {
            ServiceError::from_db_unique(
                e,
                format!("Order sequence for {} was created concurrently", year),
            )
        })?;
        info!(year, start, "Seeded order sequence");
        start
    };

    let number = format_order_number(year, sequence);
    debug!(%number, "Allocated order number");
    Ok(number)
}

async fn highest_existing<C: ConnectionTrait>(conn: &C, year: i32) -> Result<i64, ServiceError> {
    let numbers: Vec<String> = Order::find()
        .select_only()
        .column(order::Column::OrderNumber)
        .filter(order::Column::OrderNumber.starts_with(format!("{}-{}-", PREFIX, year)))
        .into_tuple()
        .all(conn)
        .await?;

    Ok(numbers
        .iter()
        .filter_map(|n| parse_sequence(n, year))
        .max()
        .unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn formats_with_five_digit_padding() {
        assert_eq!(format_order_number(2025, 1), "ORD-2025-00001");
        assert_eq!(format_order_number(2025, 42), "ORD-2025-00042");
        assert_eq!(format_order_number(2026, 123_456), "ORD-2026-123456");
    }

    #[test]
    fn parses_only_matching_year() {
        assert_eq!(parse_sequence("ORD-2025-00017", 2025), Some(17));
        assert_eq!(parse_sequence("ORD-2024-00017", 2025), None);
        assert_eq!(parse_sequence("ORD-2025-", 2025), None);
        assert_eq!(parse_sequence("ORD-2025-12a", 2025), None);
        assert_eq!(parse_sequence("ORD-2025-+12", 2025), None);
    }

    proptest! {
        #[test]
        fn parse_inverts_format(year in 2000i32..2100, seq in 1i64..10_000_000) {
            prop_assert_eq!(parse_sequence(&format_order_number(year, seq), year), Some(seq));
        }
    }
}
