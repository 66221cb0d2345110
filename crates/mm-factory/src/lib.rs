#![deny(warnings)]

//! Order book and manufacturing engine for the MM pipeline.
//!
//! Intake merges incoming orders into `mm_order_master` with full-row
//! deduplication; the parity check repairs rows dropped by concurrent
//! external submission. Manufacturing ticks every in-production order one
//! month, fulfills the ones that reach zero, and schedules pending orders
//! into production subject to each location's staffing capacity.

use mm_core::{LocationCoord, MmTables, OrderRow, OrderStatus, ProductId};
use mm_econ::order_net_proceeds;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// An order fulfilled this month, with its realized economics. Consumed by
/// the accounting engine.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FulfilledOrder {
    /// Product that was manufactured.
    pub product_id: ProductId,
    /// Location that owns the product.
    pub coord: LocationCoord,
    /// Month the order was placed.
    pub order_date: u32,
    /// Recorded sale price.
    pub sale_price: Decimal,
    /// Cost of goods from the product catalog.
    pub unit_cost: Decimal,
    /// Sales tax collected on the order.
    pub sales_tax: Decimal,
    /// Net proceeds: sale price minus cost minus sales tax.
    pub net: Decimal,
}

/// Merge `incoming` into the order table, appending rows not already
/// present. Existing row order is preserved; new unique rows are appended
/// in input order. Returns the number of rows appended.
pub fn receive_orders(orders: &mut Vec<OrderRow>, incoming: &[OrderRow]) -> usize {
    let mut seen: HashSet<OrderRow> = orders.iter().cloned().collect();
    let before = orders.len();
    for row in incoming {
        if seen.insert(row.clone()) {
            orders.push(row.clone());
        }
    }
    orders.len() - before
}

/// Verify that every order submitted this month made it into the table,
/// re-inserting any found missing. Returns the number of repairs.
pub fn check_order_parity(orders: &mut Vec<OrderRow>, incoming: &[OrderRow]) -> usize {
    let present: HashSet<&OrderRow> = orders.iter().collect();
    let missing: Vec<OrderRow> = {
        let mut dedup: HashSet<&OrderRow> = HashSet::new();
        incoming
            .iter()
            .filter(|row| !present.contains(row) && dedup.insert(row))
            .cloned()
            .collect()
    };
    let repaired = missing.len();
    if repaired > 0 {
        warn!(repaired, "order parity mismatch, re-inserting dropped rows");
        orders.extend(missing);
    }
    repaired
}

/// Advance production by one month and schedule pending orders.
///
/// Runs in two passes:
/// 1. Every `InProduction(n)` order decrements; `InProduction(1)` becomes
///    `Complete`, realizing `profit = sale_price - unit_cost - sales_tax`
///    and emitting a [`FulfilledOrder`].
/// 2. Pending orders, oldest first, enter production at their product's
///    lead time while the owning location has spare capacity
///    (`staffed_headcount * orders_per_worker` concurrent orders); the
///    rest are rejected. Orders for unknown products are rejected as well.
///
/// Transitions are monotone: completed and rejected orders never change
/// again, and a newly scheduled order spends at least one full month in
/// production before it can complete.
pub fn manufacture(
    month: u32,
    tables: &mut MmTables,
    staffing: &BTreeMap<LocationCoord, u32>,
    orders_per_worker: u32,
) -> Vec<FulfilledOrder> {
    let MmTables {
        ref products,
        ref mut orders,
        ..
    } = *tables;
    let find = |id: ProductId| products.iter().find(|p| p.product_id == id);

    // Pass 1: tick in-production orders.
    let mut fulfilled = Vec::new();
    for order in orders.iter_mut() {
        let OrderStatus::InProduction(n) = order.status else {
            continue;
        };
        if n > 1 {
            order.status = OrderStatus::InProduction(n - 1);
            continue;
        }
        match find(order.product_id) {
            Some(product) => {
                let net = order_net_proceeds(order.sale_price, product.unit_cost, order.sales_tax);
                order.status = OrderStatus::Complete;
                order.profit = Some(net);
                fulfilled.push(FulfilledOrder {
                    product_id: order.product_id,
                    coord: product.coord,
                    order_date: order.order_date,
                    sale_price: order.sale_price,
                    unit_cost: product.unit_cost,
                    sales_tax: order.sales_tax,
                    net,
                });
            }
            None => {
                warn!(month, product_id = ?order.product_id, "in-production order lost its product, rejecting");
                order.status = OrderStatus::Rejected;
            }
        }
    }

    // Pass 2: schedule pending orders under the per-location cap.
    let mut in_prod: BTreeMap<LocationCoord, u32> = BTreeMap::new();
    for order in orders.iter() {
        if order.status.in_production() {
            if let Some(product) = find(order.product_id) {
                *in_prod.entry(product.coord).or_insert(0) += 1;
            }
        }
    }
    let mut pending: Vec<usize> = (0..orders.len())
        .filter(|&i| orders[i].status == OrderStatus::Pending)
        .collect();
    pending.sort_by_key(|&i| orders[i].order_date);
    for i in pending {
        let Some(product) = find(orders[i].product_id) else {
            warn!(month, product_id = ?orders[i].product_id, "order for unknown product, rejecting");
            orders[i].status = OrderStatus::Rejected;
            continue;
        };
        let cap = staffing.get(&product.coord).copied().unwrap_or(0) * orders_per_worker;
        let used = in_prod.entry(product.coord).or_insert(0);
        if *used < cap {
            *used += 1;
            orders[i].status = OrderStatus::InProduction(product.lead_time_months);
        } else {
            debug!(month, coord = ?product.coord, "production capacity exhausted, rejecting order");
            orders[i].status = OrderStatus::Rejected;
        }
    }

    fulfilled
}

#[cfg(test)]
mod tests {
    use super::*;
    use mm_core::{LocationRow, ProductRow};
    use proptest::prelude::*;

    fn coord() -> LocationCoord {
        LocationCoord::new(10, 20)
    }

    fn order(product: u64, date: u32, status: OrderStatus) -> OrderRow {
        OrderRow {
            product_id: ProductId(product),
            order_date: date,
            status,
            sale_price: Decimal::new(1000, 0),
            sales_tax: Decimal::new(60, 0),
            profit: None,
        }
    }

    fn tables(lead: u8, orders: Vec<OrderRow>) -> MmTables {
        MmTables {
            locations: vec![LocationRow {
                coord: coord(),
                balance: Decimal::ZERO,
            }],
            products: vec![ProductRow {
                product_id: ProductId(1),
                coord: coord(),
                unit_cost: Decimal::new(600, 0),
                unit_price: Decimal::new(1000, 0),
                lead_time_months: lead,
            }],
            orders,
            employees: vec![],
            books: vec![],
        }
    }

    fn staffing(workers: u32) -> BTreeMap<LocationCoord, u32> {
        let mut map = BTreeMap::new();
        map.insert(coord(), workers);
        map
    }

    #[test]
    fn intake_appends_in_input_order() {
        let mut orders = vec![order(1, 1001, OrderStatus::Pending)];
        let incoming = [
            order(1, 1002, OrderStatus::Pending),
            order(1, 1003, OrderStatus::Pending),
        ];
        assert_eq!(receive_orders(&mut orders, &incoming), 2);
        let dates: Vec<u32> = orders.iter().map(|o| o.order_date).collect();
        assert_eq!(dates, vec![1001, 1002, 1003]);
    }

    #[test]
    fn intake_drops_exact_duplicates() {
        let mut orders = vec![order(1, 1001, OrderStatus::Pending)];
        let incoming = [
            order(1, 1001, OrderStatus::Pending),
            order(1, 1002, OrderStatus::Pending),
            order(1, 1002, OrderStatus::Pending),
        ];
        assert_eq!(receive_orders(&mut orders, &incoming), 1);
        assert_eq!(orders.len(), 2);
    }

    #[test]
    fn parity_reinserts_dropped_rows() {
        let incoming = [
            order(1, 1001, OrderStatus::Pending),
            order(1, 1002, OrderStatus::Pending),
        ];
        let mut orders = Vec::new();
        receive_orders(&mut orders, &incoming);
        orders.retain(|o| o.order_date != 1002); // simulate a concurrent drop
        assert_eq!(check_order_parity(&mut orders, &incoming), 1);
        assert_eq!(orders.len(), 2);
        assert_eq!(check_order_parity(&mut orders, &incoming), 0);
    }

    #[test]
    fn production_ticks_down_one_month() {
        let mut t = tables(2, vec![order(1, 1001, OrderStatus::InProduction(3))]);
        let fulfilled = manufacture(1002, &mut t, &staffing(1), 4);
        assert!(fulfilled.is_empty());
        assert_eq!(t.orders[0].status, OrderStatus::InProduction(2));
    }

    #[test]
    fn completion_realizes_profit() {
        let mut t = tables(2, vec![order(1, 1001, OrderStatus::InProduction(1))]);
        let fulfilled = manufacture(1002, &mut t, &staffing(1), 4);
        assert_eq!(fulfilled.len(), 1);
        assert_eq!(fulfilled[0].coord, coord());
        assert_eq!(fulfilled[0].net, Decimal::new(340, 0));
        assert_eq!(t.orders[0].status, OrderStatus::Complete);
        assert_eq!(t.orders[0].profit, Some(Decimal::new(340, 0)));
    }

    #[test]
    fn scheduled_orders_wait_a_full_month() {
        // lead time 1: scheduled this call, completes on the next call
        let mut t = tables(1, vec![order(1, 1001, OrderStatus::Pending)]);
        assert!(manufacture(1001, &mut t, &staffing(1), 4).is_empty());
        assert_eq!(t.orders[0].status, OrderStatus::InProduction(1));
        let fulfilled = manufacture(1002, &mut t, &staffing(1), 4);
        assert_eq!(fulfilled.len(), 1);
    }

    #[test]
    fn capacity_rejects_overflow_oldest_first() {
        let mut t = tables(
            2,
            vec![
                order(1, 1005, OrderStatus::Pending),
                order(1, 1003, OrderStatus::Pending),
            ],
        );
        manufacture(1005, &mut t, &staffing(1), 1);
        // the older order won the single production slot
        assert_eq!(t.orders[1].status, OrderStatus::InProduction(2));
        assert_eq!(t.orders[0].status, OrderStatus::Rejected);
    }

    #[test]
    fn unstaffed_location_rejects_everything() {
        let mut t = tables(2, vec![order(1, 1001, OrderStatus::Pending)]);
        manufacture(1001, &mut t, &BTreeMap::new(), 4);
        assert_eq!(t.orders[0].status, OrderStatus::Rejected);
    }

    #[test]
    fn unknown_product_is_rejected() {
        let mut t = tables(2, vec![order(77, 1001, OrderStatus::Pending)]);
        manufacture(1001, &mut t, &staffing(1), 4);
        assert_eq!(t.orders[0].status, OrderStatus::Rejected);
    }

    fn arb_order() -> impl Strategy<Value = OrderRow> {
        (1u64..4, 1000u32..1010).prop_map(|(p, d)| order(p, d, OrderStatus::Pending))
    }

    proptest! {
        #[test]
        fn intake_is_idempotent(incoming in prop::collection::vec(arb_order(), 0..20)) {
            let mut once = Vec::new();
            receive_orders(&mut once, &incoming);
            let mut twice = Vec::new();
            receive_orders(&mut twice, &incoming);
            receive_orders(&mut twice, &incoming);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn terminal_states_are_final(months in 1u32..8) {
            let mut t = tables(2, vec![
                order(1, 1000, OrderStatus::Complete),
                order(1, 1000, OrderStatus::Rejected),
                order(1, 1000, OrderStatus::InProduction(4)),
            ]);
            for m in 0..months {
                manufacture(1001 + m, &mut t, &staffing(1), 4);
            }
            prop_assert_eq!(t.orders[0].status, OrderStatus::Complete);
            prop_assert_eq!(t.orders[1].status, OrderStatus::Rejected);
            prop_assert!(t.orders[2].status.is_terminal() || t.orders[2].status.in_production());
        }
    }
}
