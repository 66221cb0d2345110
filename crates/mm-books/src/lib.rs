#![deny(warnings)]

//! Accounting engine: per-period books, order postings, payroll debits,
//! and period-end tax settlement.
//!
//! A books entry opens for every location at the first month of each
//! accounting period and accrues that period's income. Settlement runs at
//! the last month of the period, charging sales tax collected over the
//! closed window plus corporate income tax on positive period income.

use mm_core::{BooksRow, LocationCoord, MmTables};
use mm_econ::{corporate_income_tax, EconError};
use mm_factory::FulfilledOrder;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Whether `month` is the first month of an accounting period. Month 0
/// predates the first period and never opens one.
pub fn is_period_open_month(month: u32, accounting_period: u32) -> bool {
    match month.checked_sub(1) {
        Some(m) => m % accounting_period == 0,
        None => false,
    }
}

/// Whether `month` is the last month of an accounting period.
pub fn is_settlement_month(month: u32, accounting_period: u32) -> bool {
    month % accounting_period == 0
}

/// Taxes charged to one location at settlement.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TaxBill {
    /// Location charged.
    pub coord: LocationCoord,
    /// Sales tax collected over the closed window.
    pub sales_tax: Decimal,
    /// Corporate income tax on the closed period's income.
    pub cit: Decimal,
}

impl TaxBill {
    /// Total debit against the location balance.
    pub fn total(&self) -> Decimal {
        self.sales_tax + self.cit
    }
}

/// Open a zero-income books entry for every location when `month` starts a
/// new accounting period. Idempotent within a month: locations that
/// already have an entry with `period_s == month` are left alone, so each
/// location keeps exactly one open (maximum `period_s`) entry. Returns the
/// number of entries opened.
pub fn open_books(month: u32, tables: &mut MmTables, accounting_period: u32) -> usize {
    if !is_period_open_month(month, accounting_period) {
        return 0;
    }
    let coords: Vec<LocationCoord> = tables.locations.iter().map(|l| l.coord).collect();
    let mut opened = 0;
    for coord in coords {
        let exists = tables
            .books
            .iter()
            .any(|b| b.coord == coord && b.period_s == month);
        if !exists {
            tables.books.push(BooksRow {
                period_s: month,
                coord,
                period_income: Decimal::ZERO,
            });
            opened += 1;
        }
    }
    if opened > 0 {
        info!(month, opened, "opened accounting period");
    }
    opened
}

/// Post fulfilled orders: each order's net proceeds are credited to the
/// owning location's balance and to its open books entry.
pub fn update_books(tables: &mut MmTables, fulfilled: &[FulfilledOrder]) {
    for f in fulfilled {
        match tables.balance_mut(f.coord) {
            Some(balance) => *balance += f.net,
            None => {
                warn!(coord = ?f.coord, "fulfilled order for unknown location, dropping posting");
                continue;
            }
        }
        match tables.open_books_mut(f.coord) {
            Some(entry) => entry.period_income += f.net,
            None => warn!(coord = ?f.coord, "no open books entry for posting"),
        }
    }
}

/// Debit one month of payroll per location from the balance and the open
/// books entry. Locations absent from `payroll` are debited zero rather
/// than skipped.
pub fn debit_payroll(tables: &mut MmTables, payroll: &BTreeMap<LocationCoord, Decimal>) {
    let coords: Vec<LocationCoord> = tables.locations.iter().map(|l| l.coord).collect();
    for coord in coords {
        let amount = payroll.get(&coord).copied().unwrap_or(Decimal::ZERO);
        if let Some(balance) = tables.balance_mut(coord) {
            *balance -= amount;
        }
        if let Some(entry) = tables.open_books_mut(coord) {
            entry.period_income -= amount;
        }
    }
}

/// Settle the accounting period ending at `month`.
///
/// No-op outside settlement months. Otherwise, for every location: sum the
/// sales tax over orders dated in the closed window
/// `[month - accounting_period + 1, month]` (joined to locations through
/// the product catalog), compute CIT on the open books entry's income, and
/// debit both from the balance. Returns one [`TaxBill`] per location.
pub fn settle_taxes(
    month: u32,
    tables: &mut MmTables,
    cit_rate: Decimal,
    accounting_period: u32,
) -> Result<Vec<TaxBill>, EconError> {
    if !is_settlement_month(month, accounting_period) {
        debug!(month, "not a settlement month");
        return Ok(Vec::new());
    }
    let begin = (month + 1).saturating_sub(accounting_period);

    let mut sales_tax: BTreeMap<LocationCoord, Decimal> = BTreeMap::new();
    for order in &tables.orders {
        if order.order_date < begin || order.order_date > month {
            continue;
        }
        match tables.location_of_product(order.product_id) {
            Some(coord) => *sales_tax.entry(coord).or_insert(Decimal::ZERO) += order.sales_tax,
            None => warn!(product_id = ?order.product_id, "order without product at settlement"),
        }
    }

    let coords: Vec<LocationCoord> = tables.locations.iter().map(|l| l.coord).collect();
    let mut bills = Vec::with_capacity(coords.len());
    for coord in coords {
        let income = tables
            .open_books(coord)
            .map(|b| b.period_income)
            .unwrap_or(Decimal::ZERO);
        let cit = corporate_income_tax(income, cit_rate)?;
        let stax = sales_tax.get(&coord).copied().unwrap_or(Decimal::ZERO);
        let bill = TaxBill {
            coord,
            sales_tax: stax,
            cit,
        };
        if let Some(balance) = tables.balance_mut(coord) {
            *balance -= bill.total();
        }
        bills.push(bill);
    }
    info!(month, begin, bills = bills.len(), "settled accounting period");
    Ok(bills)
}
