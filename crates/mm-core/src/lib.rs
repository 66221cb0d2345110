#![deny(warnings)]

//! Core domain models and invariants for the Realm MM subsystem.
//!
//! This crate defines the serializable row types that make up the MM table
//! set (locations, products, orders, employees, books), the view of the
//! externally owned person table, and the configuration structure shared by
//! every pipeline component, with validation helpers to guarantee basic
//! invariants.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Unique identifier of a simulated person. Owned by the Realm population
/// tables; MM only references it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pid(pub i64);

/// Unique identifier of a manufactured product.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProductId(pub u64);

/// Grid coordinate of a location on the island, `(v, h)` in chunk units.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LocationCoord {
    /// Vertical grid component.
    pub v: i32,
    /// Horizontal grid component.
    pub h: i32,
}

impl LocationCoord {
    /// Convenience constructor.
    pub fn new(v: i32, h: i32) -> Self {
        Self { v, h }
    }
}

/// Job classification code carried on person rows. The population model
/// owns the full code space; MM only distinguishes the codes below.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobCode(pub u8);

impl JobCode {
    /// No current employment.
    pub const UNEMPLOYED: JobCode = JobCode(0);
    /// Subsistence farm work, not poachable by MM.
    pub const FARMHAND: JobCode = JobCode(1);
    /// Employed by an MM location.
    pub const MM: JobCode = JobCode(3);
}

/// Lifecycle state of an order.
///
/// In-production orders carry the number of months remaining; they tick
/// down one per simulated month until completion. `Complete` and
/// `Rejected` are terminal: no order transitions out of them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Received but not yet scheduled into production.
    Pending,
    /// In production with `n` months remaining, `n` in 1..=4.
    InProduction(u8),
    /// Manufactured and fulfilled; costs and profit recognized.
    Complete,
    /// Refused for lack of capacity; never revisited.
    Rejected,
}

impl OrderStatus {
    /// Flat storage code: pending 9, in production 1..=4, complete 0,
    /// rejected -1.
    pub fn code(self) -> i8 {
        match self {
            OrderStatus::Pending => 9,
            OrderStatus::InProduction(n) => n as i8,
            OrderStatus::Complete => 0,
            OrderStatus::Rejected => -1,
        }
    }

    /// Inverse of [`OrderStatus::code`].
    pub fn from_code(code: i8) -> Result<Self, ValidationError> {
        match code {
            9 => Ok(OrderStatus::Pending),
            0 => Ok(OrderStatus::Complete),
            -1 => Ok(OrderStatus::Rejected),
            n @ 1..=4 => Ok(OrderStatus::InProduction(n as u8)),
            other => Err(ValidationError::BadStatusCode(other)),
        }
    }

    /// Whether the order can still change state.
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Complete | OrderStatus::Rejected)
    }

    /// Whether the order currently occupies production capacity.
    pub fn in_production(self) -> bool {
        matches!(self, OrderStatus::InProduction(_))
    }
}

/// Per-location financial state. The balance is mutated only by the
/// accounting engine and workforce payroll; it may go negative.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationRow {
    /// Grid key of the location.
    pub coord: LocationCoord,
    /// All-time net of revenue, costs, payroll, and taxes.
    #[serde(with = "rust_decimal::serde::str")]
    pub balance: Decimal,
}

/// Immutable product reference data for one MM location.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductRow {
    /// Product key.
    pub product_id: ProductId,
    /// Owning location.
    pub coord: LocationCoord,
    /// Cost of goods per order.
    #[serde(with = "rust_decimal::serde::str")]
    pub unit_cost: Decimal,
    /// List price per order.
    #[serde(with = "rust_decimal::serde::str")]
    pub unit_price: Decimal,
    /// Months an order spends in production, 1..=4.
    pub lead_time_months: u8,
}

/// One customer order. Rows are deduplicated on full-row equality at
/// intake, so there is no synthetic order id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderRow {
    /// Ordered product.
    pub product_id: ProductId,
    /// Month the order was placed.
    pub order_date: u32,
    /// Lifecycle state.
    pub status: OrderStatus,
    /// Price recorded at sale time.
    #[serde(with = "rust_decimal::serde::str")]
    pub sale_price: Decimal,
    /// Sales tax collected on the order.
    #[serde(with = "rust_decimal::serde::str")]
    pub sales_tax: Decimal,
    /// Realized profit, set when the order completes.
    #[serde(with = "rust_decimal::serde::str_option")]
    pub profit: Option<Decimal>,
}

/// One employment slot at an MM location and its current holder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmployeeRow {
    /// Location the slot belongs to.
    pub coord: LocationCoord,
    /// Person currently holding the slot.
    pub pid: Pid,
    /// Annual base wage for the slot.
    #[serde(with = "rust_decimal::serde::str")]
    pub wage: Decimal,
}

/// Income accrual record for one location and one accounting period.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BooksRow {
    /// First month of the period.
    pub period_s: u32,
    /// Location the entry belongs to.
    pub coord: LocationCoord,
    /// Running net income for the open period.
    #[serde(with = "rust_decimal::serde::str")]
    pub period_income: Decimal,
}

/// Read/write view of one row of the externally owned person table. MM
/// reads birth, death, and home coordinates and writes only `job` and
/// `savings`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersonRow {
    /// Person key.
    pub pid: Pid,
    /// Birth month.
    pub birth: u32,
    /// Death month, `None` while alive (flat form -1).
    pub death: Option<u32>,
    /// Current job classification.
    pub job: JobCode,
    /// Accumulated savings; payroll credits land here.
    pub savings: Decimal,
    /// Vertical home coordinate.
    pub locv: i32,
    /// Horizontal home coordinate.
    pub loch: i32,
}

impl PersonRow {
    /// Whether the person is recorded alive.
    pub fn is_alive(&self) -> bool {
        self.death.is_none()
    }

    /// Home coordinate in the location grid.
    pub fn home(&self) -> LocationCoord {
        LocationCoord::new(self.locv, self.loch)
    }

    /// Whether the person is at least 18 years (216 months) old.
    pub fn is_adult(&self, month: u32) -> bool {
        month.saturating_sub(self.birth) >= 216
    }
}

/// Per-table row counts, for driver-side quick looks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct MmSummary {
    pub locations: usize,
    pub products: usize,
    pub orders: usize,
    pub employees: usize,
    pub books: usize,
}

/// The in-memory MM table set shared by every pipeline component. The
/// person table stays outside: it is owned by the Realm.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MmTables {
    /// `mm_location_master`.
    pub locations: Vec<LocationRow>,
    /// `mm_product_master`.
    pub products: Vec<ProductRow>,
    /// `mm_order_master`.
    pub orders: Vec<OrderRow>,
    /// `mm_employee_master`.
    pub employees: Vec<EmployeeRow>,
    /// `mm_books`.
    pub books: Vec<BooksRow>,
}

impl MmTables {
    /// Look up a product by id.
    pub fn product(&self, id: ProductId) -> Option<&ProductRow> {
        self.products.iter().find(|p| p.product_id == id)
    }

    /// Location owning a product, if the product is known.
    pub fn location_of_product(&self, id: ProductId) -> Option<LocationCoord> {
        self.product(id).map(|p| p.coord)
    }

    /// The open (maximum `period_s`) books entry for a location.
    pub fn open_books(&self, coord: LocationCoord) -> Option<&BooksRow> {
        self.books
            .iter()
            .filter(|b| b.coord == coord)
            .max_by_key(|b| b.period_s)
    }

    /// Mutable variant of [`MmTables::open_books`].
    pub fn open_books_mut(&mut self, coord: LocationCoord) -> Option<&mut BooksRow> {
        self.books
            .iter_mut()
            .filter(|b| b.coord == coord)
            .max_by_key(|b| b.period_s)
    }

    /// Mutable balance of one location.
    pub fn balance_mut(&mut self, coord: LocationCoord) -> Option<&mut Decimal> {
        self.locations
            .iter_mut()
            .find(|l| l.coord == coord)
            .map(|l| &mut l.balance)
    }

    /// Row counts per table.
    pub fn summary(&self) -> MmSummary {
        MmSummary {
            locations: self.locations.len(),
            products: self.products.len(),
            orders: self.orders.len(),
            employees: self.employees.len(),
            books: self.books.len(),
        }
    }
}

/// Validation errors for domain invariants.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Status code outside {-1, 0, 1..=4, 9}.
    #[error("unknown order status code {0}")]
    BadStatusCode(i8),
    /// Production lead time outside 1..=4 months.
    #[error("lead time {0} is out of range 1..=4")]
    LeadTimeOutOfRange(u8),
    /// Price or cost must be non-negative.
    #[error("negative monetary value on product {0:?}")]
    NegativeMoney(ProductId),
    /// Two location rows share a coordinate.
    #[error("duplicate location at {0:?}")]
    DuplicateLocation(LocationCoord),
    /// Two product rows share an id.
    #[error("duplicate product id {0:?}")]
    DuplicateProduct(ProductId),
    /// A row references a location with no master row.
    #[error("unknown location {0:?}")]
    UnknownLocation(LocationCoord),
    /// An order references a product with no master row.
    #[error("unknown product {0:?}")]
    UnknownProduct(ProductId),
}

/// Validate a product row.
pub fn validate_product(p: &ProductRow) -> Result<(), ValidationError> {
    if !(1..=4).contains(&p.lead_time_months) {
        return Err(ValidationError::LeadTimeOutOfRange(p.lead_time_months));
    }
    if p.unit_cost < Decimal::ZERO || p.unit_price < Decimal::ZERO {
        return Err(ValidationError::NegativeMoney(p.product_id));
    }
    Ok(())
}

/// Validate an order row's status representation.
pub fn validate_order(o: &OrderRow) -> Result<(), ValidationError> {
    if let OrderStatus::InProduction(n) = o.status {
        if !(1..=4).contains(&n) {
            return Err(ValidationError::LeadTimeOutOfRange(n));
        }
    }
    Ok(())
}

/// Validate the whole table set, including cross-table references.
pub fn validate_tables(t: &MmTables) -> Result<(), ValidationError> {
    let mut coords: BTreeSet<LocationCoord> = BTreeSet::new();
    for l in &t.locations {
        if !coords.insert(l.coord) {
            return Err(ValidationError::DuplicateLocation(l.coord));
        }
    }
    let mut ids: BTreeSet<ProductId> = BTreeSet::new();
    for p in &t.products {
        validate_product(p)?;
        if !ids.insert(p.product_id) {
            return Err(ValidationError::DuplicateProduct(p.product_id));
        }
        if !coords.contains(&p.coord) {
            return Err(ValidationError::UnknownLocation(p.coord));
        }
    }
    for o in &t.orders {
        validate_order(o)?;
        if !ids.contains(&o.product_id) {
            return Err(ValidationError::UnknownProduct(o.product_id));
        }
    }
    for e in &t.employees {
        if !coords.contains(&e.coord) {
            return Err(ValidationError::UnknownLocation(e.coord));
        }
    }
    for b in &t.books {
        if !coords.contains(&b.coord) {
            return Err(ValidationError::UnknownLocation(b.coord));
        }
    }
    Ok(())
}

/// Configuration errors detected at initialization.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// Could not parse the supplied YAML.
    #[error("malformed configuration: {0}")]
    Parse(String),
    /// Accounting period must be at least one month.
    #[error("accounting period must be >= 1 month")]
    ZeroAccountingPeriod,
    /// Tax rate outside [0, 1].
    #[error("corporate income tax rate {0} is outside [0, 1]")]
    RateOutOfRange(Decimal),
    /// Employment radius would collapse to zero.
    #[error("chunk size must be >= 1")]
    ZeroChunkSize,
    /// Capacity rule would reject every order.
    #[error("orders per worker must be >= 1")]
    ZeroOrdersPerWorker,
    /// Payroll base must be positive.
    #[error("base wage must be > 0")]
    NonPositiveBaseWage,
}

/// MM simulation parameters, passed explicitly into every component call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MmConfig {
    /// Solvency floor. A location is insolvent at or below this balance.
    pub debt_threshold: Decimal,
    /// Months per accounting period.
    pub accounting_period: u32,
    /// Corporate income tax rate on positive period income.
    pub cit_rate: Decimal,
    /// Annual base wage for MM employment slots.
    pub base_wage: Decimal,
    /// Island chunk size; fixes the employment radius.
    pub chunk_size: u32,
    /// Concurrent in-production orders a single worker supports.
    pub orders_per_worker: u32,
    /// Job codes MM never hires away from.
    pub excluded_jobs: Vec<JobCode>,
    /// Seed for reproducible payroll noise.
    pub rng_seed: u64,
}

impl Default for MmConfig {
    fn default() -> Self {
        Self {
            debt_threshold: Decimal::new(-10_000, 0),
            accounting_period: 3,
            cit_rate: Decimal::new(21, 2),
            base_wage: Decimal::new(40_000, 0),
            chunk_size: 64,
            orders_per_worker: 4,
            excluded_jobs: vec![JobCode::UNEMPLOYED, JobCode::FARMHAND],
            rng_seed: 42,
        }
    }
}

impl MmConfig {
    /// Fail fast on parameter combinations that would produce silently
    /// wrong accounting or hiring behavior.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.accounting_period == 0 {
            return Err(ConfigError::ZeroAccountingPeriod);
        }
        if self.cit_rate < Decimal::ZERO || self.cit_rate > Decimal::ONE {
            return Err(ConfigError::RateOutOfRange(self.cit_rate));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.orders_per_worker == 0 {
            return Err(ConfigError::ZeroOrdersPerWorker);
        }
        if self.base_wage <= Decimal::ZERO {
            return Err(ConfigError::NonPositiveBaseWage);
        }
        Ok(())
    }

    /// Parse driver-supplied YAML, falling back to defaults for absent
    /// keys, and validate the result.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: MmConfig =
            serde_yaml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn product(id: u64, coord: LocationCoord) -> ProductRow {
        ProductRow {
            product_id: ProductId(id),
            coord,
            unit_cost: Decimal::new(600, 0),
            unit_price: Decimal::new(1000, 0),
            lead_time_months: 2,
        }
    }

    fn small_tables() -> MmTables {
        let coord = LocationCoord::new(10, 20);
        MmTables {
            locations: vec![LocationRow {
                coord,
                balance: Decimal::new(5000, 0),
            }],
            products: vec![product(1, coord)],
            orders: vec![OrderRow {
                product_id: ProductId(1),
                order_date: 1001,
                status: OrderStatus::Pending,
                sale_price: Decimal::new(1000, 0),
                sales_tax: Decimal::new(60, 0),
                profit: None,
            }],
            employees: vec![EmployeeRow {
                coord,
                pid: Pid(7),
                wage: Decimal::new(40_000, 0),
            }],
            books: vec![BooksRow {
                period_s: 1000,
                coord,
                period_income: Decimal::ZERO,
            }],
        }
    }

    #[test]
    fn serde_roundtrip_tables() {
        let t = small_tables();
        let s = serde_json::to_string(&t).unwrap();
        let back: MmTables = serde_json::from_str(&s).unwrap();
        assert_eq!(back, t);
        assert_eq!(back.summary().orders, 1);
    }

    #[test]
    fn status_codes_match_legend() {
        assert_eq!(OrderStatus::Rejected.code(), -1);
        assert_eq!(OrderStatus::Complete.code(), 0);
        assert_eq!(OrderStatus::InProduction(4).code(), 4);
        assert_eq!(OrderStatus::Pending.code(), 9);
        assert_eq!(OrderStatus::from_code(5), Err(ValidationError::BadStatusCode(5)));
    }

    #[test]
    fn open_books_is_latest_period() {
        let mut t = small_tables();
        let coord = t.locations[0].coord;
        t.books.push(BooksRow {
            period_s: 1003,
            coord,
            period_income: Decimal::new(70, 0),
        });
        assert_eq!(t.open_books(coord).unwrap().period_s, 1003);
        t.open_books_mut(coord).unwrap().period_income += Decimal::ONE;
        assert_eq!(
            t.open_books(coord).unwrap().period_income,
            Decimal::new(71, 0)
        );
    }

    #[test]
    fn validate_tables_cross_references() {
        let mut t = small_tables();
        assert!(validate_tables(&t).is_ok());
        t.orders[0].product_id = ProductId(99);
        assert_eq!(
            validate_tables(&t),
            Err(ValidationError::UnknownProduct(ProductId(99)))
        );
    }

    #[test]
    fn validate_tables_duplicate_product() {
        let mut t = small_tables();
        t.products.push(product(1, t.locations[0].coord));
        assert_eq!(
            validate_tables(&t),
            Err(ValidationError::DuplicateProduct(ProductId(1)))
        );
    }

    #[test]
    fn config_defaults_validate() {
        let cfg = MmConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.debt_threshold, Decimal::new(-10_000, 0));
        assert_eq!(cfg.accounting_period, 3);
    }

    #[test]
    fn config_from_partial_yaml() {
        let cfg = MmConfig::from_yaml_str("accounting_period: 6\nrng_seed: 7\n").unwrap();
        assert_eq!(cfg.accounting_period, 6);
        assert_eq!(cfg.rng_seed, 7);
        assert_eq!(cfg.chunk_size, 64);
    }

    #[test]
    fn config_rejects_bad_values() {
        assert_eq!(
            MmConfig::from_yaml_str("accounting_period: 0\n"),
            Err(ConfigError::ZeroAccountingPeriod)
        );
        assert!(matches!(
            MmConfig::from_yaml_str("cit_rate: 1.5\n"),
            Err(ConfigError::RateOutOfRange(_))
        ));
        assert!(matches!(
            MmConfig::from_yaml_str("accounting_period: [3]\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn person_helpers() {
        let p = PersonRow {
            pid: Pid(1),
            birth: 800,
            death: None,
            job: JobCode::UNEMPLOYED,
            savings: Decimal::ZERO,
            locv: 3,
            loch: 4,
        };
        assert!(p.is_alive());
        assert!(p.is_adult(1016));
        assert!(!p.is_adult(1015));
        assert_eq!(p.home(), LocationCoord::new(3, 4));
    }

    proptest! {
        #[test]
        fn status_code_roundtrip(code in prop_oneof![
            Just(-1i8), Just(0i8), Just(9i8), (1i8..=4)
        ]) {
            let status = OrderStatus::from_code(code).unwrap();
            prop_assert_eq!(status.code(), code);
        }

        #[test]
        fn lead_time_validation(lead in 0u8..10) {
            let p = ProductRow {
                product_id: ProductId(1),
                coord: LocationCoord::new(0, 0),
                unit_cost: Decimal::ONE,
                unit_price: Decimal::ONE,
                lead_time_months: lead,
            };
            prop_assert_eq!(validate_product(&p).is_ok(), (1..=4).contains(&lead));
        }
    }
}
