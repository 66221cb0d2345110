#![deny(warnings)]

//! MM pipeline orchestrator: sequences solvency gates, order intake,
//! manufacturing, bookkeeping, payroll, and tax settlement around the
//! externally owned population-advance step, one simulated month at a
//! time.
//!
//! The orchestrator is the sole caller of every table mutator; components
//! never invoke each other. Insolvency never halts the run: it skips the
//! gated steps for the current month and the pipeline moves on. Partial
//! mutations applied before a gate trips are not rolled back.

use mm_books::{open_books, settle_taxes, update_books};
use mm_core::{
    validate_tables, ConfigError, MmConfig, MmTables, OrderRow, PersonRow, ValidationError,
};
use mm_econ::{insolvent_coords, is_solvent, EconError};
use mm_factory::{check_order_parity, manufacture, receive_orders};
use mm_workforce::{run_hr, staffed_headcount};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors surfaced by the orchestrator. Insolvency is not among them: it
/// is a gate, not a failure.
#[derive(Debug, Error, PartialEq)]
pub enum RuntimeError {
    /// Rejected configuration at initialization.
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    /// Rejected table set at initialization.
    #[error("tables: {0}")]
    Tables(#[from] ValidationError),
    /// Invalid economic parameter reached a computation.
    #[error("economics: {0}")]
    Econ(#[from] EconError),
}

/// Everything one simulated month operates on: the MM tables, the view of
/// the Realm's person table, the month clock, and the configuration.
#[derive(Clone, Debug)]
pub struct MmState {
    /// The five MM tables.
    pub tables: MmTables,
    /// Externally owned population rows.
    pub persons: Vec<PersonRow>,
    /// Current simulated month; incremented by [`run_months`].
    pub month: u32,
    /// Pipeline parameters.
    pub config: MmConfig,
}

impl MmState {
    /// Build a state, failing fast on bad configuration or an
    /// inconsistent table set.
    pub fn new(
        tables: MmTables,
        persons: Vec<PersonRow>,
        month: u32,
        config: MmConfig,
    ) -> Result<Self, RuntimeError> {
        config.validate()?;
        validate_tables(&tables)?;
        Ok(Self {
            tables,
            persons,
            month,
            config,
        })
    }
}

/// Pre-advance operations: route this month's incoming orders into the
/// order book, skipping orders owned by insolvent locations, then repair
/// any parity mismatch. Returns the number of rows added to the book.
pub fn pre_evolve(state: &mut MmState, incoming: &[OrderRow]) -> usize {
    let insolvent: BTreeSet<_> =
        insolvent_coords(&state.tables.locations, state.config.debt_threshold)
            .into_iter()
            .collect();
    let accepted: Vec<OrderRow> = if insolvent.is_empty() {
        incoming.to_vec()
    } else {
        warn!(
            month = state.month,
            locations = ?insolvent,
            "insolvent locations, skipping their order intake"
        );
        incoming
            .iter()
            .filter(|o| match state.tables.location_of_product(o.product_id) {
                Some(coord) => !insolvent.contains(&coord),
                None => true, // unattributable; manufacturing will reject it
            })
            .cloned()
            .collect()
    };
    let received = receive_orders(&mut state.tables.orders, &accepted);
    let repaired = check_order_parity(&mut state.tables.orders, &accepted);
    received + repaired
}

/// Post-advance operations: manufacturing and bookkeeping always run;
/// payroll runs only while solvent; tax settlement only while still
/// solvent after payroll. A tripped gate skips the rest of the month.
pub fn post_evolve(state: &mut MmState) -> Result<(), RuntimeError> {
    let month = state.month;
    let cfg = state.config.clone();

    open_books(month, &mut state.tables, cfg.accounting_period);
    let staffing = staffed_headcount(&state.tables.employees, &state.persons);
    let fulfilled = manufacture(month, &mut state.tables, &staffing, cfg.orders_per_worker);
    update_books(&mut state.tables, &fulfilled);
    debug!(month, fulfilled = fulfilled.len(), "operations complete");

    if !is_solvent(&state.tables.locations, cfg.debt_threshold) {
        warn!(
            month,
            locations = ?insolvent_coords(&state.tables.locations, cfg.debt_threshold),
            "insolvent after operations, skipping payroll and tax"
        );
        return Ok(());
    }
    run_hr(month, &mut state.tables, &mut state.persons, &cfg)?;

    if !is_solvent(&state.tables.locations, cfg.debt_threshold) {
        warn!(
            month,
            locations = ?insolvent_coords(&state.tables.locations, cfg.debt_threshold),
            "insolvent after payroll, skipping tax settlement"
        );
        return Ok(());
    }
    settle_taxes(month, &mut state.tables, cfg.cit_rate, cfg.accounting_period)?;
    Ok(())
}

/// Drive `months` simulated months. Per month: fetch the month's incoming
/// orders, run [`pre_evolve`], advance the clock, hand the population to
/// the external advance step, then run [`post_evolve`].
///
/// Intake runs at the pre-advance month, so `next_orders` is called with
/// `state.month` as it stands and the rows it returns should be dated no
/// earlier than `state.month + 1`. Rows dated at the pre-advance month
/// itself fall outside every future settlement window and their sales tax
/// is never charged.
pub fn run_months<A, O>(
    state: &mut MmState,
    months: u32,
    mut advance: A,
    mut next_orders: O,
) -> Result<(), RuntimeError>
where
    A: FnMut(&mut Vec<PersonRow>, u32),
    O: FnMut(u32) -> Vec<OrderRow>,
{
    for _ in 0..months {
        let incoming = next_orders(state.month);
        pre_evolve(state, &incoming);
        state.month += 1;
        advance(&mut state.persons, state.month);
        post_evolve(state)?;
    }
    Ok(())
}
