#![deny(warnings)]

//! Workforce manager: keeps every MM employment slot staffed by a living,
//! nearby person, and runs monthly payroll.
//!
//! The monthly sequence is check -> hire (when anything was flagged) ->
//! pay. Hiring matches candidates geographically: the nearest eligible
//! person within the employment radius wins a slot, with stable
//! first-found tie-breaking.

use mm_books::debit_payroll;
use mm_core::{EmployeeRow, JobCode, LocationCoord, MmConfig, MmTables, PersonRow, Pid};
use mm_econ::{employment_radius, grid_distance, monthly_wage_draws, EconError};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Fraction of the monthly wage drawn as uniform noise, `U ~ [0, 0.1)`.
const WAGE_NOISE: f32 = 0.1;

/// Mix the configured seed with the month so each month's payroll draw is
/// independent but reproducible.
fn payroll_seed(rng_seed: u64, month: u32) -> u64 {
    rng_seed ^ u64::from(month).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Living slot-holders per location; feeds the manufacturing capacity cap.
pub fn staffed_headcount(
    employees: &[EmployeeRow],
    persons: &[PersonRow],
) -> BTreeMap<LocationCoord, u32> {
    let mut counts = BTreeMap::new();
    for e in employees {
        let alive = persons
            .iter()
            .any(|p| p.pid == e.pid && p.is_alive());
        if alive {
            *counts.entry(e.coord).or_insert(0) += 1;
        }
    }
    counts
}

/// Flag slots whose holder must be replaced: the person is gone from the
/// population, recorded dead, or now lives at or beyond the employment
/// radius from the slot. Returns slot indices into `employees`.
pub fn check_employees(
    employees: &[EmployeeRow],
    persons: &[PersonRow],
    radius: f64,
) -> Vec<usize> {
    employees
        .iter()
        .enumerate()
        .filter(|(_, e)| match persons.iter().find(|p| p.pid == e.pid) {
            Some(p) => !p.is_alive() || grid_distance(p.home(), e.coord) >= radius,
            None => true,
        })
        .map(|(i, _)| i)
        .collect()
}

/// Fill flagged slots from the population.
///
/// A candidate is eligible when alive, at least 216 months old, not in an
/// excluded job category, not already holding an MM slot, and living
/// strictly within `radius` of the slot. The nearest candidate wins; ties
/// keep the first in population order. At most one hire per slot, and no
/// person fills two slots in one call. On a hire the newcomer's job
/// becomes [`JobCode::MM`], the displaced holder's becomes
/// [`JobCode::UNEMPLOYED`] if they still exist, and the slot maps to the
/// new pid. Slots with no candidate stay with their flagged holder until a
/// later month finds one. Returns the number of hires.
pub fn hire_employees(
    month: u32,
    employees: &mut [EmployeeRow],
    persons: &mut [PersonRow],
    flagged: &[usize],
    radius: f64,
    excluded: &[JobCode],
) -> usize {
    let current: BTreeSet<Pid> = employees.iter().map(|e| e.pid).collect();
    let mut hired: BTreeSet<Pid> = BTreeSet::new();
    let mut hires = 0;
    for &slot in flagged {
        let slot_coord = employees[slot].coord;
        let mut best: Option<(f64, usize)> = None;
        for (i, p) in persons.iter().enumerate() {
            if !p.is_alive() || !p.is_adult(month) {
                continue;
            }
            if excluded.contains(&p.job) || p.job == JobCode::MM {
                continue;
            }
            if current.contains(&p.pid) || hired.contains(&p.pid) {
                continue;
            }
            let d = grid_distance(p.home(), slot_coord);
            if d >= radius {
                continue;
            }
            // strict less keeps the first candidate on equal distance
            if best.map_or(true, |(bd, _)| d < bd) {
                best = Some((d, i));
            }
        }
        let Some((_, idx)) = best else {
            continue;
        };
        let new_pid = persons[idx].pid;
        let old_pid = employees[slot].pid;
        persons[idx].job = JobCode::MM;
        if let Some(old) = persons.iter_mut().find(|p| p.pid == old_pid) {
            old.job = JobCode::UNEMPLOYED;
        }
        employees[slot].pid = new_pid;
        hired.insert(new_pid);
        hires += 1;
        debug!(month, slot, ?new_pid, ?old_pid, "replaced employee");
    }
    hires
}

/// Run monthly payroll: draw each employee's wage
/// (`base_wage/12 * (1 + U)`, seeded), credit it to the holder's savings,
/// and debit the per-location totals from balances and open books entries.
/// Returns the per-location payroll that was debited.
pub fn pay_employees(
    month: u32,
    tables: &mut MmTables,
    persons: &mut [PersonRow],
    base_wage: Decimal,
    rng_seed: u64,
) -> Result<BTreeMap<LocationCoord, Decimal>, EconError> {
    let draws = monthly_wage_draws(
        base_wage,
        tables.employees.len(),
        WAGE_NOISE,
        payroll_seed(rng_seed, month),
    )?;
    let mut per_location: BTreeMap<LocationCoord, Decimal> = BTreeMap::new();
    for (e, pay) in tables.employees.iter().zip(&draws) {
        if let Some(p) = persons.iter_mut().find(|p| p.pid == e.pid) {
            p.savings += *pay;
        }
        *per_location.entry(e.coord).or_insert(Decimal::ZERO) += *pay;
    }
    debit_payroll(tables, &per_location);
    Ok(per_location)
}

/// One month of HR: check -> hire (only when anything was flagged) -> pay.
pub fn run_hr(
    month: u32,
    tables: &mut MmTables,
    persons: &mut [PersonRow],
    cfg: &MmConfig,
) -> Result<(), EconError> {
    let radius = employment_radius(cfg.chunk_size);
    let flagged = check_employees(&tables.employees, persons, radius);
    if !flagged.is_empty() {
        hire_employees(
            month,
            &mut tables.employees,
            persons,
            &flagged,
            radius,
            &cfg.excluded_jobs,
        );
    }
    pay_employees(month, tables, persons, cfg.base_wage, cfg.rng_seed)?;
    Ok(())
}
