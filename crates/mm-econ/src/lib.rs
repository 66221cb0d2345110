#![deny(warnings)]

//! Economic helpers for the MM pipeline: solvency, order proceeds,
//! corporate income tax, employment geometry, and seeded wage draws.
//!
//! Everything here is a pure function over explicit arguments; the table
//! mutations live in the component crates.

use mm_core::{LocationCoord, LocationRow};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors produced by economic helpers.
#[derive(Debug, Error, PartialEq)]
pub enum EconError {
    /// Tax rate outside [0, 1].
    #[error("invalid tax rate: {0}")]
    InvalidRate(Decimal),
    /// Wage noise fraction outside [0, 1).
    #[error("invalid wage noise fraction: {0}")]
    InvalidNoise(f32),
    /// Wage base must be strictly positive.
    #[error("non-positive wage base")]
    NonPositiveWage,
    /// Numeric conversion to or from floating point failed.
    #[error("non-finite numeric conversion")]
    NonFinite,
}

/// Whether every location's balance strictly exceeds the debt threshold.
///
/// Evaluates the full location set; the accumulator form keeps one
/// insolvent location from being masked among solvent ones.
pub fn is_solvent(locations: &[LocationRow], threshold: Decimal) -> bool {
    locations
        .iter()
        .fold(true, |ok, l| ok & (l.balance > threshold))
}

/// Coordinates of every location at or below the debt threshold, in table
/// order. Feeds the insolvency diagnostics.
pub fn insolvent_coords(locations: &[LocationRow], threshold: Decimal) -> Vec<LocationCoord> {
    locations
        .iter()
        .filter(|l| l.balance <= threshold)
        .map(|l| l.coord)
        .collect()
}

/// Net amount recognized on a fulfilled order: sale price minus cost of
/// goods minus the sales tax collected on behalf of the state.
pub fn order_net_proceeds(sale_price: Decimal, unit_cost: Decimal, sales_tax: Decimal) -> Decimal {
    sale_price - unit_cost - sales_tax
}

/// Corporate income tax on a closed period. Zero when the period ran at a
/// loss or broke even; there is no carryback or carryforward.
pub fn corporate_income_tax(period_income: Decimal, cit_rate: Decimal) -> Result<Decimal, EconError> {
    if cit_rate < Decimal::ZERO || cit_rate > Decimal::ONE {
        return Err(EconError::InvalidRate(cit_rate));
    }
    if period_income <= Decimal::ZERO {
        return Ok(Decimal::ZERO);
    }
    Ok(period_income * cit_rate)
}

/// Radius employees must live within to hold a slot: half a chunk along
/// each axis, i.e. `sqrt(2 * (chunk/2)^2)` grid units.
pub fn employment_radius(chunk_size: u32) -> f64 {
    let half = f64::from(chunk_size) / 2.0;
    (2.0 * half * half).sqrt()
}

/// Euclidean distance between two grid coordinates.
pub fn grid_distance(a: LocationCoord, b: LocationCoord) -> f64 {
    let dv = f64::from(a.v - b.v);
    let dh = f64::from(a.h - b.h);
    dv.hypot(dh)
}

/// One month of wages for `count` employees: `base/12 * (1 + U)` with `U`
/// drawn uniformly from `[0, noise_frac)` per employee. Seeded for
/// reproducibility; results are rounded to cents.
pub fn monthly_wage_draws(
    base_wage: Decimal,
    count: usize,
    noise_frac: f32,
    seed: u64,
) -> Result<Vec<Decimal>, EconError> {
    if base_wage <= Decimal::ZERO {
        return Err(EconError::NonPositiveWage);
    }
    if !(0.0..1.0).contains(&noise_frac) || !noise_frac.is_finite() {
        return Err(EconError::InvalidNoise(noise_frac));
    }
    let monthly = base_wage / Decimal::from(12u32);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let u: f32 = if noise_frac == 0.0 {
            0.0
        } else {
            rng.gen_range(0.0..noise_frac)
        };
        let factor = Decimal::from_f32(1.0 + u).ok_or(EconError::NonFinite)?;
        out.push((monthly * factor).round_dp(2));
    }
    Ok(out)
}
