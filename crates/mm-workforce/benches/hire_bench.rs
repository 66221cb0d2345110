use criterion::{criterion_group, criterion_main, Criterion};
use mm_core::{EmployeeRow, JobCode, LocationCoord, PersonRow, Pid};
use rust_decimal::Decimal;

fn bench_hiring(c: &mut Criterion) {
    let persons: Vec<PersonRow> = (0..10_000i64)
        .map(|i| PersonRow {
            pid: Pid(i),
            birth: 500,
            death: None,
            job: JobCode(2),
            savings: Decimal::ZERO,
            locv: (i % 100) as i32,
            loch: (i / 100) as i32,
        })
        .collect();
    let employees: Vec<EmployeeRow> = (0..50i64)
        .map(|i| EmployeeRow {
            coord: LocationCoord::new(50, 50),
            pid: Pid(-1 - i), // holders absent from the population
            wage: Decimal::new(40_000, 0),
        })
        .collect();
    let flagged: Vec<usize> = (0..employees.len()).collect();
    c.bench_function("hire_50_slots_10k_people", |b| {
        b.iter(|| {
            let mut employees = employees.clone();
            let mut persons = persons.clone();
            mm_workforce::hire_employees(1000, &mut employees, &mut persons, &flagged, 45.0, &[])
        })
    });
}

criterion_group!(benches, bench_hiring);
criterion_main!(benches);
