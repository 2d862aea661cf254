//! Commit path benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kestrel_bench::{people_database, person, populate, shuffled_emails};

/// Benchmark autocommitted single-record creates.
fn bench_single_create(c: &mut Criterion) {
    c.bench_function("commit/single_create", |b| {
        let db = people_database();
        let mut session = db.session();
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            let mut record = person(&session, &format!("single{n}@example.org"));
            session.save(black_box(&mut record)).unwrap();
        });
    });
}

/// Benchmark transactions creating a batch of records.
fn bench_batch_create(c: &mut Criterion) {
    let mut group = c.benchmark_group("commit/batch_create");

    for batch_size in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            batch_size,
            |b, &batch_size| {
                let db = people_database();
                let mut session = db.session();
                let mut round = 0u64;
                b.iter(|| {
                    round += 1;
                    session
                        .transaction(|s| {
                            for i in 0..batch_size {
                                let mut record = person(s, &format!("r{round}-{i}@example.org"));
                                s.save(&mut record)?;
                            }
                            Ok(())
                        })
                        .unwrap();
                });
            },
        );
    }
    group.finish();
}

/// Benchmark updates of committed records, which validate versions and
/// move index entries.
fn bench_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("commit/update");

    for size in [100, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let db = people_database();
            let mut records = populate(&db, size);
            let mut session = db.session();
            let mut n = 0usize;
            b.iter(|| {
                n += 1;
                let record = &mut records[n % size];
                record.set("age", (n % 90) as i64);
                session.save(black_box(record)).unwrap();
            });
        });
    }
    group.finish();
}

/// Benchmark commits refused by a unique key, including the rollback.
fn bench_duplicate_refused(c: &mut Criterion) {
    c.bench_function("commit/duplicate_refused", |b| {
        let db = people_database();
        populate(&db, 1_000);
        let taken = shuffled_emails(1_000);
        let mut session = db.session();
        let mut n = 0usize;
        b.iter(|| {
            n += 1;
            let mut record = person(&session, &taken[n % taken.len()]);
            black_box(session.save(&mut record).unwrap_err());
        });
    });
}

criterion_group!(
    benches,
    bench_single_create,
    bench_batch_create,
    bench_update,
    bench_duplicate_refused
);
criterion_main!(benches);
