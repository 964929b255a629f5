use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use flatdb::{DataType, Database, DbConfig, Schema, Select, Value};
use std::hint::black_box;
use tempfile::TempDir;

fn users_schema() -> Schema {
    Schema::new([
        ("id", DataType::Int64),
        ("name", DataType::text(16).unwrap()),
        ("age", DataType::Int32),
        ("active", DataType::Bool),
    ])
    .unwrap()
}

fn user(i: usize) -> Vec<Value> {
    vec![
        Value::Int64(i as i64),
        Value::from(format!("user{}", i)),
        Value::Int32((i % 100) as i32),
        Value::Bool(i % 2 == 0),
    ]
}

fn setup_populated_db(n: usize) -> (TempDir, Database) {
    let dir = TempDir::new().unwrap();
    let mut db = Database::create_with_config(dir.path().join("bench.db"), DbConfig::default()).unwrap();
    db.create_table("users", users_schema(), false).unwrap();
    db.insert_many("users", (0..n).map(user)).unwrap();
    (dir, db)
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("Row_Codec");
    let codec = flatdb::RowCodec::new(&users_schema(), flatdb::Endianness::Big).unwrap();
    let block = codec.encode(user(42).into()).unwrap();

    group.bench_function("encode_row", |b| {
        b.iter(|| codec.encode(black_box(user(42)).into()).unwrap());
    });
    group.bench_function("decode_row", |b| {
        b.iter(|| codec.decode(black_box(&block)).unwrap());
    });
    group.finish();
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("Insert");
    group.bench_function("insert_single_row", |b| {
        let (_dir, db) = setup_populated_db(0);
        b.iter(|| db.insert("users", black_box(user(42))).unwrap());
    });
    group.finish();
}

fn bench_scan_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("Scan_Filter_Performance");

    for n in [1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(n), n, |b, &n| {
            let (_dir, db) = setup_populated_db(n);
            b.iter(|| {
                let res = db
                    .query(&Select::new("users"), |row| row[2].as_int() == Some(42))
                    .unwrap();
                black_box(res);
            });
        });
    }
    group.finish();
}

fn bench_delete_performance(c: &mut Criterion) {
    let mut group = c.benchmark_group("Delete_Performance");

    for n in [1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(n), n, |b, &n| {
            b.iter_with_setup(
                || setup_populated_db(n),
                |(dir, db)| {
                    let removed = db
                        .delete("users", |row| row[2].as_int().is_some_and(|age| age > 90))
                        .unwrap();
                    black_box(removed);
                    drop(dir);
                },
            );
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_codec,
    bench_insert,
    bench_scan_scaling,
    bench_delete_performance
);
criterion_main!(benches);
