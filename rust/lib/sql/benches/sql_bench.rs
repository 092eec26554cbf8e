use criterion::{black_box, criterion_group, criterion_main, Criterion};

use openerp_sql::{SQLStore, SqlExecutor, SqliteStore, Value};

fn users_store(rows: usize) -> SqliteStore {
    let store = SqliteStore::open_in_memory().unwrap();
    store
        .exec(
            "CREATE TABLE users (uuid TEXT PRIMARY KEY, login TEXT NOT NULL, active INTEGER NOT NULL)",
            &[],
        )
        .unwrap();

    let session = store.begin().unwrap();
    for i in 0..rows {
        session
            .exec(
                "INSERT INTO users (uuid, login, active) VALUES (?1, ?2, ?3)",
                &[
                    Value::Text(format!("{:08}", i)),
                    Value::Text(format!("user-{}", i)),
                    Value::Integer(1),
                ],
            )
            .unwrap();
    }
    session.commit().unwrap();
    store
}

fn bench_session_insert(c: &mut Criterion) {
    let store = users_store(0);

    c.bench_function("sqlite_session_insert_100", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let session = store.begin().unwrap();
            for _ in 0..100 {
                session
                    .exec(
                        "INSERT INTO users (uuid, login, active) VALUES (?1, ?2, ?3)",
                        &[
                            Value::Text(format!("bench-{}", i)),
                            Value::Text(format!("login-{}", i)),
                            Value::Integer(1),
                        ],
                    )
                    .unwrap();
                i += 1;
            }
            session.commit().unwrap();
        });
    });
}

fn bench_query_by_uuid(c: &mut Criterion) {
    let store = users_store(10000);

    let mut i = 0usize;
    c.bench_function("sqlite_query_by_uuid", |b| {
        b.iter(|| {
            let rows = store
                .query(
                    "SELECT uuid, login FROM users WHERE uuid = ?1",
                    &[Value::Text(format!("{:08}", black_box(i % 10000)))],
                )
                .unwrap();
            assert_eq!(rows.len(), 1);
            i += 1;
        });
    });
}

fn bench_keyset_page(c: &mut Criterion) {
    let store = users_store(10000);

    let mut after = 0usize;
    c.bench_function("sqlite_keyset_page_100", |b| {
        b.iter(|| {
            let rows = store
                .query(
                    "SELECT uuid, login FROM users WHERE uuid > ?1 ORDER BY uuid LIMIT 100",
                    &[Value::Text(format!("{:08}", black_box(after % 9000)))],
                )
                .unwrap();
            assert_eq!(rows.len(), 100);
            after += 100;
        });
    });
}

criterion_group!(benches, bench_session_insert, bench_query_by_uuid, bench_keyset_page);
criterion_main!(benches);
