use std::collections::HashMap;

use flatdb::{DataType, Database, Schema, Select, Value};
use tracing_subscriber::EnvFilter;

fn main() -> flatdb::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    println!("Flat-file Database Demo\n");

    let dir = tempfile::tempdir()?;
    let mut db = Database::create(dir.path().join("demo.db"))?;

    // Create table "users"
    let schema = Schema::new([
        ("id", DataType::Int32),
        ("name", DataType::text(20)?),
        ("age", DataType::Int32),
        ("active", DataType::Bool),
    ])?;
    db.create_table("users", schema, false)?;
    println!("Created table 'users'");

    println!("Inserting data...");
    db.insert_many(
        "users",
        [
            vec![Value::Int32(1), "Alice".into(), Value::Int32(30), true.into()],
            vec![Value::Int32(2), "Bob".into(), Value::Null, false.into()],
            vec![Value::Int32(3), "Charlie".into(), Value::Int32(25), true.into()],
        ],
    )?;

    // Named rows leave missing columns null
    let mut dave = HashMap::new();
    dave.insert("name".to_string(), Value::from("Dave"));
    dave.insert("id".to_string(), Value::Int32(4));
    db.insert("users", dave)?;
    println!("Inserted {} rows\n", db.row_count("users")?);

    println!("Reading data:");
    println!("{:<5} {:<10} {:<5} {:<6}", "ID", "NAME", "AGE", "ACTIVE");
    println!("{}", "-".repeat(30));
    for row in db.scan("users")? {
        let row = row?;
        let cells: Vec<String> = row.iter().map(Value::to_string).collect();
        println!("{:<5} {:<10} {:<5} {:<6}", cells[0], cells[1], cells[2], cells[3]);
    }
    println!();

    let removed = db.delete("users", |row| row.iter().any(Value::is_null))?;
    println!("Deleted {removed} rows with a null field\n");

    let result = db.query(&Select::new("users").columns(["name", "age"]), |row| {
        row[3].as_bool() == Some(true)
    })?;
    println!("Active users: {:?}", result.columns);
    for row in &result.rows {
        println!("  {} ({})", row[0], row[1]);
    }
    println!();

    println!("Tables in database:");
    for table_name in db.list_tables() {
        println!("  - {}", table_name);
    }

    db.remove()
}
