//! Fixtures for tests that run against a real PostgreSQL.
//!
//! Set `TEST_DATABASE_URL` to run them; without it each test returns early.
//! Every fixture creates fresh users, so tests can share one database.

use uuid::Uuid;

use super::{Database, Item, NewItemRecord};

pub const TEST_DATABASE_URL: &str = "TEST_DATABASE_URL";

/// Serializes schema application across concurrently running tests
const SCHEMA_LOCK_KEY: i64 = 0x6361_6d70_7573;

pub async fn database() -> Option<Database> {
    let url = match std::env::var(TEST_DATABASE_URL) {
        Ok(url) => url,
        Err(_) => {
            eprintln!("{} not set, skipping Postgres test", TEST_DATABASE_URL);
            return None;
        }
    };

    let db = Database::new(&url, 4).await.expect("connect to test database");

    let mut tx = db.pool().begin().await.expect("begin schema transaction");
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(SCHEMA_LOCK_KEY)
        .execute(&mut *tx)
        .await
        .expect("take schema lock");
    sqlx::raw_sql(include_str!("schema.sql"))
        .execute(&mut *tx)
        .await
        .expect("apply schema");
    tx.commit().await.expect("commit schema");

    Some(db)
}

pub async fn user(db: &Database) -> Uuid {
    let id = Uuid::new_v4();
    let username = format!("u_{}", &id.simple().to_string()[..16]);
    db.upsert_profile(id, &username, None, None)
        .await
        .expect("create profile");
    id
}

pub async fn item(db: &Database, owner: Uuid, category: &str, subcategory: Option<&str>) -> Item {
    let record = NewItemRecord {
        user_id: owner,
        name: "Desk lamp".to_string(),
        brand: "IKEA".to_string(),
        category: category.to_string(),
        subcategory: subcategory.map(str::to_string),
        condition: "Decent".to_string(),
        size: String::new(),
        description: "Works fine".to_string(),
        images: vec!["https://img.example/lamp.jpg".to_string()],
    };
    db.create_item(&record).await.expect("create item")
}
