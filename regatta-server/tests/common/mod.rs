use sqlx::SqlitePool;
use tempfile::TempDir;

/// Fresh file-backed database per test. The TempDir must stay alive for as
/// long as the pool is used.
pub async fn setup() -> (SqlitePool, TempDir) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let url = format!("sqlite://{}", dir.path().join("regatta.db").display());

    let pool = regatta_server::db::create_pool(&url)
        .await
        .expect("failed to create pool");
    regatta_server::db::run_migrations(&pool)
        .await
        .expect("failed to run migrations");

    (pool, dir)
}
