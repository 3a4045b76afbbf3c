use super::model::Wat;
use anyhow::{bail, Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::instrument;

pub type Pool = SqlitePool;

const WAT_COLUMNS: &str = "id, name, file_ids, expressions, created_at";

pub async fn init_pool(db_path: &str) -> Result<Pool> {
    let url = sqlite_url(db_path);
    let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// Turn a config `db` path into a SQLite URL, creating the parent directory
/// for file-backed databases. Already-formed URLs pass through untouched.
fn sqlite_url(db_path: &str) -> String {
    if db_path.starts_with("sqlite:") || db_path == ":memory:" {
        return db_path.to_string();
    }
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }
    format!("sqlite://{}", db_path)
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Insert a new WAT with empty expressions. `file_ids` must be non-empty and
/// ascending by image size. The UNIQUE constraint on `name` rejects
/// duplicates, so a lost check-then-create race surfaces here as an error.
#[instrument(skip_all)]
pub async fn create_wat(pool: &Pool, name: &str, file_ids: &[String]) -> Result<Wat> {
    if file_ids.is_empty() {
        bail!("cannot create WAT '{}' without images", name);
    }
    let file_ids_json = serde_json::to_string(file_ids)?;
    let row = sqlx::query(
        "INSERT INTO wats (name, file_ids, expressions) VALUES (?, ?, '[]') RETURNING id, created_at",
    )
    .bind(name)
    .bind(&file_ids_json)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to insert WAT '{}'", name))?;
    Ok(Wat {
        id: row.get("id"),
        name: name.to_string(),
        file_ids: file_ids.to_vec(),
        expressions: Vec::new(),
        created_at: row.get("created_at"),
    })
}

#[instrument(skip_all)]
pub async fn wat_exists(pool: &Pool, name: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM wats WHERE name = ?")
        .bind(name)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

#[instrument(skip_all)]
pub async fn get_wat_by_name(pool: &Pool, name: &str) -> Result<Option<Wat>> {
    let row = sqlx::query(&format!("SELECT {} FROM wats WHERE name = ?", WAT_COLUMNS))
        .bind(name)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(wat_from_row).transpose()
}

#[instrument(skip_all)]
pub async fn get_wat_by_id(pool: &Pool, id: i64) -> Result<Option<Wat>> {
    let row = sqlx::query(&format!("SELECT {} FROM wats WHERE id = ?", WAT_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(wat_from_row).transpose()
}

/// All WATs in insertion order.
#[instrument(skip_all)]
pub async fn list_wats(pool: &Pool) -> Result<Vec<Wat>> {
    let rows = sqlx::query(&format!("SELECT {} FROM wats ORDER BY id", WAT_COLUMNS))
        .fetch_all(pool)
        .await?;
    rows.iter().map(wat_from_row).collect()
}

/// Every WAT whose expression set contains `expr` exactly. Matching is
/// whole-string membership, not substring; callers lowercase `expr` first.
#[instrument(skip_all)]
pub async fn search_by_expression(pool: &Pool, expr: &str) -> Result<Vec<Wat>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM wats \
         WHERE EXISTS (SELECT 1 FROM json_each(wats.expressions) WHERE json_each.value = ?) \
         ORDER BY id",
        WAT_COLUMNS
    ))
    .bind(expr)
    .fetch_all(pool)
    .await?;
    rows.iter().map(wat_from_row).collect()
}

/// Replace the named WAT's expressions wholesale. A no-op for unknown names;
/// callers pre-check existence.
#[instrument(skip_all)]
pub async fn set_expressions(pool: &Pool, name: &str, expressions: &[String]) -> Result<()> {
    let expressions_json = serde_json::to_string(expressions)?;
    sqlx::query("UPDATE wats SET expressions = ? WHERE name = ?")
        .bind(&expressions_json)
        .bind(name)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete by id. Returns true iff a record was removed.
#[instrument(skip_all)]
pub async fn remove_wat(pool: &Pool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM wats WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

fn wat_from_row(row: &SqliteRow) -> Result<Wat> {
    let file_ids_json: String = row.try_get("file_ids")?;
    let expressions_json: String = row.try_get("expressions")?;
    Ok(Wat {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        file_ids: serde_json::from_str(&file_ids_json)?,
        expressions: serde_json::from_str(&expressions_json)?,
        created_at: row.try_get("created_at")?,
    })
}
