use std::env;

use anyhow::{Context, Result};
use log::*;
use r2d2::Pool;
use r2d2_postgres::{PostgresConnectionManager, TlsMode};

use infra::memory::{MemoryConnectionManager, MemoryStore};
use infra::persistence::{RecordConnectionManager, Records, Storage};

/// Points every pooled connection at a per-test schema.
#[derive(Debug)]
struct UseTempSchema(String);

impl r2d2::CustomizeConnection<Records, postgres::Error> for UseTempSchema {
    fn on_acquire(&self, conn: &mut Records) -> Result<(), postgres::Error> {
        let conn = conn.get_ref();
        conn.execute(&format!("CREATE SCHEMA IF NOT EXISTS \"{}\"", self.0), &[])?;
        conn.execute(&format!("SET search_path TO \"{}\"", self.0), &[])?;
        Ok(())
    }
}

pub(crate) fn memory_pool() -> Result<Pool<MemoryConnectionManager>> {
    let pool = r2d2::Pool::builder()
        .max_size(2)
        .build(MemoryConnectionManager::new(MemoryStore::new()))?;
    pool.get()?.setup()?;
    Ok(pool)
}

pub(crate) fn postgres_pool(schema: &str) -> Result<Pool<RecordConnectionManager>> {
    debug!("Build pool for {}", schema);
    let url = env::var("POSTGRES_URL").context("$POSTGRES_URL")?;
    let manager = PostgresConnectionManager::new(&*url, TlsMode::None)?;

    let pool = r2d2::Pool::builder()
        .max_size(2)
        .connection_customizer(Box::new(UseTempSchema(schema.to_string())))
        .build(RecordConnectionManager::new(manager))?;

    let conn = pool.get()?;
    cleanup(conn.get_ref(), schema)?;

    debug!("Init schema in {}", schema);
    conn.setup()?;

    Ok(pool)
}

fn cleanup(conn: &postgres::Connection, schema: &str) -> Result<()> {
    let t = conn.transaction()?;
    debug!("Clean old tables in {}", schema);
    for row in t
        .query(
            "SELECT n.nspname, c.relname \
             FROM pg_catalog.pg_class c \
             LEFT JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
             WHERE n.nspname = $1 and c.relkind = 'r'",
            &[&schema],
        )?
        .iter()
    {
        let schema = row.get::<_, String>(0);
        let table = row.get::<_, String>(1);
        t.execute(&format!("DROP TABLE {}.{} CASCADE", schema, table), &[])?;
    }
    t.commit()?;
    Ok(())
}
