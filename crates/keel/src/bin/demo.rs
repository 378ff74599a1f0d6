//! Keel demo: load, change and write back a product through a session.
//!
//! Usage:
//!   keel-demo                          # database under the system temp dir
//!   KEEL_DEMO_DB=/tmp/shop.db keel-demo
//!   RUST_LOG=keel=debug keel-demo      # default filter: keel=trace,info

use asupersync::runtime::RuntimeBuilder;
use keel::prelude::*;
use std::sync::PoisonError;

#[derive(Model, Debug, Clone)]
#[keel(table = "products")]
struct Product {
    #[keel(primary_key)]
    id: i64,
    name: String,
}

fn database_path() -> String {
    std::env::var("KEEL_DEMO_DB").unwrap_or_else(|_| {
        std::env::temp_dir()
            .join("keel-demo.db")
            .to_string_lossy()
            .into_owned()
    })
}

fn seed(path: &str) -> Result<(), Error> {
    let conn = SqliteConnection::open_file(path)?;
    conn.execute_raw(
        "DROP TABLE IF EXISTS products;
         CREATE TABLE products (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
         INSERT INTO products (id, name) VALUES (1, 'Laptop');",
    )
}

fn outcome<T>(outcome: Outcome<T, SessionError>) -> Result<T, Box<dyn std::error::Error>> {
    match outcome {
        Outcome::Ok(v) => Ok(v),
        Outcome::Err(e) => Err(e.into()),
        Outcome::Cancelled(r) => Err(format!("cancelled: {r:?}").into()),
        Outcome::Panicked(p) => Err(format!("panicked: {p:?}").into()),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    keel::init_tracing("keel=trace,info").map_err(|e| e.to_string())?;

    let path = database_path();
    seed(&path)?;
    tracing::info!(path = %path, "Seeded products table");

    let pool = Pool::new(
        SqliteConnector::new(SqliteConfig::file(path.clone()).busy_timeout(2000)),
        PoolConfig::new(4).max_idle(2),
    )?;
    let factory = SessionFactory::new(pool);

    let rt = RuntimeBuilder::current_thread()
        .build()
        .map_err(|e| format!("failed to create runtime: {e}"))?;
    // Request-scoped context with an unbounded budget for the whole run.
    let cx = Cx::for_request();

    rt.block_on(async {
        let mut session = factory.create_session();

        let Some(first) = outcome(session.find::<Product>(&cx, 1_i64).await)? else {
            return Err("product 1 is missing".into());
        };
        let Some(second) = outcome(session.find::<Product>(&cx, 1_i64).await)? else {
            return Err("product 1 is missing".into());
        };
        tracing::info!(
            same_instance = std::sync::Arc::ptr_eq(&first, &second),
            "Loaded product 1 twice"
        );

        first
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .name = "New laptop".to_string();
        {
            let product = second.read().unwrap_or_else(PoisonError::into_inner);
            tracing::info!(product = ?*product, "Changed through the first handle");
        }

        let report = outcome(session.close(&cx).await)?;
        tracing::info!(
            checked = report.checked,
            updated = report.updated,
            "Closed session"
        );

        let mut session = factory.create_session();
        match outcome(session.find::<Product>(&cx, 1_i64).await)? {
            Some(product) => {
                let product = product.read().unwrap_or_else(PoisonError::into_inner);
                tracing::info!(product = ?*product, "Reloaded in a new session");
            }
            None => tracing::warn!("Product 1 disappeared"),
        }
        if outcome(session.find::<Product>(&cx, 999_i64).await)?.is_none() {
            tracing::info!(id = 999, "No such product");
        }
        outcome(session.close(&cx).await)?;

        Ok::<(), Box<dyn std::error::Error>>(())
    })?;

    tracing::info!(stats = ?factory.provider().stats(), "Pool statistics");
    Ok(())
}
