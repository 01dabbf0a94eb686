// pgsqlbackup/src/backup/enumerate.rs
use std::collections::BTreeSet;

use sqlx::postgres::PgConnectOptions;
use sqlx::{Connection, PgConnection};
use tracing::debug;

use crate::config::PgConfig;
use crate::errors::BackupError;

/// Catalog enumeration, ordered the way `psql \l` orders it.
const CATALOG_QUERY: &str = "SELECT d.datname FROM pg_catalog.pg_database d ORDER BY 1";

fn connect_options(pg: &PgConfig) -> PgConnectOptions {
    let mut opts = PgConnectOptions::new()
        .username(&pg.user)
        .database(&pg.default_db);
    if let Some(host) = &pg.host {
        opts = opts.host(host);
    }
    if let Some(port) = pg.port {
        opts = opts.port(port);
    }
    if let Some(password) = &pg.password {
        opts = opts.password(password);
    }
    opts
}

/// Lists every database on the server, in catalog order. The connection is
/// short-lived: it is closed on every exit path before dumping begins.
pub async fn list_databases(pg: &PgConfig) -> Result<Vec<String>, BackupError> {
    let mut conn = PgConnection::connect_with(&connect_options(pg))
        .await
        .map_err(BackupError::Connection)?;

    let fetched = sqlx::query_scalar::<_, String>(CATALOG_QUERY)
        .fetch_all(&mut conn)
        .await;
    let _ = conn.close().await;

    let names = fetched.map_err(BackupError::Query)?;
    debug!(count = names.len(), "enumerated databases");
    Ok(names)
}

/// Order-preserving catalog-minus-exclusion. Returns the targets plus the
/// number of names dropped by the exclusion set.
pub fn filter_targets(names: Vec<String>, exclude: &BTreeSet<String>) -> (Vec<String>, usize) {
    let total = names.len();
    let targets: Vec<String> = names
        .into_iter()
        .filter(|name| !exclude.contains(name))
        .collect();
    let excluded = total - targets.len();
    (targets, excluded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn filter_removes_excluded_and_preserves_order() {
        let exclude: BTreeSet<String> =
            ["template0", "template1", "postgres"].iter().map(|s| s.to_string()).collect();
        let catalog = names(&["accounts", "postgres", "shop", "template0", "template1", "wiki"]);

        let (targets, excluded) = filter_targets(catalog, &exclude);
        assert_eq!(targets, names(&["accounts", "shop", "wiki"]));
        assert_eq!(excluded, 3);
    }

    #[test]
    fn filter_with_empty_exclusion_is_identity() {
        let (targets, excluded) = filter_targets(names(&["b", "a"]), &BTreeSet::new());
        assert_eq!(targets, names(&["b", "a"]));
        assert_eq!(excluded, 0);
    }

    #[test]
    fn filter_can_exclude_everything() {
        let exclude: BTreeSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        let (targets, excluded) = filter_targets(names(&["a", "b"]), &exclude);
        assert!(targets.is_empty());
        assert_eq!(excluded, 2);
    }

    #[tokio::test]
    async fn unreachable_server_is_a_connection_error() {
        let pg = PgConfig {
            host: Some("127.0.0.1".into()),
            port: Some(1),
            default_db: "postgres".into(),
            user: "postgres".into(),
            password: None,
        };
        let err = list_databases(&pg).await.unwrap_err();
        assert!(matches!(err, BackupError::Connection(_)), "got {err:?}");
    }
}
