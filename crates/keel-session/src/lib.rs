//! Unit-of-work session for Keel.
//!
//! `keel-session` is the layer applications talk to. A [`Session`] loads
//! entities by primary key, hands out shared handles, remembers what every
//! entity looked like when it was loaded, and on [`Session::close`] writes
//! back exactly the entities that changed.
//!
//! - **Identity map**: one live instance per (entity type, primary key) per
//!   session; finding the same key twice returns the same handle.
//! - **Snapshots**: field values captured at load time, the baseline for
//!   dirty checking.
//! - **Write synchronization**: a full-row parameterized UPDATE per dirty
//!   entity, issued on `flush` or `close`.
//!
//! Connections come from a [`ConnectionProvider`] and are held only for the
//! duration of a single SELECT or UPDATE.
//!
//! # Example
//!
//! ```ignore
//! let factory = SessionFactory::new(SqliteConnector::new(SqliteConfig::file("shop.db")));
//!
//! let mut session = factory.create_session();
//! if let Some(product) = session.find::<Product>(&cx, 1_i64).await? {
//!     product.write().unwrap().name = "New laptop".to_string();
//! }
//! session.close(&cx).await?;
//! ```

pub mod change_tracker;
pub mod error;
pub mod flush;
pub mod identity_map;
pub mod key;
pub mod materialize;

pub use change_tracker::{ChangeTracker, Snapshot};
pub use error::SessionError;
pub use flush::{FlushReport, UpdateStatement, build_update};
pub use identity_map::{IdentityMap, ModelRef};
pub use key::EntityKey;
pub use materialize::materialize;

use asupersync::{Cx, Outcome};
use keel_core::{Connection, ConnectionProvider, Error, Lease, MappingDescriptor, Model, Value};
use std::sync::Arc;

/// Creates sessions that share one connection provider.
pub struct SessionFactory<P> {
    provider: Arc<P>,
}

impl<P> Clone for SessionFactory<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
        }
    }
}

impl<P: ConnectionProvider> SessionFactory<P> {
    pub fn new(provider: P) -> Self {
        Self::from_arc(Arc::new(provider))
    }

    pub fn from_arc(provider: Arc<P>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Open a new, empty session.
    pub fn create_session(&self) -> Session<P> {
        Session::new(Arc::clone(&self.provider))
    }
}

/// A unit of work over one connection provider.
///
/// Not shareable between tasks: every operation takes `&mut self`, and
/// [`Session::close`] consumes the session.
pub struct Session<P: ConnectionProvider> {
    provider: Arc<P>,
    identity_map: IdentityMap,
    tracker: ChangeTracker,
    closed: bool,
}

impl<P: ConnectionProvider> Session<P> {
    pub fn new(provider: Arc<P>) -> Self {
        tracing::debug!("Session opened");
        Self {
            provider,
            identity_map: IdentityMap::new(),
            tracker: ChangeTracker::new(),
            closed: false,
        }
    }

    /// Find an entity by primary key.
    ///
    /// Returns the cached handle when the key was already loaded in this
    /// session; otherwise loads the row, tracks the new entity and returns
    /// its handle. A missing row yields `Ok(None)` and is not cached.
    #[tracing::instrument(level = "debug", skip(self, cx, id), fields(entity = std::any::type_name::<M>()))]
    pub async fn find<M: Model>(
        &mut self,
        cx: &Cx,
        id: impl Into<Value>,
    ) -> Outcome<Option<ModelRef<M>>, SessionError> {
        let key = EntityKey::of::<M>(id);
        if let Some(handle) = self.identity_map.get::<M>(&key) {
            tracing::debug!(key = %key, "Identity map hit");
            return Outcome::Ok(Some(handle));
        }

        let descriptor = match MappingDescriptor::resolve::<M>() {
            Ok(d) => d,
            Err(e) => return Outcome::Err(SessionError::Mapping(e)),
        };
        tracing::trace!(
            entity = descriptor.entity(),
            id = %key.id(),
            "Loading entity from storage"
        );

        let row = {
            let lease = match Lease::acquire(&*self.provider, cx).await {
                Outcome::Ok(lease) => lease,
                Outcome::Err(e) => return Outcome::Err(SessionError::Connection(e)),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };
            let sql = materialize::select_by_key(&descriptor, lease.dialect());
            tracing::trace!(sql = %sql, params = 1, "SQL");
            match lease.query_one(cx, &sql, &[key.id().clone()]).await {
                Outcome::Ok(row) => row,
                Outcome::Err(error) => {
                    return Outcome::Err(SessionError::Query {
                        table: descriptor.table(),
                        id: key.id().clone(),
                        error,
                    });
                }
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
        };

        let (entity, snapshot) = match materialize::<M>(&descriptor, row) {
            Ok(Some(loaded)) => loaded,
            Ok(None) => {
                tracing::debug!(key = %key, "No row found");
                return Outcome::Ok(None);
            }
            Err(error) => {
                return Outcome::Err(SessionError::Query {
                    table: descriptor.table(),
                    id: key.id().clone(),
                    error,
                });
            }
        };

        // Storage may coerce the bound id (SQLite compares '1' equal to 1),
        // so the entity is tracked under the key it actually carries.
        let loaded = EntityKey::of::<M>(entity.primary_key_value());
        if loaded != key {
            tracing::debug!(requested = %key, loaded = %loaded, "Row key differs from requested id");
            if let Some(handle) = self.identity_map.get::<M>(&loaded) {
                return Outcome::Ok(Some(handle));
            }
        }

        tracing::trace!(
            entity = descriptor.entity(),
            id = %loaded.id(),
            "Creating snapshot"
        );
        self.tracker.record(loaded.clone(), snapshot);
        Outcome::Ok(Some(self.identity_map.insert(loaded, entity, descriptor)))
    }

    /// Write every dirty entity without ending the session.
    ///
    /// Entities written successfully get a new baseline; failed ones keep
    /// their old snapshot so a later flush or close retries them.
    pub async fn flush(&mut self, cx: &Cx) -> Outcome<FlushReport, SessionError> {
        self.flush_pass(cx).await
    }

    /// Flush, then discard all tracked state.
    ///
    /// The identity map and snapshots are cleared whatever the outcome.
    /// Handles held by the caller stay readable but are no longer tracked.
    #[tracing::instrument(level = "debug", skip(self, cx))]
    pub async fn close(mut self, cx: &Cx) -> Outcome<FlushReport, SessionError> {
        let tracked = self.tracker.len();
        let outcome = self.flush_pass(cx).await;
        self.clear();
        self.closed = true;

        match &outcome {
            Outcome::Ok(report) => {
                tracing::info!(tracked, updated = report.updated, "Session closed");
            }
            Outcome::Err(e) => {
                tracing::info!(tracked, error = %e, "Session closed with flush failures");
            }
            Outcome::Cancelled(_) | Outcome::Panicked(_) => {
                tracing::info!(tracked, "Session closed before flush completed");
            }
        }
        outcome
    }

    /// Whether an entity with this key is tracked.
    pub fn contains<M: Model>(&self, id: impl Into<Value>) -> bool {
        self.identity_map.contains(&EntityKey::of::<M>(id))
    }

    /// Whether the tracked entity differs from its snapshot.
    ///
    /// Untracked keys are not modified. An entity whose fields cannot be
    /// read back counts as modified; flushing it reports the cause.
    pub fn is_modified<M: Model>(&self, id: impl Into<Value>) -> bool {
        self.modified_fields::<M>(id)
            .map_or(true, |fields| !fields.is_empty())
    }

    /// Names of the fields that differ from the snapshot, in descriptor order.
    pub fn modified_fields<M: Model>(
        &self,
        id: impl Into<Value>,
    ) -> Result<Vec<&'static str>, keel_core::MappingError> {
        let key = EntityKey::of::<M>(id);
        let (Some(descriptor), Some(row), Some(snapshot)) = (
            self.identity_map.descriptor(&key),
            self.identity_map.current_row(&key),
            self.tracker.get(&key),
        ) else {
            return Ok(Vec::new());
        };
        let current = change_tracker::field_values(&descriptor, &row)?;
        Ok(snapshot.changed_fields(&current))
    }

    /// Number of tracked entities.
    pub fn tracked_count(&self) -> usize {
        self.identity_map.len()
    }

    fn clear(&mut self) {
        self.identity_map.clear();
        self.tracker.clear();
    }

    async fn flush_pass(&mut self, cx: &Cx) -> Outcome<FlushReport, SessionError> {
        let mut report = FlushReport::new();
        let mut failures = Vec::new();

        for key in self.tracker.keys().to_vec() {
            report.checked += 1;
            let (Some(descriptor), Some(row), Some(snapshot)) = (
                self.identity_map.descriptor(&key),
                self.identity_map.current_row(&key),
                self.tracker.get(&key),
            ) else {
                tracing::warn!(key = %key, "Tracked entity missing from identity map");
                continue;
            };

            let current = match change_tracker::field_values(&descriptor, &row) {
                Ok(values) => values,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Cannot read entity fields");
                    failures.push(SessionError::Mapping(e));
                    continue;
                }
            };
            let Some(field) = snapshot.first_change(&current) else {
                tracing::trace!(key = %key, "Entity unchanged");
                continue;
            };
            report.dirty += 1;
            tracing::debug!(key = %key, field, "Entity is dirty");

            if descriptor.non_key_fields().next().is_none() {
                tracing::debug!(key = %key, "No non-key columns to update");
                continue;
            }

            let primary_key =
                current_primary_key(&descriptor, &current).unwrap_or_else(|| key.id().clone());
            match self.write_entity(cx, &descriptor, &current).await {
                Outcome::Ok(()) => {
                    report.updated += 1;
                    self.tracker
                        .rebaseline(&key, Snapshot::from_field_values(current));
                }
                Outcome::Err(error) => {
                    tracing::warn!(
                        table = descriptor.table(),
                        primary_key = %primary_key,
                        error = %error,
                        "UPDATE failed"
                    );
                    failures.push(SessionError::Update {
                        table: descriptor.table(),
                        primary_key,
                        error,
                    });
                }
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
        }

        if failures.is_empty() {
            Outcome::Ok(report)
        } else {
            Outcome::Err(SessionError::Flush {
                failures,
                updated: report.updated,
            })
        }
    }

    async fn write_entity(
        &self,
        cx: &Cx,
        descriptor: &MappingDescriptor,
        current: &[(&'static str, Value)],
    ) -> Outcome<(), Error> {
        let lease = match Lease::acquire(&*self.provider, cx).await {
            Outcome::Ok(lease) => lease,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        let Some(statement) = build_update(descriptor, lease.dialect(), current) else {
            return Outcome::Ok(());
        };
        match statement.execute(cx, &*lease).await {
            Outcome::Ok(_) => Outcome::Ok(()),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }
}

/// Current primary key value among field-keyed values.
fn current_primary_key(
    descriptor: &MappingDescriptor,
    values: &[(&'static str, Value)],
) -> Option<Value> {
    let pk = descriptor.primary_key().name;
    values
        .iter()
        .find(|(name, _)| *name == pk)
        .map(|(_, v)| v.clone())
}

impl<P: ConnectionProvider> Drop for Session<P> {
    fn drop(&mut self) {
        if !self.closed && !self.tracker.is_empty() {
            tracing::warn!(
                tracked = self.tracker.len(),
                "Session dropped without close; pending changes discarded"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asupersync::runtime::RuntimeBuilder;
    use keel_core::error::{ConnectionErrorKind, QueryErrorKind};
    use keel_core::{Dialect, FieldInfo, MappingErrorKind, Row};
    use std::collections::HashMap;
    use std::future::Future;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    struct Product {
        id: i64,
        name: String,
    }

    impl Model for Product {
        const TABLE_NAME: &'static str = "products";

        fn fields() -> &'static [FieldInfo] {
            static FIELDS: &[FieldInfo] = &[
                FieldInfo::new("id", "id").primary_key(true),
                FieldInfo::new("name", "name"),
            ];
            FIELDS
        }

        fn to_row(&self) -> Vec<(&'static str, Value)> {
            vec![
                ("id", Value::BigInt(self.id)),
                ("name", Value::Text(self.name.clone())),
            ]
        }

        fn from_row(row: &Row) -> keel_core::Result<Self> {
            Ok(Self {
                id: row.get_named("id")?,
                name: row.get_named("name")?,
            })
        }

        fn primary_key_value(&self) -> Value {
            Value::BigInt(self.id)
        }
    }

    #[derive(Debug)]
    struct Orphan;

    impl Model for Orphan {
        const TABLE_NAME: &'static str = "orphans";

        fn fields() -> &'static [FieldInfo] {
            static FIELDS: &[FieldInfo] = &[FieldInfo::new("label", "label")];
            FIELDS
        }

        fn to_row(&self) -> Vec<(&'static str, Value)> {
            Vec::new()
        }

        fn from_row(_row: &Row) -> keel_core::Result<Self> {
            Ok(Orphan)
        }

        fn primary_key_value(&self) -> Value {
            Value::Null
        }
    }

    #[derive(Debug)]
    struct MockState {
        rows: HashMap<i64, Row>,
        queries: Vec<(String, Vec<Value>)>,
        executed: Vec<(String, Vec<Value>)>,
        acquired: usize,
        released: usize,
        fail_acquire: bool,
        fail_query: bool,
        fail_update_ids: Vec<i64>,
    }

    impl MockState {
        fn seeded() -> Arc<Mutex<Self>> {
            let mut rows = HashMap::new();
            for (id, name) in [(1, "Laptop"), (5, "Phone"), (7, "Tablet")] {
                rows.insert(id, product_row(Value::BigInt(id), name));
            }
            // Stored with a broken id column to exercise materialization errors.
            rows.insert(13, product_row(Value::Text("thirteen".to_string()), "Bad"));
            Arc::new(Mutex::new(Self {
                rows,
                queries: Vec::new(),
                executed: Vec::new(),
                acquired: 0,
                released: 0,
                fail_acquire: false,
                fail_query: false,
                fail_update_ids: Vec::new(),
            }))
        }
    }

    fn product_row(id: Value, name: &str) -> Row {
        Row::new(
            vec!["id".to_string(), "name".to_string()],
            vec![id, Value::Text(name.to_string())],
        )
    }

    struct MockConnection {
        state: Arc<Mutex<MockState>>,
    }

    impl Connection for MockConnection {
        fn dialect(&self) -> Dialect {
            Dialect::Sqlite
        }

        fn query_one(
            &self,
            _cx: &Cx,
            sql: &str,
            params: &[Value],
        ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
            let state = Arc::clone(&self.state);
            let sql = sql.to_string();
            let params = params.to_vec();
            async move {
                let mut guard = state.lock().expect("lock poisoned");
                guard.queries.push((sql.clone(), params.clone()));
                if guard.fail_query {
                    return Outcome::Err(Error::query(QueryErrorKind::Database, &sql, "boom"));
                }
                // Numeric text matches integer keys, as SQLite's affinity does.
                let id = params.first().and_then(|v| match v {
                    Value::Text(s) => s.parse().ok(),
                    other => other.as_i64(),
                });
                Outcome::Ok(id.and_then(|id| guard.rows.get(&id).cloned()))
            }
        }

        fn execute(
            &self,
            _cx: &Cx,
            sql: &str,
            params: &[Value],
        ) -> impl Future<Output = Outcome<u64, Error>> + Send {
            let state = Arc::clone(&self.state);
            let sql = sql.to_string();
            let params = params.to_vec();
            async move {
                let mut guard = state.lock().expect("lock poisoned");
                let id = params.last().and_then(Value::as_i64);
                if id.is_some_and(|id| guard.fail_update_ids.contains(&id)) {
                    return Outcome::Err(Error::query(
                        QueryErrorKind::Constraint,
                        &sql,
                        "constraint failed",
                    ));
                }
                guard.executed.push((sql, params));
                Outcome::Ok(1)
            }
        }

        fn ping(&self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
            async { Outcome::Ok(()) }
        }
    }

    struct MockProvider {
        state: Arc<Mutex<MockState>>,
    }

    impl ConnectionProvider for MockProvider {
        type Conn = MockConnection;

        fn acquire(&self, _cx: &Cx) -> impl Future<Output = Outcome<MockConnection, Error>> + Send {
            let state = Arc::clone(&self.state);
            async move {
                let mut guard = state.lock().expect("lock poisoned");
                if guard.fail_acquire {
                    return Outcome::Err(Error::connection(
                        ConnectionErrorKind::Connect,
                        "database unreachable",
                    ));
                }
                guard.acquired += 1;
                drop(guard);
                Outcome::Ok(MockConnection { state })
            }
        }

        fn release(&self, _conn: MockConnection) {
            self.state.lock().expect("lock poisoned").released += 1;
        }
    }

    fn setup() -> (Arc<Mutex<MockState>>, SessionFactory<MockProvider>) {
        let state = MockState::seeded();
        let factory = SessionFactory::new(MockProvider {
            state: Arc::clone(&state),
        });
        (state, factory)
    }

    fn unwrap_outcome<T>(outcome: Outcome<T, SessionError>) -> T {
        match outcome {
            Outcome::Ok(v) => v,
            Outcome::Err(e) => panic!("unexpected error: {e}"),
            Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
            Outcome::Panicked(p) => panic!("panicked: {p:?}"),
        }
    }

    fn unwrap_err<T>(outcome: Outcome<T, SessionError>) -> SessionError {
        match outcome {
            Outcome::Err(e) => e,
            Outcome::Ok(_) => panic!("expected an error"),
            Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
            Outcome::Panicked(p) => panic!("panicked: {p:?}"),
        }
    }

    fn rename(handle: &ModelRef<Product>, name: &str) {
        handle.write().expect("lock poisoned").name = name.to_string();
    }

    #[test]
    fn test_find_twice_returns_same_instance() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let (state, factory) = setup();

        rt.block_on(async {
            let mut session = factory.create_session();
            let a = unwrap_outcome(session.find::<Product>(&cx, 1_i64).await).unwrap();
            let b = unwrap_outcome(session.find::<Product>(&cx, 1_i32).await).unwrap();
            assert!(Arc::ptr_eq(&a, &b));

            rename(&a, "Changed");
            assert_eq!(b.read().unwrap().name, "Changed");

            let guard = state.lock().unwrap();
            assert_eq!(guard.queries.len(), 1);
            assert_eq!(
                guard.queries[0],
                (
                    "SELECT * FROM \"products\" WHERE \"id\" = ?1 LIMIT 1".to_string(),
                    vec![Value::BigInt(1)]
                )
            );
            assert_eq!(guard.acquired, guard.released);
        });
    }

    #[test]
    fn test_coerced_id_resolves_to_loaded_key() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let (state, factory) = setup();

        rt.block_on(async {
            let mut session = factory.create_session();
            let a = unwrap_outcome(session.find::<Product>(&cx, 1_i64).await).unwrap();
            let b = unwrap_outcome(session.find::<Product>(&cx, "1").await).unwrap();
            assert!(Arc::ptr_eq(&a, &b));
            assert_eq!(session.tracked_count(), 1);

            // Loaded through a text id, tracked under the row's integer key.
            let c = unwrap_outcome(session.find::<Product>(&cx, "5").await).unwrap();
            let d = unwrap_outcome(session.find::<Product>(&cx, 5_i64).await).unwrap();
            assert!(Arc::ptr_eq(&c, &d));
            assert_eq!(session.tracked_count(), 2);
            assert!(session.contains::<Product>(5_i64));

            // "1" and "5" each reach the connection; 5_i64 is served from the map.
            assert_eq!(state.lock().unwrap().queries.len(), 3);

            rename(&b, "Renamed");
            let report = unwrap_outcome(session.close(&cx).await);
            assert_eq!(report.updated, 1);
        });
    }

    #[test]
    fn test_unchanged_entity_is_not_written() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let (state, factory) = setup();

        rt.block_on(async {
            let mut session = factory.create_session();
            let first = unwrap_outcome(session.find::<Product>(&cx, 5_i64).await).unwrap();
            let second = unwrap_outcome(session.find::<Product>(&cx, 5_i64).await).unwrap();
            assert!(Arc::ptr_eq(&first, &second));
            assert!(!session.is_modified::<Product>(5_i64));

            let report = unwrap_outcome(session.close(&cx).await);
            assert_eq!(report.checked, 1);
            assert_eq!(report.updated, 0);
            assert!(state.lock().unwrap().executed.is_empty());
        });
    }

    #[test]
    fn test_dirty_entity_gets_full_row_update() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let (state, factory) = setup();

        rt.block_on(async {
            let mut session = factory.create_session();
            let laptop = unwrap_outcome(session.find::<Product>(&cx, 1_i64).await).unwrap();
            rename(&laptop, "New laptop");
            assert!(session.is_modified::<Product>(1_i64));
            assert_eq!(session.modified_fields::<Product>(1_i64).unwrap(), vec!["name"]);

            let report = unwrap_outcome(session.close(&cx).await);
            assert_eq!(report.dirty, 1);
            assert_eq!(report.updated, 1);

            let guard = state.lock().unwrap();
            assert_eq!(guard.executed.len(), 1);
            let (sql, params) = &guard.executed[0];
            assert_eq!(sql, "UPDATE \"products\" SET \"name\" = ?1 WHERE \"id\" = ?2");
            assert_eq!(
                params,
                &vec![Value::Text("New laptop".to_string()), Value::BigInt(1)]
            );
            assert_eq!(guard.acquired, guard.released);

            // The caller's handle outlives the session.
            assert_eq!(laptop.read().unwrap().name, "New laptop");
        });
    }

    #[test]
    fn test_reverting_a_change_is_clean() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let (state, factory) = setup();

        rt.block_on(async {
            let mut session = factory.create_session();
            let laptop = unwrap_outcome(session.find::<Product>(&cx, 1_i64).await).unwrap();
            rename(&laptop, "Desktop");
            rename(&laptop, "Laptop");
            unwrap_outcome(session.close(&cx).await);
            assert!(state.lock().unwrap().executed.is_empty());
        });
    }

    #[test]
    fn test_missing_row_is_not_cached() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let (state, factory) = setup();

        rt.block_on(async {
            let mut session = factory.create_session();
            assert!(unwrap_outcome(session.find::<Product>(&cx, 999_i64).await).is_none());
            assert!(!session.contains::<Product>(999_i64));
            assert_eq!(session.tracked_count(), 0);

            assert!(unwrap_outcome(session.find::<Product>(&cx, 999_i64).await).is_none());
            assert_eq!(state.lock().unwrap().queries.len(), 2);

            let report = unwrap_outcome(session.close(&cx).await);
            assert_eq!(report.checked, 0);
        });
    }

    #[test]
    fn test_sessions_are_isolated() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let (state, factory) = setup();

        rt.block_on(async {
            let mut one = factory.create_session();
            let mut two = factory.create_session();
            let a = unwrap_outcome(one.find::<Product>(&cx, 7_i64).await).unwrap();
            let b = unwrap_outcome(two.find::<Product>(&cx, 7_i64).await).unwrap();
            assert!(!Arc::ptr_eq(&a, &b));

            rename(&a, "Only in one");
            assert_eq!(b.read().unwrap().name, "Tablet");
            assert!(one.is_modified::<Product>(7_i64));
            assert!(!two.is_modified::<Product>(7_i64));

            unwrap_outcome(two.close(&cx).await);
            assert!(state.lock().unwrap().executed.is_empty());
            unwrap_outcome(one.close(&cx).await);
            assert_eq!(state.lock().unwrap().executed.len(), 1);
        });
    }

    #[test]
    fn test_new_session_after_close_reloads() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let (state, factory) = setup();

        rt.block_on(async {
            let mut session = factory.create_session();
            let before = unwrap_outcome(session.find::<Product>(&cx, 1_i64).await).unwrap();
            unwrap_outcome(session.close(&cx).await);

            let mut session = factory.create_session();
            let after = unwrap_outcome(session.find::<Product>(&cx, 1_i64).await).unwrap();
            assert!(!Arc::ptr_eq(&before, &after));
            assert_eq!(state.lock().unwrap().queries.len(), 2);
            unwrap_outcome(session.close(&cx).await);
        });
    }

    #[test]
    fn test_query_failure_releases_connection() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let (state, factory) = setup();
        state.lock().unwrap().fail_query = true;

        rt.block_on(async {
            let mut session = factory.create_session();
            let err = unwrap_err(session.find::<Product>(&cx, 1_i64).await);
            let SessionError::Query { table, id, .. } = &err else {
                panic!("expected query error, got {err:?}");
            };
            assert_eq!(*table, "products");
            assert_eq!(*id, Value::BigInt(1));
            assert_eq!(session.tracked_count(), 0);

            let guard = state.lock().unwrap();
            assert_eq!(guard.acquired, 1);
            assert_eq!(guard.released, 1);
        });
    }

    #[test]
    fn test_acquire_failure_is_connection_error() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let (state, factory) = setup();
        state.lock().unwrap().fail_acquire = true;

        rt.block_on(async {
            let mut session = factory.create_session();
            let err = unwrap_err(session.find::<Product>(&cx, 1_i64).await);
            assert!(matches!(err, SessionError::Connection(ref e) if e.is_connection_error()));
            assert!(state.lock().unwrap().queries.is_empty());
        });
    }

    #[test]
    fn test_materialization_failure_caches_nothing() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let (_state, factory) = setup();

        rt.block_on(async {
            let mut session = factory.create_session();
            let err = unwrap_err(session.find::<Product>(&cx, 13_i64).await);
            assert!(matches!(
                err,
                SessionError::Query {
                    error: Error::Type(_),
                    ..
                }
            ));
            assert!(!session.contains::<Product>(13_i64));
        });
    }

    #[test]
    fn test_mapping_error_before_any_io() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let (state, factory) = setup();

        rt.block_on(async {
            let mut session = factory.create_session();
            let err = unwrap_err(session.find::<Orphan>(&cx, 1_i64).await);
            let SessionError::Mapping(mapping) = err else {
                panic!("expected mapping error");
            };
            assert_eq!(mapping.kind, MappingErrorKind::MissingPrimaryKey);
            assert_eq!(state.lock().unwrap().acquired, 0);
        });
    }

    #[test]
    fn test_close_aggregates_failures_and_clears() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let (state, factory) = setup();
        state.lock().unwrap().fail_update_ids = vec![5];

        rt.block_on(async {
            let mut session = factory.create_session();
            for id in [1_i64, 5, 7] {
                let handle = unwrap_outcome(session.find::<Product>(&cx, id).await).unwrap();
                rename(&handle, "Renamed");
            }

            let err = unwrap_err(session.close(&cx).await);
            let SessionError::Flush { failures, updated } = &err else {
                panic!("expected flush error, got {err:?}");
            };
            assert_eq!(*updated, 2);
            assert_eq!(failures.len(), 1);
            assert!(matches!(
                &failures[0],
                SessionError::Update { table: "products", primary_key: Value::BigInt(5), .. }
            ));

            let guard = state.lock().unwrap();
            assert_eq!(guard.executed.len(), 2);
            assert_eq!(guard.acquired, guard.released);
        });
    }

    #[test]
    fn test_flush_rebaselines_written_entities() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let (state, factory) = setup();

        rt.block_on(async {
            let mut session = factory.create_session();
            let laptop = unwrap_outcome(session.find::<Product>(&cx, 1_i64).await).unwrap();
            rename(&laptop, "New laptop");

            let report = unwrap_outcome(session.flush(&cx).await);
            assert_eq!(report.updated, 1);
            assert!(!session.is_modified::<Product>(1_i64));
            assert!(session.contains::<Product>(1_i64));

            let report = unwrap_outcome(session.close(&cx).await);
            assert_eq!(report.updated, 0);
            assert_eq!(state.lock().unwrap().executed.len(), 1);
        });
    }

    #[test]
    fn test_failed_flush_is_retried() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let (state, factory) = setup();
        state.lock().unwrap().fail_update_ids = vec![1];

        rt.block_on(async {
            let mut session = factory.create_session();
            let laptop = unwrap_outcome(session.find::<Product>(&cx, 1_i64).await).unwrap();
            rename(&laptop, "New laptop");

            let err = unwrap_err(session.flush(&cx).await);
            assert_eq!(err.failures().len(), 1);
            assert!(session.is_modified::<Product>(1_i64));

            state.lock().unwrap().fail_update_ids.clear();
            let report = unwrap_outcome(session.close(&cx).await);
            assert_eq!(report.updated, 1);
            assert_eq!(state.lock().unwrap().executed.len(), 1);
        });
    }

    #[test]
    fn test_update_acquire_failure_is_reported_per_entity() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let (state, factory) = setup();

        rt.block_on(async {
            let mut session = factory.create_session();
            let laptop = unwrap_outcome(session.find::<Product>(&cx, 1_i64).await).unwrap();
            rename(&laptop, "New laptop");
            state.lock().unwrap().fail_acquire = true;

            let err = unwrap_err(session.close(&cx).await);
            let failure = &err.failures()[0];
            assert!(failure.core_error().is_some_and(Error::is_connection_error));
        });
    }

    #[test]
    fn test_factory_clones_share_provider() {
        let (_state, factory) = setup();
        let other = factory.clone();
        assert!(std::ptr::eq(factory.provider(), other.provider()));
    }
}
