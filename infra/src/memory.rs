//! A process-local store that honours the same keys and referential actions
//! as the PostgreSQL schema. Every pooled connection shares one set of
//! tables, and each call applies atomically.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use log::*;
use r2d2::ManageConnection;
use serde_json::Value;

use crate::ids::Id;
use crate::persistence::{Storage, StorageError};
use crate::records::{from_row, to_row, Filter, Record};
use crate::schema::{self, OnDelete};

type Rows = BTreeMap<String, Value>;

#[derive(Debug, Clone, Default)]
struct Tables {
    tables: BTreeMap<String, Rows>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Tables>>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryConnectionManager {
    store: MemoryStore,
}

impl MemoryConnectionManager {
    pub fn new(store: MemoryStore) -> Self {
        MemoryConnectionManager { store }
    }
}

impl ManageConnection for MemoryConnectionManager {
    type Connection = MemoryStore;
    type Error = StorageError;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        Ok(self.store.clone())
    }

    fn is_valid(&self, _conn: &mut Self::Connection) -> Result<(), Self::Error> {
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Runs `f` against a scratch copy of the tables and publishes the copy
    /// only if `f` succeeds.
    fn apply<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut Tables) -> Result<T, StorageError>,
    {
        let mut guard = self
            .inner
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        let mut scratch = guard.clone();
        let result = f(&mut scratch)?;
        *guard = scratch;
        Ok(result)
    }

    fn read<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Tables) -> Result<T, StorageError>,
    {
        let guard = self
            .inner
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        f(&guard)
    }
}

impl Tables {
    fn rows(&self, table: &str) -> Option<&Rows> {
        self.tables.get(table)
    }

    fn rows_mut(&mut self, table: &str) -> &mut Rows {
        self.tables.entry(table.to_string()).or_default()
    }

    fn contains(&self, table: &str, id: &str) -> bool {
        self.rows(table).map(|r| r.contains_key(id)).unwrap_or(false)
    }

    fn check_row(&self, table: &'static str, id: &str, row: &Value) -> Result<(), StorageError> {
        for fk in schema::foreign_keys_from(table) {
            match row.get(fk.column) {
                None | Some(Value::Null) => {}
                Some(Value::String(target)) if self.contains(fk.references, target) => {}
                Some(other) => {
                    return Err(StorageError::ForeignKeyViolation {
                        table,
                        message: format!(
                            "insert or update on table \"{}\" violates foreign key \
                             constraint \"{}\": key ({})=({}) is not present in table \"{}\"",
                            table, fk.name, fk.column, other, fk.references
                        ),
                    })
                }
            }
        }

        let others = match self.rows(table) {
            Some(rows) => rows,
            None => return Ok(()),
        };
        for uk in schema::unique_keys(table) {
            let key = uk
                .columns
                .iter()
                .map(|c| row.get(*c).cloned().unwrap_or(Value::Null))
                .collect::<Vec<_>>();
            if uk.nulls_distinct && key.iter().any(Value::is_null) {
                continue;
            }
            let clash = others.iter().any(|(other_id, other)| {
                other_id != id
                    && uk
                        .columns
                        .iter()
                        .zip(key.iter())
                        .all(|(c, v)| other.get(*c).unwrap_or(&Value::Null) == v)
            });
            if clash {
                return Err(StorageError::UniqueViolation {
                    table,
                    message: format!(
                        "duplicate key value violates unique constraint \"{}\"",
                        uk.name
                    ),
                });
            }
        }
        Ok(())
    }

    fn insert_row(
        &mut self,
        table: &'static str,
        id: String,
        row: Value,
    ) -> Result<(), StorageError> {
        if self.contains(table, &id) {
            return Err(StorageError::UniqueViolation {
                table,
                message: format!(
                    "duplicate key value violates unique constraint \"{}_pkey\"",
                    table
                ),
            });
        }
        self.check_row(table, &id, &row)?;
        self.rows_mut(table).insert(id, row);
        Ok(())
    }

    fn delete_rows(&mut self, table: &str, ids: &[String]) -> Result<u64, StorageError> {
        let mut removed = 0;
        {
            let rows = self.rows_mut(table);
            for id in ids {
                if rows.remove(id).is_some() {
                    removed += 1;
                }
            }
        }

        for fk in schema::foreign_keys_to(table) {
            let referencing = self
                .rows(fk.table)
                .map(|rows| {
                    rows.iter()
                        .filter(|(_, row)| match row.get(fk.column) {
                            Some(Value::String(target)) => ids.contains(target),
                            _ => false,
                        })
                        .map(|(id, _)| id.clone())
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            if referencing.is_empty() {
                continue;
            }
            match fk.on_delete {
                OnDelete::Restrict => {
                    return Err(StorageError::ForeignKeyViolation {
                        table: fk.references,
                        message: format!(
                            "update or delete on table \"{}\" violates foreign key \
                             constraint \"{}\" on table \"{}\"",
                            fk.references, fk.name, fk.table
                        ),
                    })
                }
                OnDelete::Cascade => {
                    trace!("Cascade {} rows of {}", referencing.len(), fk.table);
                    self.delete_rows(fk.table, &referencing)?;
                }
                OnDelete::SetNull => {
                    let rows = self.rows_mut(fk.table);
                    for id in referencing.iter() {
                        if let Some(Value::Object(row)) = rows.get_mut(id) {
                            row.insert(fk.column.to_string(), Value::Null);
                        }
                    }
                }
            }
        }
        Ok(removed)
    }
}

impl Storage for MemoryStore {
    fn setup(&self) -> Result<(), StorageError> {
        self.apply(|tables| {
            for table in schema::TABLES {
                tables.rows_mut(table);
            }
            Ok(())
        })
    }

    fn insert<R: Record>(&self, record: &R) -> Result<R, StorageError> {
        let row = to_row(record)?;
        let id = record.id().to_string();
        let inserted = self.apply(|tables| {
            tables.insert_row(R::TABLE, id, row.clone())?;
            from_row(row)
        })?;
        debug!("Inserted into {}: {}", R::TABLE, record.id());
        Ok(inserted)
    }

    fn insert_many<R: Record>(&self, records: &[R]) -> Result<Vec<R>, StorageError> {
        let rows = records
            .iter()
            .map(|r| to_row(r).map(|row| (r.id().to_string(), row)))
            .collect::<Result<Vec<_>, _>>()?;
        let inserted = self.apply(|tables| {
            let mut inserted = Vec::with_capacity(rows.len());
            for (id, row) in rows {
                tables.insert_row(R::TABLE, id, row.clone())?;
                inserted.push(from_row(row)?);
            }
            Ok(inserted)
        })?;
        debug!("Inserted {} rows into {}", inserted.len(), R::TABLE);
        Ok(inserted)
    }

    fn update<R: Record>(&self, record: &R) -> Result<R, StorageError> {
        let row = to_row(record)?;
        let id = record.id().to_string();
        self.apply(|tables| {
            if !tables.contains(R::TABLE, &id) {
                return Err(StorageError::NotFound {
                    table: R::TABLE,
                    id: id.clone(),
                });
            }
            tables.check_row(R::TABLE, &id, &row)?;
            tables.rows_mut(R::TABLE).insert(id.clone(), row.clone());
            from_row(row)
        })
    }

    fn load<R: Record>(&self, id: &Id<R>) -> Result<Option<R>, StorageError> {
        let row = self.read(|tables| {
            Ok(tables
                .rows(R::TABLE)
                .and_then(|rows| rows.get(&id.to_string()))
                .cloned())
        })?;
        row.map(from_row).transpose()
    }

    fn select<R: Record>(&self, filter: &Filter) -> Result<Vec<R>, StorageError> {
        let rows = self.read(|tables| {
            Ok(tables
                .rows(R::TABLE)
                .map(|rows| {
                    rows.values()
                        .filter(|row| filter.matches(row))
                        .cloned()
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default())
        })?;
        rows.into_iter().map(from_row).collect()
    }

    fn delete<R: Record>(&self, id: &Id<R>) -> Result<(), StorageError> {
        let id = id.to_string();
        self.apply(|tables| match tables.delete_rows(R::TABLE, &[id.clone()])? {
            0 => Err(StorageError::NotFound {
                table: R::TABLE,
                id: id.clone(),
            }),
            _ => Ok(()),
        })
    }

    fn delete_where<R: Record>(&self, filter: &Filter) -> Result<u64, StorageError> {
        let nrows = self.apply(|tables| {
            let ids = tables
                .rows(R::TABLE)
                .map(|rows| {
                    rows.iter()
                        .filter(|(_, row)| filter.matches(row))
                        .map(|(id, _)| id.clone())
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            tables.delete_rows(R::TABLE, &ids)
        })?;
        debug!("Deleted {} rows from {}", nrows, R::TABLE);
        Ok(nrows)
    }
}
