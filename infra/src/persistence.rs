use err_derive::Error;
use log::*;
use postgres::types::ToSql;
use r2d2::ManageConnection;
use r2d2_postgres::PostgresConnectionManager;
use serde_json::Value;

use crate::ids::Id;
use crate::records::{from_row, to_row, Filter, Record};

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(display = "{}", message)]
    UniqueViolation {
        table: &'static str,
        message: String,
    },
    #[error(display = "{}", message)]
    ForeignKeyViolation {
        table: &'static str,
        message: String,
    },
    #[error(display = "no row in {} with id {}", table, id)]
    NotFound { table: &'static str, id: String },
    #[error(display = "could not encode {} row: {}", table, message)]
    Encode {
        table: &'static str,
        message: String,
    },
    #[error(display = "could not decode {} row: {}", table, message)]
    Decode {
        table: &'static str,
        message: String,
    },
    #[error(display = "storage unavailable: {}", _0)]
    Unavailable(String),
    #[error(display = "database error: {}", _0)]
    Postgres(postgres::Error),
}

impl StorageError {
    pub fn is_unique_violation(&self) -> bool {
        match self {
            StorageError::UniqueViolation { .. } => true,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::NotFound { .. } => true,
            _ => false,
        }
    }

    fn from_postgres(table: &'static str, err: postgres::Error) -> Self {
        let code = err.code().map(|c| c.code().to_string());
        let message = err
            .as_db()
            .map(|db| db.message.clone())
            .unwrap_or_else(|| err.to_string());
        match code.as_ref().map(|c| c.as_str()) {
            Some(UNIQUE_VIOLATION) => StorageError::UniqueViolation { table, message },
            Some(FOREIGN_KEY_VIOLATION) => StorageError::ForeignKeyViolation { table, message },
            _ => StorageError::Postgres(err),
        }
    }
}

/// Row-level access to the named tables. Every call is a single statement
/// against the store; callers sequence multi-step writes themselves.
pub trait Storage {
    fn setup(&self) -> Result<(), StorageError>;
    fn insert<R: Record>(&self, record: &R) -> Result<R, StorageError>;
    fn insert_many<R: Record>(&self, records: &[R]) -> Result<Vec<R>, StorageError>;
    fn update<R: Record>(&self, record: &R) -> Result<R, StorageError>;
    fn load<R: Record>(&self, id: &Id<R>) -> Result<Option<R>, StorageError>;
    fn select<R: Record>(&self, filter: &Filter) -> Result<Vec<R>, StorageError>;
    fn delete<R: Record>(&self, id: &Id<R>) -> Result<(), StorageError>;
    fn delete_where<R: Record>(&self, filter: &Filter) -> Result<u64, StorageError>;
}

const SETUP_SQL: &str = include_str!("persistence.sql");

#[derive(Debug)]
pub struct RecordConnectionManager {
    pg: PostgresConnectionManager,
}

pub struct Records {
    connection: postgres::Connection,
}

impl RecordConnectionManager {
    pub fn new(pg: PostgresConnectionManager) -> Self {
        RecordConnectionManager { pg }
    }
}

impl ManageConnection for RecordConnectionManager {
    type Connection = Records;
    type Error = postgres::Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let connection = self.pg.connect()?;
        Ok(Records { connection })
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        self.pg.is_valid(&mut conn.connection)
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        self.pg.has_broken(&mut conn.connection)
    }
}

impl Records {
    pub fn get_ref(&self) -> &postgres::Connection {
        &self.connection
    }

    fn query_rows<R: Record>(
        &self,
        sql: &str,
        params: &[&dyn ToSql],
    ) -> Result<Vec<R>, StorageError> {
        trace!("{}: {}", R::TABLE, sql);
        let rows = self
            .connection
            .query(sql, params)
            .map_err(|e| StorageError::from_postgres(R::TABLE, e))?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            let json: Value = row
                .get_opt(0)
                .ok_or_else(|| StorageError::Decode {
                    table: R::TABLE,
                    message: "missing column in row".to_string(),
                })?
                .map_err(|e| StorageError::from_postgres(R::TABLE, e))?;
            out.push(from_row(json)?);
        }
        Ok(out)
    }

    fn execute<R: Record>(&self, sql: &str, params: &[&dyn ToSql]) -> Result<u64, StorageError> {
        trace!("{}: {}", R::TABLE, sql);
        self.connection
            .execute(sql, params)
            .map_err(|e| StorageError::from_postgres(R::TABLE, e))
    }
}

impl Storage for Records {
    fn setup(&self) -> Result<(), StorageError> {
        self.connection
            .batch_execute(SETUP_SQL)
            .map_err(StorageError::Postgres)
    }

    fn insert<R: Record>(&self, record: &R) -> Result<R, StorageError> {
        let row = to_row(record)?;
        let sql = format!(
            "INSERT INTO {table} AS r \
             SELECT * FROM jsonb_populate_record(NULL::{table}, $1::jsonb) \
             RETURNING to_jsonb(r)",
            table = R::TABLE
        );
        let mut inserted = self.query_rows::<R>(&sql, &[&row])?;
        debug!("Inserted into {}: {}", R::TABLE, record.id());
        inserted.pop().ok_or_else(|| StorageError::Decode {
            table: R::TABLE,
            message: "insert returned no row".to_string(),
        })
    }

    fn insert_many<R: Record>(&self, records: &[R]) -> Result<Vec<R>, StorageError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let rows = records.iter().map(to_row).collect::<Result<Vec<_>, _>>()?;
        let rows = Value::Array(rows);
        let sql = format!(
            "INSERT INTO {table} AS r \
             SELECT * FROM jsonb_populate_recordset(NULL::{table}, $1::jsonb) \
             RETURNING to_jsonb(r)",
            table = R::TABLE
        );
        let inserted = self.query_rows::<R>(&sql, &[&rows])?;
        debug!("Inserted {} rows into {}", inserted.len(), R::TABLE);
        Ok(inserted)
    }

    fn update<R: Record>(&self, record: &R) -> Result<R, StorageError> {
        let row = to_row(record)?;
        let columns = row
            .as_object()
            .map(|o| {
                o.keys()
                    .filter(|k| k.as_str() != "id")
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        if columns.is_empty() {
            return Err(StorageError::Encode {
                table: R::TABLE,
                message: "no columns to update".to_string(),
            });
        }
        let columns = columns.join(", ");
        let sql = format!(
            "UPDATE {table} AS r SET ({columns}) = \
             (SELECT {columns} FROM jsonb_populate_record(NULL::{table}, $2::jsonb)) \
             WHERE r.id = $1 \
             RETURNING to_jsonb(r)",
            table = R::TABLE,
            columns = columns
        );
        let id = record.id().to_string();
        let mut updated = self.query_rows::<R>(&sql, &[&id, &row])?;
        updated.pop().ok_or_else(|| StorageError::NotFound {
            table: R::TABLE,
            id,
        })
    }

    fn load<R: Record>(&self, id: &Id<R>) -> Result<Option<R>, StorageError> {
        let sql = format!(
            "SELECT to_jsonb(r) FROM {table} r WHERE r.id = $1",
            table = R::TABLE
        );
        let mut found = self.query_rows::<R>(&sql, &[&id.to_string()])?;
        Ok(found.pop())
    }

    fn select<R: Record>(&self, filter: &Filter) -> Result<Vec<R>, StorageError> {
        let sql = format!(
            "SELECT to_jsonb(r) FROM {table} r WHERE to_jsonb(r) @> $1::jsonb ORDER BY r.id",
            table = R::TABLE
        );
        self.query_rows::<R>(&sql, &[&filter.to_json()])
    }

    fn delete<R: Record>(&self, id: &Id<R>) -> Result<(), StorageError> {
        let sql = format!("DELETE FROM {table} WHERE id = $1", table = R::TABLE);
        let id = id.to_string();
        match self.execute::<R>(&sql, &[&id])? {
            0 => Err(StorageError::NotFound {
                table: R::TABLE,
                id,
            }),
            _ => Ok(()),
        }
    }

    fn delete_where<R: Record>(&self, filter: &Filter) -> Result<u64, StorageError> {
        let sql = format!(
            "DELETE FROM {table} r WHERE to_jsonb(r) @> $1::jsonb",
            table = R::TABLE
        );
        let nrows = self.execute::<R>(&sql, &[&filter.to_json()])?;
        debug!("Deleted {} rows from {}", nrows, R::TABLE);
        Ok(nrows)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ids::{Entity, IdGen};
    use r2d2::Pool;
    use r2d2_postgres::TlsMode;
    use serde::{Deserialize, Serialize};
    use std::env;

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

    fn pool(schema: &str) -> Pool<RecordConnectionManager> {
        let url = env::var("POSTGRES_URL").expect("$POSTGRES_URL");
        let manager = PostgresConnectionManager::new(&*url, TlsMode::None).expect("postgres");
        let pool = r2d2::Pool::builder()
            .max_size(2)
            .connection_customizer(Box::new(UseTempSchema(schema.to_string())))
            .build(RecordConnectionManager::new(manager))
            .expect("pool");
        let conn = pool.get().expect("temp connection");
        conn.get_ref()
            .batch_execute(&format!(
                "DROP SCHEMA \"{schema}\" CASCADE; CREATE SCHEMA \"{schema}\"; \
                 SET search_path TO \"{schema}\"",
                schema = schema
            ))
            .expect("reset schema");
        conn.setup().expect("setup");
        pool
    }

    #[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
    struct Category {
        id: Id<Category>,
        name: String,
        description: Option<String>,
        is_active: bool,
        created_at: String,
        updated_at: Option<String>,
    }
    impl Entity for Category {
        const PREFIX: &'static str = "category";
    }
    impl Record for Category {
        const TABLE: &'static str = "categories";
        fn id(&self) -> Id<Self> {
            self.id
        }
    }

    fn category(idgen: &IdGen, name: &str) -> Category {
        Category {
            id: idgen.generate(),
            name: name.to_string(),
            description: None,
            is_active: true,
            created_at: "2020-05-01T10:00:00Z".to_string(),
            updated_at: None,
        }
    }

    #[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
    struct Product {
        id: Id<Product>,
        name: String,
        description: Option<String>,
        category_id: Id<Category>,
        sku: Option<String>,
        price: Option<f64>,
        stock: Option<i32>,
        is_active: bool,
        created_at: String,
        updated_at: Option<String>,
    }
    impl Entity for Product {
        const PREFIX: &'static str = "product";
    }
    impl Record for Product {
        const TABLE: &'static str = "products";
        fn id(&self) -> Id<Self> {
            self.id
        }
    }

    #[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
    struct Variant {
        id: Id<Variant>,
        product_id: Id<Product>,
        name: String,
        price: Option<f64>,
        stock: Option<i32>,
        sku: Option<String>,
    }
    impl Entity for Variant {
        const PREFIX: &'static str = "variant";
    }
    impl Record for Variant {
        const TABLE: &'static str = "product_variants";
        fn id(&self) -> Id<Self> {
            self.id
        }
    }

    #[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
    struct Portion {
        id: Id<Portion>,
        product_id: Id<Product>,
        variant_id: Option<Id<Variant>>,
        name: String,
        description: Option<String>,
        serving_size: Option<String>,
        created_at: String,
        updated_at: Option<String>,
    }
    impl Entity for Portion {
        const PREFIX: &'static str = "portion";
    }
    impl Record for Portion {
        const TABLE: &'static str = "portion_controls";
        fn id(&self) -> Id<Self> {
            self.id
        }
    }

    fn portion(idgen: &IdGen, product: &Product, variant: Option<&Variant>) -> Portion {
        Portion {
            id: idgen.generate(),
            product_id: product.id,
            variant_id: variant.map(|v| v.id),
            name: format!("{} recipe", product.name),
            description: None,
            serving_size: None,
            created_at: "2020-05-01T10:00:00Z".to_string(),
            updated_at: None,
        }
    }

    #[test]
    #[ignore]
    fn insert_select_update_delete() {
        env_logger::try_init().unwrap_or_default();
        let pool = pool("insert_select_update_delete");
        let conn = pool.get().expect("connection");
        let idgen = IdGen::new();

        let coffee = conn.insert(&category(&idgen, "Coffee")).expect("insert");
        conn.insert(&category(&idgen, "Tea")).expect("insert");

        let found = conn
            .select::<Category>(&Filter::all().eq("name", "Coffee"))
            .expect("select");
        assert_eq!(found.iter().map(|c| c.id).collect::<Vec<_>>(), vec![coffee.id]);

        let mut renamed = coffee.clone();
        renamed.name = "Espresso bar".to_string();
        let updated = conn.update(&renamed).expect("update");
        assert_eq!(updated.name, "Espresso bar");

        conn.delete(&coffee.id).expect("delete");
        assert!(conn.load(&coffee.id).expect("load").is_none());
        let err = conn.delete(&coffee.id).expect_err("second delete");
        assert!(err.is_not_found(), "{:?}", err);
    }

    #[test]
    #[ignore]
    fn duplicate_primary_key_is_a_unique_violation() {
        env_logger::try_init().unwrap_or_default();
        let pool = pool("duplicate_primary_key_is_a_unique_violation");
        let conn = pool.get().expect("connection");
        let idgen = IdGen::new();

        let coffee = category(&idgen, "Coffee");
        conn.insert(&coffee).expect("insert");
        let err = conn.insert(&coffee).expect_err("duplicate");
        assert!(err.is_unique_violation(), "{:?}", err);
    }

    #[test]
    #[ignore]
    fn base_product_recipe_key_treats_null_variants_as_equal() {
        env_logger::try_init().unwrap_or_default();
        let pool = pool("base_product_recipe_key_treats_null_variants_as_equal");
        let conn = pool.get().expect("connection");
        let idgen = IdGen::new();

        let coffee = conn.insert(&category(&idgen, "Coffee")).expect("category");
        let latte = conn
            .insert(&Product {
                id: idgen.generate(),
                name: "Latte".to_string(),
                description: None,
                category_id: coffee.id,
                sku: None,
                price: Some(4.5),
                stock: None,
                is_active: true,
                created_at: "2020-05-01T10:00:00Z".to_string(),
                updated_at: None,
            })
            .expect("product");

        let base = conn.insert(&portion(&idgen, &latte, None)).expect("base recipe");
        let err = conn
            .insert(&portion(&idgen, &latte, None))
            .expect_err("second base recipe");
        assert!(err.is_unique_violation(), "{:?}", err);

        let large = conn
            .insert(&Variant {
                id: idgen.generate(),
                product_id: latte.id,
                name: "Large".to_string(),
                price: None,
                stock: None,
                sku: None,
            })
            .expect("variant");
        conn.insert(&portion(&idgen, &latte, Some(&large)))
            .expect("variant recipe");

        let found = conn
            .select::<Portion>(
                &Filter::all()
                    .eq("product_id", latte.id)
                    .maybe::<Id<Variant>>("variant_id", None),
            )
            .expect("select");
        assert_eq!(found.iter().map(|p| p.id).collect::<Vec<_>>(), vec![base.id]);
    }
}
