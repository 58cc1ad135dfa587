//! Database transaction utilities
//!
//! Domain functions use sqlx's generic Executor trait so they accept both
//! `&PgPool` and `&mut PgConnection` (transactions):
//!
//! ```ignore
//! use sqlx::{Executor, Postgres};
//!
//! pub async fn my_query<'e, E>(executor: E, id: Uuid) -> Result<MyType, sqlx::Error>
//! where
//!     E: Executor<'e, Database = Postgres>,
//! {
//!     sqlx::query_as("SELECT * FROM my_table WHERE id = $1")
//!         .bind(id)
//!         .fetch_one(executor)
//!         .await
//! }
//! ```
//!
//! Routes own the transaction boundaries:
//!
//! ```ignore
//! let mut tx = state.db.begin().await.or_internal("begin tx")?;
//! domain::do_something(&mut *tx, ...).await.or_internal("step one")?;
//! domain::do_another_thing(&mut *tx, ...).await.or_internal("step two")?;
//! tx.commit().await.or_internal("commit tx")?;
//! ```

#[allow(unused_imports)]
pub use sqlx::{Executor, Postgres};
