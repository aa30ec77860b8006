//! Column access for entity and projection decoding.

use crate::error::RepoResult;
use crate::model::entity::{EntityId, EntityMeta};
use crate::model::reference::SessionHandle;
use rusqlite::types::{FromSql, Value};
use rusqlite::Row;

/// Reads named columns from one result row.
///
/// Columns selected through a fetch join are aliased `"<relation>.<column>"`;
/// [`RowReader::nested`] returns a reader scoped to that prefix.
pub struct RowReader<'r, 'stmt> {
    row: &'r Row<'stmt>,
    prefix: String,
    session: SessionHandle,
}

impl<'r, 'stmt> RowReader<'r, 'stmt> {
    pub(crate) fn new(row: &'r Row<'stmt>, session: SessionHandle) -> Self {
        Self {
            row,
            prefix: String::new(),
            session,
        }
    }

    /// Reads one column, relative to this reader's prefix.
    pub fn get<T: FromSql>(&self, column: &str) -> RepoResult<T> {
        let name = self.qualified(column);
        Ok(self.row.get(name.as_str())?)
    }

    /// Reads one identifier column.
    pub fn id<I: EntityId>(&self, column: &str) -> RepoResult<I> {
        I::from_value(self.get::<Value>(column)?)
    }

    /// Returns a reader over a fetch-joined relation, or `None` when the
    /// relation was not fetched or the joined row is absent.
    pub fn nested(
        &self,
        relation: &str,
        target: &'static EntityMeta,
    ) -> RepoResult<Option<RowReader<'r, 'stmt>>> {
        let prefix = format!("{}{relation}.", self.prefix);
        let id_column = format!("{prefix}{}", target.id_column);
        if self.row.as_ref().column_index(id_column.as_str()).is_err() {
            return Ok(None);
        }
        if self.row.get::<_, Value>(id_column.as_str())? == Value::Null {
            return Ok(None);
        }
        Ok(Some(RowReader {
            row: self.row,
            prefix,
            session: self.session.clone(),
        }))
    }

    /// Session that lazy references decoded from this row are bound to.
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    fn qualified(&self, column: &str) -> String {
        format!("{}{column}", self.prefix)
    }
}
