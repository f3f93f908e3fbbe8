//! Lazy result materialization.
//!
//! Rows are built on demand from the completed native result set: for each
//! column the type OID is resolved to a type name, the raw text value is
//! coerced by the [`DataTypeParser`], and the ordered name/value pairs are
//! handed to the [`RowFactory`]. Nothing is cached; re-iterating re-reads
//! the native set.

use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::native::{NativeResultSet, Oid};
use crate::row::{Row, RowFactory};
use crate::type_names::{TypeNameMap, builtin_type_name};
use crate::value::DataTypeParser;

/// Everything needed to turn a native row into a [`Row`].
#[derive(Clone)]
pub(crate) struct Materializer {
    pub(crate) row_factory: Rc<dyn RowFactory>,
    pub(crate) parser: Rc<dyn DataTypeParser>,
    pub(crate) type_names: Option<Rc<TypeNameMap>>,
}

impl Materializer {
    fn type_name(&self, oid: Oid) -> &str {
        if let Some(map) = &self.type_names {
            if let Some(name) = map.get(&oid) {
                return name;
            }
        }
        builtin_type_name(oid).unwrap_or("unknown")
    }

    fn row(&self, native: &dyn NativeResultSet, idx: usize) -> Result<Row> {
        let mut columns = Vec::with_capacity(native.num_fields());
        for col in 0..native.num_fields() {
            let name = native.field_name(col).to_string();
            let type_name = self.type_name(native.field_type_oid(col));
            let value = self.parser.parse(native.value(idx, col), type_name)?;
            columns.push((name, value));
        }
        Ok(self.row_factory.build(columns))
    }
}

/// A completed synchronous query's result set.
pub struct QueryResult {
    native: Box<dyn NativeResultSet>,
    ctx: Materializer,
}

impl QueryResult {
    pub(crate) fn new(native: Box<dyn NativeResultSet>, ctx: Materializer) -> Self {
        Self { native, ctx }
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.native.num_rows()
    }

    /// Number of columns.
    pub fn num_fields(&self) -> usize {
        self.native.num_fields()
    }

    /// Materialize the row at `idx`, `None` when out of range.
    pub fn row(&self, idx: usize) -> Option<Result<Row>> {
        (idx < self.num_rows()).then(|| self.ctx.row(self.native.as_ref(), idx))
    }

    /// Materialize the first row, if any.
    pub fn first(&self) -> Option<Result<Row>> {
        self.row(0)
    }

    /// Iterate the rows. Each call restarts from the first row and
    /// re-materializes.
    pub fn rows(&self) -> Rows<'_> {
        Rows {
            result: self,
            idx: 0,
        }
    }
}

// the materializer's trait objects have no Debug of their own
impl fmt::Debug for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryResult")
            .field("num_rows", &self.num_rows())
            .field("num_fields", &self.num_fields())
            .finish_non_exhaustive()
    }
}

/// Restartable row iterator over a [`QueryResult`].
pub struct Rows<'a> {
    result: &'a QueryResult,
    idx: usize,
}

impl Iterator for Rows<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.result.row(self.idx)?;
        self.idx += 1;
        Some(item)
    }
}

/// Completion state shared between a [`Connection`](crate::Connection) and
/// the [`AsyncResult`] it handed out.
pub(crate) enum AsyncState {
    Pending,
    Finished(Box<dyn NativeResultSet>),
}

/// A query dispatched but possibly not yet complete.
///
/// Row access fails with [`Error::ResultPending`] until the owning
/// connection's `wait_for_async_query` delivers the native result; after
/// that the handle behaves like [`QueryResult`].
pub struct AsyncResult {
    slot: Rc<RefCell<AsyncState>>,
    ctx: Materializer,
}

impl AsyncResult {
    pub(crate) fn new(slot: Rc<RefCell<AsyncState>>, ctx: Materializer) -> Self {
        Self { slot, ctx }
    }

    /// True once the native result has been delivered.
    pub fn is_finished(&self) -> bool {
        matches!(&*self.slot.borrow(), AsyncState::Finished(_))
    }

    fn native(&self) -> Result<Ref<'_, dyn NativeResultSet>> {
        Ref::filter_map(self.slot.borrow(), |state| match state {
            AsyncState::Finished(native) => Some(native.as_ref()),
            AsyncState::Pending => None,
        })
        .map_err(|_| Error::ResultPending)
    }

    /// Number of rows. Fails while the query is still in flight.
    pub fn num_rows(&self) -> Result<usize> {
        Ok(self.native()?.num_rows())
    }

    /// Number of columns. Fails while the query is still in flight.
    pub fn num_fields(&self) -> Result<usize> {
        Ok(self.native()?.num_fields())
    }

    /// Materialize the row at `idx`. Fails while the query is still in
    /// flight; `None` when out of range.
    pub fn row(&self, idx: usize) -> Result<Option<Row>> {
        let native = self.native()?;
        if idx >= native.num_rows() {
            return Ok(None);
        }
        self.ctx.row(&*native, idx).map(Some)
    }

    /// Iterate the rows. Fails while the query is still in flight; each
    /// successful call restarts from the first row.
    pub fn rows(&self) -> Result<AsyncRows<'_>> {
        let native = self.native()?;
        Ok(AsyncRows {
            native,
            ctx: &self.ctx,
            idx: 0,
        })
    }
}

impl fmt::Debug for AsyncResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncResult")
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}

/// Row iterator over a finished [`AsyncResult`].
pub struct AsyncRows<'a> {
    native: Ref<'a, dyn NativeResultSet>,
    ctx: &'a Materializer,
    idx: usize,
}

impl fmt::Debug for AsyncRows<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncRows")
            .field("idx", &self.idx)
            .finish_non_exhaustive()
    }
}

impl Iterator for AsyncRows<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.idx >= self.native.num_rows() {
            return None;
        }
        let row = self.ctx.row(&*self.native, self.idx);
        self.idx += 1;
        Some(row)
    }
}
