//! Record marshaling between typed records, loose maps and field maps.
//!
//! A typed record describes its fields once through a [`RecordDescriptor`]
//! (usually generated by [`record!`](crate::record)). Loose maps are plain
//! `column -> value` maps that are passed through as-is.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::{ConversionError, Error, Result};
use crate::scalar::{Column, FieldValue, ScalarKind};

/// Column tag that excludes a field from marshaling.
pub const IGNORE_COLUMN: &str = "-";

/// Ordered `column -> value` pairs.
///
/// Iteration order is insertion order, which is the order columns and
/// parameters are emitted in statements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    entries: Vec<(String, FieldValue)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.entries
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v)
    }

    /// The value of `column` when it is UTF-8 text.
    pub fn text(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(FieldValue::as_str)
    }

    pub fn contains_key(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    /// Inserts a value, replacing an existing entry for the same column in place.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<FieldValue>) {
        let column = column.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(c, _)| *c == column) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((column, value)),
        }
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(c, v)| (c.as_str(), v))
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(c, _)| c.as_str())
    }

    /// Keeps only the named columns, preserving this map's order.
    pub fn select<S: AsRef<str>>(&self, columns: &[S]) -> FieldMap {
        self.entries
            .iter()
            .filter(|(c, _)| columns.iter().any(|wanted| wanted.as_ref() == c))
            .cloned()
            .collect()
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = FieldMap::new();
        for (column, value) in iter {
            map.insert(column, value);
        }
        map
    }
}

impl IntoIterator for FieldMap {
    type Item = (String, FieldValue);
    type IntoIter = std::vec::IntoIter<(String, FieldValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<V: Into<FieldValue>> From<BTreeMap<String, V>> for FieldMap {
    fn from(map: BTreeMap<String, V>) -> Self {
        map.into_iter().collect()
    }
}

/// Hash maps have no order of their own; columns are sorted by name.
impl<V: Into<FieldValue>> From<HashMap<String, V>> for FieldMap {
    fn from(map: HashMap<String, V>) -> Self {
        map.into_iter().collect::<BTreeMap<_, _>>().into()
    }
}

type ReadFn<R> = Box<dyn Fn(&R) -> Result<Option<FieldValue>, ConversionError> + Send + Sync>;
type WriteFn<R> = Box<dyn Fn(&mut R, &FieldValue) -> Result<(), ConversionError> + Send + Sync>;

/// One field of a typed record.
pub struct FieldDescriptor<R> {
    pub name: &'static str,
    pub column: &'static str,
    pub kind: ScalarKind,
    read: ReadFn<R>,
    write: WriteFn<R>,
}

impl<R: 'static> FieldDescriptor<R> {
    /// Describes a field through a pair of accessors.
    pub fn new<T: Column + 'static>(
        name: &'static str,
        column: &'static str,
        get: fn(&R) -> &T,
        get_mut: fn(&mut R) -> &mut T,
    ) -> Self {
        Self {
            name,
            column,
            kind: T::KIND,
            read: Box::new(move |record: &R| get(record).to_field()),
            write: Box::new(move |record: &mut R, value: &FieldValue| {
                *get_mut(record) = T::from_field(value)?;
                Ok(())
            }),
        }
    }
}

impl<R> FieldDescriptor<R> {
    /// Whether the field takes part in marshaling.
    pub fn is_tagged(&self) -> bool {
        !self.column.is_empty() && self.column != IGNORE_COLUMN
    }
}

impl<R> fmt::Debug for FieldDescriptor<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("column", &self.column)
            .field("kind", &self.kind)
            .finish()
    }
}

/// The field table of a typed record, built once per type.
#[derive(Debug)]
pub struct RecordDescriptor<R> {
    pub name: &'static str,
    fields: Vec<FieldDescriptor<R>>,
}

impl<R> RecordDescriptor<R> {
    pub fn new(name: &'static str, fields: Vec<FieldDescriptor<R>>) -> Self {
        Self { name, fields }
    }

    pub fn fields(&self) -> &[FieldDescriptor<R>] {
        &self.fields
    }

    pub fn tagged_fields(&self) -> impl Iterator<Item = &FieldDescriptor<R>> {
        self.fields.iter().filter(|f| f.is_tagged())
    }

    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.tagged_fields().map(|f| f.column)
    }
}

/// A struct with a static field table.
///
/// Implemented through [`record!`](crate::record).
pub trait Record: Sized + 'static {
    fn descriptor() -> &'static RecordDescriptor<Self>;
}

/// Object-safe view of a [`Record`] used by [`RecordRef`].
pub trait TypedRecord {
    fn record_name(&self) -> &'static str;

    fn field_map(&self) -> Result<FieldMap>;
}

impl<R: Record> TypedRecord for R {
    fn record_name(&self) -> &'static str {
        R::descriptor().name
    }

    fn field_map(&self) -> Result<FieldMap> {
        let descriptor = R::descriptor();
        let mut map = FieldMap::with_capacity(descriptor.fields.len());
        let mut tagged = 0usize;
        for field in descriptor.tagged_fields() {
            tagged += 1;
            if let Some(value) = (field.read)(self)? {
                map.insert(field.column, value);
            }
        }
        if tagged == 0 {
            return Err(Error::reflection(format!(
                "{} has no tagged fields",
                descriptor.name
            )));
        }
        Ok(map)
    }
}

/// Either a typed record or a loose `column -> value` map.
pub enum RecordRef<'a> {
    Typed(&'a dyn TypedRecord),
    Loose(FieldMap),
}

impl fmt::Debug for RecordRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordRef::Typed(record) => f
                .debug_tuple("Typed")
                .field(&record.record_name())
                .finish(),
            RecordRef::Loose(map) => f.debug_tuple("Loose").field(map).finish(),
        }
    }
}

impl<'a, R: Record> From<&'a R> for RecordRef<'a> {
    fn from(record: &'a R) -> Self {
        RecordRef::Typed(record)
    }
}

impl<'a> From<&'a FieldMap> for RecordRef<'a> {
    fn from(map: &'a FieldMap) -> Self {
        RecordRef::Loose(map.clone())
    }
}

impl<'a, V: Into<FieldValue> + Clone> From<&'a HashMap<String, V>> for RecordRef<'a> {
    fn from(map: &'a HashMap<String, V>) -> Self {
        RecordRef::Loose(map.clone().into())
    }
}

impl<'a, V: Into<FieldValue> + Clone> From<&'a BTreeMap<String, V>> for RecordRef<'a> {
    fn from(map: &'a BTreeMap<String, V>) -> Self {
        RecordRef::Loose(map.clone().into())
    }
}

/// Converts a record into its field map.
///
/// Absent (`None`) fields are skipped. Loose maps are returned unchanged,
/// including when empty; the statement builders reject empty maps.
pub fn to_field_map<'a>(record: impl Into<RecordRef<'a>>) -> Result<FieldMap> {
    match record.into() {
        RecordRef::Typed(record) => record.field_map(),
        RecordRef::Loose(map) => Ok(map),
    }
}

/// Converts every record of a non-empty slice.
pub fn to_field_map_list<'a, T: 'a>(records: &'a [T]) -> Result<Vec<FieldMap>>
where
    &'a T: Into<RecordRef<'a>>,
{
    if records.is_empty() {
        return Err(Error::reflection("record list is empty"));
    }
    records.iter().map(|record| to_field_map(record)).collect()
}

/// Populates `record` from a field map.
///
/// Only tagged fields whose column is present are written; the rest keep
/// their current value.
pub fn from_field_map<R: Record>(map: &FieldMap, record: &mut R) -> Result<()> {
    let descriptor = R::descriptor();
    let mut tagged = 0usize;
    for field in descriptor.tagged_fields() {
        tagged += 1;
        if let Some(value) = map.get(field.column) {
            (field.write)(&mut *record, value)?;
        }
    }
    if tagged == 0 {
        return Err(Error::reflection(format!(
            "{} has no tagged fields",
            descriptor.name
        )));
    }
    Ok(())
}

/// Implements [`Record`] for a struct by listing its columns.
///
/// Fields that are not listed, or are tagged `"-"`, are never marshaled.
/// A `"-"` field may have any type.
///
/// ```
/// use std::collections::HashMap;
///
/// #[derive(Debug, Default)]
/// struct User {
///     id: i64,
///     name: String,
///     age: Option<u8>,
///     cache: HashMap<String, u32>,
/// }
///
/// rust_sqlmap::record!(User {
///     id => "id",
///     name => "name",
///     age => "age",
///     cache => "-",
/// });
///
/// let user = User { id: 1, name: "ann".into(), ..User::default() };
/// let map = rust_sqlmap::to_field_map(&user).unwrap();
/// assert_eq!(map.len(), 2);
/// ```
#[macro_export]
macro_rules! record {
    (@fields $ty:ident [$($acc:tt)*] $field:ident => "-" $(, $($rest:tt)*)?) => {
        $crate::record!(@fields $ty [$($acc)*] $($($rest)*)?);
    };
    (@fields $ty:ident [$($acc:tt)*] $field:ident => $column:literal $(, $($rest:tt)*)?) => {
        $crate::record!(@fields $ty [$($acc)* ($field => $column)] $($($rest)*)?);
    };
    (@fields $ty:ident [$(($field:ident => $column:literal))*]) => {
        impl $crate::record::Record for $ty {
            fn descriptor() -> &'static $crate::record::RecordDescriptor<Self> {
                static DESCRIPTOR: ::std::sync::OnceLock<$crate::record::RecordDescriptor<$ty>> =
                    ::std::sync::OnceLock::new();
                DESCRIPTOR.get_or_init(|| {
                    $crate::record::RecordDescriptor::new(
                        stringify!($ty),
                        vec![
                            $(
                                $crate::record::FieldDescriptor::new(
                                    stringify!($field),
                                    $column,
                                    |r: &$ty| &r.$field,
                                    |r: &mut $ty| &mut r.$field,
                                ),
                            )*
                        ],
                    )
                })
            }
        }
    };
    ($ty:ident { $($body:tt)* }) => {
        $crate::record!(@fields $ty [] $($body)*);
    };
}
