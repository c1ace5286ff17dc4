//! Scalar coercion between field values and typed values.
//!
//! Every value that crosses the record/SQL boundary travels as a
//! [`FieldValue`]: text for numbers and strings, raw bytes for blobs and
//! [`Marshal`] output. This module owns the two directions of that
//! conversion for each supported kind.

use std::borrow::Cow;
use std::fmt;

use crate::error::ConversionError;

/// The declared kind of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Text,
    Bytes,
    /// A type that serializes itself through [`Marshal`].
    Marshal,
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarKind::I8 => "int8",
            ScalarKind::I16 => "int16",
            ScalarKind::I32 => "int32",
            ScalarKind::I64 => "int64",
            ScalarKind::U8 => "uint8",
            ScalarKind::U16 => "uint16",
            ScalarKind::U32 => "uint32",
            ScalarKind::U64 => "uint64",
            ScalarKind::F32 => "float32",
            ScalarKind::F64 => "float64",
            ScalarKind::Text => "string",
            ScalarKind::Bytes => "bytes",
            ScalarKind::Marshal => "marshal",
        };
        f.write_str(name)
    }
}

/// One value of a field map.
///
/// Bytes are never reinterpreted: a `Bytes` value goes to the driver as a
/// blob and comes back byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Bytes(Vec<u8>),
}

impl FieldValue {
    /// Wraps bytes scanned from the driver, as text when they are UTF-8.
    pub fn from_raw(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => FieldValue::Text(text),
            Err(err) => FieldValue::Bytes(err.into_bytes()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            FieldValue::Text(text) => text.as_bytes(),
            FieldValue::Bytes(bytes) => bytes,
        }
    }

    /// The value as text, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            FieldValue::Bytes(bytes) => std::str::from_utf8(bytes).ok(),
        }
    }

    /// The value as text, or a [`ConversionError`] against `kind`.
    pub fn text_for(&self, kind: ScalarKind) -> Result<&str, ConversionError> {
        match self {
            FieldValue::Text(text) => Ok(text),
            FieldValue::Bytes(bytes) => std::str::from_utf8(bytes)
                .map_err(|e| ConversionError::new(self.lossy(), kind).with_source(e.into())),
        }
    }

    /// Lossy text rendering, for messages.
    pub fn lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }

    /// The statement parameter this value binds as.
    pub fn to_param(&self) -> Value {
        match self {
            FieldValue::Text(text) => Value::Text(text.clone()),
            FieldValue::Bytes(bytes) => Value::Blob(bytes.clone()),
        }
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(v: Vec<u8>) -> Self {
        FieldValue::Bytes(v)
    }
}

impl From<&[u8]> for FieldValue {
    fn from(v: &[u8]) -> Self {
        FieldValue::Bytes(v.to_vec())
    }
}

/// A typed scalar value
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Scalar {
    /// Parses `text` as the given kind.
    ///
    /// Numeric kinds reject anything that is not a valid literal for their
    /// width. Text and bytes never fail. [`ScalarKind::Marshal`] cannot be
    /// parsed without knowing the concrete type; see [`Marshal`].
    pub fn parse(text: &str, kind: ScalarKind) -> Result<Self, ConversionError> {
        fn num<T>(text: &str, kind: ScalarKind) -> Result<T, ConversionError>
        where
            T: std::str::FromStr,
            T::Err: std::error::Error + Send + Sync + 'static,
        {
            text.parse::<T>()
                .map_err(|e| ConversionError::new(text, kind).with_source(e.into()))
        }

        Ok(match kind {
            ScalarKind::I8 => Scalar::I8(num(text, kind)?),
            ScalarKind::I16 => Scalar::I16(num(text, kind)?),
            ScalarKind::I32 => Scalar::I32(num(text, kind)?),
            ScalarKind::I64 => Scalar::I64(num(text, kind)?),
            ScalarKind::U8 => Scalar::U8(num(text, kind)?),
            ScalarKind::U16 => Scalar::U16(num(text, kind)?),
            ScalarKind::U32 => Scalar::U32(num(text, kind)?),
            ScalarKind::U64 => Scalar::U64(num(text, kind)?),
            ScalarKind::F32 => Scalar::F32(num(text, kind)?),
            ScalarKind::F64 => Scalar::F64(num(text, kind)?),
            ScalarKind::Text => Scalar::Text(text.to_string()),
            ScalarKind::Bytes => Scalar::Bytes(text.as_bytes().to_vec()),
            ScalarKind::Marshal => return Err(ConversionError::new(text, kind)),
        })
    }

    /// Reads a field value as the given kind.
    ///
    /// Bytes are taken as-is; every other kind needs UTF-8 text.
    pub fn from_field(value: &FieldValue, kind: ScalarKind) -> Result<Self, ConversionError> {
        match kind {
            ScalarKind::Bytes => Ok(Scalar::Bytes(value.as_bytes().to_vec())),
            _ => Scalar::parse(value.text_for(kind)?, kind),
        }
    }

    /// The field value form: decimal text for numbers, raw bytes for blobs.
    pub fn to_field(&self) -> FieldValue {
        FieldValue::Text(match self {
            Scalar::I8(v) => v.to_string(),
            Scalar::I16(v) => v.to_string(),
            Scalar::I32(v) => v.to_string(),
            Scalar::I64(v) => v.to_string(),
            Scalar::U8(v) => v.to_string(),
            Scalar::U16(v) => v.to_string(),
            Scalar::U32(v) => v.to_string(),
            Scalar::U64(v) => v.to_string(),
            Scalar::F32(v) => v.to_string(),
            Scalar::F64(v) => v.to_string(),
            Scalar::Text(v) => v.clone(),
            Scalar::Bytes(v) => return FieldValue::Bytes(v.clone()),
        })
    }

    pub fn kind(&self) -> ScalarKind {
        match self {
            Scalar::I8(_) => ScalarKind::I8,
            Scalar::I16(_) => ScalarKind::I16,
            Scalar::I32(_) => ScalarKind::I32,
            Scalar::I64(_) => ScalarKind::I64,
            Scalar::U8(_) => ScalarKind::U8,
            Scalar::U16(_) => ScalarKind::U16,
            Scalar::U32(_) => ScalarKind::U32,
            Scalar::U64(_) => ScalarKind::U64,
            Scalar::F32(_) => ScalarKind::F32,
            Scalar::F64(_) => ScalarKind::F64,
            Scalar::Text(_) => ScalarKind::Text,
            Scalar::Bytes(_) => ScalarKind::Bytes,
        }
    }
}

/// Core value types bound as statement parameters
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A compound field type that stores itself as a byte blob.
///
/// Types opt in explicitly and are then wired into records with
/// [`marshal_column!`](crate::marshal_column).
pub trait Marshal: Sized {
    fn marshal(&self) -> anyhow::Result<Vec<u8>>;
    fn unmarshal(bytes: &[u8]) -> anyhow::Result<Self>;
}

/// Marshals a value through its [`Marshal`] impl into a byte field.
pub fn marshal_to_field<T: Marshal>(value: &T) -> Result<FieldValue, ConversionError> {
    value
        .marshal()
        .map(FieldValue::Bytes)
        .map_err(|e| ConversionError::new("", ScalarKind::Marshal).with_source(e))
}

/// Rebuilds a value from a field through its [`Marshal`] impl.
pub fn unmarshal_from_field<T: Marshal>(value: &FieldValue) -> Result<T, ConversionError> {
    T::unmarshal(value.as_bytes())
        .map_err(|e| ConversionError::new(value.lossy(), ScalarKind::Marshal).with_source(e))
}

/// A type that can be stored in a record field.
///
/// `to_field` returns `None` for an absent value, which the marshaler skips.
pub trait Column: Sized {
    const KIND: ScalarKind;

    fn to_field(&self) -> Result<Option<FieldValue>, ConversionError>;

    fn from_field(value: &FieldValue) -> Result<Self, ConversionError>;
}

macro_rules! scalar_column {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl Column for $ty {
                const KIND: ScalarKind = ScalarKind::$variant;

                fn to_field(&self) -> Result<Option<FieldValue>, ConversionError> {
                    Ok(Some(Scalar::$variant(self.clone()).to_field()))
                }

                fn from_field(value: &FieldValue) -> Result<Self, ConversionError> {
                    match Scalar::from_field(value, Self::KIND)? {
                        Scalar::$variant(v) => Ok(v),
                        _ => Err(ConversionError::new(value.lossy(), Self::KIND)),
                    }
                }
            }
        )*
    };
}

scalar_column! {
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    String => Text,
    Vec<u8> => Bytes,
}

impl<T: Column> Column for Option<T> {
    const KIND: ScalarKind = T::KIND;

    fn to_field(&self) -> Result<Option<FieldValue>, ConversionError> {
        match self {
            Some(v) => v.to_field(),
            None => Ok(None),
        }
    }

    fn from_field(value: &FieldValue) -> Result<Self, ConversionError> {
        T::from_field(value).map(Some)
    }
}

/// Implements [`Column`] for types that implement [`Marshal`].
#[macro_export]
macro_rules! marshal_column {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::scalar::Column for $ty {
                const KIND: $crate::scalar::ScalarKind = $crate::scalar::ScalarKind::Marshal;

                fn to_field(
                    &self,
                ) -> ::std::result::Result<
                    Option<$crate::scalar::FieldValue>,
                    $crate::ConversionError,
                > {
                    $crate::scalar::marshal_to_field(self).map(Some)
                }

                fn from_field(
                    value: &$crate::scalar::FieldValue,
                ) -> ::std::result::Result<Self, $crate::ConversionError> {
                    $crate::scalar::unmarshal_from_field(value)
                }
            }
        )*
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_width() {
        assert_eq!(Scalar::parse("-128", ScalarKind::I8).unwrap(), Scalar::I8(-128));
        assert_eq!(Scalar::parse("65535", ScalarKind::U16).unwrap(), Scalar::U16(65535));
        assert_eq!(
            Scalar::parse("18446744073709551615", ScalarKind::U64).unwrap(),
            Scalar::U64(u64::MAX)
        );
        assert_eq!(Scalar::parse("1.5", ScalarKind::F32).unwrap(), Scalar::F32(1.5));
        assert_eq!(Scalar::parse("7", ScalarKind::I16).unwrap().kind(), ScalarKind::I16);
        assert_eq!(
            Scalar::parse("abc", ScalarKind::Bytes).unwrap(),
            Scalar::Bytes(b"abc".to_vec())
        );
    }

    #[test]
    fn rejects_overflow_and_garbage() {
        assert!(Scalar::parse("128", ScalarKind::I8).is_err());
        assert!(Scalar::parse("-1", ScalarKind::U32).is_err());
        assert!(Scalar::parse("12x", ScalarKind::I64).is_err());
        assert!(Scalar::parse("", ScalarKind::F64).is_err());

        let err = Scalar::parse("300", ScalarKind::U8).unwrap_err();
        assert_eq!(err.kind, ScalarKind::U8);
        assert_eq!(err.text, "300");
        assert!(err.source.is_some());
    }

    #[test]
    fn text_never_fails() {
        for text in ["", "  spaced ", "ünïcode", "12"] {
            assert_eq!(
                Scalar::parse(text, ScalarKind::Text).unwrap(),
                Scalar::Text(text.to_string())
            );
        }
    }

    #[test]
    fn floats_format_without_exponent_loss() {
        assert_eq!(Scalar::F64(0.1).to_field(), FieldValue::from("0.1"));
        let field = Scalar::F64(1e-7).to_field();
        assert_eq!(f64::from_field(&field).unwrap(), 1e-7);
    }

    #[test]
    fn binary_bytes_pass_through_unchanged() {
        let raw = vec![0x00, 0xff, 0x10, 0xfe];
        let field = raw.to_field().unwrap().unwrap();
        assert_eq!(field, FieldValue::Bytes(raw.clone()));
        assert_eq!(field.to_param(), Value::Blob(raw.clone()));
        assert_eq!(<Vec<u8>>::from_field(&field).unwrap(), raw);

        let scanned = FieldValue::from_raw(raw.clone());
        assert_eq!(scanned.as_bytes(), raw.as_slice());
        assert_eq!(scanned.as_str(), None);
        assert_eq!(FieldValue::from_raw(b"ok".to_vec()), FieldValue::from("ok"));
    }

    #[test]
    fn numbers_and_strings_need_utf8() {
        let binary = FieldValue::Bytes(vec![0xff]);
        let err = String::from_field(&binary).unwrap_err();
        assert_eq!(err.kind, ScalarKind::Text);
        assert!(i32::from_field(&binary).is_err());

        let digits = FieldValue::Bytes(b"42".to_vec());
        assert_eq!(i32::from_field(&digits).unwrap(), 42);
    }

    #[test]
    fn option_column_skips_none() {
        let absent: Option<i32> = None;
        assert_eq!(absent.to_field().unwrap(), None);
        assert_eq!(Some(7i32).to_field().unwrap(), Some(FieldValue::from("7")));
        assert_eq!(<Option<i32>>::from_field(&"9".into()).unwrap(), Some(9));
        assert_eq!(<Option<i32> as Column>::KIND, ScalarKind::I32);
    }

    #[derive(Debug, PartialEq)]
    struct Point(i32, i32);

    impl Marshal for Point {
        fn marshal(&self) -> anyhow::Result<Vec<u8>> {
            Ok(format!("{},{}", self.0, self.1).into_bytes())
        }

        fn unmarshal(bytes: &[u8]) -> anyhow::Result<Self> {
            let text = std::str::from_utf8(bytes)?;
            let (x, y) = text
                .split_once(',')
                .ok_or_else(|| anyhow::anyhow!("missing comma"))?;
            Ok(Point(x.parse()?, y.parse()?))
        }
    }

    crate::marshal_column!(Point);

    #[test]
    fn marshal_column_delegates() {
        assert_eq!(Point::KIND, ScalarKind::Marshal);
        assert_eq!(
            Point(1, -2).to_field().unwrap(),
            Some(FieldValue::Bytes(b"1,-2".to_vec()))
        );
        assert_eq!(Point::from_field(&"3,4".into()).unwrap(), Point(3, 4));

        let err = Point::from_field(&"34".into()).unwrap_err();
        assert_eq!(err.kind, ScalarKind::Marshal);
        assert!(err.to_string().contains("missing comma"));
    }
}
