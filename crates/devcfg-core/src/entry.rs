//! Setting entries.
//!
//! An [`Entry`] describes one named, typed setting. The value itself lives in
//! a [`Setting`] handle owned by the module that declares the entry; the
//! registry only keeps a clone of that handle, so the declaring module can keep
//! reading the current value after registration without going through the
//! registry.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::{RegistryError, Result};
use crate::writer::{BoundedWriter, WriteError};

/// Maximum length of an entry key, in bytes.
pub const ENTRY_KEY_MAX_LEN: usize = 15;

/// Type tag of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    Float,
    Double,
    MultipleChoice,
    SingleChoice,
    Text,
    Password,
    Blob,
    Image,
}

impl EntryType {
    /// Signed or unsigned integer of any width.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            EntryType::I8
                | EntryType::U8
                | EntryType::I16
                | EntryType::U16
                | EntryType::I32
                | EntryType::U32
                | EntryType::I64
                | EntryType::U64
        )
    }

    /// Integer or floating point.
    pub fn is_numeric(self) -> bool {
        self.is_integer() || matches!(self, EntryType::Float | EntryType::Double)
    }
}

bitflags! {
    /// Access attributes of an entry, as seen from the config portal.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Attributes: u32 {
        /// The portal may show the current value.
        const READ = 0b0000_0001;
        /// The portal may change the value.
        const WRITE = 0b0000_0010;
        /// Both of the above.
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

/// Shared handle to the storage behind a setting.
///
/// Cloning the handle does not copy the value; every clone sees the same
/// storage.
pub struct Setting<T>(Arc<RwLock<T>>);

impl<T> Setting<T> {
    /// Create a handle holding `value`.
    pub fn new(value: T) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    /// Replace the stored value.
    pub fn set(&self, value: T) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = value;
    }

    /// Run `f` with a reference to the stored value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.0.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Whether two handles point at the same storage.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: Clone> Setting<T> {
    /// Copy of the stored value.
    pub fn get(&self) -> T {
        self.with(T::clone)
    }
}

impl<T> Clone for Setting<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: Default> Default for Setting<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Setting<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with(|value| f.debug_tuple("Setting").field(value).finish())
    }
}

/// Text storage with a fixed maximum length in bytes.
#[derive(Debug, Clone)]
pub struct TextSetting {
    value: Setting<String>,
    max_len: usize,
}

impl TextSetting {
    /// Create a text setting. `initial` is truncated to `max_len` bytes on a
    /// character boundary.
    pub fn new(initial: impl Into<String>, max_len: usize) -> Self {
        let mut initial = initial.into();
        truncate_to_boundary(&mut initial, max_len);
        Self {
            value: Setting::new(initial),
            max_len,
        }
    }

    /// Copy of the current text.
    pub fn get(&self) -> String {
        self.value.get()
    }

    /// Replace the text. Fails if `text` is longer than the declared maximum.
    pub fn set(&self, text: &str) -> std::result::Result<(), usize> {
        if text.len() > self.max_len {
            return Err(self.max_len);
        }
        self.value.set(text.to_string());
        Ok(())
    }

    /// Maximum length in bytes.
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Whether the current text is empty.
    pub fn is_empty(&self) -> bool {
        self.value.with(String::is_empty)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.value.ptr_eq(&other.value)
    }
}

fn truncate_to_boundary(text: &mut String, max_len: usize) {
    if text.len() > max_len {
        let mut end = max_len;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
}

/// The backing storage of an entry.
#[derive(Debug, Clone)]
pub enum Backing {
    I8(Setting<i8>),
    U8(Setting<u8>),
    I16(Setting<i16>),
    U16(Setting<u16>),
    I32(Setting<i32>),
    U32(Setting<u32>),
    I64(Setting<i64>),
    U64(Setting<u64>),
    F32(Setting<f32>),
    F64(Setting<f64>),
    Text(TextSetting),
    Bytes(Setting<Vec<u8>>),
}

impl Backing {
    /// Short name of the stored representation, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Backing::I8(_) => "i8",
            Backing::U8(_) => "u8",
            Backing::I16(_) => "i16",
            Backing::U16(_) => "u16",
            Backing::I32(_) => "i32",
            Backing::U32(_) => "u32",
            Backing::I64(_) => "i64",
            Backing::U64(_) => "u64",
            Backing::F32(_) => "f32",
            Backing::F64(_) => "f64",
            Backing::Text(_) => "text",
            Backing::Bytes(_) => "bytes",
        }
    }

    /// Whether this backing can hold values of `entry_type`.
    pub fn accepts(&self, entry_type: EntryType) -> bool {
        matches!(
            (self, entry_type),
            (Backing::I8(_), EntryType::I8)
                | (Backing::U8(_), EntryType::U8 | EntryType::SingleChoice)
                | (Backing::I16(_), EntryType::I16)
                | (Backing::U16(_), EntryType::U16)
                | (Backing::I32(_), EntryType::I32)
                | (Backing::U32(_), EntryType::U32 | EntryType::MultipleChoice)
                | (Backing::I64(_), EntryType::I64)
                | (Backing::U64(_), EntryType::U64)
                | (Backing::F32(_), EntryType::Float)
                | (Backing::F64(_), EntryType::Double)
                | (Backing::Text(_), EntryType::Text | EntryType::Password)
                | (Backing::Bytes(_), EntryType::Blob | EntryType::Image)
        )
    }

    /// Snapshot of the current value.
    pub fn get(&self) -> Value {
        match self {
            Backing::I8(s) => Value::I8(s.get()),
            Backing::U8(s) => Value::U8(s.get()),
            Backing::I16(s) => Value::I16(s.get()),
            Backing::U16(s) => Value::U16(s.get()),
            Backing::I32(s) => Value::I32(s.get()),
            Backing::U32(s) => Value::U32(s.get()),
            Backing::I64(s) => Value::I64(s.get()),
            Backing::U64(s) => Value::U64(s.get()),
            Backing::F32(s) => Value::F32(s.get()),
            Backing::F64(s) => Value::F64(s.get()),
            Backing::Text(s) => Value::Text(s.get()),
            Backing::Bytes(s) => Value::Bytes(s.get()),
        }
    }

    /// Whether `value` has the shape this backing stores.
    pub fn matches(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Backing::I8(_), Value::I8(_))
                | (Backing::U8(_), Value::U8(_))
                | (Backing::I16(_), Value::I16(_))
                | (Backing::U16(_), Value::U16(_))
                | (Backing::I32(_), Value::I32(_))
                | (Backing::U32(_), Value::U32(_))
                | (Backing::I64(_), Value::I64(_))
                | (Backing::U64(_), Value::U64(_))
                | (Backing::F32(_), Value::F32(_))
                | (Backing::F64(_), Value::F64(_))
                | (Backing::Text(_), Value::Text(_))
                | (Backing::Bytes(_), Value::Bytes(_))
        )
    }
}

/// An owned value of one of the backing shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Text(String),
    Bytes(Vec<u8>),
}

macro_rules! impl_conversions {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }

            impl From<Setting<$ty>> for Backing {
                fn from(s: Setting<$ty>) -> Self {
                    Backing::$variant(s)
                }
            }
        )*
    };
}

impl_conversions! {
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    Vec<u8> => Bytes,
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

impl From<TextSetting> for Backing {
    fn from(s: TextSetting) -> Self {
        Backing::Text(s)
    }
}

/// Per-entry string conversion and form rendering.
///
/// Every method has a default driven by the entry's type; implementors
/// override only what they need.
pub trait EntryCodec: Send + Sync {
    /// Render the current value as a string.
    fn to_string(&self, entry: &Entry) -> Result<String> {
        codec::default_to_string(entry)
    }

    /// Parse `source` and store it as the new value.
    fn from_string(&self, entry: &Entry, source: &str) -> Result<()> {
        codec::default_from_string(entry, source)
    }

    /// Render a custom form widget. `None` means the portal's default widget
    /// is used.
    fn render_widget(
        &self,
        entry: &Entry,
        out: &mut BoundedWriter,
    ) -> Option<std::result::Result<(), WriteError>> {
        None
    }
}

/// The type-driven codec bound to entries registered without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCodec;

impl EntryCodec for DefaultCodec {}

/// A named, typed setting.
#[derive(Clone)]
pub struct Entry {
    key: String,
    friendly: String,
    entry_type: EntryType,
    value: Backing,
    default_value: Value,
    attributes: Attributes,
    codec: Option<Arc<dyn EntryCodec>>,
}

impl Entry {
    /// Describe a setting backed by `value`, readable and writable, with no
    /// custom codec.
    pub fn new(
        key: impl Into<String>,
        friendly: impl Into<String>,
        entry_type: EntryType,
        value: impl Into<Backing>,
        default_value: impl Into<Value>,
    ) -> Self {
        Self {
            key: key.into(),
            friendly: friendly.into(),
            entry_type,
            value: value.into(),
            default_value: default_value.into(),
            attributes: Attributes::READ_WRITE,
            codec: None,
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn EntryCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn friendly(&self) -> &str {
        &self.friendly
    }

    pub fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    pub fn attributes(&self) -> Attributes {
        self.attributes
    }

    pub fn is_readable(&self) -> bool {
        self.attributes.contains(Attributes::READ)
    }

    pub fn is_writable(&self) -> bool {
        self.attributes.contains(Attributes::WRITE)
    }

    pub fn backing(&self) -> &Backing {
        &self.value
    }

    pub fn default_value(&self) -> &Value {
        &self.default_value
    }

    /// Snapshot of the current value.
    pub fn value(&self) -> Value {
        self.value.get()
    }

    /// Store `value` into the backing storage.
    pub fn set_value(&self, value: Value) -> Result<()> {
        match (&self.value, value) {
            (Backing::I8(s), Value::I8(v)) => s.set(v),
            (Backing::U8(s), Value::U8(v)) => s.set(v),
            (Backing::I16(s), Value::I16(v)) => s.set(v),
            (Backing::U16(s), Value::U16(v)) => s.set(v),
            (Backing::I32(s), Value::I32(v)) => s.set(v),
            (Backing::U32(s), Value::U32(v)) => s.set(v),
            (Backing::I64(s), Value::I64(v)) => s.set(v),
            (Backing::U64(s), Value::U64(v)) => s.set(v),
            (Backing::F32(s), Value::F32(v)) => s.set(v),
            (Backing::F64(s), Value::F64(v)) => s.set(v),
            (Backing::Bytes(s), Value::Bytes(v)) => s.set(v),
            (Backing::Text(s), Value::Text(v)) => s.set(&v).map_err(|max| {
                RegistryError::InvalidArgument(format!(
                    "value for `{}` is {} bytes, maximum is {}",
                    self.key,
                    v.len(),
                    max
                ))
            })?,
            (backing, value) => {
                return Err(RegistryError::InvalidArgument(format!(
                    "cannot store {:?} into `{}` ({} backing)",
                    value,
                    self.key,
                    backing.kind_name()
                )))
            }
        }
        Ok(())
    }

    /// Copy the default value into the backing storage.
    pub fn reset_to_default(&self) -> Result<()> {
        self.set_value(self.default_value.clone())
    }

    /// Whether a codec (custom or default) has been bound.
    pub fn has_codec(&self) -> bool {
        self.codec.is_some()
    }

    pub(crate) fn bind_default_codec(&mut self) {
        if self.codec.is_none() {
            self.codec = Some(Arc::new(DefaultCodec));
        }
    }

    /// Render the current value through the entry's codec.
    pub fn serialize(&self) -> Result<String> {
        match &self.codec {
            Some(codec) => codec.to_string(self),
            None => codec::default_to_string(self),
        }
    }

    /// Parse `source` through the entry's codec and store the result.
    pub fn deserialize(&self, source: &str) -> Result<()> {
        match &self.codec {
            Some(codec) => codec.from_string(self, source),
            None => codec::default_from_string(self, source),
        }
    }

    /// Custom form widget, if the entry's codec provides one.
    pub fn render_widget(
        &self,
        out: &mut BoundedWriter,
    ) -> Option<std::result::Result<(), WriteError>> {
        self.codec.as_ref()?.render_widget(self, out)
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("key", &self.key)
            .field("friendly", &self.friendly)
            .field("entry_type", &self.entry_type)
            .field("attributes", &self.attributes)
            .field("has_codec", &self.codec.is_some())
            .finish()
    }
}

/// Check an entry before it is registered or serialized.
pub fn validate_entry(entry: &Entry) -> Result<()> {
    if entry.key.is_empty() {
        return Err(RegistryError::InvalidArgument("entry key is empty".into()));
    }
    if entry.key.len() > ENTRY_KEY_MAX_LEN {
        return Err(RegistryError::InvalidArgument(format!(
            "entry key `{}` is longer than {} bytes",
            entry.key, ENTRY_KEY_MAX_LEN
        )));
    }
    if entry.friendly.is_empty() {
        return Err(RegistryError::InvalidArgument(format!(
            "entry `{}` has no friendly name",
            entry.key
        )));
    }
    if !entry.value.accepts(entry.entry_type) {
        return Err(RegistryError::InvalidArgument(format!(
            "entry `{}` is declared {:?} but backed by {}",
            entry.key,
            entry.entry_type,
            entry.value.kind_name()
        )));
    }
    if !entry.value.matches(&entry.default_value) {
        return Err(RegistryError::InvalidArgument(format!(
            "default value of `{}` does not match its {} backing",
            entry.key,
            entry.value.kind_name()
        )));
    }
    if let (Backing::Text(text), Value::Text(default)) = (&entry.value, &entry.default_value) {
        if default.len() > text.max_len() {
            return Err(RegistryError::InvalidArgument(format!(
                "default value of `{}` is longer than {} bytes",
                entry.key,
                text.max_len()
            )));
        }
    }
    Ok(())
}
