//! Composite value shapes carried inside message payloads.

/// A reference into static game content: `(class id, instance id)`.
///
/// On the wire the instance id is omitted when the class id is zero, so a
/// decoded null reference always has `instance == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DataRef {
    pub class: i32,
    pub instance: i32,
}

impl DataRef {
    pub const NULL: DataRef = DataRef {
        class: 0,
        instance: 0,
    };

    pub fn new(class: i32, instance: i32) -> Self {
        Self { class, instance }
    }

    pub fn is_null(&self) -> bool {
        self.class == 0
    }
}

/// A 64-bit identity split into a high and a low half, always written as two VarInts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LogicLong {
    pub high: i32,
    pub low: i32,
}

impl LogicLong {
    pub fn new(high: i32, low: i32) -> Self {
        Self { high, low }
    }
}

/// The closed set of value shapes the generic writer understands.
///
/// Messages that build payloads from heterogeneous field lists hand these to
/// [`ByteWriter::write_value`](crate::core::bytestream::ByteWriter::write_value).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireValue {
    Int(i32),
    VarInt(i32),
    Bool(bool),
    /// `None` writes the absent-string sentinel.
    Str(Option<String>),
    Ref(DataRef),
    Long(LogicLong),
    VarIntArray(Vec<i32>),
    Byte(u8),
}

impl From<i32> for WireValue {
    fn from(value: i32) -> Self {
        WireValue::Int(value)
    }
}

impl From<bool> for WireValue {
    fn from(value: bool) -> Self {
        WireValue::Bool(value)
    }
}

impl From<&str> for WireValue {
    fn from(value: &str) -> Self {
        WireValue::Str(Some(value.to_string()))
    }
}

impl From<Option<&str>> for WireValue {
    fn from(value: Option<&str>) -> Self {
        WireValue::Str(value.map(str::to_string))
    }
}

impl From<DataRef> for WireValue {
    fn from(value: DataRef) -> Self {
        WireValue::Ref(value)
    }
}

impl From<LogicLong> for WireValue {
    fn from(value: LogicLong) -> Self {
        WireValue::Long(value)
    }
}
