/*!
 * Helper Wire Protocol
 * Length-prefixed JSON frames between the host and the helper process
 *
 * Each frame is a big-endian `u32` byte length followed by one JSON
 * document. Binary views travel as explicit `{typedArrayTag, elementType,
 * bytes}` boxes so the element type is rebuilt exactly on the far side.
 */

use crate::core::errors::{ErrorPayload, RuntimeResult};
use crate::core::limits::MAX_FRAME_BYTES;
use crate::core::types::{CallId, ScalarType, Value};
use crate::ffi::BindingDescriptor;
use crate::isolation::types::IsolationError;
use crate::memory::{AllocOptions, MemoryResult, NativeBuffer, NativePointer, TypedArray, ViewData};
use crate::security::SafetyMetadata;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Host to helper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireRequest {
    Ping { id: CallId },
    Call(CallRequest),
}

impl WireRequest {
    pub fn id(&self) -> CallId {
        match self {
            Self::Ping { id } => *id,
            Self::Call(call) => call.id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    pub id: CallId,
    pub library_path: String,
    pub binding_descriptor: BindingDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety: Option<SafetyMetadata>,
    #[serde(rename = "fn")]
    pub fn_name: String,
    #[serde(default)]
    pub args: Vec<WireArg>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callsite: Option<String>,
}

/// Helper to host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireResponse {
    pub id: CallId,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<WireArg>,
    /// Post-call contents of binary arguments, by position
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<Option<WireArg>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl WireResponse {
    pub fn pong(id: CallId) -> Self {
        Self {
            id,
            ok: true,
            result: None,
            args: None,
            error: None,
        }
    }

    pub fn success(id: CallId, result: WireArg, args: Vec<Option<WireArg>>) -> Self {
        Self {
            id,
            ok: true,
            result: Some(result),
            args: if args.iter().any(Option::is_some) { Some(args) } else { None },
            error: None,
        }
    }

    pub fn failure(id: CallId, error: ErrorPayload) -> Self {
        Self {
            id,
            ok: false,
            result: None,
            args: None,
            error: Some(error),
        }
    }
}

/// One argument or result on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireArg {
    Boxed(BoxedView),
    Value(WireValue),
}

/// Raw byte copy of a typed view or buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxedView {
    pub typed_array_tag: bool,
    pub element_type: ScalarType,
    pub bytes: Vec<u8>,
    /// Revived as a `NativeBuffer` rather than a typed view
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub buffer: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum WireValue {
    Void,
    Null,
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(#[serde(with = "wire_float::single")] f32),
    F64(#[serde(with = "wire_float")] f64),
    Str(String),
    Array(#[serde(with = "wire_float::seq")] Vec<f64>),
    Pointer(NativePointer),
    Rows(Vec<WireArg>),
}

/// JSON has no NaN or infinities; those travel as "NaN", "Infinity" and "-Infinity"
mod wire_float {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Named(String),
    }

    fn to_repr(value: f64) -> Repr {
        if value.is_nan() {
            Repr::Named("NaN".into())
        } else if value.is_infinite() {
            Repr::Named(if value > 0.0 { "Infinity" } else { "-Infinity" }.into())
        } else {
            Repr::Number(value)
        }
    }

    fn from_repr<E: serde::de::Error>(repr: Repr) -> Result<f64, E> {
        match repr {
            Repr::Number(value) => Ok(value),
            Repr::Named(name) => match name.as_str() {
                "NaN" => Ok(f64::NAN),
                "Infinity" => Ok(f64::INFINITY),
                "-Infinity" => Ok(f64::NEG_INFINITY),
                other => Err(E::custom(format!("invalid float {:?}", other))),
            },
        }
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        to_repr(*value).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        from_repr(Repr::deserialize(deserializer)?)
    }

    pub mod single {
        use super::*;

        pub fn serialize<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
            to_repr(f64::from(*value)).serialize(serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
            from_repr(Repr::deserialize(deserializer)?).map(|v| v as f32)
        }
    }

    pub mod seq {
        use super::*;

        pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
            serializer.collect_seq(values.iter().map(|v| to_repr(*v)))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
            Vec::<Repr>::deserialize(deserializer)?
                .into_iter()
                .map(from_repr::<D::Error>)
                .collect()
        }
    }
}

/// Serialize a value for the wire; binary views are boxed by copy
pub fn to_wire(value: &Value) -> MemoryResult<WireArg> {
    let wire = match value {
        Value::View(view) => {
            return Ok(WireArg::Boxed(BoxedView {
                typed_array_tag: true,
                element_type: view.element_type(),
                bytes: view.to_bytes(),
                buffer: false,
            }))
        }
        Value::Buffer(buffer) => {
            return Ok(WireArg::Boxed(BoxedView {
                typed_array_tag: true,
                element_type: ScalarType::U8,
                bytes: buffer.to_vec()?,
                buffer: true,
            }))
        }
        Value::Void => WireValue::Void,
        Value::Null => WireValue::Null,
        Value::I8(v) => WireValue::I8(*v),
        Value::U8(v) => WireValue::U8(*v),
        Value::I16(v) => WireValue::I16(*v),
        Value::U16(v) => WireValue::U16(*v),
        Value::I32(v) => WireValue::I32(*v),
        Value::U32(v) => WireValue::U32(*v),
        Value::I64(v) => WireValue::I64(*v),
        Value::U64(v) => WireValue::U64(*v),
        Value::F32(v) => WireValue::F32(*v),
        Value::F64(v) => WireValue::F64(*v),
        Value::Str(s) => WireValue::Str(s.clone()),
        Value::Array(values) => WireValue::Array(values.clone()),
        Value::Pointer(pointer) => WireValue::Pointer(*pointer),
        Value::Rows(rows) => WireValue::Rows(rows.iter().map(to_wire).collect::<MemoryResult<_>>()?),
    };
    Ok(WireArg::Value(wire))
}

/// Rebuild a value; boxed bytes become fresh memory owned by this side
pub fn from_wire(arg: WireArg) -> MemoryResult<Value> {
    let wire = match arg {
        WireArg::Boxed(boxed) if boxed.buffer => {
            let buffer = NativeBuffer::alloc_with(boxed.bytes.len(), AllocOptions::auto_free())?;
            buffer.write(&boxed.bytes, 0)?;
            return Ok(Value::Buffer(buffer));
        }
        WireArg::Boxed(boxed) => {
            let data = ViewData::from_bytes(boxed.element_type, &boxed.bytes)?;
            return Ok(Value::View(TypedArray::from_data(data)));
        }
        WireArg::Value(wire) => wire,
    };

    Ok(match wire {
        WireValue::Void => Value::Void,
        WireValue::Null => Value::Null,
        WireValue::I8(v) => Value::I8(v),
        WireValue::U8(v) => Value::U8(v),
        WireValue::I16(v) => Value::I16(v),
        WireValue::U16(v) => Value::U16(v),
        WireValue::I32(v) => Value::I32(v),
        WireValue::U32(v) => Value::U32(v),
        WireValue::I64(v) => Value::I64(v),
        WireValue::U64(v) => Value::U64(v),
        WireValue::F32(v) => Value::F32(v),
        WireValue::F64(v) => Value::F64(v),
        WireValue::Str(s) => Value::Str(s),
        WireValue::Array(values) => Value::Array(values),
        WireValue::Pointer(pointer) => Value::Pointer(pointer),
        WireValue::Rows(rows) => Value::Rows(rows.into_iter().map(from_wire).collect::<MemoryResult<_>>()?),
    })
}

/// Post-call contents of the binary arguments, for copy-back
pub fn collect_copy_back(args: &[Value]) -> Vec<Option<WireArg>> {
    args.iter().map(copy_back_entry).collect()
}

fn copy_back_entry(value: &Value) -> Option<WireArg> {
    match value {
        Value::View(_) | Value::Buffer(_) => to_wire(value).ok(),
        Value::Rows(rows) => {
            let entries = rows
                .iter()
                .map(|row| copy_back_entry(row).unwrap_or(WireArg::Value(WireValue::Null)))
                .collect();
            Some(WireArg::Value(WireValue::Rows(entries)))
        }
        _ => None,
    }
}

/// Write returned contents over the caller's original views and buffers
pub fn apply_copy_back(originals: &[Value], returned: Vec<Option<WireArg>>) -> RuntimeResult<()> {
    for (original, entry) in originals.iter().zip(returned) {
        match (original, entry) {
            (Value::View(view), Some(WireArg::Boxed(boxed))) => view.copy_from_bytes(&boxed.bytes)?,
            (Value::Buffer(buffer), Some(WireArg::Boxed(boxed))) => buffer.write(&boxed.bytes, 0)?,
            (Value::Rows(rows), Some(WireArg::Value(WireValue::Rows(entries)))) => {
                apply_copy_back(rows, entries.into_iter().map(Some).collect())?
            }
            _ => {}
        }
    }
    Ok(())
}

pub fn encode_frame<T: Serialize>(message: &T) -> Result<Vec<u8>, IsolationError> {
    let body = serde_json::to_vec(message).map_err(IsolationError::protocol)?;
    if body.len() > MAX_FRAME_BYTES {
        return Err(IsolationError::protocol(format!("frame too large ({} bytes)", body.len())));
    }
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

pub fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, IsolationError> {
    serde_json::from_slice(body).map_err(IsolationError::protocol)
}

/// Fields every request and response carries, read from a body that failed to decode
#[derive(Debug, Deserialize)]
pub struct FrameIdentity {
    pub id: CallId,
    #[serde(default)]
    pub callsite: Option<String>,
}

impl FrameIdentity {
    pub fn recover(body: &[u8]) -> Option<Self> {
        serde_json::from_slice(body).ok()
    }
}

fn frame_len(header: [u8; 4]) -> Result<usize, IsolationError> {
    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(IsolationError::protocol(format!("frame too large ({} bytes)", len)));
    }
    Ok(len)
}

/// Read exactly `buf.len()` bytes; `false` on EOF before the first byte
fn read_exact_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    let mut off = 0usize;
    while off < buf.len() {
        let n = reader.read(&mut buf[off..])?;
        if n == 0 {
            if off == 0 {
                return Ok(false);
            }
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "unexpected EOF"));
        }
        off += n;
    }
    Ok(true)
}

/// Blocking read of one frame body; `None` on clean EOF
pub fn read_body_blocking(reader: &mut impl Read) -> Result<Option<Vec<u8>>, IsolationError> {
    let mut header = [0u8; 4];
    if !read_exact_or_eof(reader, &mut header).map_err(IsolationError::protocol)? {
        return Ok(None);
    }
    let mut body = vec![0u8; frame_len(header)?];
    reader.read_exact(&mut body).map_err(IsolationError::protocol)?;
    Ok(Some(body))
}

pub fn write_frame_blocking<T: Serialize>(writer: &mut impl Write, message: &T) -> Result<(), IsolationError> {
    let frame = encode_frame(message)?;
    writer.write_all(&frame).map_err(IsolationError::protocol)?;
    writer.flush().map_err(IsolationError::protocol)
}

/// Async read of one frame body; `None` on clean EOF
pub async fn read_body<R>(reader: &mut R) -> Result<Option<Vec<u8>>, IsolationError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(IsolationError::protocol(e)),
    }
    let mut body = vec![0u8; frame_len(header)?];
    reader.read_exact(&mut body).await.map_err(IsolationError::protocol)?;
    Ok(Some(body))
}

/// Write an already encoded frame
pub async fn write_encoded<W>(writer: &mut W, frame: &[u8]) -> Result<(), IsolationError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await.map_err(IsolationError::protocol)?;
    writer.flush().await.map_err(IsolationError::protocol)
}
