//! Binary container used to copy object subtrees.
//!
//! Layout (integers little-endian, ids copied as raw [`Guid`] words):
//!
//! ```text
//! u32 engine build
//! u32 object count N
//! N x 16-byte object id
//! N x { u32 json length, json bytes, i32 order in parent }
//! ```

use serde_json::{Map, Value};

use redlilium_core::Guid;

use crate::SceneError;

/// Decoded clone stream. Every JSON record is parsed exactly once.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CloneStream {
    pub engine_build: u32,
    pub ids: Vec<Guid>,
    pub objects: Vec<Map<String, Value>>,
    pub orders: Vec<i32>,
}

pub(crate) fn encode_clone_stream(
    engine_build: u32,
    ids: &[Guid],
    objects: &[(Map<String, Value>, i32)],
) -> Result<Vec<u8>, SceneError> {
    if ids.len() != objects.len() {
        return Err(SceneError::InvalidArgument(format!(
            "{} ids for {} objects",
            ids.len(),
            objects.len()
        )));
    }
    let count = u32::try_from(ids.len())
        .map_err(|_| SceneError::InvalidArgument("too many objects to clone".to_owned()))?;

    let mut out = Vec::with_capacity(8 + ids.len() * 16);
    out.extend_from_slice(&engine_build.to_le_bytes());
    out.extend_from_slice(&count.to_le_bytes());
    out.extend_from_slice(bytemuck::cast_slice::<Guid, u8>(ids));
    for (object, order) in objects {
        let json = serde_json::to_vec(object).map_err(|e| SceneError::InvalidStream(e.to_string()))?;
        let len = u32::try_from(json.len())
            .map_err(|_| SceneError::InvalidStream("object record too large".to_owned()))?;
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&json);
        out.extend_from_slice(&order.to_le_bytes());
    }
    Ok(out)
}

pub(crate) fn decode_clone_stream(bytes: &[u8]) -> Result<CloneStream, SceneError> {
    let mut reader = ByteReader { bytes, offset: 0 };
    let engine_build = reader.read_u32()?;
    let count = reader.read_u32()? as usize;
    let id_bytes = reader.read_slice(count.checked_mul(16).ok_or_else(truncated)?)?;
    let ids: Vec<Guid> = id_bytes
        .chunks_exact(16)
        .map(bytemuck::pod_read_unaligned::<Guid>)
        .collect();

    let mut objects = Vec::with_capacity(count);
    let mut orders = Vec::with_capacity(count);
    for _ in 0..count {
        let len = reader.read_u32()? as usize;
        let json = reader.read_slice(len)?;
        match serde_json::from_slice::<Value>(json) {
            Ok(Value::Object(map)) => objects.push(map),
            Ok(_) => {
                return Err(SceneError::InvalidStream(
                    "clone record is not a JSON object".to_owned(),
                ));
            }
            Err(e) => return Err(SceneError::InvalidStream(e.to_string())),
        }
        orders.push(reader.read_i32()?);
    }
    if reader.offset != bytes.len() {
        return Err(SceneError::InvalidStream(format!(
            "{} trailing bytes in clone stream",
            bytes.len() - reader.offset
        )));
    }
    Ok(CloneStream {
        engine_build,
        ids,
        objects,
        orders,
    })
}

fn truncated() -> SceneError {
    SceneError::InvalidStream("truncated clone stream".to_owned())
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    fn read_slice(&mut self, len: usize) -> Result<&'a [u8], SceneError> {
        let end = self.offset.checked_add(len).ok_or_else(truncated)?;
        let slice = self.bytes.get(self.offset..end).ok_or_else(truncated)?;
        self.offset = end;
        Ok(slice)
    }

    fn read_array(&mut self) -> Result<[u8; 4], SceneError> {
        let slice = self.read_slice(4)?;
        let mut out = [0u8; 4];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn read_u32(&mut self) -> Result<u32, SceneError> {
        self.read_array().map(u32::from_le_bytes)
    }

    fn read_i32(&mut self) -> Result<i32, SceneError> {
        self.read_array().map(i32::from_le_bytes)
    }
}
