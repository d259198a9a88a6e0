//! Snapshot blob codec.
//!
//! A snapshot captures an isolate's template graph plus an opaque embedder
//! payload, so that a later process can skip template construction.
//!
//! # Layout
//!
//! ```text
//! magic "JSBS" | version u32 | reference count u32 | reference fingerprint u64
//! | template count u32 | templates... | embedder payload (len u32 + bytes)
//! | checksum u64 (xxh64 of everything before it)
//! ```
//!
//! All integers are little-endian. Callbacks are stored as positions in the
//! external reference table; the reference count and fingerprint guarantee
//! the loading process registered the same table in the same order.

use std::rc::Rc;

use xxhash_rust::xxh64::xxh64;

use crate::callback::{CallbackRef, ExternalReferences};
use crate::error::SnapshotError;
use crate::isolate::Isolate;
use crate::object::PropertyAttributes;
use crate::template::{
    BoundCallback, Constant, FunctionTemplate, IndexedHandlers, InstanceTemplate, NamedHandlers,
    TemplateFlags, TemplateId, TemplateMember, TemplateProperty,
};
use crate::value::{PropertyKey, Symbol};

pub const SNAPSHOT_MAGIC: &[u8; 4] = b"JSBS";
pub const SNAPSHOT_VERSION: u32 = 1;

/// Decoded snapshot content.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotData {
    pub templates: Vec<FunctionTemplate>,
    pub embedder_data: Vec<u8>,
}

/// Serialize an isolate's templates together with `embedder_data`.
pub fn create_snapshot(isolate: &Isolate, embedder_data: &[u8]) -> Vec<u8> {
    let refs = isolate.references();
    let mut w = Writer::default();
    w.bytes(SNAPSHOT_MAGIC);
    w.u32(SNAPSHOT_VERSION);
    w.u32(refs.len() as u32);
    w.u64(refs.fingerprint());
    w.u32(isolate.templates().len() as u32);
    for t in isolate.templates() {
        write_template(&mut w, t);
    }
    w.u32(embedder_data.len() as u32);
    w.bytes(embedder_data);
    let checksum = xxh64(&w.buf, 0);
    w.u64(checksum);
    w.buf
}

/// Validate a blob against `refs` and decode it.
pub fn read_snapshot(
    blob: &[u8],
    refs: &ExternalReferences,
) -> Result<SnapshotData, SnapshotError> {
    if blob.len() < 4 || &blob[..4] != SNAPSHOT_MAGIC {
        return Err(SnapshotError::BadMagic);
    }
    if blob.len() < 12 {
        return Err(SnapshotError::Truncated { offset: blob.len() });
    }
    let (payload, tail) = blob.split_at(blob.len() - 8);
    let mut r = Reader { buf: payload, pos: 4 };
    let version = r.u32()?;
    if version != SNAPSHOT_VERSION {
        return Err(SnapshotError::Version {
            found: version,
            expected: SNAPSHOT_VERSION,
        });
    }
    let mut stored = [0u8; 8];
    stored.copy_from_slice(tail);
    if u64::from_le_bytes(stored) != xxh64(payload, 0) {
        return Err(SnapshotError::Checksum);
    }
    let count = r.u32()?;
    if count as usize != refs.len() {
        return Err(SnapshotError::ReferenceCount {
            expected: count,
            found: refs.len() as u32,
        });
    }
    if r.u64()? != refs.fingerprint() {
        return Err(SnapshotError::ReferenceMismatch);
    }

    let template_count = r.u32()?;
    let mut templates = Vec::with_capacity(template_count as usize);
    for _ in 0..template_count {
        templates.push(read_template(&mut r)?);
    }
    let len = r.u32()? as usize;
    let embedder_data = r.take(len)?.to_vec();
    if r.pos != payload.len() {
        return Err(SnapshotError::Malformed(format!(
            "{} trailing bytes",
            payload.len() - r.pos
        )));
    }
    Ok(SnapshotData {
        templates,
        embedder_data,
    })
}

/// Decode a blob and build an isolate from it.
pub fn load_isolate(
    blob: &[u8],
    refs: ExternalReferences,
) -> Result<(Rc<Isolate>, Vec<u8>), SnapshotError> {
    let data = read_snapshot(blob, &refs)?;
    let isolate = Isolate::new(refs, data.templates)
        .map_err(|e| SnapshotError::Malformed(e.to_string()))?;
    Ok((isolate, data.embedder_data))
}

// ============================================================================
// Encoding
// ============================================================================

#[derive(Default)]
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn bytes(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }
    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }
    fn u32(&mut self, v: u32) {
        self.bytes(&v.to_le_bytes());
    }
    fn u64(&mut self, v: u64) {
        self.bytes(&v.to_le_bytes());
    }
    fn str(&mut self, s: &str) {
        self.u32(s.len() as u32);
        self.bytes(s.as_bytes());
    }
    fn opt_u32(&mut self, v: Option<u32>) {
        match v {
            Some(v) => {
                self.u8(1);
                self.u32(v);
            }
            None => self.u8(0),
        }
    }
    fn bound(&mut self, b: Option<BoundCallback>) {
        match b {
            Some(b) => {
                self.u8(1);
                self.u32(b.callback.0);
                self.u32(b.data);
            }
            None => self.u8(0),
        }
    }
}

const KEY_STRING: u8 = 0;
const KEY_INDEX: u8 = 1;
const KEY_SYMBOL: u8 = 2;

const MEMBER_METHOD: u8 = 0;
const MEMBER_ACCESSOR: u8 = 1;
const MEMBER_CONSTANT: u8 = 2;

fn write_template(w: &mut Writer, t: &FunctionTemplate) {
    w.str(&t.class_name);
    w.bound(t.constructor);
    w.u32(t.length);
    w.opt_u32(t.parent.map(|p| p.0));
    w.u8(t.flags.bits());
    for list in [&t.prototype, &t.statics] {
        w.u32(list.len() as u32);
        for prop in list {
            write_property(w, prop);
        }
    }
    w.u32(t.instance.internal_field_count);
    match &t.instance.indexed {
        Some(h) => {
            w.u8(1);
            w.opt_u32(h.getter.map(|c| c.0));
            w.opt_u32(h.setter.map(|c| c.0));
            w.u32(h.data);
        }
        None => w.u8(0),
    }
    match &t.instance.named {
        Some(h) => {
            w.u8(1);
            w.opt_u32(h.getter.map(|c| c.0));
            w.opt_u32(h.setter.map(|c| c.0));
            w.opt_u32(h.deleter.map(|c| c.0));
            w.u32(h.data);
        }
        None => w.u8(0),
    }
}

fn write_property(w: &mut Writer, prop: &TemplateProperty) {
    match &prop.key {
        PropertyKey::String(s) => {
            w.u8(KEY_STRING);
            w.str(s);
        }
        PropertyKey::Index(i) => {
            w.u8(KEY_INDEX);
            w.u32(*i);
        }
        PropertyKey::Symbol(s) => {
            w.u8(KEY_SYMBOL);
            // Isolates reject realm-bound symbols, so the fallback never decodes.
            w.u8(s.code().unwrap_or(u8::MAX));
        }
    }
    w.u8(prop.attrs.bits());
    match &prop.member {
        TemplateMember::Method { callback, length } => {
            w.u8(MEMBER_METHOD);
            w.bound(Some(*callback));
            w.u32(*length);
        }
        TemplateMember::Accessor { getter, setter } => {
            w.u8(MEMBER_ACCESSOR);
            w.bound(*getter);
            w.bound(*setter);
        }
        TemplateMember::Constant(c) => {
            w.u8(MEMBER_CONSTANT);
            match c {
                Constant::Undefined => w.u8(0),
                Constant::Null => w.u8(1),
                Constant::Bool(b) => {
                    w.u8(2);
                    w.u8(u8::from(*b));
                }
                Constant::Int(i) => {
                    w.u8(3);
                    w.bytes(&i.to_le_bytes());
                }
                Constant::Number(n) => {
                    w.u8(4);
                    w.u64(n.to_bits());
                }
                Constant::String(s) => {
                    w.u8(5);
                    w.str(s);
                }
            }
        }
    }
}

// ============================================================================
// Decoding
// ============================================================================

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], SnapshotError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or(SnapshotError::Truncated { offset: self.pos })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }
    fn u8(&mut self) -> Result<u8, SnapshotError> {
        Ok(self.take(1)?[0])
    }
    fn u32(&mut self) -> Result<u32, SnapshotError> {
        let mut b = [0u8; 4];
        b.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(b))
    }
    fn u64(&mut self) -> Result<u64, SnapshotError> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(b))
    }
    fn str(&mut self) -> Result<Rc<str>, SnapshotError> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(Rc::from)
            .map_err(|_| SnapshotError::Malformed("invalid utf-8 string".into()))
    }
    fn flag(&mut self) -> Result<bool, SnapshotError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(SnapshotError::Malformed(format!("bad presence byte {other}"))),
        }
    }
    fn opt_u32(&mut self) -> Result<Option<u32>, SnapshotError> {
        Ok(if self.flag()? { Some(self.u32()?) } else { None })
    }
    fn bound(&mut self) -> Result<Option<BoundCallback>, SnapshotError> {
        if !self.flag()? {
            return Ok(None);
        }
        let callback = CallbackRef(self.u32()?);
        let data = self.u32()?;
        Ok(Some(BoundCallback { callback, data }))
    }
}

fn read_template(r: &mut Reader<'_>) -> Result<FunctionTemplate, SnapshotError> {
    let mut t = FunctionTemplate::new(r.str()?);
    t.constructor = r.bound()?;
    t.length = r.u32()?;
    t.parent = r.opt_u32()?.map(TemplateId);
    t.flags = TemplateFlags::from_bits(r.u8()?)
        .ok_or_else(|| SnapshotError::Malformed("unknown template flags".into()))?;
    for list in [&mut t.prototype, &mut t.statics] {
        let n = r.u32()?;
        for _ in 0..n {
            list.push(read_property(r)?);
        }
    }
    let internal_field_count = r.u32()?;
    let indexed = if r.flag()? {
        Some(IndexedHandlers {
            getter: r.opt_u32()?.map(CallbackRef),
            setter: r.opt_u32()?.map(CallbackRef),
            data: r.u32()?,
        })
    } else {
        None
    };
    let named = if r.flag()? {
        Some(NamedHandlers {
            getter: r.opt_u32()?.map(CallbackRef),
            setter: r.opt_u32()?.map(CallbackRef),
            deleter: r.opt_u32()?.map(CallbackRef),
            data: r.u32()?,
        })
    } else {
        None
    };
    t.instance = InstanceTemplate {
        internal_field_count,
        indexed,
        named,
    };
    Ok(t)
}

fn read_property(r: &mut Reader<'_>) -> Result<TemplateProperty, SnapshotError> {
    let key = match r.u8()? {
        KEY_STRING => PropertyKey::String(r.str()?),
        KEY_INDEX => PropertyKey::Index(r.u32()?),
        KEY_SYMBOL => {
            let code = r.u8()?;
            PropertyKey::Symbol(
                Symbol::from_code(code)
                    .ok_or_else(|| SnapshotError::Malformed(format!("unknown symbol {code}")))?,
            )
        }
        other => return Err(SnapshotError::Malformed(format!("unknown key tag {other}"))),
    };
    let attrs = PropertyAttributes::from_bits(r.u8()?)
        .ok_or_else(|| SnapshotError::Malformed("unknown property attributes".into()))?;
    let member = match r.u8()? {
        MEMBER_METHOD => {
            let callback = r
                .bound()?
                .ok_or_else(|| SnapshotError::Malformed("method without callback".into()))?;
            TemplateMember::Method {
                callback,
                length: r.u32()?,
            }
        }
        MEMBER_ACCESSOR => TemplateMember::Accessor {
            getter: r.bound()?,
            setter: r.bound()?,
        },
        MEMBER_CONSTANT => TemplateMember::Constant(match r.u8()? {
            0 => Constant::Undefined,
            1 => Constant::Null,
            2 => Constant::Bool(r.u8()? != 0),
            3 => Constant::Int(r.u32()? as i32),
            4 => Constant::Number(f64::from_bits(r.u64()?)),
            5 => Constant::String(r.str()?),
            other => return Err(SnapshotError::Malformed(format!("unknown constant tag {other}"))),
        }),
        other => return Err(SnapshotError::Malformed(format!("unknown member tag {other}"))),
    };
    Ok(TemplateProperty { key, member, attrs })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::{CallbackInfo, ExternalCallback, Intercepted, PropertyCallbackInfo};

    fn noop(_: &mut CallbackInfo<'_>) {}
    fn item(_: u32, _: &mut PropertyCallbackInfo<'_>) -> Intercepted {
        Intercepted::No
    }

    fn refs() -> ExternalReferences {
        ExternalReferences::new()
            .with("call", ExternalCallback::Function(noop))
            .with("item", ExternalCallback::IndexedGetter(item))
    }

    fn sample() -> Rc<Isolate> {
        let cb = BoundCallback {
            callback: CallbackRef(0),
            data: 4,
        };
        let mut base = FunctionTemplate::new("Base").constructor(CallbackRef(0), 1);
        base.prototype_method("run", cb, 2);
        base.prototype_accessor("size", Some(cb), None);
        base.prototype_constant(
            PropertyKey::Symbol(Symbol::ToStringTag),
            Constant::String("Base".into()),
        );
        base.static_constant("LIMIT", Constant::Number(1.5));
        base.instance.internal_field_count = 2;
        base.instance.indexed = Some(IndexedHandlers {
            getter: Some(CallbackRef(1)),
            setter: None,
            data: 9,
        });
        let mut child = FunctionTemplate::new("Child");
        child.inherit(TemplateId(0));
        child.flags = TemplateFlags::DEFAULT_TO_STRING_TAG;
        match Isolate::new(refs(), vec![base, child]) {
            Ok(isolate) => isolate,
            Err(e) => panic!("{e}"),
        }
    }

    #[test]
    fn template_graph_survives_a_snapshot() {
        let isolate = sample();
        let blob = create_snapshot(&isolate, b"payload");
        let data = read_snapshot(&blob, &refs()).expect("valid snapshot");
        assert_eq!(data.templates, isolate.templates());
        assert_eq!(data.embedder_data, b"payload");
    }

    #[test]
    fn corrupted_blob_fails_checksum() {
        let mut blob = create_snapshot(&sample(), b"");
        let mid = blob.len() / 2;
        blob[mid] ^= 0xff;
        assert_eq!(read_snapshot(&blob, &refs()), Err(SnapshotError::Checksum));
    }

    #[test]
    fn different_reference_table_is_rejected() {
        let blob = create_snapshot(&sample(), b"");
        let reordered = ExternalReferences::new()
            .with("item", ExternalCallback::IndexedGetter(item))
            .with("call", ExternalCallback::Function(noop));
        assert_eq!(
            read_snapshot(&blob, &reordered),
            Err(SnapshotError::ReferenceMismatch)
        );
        let shorter = ExternalReferences::new().with("call", ExternalCallback::Function(noop));
        assert!(matches!(
            read_snapshot(&blob, &shorter),
            Err(SnapshotError::ReferenceCount { expected: 2, found: 1 })
        ));
    }

    #[test]
    fn rejects_foreign_bytes() {
        assert_eq!(read_snapshot(b"nope", &refs()), Err(SnapshotError::BadMagic));
        let mut blob = create_snapshot(&sample(), b"");
        blob[4] = 7;
        assert!(matches!(
            read_snapshot(&blob, &refs()),
            Err(SnapshotError::Version { found: 7, .. })
        ));
    }
}
