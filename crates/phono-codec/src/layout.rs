//! Declarative value layouts.
//!
//! On-disk format of a value:
//! ```text
//! [fixed header: big-endian ints and 8-byte ids, in declared order]
//! [variable fields: u8/u16 BE length prefix + UTF-8 bytes, in declared order]
//! [extension section, only when flags & FLAG_EXTENSION:
//!     u16 count, then per entry u8-prefixed name + u16-prefixed bytes]
//! ```
//! Every header starts with `version: u8` and `flags: u8`; the packer fills
//! both, records never supply them.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use phono_types::{Identifier, ObjectType};

use crate::error::{CodecError, CodecResult};

/// Value format version written into every header.
pub const VALUE_VERSION: u8 = 1;

/// Flags bit: the value carries an extension section.
pub const FLAG_EXTENSION: u8 = 0x01;

/// Open name -> bytes map for metadata not declared in a layout.
pub type ExtensionMap = BTreeMap<String, Vec<u8>>;

/// Width of a variable field's length prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrefixWidth {
    U8,
    U16,
}

impl PrefixWidth {
    /// Largest payload length the prefix can express.
    pub fn max_len(self) -> usize {
        match self {
            Self::U8 => u8::MAX as usize,
            Self::U16 => u16::MAX as usize,
        }
    }

    fn size(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
        }
    }
}

/// Kind of a declared field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// Big-endian integer of `bytes` width (1, 2, 4 or 8).
    Int { bytes: usize, signed: bool },
    /// Raw 8-byte identifier.
    Id,
    /// Length-prefixed UTF-8 string.
    Str(PrefixWidth),
}

/// One declared field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub const fn uint(name: &'static str, bits: usize) -> Self {
        Self {
            name,
            kind: FieldKind::Int { bytes: bits / 8, signed: false },
        }
    }

    pub const fn int(name: &'static str, bits: usize) -> Self {
        Self {
            name,
            kind: FieldKind::Int { bytes: bits / 8, signed: true },
        }
    }

    pub const fn id(name: &'static str) -> Self {
        Self { name, kind: FieldKind::Id }
    }

    pub const fn str8(name: &'static str) -> Self {
        Self { name, kind: FieldKind::Str(PrefixWidth::U8) }
    }

    pub const fn str16(name: &'static str) -> Self {
        Self { name, kind: FieldKind::Str(PrefixWidth::U16) }
    }

    fn fixed_size(&self) -> usize {
        match self.kind {
            FieldKind::Int { bytes, .. } => bytes,
            FieldKind::Id => Identifier::LEN,
            FieldKind::Str(_) => 0,
        }
    }
}

/// A field value handed to or produced by a layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldValue {
    Int(i64),
    Id(Identifier),
    Str(String),
}

/// Named field values for one record, tagged with the record's type for
/// error reporting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSet {
    object_type: ObjectType,
    values: Vec<(&'static str, FieldValue)>,
}

impl FieldSet {
    pub fn new(object_type: ObjectType) -> Self {
        Self {
            object_type,
            values: Vec::new(),
        }
    }

    pub fn int(mut self, name: &'static str, value: impl Into<i64>) -> Self {
        self.values.push((name, FieldValue::Int(value.into())));
        self
    }

    pub fn id(mut self, name: &'static str, value: Identifier) -> Self {
        self.values.push((name, FieldValue::Id(value)));
        self
    }

    pub fn str(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.values.push((name, FieldValue::Str(value.into())));
        self
    }

    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    pub fn get(&self, name: &'static str) -> CodecResult<&FieldValue> {
        self.values
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
            .ok_or(CodecError::MissingField {
                object: self.object_type,
                field: name,
            })
    }

    fn get_int(&self, name: &'static str) -> CodecResult<i64> {
        match self.get(name)? {
            FieldValue::Int(v) => Ok(*v),
            _ => Err(self.kind_mismatch(name)),
        }
    }

    pub fn get_u8(&self, name: &'static str) -> CodecResult<u8> {
        let v = self.get_int(name)?;
        u8::try_from(v).map_err(|_| self.out_of_range(name, v))
    }

    pub fn get_u32(&self, name: &'static str) -> CodecResult<u32> {
        let v = self.get_int(name)?;
        u32::try_from(v).map_err(|_| self.out_of_range(name, v))
    }

    pub fn get_id(&self, name: &'static str) -> CodecResult<Identifier> {
        match self.get(name)? {
            FieldValue::Id(id) => Ok(*id),
            _ => Err(self.kind_mismatch(name)),
        }
    }

    pub fn get_str(&self, name: &'static str) -> CodecResult<String> {
        match self.get(name)? {
            FieldValue::Str(s) => Ok(s.clone()),
            _ => Err(self.kind_mismatch(name)),
        }
    }

    fn kind_mismatch(&self, name: &'static str) -> CodecError {
        CodecError::FieldKindMismatch {
            object: self.object_type,
            field: name,
        }
    }

    fn out_of_range(&self, name: &'static str, value: i64) -> CodecError {
        CodecError::IntOutOfRange {
            object: self.object_type,
            field: name,
            value,
        }
    }
}

/// Declared value layout for one object type.
#[derive(Debug)]
pub struct Layout {
    object_type: ObjectType,
    fixed: &'static [FieldSpec],
    variable: &'static [FieldSpec],
    fixed_len: usize,
}

impl Layout {
    fn new(
        object_type: ObjectType,
        fixed: &'static [FieldSpec],
        variable: &'static [FieldSpec],
    ) -> Self {
        let fixed_len = fixed.iter().map(FieldSpec::fixed_size).sum();
        Self {
            object_type,
            fixed,
            variable,
            fixed_len,
        }
    }

    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    /// Size of the fixed header in bytes.
    pub fn fixed_len(&self) -> usize {
        self.fixed_len
    }

    pub fn fixed_fields(&self) -> &'static [FieldSpec] {
        self.fixed
    }

    pub fn variable_fields(&self) -> &'static [FieldSpec] {
        self.variable
    }

    /// Pack `fields` (and `extension`, when non-empty) in declared order.
    pub fn pack(&self, fields: &FieldSet, extension: &ExtensionMap) -> CodecResult<Vec<u8>> {
        let flags = if extension.is_empty() { 0 } else { FLAG_EXTENSION };
        let mut out = Vec::with_capacity(self.fixed_len + 32);

        for slot in self.fixed {
            match (slot.name, slot.kind) {
                ("version", _) => out.push(VALUE_VERSION),
                ("flags", _) => out.push(flags),
                (name, FieldKind::Int { bytes, signed }) => {
                    let value = match fields.get(name)? {
                        FieldValue::Int(v) => *v,
                        _ => return Err(fields.kind_mismatch(name)),
                    };
                    self.check_int_range(name, value, bytes, signed)?;
                    out.extend_from_slice(&value.to_be_bytes()[8 - bytes..]);
                }
                (name, FieldKind::Id) => out.extend_from_slice(fields.get_id(name)?.as_bytes()),
                (name, FieldKind::Str(_)) => return Err(fields.kind_mismatch(name)),
            }
        }

        for slot in self.variable {
            let FieldKind::Str(width) = slot.kind else {
                return Err(fields.kind_mismatch(slot.name));
            };
            let value = match fields.get(slot.name)? {
                FieldValue::Str(s) => s.as_str(),
                _ => return Err(fields.kind_mismatch(slot.name)),
            };
            self.put_bytes(&mut out, slot.name, value.as_bytes(), width)?;
        }

        if !extension.is_empty() {
            let count = u16::try_from(extension.len()).map_err(|_| CodecError::StringTooLong {
                object: self.object_type,
                field: "extension entry count".to_string(),
                len: extension.len(),
                max: u16::MAX as usize,
            })?;
            out.extend_from_slice(&count.to_be_bytes());
            for (name, bytes) in extension {
                self.put_bytes(&mut out, name, name.as_bytes(), PrefixWidth::U8)?;
                self.put_bytes(&mut out, name, bytes, PrefixWidth::U16)?;
            }
        }

        Ok(out)
    }

    /// Unpack a value, rejecting short headers and undeclared trailing bytes.
    pub fn unpack(&self, bytes: &[u8]) -> CodecResult<(FieldSet, ExtensionMap)> {
        if bytes.len() < self.fixed_len {
            return Err(CodecError::ValueTooShort {
                object: self.object_type,
                expected: self.fixed_len,
                actual: bytes.len(),
            });
        }

        let mut fields = FieldSet::new(self.object_type);
        let mut flags = 0u8;
        let mut pos = 0usize;

        for slot in self.fixed {
            let size = slot.fixed_size();
            let chunk = &bytes[pos..pos + size];
            pos += size;
            match slot.kind {
                FieldKind::Int { bytes: width, signed } => {
                    let value = read_int(chunk, width, signed);
                    match slot.name {
                        "version" => {
                            if value != VALUE_VERSION as i64 {
                                return Err(CodecError::UnsupportedVersion {
                                    object: self.object_type,
                                    version: chunk[0],
                                });
                            }
                        }
                        "flags" => flags = chunk[0],
                        name => fields = fields.int(name, value),
                    }
                }
                FieldKind::Id => fields = fields.id(slot.name, Identifier::from_slice(chunk)?),
                FieldKind::Str(_) => return Err(fields.kind_mismatch(slot.name)),
            }
        }

        for slot in self.variable {
            let FieldKind::Str(width) = slot.kind else {
                return Err(fields.kind_mismatch(slot.name));
            };
            let raw = self.take_bytes(bytes, &mut pos, slot.name, width)?;
            let text = self.utf8(raw, slot.name)?;
            fields = fields.str(slot.name, text);
        }

        let mut extension = ExtensionMap::new();
        if flags & FLAG_EXTENSION != 0 {
            if pos + 2 > bytes.len() {
                return Err(CodecError::Truncated {
                    object: self.object_type,
                    field: "extension entry count".to_string(),
                    offset: pos,
                });
            }
            let count = u16::from_be_bytes([bytes[pos], bytes[pos + 1]]);
            pos += 2;
            for _ in 0..count {
                let raw_name = self.take_bytes(bytes, &mut pos, "extension name", PrefixWidth::U8)?;
                let name = self.utf8(raw_name, "extension name")?;
                let value = self.take_bytes(bytes, &mut pos, &name, PrefixWidth::U16)?;
                extension.insert(name, value.to_vec());
            }
        }

        if pos != bytes.len() {
            return Err(CodecError::TrailingBytes {
                object: self.object_type,
                count: bytes.len() - pos,
            });
        }

        Ok((fields, extension))
    }

    fn check_int_range(&self, name: &'static str, value: i64, bytes: usize, signed: bool) -> CodecResult<()> {
        let bits = (bytes * 8) as u32;
        let ok = if bits >= 64 {
            signed || value >= 0
        } else if signed {
            let half = 1i64 << (bits - 1);
            (-half..half).contains(&value)
        } else {
            (0..(1i64 << bits)).contains(&value)
        };
        if ok {
            Ok(())
        } else {
            Err(CodecError::IntOutOfRange {
                object: self.object_type,
                field: name,
                value,
            })
        }
    }

    fn put_bytes(&self, out: &mut Vec<u8>, field: &str, payload: &[u8], width: PrefixWidth) -> CodecResult<()> {
        if payload.len() > width.max_len() {
            return Err(CodecError::StringTooLong {
                object: self.object_type,
                field: field.to_string(),
                len: payload.len(),
                max: width.max_len(),
            });
        }
        match width {
            PrefixWidth::U8 => out.push(payload.len() as u8),
            PrefixWidth::U16 => out.extend_from_slice(&(payload.len() as u16).to_be_bytes()),
        }
        out.extend_from_slice(payload);
        Ok(())
    }

    fn take_bytes<'a>(
        &self,
        buf: &'a [u8],
        pos: &mut usize,
        field: &str,
        width: PrefixWidth,
    ) -> CodecResult<&'a [u8]> {
        let truncated = |offset: usize, what: &str| CodecError::Truncated {
            object: self.object_type,
            field: format!("{field} {what}"),
            offset,
        };
        let prefix = width.size();
        if *pos + prefix > buf.len() {
            return Err(truncated(*pos, "length prefix"));
        }
        let len = match width {
            PrefixWidth::U8 => buf[*pos] as usize,
            PrefixWidth::U16 => u16::from_be_bytes([buf[*pos], buf[*pos + 1]]) as usize,
        };
        *pos += prefix;
        let end = *pos + len;
        if end > buf.len() {
            return Err(truncated(*pos, "payload"));
        }
        let out = &buf[*pos..end];
        *pos = end;
        Ok(out)
    }

    fn utf8(&self, raw: &[u8], field: &str) -> CodecResult<String> {
        String::from_utf8(raw.to_vec()).map_err(|_| CodecError::InvalidUtf8 {
            object: self.object_type,
            field: field.to_string(),
        })
    }
}

fn read_int(chunk: &[u8], width: usize, signed: bool) -> i64 {
    let negative = signed && chunk[0] & 0x80 != 0;
    let mut buf = if negative { [0xffu8; 8] } else { [0u8; 8] };
    buf[8 - width..].copy_from_slice(chunk);
    i64::from_be_bytes(buf)
}

const AUDIO_FIXED: &[FieldSpec] = &[
    FieldSpec::uint("version", 8),
    FieldSpec::uint("flags", 8),
    FieldSpec::uint("n_channels", 8),
    FieldSpec::uint("duration_ms", 32),
    FieldSpec::uint("sample_rate", 32),
];
const AUDIO_VARIABLE: &[FieldSpec] = &[
    FieldSpec::str16("filename"),
    FieldSpec::str16("dialect"),
    FieldSpec::str16("language"),
    FieldSpec::str16("dataset"),
];

const SPEAKER_FIXED: &[FieldSpec] = &[
    FieldSpec::uint("version", 8),
    FieldSpec::uint("flags", 8),
    FieldSpec::uint("gender_code", 8),
    FieldSpec::uint("age", 8),
];
const SPEAKER_VARIABLE: &[FieldSpec] = &[
    FieldSpec::str16("name"),
    FieldSpec::str16("dataset"),
    FieldSpec::str16("dialect"),
    FieldSpec::str16("region"),
    FieldSpec::str16("language"),
];

const PHRASE_FIXED: &[FieldSpec] = &[
    FieldSpec::uint("version", 8),
    FieldSpec::uint("flags", 8),
    FieldSpec::uint("end_ms", 32),
    FieldSpec::id("speaker_id"),
];
const PHRASE_VARIABLE: &[FieldSpec] = &[FieldSpec::str16("label")];

const WORD_FIXED: &[FieldSpec] = &[
    FieldSpec::uint("version", 8),
    FieldSpec::uint("flags", 8),
    FieldSpec::uint("end_ms", 32),
    FieldSpec::uint("parent_start_ms", 32),
    FieldSpec::id("speaker_id"),
    FieldSpec::id("parent_id"),
];
const WORD_VARIABLE: &[FieldSpec] = &[FieldSpec::str16("label"), FieldSpec::str16("ipa")];

const SYLLABLE_FIXED: &[FieldSpec] = &[
    FieldSpec::uint("version", 8),
    FieldSpec::uint("flags", 8),
    FieldSpec::uint("stress_code", 8),
    FieldSpec::uint("end_ms", 32),
    FieldSpec::uint("parent_start_ms", 32),
    FieldSpec::uint("phrase_start_ms", 32),
    FieldSpec::id("speaker_id"),
    FieldSpec::id("parent_id"),
    FieldSpec::id("phrase_id"),
];
const SYLLABLE_VARIABLE: &[FieldSpec] = &[FieldSpec::str16("label")];

const PHONE_FIXED: &[FieldSpec] = &[
    FieldSpec::uint("version", 8),
    FieldSpec::uint("flags", 8),
    FieldSpec::uint("position_code", 8),
    FieldSpec::uint("end_ms", 32),
    FieldSpec::uint("parent_start_ms", 32),
    FieldSpec::uint("phrase_start_ms", 32),
    FieldSpec::id("speaker_id"),
    FieldSpec::id("parent_id"),
    FieldSpec::id("phrase_id"),
];
const PHONE_VARIABLE: &[FieldSpec] = &[FieldSpec::str8("label")];

static LAYOUTS: LazyLock<[Layout; 6]> = LazyLock::new(|| {
    [
        Layout::new(ObjectType::Audio, AUDIO_FIXED, AUDIO_VARIABLE),
        Layout::new(ObjectType::Phrase, PHRASE_FIXED, PHRASE_VARIABLE),
        Layout::new(ObjectType::Word, WORD_FIXED, WORD_VARIABLE),
        Layout::new(ObjectType::Syllable, SYLLABLE_FIXED, SYLLABLE_VARIABLE),
        Layout::new(ObjectType::Phone, PHONE_FIXED, PHONE_VARIABLE),
        Layout::new(ObjectType::Speaker, SPEAKER_FIXED, SPEAKER_VARIABLE),
    ]
});

/// The layout of `object_type`, built once per process.
pub fn layout(object_type: ObjectType) -> &'static Layout {
    &LAYOUTS[object_type.rank() as usize]
}
