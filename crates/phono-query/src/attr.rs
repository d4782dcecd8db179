//! Attribute names per object type and their resolution.

use phono_model::{Object, Relation, Session};
use phono_types::{Identifier, ObjectType};

use crate::error::{QueryError, QueryResult};
use crate::value::Value;

const SEGMENT_ATTRS: &[&str] = &[
    "id",
    "label",
    "start",
    "end",
    "duration",
    "start_seconds",
    "end_seconds",
    "type",
    "audio_id",
    "speaker_id",
    "parent_id",
    "phrase_id",
];
const PHRASE_ATTRS: &[&str] = &["source_filename", "language", "channel", "version"];
const WORD_ATTRS: &[&str] = &["ipa"];
const SYLLABLE_ATTRS: &[&str] = &["stress"];
const PHONE_ATTRS: &[&str] = &["position"];
const AUDIO_ATTRS: &[&str] = &[
    "id",
    "filename",
    "sample_rate",
    "duration",
    "n_channels",
    "dataset",
    "language",
    "dialect",
    "type",
];
const SPEAKER_ATTRS: &[&str] = &[
    "id", "name", "dataset", "gender", "age", "dialect", "region", "language", "type",
];

/// Whether `object_type` has a scalar attribute called `name`.
pub fn has_scalar(object_type: ObjectType, name: &str) -> bool {
    let extra: &[&str] = match object_type {
        ObjectType::Audio => return AUDIO_ATTRS.contains(&name),
        ObjectType::Speaker => return SPEAKER_ATTRS.contains(&name),
        ObjectType::Phrase => PHRASE_ATTRS,
        ObjectType::Word => WORD_ATTRS,
        ObjectType::Syllable => SYLLABLE_ATTRS,
        ObjectType::Phone => PHONE_ATTRS,
    };
    SEGMENT_ATTRS.contains(&name) || extra.contains(&name)
}

/// One path step resolved against a type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Scalar,
    Relation(Relation, ObjectType),
}

/// Classify `name` on `object_type`.
pub fn step(object_type: ObjectType, name: &str) -> QueryResult<Step> {
    if has_scalar(object_type, name) {
        return Ok(Step::Scalar);
    }
    Relation::parse(object_type, name)
        .and_then(|r| r.target(object_type).map(|t| Step::Relation(r, t)))
        .ok_or_else(|| QueryError::UnknownAttribute {
            object_type,
            name: name.to_string(),
        })
}

fn text(s: &str) -> Value {
    Value::Str(s.to_string())
}

fn opt_text(s: Option<&String>) -> Value {
    s.map(|s| text(s)).unwrap_or(Value::Null)
}

fn id(i: Identifier) -> Value {
    i.non_empty().map(Value::Id).unwrap_or(Value::Null)
}

/// Value of a scalar attribute of a cached object.
pub fn scalar(session: &Session, object: Identifier, name: &str) -> QueryResult<Value> {
    let obj = session.object(object)?;
    let object_type = obj.object_type();
    let unknown = || QueryError::UnknownAttribute {
        object_type,
        name: name.to_string(),
    };
    if name == "type" {
        return Ok(text(object_type.name()));
    }
    if name == "id" {
        return Ok(Value::Id(obj.identifier()));
    }

    let value = match obj {
        Object::Audio(a) => match name {
            "filename" => text(&a.filename),
            "sample_rate" => Value::from(a.sample_rate),
            "duration" => Value::from(a.duration_ms),
            "n_channels" => Value::from(a.n_channels),
            "dataset" => text(&a.dataset),
            "language" => text(&a.language),
            "dialect" => text(&a.dialect),
            _ => return Err(unknown()),
        },
        Object::Speaker(s) => match name {
            "name" => text(&s.name),
            "dataset" => text(&s.dataset),
            "gender" => text(s.gender.name()),
            "age" => Value::from(s.age),
            "dialect" => text(&s.dialect),
            "region" => text(&s.region),
            "language" => text(&s.language),
            _ => return Err(unknown()),
        },
        Object::Segment(s) => match name {
            "label" => text(&s.label),
            "start" => Value::from(s.start_ms),
            "end" => Value::from(s.end_ms),
            "duration" => Value::from(s.duration_ms()),
            "start_seconds" => Value::Float(s.start_seconds()),
            "end_seconds" => Value::Float(s.end_seconds()),
            "audio_id" => id(s.audio_id),
            "speaker_id" => id(s.speaker_id),
            "parent_id" => id(s.parent_id),
            "phrase_id" => id(s.phrase_id),
            "ipa" => s.ipa().map(text).ok_or_else(unknown)?,
            "stress" => s.stress_code().map(Value::from).ok_or_else(unknown)?,
            "position" => s.position_code().map(Value::from).ok_or_else(unknown)?,
            "source_filename" | "language" | "channel" | "version" => {
                let meta = s.metadata().ok_or_else(unknown)?;
                match name {
                    "source_filename" => opt_text(meta.source_filename.as_ref()),
                    "language" => opt_text(meta.language.as_ref()),
                    "channel" => opt_text(meta.channel.as_ref()),
                    _ => opt_text(meta.version.as_ref()),
                }
            }
            _ => return Err(unknown()),
        },
    };
    Ok(value)
}
