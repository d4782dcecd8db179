use serde::{Deserialize, Serialize};
use tracing::debug;

use phono_types::{Identifier, ObjectType};

use crate::error::ModelResult;
use crate::object::Segment;
use crate::session::Session;

/// Which pairs of segments are compared for overlap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationPolicy {
    /// Same type and same parent; phrases compare within their audio.
    #[default]
    Siblings,
    /// Same type and same audio, regardless of parent.
    SameAudio,
    /// Same type and audio, different known speakers (cross-talk).
    CrossSpeaker,
}

impl RelationPolicy {
    /// Whether `a` and `b` are candidates for overlap under this policy.
    pub fn related(self, a: &Segment, b: &Segment) -> bool {
        if a.identifier == b.identifier || a.object_type() != b.object_type() {
            return false;
        }
        match self {
            Self::Siblings if a.object_type() == ObjectType::Phrase => a.audio_id == b.audio_id,
            Self::Siblings => !a.parent_id.is_empty() && a.parent_id == b.parent_id,
            Self::SameAudio => a.audio_id == b.audio_id,
            Self::CrossSpeaker => {
                a.audio_id == b.audio_id
                    && !a.speaker_id.is_empty()
                    && !b.speaker_id.is_empty()
                    && a.speaker_id != b.speaker_id
            }
        }
    }
}

/// Half-open spans `[start, end)` intersect.
pub fn spans_overlap(a: &Segment, b: &Segment) -> bool {
    a.start_ms < b.end_ms && b.start_ms < a.end_ms
}

impl Session {
    /// Pairs among `candidates` that are related under `policy` and overlap
    /// in time, each pair ordered by start time.
    pub fn find_overlaps(
        &self,
        candidates: &[Identifier],
        policy: RelationPolicy,
    ) -> ModelResult<Vec<(Identifier, Identifier)>> {
        let mut segs: Vec<&Segment> = candidates
            .iter()
            .map(|id| self.segment(*id))
            .collect::<ModelResult<_>>()?;
        segs.sort_by_key(|s| (s.start_ms, s.identifier));
        segs.dedup_by_key(|s| s.identifier);

        let mut pairs = Vec::new();
        for (i, a) in segs.iter().enumerate() {
            for b in &segs[i + 1..] {
                if b.start_ms >= a.end_ms {
                    break;
                }
                if spans_overlap(a, b) && policy.related(a, b) {
                    pairs.push((a.identifier, b.identifier));
                }
            }
        }
        Ok(pairs)
    }

    /// Segments overlapping `id` under the configured relation policy.
    pub fn overlapping(&mut self, id: Identifier) -> ModelResult<Vec<Identifier>> {
        let policy = self.config().cache.relation_policy;
        self.overlapping_with(id, policy)
    }

    pub fn overlapping_with(&mut self, id: Identifier, policy: RelationPolicy) -> ModelResult<Vec<Identifier>> {
        let seg = self.segment(id)?;
        let (object_type, audio) = (seg.object_type(), seg.audio_id);
        let candidates = match policy {
            RelationPolicy::Siblings => self.siblings(id)?,
            RelationPolicy::SameAudio | RelationPolicy::CrossSpeaker => {
                let mut ids = if audio.is_empty() {
                    Vec::new()
                } else {
                    self.segments_of_audio(audio, object_type)?
                };
                for cached in self.cached_of_type(object_type) {
                    if !ids.contains(&cached) {
                        ids.push(cached);
                    }
                }
                ids
            }
        };

        let me = self.segment(id)?;
        let mut found = Vec::new();
        for other in candidates {
            let seg = self.segment(other)?;
            if policy.related(me, seg) && spans_overlap(me, seg) {
                found.push(other);
            }
        }
        self.sort_by_start(&mut found);
        debug!(%id, ?policy, found = found.len(), "overlap lookup");
        Ok(found)
    }
}
