use phono_model::{Audio, Interval, SaveOptions, Segment, Session, Speaker};
use phono_types::{Identifier, ObjectType};

use crate::error::QueryError;
use crate::queryset::QuerySet;
use crate::value::Value;

struct Corpus {
    audio: Identifier,
    the_cat: Identifier,
    a_dog: Identifier,
    /// the, cat, a, dog
    words: Vec<Identifier>,
}

fn phrase(
    s: &mut Session,
    audio: Identifier,
    speaker: Identifier,
    words: &[(&str, u32, u32, &[(&str, u32, u32)])],
    all: &mut Vec<Identifier>,
) -> (Identifier, Vec<Identifier>) {
    let intervals: Vec<Interval> = words.iter().map(|w| Interval::new(w.0, w.1, w.2)).collect();
    let word_ids = s.add_intervals(ObjectType::Word, &intervals).unwrap();
    let phrase = s.phrase_from_words(&word_ids).unwrap();
    s.add_audio(phrase, audio, true).unwrap();
    s.add_speaker(phrase, speaker, true).unwrap();
    all.push(phrase);

    for (&word, entry) in word_ids.iter().zip(words) {
        let syl = s.add(Segment::syllable(entry.0, entry.1, entry.2).unwrap());
        s.add_child(word, syl, false).unwrap();
        let phones: Vec<Interval> = entry.3.iter().map(|p| Interval::new(p.0, p.1, p.2)).collect();
        let phones = s.add_intervals(ObjectType::Phone, &phones).unwrap();
        s.attach_contained(syl, &phones, false).unwrap();
        all.push(word);
        all.push(syl);
        all.extend(phones);
    }
    (phrase, word_ids)
}

fn corpus(s: &mut Session) -> Corpus {
    let audio = s.add(Audio::new("a.wav"));
    let speaker = s.add(Speaker::new("S1"));
    let mut all = vec![audio, speaker];
    let (the_cat, mut words) = phrase(
        s,
        audio,
        speaker,
        &[
            ("the", 0, 300, &[("dh", 0, 100), ("ax", 100, 300)]),
            ("cat", 300, 800, &[("k", 300, 400), ("ae", 400, 650), ("t", 650, 800)]),
        ],
        &mut all,
    );
    let (a_dog, more) = phrase(
        s,
        audio,
        speaker,
        &[
            ("a", 1000, 1200, &[("ax", 1000, 1200)]),
            ("dog", 1200, 2000, &[("d", 1200, 1400), ("o", 1400, 1800), ("g", 1800, 2000)]),
        ],
        &mut all,
    );
    words.extend(more);
    s.save_many(&all, SaveOptions::default()).unwrap();
    Corpus {
        audio,
        the_cat,
        a_dog,
        words,
    }
}

fn fresh() -> (Session, Corpus) {
    let mut s = Session::in_memory();
    let c = corpus(&mut s);
    s.clear_cache();
    (s, c)
}

#[test]
fn existential_filter_and_complement() {
    let (mut s, c) = fresh();
    let hits = QuerySet::of_type(&mut s, ObjectType::Phrase)
        .unwrap()
        .filter([("words__phones__label", "t")])
        .unwrap()
        .to_vec()
        .unwrap();
    assert_eq!(hits, vec![c.the_cat]);

    let rest = QuerySet::of_type(&mut s, ObjectType::Phrase)
        .unwrap()
        .exclude([("words__phones__label", "t")])
        .unwrap()
        .to_vec()
        .unwrap();
    assert_eq!(rest, vec![c.a_dog]);

    let words = QuerySet::of_type(&mut s, ObjectType::Word)
        .unwrap()
        .filter([("syllables__phones__label", "t")])
        .unwrap()
        .to_vec()
        .unwrap();
    assert_eq!(words, vec![c.words[1]]);
}

#[test]
fn relations_are_preloaded_once() {
    let (mut s, _) = fresh();
    let mut qs = QuerySet::of_type(&mut s, ObjectType::Phrase)
        .unwrap()
        .filter([("words__phones__label__iexact", "AX")])
        .unwrap();
    assert_eq!(qs.len().unwrap(), 2);
    let before = qs.session().store().stats();
    assert_eq!(qs.len().unwrap(), 2);
    assert_eq!(qs.session().store().stats(), before);
    drop(qs);

    for t in [ObjectType::Word, ObjectType::Syllable, ObjectType::Phone] {
        assert!(s.is_fully_loaded(t));
    }
    let before = s.store().stats();
    let again = QuerySet::of_type(&mut s, ObjectType::Phrase)
        .unwrap()
        .filter([("words__phones__label", "g")])
        .unwrap()
        .len()
        .unwrap();
    assert_eq!(again, 1);
    assert_eq!(s.store().stats(), before);
}

#[test]
fn stages_and_lookups_combine() {
    let (mut s, c) = fresh();
    let hits = QuerySet::of_type(&mut s, ObjectType::Word)
        .unwrap()
        .filter([("label__startswith", Value::from("c")), ("end__gt", Value::from(500))])
        .unwrap()
        .to_vec()
        .unwrap();
    assert_eq!(hits, vec![c.words[1]]);

    // Exclusion needs every lookup of the stage to hold.
    let all = QuerySet::of_type(&mut s, ObjectType::Word)
        .unwrap()
        .exclude([("label", Value::from("the")), ("start", Value::from(300))])
        .unwrap()
        .len()
        .unwrap();
    assert_eq!(all, 4);

    let mid = QuerySet::of_type(&mut s, ObjectType::Word)
        .unwrap()
        .filter([("start__range", [200, 1100])])
        .unwrap()
        .exclude([("label__in", ["a"])])
        .unwrap()
        .to_vec()
        .unwrap();
    assert_eq!(mid, vec![c.words[1]]);
}

#[test]
fn len_transform_and_operators() {
    let (mut s, c) = fresh();
    let long = QuerySet::of_type(&mut s, ObjectType::Phrase)
        .unwrap()
        .filter([("label__len__gt", 5)])
        .unwrap()
        .to_vec()
        .unwrap();
    assert_eq!(long, vec![c.the_cat]);

    let two_words = QuerySet::of_type(&mut s, ObjectType::Phrase)
        .unwrap()
        .filter([("words__len__gte", 2)])
        .unwrap()
        .len()
        .unwrap();
    assert_eq!(two_words, 2);

    let short = QuerySet::of_type(&mut s, ObjectType::Word)
        .unwrap()
        .filter([("label__len", 1)])
        .unwrap()
        .to_vec()
        .unwrap();
    assert_eq!(short, vec![c.words[2]]);
}

#[test]
fn one_to_one_and_link_relations() {
    let (mut s, c) = fresh();
    let phones = QuerySet::of_type(&mut s, ObjectType::Phone)
        .unwrap()
        .filter([("speaker__name", "S1"), ("word__label", "dog")])
        .unwrap()
        .len()
        .unwrap();
    assert_eq!(phones, 3);

    let audios = QuerySet::of_type(&mut s, ObjectType::Audio)
        .unwrap()
        .filter([("phrases__label__icontains", "CAT")])
        .unwrap()
        .to_vec()
        .unwrap();
    assert_eq!(audios, vec![c.audio]);

    let speakers = QuerySet::of_type(&mut s, ObjectType::Speaker)
        .unwrap()
        .filter([("audios__filename__endswith", ".wav")])
        .unwrap()
        .len()
        .unwrap();
    assert_eq!(speakers, 1);
}

#[test]
fn ordering_is_stable_and_multi_key() {
    let (mut s, c) = fresh();
    let desc = QuerySet::of_type(&mut s, ObjectType::Phrase)
        .unwrap()
        .order_by(["-start"])
        .unwrap()
        .to_vec()
        .unwrap();
    assert_eq!(desc, vec![c.a_dog, c.the_cat]);

    let words = QuerySet::of_type(&mut s, ObjectType::Word)
        .unwrap()
        .order_by(["label__len", "-start"])
        .unwrap()
        .to_vec()
        .unwrap();
    let &[the, cat, a, dog] = c.words.as_slice() else {
        panic!("four words");
    };
    assert_eq!(words, vec![a, dog, cat, the]);

    let by_label = QuerySet::from_objects(&mut s, &c.words)
        .unwrap()
        .order_by(["label"])
        .unwrap()
        .to_vec()
        .unwrap();
    assert_eq!(by_label, vec![a, cat, dog, the]);
}

#[test]
fn shortcuts_only_on_unfiltered_sets() {
    let (mut s, c) = fresh();
    let mut qs = QuerySet::of_type(&mut s, ObjectType::Phrase).unwrap();
    assert_eq!(qs.get_one().unwrap(), Some(c.the_cat));
    assert_eq!(qs.get_n(5).unwrap(), vec![c.the_cat, c.a_dog]);
    assert_eq!(qs.keys().len(), 2);

    let mut qs = qs.filter([("label", "a dog")]).unwrap();
    assert!(matches!(qs.get_one(), Err(QueryError::UnfilteredOnly("get_one"))));
    let mut qs = QuerySet::of_type(&mut s, ObjectType::Phrase)
        .unwrap()
        .order_by(["start"])
        .unwrap();
    assert!(matches!(qs.get_n(1), Err(QueryError::UnfilteredOnly("get_n"))));
}

#[test]
fn construction_errors() {
    let (mut s, c) = fresh();
    assert!(matches!(
        QuerySet::from_objects(&mut s, &[]),
        Err(QueryError::EmptyQuerySet)
    ));

    let audio = s.add(Audio::new("b.wav"));
    let key = stored_word_key(&mut s, c.words[0]);
    let word = s.load(&key).unwrap();
    let err = QuerySet::from_objects(&mut s, &[word, audio]).unwrap_err();
    assert!(matches!(
        err,
        QueryError::TypeMismatch {
            expected: ObjectType::Word,
            found: ObjectType::Audio
        }
    ));

    let err = QuerySet::of_type(&mut s, ObjectType::Phrase)
        .unwrap()
        .filter([("words__colour", "red")])
        .unwrap_err();
    assert!(matches!(err, QueryError::UnknownAttribute { .. }));
    assert!(QuerySet::of_type(&mut s, ObjectType::Phrase)
        .unwrap()
        .order_by(["-nonsense"])
        .is_err());
}

/// Key of a word that may not be cached yet, found through the type index.
fn stored_word_key(s: &mut Session, word: Identifier) -> Vec<u8> {
    s.keys_of_type(ObjectType::Word)
        .unwrap()
        .into_iter()
        .find(|k| k.ends_with(word.as_bytes()))
        .unwrap()
}

#[test]
fn display_summarises_the_chain() {
    let (mut s, _) = fresh();
    let qs = QuerySet::of_type(&mut s, ObjectType::Phrase).unwrap();
    assert_eq!(qs.to_string(), "<QuerySet Phrase>");
    let qs = qs
        .filter([("words__phones__label", "t")])
        .unwrap()
        .exclude([("duration__lt", 100)])
        .unwrap()
        .order_by(["-start", "label__len"])
        .unwrap();
    assert_eq!(
        qs.to_string(),
        "<QuerySet Phrase: filter(words.phones.label == 't'), exclude(duration < 100), \
         order_by(-start, label.len)>"
    );
}
