use indiek_core::{
    Entry, EntryRecord, KbError, KnowledgeBase, Lifecycle, MemoryStore, NoteKey, NoteRecord,
    NucleusRef, PersistencePort, Record, RecordKind,
};

fn abc<P: PersistencePort>(kb: &mut KnowledgeBase<P>) -> (NoteKey, NoteKey, NoteKey) {
    let n3 = kb.create_text_note("c");
    let n2 = kb.create_text_note("b");
    kb.add_content(n2, n3).unwrap();
    let n1 = kb.create_text_note("a");
    kb.add_content(n1, n2).unwrap();
    (n1, n2, n3)
}

#[test]
fn nested_notes_render_space_joined_in_order() {
    let mut kb = KnowledgeBase::new(MemoryStore::new());
    let (n1, n2, n3) = abc(&mut kb);

    assert_eq!(kb.render_note(n1).unwrap(), "a b c");
    assert_eq!(kb.render_note(n2).unwrap(), "b c");
    assert_eq!(kb.render_note(n3).unwrap(), "c");
    let empty = kb.create_note();
    assert_eq!(kb.render_note(empty).unwrap(), "");
}

#[test]
fn depth_follows_deepest_note_child() {
    let mut kb = KnowledgeBase::new(MemoryStore::new());
    let notes: Vec<NoteKey> = (1..=7)
        .map(|index| kb.create_text_note(format!("n{index}")))
        .collect();
    let [n1, n2, n3, n4, n5, n6, n7]: [NoteKey; 7] = notes.clone().try_into().unwrap();
    kb.add_content(n2, n3).unwrap();
    kb.add_content(n6, n7).unwrap();
    kb.add_content(n5, n6).unwrap();
    kb.add_content(n1, n2).unwrap();
    kb.add_content(n1, n4).unwrap();
    kb.add_content(n1, n5).unwrap();

    let depths: Vec<usize> = notes.iter().map(|note| kb.depth(*note).unwrap()).collect();
    assert_eq!(depths, vec![4, 2, 1, 1, 3, 2, 1]);

    kb.remove_entry(n1, 3).unwrap();
    assert_eq!(kb.depth(n1).unwrap(), 3);
}

#[test]
fn adding_an_ancestor_is_rejected_without_changes() {
    let mut kb = KnowledgeBase::new(MemoryStore::new());
    let (n1, n2, n3) = abc(&mut kb);

    let err = kb.add_content(n3, n1).unwrap_err();
    assert!(matches!(err, KbError::CycleRejected { parent, child } if parent == n3 && child == n1));
    let err = kb.add_content(n1, n1).unwrap_err();
    assert!(matches!(err, KbError::CycleRejected { .. }));
    let err = kb.set_entry(n3, 0, n2).unwrap_err();
    assert!(matches!(err, KbError::CycleRejected { .. }));

    assert_eq!(kb.note(n3).unwrap().entries(), &[Entry::Text("c".into())]);
    assert_eq!(kb.note(n1).unwrap().entries().len(), 2);
    assert_eq!(kb.render_note(n1).unwrap(), "a b c");
    assert!(kb.parents_of(n1).is_empty());
}

#[test]
fn shared_child_edits_are_visible_through_every_parent() {
    let mut kb = KnowledgeBase::new(MemoryStore::new());
    let (n1, _, n3) = abc(&mut kb);
    let other = kb.create_text_note("x");
    kb.add_content(other, n3).unwrap();

    let previous = kb.set_entry(n3, 0, "d").unwrap();
    assert_eq!(previous, Entry::Text("c".into()));
    assert_eq!(kb.render_note(n1).unwrap(), "a b d");
    assert_eq!(kb.render_note(other).unwrap(), "x d");
}

#[test]
fn deleting_a_child_drops_one_entry_and_keeps_grandchildren() {
    let store = MemoryStore::new();
    let mut kb = KnowledgeBase::new(&store);
    let n3 = kb.create_text_note("c");
    let n2 = kb.create_text_note("b");
    kb.add_content(n2, n3).unwrap();
    let n1 = kb.create_text_note("a");
    kb.add_content(n1, n2).unwrap();
    let n1_id = kb.save_note(n1).unwrap();
    let n2_id = kb.note(n2).unwrap().id().unwrap();
    let n3_id = kb.note(n3).unwrap().id().unwrap();

    kb.delete_note(n2).unwrap();

    assert_eq!(kb.note(n1).unwrap().entries().len(), 1);
    assert_eq!(kb.render_note(n1).unwrap(), "a");
    assert_eq!(kb.render_note(n3).unwrap(), "c");
    assert_eq!(kb.note(n2).unwrap().lifecycle(), Lifecycle::Deleted);
    assert!(!kb.exists_in_db(NucleusRef::Note(n2)).unwrap());

    assert!(store.load(RecordKind::Note, n2_id).is_err());
    assert!(store.load(RecordKind::Note, n3_id).is_ok());
    match store.load(RecordKind::Note, n1_id).unwrap() {
        Record::Note(record) => assert_eq!(record.entries.len(), 1),
        other => panic!("unexpected record: {other:?}"),
    }
}

#[test]
fn deleting_removes_every_occurrence_from_a_parent() {
    let mut kb = KnowledgeBase::new(MemoryStore::new());
    let child = kb.create_text_note("x");
    let parent = kb.create_note();
    kb.add_content(parent, child).unwrap();
    kb.add_content(parent, "y").unwrap();
    kb.add_content(parent, child).unwrap();
    assert_eq!(kb.render_note(parent).unwrap(), "x y x");

    kb.remove_entry(parent, 0).unwrap();
    assert_eq!(kb.parents_of(child), vec![parent]);

    kb.delete_note(child).unwrap();
    assert_eq!(kb.render_note(parent).unwrap(), "y");
    assert!(kb.parents_of(child).is_empty());
}

#[test]
fn mentions_propagate_through_nesting() {
    let mut kb = KnowledgeBase::new(MemoryStore::new());
    let target = kb.create_text_note("target");
    let target_id = kb.save_note(target).unwrap();

    let inner = kb.create_note();
    let outer = kb.create_note();
    kb.add_content(outer, inner).unwrap();
    assert!(kb.mentions(outer).unwrap().is_empty());

    let pointer = kb.create_pointer(target).unwrap();
    kb.add_content(inner, pointer).unwrap();
    assert!(kb.mentions(inner).unwrap().contains(&target_id));
    assert!(kb.mentions(outer).unwrap().contains(&target_id));
    assert_eq!(kb.mentions(outer).unwrap().len(), 1);

    kb.remove_entry(inner, 0).unwrap();
    assert!(kb.mentions(inner).unwrap().is_empty());
    assert!(kb.mentions(outer).unwrap().is_empty());
}

#[test]
fn save_then_load_shares_slots_within_a_session() {
    let store = MemoryStore::new();
    let mut kb = KnowledgeBase::new(&store);
    let (n1, _, n3) = abc(&mut kb);
    let id = kb.save_note(n1).unwrap();
    assert_eq!(kb.load_note(id).unwrap(), n1);

    let mut fresh = KnowledgeBase::new(&store);
    let reloaded = fresh.load_note(id).unwrap();
    assert_eq!(fresh.render_note(reloaded).unwrap(), "a b c");
    assert_eq!(fresh.note_snapshot(reloaded).unwrap(), kb.note_snapshot(n1).unwrap());

    let n3_id = kb.note(n3).unwrap().id().unwrap();
    let shared = fresh.load_note(n3_id).unwrap();
    fresh.set_entry(shared, 0, "z").unwrap();
    assert_eq!(fresh.render_note(reloaded).unwrap(), "a b z");
}

#[test]
fn saving_a_deleted_note_assigns_a_fresh_id() {
    let mut kb = KnowledgeBase::new(MemoryStore::new());
    let note = kb.create_text_note("again");
    let first = kb.save_note(note).unwrap();
    kb.delete_note(note).unwrap();

    let second = kb.save_note(note).unwrap();
    assert_ne!(first, second);
    assert_eq!(kb.note(note).unwrap().lifecycle(), Lifecycle::Saved);
}

#[test]
fn entry_edits_check_bounds_and_handles() {
    let mut kb = KnowledgeBase::new(MemoryStore::new());
    let note = kb.create_text_note("only");

    let err = kb.set_entry(note, 1, "x").unwrap_err();
    assert!(matches!(err, KbError::EntryOutOfRange { index: 1, len: 1, .. }));
    let err = kb.remove_entry(note, 3).unwrap_err();
    assert!(matches!(err, KbError::EntryOutOfRange { .. }));

    let mut other = KnowledgeBase::new(MemoryStore::new());
    other.create_note();
    other.create_note();
    let foreign = other.create_note();
    let err = kb.render_note(foreign).unwrap_err();
    assert!(matches!(err, KbError::UnknownNote(key) if key == foreign));
}

#[test]
fn loading_a_cyclic_stored_graph_is_invalid_data() {
    let store = MemoryStore::new();
    let first = store
        .save(
            RecordKind::Note,
            &Record::Note(NoteRecord {
                id: None,
                entries: vec![],
                mentions: vec![],
                pointer: false,
            }),
        )
        .unwrap();
    let second = store
        .save(
            RecordKind::Note,
            &Record::Note(NoteRecord {
                id: None,
                entries: vec![EntryRecord::Note(first)],
                mentions: vec![],
                pointer: false,
            }),
        )
        .unwrap();
    store
        .save(
            RecordKind::Note,
            &Record::Note(NoteRecord {
                id: Some(first),
                entries: vec![EntryRecord::Note(second)],
                mentions: vec![],
                pointer: false,
            }),
        )
        .unwrap();

    let mut kb = KnowledgeBase::new(&store);
    let err = kb.load_note(first).unwrap_err();
    assert!(matches!(err, KbError::InvalidData(_)));
}

fn stored_mentions<P: PersistencePort>(store: &P, id: i64) -> Vec<i64> {
    match store.load(RecordKind::Note, id).unwrap() {
        Record::Note(record) => record.mentions,
        other => panic!("unexpected record: {other:?}"),
    }
}

#[test]
fn detach_resaves_every_ancestor_whose_mentions_changed() {
    let store = MemoryStore::new();
    let mut kb = KnowledgeBase::new(&store);
    let target = kb.create_text_note("target");
    let target_id = kb.save_note(target).unwrap();
    let pointer = kb.create_pointer(target).unwrap();
    let holder = kb.create_text_note("holder");
    kb.add_content(holder, pointer).unwrap();
    let middle = kb.create_note();
    kb.add_content(middle, holder).unwrap();
    let top = kb.create_note();
    kb.add_content(top, middle).unwrap();
    let top_id = kb.save_note(top).unwrap();
    let middle_id = kb.id_of(NucleusRef::Note(middle)).unwrap().unwrap();
    assert_eq!(stored_mentions(&store, top_id), vec![target_id]);

    kb.delete_note(pointer).unwrap();

    assert!(kb.mentions(top).unwrap().is_empty());
    assert!(stored_mentions(&store, middle_id).is_empty());
    assert!(stored_mentions(&store, top_id).is_empty());

    let mut fresh = KnowledgeBase::new(&store);
    let reloaded = fresh.load_note(top_id).unwrap();
    assert_eq!(fresh.render_note(reloaded).unwrap(), "holder");
}

#[test]
fn loading_heals_ancestors_of_a_note_deleted_elsewhere() {
    let store = MemoryStore::new();
    let (top_id, child_id) = {
        let mut kb = KnowledgeBase::new(&store);
        let (n1, n2, _) = abc(&mut kb);
        let top_id = kb.save_note(n1).unwrap();
        (top_id, kb.id_of(NucleusRef::Note(n2)).unwrap().unwrap())
    };
    store.delete(RecordKind::Note, child_id).unwrap();

    let mut kb = KnowledgeBase::new(&store);
    let top = kb.load_note(top_id).unwrap();
    assert_eq!(kb.render_note(top).unwrap(), "a");
    match store.load(RecordKind::Note, top_id).unwrap() {
        Record::Note(record) => {
            assert_eq!(record.entries, vec![EntryRecord::Text("a".to_string())])
        }
        other => panic!("unexpected record: {other:?}"),
    }
}
