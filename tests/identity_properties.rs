//! End-to-end behaviour of identifier resolution through a host session.
//!
//! Run with: cargo test --test identity_properties

use namekeeper::binding_store::{BindingId, BindingStore, MemoryBindingStore};
use namekeeper::config::EngineConfig;
use namekeeper::events::{ChangeEvent, ChangeKind};
use namekeeper::program::{Attachment, Field, NodeId, NodeKind};
use namekeeper::session::Session;
use namekeeper::workspace::{Delivery, Workspace};

fn config() -> EngineConfig {
    EngineConfig::from_json(
        r#"{ "families": [
            { "prefix": "star", "nodeTypes": ["create_star"] },
            { "prefix": "box", "nodeTypes": ["create_box"] }
        ] }"#,
    )
    .unwrap()
}

fn binding(session: &Session, name: &str) -> BindingId {
    session.workspace.store.get_by_name(name).unwrap().id
}

fn name_in(session: &Session, node: NodeId, field: &str) -> String {
    let id = session.workspace.program.field_binding(node, field).unwrap();
    session.workspace.name_or_empty(id)
}

fn creator(ws: &mut Workspace, node_type: &str, name: &str) -> NodeId {
    let b = ws.binding_named(name, None).unwrap();
    let kind = config().kind_for(node_type);
    ws.create_node(node_type, kind, vec![Field::binding("ID_VAR", b)])
}

fn statement(ws: &mut Workspace, name: &str) -> NodeId {
    let b = ws.binding_named(name, None).unwrap();
    ws.create_node("move_forward", NodeKind::Statement, vec![Field::binding("TARGET", b)])
}

fn seed(ws: &mut Workspace, names: &[&str]) {
    for name in names {
        ws.binding_named(name, None).unwrap();
    }
}

/// Every binding field in the program plus every binding name.
fn snapshot(session: &Session) -> (Vec<(NodeId, Vec<Option<BindingId>>)>, Vec<String>) {
    let fields = session
        .workspace
        .program
        .nodes()
        .map(|n| (n.id, n.fields.iter().map(|f| f.get()).collect()))
        .collect();
    (fields, session.workspace.store.names())
}

#[test]
fn rerunning_without_new_events_changes_nothing() {
    let mut session = Session::in_memory(config());
    let original = session.load_program(|ws| {
        let original = creator(ws, "create_star", "star1");
        let child = statement(ws, "star1");
        ws.attach(child, original, Attachment::Slot("DO".into())).unwrap();
        original
    });

    session.workspace.duplicate_subtree(original, Delivery::Whole).unwrap();
    session.pump();
    let settled = snapshot(&session);

    assert_eq!(session.pump(), 0);
    assert_eq!(snapshot(&session), settled);

    // An unrelated event lets pending work settle without touching anything.
    session
        .workspace
        .emit(ChangeEvent::new(ChangeKind::Moved, original));
    session.pump();
    assert_eq!(snapshot(&session), settled);
    assert_eq!(session.engine.pending_count(), 0);
}

#[test]
fn duplicate_takes_the_lowest_free_suffix() {
    let mut session = Session::in_memory(config());
    let owner = session.load_program(|ws| {
        creator(ws, "create_star", "star1");
        creator(ws, "create_star", "star3")
    });
    assert_eq!(session.engine.families().next_index("star"), 4);

    let copy = session.workspace.duplicate_subtree(owner, Delivery::Whole).unwrap();
    session.pump();

    assert_eq!(name_in(&session, copy, "ID_VAR"), "star2");
    assert_eq!(name_in(&session, owner, "ID_VAR"), "star3");
    assert_eq!(session.engine.families().next_index("star"), 4);
}

#[test]
fn duplicate_splits_the_shared_binding_inside_the_copy_only() {
    let mut session = Session::in_memory(config());
    let (original, inner, outside) = session.load_program(|ws| {
        let original = creator(ws, "create_star", "star1");
        let inner = statement(ws, "star1");
        ws.attach(inner, original, Attachment::Slot("DO".into())).unwrap();
        let outside = statement(ws, "star1");
        (original, inner, outside)
    });

    let copy = session.workspace.duplicate_subtree(original, Delivery::Whole).unwrap();
    session.pump();

    let copied_inner = session.workspace.program.get(copy).unwrap().slots[0].child.unwrap();
    let old = binding(&session, "star1");
    let new = session.workspace.program.get(copy).unwrap().identity_binding().unwrap();

    assert_ne!(old, new);
    assert_eq!(session.workspace.binding_name(new), Some("star2"));
    assert_eq!(session.workspace.program.field_binding(copied_inner, "TARGET"), Ok(Some(new)));
    assert_eq!(session.workspace.program.field_binding(inner, "TARGET"), Ok(Some(old)));
    assert_eq!(session.workspace.program.field_binding(outside, "TARGET"), Ok(Some(old)));
    assert_eq!(session.workspace.program.get(original).unwrap().identity_binding(), Some(old));
}

#[test]
fn split_is_reported_as_one_grouped_event() {
    let mut session = Session::in_memory(config());
    let original = session.load_program(|ws| {
        let original = creator(ws, "create_star", "star1");
        let inner = statement(ws, "star1");
        ws.attach(inner, original, Attachment::Next).unwrap();
        original
    });
    session.take_journal();

    let copy = session.workspace.duplicate_subtree(original, Delivery::Whole).unwrap();
    session.pump();

    let summaries: Vec<_> = session
        .take_journal()
        .into_iter()
        .filter(|e| e.kind == ChangeKind::FieldChanged)
        .collect();
    assert_eq!(summaries.len(), 1);
    assert!(summaries[0].group_id.is_some());
    assert!(summaries[0].node_ids.contains(&copy));
}

#[test]
fn isolated_binding_is_adopted_by_the_new_creator() {
    let mut session = Session::in_memory(config());
    session.load_program(|ws| {
        creator(ws, "create_box", "box1");
        seed(ws, &["box3"]);
    });

    // A pasted creator still sharing box1, carrying a reference to box3
    // that nothing else in the program uses.
    let pasted = creator(&mut session.workspace, "create_box", "box1");
    let user = statement(&mut session.workspace, "box3");
    session.workspace.attach(user, pasted, Attachment::Slot("DO".into())).unwrap();
    session.pump();

    let new = session.workspace.program.get(pasted).unwrap().identity_binding().unwrap();
    assert_eq!(session.workspace.binding_name(new), Some("box2"));
    assert_eq!(session.workspace.program.field_binding(user, "TARGET"), Ok(Some(new)));
    assert!(session.workspace.store.get_by_name("box3").is_none());
    assert_eq!(session.engine.families().next_index("box"), 3);
}

#[test]
fn adoption_frees_a_slot_for_renumbering() {
    let mut session = Session::in_memory(config());
    session.load_program(|ws| {
        creator(ws, "create_box", "box1");
        creator(ws, "create_box", "box2");
        seed(ws, &["box3"]);
    });

    let pasted = creator(&mut session.workspace, "create_box", "box1");
    let user = statement(&mut session.workspace, "box3");
    session.workspace.attach(user, pasted, Attachment::Next).unwrap();
    session.pump();

    // Minted as box4, renamed to box3 once box3 was adopted away.
    assert_eq!(name_in(&session, pasted, "ID_VAR"), "box3");
    assert_eq!(name_in(&session, user, "TARGET"), "box3");
    assert_eq!(session.workspace.store.names().len(), 3);
    assert_eq!(session.engine.families().next_index("box"), 4);
}

#[test]
fn shared_or_other_family_bindings_are_not_adopted() {
    let mut session = Session::in_memory(config());
    let keeper = session.load_program(|ws| {
        creator(ws, "create_box", "box1");
        seed(ws, &["star5"]);
        statement(ws, "box3")
    });

    let pasted = creator(&mut session.workspace, "create_box", "box1");
    let shared_user = statement(&mut session.workspace, "box3");
    let star_user = statement(&mut session.workspace, "star5");
    session.workspace.attach(shared_user, pasted, Attachment::Next).unwrap();
    session.workspace.attach(star_user, shared_user, Attachment::Next).unwrap();
    session.pump();

    assert_eq!(name_in(&session, pasted, "ID_VAR"), "box2");
    assert_eq!(name_in(&session, shared_user, "TARGET"), "box3");
    assert_eq!(name_in(&session, keeper, "TARGET"), "box3");
    assert_eq!(name_in(&session, star_user, "TARGET"), "star5");
}

#[test]
fn references_from_a_node_being_deleted_block_adoption() {
    let mut session = Session::in_memory(config());
    let doomed = session.load_program(|ws| {
        creator(ws, "create_box", "box1");
        statement(ws, "box3")
    });

    let pasted = creator(&mut session.workspace, "create_box", "box1");
    let user = statement(&mut session.workspace, "box3");
    session.workspace.attach(user, pasted, Attachment::Next).unwrap();
    session.workspace.delete_subtree(doomed).unwrap();
    session.pump();

    assert!(!session.workspace.program.contains(doomed));
    assert_eq!(name_in(&session, user, "TARGET"), "box3");
    assert!(session.workspace.store.get_by_name("box3").is_some());
}

#[test]
fn custom_names_increment_across_repeated_duplication() {
    let mut session = Session::in_memory(config());
    let original = session.load_program(|ws| creator(ws, "create_star", "myCustomStar"));

    let first = session.workspace.duplicate_subtree(original, Delivery::Whole).unwrap();
    session.pump();
    assert_eq!(name_in(&session, first, "ID_VAR"), "myCustomStar1");

    let second = session.workspace.duplicate_subtree(first, Delivery::Whole).unwrap();
    session.pump();
    assert_eq!(name_in(&session, second, "ID_VAR"), "myCustomStar2");
    assert_eq!(name_in(&session, original, "ID_VAR"), "myCustomStar");
}

#[test]
fn numeric_custom_name_increments_its_trailing_integer() {
    let mut session = Session::in_memory(config());
    let original = session.load_program(|ws| creator(ws, "create_star", "myStar3"));

    let copy = session.workspace.duplicate_subtree(original, Delivery::Whole).unwrap();
    session.pump();
    assert_eq!(name_in(&session, copy, "ID_VAR"), "myStar4");
    assert_eq!(name_in(&session, original, "ID_VAR"), "myStar3");
}

#[test]
fn freshly_created_custom_node_gets_the_next_custom_name() {
    let mut session = Session::in_memory(config());
    session.load_program(|ws| seed(ws, &["myCustomStar"]));

    let node = creator(&mut session.workspace, "create_star", "myCustomStar");
    session.pump();
    assert_eq!(name_in(&session, node, "ID_VAR"), "myCustomStar1");
}

#[test]
fn replayed_creation_mutates_no_binding() {
    let mut session = Session::in_memory(config());
    let original = session.load_program(|ws| creator(ws, "create_star", "star1"));
    let before = snapshot(&session);

    let b = binding(&session, "star1");
    let kind = session.config.kind_for("create_star");
    let replayed = session
        .workspace
        .program
        .insert("create_star", kind, vec![Field::binding("ID_VAR", b)]);
    session.workspace.emit(ChangeEvent::created(replayed).replayed());
    session.pump();

    assert_eq!(session.workspace.store.names(), before.1);
    assert_eq!(session.workspace.program.field_binding(replayed, "ID_VAR"), Ok(Some(b)));
    assert_eq!(session.workspace.program.field_binding(original, "ID_VAR"), Ok(Some(b)));
}

#[test]
fn bulk_loading_modifies_no_field() {
    let mut session = Session::in_memory(config());
    let original = session.load_program(|ws| {
        let original = creator(ws, "create_star", "star1");
        let child = statement(ws, "star1");
        ws.attach(child, original, Attachment::Next).unwrap();
        seed(ws, &["box3"]);
        original
    });

    session.workspace.set_bulk_loading(true);
    let copy = session.workspace.duplicate_subtree(original, Delivery::Whole).unwrap();
    let extra = creator(&mut session.workspace, "create_star", "star1");
    let stray = statement(&mut session.workspace, "box3");
    session.workspace.attach(stray, copy, Attachment::Slot("DO".into())).unwrap();
    session.workspace.delete_subtree(extra).unwrap();
    session.workspace.emit(ChangeEvent::new(ChangeKind::FieldChanged, copy));
    session.pump();
    session.workspace.set_bulk_loading(false);

    let star1 = binding(&session, "star1");
    assert_eq!(session.workspace.program.get(copy).unwrap().identity_binding(), Some(star1));
    assert_eq!(name_in(&session, stray, "TARGET"), "box3");
    assert_eq!(
        session.workspace.store.names(),
        vec!["star1".to_string(), "box3".to_string()]
    );
    assert_eq!(session.engine.pending_count(), 0);
}

#[test]
fn pieces_arriving_after_the_split_are_retargeted() {
    let mut session = Session::in_memory(config());
    let (original, inner) = session.load_program(|ws| {
        let original = creator(ws, "create_star", "star1");
        let inner = statement(ws, "star1");
        ws.attach(inner, original, Attachment::Slot("DO".into())).unwrap();
        (original, inner)
    });

    // The root arrives first, the rest of the subtree later.
    let copy = session.workspace.duplicate_subtree(original, Delivery::RootOnly).unwrap();
    session.pump();
    assert_eq!(name_in(&session, copy, "ID_VAR"), "star2");
    assert!(session.engine.pending(copy).is_some());

    let piece = session.workspace.duplicate_subtree(inner, Delivery::Whole).unwrap();
    session.workspace.attach(piece, copy, Attachment::Slot("DO".into())).unwrap();
    session.pump();

    assert_eq!(name_in(&session, piece, "TARGET"), "star2");
    assert_eq!(name_in(&session, inner, "TARGET"), "star1");
    assert!(session.engine.pending(copy).is_none());
}

#[test]
fn pending_split_is_dropped_when_its_node_is_deleted() {
    let mut session = Session::in_memory(config());
    let original = session.load_program(|ws| creator(ws, "create_star", "star1"));

    let copy = session.workspace.duplicate_subtree(original, Delivery::RootOnly).unwrap();
    session.pump();
    assert_eq!(session.engine.pending_count(), 1);

    session.workspace.delete_subtree(copy).unwrap();
    session.pump();
    assert_eq!(session.engine.pending_count(), 0);
    assert!(!session.workspace.program.contains(copy));
}

#[test]
fn reserved_names_are_skipped_without_failing() {
    let store = MemoryBindingStore::with_reserved(["star2"]);
    let mut session = Session::new(config(), store);
    let original = session.load_program(|ws| creator(ws, "create_star", "star1"));

    let copy = session.workspace.duplicate_subtree(original, Delivery::Whole).unwrap();
    session.pump();

    assert_eq!(name_in(&session, copy, "ID_VAR"), "star3");
    assert!(session.engine.diagnostics().is_empty());
}

#[test]
fn demo_scenario_settles() {
    use namekeeper::scenario::{Scenario, ScenarioRunner};

    let scenario = Scenario::from_json(include_str!("../demos/duplicate_with_late_paste.json")).unwrap();
    let runner = ScenarioRunner::run(EngineConfig::default(), &scenario).unwrap();

    assert_eq!(runner.field_name("s3copy", "ID_VAR").as_deref(), Some("sphere2"));
    assert_eq!(runner.field_name("spinCopy", "TARGET").as_deref(), Some("sphere2"));
    assert_eq!(runner.field_name("spin", "TARGET").as_deref(), Some("sphere3"));
    assert_eq!(runner.field_name("lamp2", "ID_VAR").as_deref(), Some("myLamp1"));
    assert_eq!(runner.field_name("s1", "ID_VAR").as_deref(), Some("sphere1"));
    assert!(runner.report().diagnostics.is_empty());
}

#[test]
fn fresh_creator_never_takes_another_creators_name() {
    let mut session = Session::in_memory(config());
    let owner = session.load_program(|ws| {
        seed(ws, &["foo"]);
        creator(ws, "create_star", "foo1")
    });

    let fresh = creator(&mut session.workspace, "create_star", "foo");
    session.pump();

    assert_eq!(name_in(&session, owner, "ID_VAR"), "foo1");
    assert_eq!(name_in(&session, fresh, "ID_VAR"), "foo2");
    assert_ne!(
        session.workspace.program.get(owner).unwrap().identity_binding(),
        session.workspace.program.get(fresh).unwrap().identity_binding()
    );
}
