//! Integration tests for the reference lifecycle: lazy sync, eviction,
//! stage composition and reconciliation, driven through the public model API.

use std::cell::RefCell;
use std::rc::Rc;

use tree_pager::cache::{AccessOrderedCache, CacheId};
use tree_pager::error::Error;
use tree_pager::fragment::Fragment;
use tree_pager::model::{Model, NodeEvent};
use tree_pager::policy::{CachingPolicy, StaticAttributes, StaticSubtree};
use tree_pager::selector::Selector;
use tree_pager::source::MemorySource;
use tree_pager::tree::{NodeId, PolicyId};

fn table(title: &str) -> Fragment {
    Fragment::new("table")
        .with_attribute("title", title)
        .with_child(Fragment::new("row").with_attribute("id", "1"))
        .with_child(Fragment::new("row").with_attribute("id", "2"))
}

fn record(model: &mut Model, node: NodeId) -> Rc<RefCell<Vec<NodeEvent>>> {
    let events: Rc<RefCell<Vec<NodeEvent>>> = Rc::default();
    let sink = Rc::clone(&events);
    model
        .add_listener(
            node,
            Rc::new(move |_: &mut Model, event: &NodeEvent| sink.borrow_mut().push(event.clone())),
        )
        .unwrap();
    events
}

fn dirty_transitions(events: &[NodeEvent]) -> Vec<bool> {
    events
        .iter()
        .filter_map(|event| match event {
            NodeEvent::DirtyChanged { dirty, .. } => Some(*dirty),
            _ => None,
        })
        .collect()
}

/// One policy over flat tables, static `id` and `ns:*`
struct Tables {
    model: Model,
    source: Rc<MemorySource>,
    policy: PolicyId,
    cache: CacheId,
    container: NodeId,
}

impl Tables {
    fn new(capacity: usize) -> Self {
        let source = Rc::new(
            MemorySource::new()
                .with_document("a", table("A"))
                .with_document("b", table("B"))
                .with_document("c", table("C")),
        );
        let mut model = Model::new();
        let cache = model.register_cache(Box::new(AccessOrderedCache::new(capacity)));
        let policy = model.register_policy(
            CachingPolicy::new("tables", source.clone())
                .with_cache(cache)
                .with_static_attributes(StaticAttributes::parse("id, ns:*")),
        );
        let container = model.create_node("db");
        Self {
            model,
            source,
            policy,
            cache,
            container,
        }
    }

    fn reference(&mut self, id: &str) -> NodeId {
        let reference = self.model.create_reference("table", Some(self.policy)).unwrap();
        self.model.tree_mut().set_attribute(reference, "id", id).unwrap();
        self.model.add_child(self.container, reference).unwrap();
        reference
    }

    fn resident(&self, reference: NodeId) -> bool {
        self.model.cache(self.cache).unwrap().contains(reference)
    }

    fn is_empty(&self, reference: NodeId) -> bool {
        self.model.tree().children(reference).unwrap().is_empty()
    }
}

/// Tables whose `rows` child is a dirty secondary stage
struct Staged {
    model: Model,
    source: Rc<MemorySource>,
    rows: PolicyId,
    cache: CacheId,
    container: NodeId,
    tables: PolicyId,
}

impl Staged {
    fn new(capacity: usize) -> Self {
        let rows_of = |id: &str| {
            Fragment::new("table")
                .with_attribute("title", id)
                .with_child(Fragment::new("rows").with_attribute("id", &format!("{}-rows", id)))
        };
        let source = Rc::new(
            MemorySource::new()
                .with_document("users", rows_of("users"))
                .with_document("orders", rows_of("orders"))
                .with_document(
                    "users-rows",
                    Fragment::new("rows")
                        .with_child(Fragment::new("row").with_attribute("id", "1"))
                        .with_child(Fragment::new("row").with_attribute("id", "2")),
                )
                .with_document("orders-rows", Fragment::new("rows")),
        );
        let mut model = Model::new();
        let cache = model.register_cache(Box::new(AccessOrderedCache::new(capacity)));
        let rows = model.register_policy(
            CachingPolicy::new("rows", source.clone())
                .with_cache(cache)
                .with_static_attributes(StaticAttributes::parse("id")),
        );
        let tables = model.register_policy(
            CachingPolicy::new("tables", source.clone())
                .with_cache(cache)
                .with_static_attributes(StaticAttributes::parse("id"))
                .with_stage(Selector::parse("rows").unwrap(), rows, true),
        );
        let container = model.create_node("db");
        Self {
            model,
            source,
            rows,
            cache,
            container,
            tables,
        }
    }

    fn table(&mut self, id: &str) -> NodeId {
        let reference = self.model.create_reference("table", Some(self.tables)).unwrap();
        self.model.tree_mut().set_attribute(reference, "id", id).unwrap();
        self.model.add_child(self.container, reference).unwrap();
        reference
    }

    fn resident(&self, reference: NodeId) -> bool {
        self.model.cache(self.cache).unwrap().contains(reference)
    }
}

// ============================================================================
// Dirty flag and static attributes
// ============================================================================

#[test]
fn test_reference_is_dirty_until_synced_and_after_clear() {
    let mut t = Tables::new(0);
    let a = t.reference("a");
    assert!(t.model.is_dirty(a).unwrap());
    assert!(t.is_empty(a));

    assert_eq!(t.model.children(a).unwrap().len(), 2);
    assert!(!t.model.is_dirty(a).unwrap());
    assert_eq!(t.model.tree().attribute(a, "title").unwrap(), Some("A"));

    t.model.clear_cache(a).unwrap();
    assert!(t.model.is_dirty(a).unwrap());
    assert!(t.is_empty(a));
    assert_eq!(t.model.tree().attribute(a, "title").unwrap(), None);
    assert_eq!(t.model.tree().attribute(a, "id").unwrap(), Some("a"));
    assert!(!t.resident(a));
}

#[test]
fn test_static_attributes_never_sync() {
    let mut t = Tables::new(0);
    let a = t.reference("a");
    t.model.tree_mut().set_attribute(a, "ns:kind", "table").unwrap();

    assert_eq!(t.model.attribute(a, "id").unwrap().as_deref(), Some("a"));
    assert_eq!(t.model.attribute(a, "ns:kind").unwrap().as_deref(), Some("table"));
    t.model.set_attribute(a, "ns:owner", "ops").unwrap();
    t.model.remove_attribute(a, "ns:owner").unwrap();
    t.model.set_attribute(a, "id", "a").unwrap();
    assert_eq!(t.source.fetch_count(), 0);
    assert!(t.model.is_dirty(a).unwrap());
}

#[test]
fn test_other_attributes_sync_exactly_once() {
    let mut t = Tables::new(0);
    let a = t.reference("a");
    assert_eq!(t.model.attribute(a, "title").unwrap().as_deref(), Some("A"));
    assert_eq!(t.source.fetch_count(), 1);
    t.model.attribute(a, "title").unwrap();
    t.model.children(a).unwrap();
    assert_eq!(t.source.fetch_count(), 1);

    let b = t.reference("b");
    t.model.set_attribute(b, "title", "mine").unwrap();
    assert_eq!(t.source.fetch_count(), 2);
    assert_eq!(t.model.attribute(b, "title").unwrap().as_deref(), Some("mine"));
}

#[test]
fn test_suppressed_access_leaves_reference_dirty() {
    let mut t = Tables::new(0);
    let a = t.reference("a");
    let children = t.model.with_sync_suppressed(|m| m.children(a)).unwrap();
    assert!(children.is_empty());
    assert!(t.model.is_dirty(a).unwrap());
    assert_eq!(t.source.fetch_count(), 0);
}

// ============================================================================
// clear_cache
// ============================================================================

#[test]
fn test_second_clear_is_silent() {
    let mut t = Tables::new(0);
    let a = t.reference("a");
    t.model.children(a).unwrap();
    t.model.clear_cache(a).unwrap();

    let events = record(&mut t.model, a);
    t.model.clear_cache(a).unwrap();
    assert!(events.borrow().is_empty());
    assert!(t.model.is_dirty(a).unwrap());
    assert_eq!(t.source.fetch_count(), 1);
}

#[test]
fn test_clearing_observed_reference_resyncs() {
    let mut t = Tables::new(0);
    let a = t.reference("a");
    t.model.children(a).unwrap();
    let events = record(&mut t.model, a);

    t.model.clear_cache(a).unwrap();
    assert!(!t.model.is_dirty(a).unwrap());
    assert_eq!(t.model.tree().children(a).unwrap().len(), 2);
    assert_eq!(t.source.fetch_count(), 2);
    assert_eq!(dirty_transitions(&events.borrow()), vec![true, false]);
}

#[test]
fn test_listener_reading_during_sync_does_not_recurse() {
    let mut t = Tables::new(0);
    let a = t.reference("a");
    let seen: Rc<RefCell<Vec<usize>>> = Rc::default();
    let sink = Rc::clone(&seen);
    t.model
        .add_listener(
            a,
            Rc::new(move |m: &mut Model, event: &NodeEvent| {
                if let NodeEvent::DirtyChanged { node, dirty: false } = event {
                    sink.borrow_mut().push(m.children(*node).unwrap().len());
                }
            }),
        )
        .unwrap();

    assert_eq!(t.model.children(a).unwrap().len(), 2);
    assert_eq!(*seen.borrow(), vec![0]);
    assert_eq!(t.source.fetch_count(), 1);
}

// ============================================================================
// Eviction
// ============================================================================

#[test]
fn test_resident_child_pins_parent() {
    let mut s = Staged::new(1);
    let users = s.table("users");
    let children = s.model.children(users).unwrap();
    assert_eq!(children.len(), 1);
    let rows = children[0];
    assert!(s.model.is_reference(rows));
    assert!(s.model.is_dirty(rows).unwrap());
    assert!(s.resident(users));

    // Admitting the child pins the parent instead of evicting it.
    assert_eq!(s.model.children(rows).unwrap().len(), 2);
    assert!(s.resident(rows));
    assert!(!s.resident(users));
    assert!(!s.model.is_dirty(users).unwrap());

    // The next admission evicts the child, never the pinned parent.
    let orders = s.table("orders");
    s.model.children(orders).unwrap();
    assert!(s.model.is_dirty(rows).unwrap());
    assert!(!s.model.is_dirty(users).unwrap());
    assert!(s.resident(users));
    assert!(s.resident(orders));
}

#[test]
fn test_clearing_child_releases_parent() {
    let mut s = Staged::new(0);
    let users = s.table("users");
    let rows = s.model.children(users).unwrap()[0];
    s.model.children(rows).unwrap();
    assert!(!s.resident(users));

    s.model.clear_cache(rows).unwrap();
    assert!(s.model.is_dirty(rows).unwrap());
    assert!(!s.resident(rows));
    assert!(s.resident(users));
}

/// room -> shelf -> box, each level a lazily staged reference in one cache
struct Nested {
    model: Model,
    cache: CacheId,
    room: NodeId,
}

impl Nested {
    fn new() -> Self {
        let source = Rc::new(
            MemorySource::new()
                .with_document(
                    "room",
                    Fragment::new("room").with_child(Fragment::new("shelf").with_attribute("id", "shelf")),
                )
                .with_document(
                    "shelf",
                    Fragment::new("shelf").with_child(Fragment::new("box").with_attribute("id", "box")),
                )
                .with_document("box", Fragment::new("box").with_child(Fragment::new("item"))),
        );
        let mut model = Model::new();
        let cache = model.register_cache(Box::new(AccessOrderedCache::new(10)));
        let boxes = model.register_policy(
            CachingPolicy::new("boxes", source.clone())
                .with_cache(cache)
                .with_static_attributes(StaticAttributes::parse("id")),
        );
        let shelves = model.register_policy(
            CachingPolicy::new("shelves", source.clone())
                .with_cache(cache)
                .with_static_attributes(StaticAttributes::parse("id"))
                .with_stage(Selector::parse("box").unwrap(), boxes, true),
        );
        let rooms = model.register_policy(
            CachingPolicy::new("rooms", source)
                .with_cache(cache)
                .with_static_attributes(StaticAttributes::parse("id"))
                .with_stage(Selector::parse("shelf").unwrap(), shelves, true),
        );
        let container = model.create_node("house");
        let room = model.create_reference("room", Some(rooms)).unwrap();
        model.tree_mut().set_attribute(room, "id", "room").unwrap();
        model.add_child(container, room).unwrap();
        Self { model, cache, room }
    }

    /// Populate all three levels; returns (shelf, box)
    fn open_all(&mut self) -> (NodeId, NodeId) {
        let shelf = self.model.children(self.room).unwrap()[0];
        let inner = self.model.children(shelf).unwrap()[0];
        assert_eq!(self.model.children(inner).unwrap().len(), 1);
        (shelf, inner)
    }

    fn resident(&self, reference: NodeId) -> bool {
        self.model.cache(self.cache).unwrap().contains(reference)
    }
}

#[test]
fn test_clearing_pinned_middle_releases_grandparent() {
    let mut n = Nested::new();
    let (shelf, inner) = n.open_all();
    assert!(!n.resident(n.room));
    assert!(!n.resident(shelf));
    assert!(n.resident(inner));

    n.model.clear_cache(shelf).unwrap();
    assert!(n.model.is_dirty(shelf).unwrap());
    assert!(!n.model.tree().contains(inner));
    assert!(!n.model.is_dirty(n.room).unwrap());
    assert!(n.resident(n.room));
    assert_eq!(n.model.cache(n.cache).unwrap().size(), Some(1));
}

#[test]
fn test_switching_policy_of_pinned_middle_releases_grandparent() {
    let mut n = Nested::new();
    let (shelf, inner) = n.open_all();
    assert!(n.resident(inner));

    let other = n
        .model
        .register_policy(CachingPolicy::new("other", Rc::new(MemorySource::new())));
    n.model.set_policy(shelf, other).unwrap();
    assert!(n.model.is_dirty(shelf).unwrap());
    assert!(n.resident(n.room));
    assert_eq!(n.model.cache(n.cache).unwrap().size(), Some(1));
}

#[test]
fn test_least_recently_touched_is_evicted() {
    let mut t = Tables::new(2);
    let a = t.reference("a");
    let b = t.reference("b");
    let c = t.reference("c");
    for reference in [a, b, c] {
        t.model.attribute(reference, "title").unwrap();
    }
    assert!(t.model.is_dirty(a).unwrap());
    assert!(t.is_empty(a));
    assert!(t.resident(b) && t.resident(c));

    // Re-reading A syncs it again; B is now the oldest.
    assert_eq!(t.model.attribute(a, "title").unwrap().as_deref(), Some("A"));
    assert!(t.resident(a) && t.resident(c));
    assert!(t.model.is_dirty(b).unwrap());
    assert!(t.is_empty(b));
    assert_eq!(t.source.fetch_count(), 4);
}

#[test]
fn test_touch_protects_from_eviction() {
    let mut t = Tables::new(2);
    let a = t.reference("a");
    let b = t.reference("b");
    let c = t.reference("c");
    for reference in [a, b, c] {
        t.model.attribute(reference, "title").unwrap();
    }
    t.model.attribute(b, "title").unwrap();

    t.model.attribute(a, "title").unwrap();
    assert!(t.model.is_dirty(c).unwrap());
    assert!(t.is_empty(c));
    assert!(!t.model.is_dirty(b).unwrap());
    assert!(t.resident(a) && t.resident(b));
}

#[test]
fn test_observed_references_outgrow_capacity() {
    let mut t = Tables::new(1);
    let a = t.reference("a");
    let b = t.reference("b");
    t.model.children(a).unwrap();
    let _events = record(&mut t.model, a);

    t.model.children(b).unwrap();
    assert!(!t.model.is_dirty(a).unwrap());
    assert!(!t.model.is_dirty(b).unwrap());
    assert_eq!(t.model.cache_stats()[0].size, Some(2));
}

// ============================================================================
// Sync failures and policy switches
// ============================================================================

#[test]
fn test_failed_sync_still_admits_and_relocks() {
    let mut t = Tables::new(0);
    let ghost = t.reference("ghost");
    t.model.lock(ghost).unwrap();

    let error = t.model.children(ghost).unwrap_err();
    assert!(error.is_sync_failure());
    assert!(error.to_string().contains("no document 'ghost'"));
    assert!(!t.model.is_dirty(ghost).unwrap());
    assert!(t.model.is_locked(ghost).unwrap());
    assert!(t.resident(ghost));

    // Retry by marking dirty again.
    t.source.put("ghost", table("Ghost"));
    t.model.clear_cache(ghost).unwrap();
    assert!(t.model.is_dirty(ghost).unwrap());
    assert_eq!(t.model.children(ghost).unwrap().len(), 2);
    assert!(t.model.is_locked(ghost).unwrap());
}

#[test]
fn test_sync_without_policy() {
    let mut model = Model::new();
    let orphan = model.create_reference("orphan", None).unwrap();
    assert!(matches!(model.sync(orphan), Err(Error::NoPolicy { .. })));
    assert!(matches!(model.flush(orphan), Err(Error::NoPolicy { .. })));
    let plain = model.create_node("plain");
    assert!(matches!(model.sync(plain), Err(Error::NoPolicy { .. })));
}

#[test]
fn test_switching_policy_logs_failed_clear() {
    testing_logger::setup();
    let mut t = Tables::new(0);
    let a = t.reference("a");
    t.model.children(a).unwrap();
    let _events = record(&mut t.model, a);
    t.source.remove_document("a");

    let other = t
        .model
        .register_policy(CachingPolicy::new("other", Rc::new(MemorySource::new())));
    t.model.set_policy(a, other).unwrap();

    testing_logger::validate(|captured_logs| {
        assert!(captured_logs
            .iter()
            .any(|log| log.level == log::Level::Warn && log.body.contains("before switching policies")));
    });
    assert_eq!(t.model.tree().policy(a).unwrap(), Some(other));
    assert!(!t.resident(a));
}

#[test]
fn test_explicit_sync_repopulates_in_place() {
    let mut t = Tables::new(0);
    let a = t.reference("a");
    let rows = t.model.children(a).unwrap();
    t.source.put("a", table("Renamed"));

    t.model.sync(a).unwrap();
    assert_eq!(t.model.tree().attribute(a, "title").unwrap(), Some("Renamed"));
    assert_eq!(t.model.tree().children(a).unwrap(), rows.as_slice());
}

#[test]
fn test_flush_and_checkin_persist_edits() {
    let mut t = Tables::new(0);
    let a = t.reference("a");
    t.model.set_attribute(a, "title", "Edited").unwrap();
    t.model.flush(a).unwrap();
    assert_eq!(t.source.document("a").unwrap().attributes["title"], "Edited");
    t.model.checkin(a).unwrap();
    assert_eq!(t.source.flush_count(), 2);
}

// ============================================================================
// Stage composition
// ============================================================================

#[test]
fn test_stage_substitution_preserves_position() {
    let mut model = Model::new();
    let source = Rc::new(MemorySource::new());
    let bs = model.register_policy(CachingPolicy::new("bs", source.clone()));
    let outer = model.register_policy(
        CachingPolicy::new("outer", source).with_stage(Selector::parse("b").unwrap(), bs, true),
    );
    let local = model
        .instantiate(
            &Fragment::new("a")
                .with_child(Fragment::new("b").with_attribute("k", "v"))
                .with_child(Fragment::new("c")),
        )
        .unwrap();

    let policy = model.policy(outer).unwrap();
    let reference = policy.create_external_tree(&mut model, local, false, None).unwrap();
    let tree = model.tree();
    let children = tree.children(reference).unwrap().to_vec();
    assert_eq!(children.len(), 2);
    assert!(tree.is_reference(children[0]));
    assert_eq!(tree.name(children[0]).unwrap(), "b");
    assert_eq!(tree.policy(children[0]).unwrap(), Some(bs));
    assert!(tree.is_dirty(children[0]).unwrap());
    assert_eq!(tree.attribute(children[0], "k").unwrap(), None);
    assert_eq!(tree.name(children[1]).unwrap(), "c");
    assert_eq!(tree.index_of(children[1]).unwrap(), Some(1));
    assert!(!tree.is_reference(children[1]));
    assert!(!tree.contains(local));
}

#[test]
fn test_static_subtrees_and_skeleton() {
    let source = Rc::new(
        MemorySource::new()
            .with_document("empty", Fragment::new("table"))
            .with_document("full", Fragment::new("table").with_child(Fragment::new("row")))
            .with_document("audit-log", Fragment::new("audit").with_child(Fragment::new("entry"))),
    );
    let mut model = Model::new();
    let audit = model.register_policy(
        CachingPolicy::new("audit", source.clone()).with_static_attributes(StaticAttributes::parse("id")),
    );
    let tables = model.register_policy(
        CachingPolicy::new("tables", source)
            .with_static_attributes(StaticAttributes::parse("id"))
            .with_skeleton(
                Fragment::new("table")
                    .with_attribute("kind", "empty")
                    .with_child(Fragment::new("placeholder")),
            )
            .with_static_subtree(StaticSubtree::new(Fragment::new("meta")))
            .with_static_subtree(StaticSubtree::with_policy(
                Fragment::new("audit").with_attribute("id", "audit-log"),
                audit,
            )),
    );

    let full = model.create_reference("table", Some(tables)).unwrap();
    model.tree_mut().set_attribute(full, "id", "full").unwrap();
    let children = model.children(full).unwrap();
    let names: Vec<String> = children.iter().map(|c| model.name(*c).unwrap()).collect();
    assert_eq!(names, vec!["row", "meta", "audit"]);
    assert!(model.is_dirty(children[2]).unwrap());
    assert_eq!(model.children(children[2]).unwrap().len(), 1);
    assert_eq!(model.tree().attribute(full, "kind").unwrap(), None);

    // Static subtrees count as content, so the skeleton never applies to
    // this policy; a policy without them shows it.
    let bare = model.register_policy(
        CachingPolicy::new("bare", Rc::new(MemorySource::new().with_document("empty", Fragment::new("table"))))
            .with_static_attributes(StaticAttributes::parse("id"))
            .with_skeleton(Fragment::new("table").with_attribute("kind", "empty").with_child(Fragment::new("placeholder"))),
    );
    let empty = model.create_reference("table", Some(bare)).unwrap();
    model.tree_mut().set_attribute(empty, "id", "empty").unwrap();
    let children = model.children(empty).unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(model.name(children[0]).unwrap(), "placeholder");
    assert_eq!(model.attribute(empty, "kind").unwrap().as_deref(), Some("empty"));
}

// ============================================================================
// Reconciliation
// ============================================================================

#[test]
fn test_update_leaves_unresolved_stage_alone() {
    let mut s = Staged::new(0);
    let users = s.table("users");
    let rows = s.model.children(users).unwrap()[0];
    assert!(s.model.is_dirty(rows).unwrap());

    s.model
        .update_from_text(
            users,
            r#"
name: table
attributes: { title: users }
children:
  - { name: rows, attributes: { id: users-rows } }
  - { name: note, value: added }
"#,
        )
        .unwrap();

    assert!(s.model.is_dirty(rows).unwrap());
    assert!(s.model.tree().children(rows).unwrap().is_empty());
    let children = s.model.tree().children(users).unwrap().to_vec();
    assert_eq!(children.len(), 2);
    assert_eq!(children[0], rows);
    assert_eq!(s.model.tree().value(children[1]).unwrap(), Some("added"));
    assert_eq!(s.source.fetch_count(), 1);
}

#[test]
fn test_update_keeps_populated_stage_content() {
    let mut s = Staged::new(0);
    let users = s.table("users");
    let rows = s.model.children(users).unwrap()[0];
    let row_ids = s.model.children(rows).unwrap();

    s.model
        .update_from_text(
            users,
            "name: table\nattributes: { title: users }\nchildren:\n  - { name: rows, attributes: { id: users-rows } }\n",
        )
        .unwrap();
    assert!(!s.model.is_dirty(rows).unwrap());
    assert_eq!(s.model.tree().children(rows).unwrap(), row_ids.as_slice());
}

#[test]
fn test_update_applies_minimal_changes() {
    let mut t = Tables::new(0);
    let a = t.reference("a");
    let rows = t.model.children(a).unwrap();
    let events = record(&mut t.model, a);

    t.model
        .update_from_text(
            a,
            "name: table\nattributes: { title: Renamed }\nchildren:\n  - { name: row, attributes: { id: '2' } }\n  - { name: row, attributes: { id: '3' } }\n",
        )
        .unwrap();

    let tree = t.model.tree();
    let children = tree.children(a).unwrap().to_vec();
    assert_eq!(children.len(), 2);
    assert_eq!(children[0], rows[1]);
    assert_eq!(tree.attribute(children[1], "id").unwrap(), Some("3"));
    assert_eq!(tree.attribute(a, "title").unwrap(), Some("Renamed"));
    assert_eq!(tree.attribute(a, "id").unwrap(), Some("a"));
    assert!(!tree.contains(rows[0]));
    assert!(events.borrow().contains(&NodeEvent::AttributeChanged {
        node: a,
        name: "title".to_string(),
        old: Some("A".to_string()),
        new: Some("Renamed".to_string()),
    }));
}

#[test]
fn test_update_of_dirty_reference_is_dropped() {
    let mut t = Tables::new(0);
    let b = t.reference("b");
    t.model.update_from_text(b, "name: table\nattributes: { title: X }\n").unwrap();
    assert!(t.model.is_dirty(b).unwrap());
    assert_eq!(t.source.fetch_count(), 0);
}

#[test]
fn test_insert_composes_stages() {
    let mut s = Staged::new(0);
    let users = s.table("users");
    s.model.children(users).unwrap();

    let row = s
        .model
        .insert_from_text(users, "name: row\nattributes: { id: '9' }", Some(0), false)
        .unwrap()
        .unwrap();
    assert_eq!(s.model.tree().index_of(row).unwrap(), Some(0));
    assert!(!s.model.is_reference(row));

    let rows = s
        .model
        .insert_from_text(users, "name: rows\nattributes: { id: orders-rows, extra: x }", None, false)
        .unwrap()
        .unwrap();
    assert!(s.model.is_reference(rows));
    assert!(s.model.is_dirty(rows).unwrap());
    assert_eq!(s.model.tree().policy(rows).unwrap(), Some(s.rows));
    assert_eq!(s.model.tree().attribute(rows, "extra").unwrap(), None);
    assert_eq!(s.model.tree().children(users).unwrap().len(), 3);
}

#[test]
fn test_insert_under_unpopulated_parent_is_dropped() {
    let mut s = Staged::new(0);
    let orders = s.table("orders");
    let before = s.model.tree().len();
    assert_eq!(s.model.insert_from_text(orders, "name: row", None, false).unwrap(), None);
    assert!(s.model.is_dirty(orders).unwrap());
    assert_eq!(s.model.tree().len(), before);
}

#[test]
fn test_malformed_and_unowned_content() {
    let mut t = Tables::new(0);
    let a = t.reference("a");
    t.model.children(a).unwrap();

    match t.model.insert_from_text(a, "name: [unclosed", None, false) {
        Err(Error::MalformedContent { text, .. }) => assert!(text.contains("unclosed")),
        other => panic!("Expected MalformedContent, got {:?}", other),
    }
    let container = t.container;
    assert!(matches!(
        t.model.insert_from_text(container, "name: row", None, false),
        Err(Error::NoPolicy { .. })
    ));
}

#[test]
fn test_remove_best_match() {
    let mut t = Tables::new(0);
    let a = t.reference("a");
    let rows = t.model.children(a).unwrap();

    assert!(t.model.remove_from_text(a, "name: row\nattributes: { id: '1' }").unwrap());
    assert_eq!(t.model.tree().children(a).unwrap(), &rows[1..]);
    assert!(!t.model.remove_from_text(a, "name: row\nattributes: { id: '1' }").unwrap());
    assert!(!t.model.remove_from_text(a, "name: column").unwrap());
}
