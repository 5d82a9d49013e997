//! Automaton generator integration tests
//!
//! Builds automatons from the JSON fixtures and from hand-built schema
//! sets and checks the resulting graph shape.

use std::path::PathBuf;
use std::sync::Arc;

use pretty_assertions::assert_eq;

use xmlschema_docpath::model::{Compositor, ModelGroup, Wildcard};
use xmlschema_docpath::{
    load_model_file, Automaton, AutomatonCache, AutomatonGenerator, ElementDecl, Error, NodeId,
    NodeType, Occurs, Particle, SchemaModel, SchemaSet, TypeKind, QName,
};

const AVRO_NS: &str = "http://avro.apache.org/AvroTest";

fn fixtures_dir() -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path
}

fn avro(local: &str) -> QName {
    QName::namespaced(AVRO_NS, local)
}

fn avro_automaton() -> Automaton {
    let schema = load_model_file(fixtures_dir().join("avro.json")).unwrap();
    AutomatonGenerator::new(&schema).generate_global(&avro("root")).unwrap()
}

fn edge_types(automaton: &Automaton, id: NodeId) -> Vec<NodeType> {
    automaton
        .node(id)
        .unwrap()
        .next_states()
        .iter()
        .map(|&edge| automaton.node(edge).unwrap().node_type())
        .collect()
}

fn edge_names(automaton: &Automaton, id: NodeId) -> Vec<String> {
    automaton
        .node(id)
        .unwrap()
        .next_states()
        .iter()
        .filter_map(|&edge| automaton.node(edge).unwrap().element())
        .map(|info| info.name.local_name.clone())
        .collect()
}

// ============================================================================
// Fixture Schema
// ============================================================================

#[test]
fn test_avro_structure() {
    let automaton = avro_automaton();

    let root = automaton.start_node();
    assert_eq!(root.node_type(), NodeType::Element);
    assert_eq!(root.element().unwrap().name, avro("root"));
    assert_eq!(root.element().unwrap().type_info.kind, TypeKind::Complex);
    assert_eq!(
        root.element().unwrap().type_info.name,
        Some(avro("rootType"))
    );

    // root -> values sequence -> repeated choice
    let sequence = root.next_states()[0];
    assert_eq!(edge_types(&automaton, sequence), vec![NodeType::Choice]);

    let choice = automaton.edge(sequence, 0).unwrap();
    let choice_node = automaton.node(choice).unwrap();
    assert_eq!(choice_node.occurs(), Occurs::zero_or_more());
    assert_eq!(
        edge_types(&automaton, choice),
        vec![
            NodeType::Element,
            NodeType::Element,
            NodeType::SubstitutionGroup,
            NodeType::Element,
            NodeType::Element,
        ]
    );

    // the record head comes first, then its substitutes
    let record = automaton.edge(choice, 2).unwrap();
    assert_eq!(edge_names(&automaton, record), vec!["record", "map"]);

    let primitive = automaton.node(automaton.edge(choice, 0).unwrap()).unwrap();
    assert!(primitive.element().unwrap().nillable);
    assert!(primitive.next_states().is_empty());
}

#[test]
fn test_avro_tuple_is_all_group() {
    let automaton = avro_automaton();
    let sequence = automaton.start_node().next_states()[0];
    let choice = automaton.edge(sequence, 0).unwrap();
    let tuple = automaton.edge(choice, 4).unwrap();

    let all = automaton.edge(tuple, 0).unwrap();
    assert_eq!(automaton.node(all).unwrap().node_type(), NodeType::All);
    assert_eq!(
        edge_types(&automaton, all),
        vec![
            NodeType::Element,
            NodeType::Element,
            NodeType::SubstitutionGroup,
            NodeType::Element,
        ]
    );
    assert!(!automaton.node(all).unwrap().content_emptiable());
}

#[test]
fn test_avro_recursion_is_a_back_edge() {
    let automaton = avro_automaton();
    let sequence = automaton.start_node().next_states()[0];
    let choice = automaton.edge(sequence, 0).unwrap();
    let record_group = automaton.edge(choice, 2).unwrap();
    let record = automaton.edge(record_group, 0).unwrap();

    // record's own content reaches the same substitution group node again
    let record_sequence = automaton.edge(record, 0).unwrap();
    let record_choice = automaton.edge(record_sequence, 0).unwrap();
    assert_eq!(automaton.edge(record_choice, 2).unwrap(), record_group);

    // generating twice yields the same graph
    assert_eq!(avro_automaton(), automaton);
}

#[test]
fn test_avro_first_names() {
    let automaton = avro_automaton();
    let sequence = automaton.start_node().next_states()[0];
    let names: Vec<String> = automaton
        .first_names(sequence)
        .into_iter()
        .map(|name| name.local_name)
        .collect();
    assert_eq!(
        names,
        vec!["primitive", "nonNullPrimitive", "record", "map", "list", "tuple"]
    );
    assert!(automaton.node(sequence).unwrap().content_emptiable());
    assert!(automaton.required_names(sequence).is_empty());
}

#[test]
fn test_display_lists_every_node() {
    let automaton = avro_automaton();
    let dump = automaton.to_string();
    assert_eq!(dump.lines().count(), automaton.len());
    assert!(dump.starts_with('*'));
    assert!(dump.contains("substitution"));
}

// ============================================================================
// Hand-built Schemas
// ============================================================================

fn qn(local: &str) -> QName {
    QName::namespaced("urn:test", local)
}

#[test]
fn test_recursion_bounded_by_declarations() {
    // tree = sequence(leaf*, tree*), each level a fresh element occurrence
    let mut schema = SchemaSet::new(Some("urn:test"));
    schema.add_global(ElementDecl::atomic(qn("leaf"))).unwrap();
    schema
        .add_global(ElementDecl::complex(
            qn("tree"),
            Particle::sequence(
                vec![
                    Particle::element_ref(qn("leaf"), Occurs::zero_or_more()),
                    Particle::element_ref(qn("tree"), Occurs::zero_or_more()),
                ],
                Occurs::once(),
            ),
        ))
        .unwrap();

    let automaton = AutomatonGenerator::new(&schema).generate_global(&qn("tree")).unwrap();
    // tree, content sequence, leaf*, tree*
    assert_eq!(automaton.len(), 4);

    let content = automaton.start_node().next_states()[0];
    let inner_tree = automaton.edge(content, 1).unwrap();
    assert_eq!(automaton.edge(inner_tree, 0).unwrap(), content);
}

#[test]
fn test_substitution_order_follows_declarations() {
    let mut schema = SchemaSet::new(Some("urn:test"));
    schema
        .add_global(ElementDecl::atomic(qn("shape")).abstract_element())
        .unwrap();
    schema
        .add_global(ElementDecl::atomic(qn("circle")).substitutes(qn("shape")))
        .unwrap();
    schema
        .add_global(ElementDecl::atomic(qn("polygon")).substitutes(qn("shape")))
        .unwrap();
    schema
        .add_global(ElementDecl::atomic(qn("square")).substitutes(qn("polygon")))
        .unwrap();
    schema
        .add_global(ElementDecl::atomic(qn("ellipse")).substitutes(qn("shape")))
        .unwrap();
    schema
        .add_global(ElementDecl::complex(
            qn("drawing"),
            Particle::sequence(
                vec![Particle::element_ref(qn("shape"), Occurs::one_or_more())],
                Occurs::once(),
            ),
        ))
        .unwrap();

    let automaton = AutomatonGenerator::new(&schema)
        .generate_global(&qn("drawing"))
        .unwrap();
    let content = automaton.start_node().next_states()[0];
    let group = automaton.edge(content, 0).unwrap();

    let group_node = automaton.node(group).unwrap();
    assert_eq!(group_node.node_type(), NodeType::SubstitutionGroup);
    assert_eq!(group_node.occurs(), Occurs::one_or_more());
    assert_eq!(
        edge_names(&automaton, group),
        vec!["shape", "circle", "polygon", "square", "ellipse"]
    );

    // the abstract head keeps its edge but never matches
    let head = automaton.node(automaton.edge(group, 0).unwrap()).unwrap();
    assert!(head.element().unwrap().abstract_element);
    assert!(!head.matches(&qn("shape")));
    assert_eq!(
        automaton.first_names(group),
        vec![qn("circle"), qn("polygon"), qn("square"), qn("ellipse")]
    );
}

#[test]
fn test_root_heading_a_substitution_group() {
    let mut schema = SchemaSet::new(None);
    schema.add_global(ElementDecl::atomic(QName::local("head"))).unwrap();
    schema
        .add_global(ElementDecl::atomic(QName::local("member")).substitutes(QName::local("head")))
        .unwrap();

    let automaton = AutomatonGenerator::new(&schema)
        .generate_global(&QName::local("head"))
        .unwrap();
    assert_eq!(automaton.start_node().node_type(), NodeType::SubstitutionGroup);
    assert_eq!(edge_names(&automaton, automaton.start()), vec!["head", "member"]);
}

#[test]
fn test_dangling_reference_names_component() {
    let mut schema = SchemaSet::new(Some("urn:test"));
    schema
        .add_global(ElementDecl::complex(
            qn("root"),
            Particle::choice(
                vec![
                    Particle::element_ref(qn("present"), Occurs::once()),
                    Particle::group_ref(qn("absent"), Occurs::once()),
                ],
                Occurs::once(),
            ),
        ))
        .unwrap();
    schema.add_global(ElementDecl::atomic(qn("present"))).unwrap();

    let err = AutomatonGenerator::new(&schema)
        .generate_global(&qn("root"))
        .unwrap_err();
    match err {
        Error::SchemaStructure(e) => {
            assert_eq!(e.component.as_deref(), Some("{urn:test}absent"));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_unknown_root() {
    let schema = SchemaSet::new(None);
    let err = AutomatonGenerator::new(&schema)
        .generate_global(&QName::local("nowhere"))
        .unwrap_err();
    assert!(matches!(err, Error::SchemaStructure(_)));
}

#[test]
fn test_group_reused_through_elements_is_not_circular() {
    // a named group may reach itself again through an element
    let mut schema = SchemaSet::new(Some("urn:test"));
    schema
        .add_group(
            qn("items"),
            ModelGroup::new(
                Compositor::Choice,
                vec![
                    Particle::element_ref(qn("item"), Occurs::once()),
                    Particle::element_ref(qn("nested"), Occurs::once()),
                ],
            ),
        )
        .unwrap();
    schema.add_global(ElementDecl::atomic(qn("item"))).unwrap();
    schema
        .add_global(ElementDecl::complex(
            qn("nested"),
            Particle::group_ref(qn("items"), Occurs::zero_or_more()),
        ))
        .unwrap();

    let automaton = AutomatonGenerator::new(&schema)
        .generate_global(&qn("nested"))
        .unwrap();
    // nested, its choice and item; the choice leads back to nested
    assert_eq!(automaton.len(), 3);
    let choice = automaton.start_node().next_states()[0];
    assert_eq!(automaton.edge(choice, 1).unwrap(), automaton.start());
}

#[test]
fn test_wildcard_node() {
    let mut schema = SchemaSet::new(Some("urn:test"));
    schema
        .add_global(ElementDecl::complex(
            qn("open"),
            Particle::any(Wildcard::any(), Occurs::new(0, Some(3))),
        ))
        .unwrap();

    let automaton = AutomatonGenerator::new(&schema).generate_global(&qn("open")).unwrap();
    // a lone wildcard is wrapped in a sequence
    let content = automaton.start_node().next_states()[0];
    assert_eq!(automaton.node(content).unwrap().node_type(), NodeType::Sequence);
    let any = automaton.node(automaton.edge(content, 0).unwrap()).unwrap();
    assert_eq!(any.node_type(), NodeType::Wildcard);
    assert_eq!(any.max_occurs(), Some(3));
    assert!(any.matches(&QName::namespaced("urn:anything", "x")));
}

// ============================================================================
// Cache
// ============================================================================

#[test]
fn test_cache_shares_automaton_across_threads() {
    let schema = load_model_file(fixtures_dir().join("avro.json")).unwrap();
    let root = schema.global_element(&avro("root")).unwrap();

    let mut cache = AutomatonCache::new();
    let automaton = cache.get_or_generate(&schema, root).unwrap();
    let again = cache.get_or_generate(&schema, root).unwrap();
    assert!(Arc::ptr_eq(&automaton, &again));
    assert_eq!(cache.len(), 1);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let automaton = Arc::clone(&automaton);
            std::thread::spawn(move || automaton.len())
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), automaton.len());
    }

    cache.clear();
    assert!(cache.is_empty());
}
