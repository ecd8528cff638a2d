use dataload_core::{LoadError, LoaderConfig};
use dataload_test_utils::loader;

#[test]
fn test_missing_ids_are_named() {
    let mut loader = loader(LoaderConfig::new());
    loader
        .load_str(
            "<archetype>\n\
             <data archetype=\"x\" name=\"id:A\"/>\n\
             <data archetype=\"y\" id=\"B\" label=\"b\"/>\n\
             <data archetype=\"x\" name=\"id:C\"/>\n\
             </archetype>",
            "missing.xml",
        )
        .unwrap();

    let err = loader.finish().unwrap_err();
    assert!(!err.is_structural());
    let message = err.to_string();
    let LoadError::UnresolvedReferences(unresolved) = err else {
        panic!("expected unresolved references");
    };
    let found: Vec<_> = unresolved
        .iter()
        .map(|u| (u.id.as_str(), u.location.line()))
        .collect();
    assert_eq!(found, vec![("A", 2), ("C", 4)]);
    assert!(message.contains("missing.xml"));
    assert_eq!(loader.service().len(), 1);
}

#[test]
fn test_missing_child_id() {
    let mut loader = loader(LoaderConfig::new());
    loader
        .load_str(
            r#"<data archetype="party.customerperson" firstName="A" lastName="B">
                <data collection="contacts" childId="id:nowhere"/>
            </data>"#,
            "child.xml",
        )
        .unwrap();

    let Err(LoadError::UnresolvedReferences(unresolved)) = loader.finish() else {
        panic!("expected unresolved references");
    };
    assert_eq!(unresolved.len(), 1);
    assert_eq!(unresolved[0].id, "nowhere");
    assert_eq!(unresolved[0].archetype, "party.customerperson");
    assert!(loader.service().is_empty());
}

#[test]
fn test_unsatisfiable_unsaved_reference() {
    let mut loader = loader(LoaderConfig::new());
    loader
        .load_str(
            r#"<archetype>
                <data id="C1" archetype="party.customerperson" firstName="A" lastName="B">
                    <data id="R1" collection="patients" archetype="entityRelationship.patientOwner"
                          source="id:C1" target="id:P9"/>
                </data>
                <data archetype="x" name="id:R1"/>
            </archetype>"#,
            "unsatisfiable.xml",
        )
        .unwrap();

    let Err(LoadError::UnresolvedReferences(unresolved)) = loader.finish() else {
        panic!("expected unresolved references");
    };
    assert_eq!(unresolved.len(), 1);
    assert_eq!(unresolved[0].id, "P9");
    assert_eq!(unresolved[0].archetype, "entityRelationship.patientOwner");
    assert_eq!(unresolved[0].location.line(), 3);
    assert!(loader.service().is_empty());
}
