use dataload_core::{LoadError, LoaderConfig};
use dataload_test_utils::{load, loader, reference_node, stored};
use pretty_assertions::assert_eq;

#[test]
fn test_nested_contacts_saved_with_customer() {
    let loader = load(
        r#"<data id="C1" archetype="party.customerperson" firstName="Foo" lastName="Bar" active="true">
            <data id="T1" collection="contacts" archetype="contact.phoneNumber" telephoneNumber="555"/>
            <data id="L1" collection="contacts" archetype="contact.location" address="1 Main St"/>
        </data>"#,
        LoaderConfig::new(),
    );

    let customer = stored(&loader, "C1");
    let phone = stored(&loader, "T1");
    let location = stored(&loader, "L1");
    assert_eq!(
        customer.collection("contacts"),
        &[phone.reference().clone(), location.reference().clone()]
    );
    assert_eq!(customer.text("name"), Some("Bar,Foo"));
    assert_eq!(loader.statistics().get("contact.phoneNumber"), Some(&1));
    assert_eq!(loader.statistics().get("party.customerperson"), Some(&1));
}

#[test]
fn test_child_attached_once_complete() {
    let mut loader = loader(LoaderConfig::new());
    loader
        .load_str(
            r#"<data id="C1" archetype="party.customerperson" firstName="Foo" lastName="Bar">
                <data id="R1" collection="patients" archetype="entityRelationship.patientOwner"
                      source="id:C1" target="id:P1"/>
            </data>"#,
            "first.xml",
        )
        .unwrap();

    let customer = loader.state("C1").unwrap();
    assert!(!customer.is_complete());
    assert!(customer.object().collection("patients").is_empty());
    assert!(customer.children().is_empty());

    loader
        .load_str(r#"<data id="P1" archetype="party.patientpet" name="Fido"/>"#, "second.xml")
        .unwrap();
    loader.finish().unwrap();

    let customer = stored(&loader, "C1");
    let relationship = stored(&loader, "R1");
    assert_eq!(
        customer.collection("patients"),
        std::slice::from_ref(relationship.reference())
    );
    assert_eq!(reference_node(&relationship, "source"), customer.reference());
    assert_eq!(reference_node(&relationship, "target"), stored(&loader, "P1").reference());
}

#[test]
fn test_child_id_attaches_declared_object() {
    let loader = load(
        r#"<archetype>
            <data id="L1" archetype="contact.location" address="1 Main St"/>
            <data id="C1" archetype="party.customerperson" firstName="Foo" lastName="Bar">
                <data collection="contacts" childId="id:L1"/>
            </data>
        </archetype>"#,
        LoaderConfig::new(),
    );

    assert_eq!(
        stored(&loader, "C1").collection("contacts"),
        std::slice::from_ref(stored(&loader, "L1").reference())
    );
}

#[test]
fn test_parent_not_a_collection() {
    let err = loader(LoaderConfig::new())
        .load_str(
            "<data archetype=\"party.customerperson\" firstName=\"A\" lastName=\"B\">\n\
             <data collection=\"firstName\" archetype=\"contact.location\"/>\n\
             </data>",
            "bad.xml",
        )
        .unwrap_err();

    assert!(matches!(
        err,
        LoadError::ParentNotACollection { ref node, ref location, .. }
            if node == "firstName" && location.line() == 2
    ));
}

#[test]
fn test_collection_rejects_archetype() {
    let err = loader(LoaderConfig::new())
        .load_str(
            r#"<data archetype="party.customerperson" firstName="A" lastName="B">
                <data collection="contacts" archetype="lookup.staff" code="VET"/>
            </data>"#,
            "bad.xml",
        )
        .unwrap_err();

    assert!(matches!(err, LoadError::FailedToSetAtribute { ref node, .. } if node == "contacts"));
}

#[test]
fn test_nested_element_requires_collection() {
    let mut loader = loader(LoaderConfig::new());
    let err = loader
        .load_str(
            "<data id=\"C1\" archetype=\"party.customerperson\" firstName=\"Foo\" lastName=\"Bar\">\n\
             <data id=\"P1\" archetype=\"party.patientpet\" name=\"Fido\"/>\n\
             </data>",
            "nested.xml",
        )
        .unwrap_err();

    assert!(matches!(
        err,
        LoadError::NoCollectionAttribute { ref location } if location.line() == 2
    ));
    assert!(err.is_structural());
    assert!(loader.statistics().is_empty());
    assert!(loader.service().is_empty());
}
