//! Testing utilities for the dataload workspace
//!
//! A small veterinary-practice schema plus helpers to run loads against an
//! in-memory service.

#![allow(missing_docs)]

use dataload_core::{DataLoader, LoaderConfig};
use dataload_model::{ArchetypeService, MemoryArchetypeService, Object, ObjectRef, Schema, Value};
use std::path::{Path, PathBuf};

pub type TestLoader = DataLoader<MemoryArchetypeService>;

pub const VET_SCHEMA: &str = r#"
archetypes:
  - short_name: party.customerperson
    name: "{lastName},{firstName}"
    nodes:
      - { name: firstName, kind: text, required: true }
      - { name: lastName, kind: text, required: true }
      - { name: name, kind: text }
      - { name: active, kind: boolean }
      - { name: contacts, kind: collection, archetypes: ["contact.*"] }
      - { name: patients, kind: collection, archetypes: ["entityRelationship.patientOwner"] }
  - short_name: party.patientpet
    nodes:
      - { name: name, kind: text, required: true }
      - { name: species, kind: text }
      - { name: dateOfBirth, kind: date }
      - { name: owner, kind: reference, archetypes: ["party.customerperson"] }
  - short_name: contact.phoneNumber
    nodes:
      - { name: telephoneNumber, kind: text, required: true }
      - { name: preferred, kind: boolean }
  - short_name: contact.location
    nodes:
      - { name: address, kind: text }
      - { name: suburb, kind: text }
  - short_name: lookup.staff
    nodes:
      - { name: code, kind: text, required: true }
      - { name: name, kind: text }
  - short_name: entityRelationship.patientOwner
    nodes:
      - { name: source, kind: reference, archetypes: ["party.customerperson"] }
      - { name: target, kind: reference, archetypes: ["party.patientpet"] }
      - { name: activeStartTime, kind: date }
  - short_name: act.customerEstimation
    nodes:
      - { name: customer, kind: reference, archetypes: ["party.customerperson"] }
      - { name: startTime, kind: date }
      - { name: status, kind: text }
      - { name: items, kind: collection, archetypes: ["act.customerEstimationItem"] }
  - short_name: act.customerEstimationItem
    nodes:
      - { name: patient, kind: reference, archetypes: ["party.patientpet"] }
      - { name: clinician, kind: reference, archetypes: ["lookup.staff"] }
      - { name: quantity, kind: integer }
      - { name: fixedPrice, kind: decimal }
  - short_name: x
    nodes:
      - { name: name, kind: reference }
  - short_name: y
    nodes:
      - { name: label, kind: text }
"#;

pub fn vet_schema() -> Schema {
    Schema::from_yaml(VET_SCHEMA).unwrap()
}

pub fn vet_service() -> MemoryArchetypeService {
    MemoryArchetypeService::from_schema(&vet_schema())
}

pub fn loader(config: LoaderConfig) -> TestLoader {
    DataLoader::new(vet_service(), config)
}

/// Load `source` and finish, panicking on any error
pub fn load(source: &str, config: LoaderConfig) -> TestLoader {
    let mut loader = loader(config);
    loader.load_str(source, "test.xml").unwrap();
    loader.finish().unwrap();
    loader
}

/// Stored object declared with `id`
pub fn stored(loader: &TestLoader, id: &str) -> Object {
    let reference = loader
        .cache()
        .reference(id)
        .unwrap_or_else(|| panic!("id '{id}' not declared"));
    loader
        .service()
        .get(reference)
        .unwrap_or_else(|| panic!("id '{id}' not saved"))
}

/// Reference held by a single-valued node
pub fn reference_node<'a>(object: &'a Object, node: &str) -> &'a ObjectRef {
    object
        .value(node)
        .and_then(Value::as_reference)
        .unwrap_or_else(|| panic!("{} has no reference in '{node}'", object.reference()))
}

/// Write `contents` to `relative` under `dir`, creating directories
pub fn write_file(dir: &Path, relative: &str, contents: &str) -> PathBuf {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, contents).unwrap();
    path
}

pub fn assert_complete(loader: &TestLoader, id: &str) {
    let state = loader
        .state(id)
        .unwrap_or_else(|| panic!("id '{id}' not declared"));
    assert!(
        state.is_complete(),
        "{} at {} still waits on {:?}",
        state.archetype(),
        state.location(),
        state.deferred().map(|p| p.id.clone()).collect::<Vec<_>>()
    );
}
