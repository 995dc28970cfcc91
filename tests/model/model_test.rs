//! Loading the bookshop model from CSN.

use std::path::PathBuf;

use navql::model::{Model, ModelError};
use navql::TransformError;
use serde_json::json;

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/bookshop.json")
}

fn model() -> Model {
    Model::from_file(fixture()).unwrap()
}

#[test]
fn test_loads_all_entities() {
    let model = model();
    assert_eq!(model.definitions.len(), 12);
    assert!(!model.unfolded);
    assert_eq!(
        model.require_entity("Nope").unwrap_err(),
        TransformError::UnknownEntity("Nope".into())
    );
}

#[test]
fn test_file_and_text_give_the_same_model() {
    let from_text = Model::from_csn_str(include_str!("../fixtures/bookshop.json")).unwrap();
    assert_eq!(model(), from_text);
}

#[test]
fn test_missing_file() {
    let err = Model::from_file("does/not/exist.json").unwrap_err();
    assert!(matches!(err, ModelError::Io(_)));
}

#[test]
fn test_elements_keep_declaration_order() {
    let model = model();
    let authors = model.entity("Authors").unwrap();
    let names: Vec<&str> = authors.elements.keys().map(String::as_str).collect();
    assert_eq!(names, ["ID", "name", "address", "country", "books", "novels"]);

    let keys: Vec<&str> = model
        .entity("Reviews")
        .unwrap()
        .keys()
        .map(|k| k.name.as_str())
        .collect();
    assert_eq!(keys, ["ID", "lang"]);
}

#[test]
fn test_structured_elements_get_flat_names() {
    let model = model();
    let address = model.entity("Authors").unwrap().element("address").unwrap();
    assert!(address.is_struct());
    assert_eq!(address.flat_name, "address");
    assert_eq!(address.child("city").unwrap().flat_name, "address_city");
    assert_eq!(address.child("city").unwrap().parent, "Authors");
}

#[test]
fn test_managed_and_unmanaged_associations() {
    let model = model();
    let books = model.entity("Books").unwrap();

    let author = books.element("author").unwrap().association().unwrap();
    assert!(author.is_managed());
    assert!(!author.to_many);
    assert_eq!(author.target, "Authors");
    let keys = author.keys.as_ref().unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].name(), "ID");

    let pages = books.element("pages").unwrap().association().unwrap();
    assert!(!pages.is_managed());
    assert!(pages.composition);
    assert!(pages.to_many);
}

#[test]
fn test_default_keys_come_from_the_target() {
    let model = model();
    let edition = model
        .entity("Printings")
        .unwrap()
        .element("edition")
        .unwrap()
        .association()
        .unwrap();
    let paths: Vec<&[String]> = edition
        .keys
        .as_ref()
        .unwrap()
        .iter()
        .map(|k| k.path.as_slice())
        .collect();
    assert_eq!(paths, [["book".to_string()], ["code".to_string()]]);

    // a keyless target leaves nothing to refer to
    let note = model
        .entity("Reviews")
        .unwrap()
        .element("note")
        .unwrap()
        .association()
        .unwrap();
    assert_eq!(note.keys.as_deref(), Some(&[][..]));
}

#[test]
fn test_annotations() {
    let model = model();
    let books = model.entity("Books").unwrap();

    assert_eq!(
        books.element("genre_ID").unwrap().foreign_key_of.as_deref(),
        Some("genre")
    );
    assert!(books.element("internal").unwrap().is_virtual);
    assert!(books.element("total").unwrap().is_calculated());
    assert!(books.element("authorName").unwrap().is_calculated());
    assert!(!books.element("title").unwrap().is_calculated());

    assert!(model.entity("Drafts").unwrap().persistence_skip);
    assert!(!books.persistence_skip);
}

#[test]
fn test_localized_variants() {
    let model = model();
    let books = model.entity("Books").unwrap();
    let countries = model.entity("Countries").unwrap();
    let authors = model.entity("Authors").unwrap();

    assert_eq!(
        model.localized(books, "localized").map(|e| e.name.as_str()),
        Some("localized.Books")
    );
    // opted out, although a localized variant exists
    assert!(!countries.localized);
    assert!(model.localized(countries, "localized").is_none());
    // no variant
    assert!(model.localized(authors, "localized").is_none());
}

#[test]
fn test_implicit_alias_is_the_last_name_segment() {
    let model = model();
    assert_eq!(model.entity("localized.Books").unwrap().implicit_alias(), "Books");
    assert_eq!(model.entity("Books").unwrap().implicit_alias(), "Books");
}

#[test]
fn test_calculated_cycle_through_association() {
    let err = Model::from_csn_value(json!({
        "definitions": {
            "E": { "kind": "entity", "elements": {
                "ID": { "key": true, "type": "cds.Integer" },
                "other": { "type": "cds.Association", "target": "F" },
                "x": { "type": "cds.Integer", "value": { "ref": ["other", "y"] } }
            } },
            "F": { "kind": "entity", "elements": {
                "ID": { "key": true, "type": "cds.Integer" },
                "back": { "type": "cds.Association", "target": "E" },
                "y": { "type": "cds.Integer", "value": { "xpr": [{ "ref": ["back", "x"] }, "+", { "val": 1 }] } }
            } }
        }
    }))
    .unwrap_err();

    let ModelError::CalculatedCycle(cycle) = &err else {
        panic!("expected a cycle, got {err}");
    };
    assert_eq!(cycle.cycles.len(), 1);
    let mut members: Vec<String> = cycle.cycles[0].iter().map(ToString::to_string).collect();
    members.sort();
    assert_eq!(members, ["E:x", "F:y"]);
}

#[test]
fn test_association_needs_a_target() {
    let err = Model::from_csn_value(json!({
        "definitions": { "E": { "kind": "entity", "elements": {
            "broken": { "type": "cds.Association" }
        } } }
    }))
    .unwrap_err();
    assert!(matches!(err, ModelError::InvalidDefinition { .. }));
    assert!(err.to_string().contains("E:broken"));
}

#[test]
fn test_non_entities_are_skipped() {
    let model = Model::from_csn_value(json!({
        "definitions": {
            "Price": { "kind": "type", "elements": { "amount": { "type": "cds.Decimal" } } },
            "E": { "kind": "entity", "elements": {
                "price": { "type": "Price" }
            } }
        }
    }))
    .unwrap();
    assert_eq!(model.definitions.len(), 1);
    let price = model.entity("E").unwrap().element("price").unwrap();
    assert_eq!(price.child("amount").unwrap().flat_name, "price_amount");
}
