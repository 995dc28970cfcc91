//! Smart wildcard expansion.

use insta::assert_snapshot;
use navql::config::Settings;
use navql::cql;
use navql::model::Model;
use navql::{transform, TransformError, Transformer};

fn model() -> Model {
    Model::from_csn_str(include_str!("../fixtures/bookshop.json")).unwrap()
}

fn compile(text: &str) -> String {
    let query = cql::parse(text).unwrap();
    transform(&query, &model()).unwrap().to_string()
}

#[test]
fn test_missing_columns_mean_wildcard() {
    assert_eq!(
        compile("SELECT from Countries"),
        "SELECT from Countries as Countries { Countries.code, Countries.name }"
    );
    assert_eq!(compile("SELECT from Countries { * }"), compile("SELECT from Countries"));
}

#[test]
fn test_wildcard_flattens_and_skips_unmanaged() {
    // `books` and `novels` are unmanaged and store nothing
    assert_snapshot!(
        compile("SELECT from Authors"),
        @"SELECT from Authors as Authors { Authors.ID, Authors.name, Authors.address_street, Authors.address_city, Authors.country_code }"
    );
}

#[test]
fn test_association_keys_in_wildcard() {
    assert_eq!(
        compile("SELECT from Pages"),
        "SELECT from Pages as Pages { Pages.book_ID, Pages.number, Pages.text }"
    );
}

#[test]
fn test_excluding() {
    assert_eq!(
        compile("SELECT from Authors { * } excluding { address, country }"),
        "SELECT from Authors as Authors { Authors.ID, Authors.name }"
    );
}

#[test]
fn test_columns_before_wildcard_hide_elements() {
    assert_eq!(
        compile("SELECT from Countries { upper(name) as name, * }"),
        "SELECT from Countries as Countries { upper(Countries.name) as name, Countries.code }"
    );
}

#[test]
fn test_columns_after_wildcard_replace_elements() {
    assert_eq!(
        compile("SELECT from Countries { *, upper(name) as name, 1 as one }"),
        "SELECT from Countries as Countries { Countries.code, upper(Countries.name) as name, 1 as one }"
    );
}

#[test]
fn test_generated_foreign_keys_are_not_repeated() {
    // `genre_ID` is the generated key of `genre`, `cover` a large binary
    let compiled = compile("SELECT from Books { * } excluding { total, authorName }");
    assert_snapshot!(
        compiled,
        @"SELECT from Books as Books { Books.ID, Books.title, Books.stock, Books.price, Books.dims_height, Books.dims_width, Books.struc1_foo, Books.struc1_bar, Books.struc2_foo, Books.struc2_bar, Books.author_ID, Books.coAuthor_ID, Books.genre_ID }"
    );
}

#[test]
fn test_large_binaries_can_be_selected() {
    let model = model();
    let settings = Settings::from_toml_str(
        r#"
        [transform]
        skip_large_binaries = false
        "#,
    )
    .unwrap();
    let transformer = Transformer::new(&model).with_settings(settings);
    let query = cql::parse("SELECT from Books { * } excluding { total, authorName }").unwrap();
    let compiled = transformer.transform(&query).unwrap().to_string();
    assert!(compiled.ends_with("Books.genre_ID, Books.cover }"), "{compiled}");
}

#[test]
fn test_wildcard_over_joined_sources_must_be_unambiguous() {
    let query = cql::parse("SELECT from Countries as C join localized.Countries as L on L.code = C.code").unwrap();
    let err = transform(&query, &model()).unwrap_err();
    assert_eq!(
        err,
        TransformError::AmbiguousReference {
            name: "code".into(),
            candidates: vec!["C".into(), "L".into()]
        }
    );
}

// ============================================================================
// Unfolded models
// ============================================================================

const SHELVES: &str = r#"{ "definitions": { "Shelves": { "kind": "entity", "elements": {
    "ID": { "key": true, "type": "cds.Integer" },
    "dims": { "elements": { "height": { "type": "cds.Decimal" }, "width": { "type": "cds.Decimal" } } },
    "frame": { "elements": { "inner": { "elements": { "depth": { "type": "cds.Decimal" } } } } },
    "place": { "elements": { "room": { "type": "cds.String" } } },
    "label": { "type": "cds.String" }
} } } }"#;

const SHELVES_UNFOLDED: &str = r#"{ "meta": { "unfolded": true }, "definitions": { "Shelves": { "kind": "entity", "elements": {
    "ID": { "key": true, "type": "cds.Integer" },
    "dims": { "elements": { "height": { "type": "cds.Decimal" }, "width": { "type": "cds.Decimal" } } },
    "dims_height": { "type": "cds.Decimal" },
    "dims_width": { "type": "cds.Decimal" },
    "frame": { "elements": { "inner": { "elements": { "depth": { "type": "cds.Decimal" } } } } },
    "frame_inner_depth": { "type": "cds.Decimal" },
    "place": { "elements": { "room": { "type": "cds.String" } } },
    "place_room": { "type": "cds.String" },
    "label": { "type": "cds.String" }
} } } }"#;

fn compile_with(model: &Model, text: &str) -> String {
    transform(&cql::parse(text).unwrap(), model).unwrap().to_string()
}

#[test]
fn test_unfolded_model_lists_each_column_once() {
    let unfolded = Model::from_csn_str(SHELVES_UNFOLDED).unwrap();
    assert!(unfolded.unfolded);
    assert_snapshot!(
        compile_with(&unfolded, "SELECT from Shelves"),
        @"SELECT from Shelves as Shelves { Shelves.ID, Shelves.dims_height, Shelves.dims_width, Shelves.frame_inner_depth, Shelves.place_room, Shelves.label }"
    );
    assert_eq!(
        compile_with(&unfolded, "SELECT from Shelves { dims_height }"),
        "SELECT from Shelves as Shelves { Shelves.dims_height }"
    );
}

#[test]
fn test_unfolded_model_compiles_like_the_structured_one() {
    let structured = Model::from_csn_str(SHELVES).unwrap();
    let unfolded = Model::from_csn_str(SHELVES_UNFOLDED).unwrap();
    assert!(!structured.unfolded);

    for text in [
        "SELECT from Shelves",
        "SELECT from Shelves { dims, frame.inner.depth }",
        "SELECT from Shelves { * } excluding { dims, place }",
        "SELECT from Shelves { dims, * }",
        "SELECT from Shelves { *, label as name }",
        "SELECT from Shelves { ID } search 'oak'",
    ] {
        assert_eq!(compile_with(&unfolded, text), compile_with(&structured, text), "{text}");
    }
}
