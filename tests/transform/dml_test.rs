//! INSERT, UPSERT, UPDATE and DELETE.

use insta::assert_snapshot;
use navql::cql;
use navql::model::Model;
use navql::{transform, TransformError};

fn model() -> Model {
    Model::from_csn_str(include_str!("../fixtures/bookshop.json")).unwrap()
}

fn compile(text: &str) -> String {
    let query = cql::parse(text).unwrap();
    transform(&query, &model()).unwrap().to_string()
}

fn compile_err(text: &str) -> TransformError {
    let query = cql::parse(text).unwrap();
    transform(&query, &model()).unwrap_err()
}

// ============================================================================
// DELETE
// ============================================================================

#[test]
fn test_plain_delete() {
    assert_eq!(
        compile("DELETE from Books where stock = 0"),
        "DELETE from Books as Books where Books.stock = 0"
    );
}

#[test]
fn test_delete_through_association_uses_key_subquery() {
    assert_snapshot!(
        compile("DELETE from Books where author.name = 'x'"),
        @"DELETE from Books as Books where Books.ID in (SELECT from Books as Books2 left join Authors as author on author.ID = Books2.author_ID { Books2.ID } where author.name = 'x')"
    );
}

#[test]
fn test_key_subquery_renames_explicit_alias() {
    assert_snapshot!(
        compile("DELETE from Books as B where B.author.name = 'x'"),
        @"DELETE from Books as B where B.ID in (SELECT from Books as B2 left join Authors as author on author.ID = B2.author_ID { B2.ID } where author.name = 'x')"
    );
}

#[test]
fn test_key_subquery_with_composite_keys() {
    assert_snapshot!(
        compile("DELETE from Pages where book.author.name = 'x'"),
        @"DELETE from Pages as Pages where (Pages.book_ID, Pages.number) in (SELECT from Pages as Pages2 left join Books as book on book.ID = Pages2.book_ID left join Authors as author on author.ID = book.author_ID { Pages2.book_ID, Pages2.number } where author.name = 'x')"
    );
}

#[test]
fn test_delete_from_path() {
    assert_snapshot!(
        compile("DELETE from Authors[1]:books"),
        @"DELETE from Books as books where exists (SELECT from Authors as Authors { 1 } where books.author_ID = Authors.ID and Authors.ID = 1)"
    );
}

#[test]
fn test_delete_from_unknown_entity() {
    assert_eq!(
        compile_err("DELETE from Nope"),
        TransformError::UnknownEntity("Nope".into())
    );
}

// ============================================================================
// UPDATE
// ============================================================================

#[test]
fn test_update_data_and_expressions() {
    assert_snapshot!(
        compile("UPDATE Books set title = 'New', stock = stock - 1 where ID = 1"),
        @"UPDATE Books as Books set title = 'New', stock = (Books.stock - 1) where Books.ID = 1"
    );
}

#[test]
fn test_update_through_association() {
    assert_snapshot!(
        compile("UPDATE Books set stock = 0 where author.name = 'x'"),
        @"UPDATE Books as Books set stock = 0 where Books.ID in (SELECT from Books as Books2 left join Authors as author on author.ID = Books2.author_ID { Books2.ID } where author.name = 'x')"
    );
}

#[test]
fn test_update_expression_can_not_join() {
    assert!(matches!(
        compile_err("UPDATE Books set title = author.name where ID = 1"),
        TransformError::Unsupported(_)
    ));
}

// ============================================================================
// INSERT and UPSERT
// ============================================================================

#[test]
fn test_insert_values() {
    assert_eq!(
        compile("INSERT into Books (ID, title) values (1, 'x')"),
        "INSERT into Books (ID, title) values (1, 'x')"
    );
    assert_eq!(
        compile("UPSERT into Books (ID) values (1), (2)"),
        "UPSERT into Books (ID) values (1), (2)"
    );
}

#[test]
fn test_insert_into_path_targets_last_entity() {
    assert_eq!(
        compile("INSERT into Authors:books (ID) values (1)"),
        "INSERT into Books (ID) values (1)"
    );
}

#[test]
fn test_insert_from_select() {
    assert_snapshot!(
        compile("INSERT into Countries SELECT code, name from localized.Countries"),
        @"INSERT into Countries SELECT from localized.Countries as Countries { Countries.code, Countries.name }"
    );
}
