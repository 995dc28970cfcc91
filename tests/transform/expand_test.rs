//! Expand columns as correlated subqueries.

use insta::assert_snapshot;
use navql::cql;
use navql::cqn::Query;
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

#[test]
fn test_to_many_expand() {
    assert_snapshot!(
        compile("SELECT from Authors { name, books { title } }"),
        @"SELECT from Authors as Authors { Authors.name, (SELECT from Books as books { books.title } where books.author_ID = Authors.ID) as books }"
    );
}

#[test]
fn test_to_one_expand_selects_one() {
    assert_snapshot!(
        compile("SELECT from Books { title, author { name } }"),
        @"SELECT from Books as Books { Books.title, (SELECT one from Authors as author { author.name } where author.ID = Books.author_ID) as author }"
    );
}

#[test]
fn test_expand_wildcard() {
    assert_snapshot!(
        compile("SELECT from Books { author { * } }"),
        @"SELECT from Books as Books { (SELECT one from Authors as author { author.ID, author.name, author.address_street, author.address_city, author.country_code } where author.ID = Books.author_ID) as author }"
    );
}

#[test]
fn test_nested_expands() {
    assert_snapshot!(
        compile("SELECT from Authors { books { title, genre { name } } }"),
        @"SELECT from Authors as Authors { (SELECT from Books as books { books.title, (SELECT one from Genres as genre { genre.name } where genre.ID = books.genre_ID) as genre } where books.author_ID = Authors.ID) as books }"
    );
}

#[test]
fn test_expand_with_alias_and_filter() {
    assert_snapshot!(
        compile("SELECT from Authors { books[stock > 0] as inStock { title } }"),
        @"SELECT from Authors as Authors { (SELECT from Books as books { books.title } where books.author_ID = Authors.ID and books.stock > 0) as inStock }"
    );
    assert_snapshot!(
        compile("SELECT from Authors { books[42] { title } }"),
        @"SELECT from Authors as Authors { (SELECT from Books as books { books.title } where books.author_ID = Authors.ID and books.ID = 42) as books }"
    );
}

#[test]
fn test_multi_step_expand_walks_back() {
    assert_snapshot!(
        compile("SELECT from Books { author.books as siblings { title } }"),
        @"SELECT from Books as Books { (SELECT from Books as books2 { books2.title } where exists (SELECT from Authors as author { 1 } where books2.author_ID = author.ID and author.ID = Books.author_ID)) as siblings }"
    );
}

#[test]
fn test_anonymous_expand_matches_keys() {
    assert_snapshot!(
        compile("SELECT from Books { ID, { title, stock } as info }"),
        @"SELECT from Books as Books { Books.ID, (SELECT from Books as Books2 { Books2.title, Books2.stock } where Books2.ID = Books.ID) as info }"
    );
}

#[test]
fn test_localized_expand() {
    let select = cql::parse_select("SELECT from Authors { books { title } }")
        .unwrap()
        .localized();
    let compiled = transform(&Query::Select(select), &model()).unwrap();
    assert_snapshot!(
        compiled.to_string(),
        @"SELECT from Authors as Authors { (SELECT from localized.Books as books { books.title } where books.author_ID = Authors.ID) as books }"
    );
}

#[test]
fn test_expand_name_must_be_unique() {
    assert_eq!(
        compile_err("SELECT from Books { title as author, author { name } }"),
        TransformError::DuplicateColumn("author".into())
    );
    assert_eq!(
        compile_err("SELECT from Authors { books { title }, books { ID } }"),
        TransformError::DuplicateColumn("books".into())
    );
    // flat columns are not checked
    assert_eq!(
        compile("SELECT from Books { ID, ID }"),
        "SELECT from Books as Books { Books.ID, Books.ID }"
    );
}

#[test]
fn test_expand_on_scalar_is_rejected() {
    assert!(matches!(
        compile_err("SELECT from Books { title { x } }"),
        TransformError::Unsupported(_)
    ));
}
