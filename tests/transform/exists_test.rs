//! `exists` predicates and `FROM` paths, both compiled into correlated
//! subquery chains.

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
// exists <path>
// ============================================================================

#[test]
fn test_exists_managed_self_association() {
    assert_eq!(
        compile("SELECT from Genres { ID } where exists parent"),
        "SELECT from Genres as Genres { Genres.ID } where exists (SELECT from Genres as parent { 1 } where parent.ID = Genres.parent_ID)"
    );
}

#[test]
fn test_exists_unmanaged_association() {
    assert_snapshot!(
        compile("SELECT from Authors { ID } where exists books"),
        @"SELECT from Authors as Authors { Authors.ID } where exists (SELECT from Books as books { 1 } where books.author_ID = Authors.ID)"
    );
}

#[test]
fn test_not_exists_with_filter() {
    assert_snapshot!(
        compile("SELECT from Books { ID } where not exists pages[number = 1]"),
        @"SELECT from Books as Books { Books.ID } where not exists (SELECT from Pages as pages { 1 } where pages.book_ID = Books.ID and pages.number = 1)"
    );
}

#[test]
fn test_exists_filter_shorthand() {
    assert_snapshot!(
        compile("SELECT from Authors { ID } where exists books[42]"),
        @"SELECT from Authors as Authors { Authors.ID } where exists (SELECT from Books as books { 1 } where books.author_ID = Authors.ID and books.ID = 42)"
    );
}

#[test]
fn test_exists_path_nests_one_subquery_per_step() {
    assert_snapshot!(
        compile("SELECT from Authors { ID } where exists books.genre[name = 'Poetry']"),
        @"SELECT from Authors as Authors { Authors.ID } where exists (SELECT from Books as books { 1 } where books.author_ID = Authors.ID and exists (SELECT from Genres as genre { 1 } where genre.ID = books.genre_ID and genre.name = 'Poetry'))"
    );
}

#[test]
fn test_exists_alias_avoids_outer_alias() {
    assert_snapshot!(
        compile("SELECT from Genres as children { ID } where exists children"),
        @"SELECT from Genres as children { children.ID } where exists (SELECT from Genres as children2 { 1 } where children2.parent_ID = children.ID)"
    );
}

#[test]
fn test_exists_inside_join_filter() {
    assert_snapshot!(
        compile("SELECT from Books { author[exists books].name }"),
        @"SELECT from Books as Books left join Authors as author on author.ID = Books.author_ID and exists (SELECT from Books as books2 { 1 } where books2.author_ID = author.ID) { author.name as author_name }"
    );
}

#[test]
fn test_exists_subquery() {
    assert_snapshot!(
        compile("SELECT from Authors { ID } where exists (SELECT from Books { ID } where Books.author.ID = Authors.ID)"),
        @"SELECT from Authors as Authors { Authors.ID } where exists (SELECT from Books as Books { Books.ID } where Books.author_ID = Authors.ID)"
    );
}

#[test]
fn test_value_subquery_alias_is_unique() {
    assert_snapshot!(
        compile("SELECT from Books { ID } where ID in (SELECT ID from Books where stock > 1)"),
        @"SELECT from Books as Books { Books.ID } where Books.ID in (SELECT from Books as Books2 { Books2.ID } where Books2.stock > 1)"
    );
}

#[test]
fn test_exists_needs_an_association() {
    assert_eq!(
        compile_err("SELECT from Books { ID } where exists title"),
        TransformError::InvalidExistsTarget {
            path: "title".into()
        }
    );
    assert!(matches!(
        compile_err("SELECT from Books { ID } where exists dims"),
        TransformError::InvalidExistsTarget { .. }
    ));
}

// ============================================================================
// FROM paths
// ============================================================================

#[test]
fn test_from_path() {
    assert_snapshot!(
        compile("SELECT from Authors:books { title }"),
        @"SELECT from Books as books { books.title } where exists (SELECT from Authors as Authors { 1 } where books.author_ID = Authors.ID)"
    );
}

#[test]
fn test_from_path_with_root_filter() {
    let expected = "SELECT from Books as books { books.title } where exists (SELECT from Authors as Authors { 1 } where books.author_ID = Authors.ID and Authors.ID = 1)";
    assert_eq!(compile("SELECT from Authors[ID = 1]:books { title }"), expected);
    assert_eq!(compile("SELECT from Authors[1]:books { title }"), expected);
}

#[test]
fn test_from_path_with_target_filter_and_alias() {
    assert_snapshot!(
        compile("SELECT from Authors[1]:books[stock > 5] as B { title }"),
        @"SELECT from Books as B { B.title } where exists (SELECT from Authors as Authors { 1 } where B.author_ID = Authors.ID and Authors.ID = 1) and B.stock > 5"
    );
}

#[test]
fn test_two_step_from_path() {
    assert_snapshot!(
        compile("SELECT from Authors:books.genre { name }"),
        @"SELECT from Genres as genre { genre.name } where exists (SELECT from Books as books { 1 } where genre.ID = books.genre_ID and exists (SELECT from Authors as Authors { 1 } where books.author_ID = Authors.ID))"
    );
}

#[test]
fn test_from_path_through_managed_association() {
    assert_snapshot!(
        compile("SELECT from Books[3]:author { name }"),
        @"SELECT from Authors as author { author.name } where exists (SELECT from Books as Books { 1 } where author.ID = Books.author_ID and Books.ID = 3)"
    );
}

#[test]
fn test_from_path_step_must_be_an_association() {
    assert!(matches!(
        compile_err("SELECT from Books:title { ID }"),
        TransformError::Unsupported(_)
    ));
}

#[test]
fn test_filter_shorthand_needs_a_single_key() {
    assert_eq!(
        compile_err("SELECT from Reviews[1] { rating }"),
        TransformError::FilterNeedsSingleKey {
            path: "Reviews".into(),
            found: 2
        }
    );
}

#[test]
fn test_filter_shorthand_counts_association_keys() {
    // Editions is keyed by (book, code)
    for text in [
        "SELECT from Printings { ID } where edition[3].printer = 'x'",
        "SELECT from Printings { ID } where exists edition[3]",
        "SELECT from Editions[3] { printer }",
    ] {
        assert!(
            matches!(
                compile_err(text),
                TransformError::FilterNeedsSingleKey { found: 2, .. }
            ),
            "{text}"
        );
    }
}
