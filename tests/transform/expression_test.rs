//! Token rewriting in conditions: tuple comparisons, `in` lists, functions,
//! parameters and subqueries.

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
// Structured comparisons
// ============================================================================

#[test]
fn test_association_comparison_pairs_foreign_keys() {
    assert_eq!(
        compile("SELECT from Books { ID } where author = coAuthor"),
        "SELECT from Books as Books { Books.ID } where Books.author_ID = Books.coAuthor_ID"
    );
}

#[test]
fn test_structure_comparison_with_neighbours_is_grouped() {
    assert_snapshot!(
        compile("SELECT from Books { ID } where struc1 = struc2 and ID = 1"),
        @"SELECT from Books as Books { Books.ID } where (Books.struc1_foo = Books.struc2_foo and Books.struc1_bar = Books.struc2_bar) and Books.ID = 1"
    );
}

#[test]
fn test_inequality_joins_leaves_with_or() {
    assert_snapshot!(
        compile("SELECT from Books { ID } where struc1 != struc2"),
        @"SELECT from Books as Books { Books.ID } where Books.struc1_foo != Books.struc2_foo or Books.struc1_bar != Books.struc2_bar"
    );
}

#[test]
fn test_null_checks_on_structures() {
    assert_snapshot!(
        compile("SELECT from Books { ID } where dims is null"),
        @"SELECT from Books as Books { Books.ID } where Books.dims_height is null and Books.dims_width is null"
    );
    assert_eq!(
        compile("SELECT from Books { ID } where author is not null"),
        "SELECT from Books as Books { Books.ID } where Books.author_ID is not null"
    );
}

#[test]
fn test_single_key_association_compared_with_value() {
    assert_eq!(
        compile("SELECT from Books { ID } where author = 5"),
        "SELECT from Books as Books { Books.ID } where Books.author_ID = 5"
    );
}

#[test]
fn test_composite_keys_compare_leaf_by_leaf() {
    assert_snapshot!(
        compile("SELECT from Printings { ID } where edition = reprintOf"),
        @"SELECT from Printings as Printings { Printings.ID } where Printings.edition_book_ID = Printings.reprintOf_book_ID and Printings.edition_code = Printings.reprintOf_code"
    );
}

#[test]
fn test_composite_key_compared_with_value() {
    assert!(matches!(
        compile_err("SELECT from Printings { ID } where edition = 5"),
        TransformError::StructureMismatch { .. }
    ));
}

#[test]
fn test_structures_must_match() {
    assert_eq!(
        compile_err("SELECT from Books { ID } where dims = struc1"),
        TransformError::StructureMismatch {
            lhs: "dims".into(),
            rhs: "struc1".into()
        }
    );
}

#[test]
fn test_ordering_of_structures_is_rejected() {
    assert_eq!(
        compile_err("SELECT from Books { ID } where dims < struc1"),
        TransformError::UnsupportedStructOperator {
            op: "<".into(),
            path: "dims".into()
        }
    );
}

// ============================================================================
// Lists, functions and parameters
// ============================================================================

#[test]
fn test_empty_in_list() {
    assert_eq!(
        compile("SELECT from Books { ID } where ID in ()"),
        "SELECT from Books as Books { Books.ID } where Books.ID = null"
    );
    assert_eq!(
        compile("SELECT from Books { ID } where ID not in ()"),
        "SELECT from Books as Books { Books.ID } where Books.ID is not null"
    );
}

#[test]
fn test_in_lists() {
    assert_eq!(
        compile("SELECT from Books { ID } where ID in (1, 2)"),
        "SELECT from Books as Books { Books.ID } where Books.ID in (1, 2)"
    );
    assert_eq!(
        compile("SELECT from Books { ID } where ID in (stock, 3)"),
        "SELECT from Books as Books { Books.ID } where Books.ID in (Books.stock, 3)"
    );
}

#[test]
fn test_function_arguments_are_qualified() {
    assert_eq!(
        compile("SELECT from Books { upper(title) as t } where lower(title) = 'x'"),
        "SELECT from Books as Books { upper(Books.title) as t } where lower(Books.title) = 'x'"
    );
}

#[test]
fn test_parameters_and_variables_pass_through() {
    assert_snapshot!(
        compile("SELECT from Books { ID } where ID = ? and title = :title and title != $user.id"),
        @"SELECT from Books as Books { Books.ID } where Books.ID = ? and Books.title = :title and Books.title != $user.id"
    );
}

#[test]
fn test_nested_expressions_keep_parentheses() {
    assert_snapshot!(
        compile("SELECT from Books { ID } where (stock > 1 or price < 2) and ID between 1 and 5"),
        @"SELECT from Books as Books { Books.ID } where (Books.stock > 1 or Books.price < 2) and Books.ID between 1 and 5"
    );
}

#[test]
fn test_case_expression_column() {
    assert_snapshot!(
        compile("SELECT from Books { case when stock > 10 then 'many' else 'few' end as level }"),
        @"SELECT from Books as Books { case when Books.stock > 10 then 'many' else 'few' end as level }"
    );
}

// ============================================================================
// Subqueries
// ============================================================================

#[test]
fn test_scalar_subquery_column() {
    assert_snapshot!(
        compile("SELECT from Authors { name, (SELECT count(*) as n from Books where Books.author.ID = Authors.ID) as n }"),
        @"SELECT from Authors as Authors { Authors.name, (SELECT from Books as Books { count(*) as n } where Books.author_ID = Authors.ID) as n }"
    );
}

#[test]
fn test_subquery_sees_outer_alias_for_plain_columns() {
    assert_snapshot!(
        compile("SELECT from Authors as A { ID } where A.ID in (SELECT author.ID from Books where Books.title = A.name)"),
        @"SELECT from Authors as A { A.ID } where A.ID in (SELECT from Books as Books { Books.author_ID } where Books.title = A.name)"
    );
}

#[test]
fn test_unknown_element_in_condition() {
    assert_eq!(
        compile_err("SELECT from Books { ID } where nope = 1"),
        TransformError::UnresolvablePath {
            name: "nope".into(),
            path: "nope".into()
        }
    );
}
