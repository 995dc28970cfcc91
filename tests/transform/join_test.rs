//! Path expressions that become left joins.

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

#[test]
fn test_path_in_column_joins() {
    assert_snapshot!(
        compile("SELECT from Books { title, author.name }"),
        @"SELECT from Books as Books left join Authors as author on author.ID = Books.author_ID { Books.title, author.name as author_name }"
    );
}

#[test]
fn test_shared_prefix_shares_join() {
    assert_snapshot!(
        compile("SELECT from Books { author.name, author.country.name as country } where author.name like 'A%'"),
        @"SELECT from Books as Books left join Authors as author on author.ID = Books.author_ID left join Countries as country on country.code = author.country_code { author.name as author_name, country.name as country } where author.name like 'A%'"
    );
}

#[test]
fn test_two_associations_to_the_same_target() {
    assert_snapshot!(
        compile("SELECT from Books { author.name, coAuthor.name }"),
        @"SELECT from Books as Books left join Authors as author on author.ID = Books.author_ID left join Authors as coAuthor on coAuthor.ID = Books.coAuthor_ID { author.name as author_name, coAuthor.name as coAuthor_name }"
    );
}

#[test]
fn test_path_in_where_and_order_by_joins() {
    assert_snapshot!(
        compile("SELECT from Books { ID } where genre.name = 'Poetry' order by author.name"),
        @"SELECT from Books as Books left join Genres as genre on genre.ID = Books.genre_ID left join Authors as author on author.ID = Books.author_ID { Books.ID } where genre.name = 'Poetry' order by author.name"
    );
}

#[test]
fn test_infix_filter_is_part_of_the_join() {
    assert_snapshot!(
        compile("SELECT from Books { author[name = 'Poe'].ID }"),
        @"SELECT from Books as Books left join Authors as author on author.ID = Books.author_ID and author.name = 'Poe' { author.ID as author_ID }"
    );
}

#[test]
fn test_filter_shorthand_on_join() {
    assert_snapshot!(
        compile("SELECT from Books { author[7].name }"),
        @"SELECT from Books as Books left join Authors as author on author.ID = Books.author_ID and author.ID = 7 { author.name as author_name }"
    );
}

#[test]
fn test_different_filters_get_their_own_join() {
    assert_snapshot!(
        compile("SELECT from Books { author[name = 'a'].ID as a, author.name as b }"),
        @"SELECT from Books as Books left join Authors as author on author.ID = Books.author_ID and author.name = 'a' left join Authors as author2 on author2.ID = Books.author_ID { author.ID as a, author2.name as b }"
    );
}

#[test]
fn test_join_alias_avoids_table_alias() {
    assert_snapshot!(
        compile("SELECT from Genres as parent { parent.name as child, parent.parent.name }"),
        @"SELECT from Genres as parent left join Genres as parent2 on parent2.ID = parent.parent_ID { parent.name as child, parent2.name as parent_name }"
    );
}

#[test]
fn test_composite_foreign_key_join() {
    assert_snapshot!(
        compile("SELECT from Printings { edition.printer }"),
        @"SELECT from Printings as Printings left join Editions as edition on edition.book_ID = Printings.edition_book_ID and edition.code = Printings.edition_code { edition.printer as edition_printer }"
    );
}

#[test]
fn test_unmanaged_association_join() {
    assert_snapshot!(
        compile("SELECT from Genres { name, children.name as child }"),
        @"SELECT from Genres as Genres left join Genres as children on children.parent_ID = Genres.ID { Genres.name, children.name as child }"
    );
}

#[test]
fn test_unmanaged_condition_with_extra_terms() {
    assert_snapshot!(
        compile("SELECT from Authors { novels.title }"),
        @"SELECT from Authors as Authors left join Books as novels on novels.author_ID = Authors.ID and novels.genre_ID = 1 { novels.title as novels_title }"
    );
}

#[test]
fn test_skipped_targets_are_not_joined() {
    assert_eq!(
        compile("SELECT from Books { ID, draft.note }"),
        "SELECT from Books as Books { Books.ID }"
    );
}

#[test]
fn test_no_join_through_outer_alias() {
    assert!(matches!(
        compile_err("SELECT from Authors { ID } where exists (SELECT from Books { ID } where Authors.country.name = 'x')"),
        TransformError::Unsupported(_)
    ));
}
