//! Plain SELECTs: aliasing, projection, clauses, localization and search.

use insta::assert_snapshot;
use navql::cql;
use navql::cqn::{Query, Ref, Select};
use navql::model::{Entity, Model};
use navql::search::SearchColumns;
use navql::{transform, TransformError, Transformer};

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
fn test_implicit_alias_is_added() {
    assert_eq!(
        compile("SELECT from Books { ID }"),
        "SELECT from Books as Books { Books.ID }"
    );
}

#[test]
fn test_explicit_alias_is_kept() {
    assert_eq!(
        compile("SELECT from Books as B { ID, B.title }"),
        "SELECT from Books as B { B.ID, B.title }"
    );
}

#[test]
fn test_sql_style_projection() {
    assert_eq!(
        compile("SELECT ID, title from Books"),
        "SELECT from Books as Books { Books.ID, Books.title }"
    );
}

#[test]
fn test_column_alias_and_cast() {
    assert_snapshot!(
        compile("SELECT from Books { ID as key : cds.String, title as name }"),
        @"SELECT from Books as Books { Books.ID as key : cds.String, Books.title as name }"
    );
}

#[test]
fn test_one_and_distinct_survive() {
    assert_eq!(
        compile("SELECT one from Books { title }"),
        "SELECT one from Books as Books { Books.title }"
    );
    assert_eq!(
        compile("SELECT distinct from Books { title }"),
        "SELECT distinct from Books as Books { Books.title }"
    );
}

#[test]
fn test_where_order_and_limit() {
    assert_snapshot!(
        compile("SELECT from Books { title } where stock > 10 and title like 'A%' order by title desc limit 10 offset 5"),
        @"SELECT from Books as Books { Books.title } where Books.stock > 10 and Books.title like 'A%' order by Books.title desc limit 10 offset 5"
    );
}

#[test]
fn test_order_by_column_alias() {
    assert_eq!(
        compile("SELECT from Books { title as t } order by t"),
        "SELECT from Books as Books { Books.title as t } order by t"
    );
}

#[test]
fn test_group_by_and_having() {
    assert_snapshot!(
        compile("SELECT from Books { author, count(*) as n } group by author having count(*) > 1"),
        @"SELECT from Books as Books { Books.author_ID, count(*) as n } group by Books.author_ID having count(*) > 1"
    );
}

#[test]
fn test_order_by_structure_lists_its_leaves() {
    assert_snapshot!(
        compile("SELECT from Books { ID } order by dims desc"),
        @"SELECT from Books as Books { Books.ID } order by Books.dims_height desc, Books.dims_width desc"
    );
}

#[test]
fn test_virtual_elements_are_dropped() {
    assert_eq!(
        compile("SELECT from Books { ID, internal }"),
        "SELECT from Books as Books { Books.ID }"
    );
}

#[test]
fn test_only_virtual_columns_is_an_error() {
    assert_eq!(
        compile_err("SELECT from Books { internal }"),
        TransformError::EmptyProjection {
            entity: "Books".into()
        }
    );
}

#[test]
fn test_skipped_target_contributes_no_columns() {
    assert_eq!(
        compile("SELECT from Books { ID, draft.note }"),
        "SELECT from Books as Books { Books.ID }"
    );
    assert!(matches!(
        compile_err("SELECT from Books { draft.note }"),
        TransformError::EmptyProjection { .. }
    ));
}

#[test]
fn test_calculated_element_is_replaced() {
    assert_eq!(
        compile("SELECT from Books { ID, total }"),
        "SELECT from Books as Books { Books.ID, Books.stock * Books.price as total }"
    );
    assert_eq!(
        compile("SELECT from Books { ID } where total > 100"),
        "SELECT from Books as Books { Books.ID } where (Books.stock * Books.price) > 100"
    );
}

#[test]
fn test_calculated_element_through_association_joins() {
    assert_snapshot!(
        compile("SELECT from Books { authorName }"),
        @"SELECT from Books as Books left join Authors as author on author.ID = Books.author_ID { author.name as authorName }"
    );
}

#[test]
fn test_self_reference_reads_column_expression() {
    assert_snapshot!(
        compile("SELECT from Books { stock * 2 as double, $self.double as again } where $self.double > 10"),
        @"SELECT from Books as Books { Books.stock * 2 as double, Books.stock * 2 as again } where (Books.stock * 2) > 10"
    );
}

#[test]
fn test_self_reference_cycle_is_rejected() {
    assert!(matches!(
        compile_err("SELECT from Books { $self.b as a, $self.a as b }"),
        TransformError::Unsupported(_)
    ));
}

#[test]
fn test_derived_table() {
    assert_snapshot!(
        compile("SELECT from (SELECT from Books { ID, title }) as B { title }"),
        @"SELECT from (SELECT from Books as Books { Books.ID, Books.title }) as B { B.title }"
    );
}

#[test]
fn test_explicit_join() {
    assert_snapshot!(
        compile("SELECT from Books as B join Authors as A on A.ID = B.author.ID { B.title, A.name }"),
        @"SELECT from Books as B inner join Authors as A on A.ID = B.author_ID { B.title, A.name }"
    );
}

#[test]
fn test_localized_tables() {
    let model = model();
    let select = cql::parse_select("SELECT from Books { title, author.name }")
        .unwrap()
        .localized();
    let compiled = transform(&Query::Select(select), &model).unwrap();
    assert_snapshot!(
        compiled.to_string(),
        @"SELECT from localized.Books as Books left join Authors as author on author.ID = Books.author_ID { Books.title, author.name as author_name }"
    );

    // opted out of localization
    let select = cql::parse_select("SELECT from Countries { name }").unwrap().localized();
    let compiled = transform(&Query::Select(select), &model).unwrap();
    assert_eq!(
        compiled.to_string(),
        "SELECT from Countries as Countries { Countries.name }"
    );
}

#[test]
fn test_default_search_uses_string_elements() {
    assert_snapshot!(
        compile("SELECT from Books { ID } search 'Poe'"),
        @"SELECT from Books as Books { Books.ID } where search((Books.title), 'Poe')"
    );
    assert_snapshot!(
        compile("SELECT from Authors { ID } where ID > 1 search 'Poe'"),
        @"SELECT from Authors as Authors { Authors.ID } where Authors.ID > 1 and search((Authors.name, Authors.address_street, Authors.address_city), 'Poe')"
    );
}

struct KeysOnly;

impl SearchColumns for KeysOnly {
    fn columns_to_search(&self, _query: &Select, entity: &Entity, alias: &str) -> Vec<Ref> {
        entity
            .keys()
            .map(|k| Ref::new([alias, k.name.as_str()]))
            .collect()
    }
}

#[test]
fn test_custom_search_columns() {
    let model = model();
    let transformer = Transformer::new(&model).with_search(KeysOnly);
    let query = cql::parse("SELECT from Books as B { title } search 'x'").unwrap();
    assert_eq!(
        transformer.transform(&query).unwrap().to_string(),
        "SELECT from Books as B { B.title } where search((B.ID), 'x')"
    );
}

#[test]
fn test_unknown_entity() {
    assert_eq!(
        compile_err("SELECT from Nope { ID }"),
        TransformError::UnknownEntity("Nope".into())
    );
}

#[test]
fn test_unresolvable_step_names_the_path() {
    assert_eq!(
        compile_err("SELECT from Books { author.nope }"),
        TransformError::UnresolvablePath {
            name: "nope".into(),
            path: "author.nope".into()
        }
    );
}

#[test]
fn test_ambiguous_element_across_sources() {
    let err = compile_err("SELECT from Books as B join Authors as A on A.ID = B.author.ID { ID }");
    assert_eq!(
        err,
        TransformError::AmbiguousReference {
            name: "ID".into(),
            candidates: vec!["B".into(), "A".into()]
        }
    );
}

#[test]
fn test_duplicate_user_alias() {
    assert_eq!(
        compile_err("SELECT from Books as X join Authors as x on x.ID = X.author.ID { X.title }"),
        TransformError::DuplicateAlias("x".into())
    );
}

#[test]
fn test_input_is_not_modified() {
    let model = model();
    let query = cql::parse("SELECT from Books { author.name, dims } where struc1 = struc2").unwrap();
    let before = query.clone();
    transform(&query, &model).unwrap();
    assert_eq!(query, before);
}
