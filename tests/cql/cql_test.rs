//! The textual front-end and CQN JSON, and how both feed the transformer.

use insta::assert_snapshot;
use navql::cql;
use navql::cqn::{Expr, Query};
use navql::model::Model;
use navql::transform;
use serde_json::json;

fn model() -> Model {
    Model::from_csn_str(include_str!("../fixtures/bookshop.json")).unwrap()
}

// ============================================================================
// Text
// ============================================================================

#[test]
fn test_statements_print_back_as_written() {
    let statements = [
        "SELECT from Books { ID, author.name } where stock > 10",
        "SELECT one distinct from Books as B { B.title as t } where B.stock > 1 order by t desc nulls last limit 10 offset 5",
        "SELECT from Authors[ID = 1]:books.genre as G { G.name }",
        "SELECT from Authors { name, books[stock > 0] { title } as inStock }",
        "SELECT from Authors { address.{ city, street }, { name } as again }",
        "SELECT from Books as B inner join Authors as A on A.ID = B.author.ID { B.title }",
        "SELECT from Books { ID } where ID in (1, 2) and exists author[name like 'A%']",
        "SELECT from Books { count(*) as n } group by author.ID having count(*) > 1",
        "SELECT from Books { ID } where title = :title and stock > ? search 'Poe'",
        "SELECT from Books { * } excluding { cover, internal }",
        "UPDATE Books as B set title = 'it''s', stock = (B.stock - 1) where B.ID = 1",
        "DELETE from Books where ID = 1",
        "INSERT into Books (ID, title) values (1, 'x')",
        "UPSERT into Books (ID) values (1), (2)",
    ];
    for text in statements {
        assert_eq!(cql::parse(text).unwrap().to_string(), text);
    }
}

#[test]
fn test_keywords_are_case_insensitive() {
    assert_eq!(
        cql::parse("select from Books { ID } WHERE stock > 1 ORDER BY ID DESC").unwrap(),
        cql::parse("SELECT from Books { ID } where stock > 1 order by ID desc").unwrap()
    );
}

#[test]
fn test_sql_style_columns() {
    assert_eq!(
        cql::parse("SELECT ID, title as t from Books").unwrap().to_string(),
        "SELECT from Books { ID, title as t }"
    );
}

#[test]
fn test_expression_tokens() {
    let tokens = cql::parse_expr("a.b[c = 1].d > 2 and x in (1, 2)").unwrap();
    assert_eq!(tokens.len(), 7);
    assert!(tokens[3].is_keyword("and"));
    assert!(matches!(tokens[6], Expr::List(ref items) if items.len() == 2));
    assert_eq!(Expr::Xpr(tokens).to_string(), "(a.b[c = 1].d > 2 and x in (1, 2))");
}

#[test]
fn test_comments_are_skipped() {
    let text = "SELECT from Books /* all of them */ { ID } // trailing\n where ID = 1";
    assert_eq!(
        cql::parse(text).unwrap().to_string(),
        "SELECT from Books { ID } where ID = 1"
    );
}

#[test]
fn test_syntax_errors() {
    let source = "SELECT from Books where";
    let err = cql::parse(source).unwrap_err();
    assert_eq!(err.span, source.len()..source.len());
    assert!(err.message.contains("expected"), "{}", err.message);

    let rendered = err.render(source);
    assert!(rendered.contains("Error"), "{rendered}");
    assert!(rendered.contains(&err.message), "{rendered}");

    assert!(cql::parse("MERGE into Books").is_err());
    assert!(cql::parse("SELECT from Books where title = 'open").is_err());
    assert!(cql::parse("SELECT ID from Books { title }").is_err());
}

// ============================================================================
// JSON
// ============================================================================

#[test]
fn test_json_and_text_give_the_same_tree() {
    let from_json = Query::from_value(json!({
        "SELECT": {
            "from": { "ref": ["Books"] },
            "columns": [{ "ref": ["ID"] }, { "ref": ["author", "name"], "as": "a" }],
            "where": [{ "ref": ["stock"] }, ">", { "val": 10 }],
            "orderBy": [{ "ref": ["title"], "sort": "desc" }],
            "limit": { "rows": { "val": 5 } }
        }
    }))
    .unwrap();
    let from_text = cql::parse("SELECT from Books { ID, author.name as a } where stock > 10 order by title desc limit 5").unwrap();
    assert_eq!(from_json, from_text);
    assert_eq!(Query::from_value(from_text.to_json()).unwrap(), from_text);
}

#[test]
fn test_compiled_query_as_json() {
    let query = cql::parse("SELECT from Books { author.name } where ID = 1").unwrap();
    let compiled = transform(&query, &model()).unwrap();
    let json = compiled.to_json();

    assert_eq!(
        json["SELECT"]["columns"],
        json!([{ "ref": ["author", "name"], "as": "author_name" }])
    );
    assert_eq!(
        json["SELECT"]["where"],
        json!([{ "ref": ["Books", "ID"] }, "=", { "val": 1 }])
    );
    assert_eq!(Query::from_value(json).unwrap().to_string(), compiled.to_string());
}

#[test]
fn test_expand_order_and_limit_from_json() {
    let query = Query::from_json(
        r#"{ "SELECT": {
            "from": { "ref": ["Authors"] },
            "columns": [
                { "ref": ["name"] },
                { "ref": ["books"], "expand": [{ "ref": ["title"] }],
                  "orderBy": [{ "ref": ["title"] }], "limit": { "rows": { "val": 1 } } }
            ]
        } }"#,
    )
    .unwrap();
    let compiled = transform(&query, &model()).unwrap();
    assert_snapshot!(
        compiled.to_string(),
        @"SELECT from Authors as Authors { Authors.name, (SELECT from Books as books { books.title } where books.author_ID = Authors.ID order by books.title limit 1) as books }"
    );
}
