//! Blog fixture shared by the integration tests.
#![allow(dead_code)]

use assocload::prelude::*;
use std::sync::Arc;

fn row(kind: &str, attrs: &[(&str, Value)]) -> Record {
    Record::new(kind, attrs.iter().map(|(k, v)| (*k, v.clone())))
}

/// Authors 1 and 2, posts 1..=3 (post 3 has no author), comments on posts
/// 1 and 2, one summary, and tags linked through `post_tag`.
pub fn blog_store() -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    store.insert_all([
        row("author", &[("id", 1.into()), ("name", "Ada".into())]),
        row("author", &[("id", 2.into()), ("name", "Grace".into())]),
        row("comment", &[("id", 10.into()), ("post_id", 1.into()), ("author_id", 2.into()), ("body", "a".into()), ("hidden", false.into())]),
        row("comment", &[("id", 11.into()), ("post_id", 2.into()), ("author_id", 1.into()), ("body", "c".into()), ("hidden", false.into())]),
        row("comment", &[("id", 12.into()), ("post_id", 1.into()), ("author_id", 1.into()), ("body", "b".into()), ("hidden", false.into())]),
        row("summary", &[("id", 100.into()), ("post_id", 2.into()), ("text", "second".into())]),
        row("tag", &[("id", 7.into()), ("name", "rust".into())]),
        row("tag", &[("id", 8.into()), ("name", "sql".into())]),
        row("post_tag", &[("post_id", 1.into()), ("tag_id", 8.into())]),
        row("post_tag", &[("post_id", 1.into()), ("tag_id", 7.into())]),
        row("post_tag", &[("post_id", 2.into()), ("tag_id", 7.into())]),
    ]);
    Arc::new(store)
}

pub fn posts() -> Vec<Record> {
    vec![
        row("post", &[("id", 1.into()), ("title", "P1".into()), ("author_id", 1.into())]),
        row("post", &[("id", 2.into()), ("title", "P2".into()), ("author_id", 2.into())]),
        row("post", &[("id", 3.into()), ("title", "P3".into()), ("author_id", Value::Null)]),
    ]
}

pub fn author_blueprint() -> Blueprint {
    Blueprint::new("AuthorBlueprint").identifier("id").field("name")
}

pub fn author() -> AssociationOptions {
    AssociationOptions::new(
        AssociationDescriptor::new("author", "author", Reflection::belongs_to("author_id")).unwrap(),
        author_blueprint(),
    )
}

pub fn comment_blueprint() -> Blueprint {
    Blueprint::new("CommentBlueprint")
        .identifier("id")
        .field("body")
        .view("with_author", |v| v.association(author()))
}

pub fn comments() -> AssociationOptions {
    AssociationOptions::new(
        AssociationDescriptor::new("comments", "comment", Reflection::has_many("post_id")).unwrap(),
        comment_blueprint(),
    )
}

pub fn summary() -> AssociationOptions {
    AssociationOptions::new(
        AssociationDescriptor::new("summary", "summary", Reflection::has_one("post_id")).unwrap(),
        Blueprint::new("SummaryBlueprint").identifier("id").field("text"),
    )
}

pub fn tags() -> AssociationOptions {
    AssociationOptions::new(
        AssociationDescriptor::new(
            "tags",
            "tag",
            Reflection::has_many_through(LinkTable::new("post_tag", "post_id", "tag_id")),
        )
        .unwrap(),
        Blueprint::new("TagBlueprint").identifier("id").field("name"),
    )
}

/// `default`: id, title, author. `full`: plus comments with their authors,
/// summary and tags. `threads`: id plus comments with their authors.
pub fn post_blueprint() -> Blueprint {
    Blueprint::new("PostBlueprint")
        .identifier("id")
        .field("title")
        .association(author())
        .view("full", |v| {
            v.association(comments().view("with_author"))
                .association(summary())
                .association(tags())
        })
        .view("threads", |v| {
            v.exclude("title")
                .exclude("author")
                .association(comments().view("with_author"))
        })
}
