//! End-to-end serialization over the blog fixture.

mod common;

use assocload::prelude::*;
use assocload::serde_json::json;
use assocload::{
    BatchExtractor, ConfigErrorKind, LoaderConfig, RenderContext, RenderEnv, ResolutionErrorKind,
    StoreErrorKind,
};
use common::*;
use std::sync::Arc;

fn options() -> LocalOptions {
    LocalOptions::new()
}

#[test]
fn full_view_renders_every_relation_kind() {
    let store = blog_store();
    let json = Serializer::new(store.clone())
        .render_many(&post_blueprint(), &posts(), "full", options())
        .unwrap();

    assert_eq!(
        json,
        json!([
            {
                "id": 1,
                "title": "P1",
                "author": {"id": 1, "name": "Ada"},
                "comments": [
                    {"id": 10, "body": "a", "author": {"id": 2, "name": "Grace"}},
                    {"id": 12, "body": "b", "author": {"id": 1, "name": "Ada"}},
                ],
                "summary": null,
                "tags": [{"id": 7, "name": "rust"}, {"id": 8, "name": "sql"}],
            },
            {
                "id": 2,
                "title": "P2",
                "author": {"id": 2, "name": "Grace"},
                "comments": [{"id": 11, "body": "c", "author": {"id": 1, "name": "Ada"}}],
                "summary": {"id": 100, "text": "second"},
                "tags": [{"id": 7, "name": "rust"}],
            },
            {
                "id": 3,
                "title": "P3",
                "author": null,
                "comments": [],
                "summary": null,
                "tags": [],
            },
        ])
    );

    assert_eq!(store.queries_for("comment"), 1);
    assert_eq!(store.queries_for("summary"), 1);
    // Post authors resolve before comment authors are registered.
    assert_eq!(store.queries_for("author"), 2);
    // Many-to-many loads per parent.
    assert_eq!(store.queries_for("post_tag"), 3);
    assert_eq!(store.queries_for("tag"), 2);
}

#[test]
fn nested_associations_coalesce_across_parents() {
    let store = blog_store();
    let json = Serializer::new(store.clone())
        .render_many(&post_blueprint(), &posts(), "threads", options())
        .unwrap();

    assert_eq!(json[0]["comments"][1]["author"]["name"], json!("Ada"));
    assert_eq!(json[2], json!({"id": 3, "comments": []}));
    // One query per level: comments, then every comment author.
    assert_eq!(store.query_count(), 2);
}

#[test]
fn query_count_does_not_grow_with_fan_out() {
    let store = blog_store();
    for id in 4..=40 {
        store.insert(Record::new(
            "comment",
            [
                ("id", Value::from(id * 10)),
                ("post_id", Value::from(id % 3 + 1)),
                ("author_id", Value::from(id % 2 + 1)),
                ("body", Value::from("more")),
                ("hidden", Value::from(false)),
            ],
        ));
    }
    Serializer::new(store.clone())
        .render_many(&post_blueprint(), &posts(), "threads", options())
        .unwrap();
    assert_eq!(store.query_count(), 2);
}

#[test]
fn join_key_strategies_agree() {
    let store = blog_store();
    let render = |strategy| {
        Serializer::with_config(store.clone(), SerializerConfig::new().join_keys(strategy))
            .render_many(&post_blueprint(), &posts(), "full", options())
            .unwrap()
    };
    assert_eq!(render(JoinKeyStrategy::Composite), render(JoinKeyStrategy::Split));
}

#[test]
fn immediate_loading_matches_batched_output() {
    let store = blog_store();
    let batched = Serializer::new(store.clone())
        .render_many(&post_blueprint(), &posts(), "threads", options())
        .unwrap();
    let batched_queries = store.query_count();
    store.reset_query_count();

    let immediate = Serializer::with_config(store.clone(), SerializerConfig::new().batching(false))
        .render_many(&post_blueprint(), &posts(), "threads", options())
        .unwrap();

    assert_eq!(batched, immediate);
    assert!(store.query_count() > batched_queries);
}

#[test]
fn scopes_split_batches_and_filter() {
    let store = blog_store();
    store.insert(Record::new(
        "comment",
        [
            ("id", Value::from(13)),
            ("post_id", Value::from(1)),
            ("author_id", Value::from(2)),
            ("body", Value::from("spam")),
            ("hidden", Value::from(true)),
        ],
    ));

    let visible = comments().name("comments").scope(|_, opts| {
        if opts.get("include_hidden") == Some(&json!(true)) {
            Scope::new().order_by_desc("id")
        } else {
            Scope::new().where_eq("hidden", false).order_by_desc("id")
        }
    });
    let blueprint = Blueprint::new("PostBlueprint").identifier("id").association(visible);

    let json = Serializer::new(store.clone())
        .render_many(&blueprint, &posts(), "default", options())
        .unwrap();
    assert_eq!(json[0]["comments"], json!([{"id": 12, "body": "b"}, {"id": 10, "body": "a"}]));
    assert_eq!(store.queries_for("comment"), 1);

    let mut admin = options();
    admin.insert("include_hidden".into(), json!(true));
    let json = Serializer::new(store.clone())
        .render_many(&blueprint, &posts(), "default", admin)
        .unwrap();
    assert_eq!(json[0]["comments"].as_array().map(Vec::len), Some(3));
}

#[test]
fn parents_with_different_scopes_use_separate_batches() {
    let store = blog_store();
    let per_parent = comments().scope(|parent, _| {
        Scope::new().where_not_null("body").order_by(if parent.get_i64("id").unwrap_or(0) == 1 {
            "id"
        } else {
            "body"
        })
    });
    let blueprint = Blueprint::new("PostBlueprint").identifier("id").association(per_parent);

    Serializer::new(store.clone())
        .render_many(&blueprint, &posts(), "default", options())
        .unwrap();
    // Post 1 gets one scope, posts 2 and 3 share the other.
    assert_eq!(store.queries_for("comment"), 2);
}

#[test]
fn unsupported_relation_fails_before_registering() {
    let store = blog_store();
    let env = RenderEnv::new(store.clone(), Arc::new(BatchExtractor::default()));
    let registry = BatchRegistry::new();
    let ctx = RenderContext::new(&env, &registry);

    let habtm = AssociationOptions::new(
        AssociationDescriptor::new("tags", "tag", Reflection::unsupported("HasAndBelongsToMany")).unwrap(),
        Blueprint::new("TagBlueprint"),
    );
    let err = ctx.extract(&habtm, &posts()[0]).unwrap_err();

    assert!(err.is_configuration());
    assert_eq!(err.config_kind(), Some(ConfigErrorKind::UnsupportedRelation));
    assert!(err.to_string().contains("HasAndBelongsToMany"));
    assert!(registry.is_empty());
    assert_eq!(store.query_count(), 0);
}

#[test]
fn dynamic_blueprints_are_rejected_when_batching() {
    let store = blog_store();
    let dynamic = AssociationOptions::new(
        AssociationDescriptor::new("author", "author", Reflection::belongs_to("author_id")).unwrap(),
        BlueprintRef::dynamic(|_| -> Arc<dyn Renderer> { Arc::new(author_blueprint()) }),
    );
    let blueprint = Blueprint::new("PostBlueprint").identifier("id").association(dynamic);

    let err = Serializer::new(store.clone())
        .render_many(&blueprint, &posts(), "default", options())
        .unwrap_err();
    assert_eq!(err.config_kind(), Some(ConfigErrorKind::DynamicRenderer));

    let json = Serializer::with_config(store, SerializerConfig::new().batching(false))
        .render_many(&blueprint, &posts(), "default", options())
        .unwrap();
    assert_eq!(json[1]["author"]["name"], json!("Grace"));
}

#[test]
fn store_failure_reaches_the_caller() {
    let store = blog_store();
    store.fail_kind("summary");

    let err = Serializer::new(store.clone())
        .render_many(&post_blueprint(), &posts(), "full", options())
        .unwrap_err();
    assert!(err.is_resolution());
    assert_eq!(err.resolution_kind(), Some(ResolutionErrorKind::BatchFailed));
    assert!(matches!(err.root_cause(), Error::Store(e) if e.kind == StoreErrorKind::Unavailable));

    store.clear_failures();
    assert!(
        Serializer::new(store)
            .render_many(&post_blueprint(), &posts(), "full", options())
            .is_ok()
    );
}

#[test]
fn depth_bound_applies_per_call() {
    let store = blog_store();
    let shallow = SerializerConfig::new().loader(LoaderConfig::new().max_force_depth(1));
    let err = Serializer::with_config(store.clone(), shallow)
        .render_many(&post_blueprint(), &posts(), "threads", options())
        .unwrap_err();
    assert_eq!(err.resolution_kind(), Some(ResolutionErrorKind::DepthExceeded));

    let deep_enough = SerializerConfig::new().loader(LoaderConfig::new().max_force_depth(2));
    assert!(
        Serializer::with_config(store, deep_enough)
            .render_many(&post_blueprint(), &posts(), "threads", options())
            .is_ok()
    );
}

#[test]
fn subtrees_forced_from_several_threads() {
    let store = blog_store();
    let env = RenderEnv::new(store.clone(), Arc::new(BatchExtractor::default()));
    let registry = BatchRegistry::new();
    let ctx = RenderContext::new(&env, &registry);

    let blueprint = post_blueprint();
    let trees: Vec<Output> = posts()
        .iter()
        .map(|post| blueprint.render(post, "threads", &ctx).unwrap())
        .collect();

    let results: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = trees
            .iter()
            .map(|tree| {
                let registry = &registry;
                s.spawn(move || registry.materialize(tree).unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results[1]["comments"][0]["id"], json!(11));
    assert_eq!(store.queries_for("comment"), 1);
    assert_eq!(registry.stats().batches_failed, 0);
}

#[test]
fn late_registration_is_counted() {
    let store = blog_store();
    let env = RenderEnv::new(store.clone(), Arc::new(BatchExtractor::default()));
    let registry = BatchRegistry::new();
    let ctx = RenderContext::new(&env, &registry);
    let posts = posts();

    let first = ctx.extract(&comments(), &posts[0]).unwrap();
    registry.materialize(&first).unwrap();
    let second = ctx.extract(&comments(), &posts[1]).unwrap();
    registry.materialize(&second).unwrap();

    let stats = registry.stats();
    assert_eq!(stats.batches_opened, 2);
    assert_eq!(stats.reopened, 1);
    assert_eq!(store.queries_for("comment"), 2);
}

#[test]
fn same_association_name_on_different_join_attributes() {
    let comment = || Blueprint::new("CommentBlueprint").identifier("id");
    let written = AssociationOptions::new(
        AssociationDescriptor::new("comments", "comment", Reflection::has_many("author_id")).unwrap(),
        comment(),
    );
    let author = AssociationOptions::new(
        AssociationDescriptor::new("author", "author", Reflection::belongs_to("author_id")).unwrap(),
        Blueprint::new("AuthorBlueprint").identifier("id").association(written),
    );
    let on_post = AssociationOptions::new(
        AssociationDescriptor::new("comments", "comment", Reflection::has_many("post_id")).unwrap(),
        comment(),
    );
    let blueprint = Blueprint::new("PostBlueprint")
        .identifier("id")
        .association(author)
        .association(on_post);

    let json = Serializer::new(blog_store())
        .render_many(&blueprint, &posts(), "default", options())
        .unwrap();

    assert_eq!(
        json[0],
        json!({
            "id": 1,
            "author": {"id": 1, "comments": [{"id": 11}, {"id": 12}]},
            "comments": [{"id": 10}, {"id": 12}],
        })
    );
    assert_eq!(
        json[1],
        json!({
            "id": 2,
            "author": {"id": 2, "comments": [{"id": 10}]},
            "comments": [{"id": 11}],
        })
    );
}

#[test]
fn same_named_blueprints_with_different_fields() {
    let brief = comments().name("brief");
    let full = AssociationOptions::new(
        AssociationDescriptor::new("comments", "comment", Reflection::has_many("post_id")).unwrap(),
        Blueprint::new("CommentBlueprint").identifier("id").field("body").field("hidden"),
    )
    .name("full");
    let blueprint = Blueprint::new("PostBlueprint")
        .identifier("id")
        .association(brief)
        .association(full);

    let store = blog_store();
    let json = Serializer::new(store.clone())
        .render_many(&blueprint, &posts(), "default", options())
        .unwrap();

    assert_eq!(
        json[1],
        json!({
            "id": 2,
            "brief": [{"id": 11, "body": "c"}],
            "full": [{"id": 11, "body": "c", "hidden": false}],
        })
    );
    assert_eq!(store.queries_for("comment"), 2);
}

/// Renders a comment with its replies, recursively.
struct ReplyRenderer;

impl Renderer for ReplyRenderer {
    fn fingerprint(&self) -> Option<&str> {
        Some("ReplyRenderer")
    }

    fn render(&self, record: &Record, _view: &str, ctx: &RenderContext<'_>) -> Result<Output> {
        let replies = AssociationOptions::new(
            AssociationDescriptor::new("replies", "comment", Reflection::has_many("reply_to"))?,
            Arc::new(ReplyRenderer) as Arc<dyn Renderer>,
        );
        let id = record.get("id").map_or(json!(null), Value::to_json);
        Ok(Output::Object(vec![
            ("id".to_string(), id.into()),
            ("replies".to_string(), ctx.extract(&replies, record)?),
        ]))
    }
}

#[test]
fn self_referential_nesting_is_not_flagged() {
    let store = blog_store();
    for (id, reply_to) in [(20, 10), (21, 20), (22, 21)] {
        store.insert(Record::new(
            "comment",
            [
                ("id", Value::from(id)),
                ("post_id", Value::Null),
                ("author_id", Value::from(1)),
                ("body", Value::from("reply")),
                ("hidden", Value::from(false)),
                ("reply_to", Value::from(reply_to)),
            ],
        ));
    }

    let env = RenderEnv::new(store.clone(), Arc::new(BatchExtractor::default()));
    let registry = BatchRegistry::with_config(LoaderConfig::new().degraded_threshold(2));
    let ctx = RenderContext::new(&env, &registry);
    let root = Record::new("comment", [("id", Value::from(10))]);

    let tree = ReplyRenderer.render(&root, "default", &ctx).unwrap();
    assert_eq!(
        registry.materialize(&tree).unwrap(),
        json!({"id": 10, "replies": [{"id": 20, "replies": [{"id": 21, "replies": [{"id": 22, "replies": []}]}]}]})
    );

    let stats = registry.stats();
    assert_eq!(stats.nested, 3);
    assert_eq!(stats.reopened, 0);
    assert_eq!(stats.potential_n1, 0);
    assert_eq!(registry.resolutions_for("replies", "comment"), 4);
}
