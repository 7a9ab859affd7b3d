//! Association extraction policies.
//!
//! `BatchExtractor` turns every association read into a deferred value
//! registered under a batch key built from the association, target kind,
//! view, renderer, join attributes and scope. Parents rendered in the same
//! traversal therefore share one lookup per association and nesting level.
//!
//! `ImmediateExtractor` loads each parent's association on the spot. It is
//! the non-batched baseline, and the batch policy falls back to the same
//! per-parent loading for many-to-many relations.

use crate::blueprint::{AssociationOptions, BlueprintRef, Renderer};
use crate::context::RenderContext;
use assocload_core::{
    AssociationDescriptor, ConfigErrorKind, Error, JoinKeyResolver, JoinKeyStrategy, JoinKeys,
    LinkTable, Record, RelationKind, Result, Scope, Value,
};
use assocload_loader::{BatchKey, Output};
use std::sync::Arc;

/// Extension point: how one association of one parent record is extracted.
pub trait AssociationExtractor: Send + Sync {
    fn extract(
        &self,
        association: &AssociationOptions,
        parent: &Record,
        ctx: &RenderContext<'_>,
    ) -> Result<Output>;
}

/// Output used when an association has no target.
pub fn default_output(kind: &RelationKind) -> Output {
    if kind.is_collection() {
        Output::empty_list()
    } else {
        Output::null()
    }
}

fn check_supported(descriptor: &AssociationDescriptor) -> Result<()> {
    if let RelationKind::Unsupported(name) = descriptor.kind() {
        return Err(Error::config(
            ConfigErrorKind::UnsupportedRelation,
            format!(
                "unsupported association kind {name} for '{}'",
                descriptor.name()
            ),
        ));
    }
    Ok(())
}

fn check_view(renderer: &dyn Renderer, view: &str) -> Result<()> {
    if renderer.has_view(view) {
        Ok(())
    } else {
        Err(Error::config(
            ConfigErrorKind::UnknownView,
            format!(
                "{} has no view '{view}'",
                renderer.fingerprint().unwrap_or("renderer")
            ),
        ))
    }
}

/// The item key: the parent's `foreign_key` attribute.
fn item_key(descriptor: &AssociationDescriptor, join: &JoinKeys, parent: &Record) -> Result<Value> {
    parent.get(&join.foreign_key).cloned().ok_or_else(|| {
        Error::config(
            ConfigErrorKind::MissingAttribute,
            format!(
                "{} record has no attribute '{}' for association '{}'",
                parent.kind(),
                join.foreign_key,
                descriptor.name()
            ),
        )
    })
}

/// Load a many-to-many association for one parent: link records first, then
/// the targets they point at. Targets come back in store order.
fn load_through(
    link: &LinkTable,
    association: &AssociationOptions,
    join: &JoinKeys,
    parent: &Record,
    ctx: &RenderContext<'_>,
) -> Result<Output> {
    let descriptor = association.descriptor();
    let parent_pk = item_key(descriptor, join, parent)?;
    if parent_pk.is_null() {
        return Ok(Output::empty_list());
    }

    tracing::debug!(
        association = descriptor.name(),
        link_table = %link.kind,
        "loading many-to-many association per parent"
    );

    let links = ctx.store().find_where(
        &link.kind,
        &link.local_column,
        std::slice::from_ref(&parent_pk),
        &Scope::default(),
    )?;
    let mut remote_ids: Vec<Value> = Vec::with_capacity(links.len());
    for row in &links {
        if let Some(id) = row.get(&link.remote_column) {
            if !id.is_null() && !remote_ids.contains(id) {
                remote_ids.push(id.clone());
            }
        }
    }
    if remote_ids.is_empty() {
        return Ok(Output::empty_list());
    }

    let scope = association.scope_for(parent, ctx.local_options());
    let targets = ctx
        .store()
        .find_where(descriptor.target(), &join.key, &remote_ids, &scope)?;
    render_all(association, &targets, ctx).map(Output::List)
}

fn render_all(
    association: &AssociationOptions,
    records: &[Record],
    ctx: &RenderContext<'_>,
) -> Result<Vec<Output>> {
    let view = association.view_name();
    records
        .iter()
        .map(|record| {
            let renderer = association.blueprint().for_record(record);
            check_view(renderer.as_ref(), view)?;
            renderer.render(record, view, ctx)
        })
        .collect()
}

/// Batched extraction.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchExtractor {
    resolver: JoinKeyResolver,
}

impl BatchExtractor {
    pub const fn new(strategy: JoinKeyStrategy) -> Self {
        Self {
            resolver: JoinKeyResolver::new(strategy),
        }
    }

    pub const fn resolver(&self) -> &JoinKeyResolver {
        &self.resolver
    }
}

impl AssociationExtractor for BatchExtractor {
    fn extract(
        &self,
        association: &AssociationOptions,
        parent: &Record,
        ctx: &RenderContext<'_>,
    ) -> Result<Output> {
        let descriptor = association.descriptor();
        let renderer = match association.blueprint() {
            BlueprintRef::Static(renderer) => Arc::clone(renderer),
            BlueprintRef::Dynamic(_) => {
                return Err(Error::config(
                    ConfigErrorKind::DynamicRenderer,
                    format!(
                        "association '{}' picks its blueprint per record and cannot be batched",
                        descriptor.name()
                    ),
                ));
            }
        };
        check_supported(descriptor)?;

        let join = self.resolver.resolve(descriptor);
        if let RelationKind::HasManyThrough(link) = descriptor.kind() {
            return load_through(link, association, &join, parent, ctx);
        }

        let Some(fingerprint) = renderer.fingerprint().map(str::to_string) else {
            return Err(Error::config(
                ConfigErrorKind::DynamicRenderer,
                format!(
                    "renderer of association '{}' has no fingerprint and cannot be batched",
                    descriptor.name()
                ),
            ));
        };
        let view = association.view_name().to_string();
        check_view(renderer.as_ref(), &view)?;

        let default = default_output(descriptor.kind());
        let item = item_key(descriptor, &join, parent)?;
        if item.is_null() {
            return Ok(default);
        }

        let scope = association.scope_for(parent, ctx.local_options());
        let key = BatchKey::new(descriptor.name(), descriptor.target())
            .view(view.clone())
            .renderer(fingerprint)
            .join(join.clone())
            .scope(scope.clone());

        let env = ctx.env().clone();
        let target = descriptor.target().to_string();
        let collection = descriptor.kind().is_collection();
        let attribute = join.key;

        let deferred = ctx.registry().get_or_create(
            key,
            item,
            default,
            move |items, writer, registry| {
                let records = env.store().find_where(&target, &attribute, items, &scope)?;
                let ctx = RenderContext::new(&env, registry);
                for record in &records {
                    let bucket = record.get(&attribute).cloned().unwrap_or(Value::Null);
                    let rendered = renderer.render(record, &view, &ctx)?;
                    if collection {
                        writer.append(bucket, rendered)?;
                    } else {
                        writer.set(bucket, rendered);
                    }
                }
                Ok(())
            },
        );
        Ok(Output::Deferred(deferred))
    }
}

/// Per-parent extraction, no batching.
///
/// Accepts renderers chosen per record, which the batch policy rejects.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateExtractor {
    resolver: JoinKeyResolver,
}

impl ImmediateExtractor {
    pub const fn new(strategy: JoinKeyStrategy) -> Self {
        Self {
            resolver: JoinKeyResolver::new(strategy),
        }
    }
}

impl AssociationExtractor for ImmediateExtractor {
    fn extract(
        &self,
        association: &AssociationOptions,
        parent: &Record,
        ctx: &RenderContext<'_>,
    ) -> Result<Output> {
        let descriptor = association.descriptor();
        check_supported(descriptor)?;

        let join = self.resolver.resolve(descriptor);
        if let RelationKind::HasManyThrough(link) = descriptor.kind() {
            return load_through(link, association, &join, parent, ctx);
        }

        let default = default_output(descriptor.kind());
        let item = item_key(descriptor, &join, parent)?;
        if item.is_null() {
            return Ok(default);
        }

        let scope = association.scope_for(parent, ctx.local_options());
        let records = ctx.store().find_where(
            descriptor.target(),
            &join.key,
            std::slice::from_ref(&item),
            &scope,
        )?;

        if descriptor.kind().is_collection() {
            render_all(association, &records, ctx).map(Output::List)
        } else {
            match records.last() {
                Some(record) => Ok(render_all(association, std::slice::from_ref(record), ctx)?
                    .pop()
                    .unwrap_or(default)),
                None => Ok(default),
            }
        }
    }
}
