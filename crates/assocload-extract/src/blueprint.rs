//! Renderers and blueprints.
//!
//! A `Renderer` turns one record into an `Output` tree for a named view.
//! `Blueprint` is the stock renderer: a named, introspectable list of fields
//! and associations per view. Every view starts from the `default` view's
//! entries; a view may add entries, override them by output name, or exclude
//! them.
//!
//! ```
//! use assocload_core::{AssociationDescriptor, Reflection};
//! use assocload_extract::{AssociationOptions, Blueprint, Renderer};
//!
//! let comment = Blueprint::new("CommentBlueprint").identifier("id").field("body");
//! let post = Blueprint::new("PostBlueprint")
//!     .identifier("id")
//!     .field("title")
//!     .view("extended", |v| {
//!         v.association(AssociationOptions::new(
//!             AssociationDescriptor::new("comments", "comment", Reflection::has_many("post_id")).unwrap(),
//!             comment,
//!         ))
//!     });
//!
//! assert!(post.fingerprint().is_some_and(|f| f.starts_with("PostBlueprint#")));
//! assert!(post.has_view("extended"));
//! assert!(!post.has_view("summary"));
//! ```

use crate::context::{LocalOptions, RenderContext};
use assocload_core::{AssociationDescriptor, ConfigErrorKind, Error, Record, Result, Scope};
use assocload_loader::Output;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

/// Name of the view every blueprint has.
pub const DEFAULT_VIEW: &str = "default";

/// Renders records of one shape.
pub trait Renderer: Send + Sync {
    /// Identity of this renderer's configuration, part of every batch key it
    /// renders under. Renderers that render differently must return different
    /// fingerprints. `None` means the renderer cannot be identified, so its
    /// renders cannot be batched.
    fn fingerprint(&self) -> Option<&str>;

    /// Is `view` defined on this renderer?
    fn has_view(&self, view: &str) -> bool {
        view == DEFAULT_VIEW
    }

    /// Render `record` in `view`. Associations are extracted through `ctx`
    /// and may come back deferred.
    fn render(&self, record: &Record, view: &str, ctx: &RenderContext<'_>) -> Result<Output>;
}

/// Picks a renderer per record.
pub type RendererSelector = Arc<dyn Fn(&Record) -> Arc<dyn Renderer> + Send + Sync>;

/// The renderer used for an association's targets.
#[derive(Clone)]
pub enum BlueprintRef {
    /// One renderer for every target
    Static(Arc<dyn Renderer>),
    /// Renderer chosen per target record
    Dynamic(RendererSelector),
}

impl BlueprintRef {
    pub fn dynamic<F>(select: F) -> Self
    where
        F: Fn(&Record) -> Arc<dyn Renderer> + Send + Sync + 'static,
    {
        BlueprintRef::Dynamic(Arc::new(select))
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, BlueprintRef::Dynamic(_))
    }

    /// The renderer for `record`.
    pub fn for_record(&self, record: &Record) -> Arc<dyn Renderer> {
        match self {
            BlueprintRef::Static(renderer) => Arc::clone(renderer),
            BlueprintRef::Dynamic(select) => select(record),
        }
    }
}

impl fmt::Debug for BlueprintRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlueprintRef::Static(r) => f.debug_tuple("Static").field(&r.fingerprint()).finish(),
            BlueprintRef::Dynamic(_) => f.write_str("Dynamic"),
        }
    }
}

impl From<Blueprint> for BlueprintRef {
    fn from(blueprint: Blueprint) -> Self {
        BlueprintRef::Static(Arc::new(blueprint))
    }
}

impl From<Arc<Blueprint>> for BlueprintRef {
    fn from(blueprint: Arc<Blueprint>) -> Self {
        BlueprintRef::Static(blueprint)
    }
}

impl From<Arc<dyn Renderer>> for BlueprintRef {
    fn from(renderer: Arc<dyn Renderer>) -> Self {
        BlueprintRef::Static(renderer)
    }
}

/// Builds the scope of an association lookup from the parent record and the
/// caller's local options.
pub type ScopeFn = Arc<dyn Fn(&Record, &LocalOptions) -> Scope + Send + Sync>;

/// An association as declared on a blueprint.
#[derive(Clone)]
pub struct AssociationOptions {
    descriptor: Arc<AssociationDescriptor>,
    blueprint: BlueprintRef,
    view: Option<String>,
    scope: Option<ScopeFn>,
    field_name: Option<String>,
}

impl AssociationOptions {
    pub fn new(descriptor: AssociationDescriptor, blueprint: impl Into<BlueprintRef>) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            blueprint: blueprint.into(),
            view: None,
            scope: None,
            field_name: None,
        }
    }

    /// Render targets in `view` instead of the default view.
    #[must_use]
    pub fn view(mut self, view: impl Into<String>) -> Self {
        self.view = Some(view.into());
        self
    }

    /// Narrow the lookup with a scope computed per parent.
    #[must_use]
    pub fn scope<F>(mut self, scope: F) -> Self
    where
        F: Fn(&Record, &LocalOptions) -> Scope + Send + Sync + 'static,
    {
        self.scope = Some(Arc::new(scope));
        self
    }

    /// Output field name, if it differs from the association name.
    #[must_use]
    pub fn name(mut self, field_name: impl Into<String>) -> Self {
        self.field_name = Some(field_name.into());
        self
    }

    pub fn descriptor(&self) -> &AssociationDescriptor {
        &self.descriptor
    }

    pub fn blueprint(&self) -> &BlueprintRef {
        &self.blueprint
    }

    /// The view targets render in.
    pub fn view_name(&self) -> &str {
        self.view.as_deref().unwrap_or(DEFAULT_VIEW)
    }

    pub fn field_name(&self) -> &str {
        self.field_name
            .as_deref()
            .unwrap_or_else(|| self.descriptor.name())
    }

    fn hash_shape<H: Hasher>(&self, hasher: &mut H) {
        self.field_name().hash(hasher);
        self.descriptor.name().hash(hasher);
        self.descriptor.target().hash(hasher);
        format!("{:?}", self.descriptor.kind()).hash(hasher);
        self.view_name().hash(hasher);
        match &self.blueprint {
            BlueprintRef::Static(renderer) => renderer.fingerprint().hash(hasher),
            BlueprintRef::Dynamic(select) => address(select).hash(hasher),
        }
        self.scope.as_ref().map(address).hash(hasher);
    }

    /// The scope for `parent`: the scope function's result, or the empty scope.
    pub fn scope_for(&self, parent: &Record, local_options: &LocalOptions) -> Scope {
        self.scope
            .as_ref()
            .map_or_else(Scope::default, |f| f(parent, local_options))
    }
}

impl fmt::Debug for AssociationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssociationOptions")
            .field("association", &self.descriptor.name())
            .field("target", &self.descriptor.target())
            .field("blueprint", &self.blueprint)
            .field("view", &self.view_name())
            .field("scoped", &self.scope.is_some())
            .finish()
    }
}

/// Computes a field value from the record and the caller's local options.
pub type FieldFn = Arc<dyn Fn(&Record, &LocalOptions) -> Result<serde_json::Value> + Send + Sync>;

#[derive(Clone)]
enum Entry {
    Attribute { name: String, source: String },
    Computed { name: String, compute: FieldFn },
    Association(AssociationOptions),
}

impl Entry {
    fn name(&self) -> &str {
        match self {
            Entry::Attribute { name, .. } | Entry::Computed { name, .. } => name,
            Entry::Association(options) => options.field_name(),
        }
    }

    fn hash_shape<H: Hasher>(&self, hasher: &mut H) {
        match self {
            Entry::Attribute { name, source } => {
                0u8.hash(hasher);
                name.hash(hasher);
                source.hash(hasher);
            }
            Entry::Computed { name, compute } => {
                1u8.hash(hasher);
                name.hash(hasher);
                address(compute).hash(hasher);
            }
            Entry::Association(options) => {
                2u8.hash(hasher);
                options.hash_shape(hasher);
            }
        }
    }
}

/// Closures are compared by identity: clones of one blueprint share them.
fn address<T: ?Sized>(shared: &Arc<T>) -> usize {
    Arc::as_ptr(shared).cast::<()>() as usize
}

/// Fields and associations of one view.
#[derive(Clone, Default)]
pub struct View {
    entries: Vec<Entry>,
    excludes: Vec<String>,
}

impl View {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy attribute `name` as is.
    #[must_use]
    pub fn field(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.push(Entry::Attribute {
            source: name.clone(),
            name,
        })
    }

    /// Output attribute `source` under `name`.
    #[must_use]
    pub fn field_as(self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.push(Entry::Attribute {
            name: name.into(),
            source: source.into(),
        })
    }

    #[must_use]
    pub fn computed<F>(self, name: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&Record, &LocalOptions) -> Result<serde_json::Value> + Send + Sync + 'static,
    {
        self.push(Entry::Computed {
            name: name.into(),
            compute: Arc::new(compute),
        })
    }

    #[must_use]
    pub fn association(self, options: AssociationOptions) -> Self {
        self.push(Entry::Association(options))
    }

    /// Drop an inherited entry from this view.
    #[must_use]
    pub fn exclude(mut self, name: impl Into<String>) -> Self {
        self.excludes.push(name.into());
        self
    }

    fn push(mut self, entry: Entry) -> Self {
        self.entries.push(entry);
        self
    }
}

/// Named renderer with views.
#[derive(Clone)]
pub struct Blueprint {
    name: String,
    identifier: Option<String>,
    /// The default view is always first.
    views: Vec<(String, View)>,
    /// Name plus a hash of identifier, views and entries; built on first use.
    fingerprint: OnceLock<String>,
}

impl Blueprint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identifier: None,
            views: vec![(DEFAULT_VIEW.to_string(), View::new())],
            fingerprint: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attribute rendered first in every view.
    #[must_use]
    pub fn identifier(mut self, attribute: impl Into<String>) -> Self {
        self.identifier = Some(attribute.into());
        self.fingerprint = OnceLock::new();
        self
    }

    #[must_use]
    pub fn field(self, name: impl Into<String>) -> Self {
        self.map_default(|v| v.field(name))
    }

    #[must_use]
    pub fn field_as(self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.map_default(|v| v.field_as(name, source))
    }

    #[must_use]
    pub fn computed<F>(self, name: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&Record, &LocalOptions) -> Result<serde_json::Value> + Send + Sync + 'static,
    {
        self.map_default(|v| v.computed(name, compute))
    }

    #[must_use]
    pub fn association(self, options: AssociationOptions) -> Self {
        self.map_default(|v| v.association(options))
    }

    /// Define (or extend) view `name`.
    #[must_use]
    pub fn view(mut self, name: impl Into<String>, build: impl FnOnce(View) -> View) -> Self {
        let name = name.into();
        match self.views.iter().position(|(n, _)| *n == name) {
            Some(i) => {
                let view = std::mem::take(&mut self.views[i].1);
                self.views[i].1 = build(view);
            }
            None => self.views.push((name, build(View::new()))),
        }
        self.fingerprint = OnceLock::new();
        self
    }

    pub fn view_names(&self) -> impl Iterator<Item = &str> {
        self.views.iter().map(|(n, _)| n.as_str())
    }

    fn shape_fingerprint(&self) -> String {
        let mut hasher = DefaultHasher::new();
        self.identifier.hash(&mut hasher);
        for (name, view) in &self.views {
            name.hash(&mut hasher);
            view.entries.len().hash(&mut hasher);
            for entry in &view.entries {
                entry.hash_shape(&mut hasher);
            }
            view.excludes.hash(&mut hasher);
        }
        format!("{}#{:016x}", self.name, hasher.finish())
    }

    fn map_default(self, build: impl FnOnce(View) -> View) -> Self {
        self.view(DEFAULT_VIEW, build)
    }

    /// Entries of `view` in output order, or `None` for an unknown view.
    fn entries_for(&self, view: &str) -> Option<Vec<&Entry>> {
        let (_, own) = self.views.iter().find(|(n, _)| n == view)?;
        let mut entries: Vec<&Entry> = Vec::new();
        let layers = if view == DEFAULT_VIEW {
            vec![own]
        } else {
            vec![&self.views[0].1, own]
        };
        for layer in layers {
            for entry in &layer.entries {
                match entries.iter().position(|e| e.name() == entry.name()) {
                    Some(i) => entries[i] = entry,
                    None => entries.push(entry),
                }
            }
        }
        entries.retain(|e| !own.excludes.iter().any(|x| x == e.name()));
        Some(entries)
    }
}

impl fmt::Debug for Blueprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blueprint")
            .field("name", &self.name)
            .field("views", &self.view_names().collect::<Vec<_>>())
            .finish()
    }
}

fn read_attribute(blueprint: &str, record: &Record, attribute: &str) -> Result<serde_json::Value> {
    record.get(attribute).map(|v| v.to_json()).ok_or_else(|| {
        Error::config(
            ConfigErrorKind::MissingAttribute,
            format!(
                "{blueprint}: {} record has no attribute '{attribute}'",
                record.kind()
            ),
        )
    })
}

impl Renderer for Blueprint {
    fn fingerprint(&self) -> Option<&str> {
        Some(self.fingerprint.get_or_init(|| self.shape_fingerprint()))
    }

    fn has_view(&self, view: &str) -> bool {
        self.views.iter().any(|(n, _)| n == view)
    }

    fn render(&self, record: &Record, view: &str, ctx: &RenderContext<'_>) -> Result<Output> {
        let entries = self.entries_for(view).ok_or_else(|| {
            Error::config(
                ConfigErrorKind::UnknownView,
                format!("{} has no view '{view}'", self.name),
            )
        })?;

        let mut fields = Vec::with_capacity(entries.len() + 1);
        if let Some(id) = &self.identifier {
            fields.push((id.clone(), Output::Plain(read_attribute(&self.name, record, id)?)));
        }
        for entry in entries {
            let value = match entry {
                Entry::Attribute { source, .. } => {
                    Output::Plain(read_attribute(&self.name, record, source)?)
                }
                Entry::Computed { compute, .. } => Output::Plain(compute(record, ctx.local_options())?),
                Entry::Association(options) => ctx.extract(options, record)?,
            };
            fields.push((entry.name().to_string(), value));
        }
        Ok(Output::Object(fields))
    }
}
