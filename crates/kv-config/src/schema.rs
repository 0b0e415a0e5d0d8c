//! Field schemas, the schematics builder, and immutable schematics.
//!
//! A schematics is an ordered list of concrete and virtual field schemas
//! stored by full dotted key. Keys share one namespace. Every dependency of
//! a field (effective-value inputs and virtual render inputs) must name a
//! concrete field declared earlier, so resolution in declaration order is
//! always possible and no cycle can exist.
//!
//! The builder validates each declaration as it is made: the value type must
//! exist, the type parameters must pass the type's parameter checker, and the
//! default must pass the value checker. `build()` freezes the result.

use crate::error::{InvalidFieldValue, KvConfigError};
use crate::value_types::{KvFieldValueType, KvFieldValueTypeLibrary};
use lms_shared_types::{KvConfig, KvConfigStack, KvConfigStackLayer};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Derives a field's effective value from its checked value and the resolved
/// values of its dependencies (positional).
pub type EffectiveFn = Arc<dyn Fn(&Value, &[&Value]) -> Value + Send + Sync>;
/// Renders a virtual field from the resolved values of its dependencies.
pub type RenderFn = Arc<dyn Fn(&[&Value]) -> Value + Send + Sync>;
/// Maps a virtual field write back to values for its dependencies.
pub type InverseFn = Arc<dyn Fn(&Value) -> Result<Vec<Value>, String> + Send + Sync>;

/// Layer name reported for values written through a [`KvConfigBuilder`].
pub const CONFIG_BUILDER_LAYER: &str = "configBuilder";

// =============================================================================
// FIELD SCHEMAS
// =============================================================================

/// Effective-value derivation attached to a concrete field.
#[derive(Clone)]
pub struct EffectiveValue {
    dependencies: Vec<String>,
    derive: EffectiveFn,
}

impl EffectiveValue {
    /// Full keys of the fields the derivation reads.
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Apply the derivation.
    pub fn derive(&self, value: &Value, dependencies: &[&Value]) -> Value {
        (self.derive)(value, dependencies)
    }
}

/// Optional settings for a concrete field declaration.
#[derive(Clone, Default)]
pub struct FieldOptions {
    effective: Option<(Vec<String>, EffectiveFn)>,
}

impl FieldOptions {
    /// No options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive the effective value from the checked value and the given
    /// dependencies (keys relative to the declaring scope).
    #[must_use]
    pub fn effective<F>(mut self, dependencies: &[&str], derive: F) -> Self
    where
        F: Fn(&Value, &[&Value]) -> Value + Send + Sync + 'static,
    {
        let dependencies = dependencies.iter().map(ToString::to_string).collect();
        self.effective = Some((dependencies, Arc::new(derive)));
        self
    }
}

/// A field with storage, a value type, and a default.
#[derive(Clone)]
pub struct ConcreteFieldSchema {
    key: String,
    type_key: String,
    type_params: Value,
    default_value: Value,
    value_type: KvFieldValueType,
    effective: Option<EffectiveValue>,
}

impl ConcreteFieldSchema {
    /// Full dotted key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Value type key.
    pub fn type_key(&self) -> &str {
        &self.type_key
    }

    /// Type parameters passed to the value type.
    pub const fn type_params(&self) -> &Value {
        &self.type_params
    }

    /// Normalized default value; always passes the checker.
    pub const fn default_value(&self) -> &Value {
        &self.default_value
    }

    /// Effective-value derivation, if any.
    pub const fn effective(&self) -> Option<&EffectiveValue> {
        self.effective.as_ref()
    }

    /// Run a stored value through the deserializer (when it recognizes a
    /// legacy form) and the checker.
    pub fn check(&self, raw: &Value) -> Result<Value, InvalidFieldValue> {
        let upgraded = self.value_type.deserialize(raw, &self.type_params);
        self.value_type
            .check(upgraded.as_ref().unwrap_or(raw), &self.type_params)
            .map_err(|reason| InvalidFieldValue {
                key: self.key.clone(),
                reason,
            })
    }

    /// Wire representation of a checked value.
    pub fn serialize(&self, value: &Value) -> Value {
        self.value_type.serialize(value, &self.type_params)
    }

    fn prefixed(mut self, prefix: &str) -> Self {
        self.key = join_key(prefix, &self.key);
        if let Some(effective) = &mut self.effective {
            for dependency in &mut effective.dependencies {
                *dependency = join_key(prefix, dependency);
            }
        }
        self
    }
}

impl fmt::Debug for ConcreteFieldSchema {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ConcreteFieldSchema")
            .field("key", &self.key)
            .field("type_key", &self.type_key)
            .field("type_params", &self.type_params)
            .field("default_value", &self.default_value)
            .field(
                "effective_dependencies",
                &self.effective.as_ref().map(EffectiveValue::dependencies),
            )
            .finish()
    }
}

/// A field computed from concrete fields, without storage.
#[derive(Clone)]
pub struct VirtualFieldSchema {
    key: String,
    dependencies: Vec<String>,
    render: RenderFn,
    inverse: Option<InverseFn>,
}

impl VirtualFieldSchema {
    /// Full dotted key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Full keys of the concrete fields the render function reads.
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Render the field from resolved dependency values.
    pub fn render(&self, dependencies: &[&Value]) -> Value {
        (self.render)(dependencies)
    }

    /// Returns true when writes through this field are supported.
    pub const fn is_writable(&self) -> bool {
        self.inverse.is_some()
    }

    /// Map a written value to dependency values.
    pub fn invert(&self, value: &Value) -> Result<Vec<Value>, KvConfigError> {
        let inverse = self
            .inverse
            .as_ref()
            .ok_or_else(|| KvConfigError::InvalidVirtualWrite {
                key: self.key.clone(),
                reason: "field is read-only".to_string(),
            })?;
        let values = inverse(value).map_err(|reason| KvConfigError::InvalidVirtualWrite {
            key: self.key.clone(),
            reason,
        })?;
        if values.len() != self.dependencies.len() {
            return Err(KvConfigError::InvalidVirtualWrite {
                key: self.key.clone(),
                reason: format!(
                    "expected {} values, got {}",
                    self.dependencies.len(),
                    values.len()
                ),
            });
        }
        Ok(values)
    }

    fn prefixed(mut self, prefix: &str) -> Self {
        self.key = join_key(prefix, &self.key);
        for dependency in &mut self.dependencies {
            *dependency = join_key(prefix, dependency);
        }
        self
    }
}

impl fmt::Debug for VirtualFieldSchema {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("VirtualFieldSchema")
            .field("key", &self.key)
            .field("dependencies", &self.dependencies)
            .field("writable", &self.is_writable())
            .finish()
    }
}

/// One declared field.
#[derive(Debug, Clone)]
pub enum FieldSchema {
    /// Field with storage.
    Concrete(ConcreteFieldSchema),
    /// Derived field.
    Virtual(VirtualFieldSchema),
}

impl FieldSchema {
    /// Full dotted key.
    pub fn key(&self) -> &str {
        match self {
            Self::Concrete(field) => field.key(),
            Self::Virtual(field) => field.key(),
        }
    }

    /// Full keys this field reads during collapse.
    pub fn dependencies(&self) -> &[String] {
        match self {
            Self::Concrete(field) => match &field.effective {
                Some(effective) => effective.dependencies(),
                None => &[],
            },
            Self::Virtual(field) => field.dependencies(),
        }
    }

    /// The concrete schema, if this is a concrete field.
    pub const fn as_concrete(&self) -> Option<&ConcreteFieldSchema> {
        match self {
            Self::Concrete(field) => Some(field),
            Self::Virtual(_) => None,
        }
    }

    /// The virtual schema, if this is a virtual field.
    pub const fn as_virtual(&self) -> Option<&VirtualFieldSchema> {
        match self {
            Self::Concrete(_) => None,
            Self::Virtual(field) => Some(field),
        }
    }

    fn prefixed(self, prefix: &str) -> Self {
        match self {
            Self::Concrete(field) => Self::Concrete(field.prefixed(prefix)),
            Self::Virtual(field) => Self::Virtual(field.prefixed(prefix)),
        }
    }
}

// =============================================================================
// BUILDER
// =============================================================================

/// Accumulates field declarations into an immutable [`KvConfigSchematics`].
#[derive(Debug, Clone)]
pub struct KvConfigSchematicsBuilder {
    name: String,
    library: Arc<KvFieldValueTypeLibrary>,
    scope: String,
    fields: Vec<FieldSchema>,
    index: BTreeMap<String, usize>,
}

impl KvConfigSchematicsBuilder {
    /// Start an empty builder; `name` identifies the schematics in errors.
    pub fn new(name: impl Into<String>, library: Arc<KvFieldValueTypeLibrary>) -> Self {
        Self {
            name: name.into(),
            library,
            scope: String::new(),
            fields: Vec::new(),
            index: BTreeMap::new(),
        }
    }

    /// Declare a concrete field.
    pub fn field(
        self,
        key: &str,
        type_key: &str,
        type_params: Value,
        default_value: Value,
    ) -> Result<Self, KvConfigError> {
        self.field_with(key, type_key, type_params, default_value, FieldOptions::new())
    }

    /// Declare a concrete field with options.
    pub fn field_with(
        mut self,
        key: &str,
        type_key: &str,
        type_params: Value,
        default_value: Value,
        options: FieldOptions,
    ) -> Result<Self, KvConfigError> {
        let full_key = join_key(&self.scope, key);
        self.ensure_unique(&full_key)?;

        let value_type = self.library.get(type_key)?.clone();
        value_type
            .check_params(&type_params)
            .map_err(|reason| KvConfigError::InvalidTypeParams {
                schematics: self.name.clone(),
                key: full_key.clone(),
                type_key: type_key.to_string(),
                reason,
            })?;
        let default_value = value_type
            .check(&default_value, &type_params)
            .map_err(|reason| KvConfigError::InvalidDefault {
                schematics: self.name.clone(),
                key: full_key.clone(),
                reason,
            })?;

        let effective = match options.effective {
            Some((dependencies, derive)) => Some(EffectiveValue {
                dependencies: self.resolve_dependencies(&full_key, &dependencies)?,
                derive,
            }),
            None => None,
        };

        self.push(FieldSchema::Concrete(ConcreteFieldSchema {
            key: full_key,
            type_key: type_key.to_string(),
            type_params,
            default_value,
            value_type,
            effective,
        }));
        Ok(self)
    }

    /// Declare a read-only virtual field.
    pub fn virtual_field<R>(
        self,
        key: &str,
        dependencies: &[&str],
        render: R,
    ) -> Result<Self, KvConfigError>
    where
        R: Fn(&[&Value]) -> Value + Send + Sync + 'static,
    {
        self.push_virtual(key, dependencies, Arc::new(render), None)
    }

    /// Declare a virtual field that also accepts writes.
    ///
    /// `inverse` returns one value per dependency, in the same order.
    pub fn writable_virtual_field<R, I>(
        self,
        key: &str,
        dependencies: &[&str],
        render: R,
        inverse: I,
    ) -> Result<Self, KvConfigError>
    where
        R: Fn(&[&Value]) -> Value + Send + Sync + 'static,
        I: Fn(&Value) -> Result<Vec<Value>, String> + Send + Sync + 'static,
    {
        self.push_virtual(key, dependencies, Arc::new(render), Some(Arc::new(inverse)))
    }

    /// Declare fields under `prefix` relative to the current scope.
    pub fn scope<F>(mut self, prefix: &str, declare: F) -> Result<Self, KvConfigError>
    where
        F: FnOnce(Self) -> Result<Self, KvConfigError>,
    {
        let outer = std::mem::take(&mut self.scope);
        self.scope = join_key(&outer, prefix);
        let mut builder = declare(self)?;
        builder.scope = outer;
        Ok(builder)
    }

    /// Copy every field of `schematics` (by full key) into the current scope.
    pub fn extend(mut self, schematics: &KvConfigSchematics) -> Result<Self, KvConfigError> {
        for field in schematics.fields() {
            let field = field.clone().prefixed(&self.scope);
            self.ensure_unique(field.key())?;
            self.push(field);
        }
        Ok(self)
    }

    /// Freeze the declarations.
    pub fn build(self) -> KvConfigSchematics {
        KvConfigSchematics::from_parts(self.name, String::new(), self.library, self.fields)
    }

    fn push_virtual(
        mut self,
        key: &str,
        dependencies: &[&str],
        render: RenderFn,
        inverse: Option<InverseFn>,
    ) -> Result<Self, KvConfigError> {
        let full_key = join_key(&self.scope, key);
        self.ensure_unique(&full_key)?;
        let dependencies: Vec<String> = dependencies.iter().map(ToString::to_string).collect();
        let dependencies = self.resolve_dependencies(&full_key, &dependencies)?;

        self.push(FieldSchema::Virtual(VirtualFieldSchema {
            key: full_key,
            dependencies,
            render,
            inverse,
        }));
        Ok(self)
    }

    fn push(&mut self, field: FieldSchema) {
        self.index.insert(field.key().to_string(), self.fields.len());
        self.fields.push(field);
    }

    fn ensure_unique(&self, full_key: &str) -> Result<(), KvConfigError> {
        if self.index.contains_key(full_key) {
            return Err(KvConfigError::DuplicateKey {
                schematics: self.name.clone(),
                key: full_key.to_string(),
            });
        }
        Ok(())
    }

    /// Resolve dependency keys like nested names: the current scope first,
    /// then each enclosing scope up to the root.
    fn resolve_dependencies(
        &self,
        full_key: &str,
        dependencies: &[String],
    ) -> Result<Vec<String>, KvConfigError> {
        dependencies
            .iter()
            .map(|dependency| {
                let local = join_key(&self.scope, dependency);
                if local == full_key {
                    return Err(KvConfigError::CircularDependency {
                        schematics: self.name.clone(),
                        key: full_key.to_string(),
                    });
                }
                self.lookup_concrete(dependency)
                    .ok_or_else(|| KvConfigError::UndeclaredDependency {
                        schematics: self.name.clone(),
                        key: full_key.to_string(),
                        dependency: local,
                    })
            })
            .collect()
    }

    fn lookup_concrete(&self, dependency: &str) -> Option<String> {
        let mut scope = self.scope.as_str();
        loop {
            let candidate = join_key(scope, dependency);
            let declared = self
                .index
                .get(&candidate)
                .and_then(|position| self.fields.get(*position))
                .is_some_and(|field| field.as_concrete().is_some());
            if declared {
                return Some(candidate);
            }
            if scope.is_empty() {
                return None;
            }
            scope = scope.rsplit_once('.').map_or("", |(parent, _)| parent);
        }
    }
}

// =============================================================================
// SCHEMATICS
// =============================================================================

struct SchematicsInner {
    name: String,
    base_key: String,
    library: Arc<KvFieldValueTypeLibrary>,
    fields: Vec<FieldSchema>,
    index: BTreeMap<String, usize>,
}

/// Immutable, ordered collection of field schemas. Cheap to clone.
#[derive(Clone)]
pub struct KvConfigSchematics {
    inner: Arc<SchematicsInner>,
}

impl KvConfigSchematics {
    fn from_parts(
        name: String,
        base_key: String,
        library: Arc<KvFieldValueTypeLibrary>,
        fields: Vec<FieldSchema>,
    ) -> Self {
        let index = fields
            .iter()
            .enumerate()
            .map(|(position, field)| (field.key().to_string(), position))
            .collect();
        Self {
            inner: Arc::new(SchematicsInner {
                name,
                base_key,
                library,
                fields,
                index,
            }),
        }
    }

    fn derive(&self, base_key: String, fields: Vec<FieldSchema>) -> Self {
        Self::from_parts(
            self.inner.name.clone(),
            base_key,
            Arc::clone(&self.inner.library),
            fields,
        )
    }

    /// Name used in error messages.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Prefix shared by every field; empty at the root.
    pub fn base_key(&self) -> &str {
        &self.inner.base_key
    }

    /// Value-type library the fields were checked against.
    pub fn library(&self) -> &Arc<KvFieldValueTypeLibrary> {
        &self.inner.library
    }

    /// Full dotted key for a key relative to the base key.
    pub fn full_key(&self, key: &str) -> String {
        join_key(&self.inner.base_key, key)
    }

    /// Key relative to the base key, when `full_key` lies under it.
    pub fn short_key<'a>(&self, full_key: &'a str) -> Option<&'a str> {
        strip_key_prefix(full_key, &self.inner.base_key)
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldSchema> {
        self.inner.fields.iter()
    }

    /// Concrete fields in declaration order.
    pub fn concrete_fields(&self) -> impl Iterator<Item = &ConcreteFieldSchema> {
        self.fields().filter_map(FieldSchema::as_concrete)
    }

    /// Virtual fields in declaration order.
    pub fn virtual_fields(&self) -> impl Iterator<Item = &VirtualFieldSchema> {
        self.fields().filter_map(FieldSchema::as_virtual)
    }

    /// Number of declared fields.
    pub fn len(&self) -> usize {
        self.inner.fields.len()
    }

    /// Returns true when no field is declared.
    pub fn is_empty(&self) -> bool {
        self.inner.fields.is_empty()
    }

    /// Keys relative to the base key, in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields()
            .map(|field| self.short_key(field.key()).unwrap_or(field.key()))
    }

    /// Look up a field by key relative to the base key.
    pub fn field(&self, key: &str) -> Option<&FieldSchema> {
        self.field_by_full_key(&self.full_key(key))
    }

    /// Look up a field by full key.
    pub fn field_by_full_key(&self, full_key: &str) -> Option<&FieldSchema> {
        self.inner
            .index
            .get(full_key)
            .and_then(|position| self.inner.fields.get(*position))
    }

    /// Returns true when a field (concrete or virtual) is declared at `key`.
    pub fn has_field(&self, key: &str) -> bool {
        self.field(key).is_some()
    }

    pub(crate) fn position(&self, full_key: &str) -> Option<usize> {
        self.inner.index.get(full_key).copied()
    }

    fn concrete_by_full_key(&self, full_key: &str) -> Option<&ConcreteFieldSchema> {
        self.field_by_full_key(full_key)
            .and_then(FieldSchema::as_concrete)
    }

    fn unknown_field(&self, key: &str) -> KvConfigError {
        KvConfigError::UnknownField {
            schematics: self.name().to_string(),
            key: key.to_string(),
        }
    }

    /// Keep fields matching any pattern: an exact key or `prefix.*`.
    ///
    /// Fails when a retained field depends on a dropped one.
    pub fn sliced(&self, patterns: &[&str]) -> Result<Self, KvConfigError> {
        let fields: Vec<FieldSchema> = self
            .fields()
            .filter(|field| {
                self.short_key(field.key()).is_some_and(|key| {
                    patterns
                        .iter()
                        .any(|pattern| key_matches_pattern(key, pattern))
                })
            })
            .cloned()
            .collect();
        ensure_closed(self.name(), &fields)?;
        Ok(self.derive(self.base_key().to_string(), fields))
    }

    /// Keep the fields under `prefix` and make it part of the base key.
    pub fn scoped(&self, prefix: &str) -> Result<Self, KvConfigError> {
        let base_key = self.full_key(prefix);
        let fields: Vec<FieldSchema> = self
            .fields()
            .filter(|field| {
                strip_key_prefix(field.key(), &base_key).is_some_and(|key| !key.is_empty())
            })
            .cloned()
            .collect();
        ensure_closed(self.name(), &fields)?;
        Ok(self.derive(base_key, fields))
    }

    /// Append the fields of `other`; both must share a base key.
    pub fn union(&self, other: &Self) -> Result<Self, KvConfigError> {
        if self.base_key() != other.base_key() {
            return Err(KvConfigError::BaseKeyMismatch {
                left: self.base_key().to_string(),
                right: other.base_key().to_string(),
            });
        }
        let mut fields = self.inner.fields.clone();
        for field in other.fields() {
            if self.inner.index.contains_key(field.key()) {
                return Err(KvConfigError::DuplicateKey {
                    schematics: self.name().to_string(),
                    key: field.key().to_string(),
                });
            }
            fields.push(field.clone());
        }
        Ok(self.derive(self.base_key().to_string(), fields))
    }

    /// Replace the type parameters of a concrete field.
    ///
    /// The existing default is re-checked against the new parameters.
    pub fn with_type_param_override<F>(
        &self,
        key: &str,
        override_params: F,
    ) -> Result<Self, KvConfigError>
    where
        F: FnOnce(&Value) -> Value,
    {
        let full_key = self.full_key(key);
        let position = self
            .position(&full_key)
            .ok_or_else(|| self.unknown_field(key))?;
        let mut fields = self.inner.fields.clone();
        let Some(FieldSchema::Concrete(field)) = fields.get_mut(position) else {
            return Err(self.unknown_field(key));
        };

        let type_params = override_params(&field.type_params);
        field
            .value_type
            .check_params(&type_params)
            .map_err(|reason| KvConfigError::InvalidTypeParams {
                schematics: self.name().to_string(),
                key: full_key.clone(),
                type_key: field.type_key.clone(),
                reason,
            })?;
        field.default_value = field
            .value_type
            .check(&field.default_value, &type_params)
            .map_err(|reason| KvConfigError::InvalidDefault {
                schematics: self.name().to_string(),
                key: full_key.clone(),
                reason,
            })?;
        field.type_params = type_params;

        Ok(self.derive(self.base_key().to_string(), fields))
    }

    /// Keep only the keys declared as concrete fields.
    pub fn filter_config(&self, config: &KvConfig) -> KvConfig {
        self.two_way_filter_config(config).0
    }

    /// Apply [`Self::filter_config`] to every layer.
    pub fn filter_stack(&self, stack: &KvConfigStack) -> KvConfigStack {
        KvConfigStack {
            layers: stack
                .layers
                .iter()
                .map(|layer| KvConfigStackLayer {
                    layer_name: layer.layer_name.clone(),
                    config: self.filter_config(&layer.config),
                })
                .collect(),
        }
    }

    /// Split a layer into (declared concrete keys, everything else).
    pub fn two_way_filter_config(&self, config: &KvConfig) -> (KvConfig, KvConfig) {
        let (declared, undeclared): (Vec<_>, Vec<_>) = config
            .fields
            .iter()
            .cloned()
            .partition(|field| self.concrete_by_full_key(&field.key).is_some());
        (KvConfig::from_fields(declared), KvConfig::from_fields(undeclared))
    }

    /// Check and normalize only the concrete fields present in `config`.
    ///
    /// Unknown keys are dropped; nothing is defaulted or derived.
    pub fn parse_partial(&self, config: &KvConfig) -> Result<KvConfig, KvConfigError> {
        let mut parsed = KvConfig::new();
        for field in &config.fields {
            if let Some(schema) = self.concrete_by_full_key(&field.key) {
                let value = schema.check(&field.value).map_err(|error| {
                    KvConfigError::FieldValidation {
                        layer: CONFIG_BUILDER_LAYER.to_string(),
                        error,
                    }
                })?;
                parsed.set(field.key.clone(), value);
            }
        }
        Ok(parsed)
    }

    /// Start a type-checked layer for this schematics.
    pub fn config_builder(&self) -> KvConfigBuilder {
        KvConfigBuilder {
            schematics: self.clone(),
            config: KvConfig::new(),
        }
    }
}

impl fmt::Debug for KvConfigSchematics {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("KvConfigSchematics")
            .field("name", &self.inner.name)
            .field("base_key", &self.inner.base_key)
            .field("fields", &self.inner.fields)
            .finish()
    }
}

// =============================================================================
// TYPED LAYER BUILDER
// =============================================================================

/// Builds a [`KvConfig`] whose values are checked against a schematics.
#[derive(Debug, Clone)]
pub struct KvConfigBuilder {
    schematics: KvConfigSchematics,
    config: KvConfig,
}

impl KvConfigBuilder {
    /// Set a field by key relative to the base key.
    ///
    /// Writes to a virtual field go through its inverse.
    pub fn with(self, key: &str, value: impl Into<Value>) -> Result<Self, KvConfigError> {
        let full_key = self.schematics.full_key(key);
        let is_virtual = match self.schematics.field_by_full_key(&full_key) {
            Some(FieldSchema::Concrete(_)) => false,
            Some(FieldSchema::Virtual(_)) => true,
            None => return Err(self.schematics.unknown_field(key)),
        };
        if is_virtual {
            self.with_virtual(key, value)
        } else {
            self.with_full_key(&full_key, &value.into())
        }
    }

    /// Write through a virtual field's inverse.
    pub fn with_virtual(
        mut self,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<Self, KvConfigError> {
        let full_key = self.schematics.full_key(key);
        let field = self
            .schematics
            .field_by_full_key(&full_key)
            .and_then(FieldSchema::as_virtual)
            .ok_or_else(|| self.schematics.unknown_field(key))?
            .clone();
        let values = field.invert(&value.into())?;
        for (dependency, value) in field.dependencies().iter().zip(values) {
            self = self.with_full_key(dependency, &value)?;
        }
        Ok(self)
    }

    /// Finish the layer.
    pub fn build(self) -> KvConfig {
        self.config
    }

    fn with_full_key(mut self, full_key: &str, value: &Value) -> Result<Self, KvConfigError> {
        let field = self
            .schematics
            .concrete_by_full_key(full_key)
            .ok_or_else(|| self.schematics.unknown_field(full_key))?;
        let value = field
            .check(value)
            .map_err(|error| KvConfigError::FieldValidation {
                layer: CONFIG_BUILDER_LAYER.to_string(),
                error,
            })?;
        self.config.set(full_key, value);
        Ok(self)
    }
}

// =============================================================================
// KEY HELPERS
// =============================================================================

/// Join two dotted key segments, skipping empty sides.
pub fn join_key(prefix: &str, key: &str) -> String {
    match (prefix.is_empty(), key.is_empty()) {
        (true, _) => key.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{prefix}.{key}"),
    }
}

fn strip_key_prefix<'a>(full_key: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix.is_empty() {
        return Some(full_key);
    }
    if full_key == prefix {
        return Some("");
    }
    full_key.strip_prefix(prefix)?.strip_prefix('.')
}

fn key_matches_pattern(key: &str, pattern: &str) -> bool {
    pattern.strip_suffix(".*").map_or_else(
        || key == pattern,
        |prefix| strip_key_prefix(key, prefix).is_some_and(|rest| !rest.is_empty()),
    )
}

fn ensure_closed(name: &str, fields: &[FieldSchema]) -> Result<(), KvConfigError> {
    let concrete: BTreeSet<&str> = fields
        .iter()
        .filter_map(FieldSchema::as_concrete)
        .map(ConcreteFieldSchema::key)
        .collect();
    for field in fields {
        if let Some(missing) = field
            .dependencies()
            .iter()
            .find(|dependency| !concrete.contains(dependency.as_str()))
        {
            return Err(KvConfigError::UndeclaredDependency {
                schematics: name.to_string(),
                key: field.key().to_string(),
                dependency: missing.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin_types::{BOOLEAN, NUMERIC, kv_value_types_library};
    use serde_json::json;

    fn builder(name: &str) -> Result<KvConfigSchematicsBuilder, KvConfigError> {
        Ok(KvConfigSchematicsBuilder::new(name, kv_value_types_library()?))
    }

    fn sampling() -> Result<KvConfigSchematics, KvConfigError> {
        Ok(builder("sampling")?
            .scope("llm.prediction", |builder| {
                builder
                    .field("temperature", NUMERIC, json!({ "min": 0, "max": 2 }), json!(0.8))?
                    .field("topK", NUMERIC, json!({ "int": true }), json!(40))?
                    .virtual_field("isGreedy", &["temperature"], |values| {
                        json!(values.first().and_then(|value| value.as_f64()) == Some(0.0))
                    })
            })?
            .scope("llm.load", |builder| {
                builder.field(
                    "contextLength",
                    NUMERIC,
                    json!({ "int": true, "min": 1 }),
                    json!(4096),
                )
            })?
            .build())
    }

    #[test]
    fn duplicate_keys_are_rejected_across_kinds() -> Result<(), KvConfigError> {
        let concrete_twice = builder("dup")?
            .field("a", BOOLEAN, Value::Null, json!(false))?
            .field("a", BOOLEAN, Value::Null, json!(true));
        assert!(matches!(
            concrete_twice,
            Err(KvConfigError::DuplicateKey { key, .. }) if key == "a"
        ));

        let virtual_over_concrete = builder("dup")?
            .field("a", BOOLEAN, Value::Null, json!(false))?
            .virtual_field("a", &[], |_| Value::Null);
        assert!(matches!(virtual_over_concrete, Err(KvConfigError::DuplicateKey { .. })));

        let concrete_over_virtual = builder("dup")?
            .virtual_field("v", &[], |_| Value::Null)?
            .field("v", BOOLEAN, Value::Null, json!(false));
        assert!(matches!(concrete_over_virtual, Err(KvConfigError::DuplicateKey { .. })));
        Ok(())
    }

    #[test]
    fn forward_and_self_references_are_rejected() -> Result<(), KvConfigError> {
        let forward = builder("deps")?
            .virtual_field("v", &["later"], |_| Value::Null);
        assert!(matches!(
            forward,
            Err(KvConfigError::UndeclaredDependency { dependency, .. }) if dependency == "later"
        ));

        let own = builder("deps")?.field_with(
            "a",
            NUMERIC,
            Value::Null,
            json!(1),
            FieldOptions::new().effective(&["a"], |value, _| value.clone()),
        );
        assert!(matches!(own, Err(KvConfigError::CircularDependency { key, .. }) if key == "a"));

        let on_virtual = builder("deps")?
            .virtual_field("v", &[], |_| Value::Null)?
            .virtual_field("w", &["v"], |_| Value::Null);
        assert!(matches!(on_virtual, Err(KvConfigError::UndeclaredDependency { .. })));
        Ok(())
    }

    #[test]
    fn invalid_defaults_and_params_fail_at_build() -> Result<(), KvConfigError> {
        let default = builder("bad")?.field("t", NUMERIC, json!({ "max": 2 }), json!(5));
        assert!(matches!(default, Err(KvConfigError::InvalidDefault { .. })));

        let params = builder("bad")?.field("t", NUMERIC, json!({ "min": 3, "max": 2 }), json!(2));
        assert!(matches!(params, Err(KvConfigError::InvalidTypeParams { .. })));

        let unknown = builder("bad")?.field("t", "complex", Value::Null, json!(0));
        assert!(matches!(unknown, Err(KvConfigError::UnknownValueType { .. })));
        Ok(())
    }

    #[test]
    fn dependencies_resolve_through_enclosing_scopes() -> Result<(), KvConfigError> {
        let schematics = builder("load")?
            .scope("llm.load", |builder| {
                builder
                    .field("contextLength", NUMERIC, json!({ "int": true }), json!(4096))?
                    .scope("llama", |builder| {
                        builder.field_with(
                            "evalBatchSize",
                            NUMERIC,
                            json!({ "int": true }),
                            json!(512),
                            FieldOptions::new()
                                .effective(&["contextLength"], |value, _| value.clone()),
                        )
                    })
            })?
            .build();

        let field = schematics
            .field("llm.load.llama.evalBatchSize")
            .and_then(FieldSchema::as_concrete)
            .and_then(ConcreteFieldSchema::effective)
            .map(|effective| effective.dependencies().to_vec());
        assert_eq!(field, Some(vec!["llm.load.contextLength".to_string()]));
        Ok(())
    }

    #[test]
    fn scoped_and_sliced_narrow_fields() -> Result<(), KvConfigError> {
        let schematics = sampling()?;
        let prediction = schematics.scoped("llm.prediction")?;

        assert_eq!(prediction.base_key(), "llm.prediction");
        assert_eq!(
            prediction.keys().collect::<Vec<_>>(),
            vec!["temperature", "topK", "isGreedy"]
        );
        assert_eq!(prediction.full_key("topK"), "llm.prediction.topK");

        let sliced = prediction.sliced(&["temperature", "isGreedy"])?;
        assert_eq!(sliced.len(), 2);

        let dangling = prediction.sliced(&["isGreedy"]);
        assert!(matches!(dangling, Err(KvConfigError::UndeclaredDependency { .. })));

        let by_prefix = schematics.sliced(&["llm.load.*"])?;
        assert_eq!(by_prefix.keys().collect::<Vec<_>>(), vec!["llm.load.contextLength"]);
        Ok(())
    }

    #[test]
    fn union_checks_base_keys_and_duplicates() -> Result<(), KvConfigError> {
        let schematics = sampling()?;
        let prediction = schematics.scoped("llm.prediction")?;
        let load = schematics.scoped("llm.load")?;

        assert!(matches!(
            prediction.union(&load),
            Err(KvConfigError::BaseKeyMismatch { .. })
        ));
        assert!(matches!(
            prediction.union(&prediction),
            Err(KvConfigError::DuplicateKey { .. })
        ));

        let extra = builder("extra")?
            .scope("llm.prediction", |builder| {
                builder.field("seed", NUMERIC, json!({ "int": true }), json!(0))
            })?
            .build()
            .scoped("llm.prediction")?;
        let combined = prediction.union(&extra)?;
        assert_eq!(combined.len(), 4);
        assert!(combined.has_field("seed"));
        Ok(())
    }

    #[test]
    fn type_param_override_rechecks_default() -> Result<(), KvConfigError> {
        let prediction = sampling()?.scoped("llm.prediction")?;

        let widened = prediction
            .with_type_param_override("temperature", |_| json!({ "min": 0, "max": 4 }))?;
        let params = widened
            .field("temperature")
            .and_then(FieldSchema::as_concrete)
            .map(|field| field.type_params().clone());
        assert_eq!(params, Some(json!({ "min": 0, "max": 4 })));

        let narrowed =
            prediction.with_type_param_override("temperature", |_| json!({ "max": 0.5 }));
        assert!(matches!(narrowed, Err(KvConfigError::InvalidDefault { .. })));

        let on_virtual = prediction.with_type_param_override("isGreedy", Clone::clone);
        assert!(matches!(on_virtual, Err(KvConfigError::UnknownField { .. })));
        Ok(())
    }

    #[test]
    fn extend_copies_fields_under_scope() -> Result<(), KvConfigError> {
        let prediction = sampling()?.scoped("llm.prediction")?;
        let schematics = builder("copy")?
            .scope("preset", |builder| builder.extend(&prediction))?
            .build();

        assert!(schematics.has_field("preset.llm.prediction.temperature"));
        let dependencies = schematics
            .field("preset.llm.prediction.isGreedy")
            .map(|field| field.dependencies().to_vec());
        assert_eq!(
            dependencies,
            Some(vec!["preset.llm.prediction.temperature".to_string()])
        );
        Ok(())
    }

    #[test]
    fn filters_split_declared_keys() -> Result<(), KvConfigError> {
        let prediction = sampling()?.scoped("llm.prediction")?;
        let config: KvConfig = [
            ("llm.prediction.temperature", json!(1)),
            ("llm.prediction.isGreedy", json!(true)),
            ("vendor.extra", json!("x")),
        ]
        .into_iter()
        .collect();

        let (declared, undeclared) = prediction.two_way_filter_config(&config);
        assert_eq!(declared.keys().collect::<Vec<_>>(), vec!["llm.prediction.temperature"]);
        assert_eq!(
            undeclared.keys().collect::<Vec<_>>(),
            vec!["llm.prediction.isGreedy", "vendor.extra"]
        );
        assert_eq!(prediction.filter_config(&config), declared);
        Ok(())
    }

    #[test]
    fn parse_partial_checks_present_fields_only() -> Result<(), KvConfigError> {
        let prediction = sampling()?.scoped("llm.prediction")?;
        let config: KvConfig = [("llm.prediction.topK", json!(12.0)), ("other", json!(1))]
            .into_iter()
            .collect();

        let parsed = prediction.parse_partial(&config)?;
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed.get("llm.prediction.topK"), Some(&json!(12)));

        let invalid: KvConfig = [("llm.prediction.temperature", json!(9))].into_iter().collect();
        assert!(matches!(
            prediction.parse_partial(&invalid),
            Err(KvConfigError::FieldValidation { .. })
        ));
        Ok(())
    }

    #[test]
    fn config_builder_checks_values() -> Result<(), KvConfigError> {
        let prediction = sampling()?.scoped("llm.prediction")?;

        let config = prediction
            .config_builder()
            .with("temperature", 0.2)?
            .with("topK", 20)?
            .build();
        assert_eq!(config.get("llm.prediction.temperature"), Some(&json!(0.2)));

        let rejected = prediction.config_builder().with("temperature", 3);
        assert!(matches!(
            rejected.map(KvConfigBuilder::build),
            Err(KvConfigError::FieldValidation { layer, .. }) if layer == CONFIG_BUILDER_LAYER
        ));

        let read_only = prediction.config_builder().with("isGreedy", true);
        assert!(matches!(read_only, Err(KvConfigError::InvalidVirtualWrite { .. })));

        let unknown = prediction.config_builder().with("missing", 1);
        assert!(matches!(unknown, Err(KvConfigError::UnknownField { .. })));
        Ok(())
    }

    #[test]
    fn writable_virtual_field_maps_to_dependencies() -> Result<(), KvConfigError> {
        let schematics = builder("virtual")?
            .field("temperature", NUMERIC, json!({ "min": 0, "max": 2 }), json!(0.8))?
            .writable_virtual_field(
                "isGreedy",
                &["temperature"],
                |values| json!(values.first().and_then(|value| value.as_f64()) == Some(0.0)),
                |value| match value.as_bool() {
                    Some(true) => Ok(vec![json!(0)]),
                    Some(false) => Ok(vec![json!(0.8)]),
                    None => Err("expected a boolean".to_string()),
                },
            )?
            .build();

        let config = schematics.config_builder().with_virtual("isGreedy", true)?.build();
        assert_eq!(config.get("temperature"), Some(&json!(0.0)));

        let invalid = schematics.config_builder().with("isGreedy", "yes");
        assert!(matches!(invalid, Err(KvConfigError::InvalidVirtualWrite { .. })));
        Ok(())
    }

    #[test]
    fn key_helpers_handle_empty_segments() {
        assert_eq!(join_key("", "a"), "a");
        assert_eq!(join_key("a", ""), "a");
        assert_eq!(join_key("a", "b.c"), "a.b.c");
        assert_eq!(strip_key_prefix("a.b", "a"), Some("b"));
        assert_eq!(strip_key_prefix("ab.c", "a"), None);
        assert!(key_matches_pattern("a.b", "a.*"));
        assert!(!key_matches_pattern("a", "a.*"));
        assert!(key_matches_pattern("a", "a"));
    }
}
