//! Plugin contributions, merged once at setup.
//!
//! Plugins describe what they contribute as a list of typed [`Resource`]s. The
//! [`RegistryBuilder`] appends them to per-kind buckets in plugin order and
//! rejects collisions for kinds that must be unique. The frozen [`Registry`] is
//! shared read-only for the whole session.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;
use smol_str::SmolStr;

use crate::dispatch::CommandContext;
use crate::error::{EditorError, HandlerFailure, Result};
use crate::schema::Schema;
use crate::selection::SelectionHook;
use crate::tree::{Document, NodeId};

/// Runs a command. Returning `Some` makes the value the dispatch result
/// unless a later handler returns one too.
pub type CommandHandler = Arc<
    dyn Fn(&mut CommandContext<'_>, &Value) -> std::result::Result<Option<Value>, HandlerFailure>,
>;

/// Extra normalization over a subtree, run before the built-in rules.
pub type NormalizationHook = Arc<dyn Fn(&mut Document, &Schema, NodeId) -> Result<()>>;

/// A normalized key chord such as `Ctrl+Shift+Z`.
///
/// Modifiers are order-insensitive; single-character keys are case-insensitive.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyChord {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub meta: bool,
    pub key: SmolStr,
}

impl KeyChord {
    pub fn new(key: &str) -> Self {
        Self {
            ctrl: false,
            shift: false,
            alt: false,
            meta: false,
            key: normalize_key(key),
        }
    }

    pub fn ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn shift(mut self) -> Self {
        self.shift = true;
        self
    }

    pub fn alt(mut self) -> Self {
        self.alt = true;
        self
    }

    pub fn meta(mut self) -> Self {
        self.meta = true;
        self
    }
}

fn normalize_key(key: &str) -> SmolStr {
    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => SmolStr::new(c.to_uppercase().to_string()),
        _ => SmolStr::new(key),
    }
}

impl FromStr for KeyChord {
    type Err = EditorError;

    fn from_str(s: &str) -> Result<Self> {
        let mut chord = KeyChord::new("");
        let mut parts: Vec<&str> = s.split('+').collect();
        // `Ctrl++` binds the plus key.
        if s.ends_with("++") {
            parts.truncate(parts.len().saturating_sub(2));
            parts.push("+");
        }
        let Some((key, modifiers)) = parts.split_last() else {
            return Err(EditorError::Configuration(format!("empty key chord `{s}`")));
        };
        for modifier in modifiers {
            match modifier.to_ascii_lowercase().as_str() {
                "ctrl" | "control" => chord.ctrl = true,
                "shift" => chord.shift = true,
                "alt" | "option" => chord.alt = true,
                "meta" | "cmd" | "super" => chord.meta = true,
                other => {
                    return Err(EditorError::Configuration(format!(
                        "unknown modifier `{other}` in key chord `{s}`"
                    )));
                }
            }
        }
        if key.is_empty() {
            return Err(EditorError::Configuration(format!(
                "key chord `{s}` has no key"
            )));
        }
        chord.key = normalize_key(key);
        Ok(chord)
    }
}

impl fmt::Display for KeyChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (on, name) in [
            (self.ctrl, "Ctrl+"),
            (self.alt, "Alt+"),
            (self.shift, "Shift+"),
            (self.meta, "Meta+"),
        ] {
            if on {
                f.write_str(name)?;
            }
        }
        f.write_str(&self.key)
    }
}

/// A keybinding target: the command and the payload to dispatch it with.
#[derive(Clone, Debug, PartialEq)]
pub struct Binding {
    pub command: SmolStr,
    pub payload: Value,
}

/// One typed contribution.
#[derive(Clone)]
pub enum Resource {
    CommandHandler {
        command: SmolStr,
        handler: CommandHandler,
    },
    Keybinding {
        chord: KeyChord,
        binding: Binding,
    },
    NormalizationHook(NormalizationHook),
    SelectionHook(SelectionHook),
    /// Tag this plugin treats as a block element. Unique across plugins.
    BlockTag(SmolStr),
}

impl Resource {
    pub fn command(
        command: impl Into<SmolStr>,
        handler: impl Fn(&mut CommandContext<'_>, &Value) -> std::result::Result<Option<Value>, HandlerFailure>
        + 'static,
    ) -> Self {
        Self::CommandHandler {
            command: command.into(),
            handler: Arc::new(handler),
        }
    }

    pub fn keybinding(chord: &str, command: impl Into<SmolStr>, payload: Value) -> Result<Self> {
        Ok(Self::Keybinding {
            chord: chord.parse()?,
            binding: Binding {
                command: command.into(),
                payload,
            },
        })
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::CommandHandler { .. } => ResourceKind::CommandHandler,
            Self::Keybinding { .. } => ResourceKind::Keybinding,
            Self::NormalizationHook(_) => ResourceKind::NormalizationHook,
            Self::SelectionHook(_) => ResourceKind::SelectionHook,
            Self::BlockTag(_) => ResourceKind::BlockTag,
        }
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommandHandler { command, .. } => {
                f.debug_tuple("CommandHandler").field(command).finish()
            }
            Self::Keybinding { chord, binding } => f
                .debug_tuple("Keybinding")
                .field(&chord.to_string())
                .field(&binding.command)
                .finish(),
            Self::NormalizationHook(_) => f.write_str("NormalizationHook"),
            Self::SelectionHook(_) => f.write_str("SelectionHook"),
            Self::BlockTag(tag) => f.debug_tuple("BlockTag").field(tag).finish(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    CommandHandler,
    Keybinding,
    NormalizationHook,
    SelectionHook,
    BlockTag,
}

/// A feature module contributing resources.
pub trait Plugin {
    fn name(&self) -> &str;

    /// Plugins that must appear earlier in the plugin list.
    fn dependencies(&self) -> &[&str] {
        &[]
    }

    fn resources(&self) -> Result<Vec<Resource>>;
}

/// A contribution and the plugin it came from.
#[derive(Clone, Debug)]
pub struct Contribution {
    pub plugin: SmolStr,
    pub resource: Resource,
}

/// Collects contributions before the session starts.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    buckets: HashMap<ResourceKind, Vec<Contribution>>,
    keybindings: HashMap<KeyChord, SmolStr>,
    block_tags: HashMap<SmolStr, SmolStr>,
    plugins: Vec<SmolStr>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every resource of `plugin`, checking its position in the list.
    pub fn add_plugin(&mut self, plugin: &dyn Plugin) -> Result<&mut Self> {
        let name = SmolStr::new(plugin.name());
        if self.plugins.contains(&name) {
            return Err(EditorError::Configuration(format!(
                "plugin `{name}` is listed twice"
            )));
        }
        for dependency in plugin.dependencies() {
            if !self.plugins.iter().any(|p| p == dependency) {
                return Err(EditorError::Configuration(format!(
                    "plugin `{name}` depends on `{dependency}`, which must come earlier in the plugin list"
                )));
            }
        }
        self.plugins.push(name.clone());
        for resource in plugin.resources()? {
            self.register(&name, resource)?;
        }
        tracing::debug!(target: "weaver::dispatch", plugin = %name, "plugin registered");
        Ok(self)
    }

    /// Append one contribution to its bucket.
    pub fn register(&mut self, plugin: &str, resource: Resource) -> Result<&mut Self> {
        match &resource {
            Resource::Keybinding { chord, .. } => {
                if let Some(owner) = self.keybindings.get(chord) {
                    return Err(EditorError::Configuration(format!(
                        "key chord `{chord}` is bound by both `{owner}` and `{plugin}`"
                    )));
                }
                self.keybindings.insert(chord.clone(), SmolStr::new(plugin));
            }
            Resource::BlockTag(tag) => {
                if let Some(owner) = self.block_tags.get(tag) {
                    return Err(EditorError::Configuration(format!(
                        "block tag `{tag}` is claimed by both `{owner}` and `{plugin}`"
                    )));
                }
                self.block_tags.insert(tag.clone(), SmolStr::new(plugin));
            }
            _ => {}
        }
        self.buckets
            .entry(resource.kind())
            .or_default()
            .push(Contribution {
                plugin: SmolStr::new(plugin),
                resource,
            });
        Ok(self)
    }

    pub fn freeze(self) -> Arc<Registry> {
        let mut handlers: HashMap<SmolStr, Vec<CommandHandler>> = HashMap::new();
        let mut keybindings = HashMap::new();
        let mut normalization_hooks = Vec::new();
        let mut selection_hooks = Vec::new();
        let mut block_tags = Vec::new();
        for contribution in self.buckets.values().flatten() {
            match &contribution.resource {
                Resource::Keybinding { chord, binding } => {
                    keybindings.insert(chord.clone(), binding.clone());
                }
                Resource::BlockTag(tag) => block_tags.push(tag.clone()),
                _ => {}
            }
        }
        // Ordered kinds are read from their buckets, which preserve plugin order.
        for contribution in self.bucket(ResourceKind::CommandHandler) {
            if let Resource::CommandHandler { command, handler } = &contribution.resource {
                handlers
                    .entry(command.clone())
                    .or_default()
                    .push(handler.clone());
            }
        }
        for contribution in self.bucket(ResourceKind::NormalizationHook) {
            if let Resource::NormalizationHook(hook) = &contribution.resource {
                normalization_hooks.push(hook.clone());
            }
        }
        for contribution in self.bucket(ResourceKind::SelectionHook) {
            if let Resource::SelectionHook(hook) = &contribution.resource {
                selection_hooks.push(hook.clone());
            }
        }
        Arc::new(Registry {
            buckets: self.buckets,
            plugins: self.plugins,
            handlers,
            keybindings,
            normalization_hooks,
            selection_hooks,
            block_tags,
        })
    }

    fn bucket(&self, kind: ResourceKind) -> &[Contribution] {
        self.buckets.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Frozen contributions, shared for the lifetime of a session.
pub struct Registry {
    buckets: HashMap<ResourceKind, Vec<Contribution>>,
    plugins: Vec<SmolStr>,
    handlers: HashMap<SmolStr, Vec<CommandHandler>>,
    keybindings: HashMap<KeyChord, Binding>,
    normalization_hooks: Vec<NormalizationHook>,
    selection_hooks: Vec<SelectionHook>,
    block_tags: Vec<SmolStr>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("plugins", &self.plugins)
            .field("commands", &self.handlers.keys().collect::<Vec<_>>())
            .field("block_tags", &self.block_tags)
            .finish_non_exhaustive()
    }
}

impl Registry {
    /// Build and freeze a registry from an ordered plugin list.
    pub fn from_plugins(plugins: &[Box<dyn Plugin>]) -> Result<Arc<Self>> {
        let mut builder = RegistryBuilder::new();
        for plugin in plugins {
            builder.add_plugin(plugin.as_ref())?;
        }
        Ok(builder.freeze())
    }

    /// Contributions of one kind, in registration order.
    pub fn get(&self, kind: ResourceKind) -> &[Contribution] {
        self.buckets.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn plugins(&self) -> &[SmolStr] {
        &self.plugins
    }

    /// Handlers for `command`, in registration order.
    pub fn handlers(&self, command: &str) -> &[CommandHandler] {
        self.handlers.get(command).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_command(&self, command: &str) -> bool {
        !self.handlers(command).is_empty()
    }

    pub fn keybinding(&self, chord: &KeyChord) -> Option<&Binding> {
        self.keybindings.get(chord)
    }

    pub fn normalization_hooks(&self) -> &[NormalizationHook] {
        &self.normalization_hooks
    }

    pub fn selection_hooks(&self) -> &[SelectionHook] {
        &self.selection_hooks
    }

    pub fn block_tags(&self) -> &[SmolStr] {
        &self.block_tags
    }
}
